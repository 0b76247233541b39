use std::net::SocketAddr;
use std::rc::Rc;

use super::{default_callback, Request};
use crate::emitter::{Emitter, EventEmitter};
use crate::event_loop::{FromLoop, Loop};
use crate::resource::Resource;
use crate::sys::{self, uv_connect_t, uv_tcp_t};
use crate::util::to_sockaddr;

/// Published once a connection is established.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectEvent;

/// Connection request.
#[derive(Debug)]
pub struct ConnectReq {
    resource: Resource<ConnectReq, uv_connect_t>,
}

impl ConnectReq {
    /// Creates a connection request.
    pub fn new(lp: &Rc<Loop>) -> Rc<Self> {
        Rc::new_cyclic(|this| ConnectReq {
            resource: Resource::new(lp, this),
        })
    }

    /// Connects `tcp` to `addr`.
    pub(crate) fn connect(&self, tcp: *mut uv_tcp_t, addr: &SocketAddr) {
        let (storage, _) = to_sockaddr(addr);
        self.invoke(|| unsafe {
            sys::uv_tcp_connect(
                self.raw(),
                tcp,
                &storage as *const libc::sockaddr_storage as *const libc::sockaddr,
                Some(default_callback::<ConnectReq, ConnectEvent>),
            )
        });
    }
}

impl EventEmitter for ConnectReq {
    fn emitter(&self) -> &Emitter<Self> {
        self.resource.emitter()
    }
}

impl Request for ConnectReq {
    type Raw = uv_connect_t;

    fn resource(&self) -> &Resource<Self, uv_connect_t> {
        &self.resource
    }
}

impl FromLoop for ConnectReq {
    fn from_loop(lp: &Rc<Loop>) -> Rc<Self> {
        ConnectReq::new(lp)
    }
}
