use std::rc::Rc;

use super::{default_callback, Request};
use crate::emitter::{Emitter, EventEmitter};
use crate::event_loop::{FromLoop, Loop};
use crate::resource::Resource;
use crate::sys::{self, uv_shutdown_t, uv_stream_t};

/// Published once the write side of a stream is shut down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownEvent;

/// Shutdown request.
#[derive(Debug)]
pub struct ShutdownReq {
    resource: Resource<ShutdownReq, uv_shutdown_t>,
}

impl ShutdownReq {
    /// Creates a shutdown request.
    pub fn new(lp: &Rc<Loop>) -> Rc<Self> {
        Rc::new_cyclic(|this| ShutdownReq {
            resource: Resource::new(lp, this),
        })
    }

    /// Shuts down the write side of `stream` after pending writes.
    pub(crate) fn shutdown(&self, stream: *mut uv_stream_t) {
        self.invoke(|| unsafe {
            sys::uv_shutdown(
                self.raw(),
                stream,
                Some(default_callback::<ShutdownReq, ShutdownEvent>),
            )
        });
    }
}

impl EventEmitter for ShutdownReq {
    fn emitter(&self) -> &Emitter<Self> {
        self.resource.emitter()
    }
}

impl Request for ShutdownReq {
    type Raw = uv_shutdown_t;

    fn resource(&self) -> &Resource<Self, uv_shutdown_t> {
        &self.resource
    }
}

impl FromLoop for ShutdownReq {
    fn from_loop(lp: &Rc<Loop>) -> Rc<Self> {
        ShutdownReq::new(lp)
    }
}
