use std::mem;
use std::net::SocketAddr;
use std::os::raw::{c_int, c_uint};
use std::rc::Rc;
use std::time::Duration;

use super::{close_callback, Handle, Stream};
use crate::emitter::{Emitter, EventEmitter};
use crate::error::ErrorEvent;
use crate::event_loop::{FromLoop, Loop};
use crate::request::{forward, ConnectEvent, ConnectReq};
use crate::resource::Resource;
use crate::sys::{self, uv_tcp_t, TcpFlags};
use crate::util::{from_sockaddr, to_sockaddr, Addr};

/// TCP stream or server.
///
/// Publishes `ConnectEvent`, `ListenEvent`, `DataEvent`, `EndEvent`,
/// `WriteEvent`, `ShutdownEvent`, `CloseEvent` and `ErrorEvent`.
#[derive(Debug)]
pub struct TcpHandle {
    resource: Resource<TcpHandle, uv_tcp_t>,
    flags: c_uint,
}

type NameFn = unsafe extern "C" fn(*const uv_tcp_t, *mut libc::sockaddr, *mut c_int) -> c_int;

impl TcpHandle {
    /// Creates a TCP handle. Call `init` before using it.
    pub fn new(lp: &Rc<Loop>) -> Rc<Self> {
        TcpHandle::with_flags(lp, 0)
    }

    /// Creates a TCP handle whose socket is created by `init`, using the
    /// address family in the lower 8 bits of `flags`.
    pub fn with_flags(lp: &Rc<Loop>, flags: c_uint) -> Rc<Self> {
        Rc::new_cyclic(|this| TcpHandle {
            resource: Resource::new(lp, this),
            flags,
        })
    }

    /// Initializes the handle.
    pub fn init(&self) -> bool {
        let flags = self.flags;
        if flags == 0 {
            self.initialize(|lp, raw| unsafe { sys::uv_tcp_init(lp, raw) })
        } else {
            self.initialize(|lp, raw| unsafe { sys::uv_tcp_init_ex(lp, raw, flags) })
        }
    }

    /// Enables or disables Nagle's algorithm.
    pub fn no_delay(&self, value: bool) -> bool {
        self.initialized() && unsafe { sys::uv_tcp_nodelay(self.raw(), value as c_int) == 0 }
    }

    /// Enables or disables TCP keep-alive, `time` being the initial delay.
    pub fn keep_alive(&self, enable: bool, time: Duration) -> bool {
        let secs = time.as_secs().min(u64::from(c_uint::max_value())) as c_uint;
        self.initialized()
            && unsafe { sys::uv_tcp_keepalive(self.raw(), enable as c_int, secs) == 0 }
    }

    /// Enables or disables simultaneous asynchronous accept requests.
    pub fn simultaneous_accepts(&self, enable: bool) -> bool {
        self.initialized()
            && unsafe { sys::uv_tcp_simultaneous_accepts(self.raw(), enable as c_int) == 0 }
    }

    /// Binds the handle to `addr`.
    pub fn bind(&self, addr: &SocketAddr, opts: TcpFlags) {
        let (storage, _) = to_sockaddr(addr);
        self.invoke(|| unsafe {
            sys::uv_tcp_bind(
                self.raw(),
                &storage as *const libc::sockaddr_storage as *const libc::sockaddr,
                opts.bits(),
            )
        });
    }

    /// Binds the handle to `addr`, publishing `ErrorEvent` if the address
    /// cannot be parsed.
    pub fn bind_addr(&self, addr: &Addr, opts: TcpFlags) {
        match addr.to_socket_addr() {
            Ok(addr) => self.bind(&addr, opts),
            Err(_) => self.emitter().publish(ErrorEvent::new(sys::UV_EINVAL), self),
        }
    }

    fn address(&self, f: NameFn) -> Option<Addr> {
        if !self.initialized() {
            return None;
        }
        let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_storage>() as c_int;
        let name = &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr;
        match unsafe { f(self.raw(), name, &mut len) } {
            0 => unsafe { from_sockaddr(name) }.map(Addr::from),
            _ => None,
        }
    }

    /// Local address, `None` if the handle has none.
    pub fn sock(&self) -> Option<Addr> {
        self.address(sys::uv_tcp_getsockname)
    }

    /// Remote address, `None` unless the handle is connected.
    pub fn peer(&self) -> Option<Addr> {
        self.address(sys::uv_tcp_getpeername)
    }

    /// Connects to `addr`; `ConnectEvent` is published once connected.
    pub fn connect(&self, addr: &SocketAddr) {
        if !self.initialized() {
            self.emitter().publish(ErrorEvent::new(sys::UV_EINVAL), self);
            return;
        }
        if let Some(this) = self.resource.shared() {
            let req = ConnectReq::new(self.event_loop());
            forward::<_, ConnectEvent, _>(&*req, this);
            req.connect(self.raw(), addr);
        }
    }

    /// Connects to `addr`, publishing `ErrorEvent` if the address cannot
    /// be parsed.
    pub fn connect_addr(&self, addr: &Addr) {
        match addr.to_socket_addr() {
            Ok(addr) => self.connect(&addr),
            Err(_) => self.emitter().publish(ErrorEvent::new(sys::UV_EINVAL), self),
        }
    }

    /// Resets the connection with a RST and closes the handle;
    /// `CloseEvent` is published once done.
    pub fn close_reset(&self) {
        if self.resource.self_owned() && !self.closing() {
            self.invoke(|| unsafe {
                sys::uv_tcp_close_reset(self.raw(), Some(close_callback::<TcpHandle>))
            });
        }
    }
}

impl EventEmitter for TcpHandle {
    fn emitter(&self) -> &Emitter<Self> {
        self.resource.emitter()
    }
}

impl Handle for TcpHandle {
    type Raw = uv_tcp_t;

    fn resource(&self) -> &Resource<Self, uv_tcp_t> {
        &self.resource
    }
}

impl Stream for TcpHandle {}

impl FromLoop for TcpHandle {
    fn from_loop(lp: &Rc<Loop>) -> Rc<Self> {
        TcpHandle::new(lp)
    }
}
