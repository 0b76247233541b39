//! TCP handles and stream operations.
//!
//! Sockets are non-blocking and driven by `poll(2)` in the I/O phase of
//! the loop. Every completion, including failures detected when an
//! operation is submitted, is reported from the loop, never from inside
//! the submitting call.
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::os::raw::{c_char, c_int, c_uint};
use std::os::unix::io::AsRawFd;
use std::time::Duration;
use std::{mem, ptr, slice};

use bitflags::bitflags;
use net2::{TcpBuilder, TcpStreamExt};

use super::errno::{last_error, uv_error};
use super::{
    get_inner, handle_init, uv_close, uv_close_cb, uv_handle_t, uv_handle_type, uv_loop_t,
    uv_req_t, uv_req_type, HandleFlags, LoopInner, UV_EAGAIN, UV_EALREADY, UV_EBADF,
    UV_ECANCELED, UV_EINVAL, UV_EISCONN, UV_ENOBUFS, UV_ENOTCONN, UV_EOF, UV_EPIPE,
};
use crate::util::{from_sockaddr, to_sockaddr};

/// Size suggested to the allocation callback of a read.
const READ_SIZE: usize = 64 * 1024;

/// Reads performed for a single readiness notification.
const MAX_READS: usize = 32;

bitflags! {
    /// Flags accepted by `uv_tcp_bind`.
    pub struct TcpFlags: c_uint {
        /// Disables dual-stack support, only valid with IPv6 addresses.
        const IPV6ONLY = 1;
    }
}

pub type uv_alloc_cb = unsafe extern "C" fn(*mut uv_handle_t, usize, *mut uv_buf_t);
pub type uv_read_cb = unsafe extern "C" fn(*mut uv_stream_t, isize, *const uv_buf_t);
pub type uv_connection_cb = unsafe extern "C" fn(*mut uv_stream_t, c_int);
pub type uv_connect_cb = unsafe extern "C" fn(*mut uv_connect_t, c_int);
pub type uv_write_cb = unsafe extern "C" fn(*mut uv_write_t, c_int);
pub type uv_shutdown_cb = unsafe extern "C" fn(*mut uv_shutdown_t, c_int);

/// Buffer descriptor.
#[repr(C)]
#[derive(Debug)]
pub struct uv_buf_t {
    pub base: *mut c_char,
    pub len: usize,
}

impl Default for uv_buf_t {
    fn default() -> Self {
        uv_buf_init(ptr::null_mut(), 0)
    }
}

/// Builds a buffer descriptor.
pub fn uv_buf_init(base: *mut c_char, len: usize) -> uv_buf_t {
    uv_buf_t { base, len }
}

/// Header shared by stream handles.
#[repr(C)]
#[derive(Default)]
pub struct uv_stream_t {
    pub handle: uv_handle_t,
}

enum Socket {
    Closed,
    Builder(TcpBuilder),
    Listener(TcpListener),
    Connecting(TcpStream),
    Stream(TcpStream),
}

impl Default for Socket {
    fn default() -> Self {
        Socket::Closed
    }
}

struct WritePending {
    req: *mut uv_write_t,
    cb: Option<uv_write_cb>,
    data: Vec<u8>,
    offset: usize,
}

/// TCP handle, usable wherever a `uv_stream_t` is expected.
#[repr(C)]
#[derive(Default)]
pub struct uv_tcp_t {
    pub handle: uv_handle_t,
    socket: Socket,
    family: c_int,
    delayed_error: c_int,
    nodelay: bool,
    keepalive: Option<c_uint>,
    connection_cb: Option<uv_connection_cb>,
    accepted: VecDeque<TcpStream>,
    alloc_cb: Option<uv_alloc_cb>,
    read_cb: Option<uv_read_cb>,
    connect_req: Option<(*mut uv_connect_t, Option<uv_connect_cb>)>,
    write_queue: VecDeque<WritePending>,
    shutdown_req: Option<(*mut uv_shutdown_t, Option<uv_shutdown_cb>)>,
}

macro_rules! stream_req {
    ($($name:ident),*) => {$(
        #[repr(C)]
        pub struct $name {
            pub req: uv_req_t,
            pub handle: *mut uv_stream_t,
        }

        impl Default for $name {
            fn default() -> Self {
                $name {
                    req: uv_req_t::default(),
                    handle: ptr::null_mut(),
                }
            }
        }
    )*};
}

stream_req!(uv_connect_t, uv_write_t, uv_shutdown_t);

fn read_from(mut stream: &TcpStream, buf: &mut [u8]) -> io::Result<usize> {
    stream.read(buf)
}

fn write_to(mut stream: &TcpStream, buf: &[u8]) -> io::Result<usize> {
    stream.write(buf)
}

fn new_builder(family: c_int) -> io::Result<TcpBuilder> {
    if family == libc::AF_INET6 {
        TcpBuilder::new_v6()
    } else {
        TcpBuilder::new_v4()
    }
}

fn family_of(addr: &SocketAddr) -> c_int {
    match addr {
        SocketAddr::V4(_) => libc::AF_INET,
        SocketAddr::V6(_) => libc::AF_INET6,
    }
}

#[inline]
unsafe fn is_closing(tcp: *const uv_tcp_t) -> bool {
    (*tcp).handle.flags.contains(HandleFlags::CLOSING)
}

unsafe fn as_tcp(stream: *mut uv_stream_t) -> Option<*mut uv_tcp_t> {
    match (*stream).handle.type_ {
        uv_handle_type::UV_TCP => Some(stream as *mut uv_tcp_t),
        _ => None,
    }
}

unsafe fn update_active(tcp: *mut uv_tcp_t) {
    let listening = (*tcp).connection_cb.is_some();
    let busy = listening
        || (*tcp).connect_req.is_some()
        || (*tcp).read_cb.is_some()
        || !(*tcp).write_queue.is_empty()
        || (*tcp).shutdown_req.is_some();
    (*tcp).handle.flags.set(HandleFlags::ACTIVE, busy);
}

unsafe fn stop_reading(tcp: *mut uv_tcp_t) {
    (*tcp).alloc_cb = None;
    (*tcp).read_cb = None;
    update_active(tcp);
}

/// Applies the socket options recorded before the stream existed.
unsafe fn configure_stream(tcp: *mut uv_tcp_t, stream: &TcpStream) {
    if (*tcp).nodelay {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("cannot set TCP_NODELAY: {}", e);
        }
    }
    if let Some(delay) = (*tcp).keepalive {
        let delay = Some(Duration::from_secs(u64::from(delay)));
        if let Err(e) = TcpStreamExt::set_keepalive(stream, delay) {
            debug!("cannot set SO_KEEPALIVE: {}", e);
        }
    }
}

impl LoopInner {
    /// Whether a TCP completion is ready without waiting for I/O.
    pub(super) fn tcp_pending(&self) -> bool {
        self.tcp_handles.borrow().iter().any(|tcp| unsafe {
            (**tcp).delayed_error != 0 && (**tcp).connect_req.is_some()
        })
    }

    fn tcp_registered(&self, tcp: *mut uv_tcp_t) -> bool {
        self.tcp_handles.borrow().iter().any(|h| ptr::eq(*h, tcp))
    }
}

/// Initializes a TCP handle without creating a socket.
///
/// # Safety
///
/// `loop_` must be initialized and `tcp` valid.
pub unsafe extern "C" fn uv_tcp_init(loop_: *mut uv_loop_t, tcp: *mut uv_tcp_t) -> c_int {
    uv_tcp_init_ex(loop_, tcp, libc::AF_UNSPEC as c_uint)
}

/// Initializes a TCP handle. The lower 8 bits of `flags` select the
/// address family; with `AF_INET` or `AF_INET6` the socket is created
/// right away.
///
/// # Safety
///
/// `loop_` must be initialized and `tcp` valid.
pub unsafe extern "C" fn uv_tcp_init_ex(
    loop_: *mut uv_loop_t,
    tcp: *mut uv_tcp_t,
    flags: c_uint,
) -> c_int {
    let family = (flags & 0xff) as c_int;
    if flags & !0xff != 0 {
        return UV_EINVAL;
    }
    let inner = inner_or!(loop_, UV_EINVAL);
    let socket = match family {
        libc::AF_UNSPEC => Socket::Closed,
        libc::AF_INET | libc::AF_INET6 => match new_builder(family) {
            Ok(builder) => Socket::Builder(builder),
            Err(e) => return uv_error(&e),
        },
        _ => return UV_EINVAL,
    };

    let err = handle_init(loop_, tcp as *mut uv_handle_t, uv_handle_type::UV_TCP);
    if err != 0 {
        return err;
    }
    (*tcp).socket = socket;
    (*tcp).family = family;
    (*tcp).delayed_error = 0;
    (*tcp).nodelay = false;
    (*tcp).keepalive = None;
    (*tcp).connection_cb = None;
    (*tcp).accepted.clear();
    (*tcp).alloc_cb = None;
    (*tcp).read_cb = None;
    (*tcp).connect_req = None;
    (*tcp).write_queue.clear();
    (*tcp).shutdown_req = None;
    inner.tcp_handles.borrow_mut().push(tcp);
    0
}

/// Binds the handle to `addr`.
///
/// `UV_EADDRINUSE` is not reported here but by the following
/// `uv_listen` or `uv_tcp_connect`.
///
/// # Safety
///
/// `tcp` must be initialized and `addr` point to a socket address.
pub unsafe extern "C" fn uv_tcp_bind(
    tcp: *mut uv_tcp_t,
    addr: *const libc::sockaddr,
    flags: c_uint,
) -> c_int {
    let addr = match from_sockaddr(addr) {
        Some(addr) => addr,
        None => return UV_EINVAL,
    };
    let flags = TcpFlags::from_bits_truncate(flags);
    if flags.contains(TcpFlags::IPV6ONLY) && addr.is_ipv4() {
        return UV_EINVAL;
    }
    let family = family_of(&addr);
    if (*tcp).family != libc::AF_UNSPEC && (*tcp).family != family {
        return UV_EINVAL;
    }

    if let Socket::Closed = (*tcp).socket {
        match new_builder(family) {
            Ok(builder) => (*tcp).socket = Socket::Builder(builder),
            Err(e) => return uv_error(&e),
        }
        (*tcp).family = family;
    }
    let builder = match &(*tcp).socket {
        Socket::Builder(builder) => builder,
        _ => return UV_EINVAL,
    };

    if let Err(e) = builder.reuse_address(true) {
        return uv_error(&e);
    }
    if addr.is_ipv6() {
        if let Err(e) = builder.only_v6(flags.contains(TcpFlags::IPV6ONLY)) {
            return uv_error(&e);
        }
    }
    match builder.bind(addr) {
        Ok(_) => 0,
        Err(e) => {
            let code = uv_error(&e);
            if code == super::UV_EADDRINUSE {
                (*tcp).delayed_error = code;
                0
            } else {
                code
            }
        }
    }
}

/// Starts connecting to `addr`; `cb` runs once the connection is
/// established or failed.
///
/// # Safety
///
/// `req` must stay valid until `cb` returns; `tcp` must be initialized
/// and `addr` point to a socket address.
pub unsafe extern "C" fn uv_tcp_connect(
    req: *mut uv_connect_t,
    tcp: *mut uv_tcp_t,
    addr: *const libc::sockaddr,
    cb: Option<uv_connect_cb>,
) -> c_int {
    let target = match from_sockaddr(addr) {
        Some(addr) => addr,
        None => return UV_EINVAL,
    };
    if is_closing(tcp) {
        return UV_EINVAL;
    }
    if (*tcp).connect_req.is_some() {
        return UV_EALREADY;
    }
    if (*tcp).delayed_error != 0 {
        return (*tcp).delayed_error;
    }
    let inner = inner_or!((*tcp).handle.loop_, UV_EINVAL);

    let family = family_of(&target);
    let builder = match mem::replace(&mut (*tcp).socket, Socket::Closed) {
        Socket::Builder(builder) => builder,
        Socket::Closed => match new_builder(family) {
            Ok(builder) => builder,
            Err(e) => return uv_error(&e),
        },
        other => {
            let code = match other {
                Socket::Stream(_) | Socket::Connecting(_) => UV_EISCONN,
                _ => UV_EINVAL,
            };
            (*tcp).socket = other;
            return code;
        }
    };

    let stream = match builder.to_tcp_stream() {
        Ok(stream) => stream,
        Err(e) => return uv_error(&e),
    };
    if let Err(e) = stream.set_nonblocking(true) {
        return uv_error(&e);
    }

    let (storage, len) = to_sockaddr(&target);
    let rc = libc::connect(
        stream.as_raw_fd(),
        &storage as *const libc::sockaddr_storage as *const libc::sockaddr,
        len,
    );
    if rc != 0 {
        match last_error() {
            code if code == -libc::EINPROGRESS => {}
            code if code == -libc::ECONNREFUSED => (*tcp).delayed_error = code,
            code => return code,
        }
    }

    (*tcp).socket = Socket::Connecting(stream);
    (*tcp).family = family;
    (*req).req.type_ = uv_req_type::UV_CONNECT;
    (*req).handle = tcp as *mut uv_stream_t;
    (*tcp).connect_req = Some((req, cb));
    inner.req_start();
    update_active(tcp);
    0
}

/// Enables or disables Nagle's algorithm.
///
/// # Safety
///
/// `tcp` must be initialized.
pub unsafe extern "C" fn uv_tcp_nodelay(tcp: *mut uv_tcp_t, enable: c_int) -> c_int {
    (*tcp).nodelay = enable != 0;
    match &(*tcp).socket {
        Socket::Stream(stream) => match stream.set_nodelay(enable != 0) {
            Ok(()) => 0,
            Err(e) => uv_error(&e),
        },
        _ => 0,
    }
}

/// Enables or disables keep-alive; `delay` is the initial delay in
/// seconds.
///
/// # Safety
///
/// `tcp` must be initialized.
pub unsafe extern "C" fn uv_tcp_keepalive(tcp: *mut uv_tcp_t, enable: c_int, delay: c_uint) -> c_int {
    if enable != 0 && delay == 0 {
        return UV_EINVAL;
    }
    (*tcp).keepalive = if enable != 0 { Some(delay) } else { None };
    match &(*tcp).socket {
        Socket::Stream(stream) => {
            let delay = (*tcp).keepalive.map(|d| Duration::from_secs(u64::from(d)));
            match TcpStreamExt::set_keepalive(stream, delay) {
                Ok(()) => 0,
                Err(e) => uv_error(&e),
            }
        }
        _ => 0,
    }
}

/// Accepted for compatibility, accepting is always done one connection
/// at a time per notification.
///
/// # Safety
///
/// `tcp` must be initialized.
pub unsafe extern "C" fn uv_tcp_simultaneous_accepts(_tcp: *mut uv_tcp_t, _enable: c_int) -> c_int {
    0
}

/// Resets the connection by closing with `SO_LINGER` set to zero.
///
/// # Safety
///
/// `tcp` must be initialized and not closing.
pub unsafe extern "C" fn uv_tcp_close_reset(tcp: *mut uv_tcp_t, close_cb: Option<uv_close_cb>) -> c_int {
    if (*tcp).shutdown_req.is_some() {
        return UV_EINVAL;
    }
    if let Socket::Stream(stream) = &(*tcp).socket {
        let linger = libc::linger {
            l_onoff: 1,
            l_linger: 0,
        };
        let rc = libc::setsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_LINGER,
            &linger as *const libc::linger as *const libc::c_void,
            mem::size_of::<libc::linger>() as libc::socklen_t,
        );
        if rc != 0 {
            return last_error();
        }
    }
    uv_close(tcp as *mut uv_handle_t, close_cb);
    0
}

/// Local address of the handle.
///
/// # Safety
///
/// `tcp` must be initialized; `name` must have room for a
/// `sockaddr_storage` and `namelen` be writable.
pub unsafe extern "C" fn uv_tcp_getsockname(
    tcp: *const uv_tcp_t,
    name: *mut libc::sockaddr,
    namelen: *mut c_int,
) -> c_int {
    let addr = match &(*tcp).socket {
        Socket::Builder(builder) => builder.local_addr(),
        Socket::Listener(listener) => listener.local_addr(),
        Socket::Connecting(stream) | Socket::Stream(stream) => stream.local_addr(),
        Socket::Closed => return UV_EBADF,
    };
    match addr {
        Ok(addr) => {
            write_sockaddr(&addr, name, namelen);
            0
        }
        Err(e) => uv_error(&e),
    }
}

/// Remote address of a connected handle.
///
/// # Safety
///
/// `tcp` must be initialized; `name` must have room for a
/// `sockaddr_storage` and `namelen` be writable.
pub unsafe extern "C" fn uv_tcp_getpeername(
    tcp: *const uv_tcp_t,
    name: *mut libc::sockaddr,
    namelen: *mut c_int,
) -> c_int {
    match &(*tcp).socket {
        Socket::Stream(stream) => match stream.peer_addr() {
            Ok(addr) => {
                write_sockaddr(&addr, name, namelen);
                0
            }
            Err(e) => uv_error(&e),
        },
        _ => UV_ENOTCONN,
    }
}

unsafe fn write_sockaddr(addr: &SocketAddr, name: *mut libc::sockaddr, namelen: *mut c_int) {
    let (storage, len) = to_sockaddr(addr);
    ptr::copy_nonoverlapping(
        &storage as *const libc::sockaddr_storage as *const u8,
        name as *mut u8,
        len as usize,
    );
    *namelen = len as c_int;
}

/// Starts listening; `cb` runs for every incoming connection.
///
/// # Safety
///
/// `stream` must be an initialized TCP handle.
pub unsafe extern "C" fn uv_listen(
    stream: *mut uv_stream_t,
    backlog: c_int,
    cb: Option<uv_connection_cb>,
) -> c_int {
    let tcp = match as_tcp(stream) {
        Some(tcp) => tcp,
        None => return UV_EINVAL,
    };
    if cb.is_none() || is_closing(tcp) {
        return UV_EINVAL;
    }
    if (*tcp).delayed_error != 0 {
        return (*tcp).delayed_error;
    }

    match mem::replace(&mut (*tcp).socket, Socket::Closed) {
        Socket::Listener(listener) => (*tcp).socket = Socket::Listener(listener),
        Socket::Closed => {
            let builder = match new_builder(libc::AF_INET) {
                Ok(builder) => builder,
                Err(e) => return uv_error(&e),
            };
            let listener = builder
                .reuse_address(true)
                .and_then(|b| b.bind("0.0.0.0:0"))
                .and_then(|b| b.listen(backlog));
            match listener {
                Ok(listener) => (*tcp).socket = Socket::Listener(listener),
                Err(e) => return uv_error(&e),
            }
        }
        Socket::Builder(builder) => match builder.listen(backlog) {
            Ok(listener) => (*tcp).socket = Socket::Listener(listener),
            Err(e) => {
                (*tcp).socket = Socket::Builder(builder);
                return uv_error(&e);
            }
        },
        other => {
            (*tcp).socket = other;
            return UV_EINVAL;
        }
    }

    if let Socket::Listener(listener) = &(*tcp).socket {
        if let Err(e) = listener.set_nonblocking(true) {
            return uv_error(&e);
        }
    }
    (*tcp).connection_cb = cb;
    update_active(tcp);
    0
}

/// Moves a pending connection of `server` into `client`.
///
/// # Safety
///
/// Both handles must be initialized TCP handles.
pub unsafe extern "C" fn uv_accept(server: *mut uv_stream_t, client: *mut uv_stream_t) -> c_int {
    let (server, client) = match (as_tcp(server), as_tcp(client)) {
        (Some(server), Some(client)) => (server, client),
        _ => return UV_EINVAL,
    };
    match (*client).socket {
        Socket::Closed | Socket::Builder(_) => {}
        _ => return UV_EISCONN,
    }
    let stream = match (*server).accepted.pop_front() {
        Some(stream) => stream,
        None => return UV_EAGAIN,
    };
    configure_stream(client, &stream);
    (*client).socket = Socket::Stream(stream);
    (*client)
        .handle
        .flags
        .insert(HandleFlags::READABLE | HandleFlags::WRITABLE);
    0
}

/// Starts reading. `alloc_cb` provides a buffer for every read, `read_cb`
/// receives the number of bytes read, `0` if nothing was available,
/// `UV_EOF` at end of stream or a negative error code.
///
/// # Safety
///
/// `stream` must be an initialized stream handle.
pub unsafe extern "C" fn uv_read_start(
    stream: *mut uv_stream_t,
    alloc_cb: Option<uv_alloc_cb>,
    read_cb: Option<uv_read_cb>,
) -> c_int {
    let tcp = match as_tcp(stream) {
        Some(tcp) => tcp,
        None => return UV_EINVAL,
    };
    if alloc_cb.is_none() || read_cb.is_none() || is_closing(tcp) {
        return UV_EINVAL;
    }
    if !(*tcp).handle.flags.contains(HandleFlags::READABLE) {
        return UV_ENOTCONN;
    }
    (*tcp).alloc_cb = alloc_cb;
    (*tcp).read_cb = read_cb;
    update_active(tcp);
    0
}

/// Stops reading.
///
/// # Safety
///
/// `stream` must be an initialized stream handle.
pub unsafe extern "C" fn uv_read_stop(stream: *mut uv_stream_t) -> c_int {
    if let Some(tcp) = as_tcp(stream) {
        stop_reading(tcp);
    }
    0
}

unsafe fn collect_bufs(bufs: *const uv_buf_t, nbufs: c_uint) -> Vec<u8> {
    let bufs = if nbufs == 0 {
        &[][..]
    } else {
        slice::from_raw_parts(bufs, nbufs as usize)
    };
    let mut data = Vec::with_capacity(bufs.iter().map(|b| b.len).sum());
    for buf in bufs.iter().filter(|b| !b.base.is_null() && b.len > 0) {
        data.extend_from_slice(slice::from_raw_parts(buf.base as *const u8, buf.len));
    }
    data
}

/// Queues `bufs` for writing. The data is copied, the buffers can be
/// released as soon as the call returns.
///
/// # Safety
///
/// `req` must stay valid until `cb` returns; `bufs` must point to
/// `nbufs` buffer descriptors.
pub unsafe extern "C" fn uv_write(
    req: *mut uv_write_t,
    stream: *mut uv_stream_t,
    bufs: *const uv_buf_t,
    nbufs: c_uint,
    cb: Option<uv_write_cb>,
) -> c_int {
    let tcp = match as_tcp(stream) {
        Some(tcp) => tcp,
        None => return UV_EINVAL,
    };
    match (*tcp).socket {
        Socket::Stream(_) => {}
        _ => return UV_EBADF,
    }
    if !(*tcp).handle.flags.contains(HandleFlags::WRITABLE) {
        return UV_EPIPE;
    }
    let inner = inner_or!((*tcp).handle.loop_, UV_EINVAL);

    (*req).req.type_ = uv_req_type::UV_WRITE;
    (*req).handle = stream;
    (*tcp).write_queue.push_back(WritePending {
        req,
        cb,
        data: collect_bufs(bufs, nbufs),
        offset: 0,
    });
    inner.req_start();
    update_active(tcp);
    0
}

/// Writes as much of `bufs` as possible right away.
///
/// Returns the number of bytes written, or `UV_EAGAIN` if nothing could
/// be written or writes are already queued.
///
/// # Safety
///
/// `stream` must be an initialized stream handle; `bufs` must point to
/// `nbufs` buffer descriptors.
pub unsafe extern "C" fn uv_try_write(
    stream: *mut uv_stream_t,
    bufs: *const uv_buf_t,
    nbufs: c_uint,
) -> c_int {
    let tcp = match as_tcp(stream) {
        Some(tcp) => tcp,
        None => return UV_EINVAL,
    };
    if !(*tcp).write_queue.is_empty() {
        return UV_EAGAIN;
    }
    let data = collect_bufs(bufs, nbufs);
    match &(*tcp).socket {
        Socket::Stream(stream) => match write_to(stream, &data) {
            Ok(n) => n as c_int,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => UV_EAGAIN,
            Err(e) => uv_error(&e),
        },
        _ => UV_EBADF,
    }
}

/// Shuts down the write side once the queued writes are done.
///
/// # Safety
///
/// `req` must stay valid until `cb` returns.
pub unsafe extern "C" fn uv_shutdown(
    req: *mut uv_shutdown_t,
    stream: *mut uv_stream_t,
    cb: Option<uv_shutdown_cb>,
) -> c_int {
    let tcp = match as_tcp(stream) {
        Some(tcp) => tcp,
        None => return UV_EINVAL,
    };
    let connected = match (*tcp).socket {
        Socket::Stream(_) => true,
        _ => false,
    };
    if !connected
        || !(*tcp).handle.flags.contains(HandleFlags::WRITABLE)
        || (*tcp).shutdown_req.is_some()
        || is_closing(tcp)
    {
        return UV_ENOTCONN;
    }
    let inner = inner_or!((*tcp).handle.loop_, UV_EINVAL);

    (*req).req.type_ = uv_req_type::UV_SHUTDOWN;
    (*req).handle = stream;
    (*tcp).shutdown_req = Some((req, cb));
    (*tcp).handle.flags.remove(HandleFlags::WRITABLE);
    inner.req_start();
    update_active(tcp);
    0
}

/// Whether the stream can be read from.
///
/// # Safety
///
/// `stream` must be valid.
pub unsafe extern "C" fn uv_is_readable(stream: *const uv_stream_t) -> c_int {
    (*stream).handle.flags.contains(HandleFlags::READABLE) as c_int
}

/// Whether the stream can be written to.
///
/// # Safety
///
/// `stream` must be valid.
pub unsafe extern "C" fn uv_is_writable(stream: *const uv_stream_t) -> c_int {
    (*stream).handle.flags.contains(HandleFlags::WRITABLE) as c_int
}

/// Releases the socket and every callback of a handle being closed.
pub(super) unsafe fn start_close(inner: &LoopInner, tcp: *mut uv_tcp_t) {
    inner
        .tcp_handles
        .borrow_mut()
        .retain(|h| !ptr::eq(*h, tcp));
    (*tcp).socket = Socket::Closed;
    (*tcp).accepted.clear();
    (*tcp).connection_cb = None;
    (*tcp).alloc_cb = None;
    (*tcp).read_cb = None;
    (*tcp)
        .handle
        .flags
        .remove(HandleFlags::READABLE | HandleFlags::WRITABLE);
}

/// Fails the requests still pending on a closed handle.
pub(super) unsafe fn finish_close(inner: &LoopInner, tcp: *mut uv_tcp_t) {
    if let Some((req, cb)) = (*tcp).connect_req.take() {
        inner.req_done();
        if let Some(cb) = cb {
            cb(req, UV_ECANCELED);
        }
    }
    while let Some(pending) = (*tcp).write_queue.pop_front() {
        inner.req_done();
        if let Some(cb) = pending.cb {
            cb(pending.req, UV_ECANCELED);
        }
    }
    if let Some((req, cb)) = (*tcp).shutdown_req.take() {
        inner.req_done();
        if let Some(cb) = cb {
            cb(req, UV_ECANCELED);
        }
    }
}

unsafe fn interest(tcp: *const uv_tcp_t) -> Option<(c_int, libc::c_short)> {
    if is_closing(tcp) {
        return None;
    }
    match &(*tcp).socket {
        Socket::Listener(listener) if (*tcp).connection_cb.is_some() => {
            Some((listener.as_raw_fd(), libc::POLLIN))
        }
        Socket::Connecting(stream) if (*tcp).connect_req.is_some() && (*tcp).delayed_error == 0 => {
            Some((stream.as_raw_fd(), libc::POLLOUT))
        }
        Socket::Stream(stream) => {
            let mut events = 0;
            if (*tcp).read_cb.is_some() {
                events |= libc::POLLIN;
            }
            if !(*tcp).write_queue.is_empty() || (*tcp).shutdown_req.is_some() {
                events |= libc::POLLOUT;
            }
            if events == 0 {
                None
            } else {
                Some((stream.as_raw_fd(), events))
            }
        }
        _ => None,
    }
}

/// Reports connection failures detected when the connect was submitted.
unsafe fn run_delayed(inner: &LoopInner) {
    let handles: Vec<*mut uv_tcp_t> = inner.tcp_handles.borrow().clone();
    for tcp in handles {
        if !inner.tcp_registered(tcp) || is_closing(tcp) || (*tcp).delayed_error == 0 {
            continue;
        }
        if let Some((req, cb)) = (*tcp).connect_req.take() {
            let status = mem::replace(&mut (*tcp).delayed_error, 0);
            (*tcp).socket = Socket::Closed;
            inner.req_done();
            update_active(tcp);
            if let Some(cb) = cb {
                cb(req, status);
            }
        }
    }
}

unsafe fn connect_ready(inner: &LoopInner, tcp: *mut uv_tcp_t) {
    let stream = match mem::replace(&mut (*tcp).socket, Socket::Closed) {
        Socket::Connecting(stream) => stream,
        other => {
            (*tcp).socket = other;
            return;
        }
    };
    let status = match stream.take_error() {
        Ok(None) => 0,
        Ok(Some(e)) | Err(e) => uv_error(&e),
    };
    if status == 0 {
        configure_stream(tcp, &stream);
        (*tcp).socket = Socket::Stream(stream);
        (*tcp)
            .handle
            .flags
            .insert(HandleFlags::READABLE | HandleFlags::WRITABLE);
    }

    if let Some((req, cb)) = (*tcp).connect_req.take() {
        inner.req_done();
        update_active(tcp);
        if let Some(cb) = cb {
            cb(req, status);
        }
    }
}

unsafe fn accept_ready(tcp: *mut uv_tcp_t) {
    let stream = tcp as *mut uv_stream_t;
    loop {
        let accepted = match &(*tcp).socket {
            Socket::Listener(listener) => listener.accept(),
            _ => return,
        };
        match accepted {
            Ok((conn, peer)) => match conn.set_nonblocking(true) {
                Ok(()) => (*tcp).accepted.push_back(conn),
                Err(e) => warn!("dropping connection from {}: {}", peer, e),
            },
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                if let Some(cb) = (*tcp).connection_cb {
                    cb(stream, uv_error(&e));
                }
                return;
            }
        }
    }

    while !(*tcp).accepted.is_empty() && !is_closing(tcp) {
        let cb = match (*tcp).connection_cb {
            Some(cb) => cb,
            None => return,
        };
        let before = (*tcp).accepted.len();
        cb(stream, 0);
        // the callback did not accept, keep the rest for later
        if (*tcp).accepted.len() >= before {
            break;
        }
    }
}

unsafe fn read_ready(tcp: *mut uv_tcp_t) {
    let stream = tcp as *mut uv_stream_t;
    for _ in 0..MAX_READS {
        if is_closing(tcp) {
            return;
        }
        let (alloc_cb, read_cb) = match ((*tcp).alloc_cb, (*tcp).read_cb) {
            (Some(alloc_cb), Some(read_cb)) => (alloc_cb, read_cb),
            _ => return,
        };

        let mut buf = uv_buf_t::default();
        alloc_cb(tcp as *mut uv_handle_t, READ_SIZE, &mut buf);
        if buf.base.is_null() || buf.len == 0 {
            read_cb(stream, UV_ENOBUFS as isize, &buf);
            return;
        }

        let result = match &(*tcp).socket {
            Socket::Stream(conn) => {
                read_from(conn, slice::from_raw_parts_mut(buf.base as *mut u8, buf.len))
            }
            _ => Err(io::ErrorKind::NotConnected.into()),
        };
        match result {
            Ok(0) => {
                (*tcp).handle.flags.remove(HandleFlags::READABLE);
                stop_reading(tcp);
                read_cb(stream, UV_EOF as isize, &buf);
                return;
            }
            Ok(n) => {
                read_cb(stream, n as isize, &buf);
                if n < buf.len {
                    return;
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                read_cb(stream, 0, &buf);
                return;
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {
                read_cb(stream, 0, &buf);
            }
            Err(e) => {
                stop_reading(tcp);
                read_cb(stream, uv_error(&e) as isize, &buf);
                return;
            }
        }
    }
}

unsafe fn complete_write(inner: &LoopInner, tcp: *mut uv_tcp_t, status: c_int) {
    if let Some(pending) = (*tcp).write_queue.pop_front() {
        inner.req_done();
        update_active(tcp);
        if let Some(cb) = pending.cb {
            cb(pending.req, status);
        }
    }
}

unsafe fn write_ready(inner: &LoopInner, tcp: *mut uv_tcp_t) {
    while !is_closing(tcp) {
        let result = {
            let pending = match (*tcp).write_queue.front() {
                Some(pending) => pending,
                None => break,
            };
            let rest = &pending.data[pending.offset..];
            if rest.is_empty() {
                Ok(0)
            } else {
                match &(*tcp).socket {
                    Socket::Stream(conn) => match write_to(conn, rest) {
                        Ok(0) => Err(io::ErrorKind::WriteZero.into()),
                        res => res,
                    },
                    _ => Err(io::ErrorKind::NotConnected.into()),
                }
            }
        };

        match result {
            Ok(n) => {
                let done = match (*tcp).write_queue.front_mut() {
                    Some(pending) => {
                        pending.offset += n;
                        pending.offset >= pending.data.len()
                    }
                    None => false,
                };
                if done {
                    complete_write(inner, tcp, 0);
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(ref e) if e.kind() == io::ErrorKind::WriteZero => complete_write(inner, tcp, UV_EPIPE),
            Err(e) => complete_write(inner, tcp, uv_error(&e)),
        }
    }

    if is_closing(tcp) || !(*tcp).write_queue.is_empty() {
        return;
    }
    if let Some((req, cb)) = (*tcp).shutdown_req.take() {
        let status = match &(*tcp).socket {
            Socket::Stream(conn) => match conn.shutdown(Shutdown::Write) {
                Ok(()) => 0,
                Err(e) => uv_error(&e),
            },
            _ => UV_ENOTCONN,
        };
        inner.req_done();
        update_active(tcp);
        if let Some(cb) = cb {
            cb(req, status);
        }
    }
}

/// Runs one I/O phase. Returns `false` if there was nothing to poll.
pub(super) unsafe fn poll(inner: &LoopInner, timeout: c_int) -> bool {
    run_delayed(inner);

    let handles: Vec<*mut uv_tcp_t> = inner.tcp_handles.borrow().clone();
    let mut fds = Vec::with_capacity(handles.len());
    let mut owners = Vec::with_capacity(handles.len());
    for tcp in handles {
        if let Some((fd, events)) = interest(tcp) {
            fds.push(libc::pollfd {
                fd,
                events,
                revents: 0,
            });
            owners.push(tcp);
        }
    }
    if fds.is_empty() {
        return false;
    }

    let rc = libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout);
    if rc < 0 {
        let code = last_error();
        if code != -libc::EINTR {
            warn!("poll failed: {}", code);
        }
        return true;
    }

    let failed = libc::POLLERR | libc::POLLHUP;
    for (pfd, tcp) in fds.iter().zip(owners) {
        if pfd.revents == 0 {
            continue;
        }
        // closed by a callback of this phase
        if !inner.tcp_registered(tcp) || is_closing(tcp) {
            continue;
        }
        match (*tcp).socket {
            Socket::Listener(_) => accept_ready(tcp),
            Socket::Connecting(_) => connect_ready(inner, tcp),
            Socket::Stream(_) => {
                if pfd.revents & (libc::POLLIN | failed) != 0 {
                    read_ready(tcp);
                }
                if pfd.revents & (libc::POLLOUT | failed) != 0 {
                    write_ready(inner, tcp);
                }
            }
            _ => {}
        }
    }
    true
}
