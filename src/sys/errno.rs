//! Engine status codes.
//!
//! Codes are negated `errno` values, the same numbering libuv uses on
//! unix, plus `UV_EOF` for end of stream.
use std::io;
use std::os::raw::c_int;

use fxhash::FxHashMap;
use lazy_static::lazy_static;

macro_rules! uv_errno {
    ($($name:ident = $code:expr, $msg:expr;)*) => {
        $(
            #[allow(missing_docs)]
            pub const $name: c_int = $code;
        )*

        lazy_static! {
            static ref ERRORS: FxHashMap<c_int, (&'static str, &'static str)> = {
                let mut map = FxHashMap::default();
                $(
                    map.insert($name, (&stringify!($name)[3..], $msg));
                )*
                map
            };
        }
    };
}

uv_errno! {
    UV_E2BIG = -libc::E2BIG, "argument list too long";
    UV_EACCES = -libc::EACCES, "permission denied";
    UV_EADDRINUSE = -libc::EADDRINUSE, "address already in use";
    UV_EADDRNOTAVAIL = -libc::EADDRNOTAVAIL, "address not available";
    UV_EAFNOSUPPORT = -libc::EAFNOSUPPORT, "address family not supported";
    UV_EAGAIN = -libc::EAGAIN, "resource temporarily unavailable";
    UV_EALREADY = -libc::EALREADY, "connection already in progress";
    UV_EBADF = -libc::EBADF, "bad file descriptor";
    UV_EBUSY = -libc::EBUSY, "resource busy or locked";
    UV_ECANCELED = -libc::ECANCELED, "operation canceled";
    UV_ECONNABORTED = -libc::ECONNABORTED, "software caused connection abort";
    UV_ECONNREFUSED = -libc::ECONNREFUSED, "connection refused";
    UV_ECONNRESET = -libc::ECONNRESET, "connection reset by peer";
    UV_EHOSTUNREACH = -libc::EHOSTUNREACH, "host is unreachable";
    UV_EINTR = -libc::EINTR, "interrupted system call";
    UV_EINVAL = -libc::EINVAL, "invalid argument";
    UV_EIO = -libc::EIO, "i/o error";
    UV_EISCONN = -libc::EISCONN, "socket is already connected";
    UV_EMFILE = -libc::EMFILE, "too many open files";
    UV_ENETDOWN = -libc::ENETDOWN, "network is down";
    UV_ENETUNREACH = -libc::ENETUNREACH, "network is unreachable";
    UV_ENOBUFS = -libc::ENOBUFS, "no buffer space available";
    UV_ENOMEM = -libc::ENOMEM, "not enough memory";
    UV_ENOSYS = -libc::ENOSYS, "function not implemented";
    UV_ENOTCONN = -libc::ENOTCONN, "socket is not connected";
    UV_ENOTSOCK = -libc::ENOTSOCK, "socket operation on non-socket";
    UV_ENOTSUP = -libc::EOPNOTSUPP, "operation not supported on socket";
    UV_EPERM = -libc::EPERM, "operation not permitted";
    UV_EPIPE = -libc::EPIPE, "broken pipe";
    UV_ETIMEDOUT = -libc::ETIMEDOUT, "connection timed out";
    UV_EOF = -4095, "end of file";
}

/// Maps a platform `errno` value to an engine code.
///
/// Values that are already engine codes (zero or negative) are returned
/// unchanged.
pub fn uv_translate_sys_error(sys: c_int) -> c_int {
    if sys <= 0 {
        sys
    } else {
        -sys
    }
}

/// Symbolic name of `code`, `None` if the code is unknown.
pub fn uv_err_name(code: c_int) -> Option<&'static str> {
    ERRORS.get(&code).map(|(name, _)| *name)
}

/// Message of `code`, `None` if the code is unknown.
pub fn uv_strerror(code: c_int) -> Option<&'static str> {
    ERRORS.get(&code).map(|(_, msg)| *msg)
}

/// Engine code of an I/O error.
pub(crate) fn uv_error(err: &io::Error) -> c_int {
    match err.raw_os_error() {
        Some(errno) => uv_translate_sys_error(errno),
        None => match err.kind() {
            io::ErrorKind::WouldBlock => UV_EAGAIN,
            io::ErrorKind::InvalidInput => UV_EINVAL,
            io::ErrorKind::NotConnected => UV_ENOTCONN,
            io::ErrorKind::BrokenPipe => UV_EPIPE,
            _ => UV_EIO,
        },
    }
}

/// Engine code of the last OS error on this thread.
pub(crate) fn last_error() -> c_int {
    uv_error(&io::Error::last_os_error())
}
