//! Error types.
use std::borrow::Cow;
use std::fmt;
use std::io;
use std::net::AddrParseError;
use std::os::raw::c_int;

use derive_more::{Display, From};

use crate::sys;

/// Failure reported by the engine, published to the listeners of the
/// object whose operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorEvent {
    ec: c_int,
}

impl ErrorEvent {
    /// Wraps a status code.
    pub fn new(ec: c_int) -> Self {
        ErrorEvent { ec }
    }

    /// Engine code of the platform dependent error code `sys`.
    ///
    /// Values that already are engine codes are returned unchanged.
    pub fn translate(sys: c_int) -> c_int {
        sys::uv_translate_sys_error(sys)
    }

    /// Error message.
    pub fn what(&self) -> Cow<'static, str> {
        match sys::uv_strerror(self.ec) {
            Some(msg) => Cow::Borrowed(msg),
            None => Cow::Owned(format!("Unknown system error {}", self.ec)),
        }
    }

    /// Symbolic error name, `"UNKNOWN"` for unknown codes.
    pub fn name(&self) -> &'static str {
        sys::uv_err_name(self.ec).unwrap_or("UNKNOWN")
    }

    /// Raw status code.
    pub fn code(&self) -> c_int {
        self.ec
    }

    /// Whether the code denotes an error.
    pub fn is_error(&self) -> bool {
        self.ec < 0
    }
}

impl From<c_int> for ErrorEvent {
    fn from(ec: c_int) -> Self {
        ErrorEvent::new(ec)
    }
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name(), self.what())
    }
}

impl std::error::Error for ErrorEvent {}

/// Errors of operations that do not complete through the loop.
#[derive(Debug, Display, From)]
pub enum Error {
    /// Operating system error
    #[display(fmt = "{}", _0)]
    Io(io::Error),

    /// Invalid IP address
    #[display(fmt = "Invalid address: {}", _0)]
    AddrParse(AddrParseError),

    /// Engine status
    #[display(fmt = "{}", _0)]
    Status(ErrorEvent),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::AddrParse(e) => Some(e),
            Error::Status(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_event() {
        let err = ErrorEvent::new(sys::UV_EADDRINUSE);
        assert!(err.is_error());
        assert_eq!(err.name(), "EADDRINUSE");
        assert_eq!(err.what(), "address already in use");
        assert_eq!(err.to_string(), "EADDRINUSE: address already in use");

        let ok = ErrorEvent::new(0);
        assert!(!ok.is_error());
    }

    #[test]
    fn test_unknown_code() {
        let err = ErrorEvent::new(-123_456);
        assert_eq!(err.name(), "UNKNOWN");
        assert_eq!(err.what(), "Unknown system error -123456");
    }

    #[test]
    fn test_translate() {
        assert_eq!(ErrorEvent::translate(libc::ECONNRESET), sys::UV_ECONNRESET);
        assert_eq!(ErrorEvent::translate(sys::UV_ECONNRESET), sys::UV_ECONNRESET);
    }

    #[test]
    fn test_error_from() {
        let err: Error = "nope".parse::<std::net::IpAddr>().unwrap_err().into();
        assert!(err.to_string().starts_with("Invalid address"));
        let err: Error = ErrorEvent::new(sys::UV_EOF).into();
        assert_eq!(err.to_string(), "EOF: end of file");
    }
}
