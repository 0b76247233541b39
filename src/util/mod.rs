//! Address helpers and small utilities shared by the handles.
use std::convert::TryFrom;
use std::fmt;
use std::mem;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use crate::error::Error;

pub(crate) mod cell;

/// Network address as an IP string and a port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Addr {
    /// Textual IP address, either IPv4 or IPv6.
    pub ip: String,
    /// Port number.
    pub port: u16,
}

impl Addr {
    /// Creates an address from its parts.
    pub fn new<T: Into<String>>(ip: T, port: u16) -> Self {
        Addr {
            ip: ip.into(),
            port,
        }
    }

    /// Parses the address into a socket address.
    pub fn to_socket_addr(&self) -> Result<SocketAddr, Error> {
        let ip: IpAddr = self.ip.parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ip.contains(':') {
            write!(f, "[{}]:{}", self.ip, self.port)
        } else {
            write!(f, "{}:{}", self.ip, self.port)
        }
    }
}

impl From<SocketAddr> for Addr {
    fn from(addr: SocketAddr) -> Self {
        Addr::new(addr.ip().to_string(), addr.port())
    }
}

impl TryFrom<&Addr> for SocketAddr {
    type Error = Error;

    fn try_from(addr: &Addr) -> Result<Self, Self::Error> {
        addr.to_socket_addr()
    }
}

/// Builds an IPv4 socket address.
pub fn ip4_addr(ip: &str, port: u16) -> Result<libc::sockaddr_in, Error> {
    let ip: Ipv4Addr = ip.parse()?;
    let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
    sin.sin_family = libc::AF_INET as libc::sa_family_t;
    sin.sin_port = port.to_be();
    sin.sin_addr.s_addr = u32::from(ip).to_be();
    Ok(sin)
}

/// Builds an IPv6 socket address.
pub fn ip6_addr(ip: &str, port: u16) -> Result<libc::sockaddr_in6, Error> {
    let ip: Ipv6Addr = ip.parse()?;
    let mut sin6: libc::sockaddr_in6 = unsafe { mem::zeroed() };
    sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
    sin6.sin6_port = port.to_be();
    sin6.sin6_addr.s6_addr = ip.octets();
    Ok(sin6)
}

/// Converts a socket address into its native form, with its length.
pub fn to_sockaddr(addr: &SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let len = match addr {
        SocketAddr::V4(v4) => {
            let sin = &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr_in;
            unsafe {
                (*sin).sin_family = libc::AF_INET as libc::sa_family_t;
                (*sin).sin_port = v4.port().to_be();
                (*sin).sin_addr.s_addr = u32::from(*v4.ip()).to_be();
            }
            mem::size_of::<libc::sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            let sin6 = &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr_in6;
            unsafe {
                (*sin6).sin6_family = libc::AF_INET6 as libc::sa_family_t;
                (*sin6).sin6_port = v6.port().to_be();
                (*sin6).sin6_addr.s6_addr = v6.ip().octets();
                (*sin6).sin6_flowinfo = v6.flowinfo();
                (*sin6).sin6_scope_id = v6.scope_id();
            }
            mem::size_of::<libc::sockaddr_in6>()
        }
    };
    (storage, len as libc::socklen_t)
}

/// Reads a native socket address, `None` for null pointers and families
/// other than IPv4 and IPv6.
///
/// # Safety
///
/// `addr` must be null or point to a socket address of the size its
/// family implies.
pub unsafe fn from_sockaddr(addr: *const libc::sockaddr) -> Option<SocketAddr> {
    if addr.is_null() {
        return None;
    }
    match c_int_family((*addr).sa_family) {
        libc::AF_INET => {
            let sin = &*(addr as *const libc::sockaddr_in);
            let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
            Some(SocketAddr::V4(SocketAddrV4::new(ip, u16::from_be(sin.sin_port))))
        }
        libc::AF_INET6 => {
            let sin6 = &*(addr as *const libc::sockaddr_in6);
            let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
            Some(SocketAddr::V6(SocketAddrV6::new(
                ip,
                u16::from_be(sin6.sin6_port),
                sin6.sin6_flowinfo,
                sin6.sin6_scope_id,
            )))
        }
        _ => None,
    }
}

fn c_int_family(family: libc::sa_family_t) -> libc::c_int {
    libc::c_int::from(family)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sockaddr_v4() {
        let addr: SocketAddr = "127.0.0.1:4242".parse().unwrap();
        let (storage, len) = to_sockaddr(&addr);
        assert_eq!(len as usize, mem::size_of::<libc::sockaddr_in>());
        let back = unsafe { from_sockaddr(&storage as *const _ as *const libc::sockaddr) };
        assert_eq!(back, Some(addr));
    }

    #[test]
    fn test_sockaddr_v6() {
        let addr: SocketAddr = "[::1]:8080".parse().unwrap();
        let (storage, _) = to_sockaddr(&addr);
        let back = unsafe { from_sockaddr(&storage as *const _ as *const libc::sockaddr) };
        assert_eq!(back, Some(addr));
        assert_eq!(unsafe { from_sockaddr(std::ptr::null()) }, None);
    }

    #[test]
    fn test_ip4_addr() {
        let sin = ip4_addr("10.0.0.1", 80).unwrap();
        assert_eq!(u16::from_be(sin.sin_port), 80);
        assert_eq!(u32::from_be(sin.sin_addr.s_addr), 0x0a00_0001);
        assert!(ip4_addr("::1", 80).is_err());
        assert!(ip6_addr("::1", 80).is_ok());
    }
}
