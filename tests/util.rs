use std::convert::TryFrom;
use std::net::SocketAddr;

use uvrx::util::{ip4_addr, ip6_addr};
use uvrx::{Addr, TcpFlags};

#[test]
fn test_addr() {
    let addr = Addr::new("127.0.0.1", 8080);
    assert_eq!(addr.to_string(), "127.0.0.1:8080");
    assert_eq!(
        addr.to_socket_addr().unwrap(),
        "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
    );

    let addr = Addr::new("::1", 80);
    assert_eq!(addr.to_string(), "[::1]:80");
    assert_eq!(SocketAddr::try_from(&addr).unwrap().port(), 80);

    let addr = Addr::from("[::1]:443".parse::<SocketAddr>().unwrap());
    assert_eq!(addr, Addr::new("::1", 443));

    let err = Addr::new("localhost", 80).to_socket_addr().unwrap_err();
    assert!(err.to_string().starts_with("Invalid address"));
}

#[test]
fn test_ip_addr() {
    let sin = ip4_addr("10.0.0.1", 9000).unwrap();
    assert_eq!(sin.sin_family, libc::AF_INET as libc::sa_family_t);
    assert_eq!(u16::from_be(sin.sin_port), 9000);
    assert_eq!(u32::from_be(sin.sin_addr.s_addr), 0x0a00_0001);
    assert!(ip4_addr("::1", 9000).is_err());

    let sin6 = ip6_addr("::1", 9000).unwrap();
    assert_eq!(sin6.sin6_family, libc::AF_INET6 as libc::sa_family_t);
    assert_eq!(sin6.sin6_addr.s6_addr[15], 1);
    assert!(ip6_addr("10.0.0.1", 9000).is_err());
}

#[test]
fn test_tcp_flags() {
    assert_eq!(TcpFlags::empty().bits(), 0);
    assert_eq!(TcpFlags::IPV6ONLY.bits(), 1);
    assert_eq!(TcpFlags::from_bits(1), Some(TcpFlags::IPV6ONLY));
    assert_eq!(TcpFlags::from_bits(2), None);
}
