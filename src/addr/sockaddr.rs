use std::ffi::{CStr, CString};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

/// Calls `f` with a pointer to the raw sockaddr for `addr` and its size.
///
/// The sockaddr lives on this stack frame, so the pointer is only valid
/// inside the closure.
pub(crate) fn with_raw<F, R>(addr: &SocketAddr, f: F) -> R
where
	F: FnOnce(*const libc::sockaddr, libc::socklen_t) -> R,
{
	match addr {
		SocketAddr::V4(a) => {
			let raw = v4_to_raw(a);
			let len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
			f(&raw as *const _ as *const libc::sockaddr, len)
		}
		SocketAddr::V6(a) => {
			let raw = v6_to_raw(a);
			let len = std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t;
			f(&raw as *const _ as *const libc::sockaddr, len)
		}
	}
}

fn v4_to_raw(addr: &SocketAddrV4) -> libc::sockaddr_in {
	let mut raw: libc::sockaddr_in = unsafe { std::mem::zeroed() };
	raw.sin_family = libc::AF_INET as libc::sa_family_t;
	raw.sin_port = addr.port().to_be();
	raw.sin_addr = libc::in_addr {
		s_addr: u32::from_be_bytes(addr.ip().octets()).to_be(),
	};
	raw
}

fn v6_to_raw(addr: &SocketAddrV6) -> libc::sockaddr_in6 {
	let mut raw: libc::sockaddr_in6 = unsafe { std::mem::zeroed() };
	raw.sin6_family = libc::AF_INET6 as libc::sa_family_t;
	raw.sin6_port = addr.port().to_be();
	raw.sin6_flowinfo = addr.flowinfo();
	raw.sin6_addr = libc::in6_addr { s6_addr: addr.ip().octets() };
	raw.sin6_scope_id = addr.scope_id();
	raw
}

/// Reads a socket address the kernel wrote into `storage`.
///
/// Returns `None` for families other than `AF_INET`/`AF_INET6` or a
/// truncated length.
pub(crate) fn from_storage(storage: &libc::sockaddr_storage, len: libc::socklen_t) -> Option<SocketAddr> {
	match storage.ss_family as libc::c_int {
		libc::AF_INET => {
			if (len as usize) < std::mem::size_of::<libc::sockaddr_in>() {
				return None;
			}
			let raw = unsafe { &*(storage as *const _ as *const libc::sockaddr_in) };
			let ip = Ipv4Addr::from(raw.sin_addr.s_addr.to_ne_bytes());
			Some(SocketAddr::new(IpAddr::V4(ip), u16::from_be(raw.sin_port)))
		}
		libc::AF_INET6 => {
			if (len as usize) < std::mem::size_of::<libc::sockaddr_in6>() {
				return None;
			}
			let raw = unsafe { &*(storage as *const _ as *const libc::sockaddr_in6) };
			Some(SocketAddr::V6(SocketAddrV6::new(
				Ipv6Addr::from(raw.sin6_addr.s6_addr),
				u16::from_be(raw.sin6_port),
				raw.sin6_flowinfo,
				raw.sin6_scope_id,
			)))
		}
		_ => None,
	}
}

/// Interface name or decimal index → scope id. Unknown names give 0.
pub(crate) fn zone_to_index(zone: &str) -> u32 {
	if zone.is_empty() {
		return 0;
	}
	if let Ok(name) = CString::new(zone) {
		let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
		if index != 0 {
			return index;
		}
	}
	zone.parse().unwrap_or(0)
}

/// Scope id → interface name, or the decimal index if it has none.
pub(crate) fn index_to_zone(index: u32) -> String {
	if index == 0 {
		return String::new();
	}
	let mut buf = [0 as libc::c_char; libc::IF_NAMESIZE];
	let name = unsafe { libc::if_indextoname(index, buf.as_mut_ptr()) };
	if name.is_null() {
		return index.to_string();
	}
	unsafe { CStr::from_ptr(buf.as_ptr()) }.to_string_lossy().into_owned()
}

/*
 ---
  What the kernel hands back in sockaddr_storage:
  ┌────────────┬──────────────────┬──────────────────────────────┐
  │ ss_family  │ cast to          │ fields read                  │
  ├────────────┼──────────────────┼──────────────────────────────┤
  │ AF_INET    │ sockaddr_in      │ sin_addr, sin_port           │
  ├────────────┼──────────────────┼──────────────────────────────┤
  │ AF_INET6   │ sockaddr_in6     │ sin6_addr, port, scope_id    │
  └────────────┴──────────────────┴──────────────────────────────┘
  Ports are network byte order in both, hence u16::from_be.
 ---
*/
