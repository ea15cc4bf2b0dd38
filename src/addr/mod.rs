//! Endpoint addresses, address families and network tokens.
//!
//! - `SctpAddr`: IP (or wildcard), port and optional IPv6 zone
//! - `Family`: which `AF_*` a socket is opened with
//! - `Network`: the `"sctp"`, `"sctp4"`, `"sctp6"` tokens callers pass in

mod resolve;
mod sockaddr;

pub use self::resolve::{
	Resolver, ResolvedIp, SystemResolver, resolve_addr_with, resolve_addrs_with, split_host_port,
};
pub(crate) use self::sockaddr::{from_storage, with_raw};

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6};
use std::str::FromStr;

use crate::error::SctpError;

/// Address family a socket is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
	V4,
	V6,
}

impl Family {
	/// Returns the libc constant for this address family.
	#[inline]
	pub fn raw(self) -> libc::c_int {
		match self {
			Family::V4 => libc::AF_INET,
			Family::V6 => libc::AF_INET6,
		}
	}
}

/// Network token selecting which families a socket may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Network {
	/// `"sctp"`: either family, dual-stack where the host allows it.
	#[default]
	Sctp,
	/// `"sctp4"`: IPv4 only.
	Sctp4,
	/// `"sctp6"`: IPv6 only.
	Sctp6,
}

impl Network {
	pub fn as_str(self) -> &'static str {
		match self {
			Network::Sctp => "sctp",
			Network::Sctp4 => "sctp4",
			Network::Sctp6 => "sctp6",
		}
	}

	/// Reports whether `ip` can be used on this network.
	pub fn admits(self, ip: &IpAddr) -> bool {
		match self {
			Network::Sctp => true,
			Network::Sctp4 => ip_family(ip) == Family::V4,
			Network::Sctp6 => ip_family(ip) == Family::V6,
		}
	}
}

impl FromStr for Network {
	type Err = SctpError;

	/// An empty string is accepted as an alias for `"sctp"`.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"sctp" | "" => Ok(Network::Sctp),
			"sctp4" => Ok(Network::Sctp4),
			"sctp6" => Ok(Network::Sctp6),
			other => Err(SctpError::UnknownNetwork(other.to_string())),
		}
	}
}

impl fmt::Display for Network {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// The address of an SCTP endpoint.
///
/// An absent IP is the wildcard address. IPv4-mapped IPv6 addresses are
/// kept as written but classified as IPv4.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SctpAddr {
	ip: Option<IpAddr>,
	port: u16,
	zone: String,
}

impl SctpAddr {
	pub fn new(ip: IpAddr, port: u16) -> Self {
		Self { ip: Some(ip), port, zone: String::new() }
	}

	/// Creates a scoped IPv6 address.
	///
	/// `zone` is an interface name (`eth0`) or a decimal interface index.
	pub fn with_zone(ip: IpAddr, port: u16, zone: impl Into<String>) -> Self {
		Self { ip: Some(ip), port, zone: zone.into() }
	}

	/// The wildcard address with the given port.
	pub fn wildcard(port: u16) -> Self {
		Self { ip: None, port, zone: String::new() }
	}

	pub(crate) fn from_parts(ip: Option<IpAddr>, port: u16, zone: String) -> Self {
		Self { ip, port, zone }
	}

	pub fn ip(&self) -> Option<IpAddr> {
		self.ip
	}

	pub fn port(&self) -> u16 {
		self.port
	}

	pub fn zone(&self) -> &str {
		&self.zone
	}

	/// Returns the address's network name, `"sctp"`.
	pub fn network(&self) -> &'static str {
		"sctp"
	}

	/// Same address with a different port.
	pub(crate) fn with_port(&self, port: u16) -> Self {
		Self { ip: self.ip, port, zone: self.zone.clone() }
	}

	pub fn is_wildcard(&self) -> bool {
		match self.ip {
			None => true,
			Some(ip) => ip.to_canonical().is_unspecified(),
		}
	}

	/// The family this address naturally belongs to.
	///
	/// The wildcard counts as IPv4, as do IPv4-mapped IPv6 addresses.
	pub fn family(&self) -> Family {
		match &self.ip {
			None => Family::V4,
			Some(ip) => ip_family(ip),
		}
	}

	/// Returns the IP to hand to a socket of the given family.
	///
	/// For IPv4, the wildcard (either family's) becomes `0.0.0.0` and mapped
	/// addresses are unwrapped; a plain IPv6 address cannot be expressed. For IPv6, the
	/// wildcard (either family's) becomes `::` and IPv4 addresses are mapped.
	pub fn ip_for(&self, family: Family) -> Result<IpAddr, SctpError> {
		match family {
			Family::V4 => match self.ip {
				None => Ok(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
				Some(ip) if ip.to_canonical().is_unspecified() => Ok(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
				Some(IpAddr::V4(v4)) => Ok(IpAddr::V4(v4)),
				Some(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
					Some(v4) => Ok(IpAddr::V4(v4)),
					None => Err(SctpError::FamilyMismatch {
						addr: v6.to_string(),
						reason: "non-IPv4 address",
					}),
				},
			},
			Family::V6 => match self.ip {
				None => Ok(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
				Some(IpAddr::V4(v4)) if v4.is_unspecified() => Ok(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
				Some(IpAddr::V6(v6)) if v6.to_ipv4_mapped() == Some(Ipv4Addr::UNSPECIFIED) => {
					Ok(IpAddr::V6(Ipv6Addr::UNSPECIFIED))
				}
				Some(IpAddr::V4(v4)) => Ok(IpAddr::V6(v4.to_ipv6_mapped())),
				Some(IpAddr::V6(v6)) => Ok(IpAddr::V6(v6)),
			},
		}
	}

	/// Converts to a socket address for a socket of the given family.
	///
	/// The zone is resolved to an interface index; unknown names map to 0.
	pub fn to_socket_addr(&self, family: Family) -> Result<SocketAddr, SctpError> {
		match self.ip_for(family)? {
			IpAddr::V4(v4) => Ok(SocketAddr::new(IpAddr::V4(v4), self.port)),
			IpAddr::V6(v6) => {
				let scope_id = sockaddr::zone_to_index(&self.zone);
				Ok(SocketAddr::V6(SocketAddrV6::new(v6, self.port, 0, scope_id)))
			}
		}
	}

	/// Creates from an OS-reported socket address.
	///
	/// A nonzero scope id becomes the interface name, or its decimal
	/// index when the interface has no name.
	pub fn from_socket_addr(addr: SocketAddr) -> Self {
		match addr {
			SocketAddr::V4(v4) => Self::new(IpAddr::V4(*v4.ip()), v4.port()),
			SocketAddr::V6(v6) => Self {
				ip: Some(IpAddr::V6(*v6.ip())),
				port: v6.port(),
				zone: sockaddr::index_to_zone(v6.scope_id()),
			},
		}
	}
}

impl From<SocketAddr> for SctpAddr {
	fn from(addr: SocketAddr) -> Self {
		SctpAddr::from_socket_addr(addr)
	}
}

impl fmt::Display for SctpAddr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.ip {
			None => write!(f, ":{}", self.port),
			Some(IpAddr::V4(v4)) => write!(f, "{}:{}", v4, self.port),
			Some(IpAddr::V6(v6)) if self.zone.is_empty() => write!(f, "[{}]:{}", v6, self.port),
			Some(IpAddr::V6(v6)) => write!(f, "[{}%{}]:{}", v6, self.zone, self.port),
		}
	}
}

fn ip_family(ip: &IpAddr) -> Family {
	match ip {
		IpAddr::V4(_) => Family::V4,
		IpAddr::V6(v6) if v6.to_ipv4_mapped().is_some() => Family::V4,
		IpAddr::V6(_) => Family::V6,
	}
}
