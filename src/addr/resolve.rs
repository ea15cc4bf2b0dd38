use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use super::{Network, SctpAddr, sockaddr};
use crate::error::SctpError;

/// One IP a host name resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIp {
	pub ip: IpAddr,
	/// IPv6 zone, empty when unscoped.
	pub zone: String,
}

/// Expands a host name into IP addresses.
///
/// Only called for hosts that are not IP literals. Results are used in
/// the order returned.
pub trait Resolver {
	fn lookup_host(&self, host: &str) -> Result<Vec<ResolvedIp>, SctpError>;
}

/// Resolver backed by the system's `getaddrinfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
	fn lookup_host(&self, host: &str) -> Result<Vec<ResolvedIp>, SctpError> {
		let addrs = (host, 0u16).to_socket_addrs()?;
		let mut out: Vec<ResolvedIp> = Vec::new();
		for addr in addrs {
			let resolved = match addr {
				SocketAddr::V4(v4) => ResolvedIp { ip: IpAddr::V4(*v4.ip()), zone: String::new() },
				SocketAddr::V6(v6) => ResolvedIp {
					ip: IpAddr::V6(*v6.ip()),
					zone: sockaddr::index_to_zone(v6.scope_id()),
				},
			};
			// getaddrinfo repeats each address once per socket type
			if !out.contains(&resolved) {
				out.push(resolved);
			}
		}
		Ok(out)
	}
}

const MISSING_PORT: &str = "missing port in address";
const TOO_MANY_COLONS: &str = "too many colons in address";

fn parse_err(addr: &str, reason: &'static str) -> SctpError {
	SctpError::AddressParse { addr: addr.to_string(), reason }
}

/// Splits `host:port`, `[host]:port` or `[host%zone]:port`.
///
/// The brackets are stripped from the host; the zone is left attached.
pub fn split_host_port(hostport: &str) -> Result<(&str, &str), SctpError> {
	let colon = hostport.rfind(':').ok_or_else(|| parse_err(hostport, MISSING_PORT))?;

	let (host, host_start, host_end) = if hostport.starts_with('[') {
		let end = hostport.find(']').ok_or_else(|| parse_err(hostport, "missing ']' in address"))?;
		if end + 1 == hostport.len() {
			return Err(parse_err(hostport, MISSING_PORT));
		}
		if end + 1 != colon {
			if hostport.as_bytes()[end + 1] == b':' {
				return Err(parse_err(hostport, TOO_MANY_COLONS));
			}
			return Err(parse_err(hostport, MISSING_PORT));
		}
		(&hostport[1..end], 1, end + 1)
	} else {
		let host = &hostport[..colon];
		if host.contains(':') {
			return Err(parse_err(hostport, TOO_MANY_COLONS));
		}
		(host, 0, 0)
	};

	if hostport[host_start..].contains('[') {
		return Err(parse_err(hostport, "unexpected '[' in address"));
	}
	if hostport[host_end..].contains(']') {
		return Err(parse_err(hostport, "unexpected ']' in address"));
	}
	Ok((host, &hostport[colon + 1..]))
}

/// Parses a numeric port. An empty port means 0.
fn parse_port(addr: &str, port: &str) -> Result<u16, SctpError> {
	if port.is_empty() {
		return Ok(0);
	}
	let (negative, digits) = match port.as_bytes()[0] {
		b'-' => (true, &port[1..]),
		b'+' => (false, &port[1..]),
		_ => (false, port),
	};
	if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
		return Err(parse_err(addr, "unknown port"));
	}
	match digits.parse::<u16>() {
		Ok(0) => Ok(0),
		Ok(n) if !negative => Ok(n),
		_ => Err(parse_err(addr, "invalid port")),
	}
}

/// Interprets `host` as an IP literal, with an optional `%zone`.
///
/// Returns `None` when the host is a name that needs resolving.
fn parse_literal(addr: &str, host: &str) -> Option<Result<ResolvedIp, SctpError>> {
	let (ip, zone) = match host.rfind('%') {
		Some(i) => (&host[..i], &host[i + 1..]),
		None => (host, ""),
	};
	match ip.parse::<IpAddr>() {
		Ok(IpAddr::V4(_)) if !zone.is_empty() => Some(Err(parse_err(addr, "IPv4 address with zone"))),
		Ok(ip) => Some(Ok(ResolvedIp { ip, zone: zone.to_string() })),
		Err(_) if host.contains('%') => Some(Err(parse_err(addr, "invalid IP address"))),
		Err(_) => None,
	}
}

/// Resolves `address` into every candidate usable on `network`, in
/// resolver order. Used for dialing.
pub fn resolve_addrs_with<R: Resolver + ?Sized>(
	resolver: &R,
	network: Network,
	address: &str,
) -> Result<Vec<SctpAddr>, SctpError> {
	let (host, port) = split_host_port(address)?;
	let port = parse_port(address, port)?;

	if host.is_empty() {
		return Ok(vec![SctpAddr::wildcard(port)]);
	}

	let ips = match parse_literal(address, host) {
		Some(literal) => vec![literal?],
		None => resolver.lookup_host(host)?,
	};

	let addrs: Vec<SctpAddr> = ips
		.into_iter()
		.filter(|r| network.admits(&r.ip))
		.map(|r| SctpAddr::from_parts(Some(r.ip), port, r.zone))
		.collect();

	if addrs.is_empty() {
		return Err(SctpError::NoSuitableAddress);
	}
	Ok(addrs)
}

/// Resolves `address` into exactly one address usable on `network`.
///
/// When several candidates survive, the first in resolver order wins.
pub fn resolve_addr_with<R: Resolver + ?Sized>(
	resolver: &R,
	network: Network,
	address: &str,
) -> Result<SctpAddr, SctpError> {
	let mut addrs = resolve_addrs_with(resolver, network, address)?;
	Ok(addrs.swap_remove(0))
}
