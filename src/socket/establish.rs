//! Turning a network token and addresses into an open listener or
//! connection.

use std::time::Instant;

use crate::addr::{Family, Network, SctpAddr};
use crate::error::SctpError;
use super::builder::{BufferConfig, SctpConfig};
use super::conn::SctpConn;
use super::listener::SctpListener;
use super::provider::{OpenParams, Role, SocketHandle, SocketProvider, StackSupport};

/// Chooses the socket family and the IPV6_V6ONLY setting.
///
/// Returns `(family, ipv6_only)`. `ipv6_only` is only meaningful for
/// `Family::V6`.
pub fn select_family(
	net: Network,
	role: Role,
	local: Option<&SctpAddr>,
	remote: Option<&SctpAddr>,
	stack: StackSupport,
) -> Result<(Family, bool), SctpError> {
	match net {
		Network::Sctp4 => return Ok((Family::V4, false)),
		Network::Sctp6 => return Ok((Family::V6, true)),
		Network::Sctp => {}
	}

	// A wildcard listener goes dual-stack when the host can do it.
	if role == Role::Listen && local.is_none_or(SctpAddr::is_wildcard) {
		if stack.ipv4_mapped || !stack.ipv4 {
			return Ok((Family::V6, false));
		}
		return Ok((local.map_or(Family::V4, SctpAddr::family), false));
	}

	let specific_local = local.filter(|a| !a.is_wildcard());
	match (specific_local, remote) {
		(Some(l), Some(r)) if l.family() != r.family() => Err(SctpError::FamilyMismatch {
			addr: l.to_string(),
			reason: "mismatched local address type",
		}),
		(Some(a), _) | (None, Some(a)) => Ok((a.family(), false)),
		(None, None) => Ok((Family::V4, false)),
	}
}

pub(crate) struct ListenSettings {
	pub backlog: i32,
	pub reuse_addr: bool,
	pub buffers: BufferConfig,
}

pub(crate) struct DialSettings {
	pub deadline: Option<Instant>,
	pub sctp: SctpConfig,
	pub buffers: BufferConfig,
}

/// Opens a listener on `local`, or on the wildcard with an ephemeral
/// port when `local` is absent.
pub(crate) fn listen_with<P: SocketProvider>(
	provider: &P,
	net: Network,
	local: Option<&SctpAddr>,
	settings: &ListenSettings,
) -> Result<SctpListener<P::Handle>, SctpError> {
	let wildcard = SctpAddr::wildcard(0);
	let local = local.unwrap_or(&wildcard);
	let (family, ipv6_only) = select_family(net, Role::Listen, Some(local), None, provider.stack())?;

	let params = OpenParams {
		family,
		ipv6_only,
		sotype: libc::SOCK_STREAM,
		protocol: libc::IPPROTO_SCTP,
		local: Some(local.to_socket_addr(family)?),
		remote: None,
		role: Role::Listen,
		backlog: settings.backlog,
		reuse_addr: settings.reuse_addr,
		buffers: settings.buffers,
		deadline: None,
	};
	let fd = provider.open(&params)?;

	let laddr = if local.port() == 0 {
		let bound = fd.local_addr()?;
		local.with_port(bound.port())
	} else {
		local.clone()
	};
	log::debug!("listening on {} {}", net, laddr);
	Ok(SctpListener::new(fd, net, laddr))
}

/// Connects to `remote`, optionally from `local`.
pub(crate) fn dial_with<P: SocketProvider>(
	provider: &P,
	net: Network,
	local: Option<&SctpAddr>,
	remote: Option<&SctpAddr>,
	settings: &DialSettings,
) -> Result<SctpConn<P::Handle>, SctpError> {
	let remote = remote.ok_or(SctpError::MissingAddress)?;
	let (family, ipv6_only) = select_family(net, Role::Dial, local, Some(remote), provider.stack())?;

	let params = OpenParams {
		family,
		ipv6_only,
		sotype: libc::SOCK_STREAM,
		protocol: libc::IPPROTO_SCTP,
		local: local.map(|a| a.to_socket_addr(family)).transpose()?,
		remote: Some(remote.to_socket_addr(family)?),
		role: Role::Dial,
		backlog: 0,
		reuse_addr: false,
		buffers: settings.buffers,
		deadline: settings.deadline,
	};
	let fd = provider.open(&params)?;

	let laddr = fd.local_addr().ok().map(SctpAddr::from);
	let raddr = fd.peer_addr().map(SctpAddr::from).unwrap_or_else(|_| remote.clone());
	let conn = SctpConn::new(fd, net, laddr, Some(raddr));

	// on failure `conn` is dropped here, which closes the socket
	settings.sctp.apply(conn.handle())?;

	log::debug!("dialed {} {}", net, remote);
	Ok(conn)
}

/*
 ---
  Family selection:
  ┌─────────┬──────────────────────────────┬───────────────────────────────┐
  │ Network │ Case                         │ Result                        │
  ├─────────┼──────────────────────────────┼───────────────────────────────┤
  │ sctp4   │ any                          │ V4                            │
  ├─────────┼──────────────────────────────┼───────────────────────────────┤
  │ sctp6   │ any                          │ V6, V6ONLY                    │
  ├─────────┼──────────────────────────────┼───────────────────────────────┤
  │ sctp    │ listen on wildcard / nothing │ V6 dual-stack if mapped works │
  │         │                              │ or no IPv4, else local family │
  ├─────────┼──────────────────────────────┼───────────────────────────────┤
  │ sctp    │ otherwise                    │ family of the specific        │
  │         │                              │ addresses, V4 if none         │
  └─────────┴──────────────────────────────┴───────────────────────────────┘
 ---
*/

#[cfg(test)]
mod tests {
	use super::*;

	const FULL: StackSupport = StackSupport { ipv4: true, ipv6: true, ipv4_mapped: true };
	const NO_MAPPED: StackSupport = StackSupport { ipv4: true, ipv6: true, ipv4_mapped: false };
	const V6_ONLY_HOST: StackSupport = StackSupport { ipv4: false, ipv6: true, ipv4_mapped: false };

	fn addr(s: &str) -> SctpAddr {
		SctpAddr::new(s.parse().unwrap(), 0)
	}

	#[test]
	fn explicit_families_ignore_addresses() {
		let v6 = addr("::1");
		assert_eq!(
			select_family(Network::Sctp4, Role::Dial, None, Some(&v6), FULL).unwrap(),
			(Family::V4, false)
		);
		assert_eq!(
			select_family(Network::Sctp6, Role::Listen, None, None, FULL).unwrap(),
			(Family::V6, true)
		);
	}

	#[test]
	fn wildcard_listen() {
		let cases: &[(Option<SctpAddr>, StackSupport, Family)] = &[
			(None, FULL, Family::V6),
			(Some(addr("0.0.0.0")), FULL, Family::V6),
			(Some(addr("::")), FULL, Family::V6),
			(None, V6_ONLY_HOST, Family::V6),
			(None, NO_MAPPED, Family::V4),
			(Some(addr("0.0.0.0")), NO_MAPPED, Family::V4),
			(Some(addr("::")), NO_MAPPED, Family::V6),
			(Some(addr("::ffff:0.0.0.0")), NO_MAPPED, Family::V4),
		];
		for (local, stack, want) in cases {
			let got = select_family(Network::Sctp, Role::Listen, local.as_ref(), None, *stack).unwrap();
			assert_eq!(got, (*want, false), "local {:?} stack {:?}", local, stack);
		}
	}

	#[test]
	fn specific_addresses_pick_their_family() {
		let cases: &[(Role, Option<&str>, Option<&str>, Family)] = &[
			(Role::Listen, Some("127.0.0.1"), None, Family::V4),
			(Role::Listen, Some("::ffff:127.0.0.1"), None, Family::V4),
			(Role::Listen, Some("::1"), None, Family::V6),
			(Role::Dial, None, Some("127.0.0.1"), Family::V4),
			(Role::Dial, None, Some("::1"), Family::V6),
			(Role::Dial, Some("0.0.0.0"), Some("::1"), Family::V6),
			(Role::Dial, Some("::1"), Some("::1"), Family::V6),
			(Role::Dial, None, None, Family::V4),
		];
		for (role, local, remote, want) in cases {
			let local = local.map(addr);
			let remote = remote.map(addr);
			let got = select_family(Network::Sctp, *role, local.as_ref(), remote.as_ref(), FULL).unwrap();
			assert_eq!(got.0, *want, "{:?} {:?} -> {:?}", role, local, remote);
		}
	}

	#[test]
	fn mismatched_local_and_remote() {
		let local = addr("127.0.0.1");
		let remote = addr("::1");
		match select_family(Network::Sctp, Role::Dial, Some(&local), Some(&remote), FULL) {
			Err(SctpError::FamilyMismatch { reason, .. }) => {
				assert_eq!(reason, "mismatched local address type")
			}
			other => panic!("unexpected {:?}", other),
		}
	}
}
