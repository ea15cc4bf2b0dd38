use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::OnceLock;

use crate::addr::{Family, with_raw};
use crate::error::SctpError;
use super::fd::NetFd;
use super::options::{set_ipv6_only, set_reuse_addr};
use super::provider::{OpenParams, Role, SocketProvider, StackSupport};

/// Upper bound the kernel accepts for a listen backlog.
const MAX_BACKLOG: i32 = 65535;

/// Opens real kernel sockets.
///
/// Every socket is created with `SOCK_NONBLOCK | SOCK_CLOEXEC` and
/// wrapped in a [`NetFd`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SysProvider;

impl SocketProvider for SysProvider {
	type Handle = NetFd;

	fn stack(&self) -> StackSupport {
		static STACK: OnceLock<StackSupport> = OnceLock::new();
		*STACK.get_or_init(detect_stack)
	}

	fn open(&self, params: &OpenParams) -> Result<NetFd, SctpError> {
		// every early return below drops `fd`, which closes it
		let fd = new_socket(params.family, params.sotype, params.protocol)?;
		if params.family == Family::V6 {
			set_ipv6_only(&fd, params.ipv6_only)?;
		}
		params.buffers.apply(&fd)?;

		match params.role {
			Role::Listen => {
				if params.reuse_addr {
					set_reuse_addr(&fd, true)?;
				}
				let local = params.local.unwrap_or_else(|| unspecified(params.family));
				bind(&fd, &local)?;
				listen(&fd, params.backlog)?;
			}
			Role::Dial => {
				let remote = params.remote.ok_or(SctpError::MissingAddress)?;
				if let Some(local) = params.local {
					bind(&fd, &local)?;
				}
				fd.connect(&remote, params.deadline)?;
			}
		}
		Ok(fd)
	}
}

/// Creates a non-blocking, close-on-exec socket.
fn new_socket(family: Family, sotype: libc::c_int, protocol: libc::c_int) -> Result<NetFd, SctpError> {
	let fd = unsafe {
		libc::socket(family.raw(), sotype | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC, protocol)
	};
	if fd == -1 {
		return Err(SctpError::last_os("socket"));
	}
	Ok(NetFd::new(unsafe { OwnedFd::from_raw_fd(fd) }))
}

fn bind<S: AsRawFd>(socket: &S, addr: &SocketAddr) -> Result<(), SctpError> {
	let result = with_raw(addr, |ptr, len| unsafe { libc::bind(socket.as_raw_fd(), ptr, len) });
	if result == -1 {
		return Err(SctpError::last_os("bind"));
	}
	Ok(())
}

fn listen<S: AsRawFd>(socket: &S, backlog: i32) -> Result<(), SctpError> {
	if unsafe { libc::listen(socket.as_raw_fd(), backlog) } == -1 {
		return Err(SctpError::last_os("listen"));
	}
	Ok(())
}

fn unspecified(family: Family) -> SocketAddr {
	match family {
		Family::V4 => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
		Family::V6 => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
	}
}

/// Finds out which IP families the host can bind.
///
/// Checks with TCP sockets so the answer does not depend on the SCTP
/// module being loaded.
fn detect_stack() -> StackSupport {
	let ipv4 = can_bind(Family::V4, None, SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0));
	let ipv6 = can_bind(Family::V6, Some(true), SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 0));
	let mapped = IpAddr::V6(Ipv4Addr::LOCALHOST.to_ipv6_mapped());
	let ipv4_mapped = can_bind(Family::V6, Some(false), SocketAddr::new(mapped, 0));

	let support = StackSupport { ipv4, ipv6, ipv4_mapped };
	log::trace!("ip stack support: {:?}", support);
	support
}

fn can_bind(family: Family, v6only: Option<bool>, addr: SocketAddr) -> bool {
	let fd = match new_socket(family, libc::SOCK_STREAM, libc::IPPROTO_TCP) {
		Ok(fd) => fd,
		Err(_) => return false,
	};
	if let Some(only) = v6only {
		if set_ipv6_only(&fd, only).is_err() {
			return false;
		}
	}
	bind(&fd, &addr).is_ok()
}

/// The listen backlog to use when none is configured.
///
/// Reads `net.core.somaxconn`, falling back to `SOMAXCONN`.
pub fn max_listener_backlog() -> i32 {
	static BACKLOG: OnceLock<i32> = OnceLock::new();
	*BACKLOG.get_or_init(|| {
		let configured = std::fs::read_to_string("/proc/sys/net/core/somaxconn")
			.ok()
			.and_then(|s| s.trim().parse::<i32>().ok())
			.filter(|n| *n > 0);
		match configured {
			Some(n) => n.min(MAX_BACKLOG),
			None => libc::SOMAXCONN,
		}
	})
}

/*
 ---
  What open() does per role:
  ┌─────────┬───────────────────────────────────────────────────────┐
  │ Role    │ Steps                                                 │
  ├─────────┼───────────────────────────────────────────────────────┤
  │ Listen  │ socket → [V6ONLY] → buffers → [REUSEADDR] → bind      │
  │         │ (local or family wildcard) → listen(backlog)          │
  ├─────────┼───────────────────────────────────────────────────────┤
  │ Dial    │ socket → [V6ONLY] → buffers → [bind local] → connect  │
  │         │ (EINPROGRESS → poll for POLLOUT → SO_ERROR)           │
  └─────────┴───────────────────────────────────────────────────────┘
 ---
*/
