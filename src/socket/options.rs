use std::os::fd::AsRawFd;

use crate::error::SctpError;
use super::provider::SockOpt;

// Linux uapi values from <linux/sctp.h>.
const SCTP_NODELAY: libc::c_int = 3;
const SCTP_PEER_ADDR_PARAMS: libc::c_int = 9;
const SPP_HB_ENABLE: u32 = 1 << 0;
const SPP_HB_DISABLE: u32 = 1 << 1;
const SPP_HB_TIME_IS_ZERO: u32 = 1 << 7;

/// `struct sctp_paddrparams` as the kernel lays it out, without the
/// trailing flow label and DSCP fields added in 4.19.
///
/// The C struct is packed, so `spp_pathmtu` sits unaligned right after
/// the `u16`. Every kernel accepts this 152-byte form.
#[repr(C, packed)]
struct PeerAddrParams {
	spp_assoc_id: i32,
	spp_address: [u8; 128],
	spp_hbinterval: u32,
	spp_pathmaxrxt: u16,
	spp_pathmtu: u32,
	spp_sackdelay: u32,
	spp_flags: u32,
	_pad: [u8; 2],
}

fn setsockopt<S: AsRawFd, T>(
	socket: &S,
	level: libc::c_int,
	name: libc::c_int,
	val: &T,
) -> Result<(), SctpError> {
	let result = unsafe {
		libc::setsockopt(
			socket.as_raw_fd(),
			level,
			name,
			val as *const T as *const libc::c_void,
			std::mem::size_of::<T>() as libc::socklen_t,
		)
	};
	if result == -1 {
		Err(SctpError::last_os("setsockopt"))
	} else {
		Ok(())
	}
}

fn setsockopt_bool<S: AsRawFd>(socket: &S, level: libc::c_int, name: libc::c_int, enable: bool) -> Result<(), SctpError> {
	let val: libc::c_int = if enable { 1 } else { 0 };
	setsockopt(socket, level, name, &val)
}

/// Applies one [`SockOpt`].
pub(crate) fn set_option<S: AsRawFd>(socket: &S, opt: SockOpt) -> Result<(), SctpError> {
	match opt {
		SockOpt::NoDelay(enable) => set_sctp_nodelay(socket, enable),
		SockOpt::KeepAlive(_) | SockOpt::KeepAlivePeriod(_) | SockOpt::KeepAliveCount(_) => {
			heartbeat_params(opt).map_or(Ok(()), |params| set_peer_addr_params(socket, &params))
		}
		SockOpt::Linger(linger) => set_linger(socket, linger),
		SockOpt::RecvBuffer(size) => set_recv_buffer_size(socket, size),
		SockOpt::SendBuffer(size) => set_send_buffer_size(socket, size),
	}
}

/// Sets SO_REUSEADDR.
///
/// Lets a restarted listener bind its port again while sockets left by
/// the previous process still hold it during association shutdown.
pub(crate) fn set_reuse_addr<S: AsRawFd>(socket: &S, enable: bool) -> Result<(), SctpError> {
	setsockopt_bool(socket, libc::SOL_SOCKET, libc::SO_REUSEADDR, enable)
}

/// Sets IPV6_V6ONLY.
///
/// Off means an IPv6 socket also accepts IPv4 peers as `::ffff:a.b.c.d`.
pub(crate) fn set_ipv6_only<S: AsRawFd>(socket: &S, only: bool) -> Result<(), SctpError> {
	setsockopt_bool(socket, libc::IPPROTO_IPV6, libc::IPV6_V6ONLY, only)
}

/// Sets SCTP_NODELAY on a socket.
///
/// Disables Nagle-style bundling of small messages.
pub(crate) fn set_sctp_nodelay<S: AsRawFd>(socket: &S, enable: bool) -> Result<(), SctpError> {
	setsockopt_bool(socket, libc::IPPROTO_SCTP, SCTP_NODELAY, enable)
}

/// Sets receive buffer size (SO_RCVBUF).
///
/// Kernel typically doubles this value internally.
fn set_recv_buffer_size<S: AsRawFd>(socket: &S, size: usize) -> Result<(), SctpError> {
	let val = size.min(libc::c_int::MAX as usize) as libc::c_int;
	setsockopt(socket, libc::SOL_SOCKET, libc::SO_RCVBUF, &val)
}

/// Sets send buffer size (SO_SNDBUF).
fn set_send_buffer_size<S: AsRawFd>(socket: &S, size: usize) -> Result<(), SctpError> {
	let val = size.min(libc::c_int::MAX as usize) as libc::c_int;
	setsockopt(socket, libc::SOL_SOCKET, libc::SO_SNDBUF, &val)
}

/// Sets socket linger behavior (SO_LINGER).
///
/// Controls what happens when close() is called with unsent data:
/// - `None`: default behavior, close returns immediately, kernel sends data in background
/// - `Some(0)`: abort, discards unsent data
/// - `Some(n)`: graceful shutdown, unsent data may be dropped after about n seconds
pub(crate) fn set_linger<S: AsRawFd>(socket: &S, linger: Option<u32>) -> Result<(), SctpError> {
	let val = match linger {
		None => libc::linger { l_onoff: 0, l_linger: 0 },
		Some(seconds) => libc::linger {
			l_onoff: 1,
			l_linger: seconds.min(libc::c_int::MAX as u32) as libc::c_int,
		},
	};
	setsockopt(socket, libc::SOL_SOCKET, libc::SO_LINGER, &val)
}

/// Builds the `SCTP_PEER_ADDR_PARAMS` payload for a heartbeat option.
///
/// Heartbeats are SCTP's keep-alive: idle paths are checked so a dead
/// peer is noticed. Fields left zero keep their current kernel value.
/// The interval is rounded up to whole milliseconds; a zero period
/// needs `SPP_HB_TIME_IS_ZERO` because a zero `spp_hbinterval` means
/// "unchanged". Returns `None` for options that aren't heartbeats.
fn heartbeat_params(opt: SockOpt) -> Option<PeerAddrParams> {
	// assoc id 0 with a zeroed address: the one association of a
	// one-to-one socket, or the endpoint defaults on a listener.
	let mut params: PeerAddrParams = unsafe { std::mem::zeroed() };
	match opt {
		SockOpt::KeepAlive(enable) => {
			params.spp_flags = if enable { SPP_HB_ENABLE } else { SPP_HB_DISABLE };
		}
		SockOpt::KeepAlivePeriod(period) => {
			let millis = period.as_nanos().div_ceil(1_000_000);
			if millis == 0 {
				params.spp_flags = SPP_HB_TIME_IS_ZERO;
			} else {
				params.spp_hbinterval = millis.min(u32::MAX as u128) as u32;
			}
		}
		SockOpt::KeepAliveCount(count) => params.spp_pathmaxrxt = count,
		_ => return None,
	}
	Some(params)
}

fn set_peer_addr_params<S: AsRawFd>(socket: &S, params: &PeerAddrParams) -> Result<(), SctpError> {
	setsockopt(socket, libc::IPPROTO_SCTP, SCTP_PEER_ADDR_PARAMS, params)
}

/// Sets or clears `O_NONBLOCK`.
pub(crate) fn set_nonblocking<S: AsRawFd>(socket: &S, nonblocking: bool) -> Result<(), SctpError> {
	let flags = unsafe { libc::fcntl(socket.as_raw_fd(), libc::F_GETFL) };
	if flags == -1 {
		return Err(SctpError::last_os("fcntl"));
	}
	let new_flags = if nonblocking {
		flags | libc::O_NONBLOCK
	} else {
		flags & !libc::O_NONBLOCK
	};
	let result = unsafe { libc::fcntl(socket.as_raw_fd(), libc::F_SETFL, new_flags) };
	if result == -1 {
		return Err(SctpError::last_os("fcntl"));
	}
	Ok(())
}

/*
 ---
  Where each option lives:
  ┌──────────────────┬──────────────┬────────────────────────┐
  │ SockOpt          │ level        │ name                   │
  ├──────────────────┼──────────────┼────────────────────────┤
  │ NoDelay          │ IPPROTO_SCTP │ SCTP_NODELAY           │
  ├──────────────────┼──────────────┼────────────────────────┤
  │ KeepAlive*       │ IPPROTO_SCTP │ SCTP_PEER_ADDR_PARAMS  │
  ├──────────────────┼──────────────┼────────────────────────┤
  │ Linger           │ SOL_SOCKET   │ SO_LINGER              │
  ├──────────────────┼──────────────┼────────────────────────┤
  │ Recv/SendBuffer  │ SOL_SOCKET   │ SO_RCVBUF / SO_SNDBUF  │
  └──────────────────┴──────────────┴────────────────────────┘
 ---
*/
