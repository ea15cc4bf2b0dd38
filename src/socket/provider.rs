//! The boundary between connection/listener logic and the OS.
//!
//! A `SocketProvider` opens sockets; the `SocketHandle` it returns is
//! non-blocking underneath, internally synchronized, and does every
//! syscall on behalf of `SctpConn` and `SctpListener`.

use std::fs::File;
use std::net::SocketAddr;
use std::os::fd::OwnedFd;
use std::time::{Duration, Instant};

use crate::addr::Family;
use crate::error::SctpError;
use super::builder::BufferConfig;

/// Whether a socket is being opened to connect or to accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
	Dial,
	Listen,
}

impl Role {
	pub fn as_str(self) -> &'static str {
		match self {
			Role::Dial => "dial",
			Role::Listen => "listen",
		}
	}
}

/// Which halves of a connection to shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
	Read,      // SHUT_RD
	Write,     // SHUT_WR
	ReadWrite, // SHUT_RDWR
}

/// A socket option, independent of how a platform spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockOpt {
	/// Send small messages immediately instead of bundling them.
	NoDelay(bool),
	/// Heartbeat probing on or off.
	KeepAlive(bool),
	/// Interval between heartbeats.
	KeepAlivePeriod(Duration),
	/// Unanswered heartbeats before the peer path is considered down.
	KeepAliveCount(u16),
	/// `None` keeps the OS default, `Some(0)` discards on close, `Some(n)` drains for up to n seconds.
	Linger(Option<u32>),
	RecvBuffer(usize),
	SendBuffer(usize),
}

/// What the host's IP stack can do, detected once per provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackSupport {
	pub ipv4: bool,
	pub ipv6: bool,
	/// IPv6 sockets can also carry IPv4 traffic as `::ffff:a.b.c.d`.
	pub ipv4_mapped: bool,
}

impl Default for StackSupport {
	fn default() -> Self {
		Self { ipv4: true, ipv6: true, ipv4_mapped: true }
	}
}

/// Everything a provider needs to open one socket.
///
/// Addresses are already converted for `family`.
#[derive(Debug, Clone)]
pub struct OpenParams {
	pub family: Family,
	pub ipv6_only: bool,
	pub sotype: libc::c_int,
	pub protocol: libc::c_int,
	pub local: Option<SocketAddr>,
	pub remote: Option<SocketAddr>,
	pub role: Role,
	pub backlog: i32,
	pub reuse_addr: bool,
	pub buffers: BufferConfig,
	/// Connect deadline, dial only.
	pub deadline: Option<Instant>,
}

/// Opens sockets.
pub trait SocketProvider: Send + Sync {
	type Handle: SocketHandle;

	fn stack(&self) -> StackSupport;

	/// Creates, binds and then listens or connects, per `params.role`.
	///
	/// Nothing is left open when this fails.
	fn open(&self, params: &OpenParams) -> Result<Self::Handle, SctpError>;
}

/// An open socket.
///
/// Every method other than `close` and `is_closed` fails with
/// `SctpError::InvalidState` once the handle is closed. `close` wakes
/// callers blocked in `accept`, `read` or `write`.
pub trait SocketHandle: Send + Sync + Sized {
	/// Waits for a peer. Honors the read deadline.
	fn accept(&self) -> Result<(Self, SocketAddr), SctpError>;

	/// Reads available bytes. `Ok(0)` is end of input. Honors the read deadline.
	fn read(&self, buf: &mut [u8]) -> Result<usize, SctpError>;

	/// Writes all of `buf`. Honors the write deadline.
	fn write(&self, buf: &[u8]) -> Result<usize, SctpError>;

	fn shutdown(&self, how: Shutdown) -> Result<(), SctpError>;

	fn set_option(&self, opt: SockOpt) -> Result<(), SctpError>;

	/// `None` clears. Takes effect for calls already blocked.
	fn set_read_deadline(&self, deadline: Option<Instant>) -> Result<(), SctpError>;

	fn set_write_deadline(&self, deadline: Option<Instant>) -> Result<(), SctpError>;

	fn local_addr(&self) -> Result<SocketAddr, SctpError>;

	fn peer_addr(&self) -> Result<SocketAddr, SctpError>;

	/// A caller-owned duplicate in blocking mode.
	fn duplicate(&self) -> Result<OwnedFd, SctpError>;

	fn close(&self) -> Result<(), SctpError>;

	fn is_closed(&self) -> bool;

	/// Zero-copy transfer from `file`, up to `limit` bytes or end of file.
	///
	/// `None` means the handle cannot do this and the caller should copy.
	fn send_file(&self, _file: &File, _limit: Option<u64>) -> Option<Result<u64, SctpError>> {
		None
	}
}
