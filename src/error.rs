use std::fmt;

use crate::addr::SctpAddr;

/// Errors produced while resolving, establishing or driving an SCTP socket.
#[derive(Debug, thiserror::Error)]
pub enum SctpError {
	#[error("unknown network {0}")]
	UnknownNetwork(String),

	#[error("address {addr}: {reason}")]
	AddressParse { addr: String, reason: &'static str },

	#[error("no suitable address found")]
	NoSuitableAddress,

	#[error("missing address")]
	MissingAddress,

	#[error("address {addr}: {reason}")]
	FamilyMismatch { addr: String, reason: &'static str },

	#[error("use of closed network connection")]
	InvalidState,

	#[error("i/o timeout")]
	Timeout,

	#[error("{call}: {}", errno_to_str(*.errno))]
	Os { call: &'static str, errno: i32 },

	#[error(transparent)]
	Io(#[from] std::io::Error),

	/// A copy failed after `copied` bytes had already been sent.
	#[error("{err} (after {copied} bytes)")]
	Partial {
		copied: u64,
		#[source]
		err: Box<SctpError>,
	},
}

impl SctpError {
	/// Captures the current errno for a failed syscall.
	#[inline]
	pub(crate) fn last_os(call: &'static str) -> Self {
		SctpError::Os { call, errno: errno() }
	}

	/// Records that `copied` bytes went out before this error.
	pub(crate) fn after(self, copied: u64) -> Self {
		if copied == 0 {
			return self;
		}
		SctpError::Partial { copied, err: Box::new(self) }
	}

	/// Bytes sent before a failed copy; 0 for every other error.
	pub fn copied(&self) -> u64 {
		match self {
			SctpError::Partial { copied, .. } => *copied,
			_ => 0,
		}
	}

	pub fn is_timeout(&self) -> bool {
		match self {
			SctpError::Timeout => true,
			SctpError::Os { errno, .. } => *errno == libc::ETIMEDOUT,
			SctpError::Io(err) => err.kind() == std::io::ErrorKind::TimedOut,
			SctpError::Partial { err, .. } => err.is_timeout(),
			_ => false,
		}
	}

	/// Returns the OS error number, if this error came from a syscall.
	pub fn raw_os_error(&self) -> Option<i32> {
		match self {
			SctpError::Os { errno, .. } => Some(*errno),
			SctpError::Io(err) => err.raw_os_error(),
			SctpError::Partial { err, .. } => err.raw_os_error(),
			_ => None,
		}
	}

	fn io_kind(&self) -> std::io::ErrorKind {
		match self {
			SctpError::UnknownNetwork(_)
			| SctpError::AddressParse { .. }
			| SctpError::NoSuitableAddress
			| SctpError::MissingAddress
			| SctpError::FamilyMismatch { .. } => std::io::ErrorKind::InvalidInput,
			SctpError::InvalidState => std::io::ErrorKind::NotConnected,
			SctpError::Timeout => std::io::ErrorKind::TimedOut,
			SctpError::Os { errno, .. } => errno_to_kind(*errno),
			SctpError::Io(err) => err.kind(),
			SctpError::Partial { err, .. } => err.io_kind(),
		}
	}
}

/// An [`SctpError`] decorated with the operation, network and endpoints
/// it happened on.
///
/// Renders as `op net local->remote: error`, omitting the parts that
/// are unknown.
#[derive(Debug)]
pub struct OpError {
	pub op: &'static str,
	pub net: String,
	pub local: Option<SctpAddr>,
	pub remote: Option<SctpAddr>,
	pub err: SctpError,
}

impl OpError {
	pub fn new(
		op: &'static str,
		net: impl Into<String>,
		local: Option<&SctpAddr>,
		remote: Option<&SctpAddr>,
		err: SctpError,
	) -> Self {
		Self {
			op,
			net: net.into(),
			local: local.cloned(),
			remote: remote.cloned(),
			err,
		}
	}

	/// Returns the undecorated error.
	pub fn kind(&self) -> &SctpError {
		&self.err
	}

	pub fn into_inner(self) -> SctpError {
		self.err
	}

	pub fn is_timeout(&self) -> bool {
		self.err.is_timeout()
	}
}

impl fmt::Display for OpError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.op)?;
		if !self.net.is_empty() {
			write!(f, " {}", self.net)?;
		}
		if let Some(local) = &self.local {
			write!(f, " {}", local)?;
		}
		if let Some(remote) = &self.remote {
			let sep = if self.local.is_some() { "->" } else { " " };
			write!(f, "{}{}", sep, remote)?;
		}
		write!(f, ": {}", self.err)
	}
}

impl std::error::Error for OpError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		Some(&self.err)
	}
}

/// Returns current errno value.
#[inline]
pub fn errno() -> i32 {
	unsafe { *libc::__errno_location() }
}

/// Converts errno to human-readable string.
fn errno_to_str(errno: i32) -> String {
	match errno {
		libc::EACCES => "permission denied".into(),
		libc::EADDRINUSE => "address already in use".into(),
		libc::EADDRNOTAVAIL => "cannot assign requested address".into(),
		libc::EAFNOSUPPORT => "address family not supported".into(),
		libc::EAGAIN => "resource temporarily unavailable".into(),
		libc::EBADF => "bad file descriptor".into(),
		libc::ECONNABORTED => "connection aborted".into(),
		libc::ECONNREFUSED => "connection refused".into(),
		libc::ECONNRESET => "connection reset by peer".into(),
		libc::EINPROGRESS => "operation in progress".into(),
		libc::EINTR => "interrupted by signal".into(),
		libc::EINVAL => "invalid argument".into(),
		libc::EMFILE => "too many open files".into(),
		libc::ENETUNREACH => "network unreachable".into(),
		libc::ENOBUFS => "no buffer space available".into(),
		libc::ENOPROTOOPT => "protocol not available".into(),
		libc::ENOTCONN => "not connected".into(),
		libc::EPIPE => "broken pipe".into(),
		libc::EPROTONOSUPPORT => "protocol not supported".into(),
		libc::ESOCKTNOSUPPORT => "socket type not supported".into(),
		libc::ETIMEDOUT => "connection timed out".into(),
		_ => format!("errno {}", errno),
	}
}

/// Maps errno to std::io::ErrorKind.
fn errno_to_kind(errno: i32) -> std::io::ErrorKind {
	match errno {
		libc::EACCES | libc::EPERM => std::io::ErrorKind::PermissionDenied,
		libc::EADDRINUSE => std::io::ErrorKind::AddrInUse,
		libc::EADDRNOTAVAIL => std::io::ErrorKind::AddrNotAvailable,
		libc::EAGAIN => std::io::ErrorKind::WouldBlock,
		libc::ECONNABORTED => std::io::ErrorKind::ConnectionAborted,
		libc::ECONNREFUSED => std::io::ErrorKind::ConnectionRefused,
		libc::ECONNRESET => std::io::ErrorKind::ConnectionReset,
		libc::EINTR => std::io::ErrorKind::Interrupted,
		libc::EINVAL => std::io::ErrorKind::InvalidInput,
		libc::ENOTCONN => std::io::ErrorKind::NotConnected,
		libc::EPIPE => std::io::ErrorKind::BrokenPipe,
		libc::ETIMEDOUT => std::io::ErrorKind::TimedOut,
		_ => std::io::ErrorKind::Other,
	}
}

impl From<SctpError> for std::io::Error {
	fn from(err: SctpError) -> Self {
		match err {
			SctpError::Io(err) => err,
			err => std::io::Error::new(err.io_kind(), err),
		}
	}
}

impl From<OpError> for std::io::Error {
	fn from(err: OpError) -> Self {
		std::io::Error::new(err.err.io_kind(), err)
	}
}
