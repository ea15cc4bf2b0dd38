use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};

use crate::addr::{Network, Resolver, SctpAddr, SystemResolver, resolve_addr_with, resolve_addrs_with};
use crate::error::{OpError, SctpError};
use super::conn::SctpConn;
use super::establish::{DialSettings, ListenSettings, dial_with, listen_with};
use super::listener::SctpListener;
use super::options::set_option;
use super::provider::{SockOpt, SocketHandle, SocketProvider};
use super::sys::{SysProvider, max_listener_backlog};

// ============================================================================
// Socket-level settings
// ============================================================================

/// Kernel buffer sizes set on a socket before it binds.
///
/// Sizes go through SO_RCVBUF/SO_SNDBUF as given. On a listener they
/// carry over to accepted associations. `None` keeps the system default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferConfig {
	pub recv: Option<usize>,
	pub send: Option<usize>,
}

impl BufferConfig {
	pub fn new() -> Self {
		Self::default()
	}

	/// Receive buffer, in bytes.
	pub fn recv(self, bytes: usize) -> Self {
		Self { recv: Some(bytes), ..self }
	}

	/// Send buffer, in bytes.
	pub fn send(self, bytes: usize) -> Self {
		Self { send: Some(bytes), ..self }
	}

	/// Same size for both directions.
	pub fn both(self, bytes: usize) -> Self {
		self.recv(bytes).send(bytes)
	}

	pub(crate) fn apply<S: AsRawFd>(&self, socket: &S) -> Result<(), SctpError> {
		let opts = [self.recv.map(SockOpt::RecvBuffer), self.send.map(SockOpt::SendBuffer)];
		opts.into_iter().flatten().try_for_each(|opt| set_option(socket, opt))
	}
}

/// Per-connection SCTP options applied right after connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SctpConfig {
	pub nodelay: bool,
	pub keepalive: Option<KeepaliveConfig>,
	pub linger: Option<Option<u32>>,
}

impl Default for SctpConfig {
	fn default() -> Self {
		Self {
			nodelay: true,
			keepalive: None,
			linger: None,
		}
	}
}

impl SctpConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn nodelay(mut self, enable: bool) -> Self {
		self.nodelay = enable;
		self
	}

	pub fn keepalive(mut self, config: KeepaliveConfig) -> Self {
		self.keepalive = Some(config);
		self
	}

	pub fn linger(mut self, seconds: Option<u32>) -> Self {
		self.linger = Some(seconds);
		self
	}

	/// Applies what differs from a fresh connection, which already has
	/// no-delay on.
	pub(crate) fn apply<H: SocketHandle>(&self, handle: &H) -> Result<(), SctpError> {
		if !self.nodelay {
			handle.set_option(SockOpt::NoDelay(false))?;
		}
		if let Some(config) = self.keepalive {
			handle.set_option(SockOpt::KeepAlive(true))?;
			handle.set_option(SockOpt::KeepAlivePeriod(config.period))?;
			handle.set_option(SockOpt::KeepAliveCount(config.count))?;
		}
		if let Some(linger) = self.linger {
			handle.set_option(SockOpt::Linger(linger))?;
		}
		Ok(())
	}
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveConfig {
	/// Time between heartbeats on an idle path.
	pub period: Duration,
	/// Unanswered heartbeats before the path is declared down.
	pub count: u16,
}

impl Default for KeepaliveConfig {
	fn default() -> Self {
		Self {
			period: Duration::from_secs(30),
			count: 5,
		}
	}
}

impl KeepaliveConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn period(mut self, period: Duration) -> Self {
		self.period = period;
		self
	}

	pub fn count(mut self, count: u16) -> Self {
		self.count = count;
		self
	}
}

// ============================================================================
// Listener Builder
// ============================================================================

/// Builder for SCTP listeners.
///
/// # Example
/// ```ignore
/// use sctplane::{ListenerBuilder, Network, BufferConfig};
///
/// let listener = ListenerBuilder::new()
///     .network(Network::Sctp6)
///     .backlog(1024)
///     .buffers(BufferConfig::new().recv(1 << 20))
///     .bind_str("[::1]:0")?;
/// ```
pub struct ListenerBuilder<P: SocketProvider = SysProvider> {
	provider: P,
	network: Network,
	backlog: Option<i32>,
	reuse_addr: bool,
	buffers: BufferConfig,
}

impl Default for ListenerBuilder<SysProvider> {
	fn default() -> Self {
		Self::new()
	}
}

impl ListenerBuilder<SysProvider> {
	pub fn new() -> Self {
		Self::with_provider(SysProvider)
	}
}

impl<P: SocketProvider> ListenerBuilder<P> {
	/// Starts a builder that opens sockets through `provider`.
	pub fn with_provider(provider: P) -> Self {
		Self {
			provider,
			network: Network::Sctp,
			backlog: None,
			reuse_addr: true,
			buffers: BufferConfig::default(),
		}
	}

	/// Set the network. Default: `Network::Sctp`.
	pub fn network(mut self, network: Network) -> Self {
		self.network = network;
		self
	}

	/// Set listen backlog. Default: the system's `somaxconn`.
	pub fn backlog(mut self, backlog: i32) -> Self {
		self.backlog = Some(backlog);
		self
	}

	/// Set SO_REUSEADDR. Default: on.
	pub fn reuse_addr(mut self, enable: bool) -> Self {
		self.reuse_addr = enable;
		self
	}

	/// Set buffer sizes.
	pub fn buffers(mut self, config: BufferConfig) -> Self {
		self.buffers = config;
		self
	}

	/// Binds and starts listening.
	///
	/// `None` listens on the wildcard address with an ephemeral port.
	pub fn bind(self, laddr: Option<&SctpAddr>) -> Result<SctpListener<P::Handle>, OpError> {
		let settings = ListenSettings {
			backlog: self.backlog.unwrap_or_else(max_listener_backlog),
			reuse_addr: self.reuse_addr,
			buffers: self.buffers,
		};
		listen_with(&self.provider, self.network, laddr, &settings)
			.map_err(|err| OpError::new("listen", self.network.as_str(), None, laddr, err))
	}

	/// Resolves `address` with the system resolver, then binds.
	pub fn bind_str(self, address: &str) -> Result<SctpListener<P::Handle>, OpError> {
		self.bind_resolved(&SystemResolver, address)
	}

	/// Resolves `address` with `resolver`, then binds to the first
	/// suitable result.
	pub fn bind_resolved<R: Resolver + ?Sized>(
		self,
		resolver: &R,
		address: &str,
	) -> Result<SctpListener<P::Handle>, OpError> {
		let laddr = resolve_addr_with(resolver, self.network, address)
			.map_err(|err| OpError::new("listen", self.network.as_str(), None, None, err))?;
		self.bind(Some(&laddr))
	}
}

// ============================================================================
// Connector Builder
// ============================================================================

/// Builder for SCTP connections.
///
/// # Example
/// ```ignore
/// use sctplane::{ConnectorBuilder, SctpConfig, KeepaliveConfig};
/// use std::time::Duration;
///
/// let conn = ConnectorBuilder::new()
///     .timeout(Duration::from_secs(3))
///     .sctp(SctpConfig::new().linger(Some(5)).keepalive(KeepaliveConfig::new()))
///     .connect_str("127.0.0.1:9899")?;
/// ```
pub struct ConnectorBuilder<P: SocketProvider = SysProvider> {
	provider: P,
	network: Network,
	local: Option<SctpAddr>,
	timeout: Option<Duration>,
	sctp: SctpConfig,
	buffers: BufferConfig,
}

impl Default for ConnectorBuilder<SysProvider> {
	fn default() -> Self {
		Self::new()
	}
}

impl ConnectorBuilder<SysProvider> {
	pub fn new() -> Self {
		Self::with_provider(SysProvider)
	}
}

impl<P: SocketProvider> ConnectorBuilder<P> {
	/// Starts a builder that opens sockets through `provider`.
	pub fn with_provider(provider: P) -> Self {
		Self {
			provider,
			network: Network::Sctp,
			local: None,
			timeout: None,
			sctp: SctpConfig::default(),
			buffers: BufferConfig::default(),
		}
	}

	/// Set the network. Default: `Network::Sctp`.
	pub fn network(mut self, network: Network) -> Self {
		self.network = network;
		self
	}

	/// Bind to `addr` before connecting.
	pub fn local(mut self, addr: SctpAddr) -> Self {
		self.local = Some(addr);
		self
	}

	/// Give up connecting after `timeout`.
	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}

	/// Set SCTP options.
	pub fn sctp(mut self, config: SctpConfig) -> Self {
		self.sctp = config;
		self
	}

	/// Set buffer sizes.
	pub fn buffers(mut self, config: BufferConfig) -> Self {
		self.buffers = config;
		self
	}

	/// Connects to the remote address.
	pub fn connect(self, raddr: Option<&SctpAddr>) -> Result<SctpConn<P::Handle>, OpError> {
		let settings = DialSettings {
			deadline: self.timeout.map(|t| Instant::now() + t),
			sctp: self.sctp,
			buffers: self.buffers,
		};
		dial_with(&self.provider, self.network, self.local.as_ref(), raddr, &settings)
			.map_err(|err| OpError::new("dial", self.network.as_str(), self.local.as_ref(), raddr, err))
	}

	/// Resolves `address` with the system resolver, then connects.
	pub fn connect_str(self, address: &str) -> Result<SctpConn<P::Handle>, OpError> {
		self.connect_resolved(&SystemResolver, address)
	}

	/// Resolves `address` with `resolver`, then connects to the first
	/// suitable result.
	pub fn connect_resolved<R: Resolver + ?Sized>(
		self,
		resolver: &R,
		address: &str,
	) -> Result<SctpConn<P::Handle>, OpError> {
		let candidates = resolve_addrs_with(resolver, self.network, address)
			.map_err(|err| OpError::new("dial", self.network.as_str(), self.local.as_ref(), None, err))?;
		self.connect(candidates.first())
	}
}
