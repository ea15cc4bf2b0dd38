//! SCTP listeners and connections with stream-socket ergonomics.
//!
//! Addresses are resolved per network token (`"sctp"`, `"sctp4"`,
//! `"sctp6"`), the socket family is picked for you, and the result
//! behaves like any other byte stream: `Read`, `Write`, half-close,
//! deadlines.
//!
//! ```ignore
//! let listener = sctplane::listen("sctp", None)?;
//! let addr = listener.addr().clone();
//! let conn = sctplane::dial("sctp", None, Some(&addr))?;
//! ```

pub mod socket;
mod addr;
mod error;

pub use self::error::{OpError, SctpError, errno};
pub use self::addr::{
	Family, Network, ResolvedIp, Resolver, SctpAddr, SystemResolver, resolve_addr_with, resolve_addrs_with,
	split_host_port,
};
pub use self::socket::{
	BufferConfig, ConnectorBuilder, Incoming, KeepaliveConfig, ListenerBuilder, NetFd, OpenParams, Role,
	SctpConfig, SctpConn, SctpListener, Shutdown, SockOpt, SocketHandle, SocketProvider, StackSupport,
	SysProvider, max_listener_backlog, select_family,
};

fn parse_network(op: &'static str, network: &str, addr: Option<&SctpAddr>) -> Result<Network, OpError> {
	network
		.parse::<Network>()
		.map_err(|err| OpError::new(op, network, None, addr, err))
}

/// Resolves `address` (`host:port`) to one address usable on `network`.
///
/// When the host has several suitable addresses the first one the
/// resolver returned is used.
pub fn resolve_addr(network: &str, address: &str) -> Result<SctpAddr, OpError> {
	let net = parse_network("resolve", network, None)?;
	resolve_addr_with(&SystemResolver, net, address).map_err(|err| OpError::new("resolve", network, None, None, err))
}

/// Resolves `address` (`host:port`) to every address usable on `network`.
pub fn resolve_addrs(network: &str, address: &str) -> Result<Vec<SctpAddr>, OpError> {
	let net = parse_network("resolve", network, None)?;
	resolve_addrs_with(&SystemResolver, net, address).map_err(|err| OpError::new("resolve", network, None, None, err))
}

/// Listens on `laddr`, or on the wildcard address with an ephemeral
/// port when `laddr` is `None`.
pub fn listen(network: &str, laddr: Option<&SctpAddr>) -> Result<SctpListener, OpError> {
	let net = parse_network("listen", network, laddr)?;
	ListenerBuilder::new().network(net).bind(laddr)
}

/// Connects to `raddr`, binding to `laddr` first if given.
pub fn dial(network: &str, laddr: Option<&SctpAddr>, raddr: Option<&SctpAddr>) -> Result<SctpConn, OpError> {
	let net = network
		.parse::<Network>()
		.map_err(|err| OpError::new("dial", network, laddr, raddr, err))?;
	let mut builder = ConnectorBuilder::new().network(net);
	if let Some(local) = laddr {
		builder = builder.local(local.clone());
	}
	builder.connect(raddr)
}
