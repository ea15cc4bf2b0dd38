use std::fmt;
use std::os::fd::OwnedFd;
use std::time::Instant;

use crate::addr::{Network, SctpAddr};
use crate::error::{OpError, SctpError};
use super::conn::SctpConn;
use super::fd::NetFd;
use super::provider::SocketHandle;

/// A listening SCTP socket.
///
/// `accept` may be called from several threads at once. Closing the
/// listener wakes every blocked `accept`; connections it already
/// returned stay open.
pub struct SctpListener<H: SocketHandle = NetFd> {
	fd: H,
	net: Network,
	laddr: SctpAddr,
}

impl<H: SocketHandle> SctpListener<H> {
	/// Internal use only, called once the handle is listening.
	pub(crate) fn new(fd: H, net: Network, laddr: SctpAddr) -> Self {
		Self { fd, net, laddr }
	}

	fn with_fd<T>(&self, op: &'static str, f: impl FnOnce(&H) -> Result<T, SctpError>) -> Result<T, OpError> {
		if self.fd.is_closed() {
			return Err(OpError::new(op, self.net.as_str(), None, Some(&self.laddr), SctpError::InvalidState));
		}
		f(&self.fd).map_err(|err| OpError::new(op, self.net.as_str(), None, Some(&self.laddr), err))
	}

	/// Waits for the next peer.
	///
	/// Fails with [`SctpError::InvalidState`] once the listener is
	/// closed and with [`SctpError::Timeout`] when the deadline passes.
	/// The returned connection has no-delay on.
	pub fn accept(&self) -> Result<SctpConn<H>, OpError> {
		self.with_fd("accept", |fd| {
			let (conn, peer) = fd.accept()?;
			let local = conn.local_addr().ok().map(SctpAddr::from);
			let remote = SctpAddr::from(peer);
			log::debug!("accepted {} {} on {}", self.net, remote, self.laddr);
			Ok(SctpConn::new(conn, self.net, local, Some(remote)))
		})
	}

	/// Returns an iterator over accepted connections.
	///
	/// The iterator never ends on its own; stop when it yields an error
	/// you can't recover from, such as the listener being closed.
	pub fn incoming(&self) -> Incoming<'_, H> {
		Incoming { listener: self }
	}

	/// Stops listening.
	pub fn close(&self) -> Result<(), OpError> {
		self.with_fd("close", |fd| fd.close())
	}

	/// The address being listened on, with the real port if an
	/// ephemeral one was requested.
	pub fn addr(&self) -> &SctpAddr {
		&self.laddr
	}

	pub fn network(&self) -> Network {
		self.net
	}

	/// Sets the accept deadline. `None` waits forever.
	///
	/// Applies to an `accept` that is already blocked.
	pub fn set_deadline(&self, deadline: Option<Instant>) -> Result<(), OpError> {
		self.with_fd("set", |fd| fd.set_read_deadline(deadline))
	}

	/// Returns a blocking-mode duplicate of the listening descriptor.
	pub fn duplicate(&self) -> Result<OwnedFd, OpError> {
		self.with_fd("file", |fd| fd.duplicate())
	}
}

impl<H: SocketHandle> Drop for SctpListener<H> {
	fn drop(&mut self) {
		if !self.fd.is_closed() {
			let _ = self.fd.close();
		}
	}
}

impl<H: SocketHandle> fmt::Debug for SctpListener<H> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SctpListener")
			.field("net", &self.net)
			.field("addr", &self.laddr)
			.field("closed", &self.fd.is_closed())
			.finish()
	}
}

/// Iterator returned by [`SctpListener::incoming`].
pub struct Incoming<'a, H: SocketHandle = NetFd> {
	listener: &'a SctpListener<H>,
}

impl<H: SocketHandle> Iterator for Incoming<'_, H> {
	type Item = Result<SctpConn<H>, OpError>;

	fn next(&mut self) -> Option<Self::Item> {
		Some(self.listener.accept())
	}
}
