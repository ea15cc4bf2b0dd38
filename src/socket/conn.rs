use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::addr::{Network, SctpAddr};
use crate::error::{OpError, SctpError};
use super::fd::NetFd;
use super::provider::{Shutdown, SockOpt, SocketHandle};

/// Size of the buffer used when copying from a reader.
const COPY_BUF_SIZE: usize = 32 * 1024;

/// An established SCTP association, used as a byte stream.
///
/// All methods take `&self`; a connection can be read on one thread
/// while written on another. Once [`close`](SctpConn::close) is called
/// every method fails with [`SctpError::InvalidState`].
pub struct SctpConn<H: SocketHandle = NetFd> {
	fd: H,
	net: Network,
	laddr: Option<SctpAddr>,
	raddr: Option<SctpAddr>,
	read_closed: AtomicBool,
	write_closed: AtomicBool,
}

impl<H: SocketHandle> SctpConn<H> {
	/// Wraps an established handle and turns no-delay on.
	///
	/// A handle that refuses no-delay is still usable, so that failure
	/// is only logged.
	pub(crate) fn new(fd: H, net: Network, laddr: Option<SctpAddr>, raddr: Option<SctpAddr>) -> Self {
		if let Err(err) = fd.set_option(SockOpt::NoDelay(true)) {
			log::warn!("sctp no-delay not applied: {}", err);
		}
		Self {
			fd,
			net,
			laddr,
			raddr,
			read_closed: AtomicBool::new(false),
			write_closed: AtomicBool::new(false),
		}
	}

	pub(crate) fn handle(&self) -> &H {
		&self.fd
	}

	fn decorate(&self, op: &'static str, err: SctpError) -> OpError {
		OpError::new(op, self.net.as_str(), self.laddr.as_ref(), self.raddr.as_ref(), err)
	}

	/// Runs `f` against the handle, turning any failure into an
	/// [`OpError`] for `op`.
	fn with_fd<T>(&self, op: &'static str, f: impl FnOnce(&H) -> Result<T, SctpError>) -> Result<T, OpError> {
		if self.fd.is_closed() {
			return Err(self.decorate(op, SctpError::InvalidState));
		}
		f(&self.fd).map_err(|err| self.decorate(op, err))
	}

	/// Reads into `buf`. `Ok(0)` means the peer finished sending.
	pub fn read(&self, buf: &mut [u8]) -> Result<usize, OpError> {
		self.with_fd("read", |fd| fd.read(buf))
	}

	/// Writes all of `buf`.
	pub fn write(&self, buf: &[u8]) -> Result<usize, OpError> {
		self.with_fd("write", |fd| fd.write(buf))
	}

	/// Copies everything `src` yields into the connection.
	///
	/// Reaching the end of `src` is success. Returns the bytes copied.
	/// When sending fails partway, the error is [`SctpError::Partial`]
	/// carrying the count that already went out.
	pub fn read_from<R: Read + ?Sized>(&self, src: &mut R) -> Result<u64, OpError> {
		self.with_fd("read", |fd| copy_into(fd, src))
	}

	/// Sends the contents of `file` from its current position, up to
	/// `limit` bytes or end of file.
	///
	/// Uses `sendfile(2)` when the handle supports it. Failures after some
	/// bytes were sent are reported as for [`read_from`](SctpConn::read_from).
	pub fn read_from_file(&self, file: &File, limit: Option<u64>) -> Result<u64, OpError> {
		self.with_fd("read", |fd| match fd.send_file(file, limit) {
			Some(result) => result,
			None => match limit {
				Some(n) => copy_into(fd, &mut file.take(n)),
				None => copy_into(fd, &mut &*file),
			},
		})
	}

	/// Shuts down the reading side. Repeated calls are no-ops.
	pub fn close_read(&self) -> Result<(), OpError> {
		self.with_fd("close", |fd| half_close(fd, &self.read_closed, Shutdown::Read))
	}

	/// Shuts down the writing side; the peer sees end of input.
	/// Repeated calls are no-ops.
	pub fn close_write(&self) -> Result<(), OpError> {
		self.with_fd("close", |fd| half_close(fd, &self.write_closed, Shutdown::Write))
	}

	/// Sets what `close` does with unsent data.
	///
	/// - `None`: the OS default: close returns at once, data drains in the background
	/// - `Some(0)`: unsent data is discarded and the association aborted
	/// - `Some(n)`: unsent data may be discarded after about n seconds
	pub fn set_linger(&self, linger: Option<u32>) -> Result<(), OpError> {
		self.with_fd("set", |fd| fd.set_option(SockOpt::Linger(linger)))
	}

	/// Turns heartbeats on or off.
	pub fn set_keep_alive(&self, enable: bool) -> Result<(), OpError> {
		self.with_fd("set", |fd| fd.set_option(SockOpt::KeepAlive(enable)))
	}

	/// Sets the heartbeat interval, rounded up to whole milliseconds.
	pub fn set_keep_alive_period(&self, period: Duration) -> Result<(), OpError> {
		self.with_fd("set", |fd| fd.set_option(SockOpt::KeepAlivePeriod(period)))
	}

	/// Controls whether small messages go out immediately. On by default.
	pub fn set_no_delay(&self, no_delay: bool) -> Result<(), OpError> {
		self.with_fd("set", |fd| fd.set_option(SockOpt::NoDelay(no_delay)))
	}

	pub fn set_read_buffer(&self, bytes: usize) -> Result<(), OpError> {
		self.with_fd("set", |fd| fd.set_option(SockOpt::RecvBuffer(bytes)))
	}

	pub fn set_write_buffer(&self, bytes: usize) -> Result<(), OpError> {
		self.with_fd("set", |fd| fd.set_option(SockOpt::SendBuffer(bytes)))
	}

	/// Sets both deadlines. `None` clears them.
	///
	/// A deadline already in the past fails the next read or write at once.
	pub fn set_deadline(&self, deadline: Option<Instant>) -> Result<(), OpError> {
		self.with_fd("set", |fd| {
			fd.set_read_deadline(deadline)?;
			fd.set_write_deadline(deadline)
		})
	}

	pub fn set_read_deadline(&self, deadline: Option<Instant>) -> Result<(), OpError> {
		self.with_fd("set", |fd| fd.set_read_deadline(deadline))
	}

	pub fn set_write_deadline(&self, deadline: Option<Instant>) -> Result<(), OpError> {
		self.with_fd("set", |fd| fd.set_write_deadline(deadline))
	}

	pub fn local_addr(&self) -> Option<&SctpAddr> {
		self.laddr.as_ref()
	}

	pub fn remote_addr(&self) -> Option<&SctpAddr> {
		self.raddr.as_ref()
	}

	pub fn network(&self) -> Network {
		self.net
	}

	/// Returns a blocking-mode duplicate of the underlying descriptor.
	///
	/// The duplicate is owned by the caller and unaffected by closing
	/// this connection.
	pub fn duplicate(&self) -> Result<OwnedFd, OpError> {
		self.with_fd("file", |fd| fd.duplicate())
	}

	/// Closes the connection. Blocked reads and writes return
	/// [`SctpError::InvalidState`].
	pub fn close(&self) -> Result<(), OpError> {
		self.with_fd("close", |fd| fd.close())
	}
}

fn copy_into<H: SocketHandle, R: Read + ?Sized>(fd: &H, src: &mut R) -> Result<u64, SctpError> {
	let mut buf = vec![0u8; COPY_BUF_SIZE];
	let mut total = 0u64;
	loop {
		let n = match src.read(&mut buf) {
			Ok(0) => return Ok(total),
			Ok(n) => n,
			Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
			Err(err) => return Err(err.into()),
		};
		fd.write(&buf[..n]).map_err(|err| err.after(total))?;
		total += n as u64;
	}
}

fn half_close<H: SocketHandle>(fd: &H, done: &AtomicBool, how: Shutdown) -> Result<(), SctpError> {
	if done.swap(true, Ordering::AcqRel) {
		return Ok(());
	}
	fd.shutdown(how).inspect_err(|_| done.store(false, Ordering::Release))
}

impl<H: SocketHandle> Drop for SctpConn<H> {
	fn drop(&mut self) {
		if !self.fd.is_closed() {
			let _ = self.fd.close();
		}
	}
}

impl<H: SocketHandle> fmt::Debug for SctpConn<H> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SctpConn")
			.field("net", &self.net)
			.field("local", &self.laddr)
			.field("remote", &self.raddr)
			.field("closed", &self.fd.is_closed())
			.finish()
	}
}

impl<H: SocketHandle> Read for SctpConn<H> {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		SctpConn::read(self, buf).map_err(io::Error::from)
	}
}

impl<H: SocketHandle> Read for &SctpConn<H> {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		SctpConn::read(*self, buf).map_err(io::Error::from)
	}
}

impl<H: SocketHandle> Write for SctpConn<H> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		SctpConn::write(self, buf).map_err(io::Error::from)
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

impl<H: SocketHandle> Write for &SctpConn<H> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		SctpConn::write(*self, buf).map_err(io::Error::from)
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}
