use std::fs::File;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::addr::{from_storage, with_raw};
use crate::error::{SctpError, errno};
use super::options;
use super::provider::{Shutdown, SockOpt, SocketHandle};

/// Largest count handed to one `sendfile(2)` call.
const MAX_SENDFILE_CHUNK: u64 = 1 << 30;

/// A non-blocking socket descriptor shared between threads.
///
/// Blocking operations wait in `poll(2)`. Each waiting caller registers
/// an eventfd; `close` and deadline changes signal every registered
/// waiter so nobody stays parked on a stale condition.
///
/// `close` only marks the descriptor. The `close(2)` itself happens once
/// the last in-flight operation lets go, so the number can't be reused
/// under a caller that is still polling it.
pub struct NetFd {
	raw: RawFd,
	state: Mutex<FdState>,
	waiters: Mutex<Vec<(u64, RawFd)>>,
	next_waiter: AtomicU64,
	read_deadline: Mutex<Option<Instant>>,
	write_deadline: Mutex<Option<Instant>>,
}

struct FdState {
	refs: usize,
	closing: bool,
	fd: Option<OwnedFd>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interest {
	Read,
	Write,
}

impl Interest {
	fn events(self) -> libc::c_short {
		match self {
			Interest::Read => libc::POLLIN,
			Interest::Write => libc::POLLOUT,
		}
	}
}

/// Keeps the descriptor open while a syscall runs.
struct FdRef<'a> {
	owner: &'a NetFd,
}

impl Drop for FdRef<'_> {
	fn drop(&mut self) {
		let released = {
			let mut state = self.owner.lock_state();
			state.refs -= 1;
			if state.closing && state.refs == 0 {
				state.fd.take()
			} else {
				None
			}
		};
		drop(released);
	}
}

/// A caller parked in `poll(2)`.
struct Waiter<'a> {
	owner: &'a NetFd,
	id: u64,
	event: OwnedFd,
}

impl Waiter<'_> {
	fn drain(&self) {
		let mut count: u64 = 0;
		unsafe {
			libc::read(
				self.event.as_raw_fd(),
				&mut count as *mut u64 as *mut libc::c_void,
				std::mem::size_of::<u64>(),
			);
		}
	}
}

impl Drop for Waiter<'_> {
	fn drop(&mut self) {
		// unregister before `event` is closed
		lock(&self.owner.waiters).retain(|(id, _)| *id != self.id);
	}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Milliseconds for `poll(2)`, rounded up so we never wake early.
fn poll_timeout(remaining: Duration) -> libc::c_int {
	let millis = remaining.as_nanos().div_ceil(1_000_000);
	millis.min(libc::c_int::MAX as u128) as libc::c_int
}

impl NetFd {
	/// Wraps a descriptor that is already non-blocking.
	pub(crate) fn new(fd: OwnedFd) -> Self {
		Self {
			raw: fd.as_raw_fd(),
			state: Mutex::new(FdState { refs: 0, closing: false, fd: Some(fd) }),
			waiters: Mutex::new(Vec::new()),
			next_waiter: AtomicU64::new(0),
			read_deadline: Mutex::new(None),
			write_deadline: Mutex::new(None),
		}
	}

	fn lock_state(&self) -> MutexGuard<'_, FdState> {
		lock(&self.state)
	}

	fn incref(&self) -> Result<FdRef<'_>, SctpError> {
		let mut state = self.lock_state();
		if state.closing {
			return Err(SctpError::InvalidState);
		}
		state.refs += 1;
		Ok(FdRef { owner: self })
	}

	fn deadline(&self, interest: Interest) -> Option<Instant> {
		match interest {
			Interest::Read => *lock(&self.read_deadline),
			Interest::Write => *lock(&self.write_deadline),
		}
	}

	/// Fails right away when the deadline has already passed.
	fn check_deadline(&self, interest: Interest) -> Result<(), SctpError> {
		match self.deadline(interest) {
			Some(deadline) if deadline <= Instant::now() => Err(SctpError::Timeout),
			_ => Ok(()),
		}
	}

	fn notify_waiters(&self) {
		let one: u64 = 1;
		for (_, event) in lock(&self.waiters).iter() {
			unsafe {
				libc::write(*event, &one as *const u64 as *const libc::c_void, std::mem::size_of::<u64>());
			}
		}
	}

	fn register(&self) -> Result<Waiter<'_>, SctpError> {
		let event = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
		if event == -1 {
			return Err(SctpError::last_os("eventfd"));
		}
		let event = unsafe { OwnedFd::from_raw_fd(event) };
		let id = self.next_waiter.fetch_add(1, Ordering::Relaxed);
		lock(&self.waiters).push((id, event.as_raw_fd()));
		Ok(Waiter { owner: self, id, event })
	}

	/// Blocks until the descriptor is ready for `interest`, the
	/// descriptor is closed, or the deadline passes.
	fn wait(&self, interest: Interest) -> Result<(), SctpError> {
		// Registered before the checks below so a close racing with us
		// either is seen by the check or signals the waiter.
		let waiter = self.register()?;
		loop {
			if self.lock_state().closing {
				return Err(SctpError::InvalidState);
			}
			let timeout = match self.deadline(interest) {
				None => -1,
				Some(deadline) => {
					let now = Instant::now();
					if deadline <= now {
						return Err(SctpError::Timeout);
					}
					poll_timeout(deadline - now)
				}
			};

			let mut fds = [
				libc::pollfd { fd: self.raw, events: interest.events(), revents: 0 },
				libc::pollfd { fd: waiter.event.as_raw_fd(), events: libc::POLLIN, revents: 0 },
			];
			let n = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout) };
			if n == -1 {
				match errno() {
					libc::EINTR => continue,
					e => return Err(SctpError::Os { call: "poll", errno: e }),
				}
			}
			if fds[1].revents != 0 {
				waiter.drain();
				continue;
			}
			if fds[0].revents != 0 {
				return Ok(());
			}
		}
	}

	/// Connects, waiting for the handshake to finish or `deadline`.
	pub(crate) fn connect(&self, addr: &SocketAddr, deadline: Option<Instant>) -> Result<(), SctpError> {
		let _ref = self.incref()?;
		*lock(&self.write_deadline) = deadline;
		let result = self.connect_inner(addr);
		*lock(&self.write_deadline) = None;
		result
	}

	fn connect_inner(&self, addr: &SocketAddr) -> Result<(), SctpError> {
		self.check_deadline(Interest::Write)?;
		let rc = with_raw(addr, |ptr, len| unsafe { libc::connect(self.raw, ptr, len) });
		if rc == 0 {
			return Ok(());
		}
		match errno() {
			libc::EINPROGRESS | libc::EALREADY | libc::EINTR => {}
			e => return Err(SctpError::Os { call: "connect", errno: e }),
		}
		loop {
			self.wait(Interest::Write)?;
			match self.take_error()? {
				0 => return Ok(()),
				libc::EINPROGRESS | libc::EALREADY | libc::EINTR => continue,
				e => return Err(SctpError::Os { call: "connect", errno: e }),
			}
		}
	}

	/// Reads and clears the socket error status (SO_ERROR).
	fn take_error(&self) -> Result<libc::c_int, SctpError> {
		let mut error: libc::c_int = 0;
		let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
		let result = unsafe {
			libc::getsockopt(
				self.raw,
				libc::SOL_SOCKET,
				libc::SO_ERROR,
				&mut error as *mut _ as *mut libc::c_void,
				&mut len,
			)
		};
		if result == -1 {
			return Err(SctpError::last_os("getsockopt"));
		}
		Ok(error)
	}

	fn sockname(&self, peer: bool) -> Result<SocketAddr, SctpError> {
		let _ref = self.incref()?;
		let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
		let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
		let ptr = &mut storage as *mut _ as *mut libc::sockaddr;
		let (result, call) = if peer {
			(unsafe { libc::getpeername(self.raw, ptr, &mut len) }, "getpeername")
		} else {
			(unsafe { libc::getsockname(self.raw, ptr, &mut len) }, "getsockname")
		};
		if result == -1 {
			return Err(SctpError::last_os(call));
		}
		from_storage(&storage, len).ok_or(SctpError::Os { call, errno: libc::EAFNOSUPPORT })
	}
}

impl SocketHandle for NetFd {
	fn accept(&self) -> Result<(Self, SocketAddr), SctpError> {
		let _ref = self.incref()?;
		self.check_deadline(Interest::Read)?;
		loop {
			let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
			let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
			let fd = unsafe {
				libc::accept4(
					self.raw,
					&mut storage as *mut _ as *mut libc::sockaddr,
					&mut len,
					libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
				)
			};
			if fd == -1 {
				match errno() {
					libc::EAGAIN => self.wait(Interest::Read)?,
					libc::EINTR | libc::ECONNABORTED => {}
					e => return Err(SctpError::Os { call: "accept", errno: e }),
				}
				continue;
			}
			let fd = NetFd::new(unsafe { OwnedFd::from_raw_fd(fd) });
			let peer = from_storage(&storage, len)
				.ok_or(SctpError::Os { call: "accept", errno: libc::EAFNOSUPPORT })?;
			return Ok((fd, peer));
		}
	}

	fn read(&self, buf: &mut [u8]) -> Result<usize, SctpError> {
		let _ref = self.incref()?;
		self.check_deadline(Interest::Read)?;
		if buf.is_empty() {
			return Ok(0);
		}
		loop {
			let n = unsafe { libc::read(self.raw, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
			if n >= 0 {
				return Ok(n as usize);
			}
			match errno() {
				libc::EAGAIN => self.wait(Interest::Read)?,
				libc::EINTR => {}
				e => return Err(SctpError::Os { call: "read", errno: e }),
			}
		}
	}

	fn write(&self, buf: &[u8]) -> Result<usize, SctpError> {
		let _ref = self.incref()?;
		self.check_deadline(Interest::Write)?;
		let mut written = 0;
		while written < buf.len() {
			let rest = &buf[written..];
			let n = unsafe {
				libc::send(self.raw, rest.as_ptr() as *const libc::c_void, rest.len(), libc::MSG_NOSIGNAL)
			};
			if n >= 0 {
				written += n as usize;
				continue;
			}
			match errno() {
				libc::EAGAIN => self.wait(Interest::Write)?,
				libc::EINTR => {}
				e => return Err(SctpError::Os { call: "write", errno: e }),
			}
		}
		Ok(written)
	}

	fn shutdown(&self, how: Shutdown) -> Result<(), SctpError> {
		let _ref = self.incref()?;
		let how = match how {
			Shutdown::Read => libc::SHUT_RD,
			Shutdown::Write => libc::SHUT_WR,
			Shutdown::ReadWrite => libc::SHUT_RDWR,
		};
		if unsafe { libc::shutdown(self.raw, how) } == -1 {
			return Err(SctpError::last_os("shutdown"));
		}
		Ok(())
	}

	fn set_option(&self, opt: SockOpt) -> Result<(), SctpError> {
		let _ref = self.incref()?;
		options::set_option(self, opt)
	}

	fn set_read_deadline(&self, deadline: Option<Instant>) -> Result<(), SctpError> {
		let _ref = self.incref()?;
		*lock(&self.read_deadline) = deadline;
		self.notify_waiters();
		Ok(())
	}

	fn set_write_deadline(&self, deadline: Option<Instant>) -> Result<(), SctpError> {
		let _ref = self.incref()?;
		*lock(&self.write_deadline) = deadline;
		self.notify_waiters();
		Ok(())
	}

	fn local_addr(&self) -> Result<SocketAddr, SctpError> {
		self.sockname(false)
	}

	fn peer_addr(&self) -> Result<SocketAddr, SctpError> {
		self.sockname(true)
	}

	fn duplicate(&self) -> Result<OwnedFd, SctpError> {
		let _ref = self.incref()?;
		let fd = unsafe { libc::fcntl(self.raw, libc::F_DUPFD_CLOEXEC, 0) };
		if fd == -1 {
			return Err(SctpError::last_os("dup"));
		}
		let dup = unsafe { OwnedFd::from_raw_fd(fd) };
		options::set_nonblocking(&dup, false)?;
		Ok(dup)
	}

	fn close(&self) -> Result<(), SctpError> {
		let released = {
			let mut state = self.lock_state();
			if state.closing {
				return Err(SctpError::InvalidState);
			}
			state.closing = true;
			if state.refs == 0 { state.fd.take() } else { None }
		};
		self.notify_waiters();
		drop(released);
		Ok(())
	}

	fn is_closed(&self) -> bool {
		self.lock_state().closing
	}

	fn send_file(&self, file: &File, limit: Option<u64>) -> Option<Result<u64, SctpError>> {
		let _ref = match self.incref() {
			Ok(r) => r,
			Err(e) => return Some(Err(e)),
		};
		if let Err(e) = self.check_deadline(Interest::Write) {
			return Some(Err(e));
		}
		let mut remaining = limit;
		let mut total: u64 = 0;
		loop {
			let chunk = match remaining {
				Some(0) => break,
				Some(r) => r.min(MAX_SENDFILE_CHUNK),
				None => MAX_SENDFILE_CHUNK,
			};
			// null offset: sendfile reads from, and advances, the file position
			let n = unsafe { libc::sendfile(self.raw, file.as_raw_fd(), std::ptr::null_mut(), chunk as usize) };
			if n > 0 {
				total += n as u64;
				remaining = remaining.map(|r| r - n as u64);
				continue;
			}
			if n == 0 {
				break;
			}
			match errno() {
				libc::EAGAIN => {
					if let Err(e) = self.wait(Interest::Write) {
						return Some(Err(e.after(total)));
					}
				}
				libc::EINTR => {}
				libc::EINVAL | libc::ENOSYS | libc::EOPNOTSUPP if total == 0 => return None,
				e => return Some(Err(SctpError::Os { call: "sendfile", errno: e }.after(total))),
			}
		}
		Some(Ok(total))
	}
}

/// The number is only meaningful until [`SocketHandle::close`]; after
/// that it may name an unrelated descriptor. No `AsFd` either, since a
/// `BorrowedFd` would outlive a close through `&self`. Use
/// [`SocketHandle::duplicate`] for a descriptor the caller owns.
impl AsRawFd for NetFd {
	fn as_raw_fd(&self) -> RawFd {
		self.raw
	}
}

impl std::fmt::Debug for NetFd {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("NetFd")
			.field("fd", &self.raw)
			.field("closed", &self.is_closed())
			.finish()
	}
}
