//! An in-memory socket provider.
//!
//! Listeners live in a port table; dialing a port with a listener on it
//! creates a linked pair of endpoints and queues the server side on the
//! listener. Nothing touches the kernel except `duplicate`, which hands
//! out `/dev/null`.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::net::{IpAddr, SocketAddr};
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Instant;

use sctplane::{OpenParams, Role, SctpError, Shutdown, SockOpt, SocketHandle, SocketProvider, StackSupport};

#[derive(Clone)]
pub struct MockProvider {
	net: Arc<MockNet>,
}

struct MockNet {
	stack: StackSupport,
	listeners: Mutex<HashMap<u16, Arc<Endpoint>>>,
	next_port: AtomicU16,
	opens: AtomicUsize,
	live_clients: AtomicUsize,
	fail_nodelay: AtomicBool,
	fail_keepalive: AtomicBool,
	last_params: Mutex<Option<OpenParams>>,
	options: Mutex<Vec<(u16, u16, SockOpt)>>,
	shutdowns: Mutex<Vec<(u16, Shutdown)>>,
}

impl MockProvider {
	pub fn new() -> Self {
		Self::with_stack(StackSupport::default())
	}

	pub fn with_stack(stack: StackSupport) -> Self {
		Self {
			net: Arc::new(MockNet {
				stack,
				listeners: Mutex::new(HashMap::new()),
				next_port: AtomicU16::new(40000),
				opens: AtomicUsize::new(0),
				live_clients: AtomicUsize::new(0),
				fail_nodelay: AtomicBool::new(false),
				fail_keepalive: AtomicBool::new(false),
				last_params: Mutex::new(None),
				options: Mutex::new(Vec::new()),
				shutdowns: Mutex::new(Vec::new()),
			}),
		}
	}

	/// Number of `open` calls so far.
	pub fn opens(&self) -> usize {
		self.net.opens.load(Ordering::SeqCst)
	}

	/// Dialed handles not yet closed.
	pub fn live_clients(&self) -> usize {
		self.net.live_clients.load(Ordering::SeqCst)
	}

	pub fn fail_nodelay(&self, fail: bool) {
		self.net.fail_nodelay.store(fail, Ordering::SeqCst);
	}

	pub fn fail_keepalive(&self, fail: bool) {
		self.net.fail_keepalive.store(fail, Ordering::SeqCst);
	}

	pub fn last_params(&self) -> Option<OpenParams> {
		self.net.last_params.lock().unwrap().clone()
	}

	/// Options set on the endpoint bound to `local` and talking to `peer`.
	pub fn options_between(&self, local: u16, peer: u16) -> Vec<SockOpt> {
		self.net
			.options
			.lock()
			.unwrap()
			.iter()
			.filter(|(l, p, _)| *l == local && *p == peer)
			.map(|(_, _, opt)| *opt)
			.collect()
	}

	pub fn shutdowns_on(&self, local: u16) -> Vec<Shutdown> {
		self.net
			.shutdowns
			.lock()
			.unwrap()
			.iter()
			.filter(|(l, _)| *l == local)
			.map(|(_, how)| *how)
			.collect()
	}

	fn ephemeral(&self) -> u16 {
		self.net.next_port.fetch_add(1, Ordering::SeqCst)
	}
}

impl SocketProvider for MockProvider {
	type Handle = MockHandle;

	fn stack(&self) -> StackSupport {
		self.net.stack
	}

	fn open(&self, params: &OpenParams) -> Result<MockHandle, SctpError> {
		self.net.opens.fetch_add(1, Ordering::SeqCst);
		*self.net.last_params.lock().unwrap() = Some(params.clone());

		match params.role {
			Role::Listen => {
				let mut local = params.local.ok_or(SctpError::MissingAddress)?;
				if local.port() == 0 {
					local.set_port(self.ephemeral());
				}
				let mut listeners = self.net.listeners.lock().unwrap();
				if listeners.contains_key(&local.port()) {
					return Err(SctpError::Os { call: "bind", errno: libc::EADDRINUSE });
				}
				let end = Endpoint::new();
				listeners.insert(local.port(), end.clone());
				Ok(MockHandle::new(self.net.clone(), end, None, local, None, Role::Listen))
			}
			Role::Dial => {
				let remote = params.remote.ok_or(SctpError::MissingAddress)?;
				if params.deadline.is_some_and(|d| d <= Instant::now()) {
					return Err(SctpError::Timeout);
				}
				let listener = self
					.net
					.listeners
					.lock()
					.unwrap()
					.get(&remote.port())
					.cloned()
					.ok_or(SctpError::Os { call: "connect", errno: libc::ECONNREFUSED })?;

				let local = match params.local {
					Some(mut local) => {
						if local.port() == 0 {
							local.set_port(self.ephemeral());
						}
						local
					}
					None => SocketAddr::new(loopback_like(remote.ip()), self.ephemeral()),
				};

				let client_end = Endpoint::new();
				let server_end = Endpoint::new();
				let server = MockHandle::new(
					self.net.clone(),
					server_end.clone(),
					Some(client_end.clone()),
					remote,
					Some(local),
					Role::Listen,
				);
				{
					let mut state = listener.lock();
					state.backlog.push_back(server);
				}
				listener.cond.notify_all();

				self.net.live_clients.fetch_add(1, Ordering::SeqCst);
				Ok(MockHandle::new(self.net.clone(), client_end, Some(server_end), local, Some(remote), Role::Dial))
			}
		}
	}
}

fn loopback_like(ip: IpAddr) -> IpAddr {
	match ip {
		IpAddr::V4(_) => "127.0.0.1".parse().unwrap(),
		IpAddr::V6(_) => "::1".parse().unwrap(),
	}
}

struct Endpoint {
	state: Mutex<EndState>,
	cond: Condvar,
}

#[derive(Default)]
struct EndState {
	closed: bool,
	eof: bool,
	read_deadline: Option<Instant>,
	write_deadline: Option<Instant>,
	inbox: VecDeque<u8>,
	backlog: VecDeque<MockHandle>,
}

impl Endpoint {
	fn new() -> Arc<Self> {
		Arc::new(Self { state: Mutex::new(EndState::default()), cond: Condvar::new() })
	}

	fn lock(&self) -> MutexGuard<'_, EndState> {
		self.state.lock().unwrap()
	}

	fn set_eof(&self) {
		self.lock().eof = true;
		self.cond.notify_all();
	}
}

pub struct MockHandle {
	net: Arc<MockNet>,
	end: Arc<Endpoint>,
	peer_end: Option<Arc<Endpoint>>,
	local: SocketAddr,
	peer: Option<SocketAddr>,
	role: Role,
	listening: bool,
}

impl MockHandle {
	fn new(
		net: Arc<MockNet>,
		end: Arc<Endpoint>,
		peer_end: Option<Arc<Endpoint>>,
		local: SocketAddr,
		peer: Option<SocketAddr>,
		role: Role,
	) -> Self {
		let listening = role == Role::Listen && peer.is_none();
		Self { net, end, peer_end, local, peer, role, listening }
	}

	/// Blocks until `ready` yields a value, the endpoint closes or the
	/// deadline picked by `deadline` passes.
	fn wait_for<T>(
		&self,
		deadline: fn(&EndState) -> Option<Instant>,
		mut ready: impl FnMut(&mut EndState) -> Option<T>,
	) -> Result<T, SctpError> {
		let mut state = self.end.lock();
		loop {
			if state.closed {
				return Err(SctpError::InvalidState);
			}
			let limit = deadline(&state);
			if limit.is_some_and(|d| d <= Instant::now()) {
				return Err(SctpError::Timeout);
			}
			if let Some(value) = ready(&mut state) {
				return Ok(value);
			}
			state = match limit {
				Some(d) => self.end.cond.wait_timeout(state, d.saturating_duration_since(Instant::now())).unwrap().0,
				None => self.end.cond.wait(state).unwrap(),
			};
		}
	}

	fn check_open(&self) -> Result<(), SctpError> {
		if self.end.lock().closed {
			return Err(SctpError::InvalidState);
		}
		Ok(())
	}
}

impl SocketHandle for MockHandle {
	fn accept(&self) -> Result<(Self, SocketAddr), SctpError> {
		let conn = self.wait_for(|s| s.read_deadline, |s| s.backlog.pop_front())?;
		let peer = conn.peer.ok_or(SctpError::Os { call: "accept", errno: libc::EINVAL })?;
		Ok((conn, peer))
	}

	fn read(&self, buf: &mut [u8]) -> Result<usize, SctpError> {
		if buf.is_empty() {
			self.check_open()?;
			return Ok(0);
		}
		self.wait_for(
			|s| s.read_deadline,
			|s| {
				if !s.inbox.is_empty() {
					let n = buf.len().min(s.inbox.len());
					for (slot, byte) in buf.iter_mut().zip(s.inbox.drain(..n)) {
						*slot = byte;
					}
					Some(n)
				} else if s.eof {
					Some(0)
				} else {
					None
				}
			},
		)
	}

	fn write(&self, buf: &[u8]) -> Result<usize, SctpError> {
		{
			let state = self.end.lock();
			if state.closed {
				return Err(SctpError::InvalidState);
			}
			if state.write_deadline.is_some_and(|d| d <= Instant::now()) {
				return Err(SctpError::Timeout);
			}
		}
		let peer = self.peer_end.as_ref().ok_or(SctpError::Os { call: "write", errno: libc::ENOTCONN })?;
		{
			let mut state = peer.lock();
			if state.closed || state.eof {
				return Err(SctpError::Os { call: "write", errno: libc::EPIPE });
			}
			state.inbox.extend(buf);
		}
		peer.cond.notify_all();
		Ok(buf.len())
	}

	fn shutdown(&self, how: Shutdown) -> Result<(), SctpError> {
		self.check_open()?;
		self.net.shutdowns.lock().unwrap().push((self.local.port(), how));
		if matches!(how, Shutdown::Read | Shutdown::ReadWrite) {
			self.end.set_eof();
		}
		if matches!(how, Shutdown::Write | Shutdown::ReadWrite) {
			if let Some(peer) = &self.peer_end {
				peer.set_eof();
			}
		}
		Ok(())
	}

	fn set_option(&self, opt: SockOpt) -> Result<(), SctpError> {
		self.check_open()?;
		let peer_port = self.peer.map_or(0, |p| p.port());
		self.net.options.lock().unwrap().push((self.local.port(), peer_port, opt));
		let refuse = match opt {
			SockOpt::NoDelay(_) => self.net.fail_nodelay.load(Ordering::SeqCst),
			SockOpt::KeepAlive(_) => self.net.fail_keepalive.load(Ordering::SeqCst),
			_ => false,
		};
		if refuse {
			return Err(SctpError::Os { call: "setsockopt", errno: libc::ENOPROTOOPT });
		}
		Ok(())
	}

	fn set_read_deadline(&self, deadline: Option<Instant>) -> Result<(), SctpError> {
		let mut state = self.end.lock();
		if state.closed {
			return Err(SctpError::InvalidState);
		}
		state.read_deadline = deadline;
		self.end.cond.notify_all();
		Ok(())
	}

	fn set_write_deadline(&self, deadline: Option<Instant>) -> Result<(), SctpError> {
		let mut state = self.end.lock();
		if state.closed {
			return Err(SctpError::InvalidState);
		}
		state.write_deadline = deadline;
		self.end.cond.notify_all();
		Ok(())
	}

	fn local_addr(&self) -> Result<SocketAddr, SctpError> {
		self.check_open()?;
		Ok(self.local)
	}

	fn peer_addr(&self) -> Result<SocketAddr, SctpError> {
		self.check_open()?;
		self.peer.ok_or(SctpError::Os { call: "getpeername", errno: libc::ENOTCONN })
	}

	fn duplicate(&self) -> Result<OwnedFd, SctpError> {
		self.check_open()?;
		Ok(OwnedFd::from(File::open("/dev/null")?))
	}

	fn close(&self) -> Result<(), SctpError> {
		{
			let mut state = self.end.lock();
			if state.closed {
				return Err(SctpError::InvalidState);
			}
			state.closed = true;
		}
		self.end.cond.notify_all();

		if self.listening {
			self.net.listeners.lock().unwrap().remove(&self.local.port());
		}
		if self.role == Role::Dial {
			self.net.live_clients.fetch_sub(1, Ordering::SeqCst);
		}
		if let Some(peer) = &self.peer_end {
			peer.set_eof();
		}
		Ok(())
	}

	fn is_closed(&self) -> bool {
		self.end.lock().closed
	}
}

impl Drop for MockHandle {
	fn drop(&mut self) {
		if !self.is_closed() {
			let _ = self.close();
		}
	}
}
