mod common;

use std::io::{Read, Seek, SeekFrom, Write};
use std::time::{Duration, Instant};

use common::{MockHandle, MockProvider};
use sctplane::{
	ConnectorBuilder, Family, KeepaliveConfig, ListenerBuilder, Network, SctpAddr, SctpConfig, SctpConn, SctpError,
	SctpListener, Shutdown, SockOpt,
};

fn addr(ip: &str, port: u16) -> SctpAddr {
	SctpAddr::new(ip.parse().unwrap(), port)
}

/// A listener on `ip` plus a connected client/server pair.
fn pair(mock: &MockProvider, ip: &str) -> (SctpListener<MockHandle>, SctpConn<MockHandle>, SctpConn<MockHandle>) {
	let ln = ListenerBuilder::with_provider(mock.clone()).bind(Some(&addr(ip, 0))).unwrap();
	let client = ConnectorBuilder::with_provider(mock.clone()).connect(Some(ln.addr())).unwrap();
	let server = ln.accept().unwrap();
	(ln, client, server)
}

#[test]
fn missing_remote_opens_nothing() {
	let mock = MockProvider::new();
	let err = ConnectorBuilder::with_provider(mock.clone()).connect(None).unwrap_err();
	assert!(matches!(err.kind(), SctpError::MissingAddress));
	assert_eq!(err.op, "dial");
	assert_eq!(mock.opens(), 0);

	let err = sctplane::dial("sctp", None, None).unwrap_err();
	assert!(matches!(err.kind(), SctpError::MissingAddress));
}

#[test]
fn sctp4_dial_to_ipv6_fails_before_open() {
	let mock = MockProvider::new();
	let ln = ListenerBuilder::with_provider(mock.clone())
		.network(Network::Sctp6)
		.bind(Some(&addr("::1", 0)))
		.unwrap();
	let opens = mock.opens();

	let err = ConnectorBuilder::with_provider(mock.clone())
		.network(Network::Sctp4)
		.connect(Some(ln.addr()))
		.unwrap_err();
	assert!(matches!(err.kind(), SctpError::FamilyMismatch { .. }), "got {}", err);
	assert_eq!(mock.opens(), opens);

	let conn = ConnectorBuilder::with_provider(mock.clone())
		.network(Network::Sctp6)
		.connect(Some(ln.addr()))
		.unwrap();
	let params = mock.last_params().unwrap();
	assert_eq!(params.family, Family::V6);
	assert!(params.ipv6_only);
	assert_eq!(conn.remote_addr(), Some(ln.addr()));
}

#[test]
fn mismatched_local_address_fails_before_open() {
	let mock = MockProvider::new();
	let err = ConnectorBuilder::with_provider(mock.clone())
		.local(addr("127.0.0.1", 0))
		.connect(Some(&addr("::1", 9)))
		.unwrap_err();
	match err.kind() {
		SctpError::FamilyMismatch { reason, .. } => assert_eq!(*reason, "mismatched local address type"),
		other => panic!("unexpected {:?}", other),
	}
	assert_eq!(mock.opens(), 0);
	assert_eq!(err.to_string(), "dial sctp 127.0.0.1:0->[::1]:9: address 127.0.0.1:0: mismatched local address type");
}

#[test]
fn ipv6_wildcard_local_dials_an_ipv4_remote() {
	let mock = MockProvider::new();
	let ln = ListenerBuilder::with_provider(mock.clone()).bind(Some(&addr("127.0.0.1", 0))).unwrap();
	let conn = ConnectorBuilder::with_provider(mock.clone())
		.local(addr("::", 0))
		.connect(Some(ln.addr()))
		.unwrap();

	let params = mock.last_params().unwrap();
	assert_eq!(params.family, Family::V4);
	assert_eq!(params.local.unwrap().ip(), "0.0.0.0".parse::<std::net::IpAddr>().unwrap());
	assert_eq!(conn.remote_addr(), Some(ln.addr()));
}

#[test]
fn failing_default_nodelay_still_connects() {
	let mock = MockProvider::new();
	mock.fail_nodelay(true);
	let (_ln, client, server) = pair(&mock, "127.0.0.1");

	client.write(b"ping").unwrap();
	let mut buf = [0u8; 4];
	assert_eq!(server.read(&mut buf).unwrap(), 4);
	assert_eq!(&buf, b"ping");
}

#[test]
fn explicit_option_failure_surfaces_and_keeps_connection() {
	let mock = MockProvider::new();
	let (_ln, client, server) = pair(&mock, "127.0.0.1");

	mock.fail_nodelay(true);
	let err = client.set_no_delay(true).unwrap_err();
	assert_eq!(err.op, "set");
	assert_eq!(err.kind().raw_os_error(), Some(libc::ENOPROTOOPT));

	client.write(b"ok").unwrap();
	let mut buf = [0u8; 2];
	assert_eq!(server.read(&mut buf).unwrap(), 2);
}

#[test]
fn failing_configured_option_closes_the_socket() {
	let mock = MockProvider::new();
	let ln = ListenerBuilder::with_provider(mock.clone()).bind(None).unwrap();
	mock.fail_keepalive(true);

	let err = ConnectorBuilder::with_provider(mock.clone())
		.sctp(SctpConfig::new().keepalive(KeepaliveConfig::new()))
		.connect(Some(ln.addr()))
		.unwrap_err();
	assert_eq!(err.kind().raw_os_error(), Some(libc::ENOPROTOOPT));
	assert_eq!(mock.live_clients(), 0);
}

#[test]
fn configured_options_are_applied_in_order() {
	let mock = MockProvider::new();
	let ln = ListenerBuilder::with_provider(mock.clone()).bind(Some(&addr("127.0.0.1", 0))).unwrap();
	let period = Duration::from_millis(2500);
	let conn = ConnectorBuilder::with_provider(mock.clone())
		.sctp(
			SctpConfig::new()
				.nodelay(false)
				.linger(Some(3))
				.keepalive(KeepaliveConfig::new().period(period).count(4)),
		)
		.connect(Some(ln.addr()))
		.unwrap();

	let opts = mock.options_between(conn.local_addr().unwrap().port(), ln.addr().port());
	assert_eq!(
		opts,
		vec![
			SockOpt::NoDelay(true),
			SockOpt::NoDelay(false),
			SockOpt::KeepAlive(true),
			SockOpt::KeepAlivePeriod(period),
			SockOpt::KeepAliveCount(4),
			SockOpt::Linger(Some(3)),
		]
	);
}

#[test]
fn connect_timeout() {
	let mock = MockProvider::new();
	let ln = ListenerBuilder::with_provider(mock.clone()).bind(None).unwrap();
	let err = ConnectorBuilder::with_provider(mock.clone())
		.timeout(Duration::ZERO)
		.connect(Some(ln.addr()))
		.unwrap_err();
	assert!(err.is_timeout());
}

#[test]
fn refused_without_listener() {
	let mock = MockProvider::new();
	let err = ConnectorBuilder::with_provider(mock.clone())
		.connect(Some(&addr("127.0.0.1", 1)))
		.unwrap_err();
	let io: std::io::Error = err.into();
	assert_eq!(io.kind(), std::io::ErrorKind::ConnectionRefused);
}

#[test]
fn closed_connection_rejects_everything() {
	let mock = MockProvider::new();
	let (_ln, client, _server) = pair(&mock, "127.0.0.1");
	client.close().unwrap();

	let mut buf = [0u8; 4];
	let err = client.read(&mut buf).unwrap_err();
	assert!(matches!(err.kind(), SctpError::InvalidState));
	assert_eq!(err.op, "read");
	assert!(matches!(client.write(b"x").unwrap_err().kind(), SctpError::InvalidState));
	assert!(matches!(client.set_linger(Some(0)).unwrap_err().kind(), SctpError::InvalidState));
	assert!(matches!(client.set_keep_alive(true).unwrap_err().kind(), SctpError::InvalidState));
	assert!(matches!(client.set_deadline(None).unwrap_err().kind(), SctpError::InvalidState));
	assert!(matches!(client.close_write().unwrap_err().kind(), SctpError::InvalidState));
	assert!(matches!(client.duplicate().unwrap_err().kind(), SctpError::InvalidState));
	assert!(matches!(client.close().unwrap_err().kind(), SctpError::InvalidState));
	assert!(client.remote_addr().is_some());
}

#[test]
fn half_close_is_idempotent() {
	let mock = MockProvider::new();
	let (_ln, client, server) = pair(&mock, "127.0.0.1");

	client.write(b"last words").unwrap();
	client.close_write().unwrap();
	client.close_write().unwrap();
	client.close_read().unwrap();
	client.close_read().unwrap();

	let port = client.local_addr().unwrap().port();
	assert_eq!(mock.shutdowns_on(port), vec![Shutdown::Write, Shutdown::Read]);

	let mut received = Vec::new();
	(&server).read_to_end(&mut received).unwrap();
	assert_eq!(received, b"last words");
}

#[test]
fn linger_zero_then_close_with_pending_data() {
	let mock = MockProvider::new();
	let (_ln, client, _server) = pair(&mock, "127.0.0.1");
	client.write(&[7u8; 4096]).unwrap();
	client.set_linger(Some(0)).unwrap();
	client.close().unwrap();
}

#[test]
fn read_from_copies_until_end_of_input() {
	let mock = MockProvider::new();
	let (_ln, client, server) = pair(&mock, "127.0.0.1");

	let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
	let copied = client.read_from(&mut payload.as_slice()).unwrap();
	assert_eq!(copied, payload.len() as u64);
	client.close().unwrap();

	let mut received = Vec::new();
	(&server).read_to_end(&mut received).unwrap();
	assert_eq!(received, payload);
}

#[test]
fn read_from_reports_reader_errors() {
	struct Broken;
	impl Read for Broken {
		fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
			Err(std::io::Error::other("disk on fire"))
		}
	}

	let mock = MockProvider::new();
	let (_ln, client, _server) = pair(&mock, "127.0.0.1");
	let err = client.read_from(&mut Broken).unwrap_err();
	assert!(matches!(err.kind(), SctpError::Io(_)));
	assert!(err.to_string().ends_with("disk on fire"));
}

#[test]
fn read_from_keeps_count_when_peer_goes_away() {
	struct ClosesPeer<'a> {
		peer: &'a SctpConn<MockHandle>,
		reads: usize,
	}
	impl Read for ClosesPeer<'_> {
		fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
			self.reads += 1;
			if self.reads == 2 {
				self.peer.close().unwrap();
			}
			buf[..10].fill(b'x');
			Ok(10)
		}
	}

	let mock = MockProvider::new();
	let (_ln, client, server) = pair(&mock, "127.0.0.1");
	let err = client
		.read_from(&mut ClosesPeer { peer: &server, reads: 0 })
		.unwrap_err();
	assert_eq!(err.kind().copied(), 10);
	assert_eq!(err.kind().raw_os_error(), Some(libc::EPIPE));
	assert!(err.to_string().ends_with("write: broken pipe (after 10 bytes)"), "got {}", err);
	let io: std::io::Error = err.into();
	assert_eq!(io.kind(), std::io::ErrorKind::BrokenPipe);
}

#[test]
fn read_from_file_falls_back_to_copy() {
	let path = std::env::temp_dir().join(format!("sctplane-dial-{}", std::process::id()));
	let mut file = std::fs::File::options()
		.read(true)
		.write(true)
		.create(true)
		.truncate(true)
		.open(&path)
		.unwrap();
	file.write_all(b"header|body").unwrap();
	file.seek(SeekFrom::Start(0)).unwrap();

	let mock = MockProvider::new();
	let (_ln, client, server) = pair(&mock, "127.0.0.1");
	assert_eq!(client.read_from_file(&file, Some(6)).unwrap(), 6);
	assert_eq!(client.read_from_file(&file, None).unwrap(), 5);
	client.close().unwrap();

	let mut received = String::new();
	(&server).read_to_string(&mut received).unwrap();
	assert_eq!(received, "header|body");
	std::fs::remove_file(&path).ok();
}

#[test]
fn io_traits_work_through_shared_references() {
	let mock = MockProvider::new();
	let (_ln, client, server) = pair(&mock, "::1");

	(&client).write_all(b"abc").unwrap();
	let mut buf = [0u8; 3];
	(&server).read_exact(&mut buf).unwrap();
	assert_eq!(&buf, b"abc");

	let mut owned = server;
	owned.write_all(b"xyz").unwrap();
	owned.flush().unwrap();
	let mut client = client;
	client.read_exact(&mut buf).unwrap();
	assert_eq!(&buf, b"xyz");
}

#[test]
fn deadlines() {
	let mock = MockProvider::new();
	let (_ln, client, server) = pair(&mock, "127.0.0.1");

	client.set_write_deadline(Some(Instant::now())).unwrap();
	assert!(client.write(b"late").unwrap_err().is_timeout());

	server.set_read_deadline(Some(Instant::now() + Duration::from_millis(30))).unwrap();
	let mut buf = [0u8; 1];
	let err = server.read(&mut buf).unwrap_err();
	assert!(err.is_timeout());
	let io: std::io::Error = err.into();
	assert_eq!(io.kind(), std::io::ErrorKind::TimedOut);

	client.set_deadline(None).unwrap();
	server.set_deadline(None).unwrap();
	client.write(b"x").unwrap();
	assert_eq!(server.read(&mut buf).unwrap(), 1);
}

#[test]
fn errors_name_both_endpoints() {
	let mock = MockProvider::new();
	let (_ln, client, _server) = pair(&mock, "127.0.0.1");
	client.close().unwrap();
	let err = client.write(b"x").unwrap_err();
	let local = client.local_addr().unwrap();
	let remote = client.remote_addr().unwrap();
	assert_eq!(
		err.to_string(),
		format!("write sctp {}->{}: use of closed network connection", local, remote)
	);
}
