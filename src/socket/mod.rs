mod builder;
mod conn;
mod establish;
mod fd;
mod listener;
mod options;
mod provider;
mod sys;

pub use self::builder::{BufferConfig, ConnectorBuilder, KeepaliveConfig, ListenerBuilder, SctpConfig};
pub use self::conn::SctpConn;
pub use self::establish::select_family;
pub use self::fd::NetFd;
pub use self::listener::{Incoming, SctpListener};
pub use self::provider::{OpenParams, Role, Shutdown, SockOpt, SocketHandle, SocketProvider, StackSupport};
pub use self::sys::{SysProvider, max_listener_backlog};

/*
 ---
  How the pieces stack:
  ┌──────────────────────────────┬─────────────────────────────────────┐
  │ Layer                        │ Types                               │
  ├──────────────────────────────┼─────────────────────────────────────┤
  │ configuration                │ ListenerBuilder, ConnectorBuilder   │
  ├──────────────────────────────┼─────────────────────────────────────┤
  │ establishment                │ select_family, listen/dial          │
  ├──────────────────────────────┼─────────────────────────────────────┤
  │ user-facing sockets          │ SctpListener, SctpConn              │
  ├──────────────────────────────┼─────────────────────────────────────┤
  │ provider boundary            │ SocketProvider, SocketHandle        │
  ├──────────────────────────────┼─────────────────────────────────────┤
  │ kernel                       │ SysProvider, NetFd, options         │
  └──────────────────────────────┴─────────────────────────────────────┘
  ---
*/
