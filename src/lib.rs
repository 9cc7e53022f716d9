//! # wscore - Sans-I/O WebSocket Protocol Engine
//!
//! `wscore` implements RFC 6455 (WebSocket) and RFC 7692 (per-message
//! compression) as a pure state machine: bytes in, events out, events in,
//! bytes out. It never touches a socket, spawns a thread, or arms a timer;
//! the caller owns the transport and the event loop.
//!
//! ## Features
//!
//! - **Sans-I/O design** usable under any runtime, sync or async
//! - **Both roles**: client and server, with role-correct masking
//! - **Full opening handshake** including subprotocol and extension
//!   negotiation and the HTTP rejection path
//! - **Streaming frame decoder** that surfaces long messages chunk by chunk
//! - **permessage-deflate** with window-bits and context-takeover
//!   negotiation
//! - **Post-handshake mode** for externally negotiated transports
//!   (RFC 8441 / HTTP/2)
//!
//! ## Quick Start
//!
//! ```rust
//! use wscore::{Config, ConnectionState, Event, Role, WSConnection};
//!
//! let mut server = WSConnection::new(Role::Server, Config::default());
//!
//! // Bytes read from the transport go in...
//! let request = b"GET /chat HTTP/1.1\r\n\
//!     Host: server.example.com\r\n\
//!     Upgrade: websocket\r\n\
//!     Connection: Upgrade\r\n\
//!     Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
//!     Sec-WebSocket-Version: 13\r\n\r\n";
//! server.receive_data(Some(request))?;
//!
//! // ...events come out...
//! let events: Vec<Event> = server.events().collect::<wscore::Result<_>>()?;
//! assert!(matches!(events[0], Event::Request(_)));
//!
//! // ...and replies serialize to bytes for the caller to write.
//! let response_bytes = server.send(Event::AcceptConnection(Default::default()))?;
//! assert!(response_bytes.starts_with(b"HTTP/1.1 101"));
//! assert_eq!(server.state(), ConnectionState::Open);
//! # Ok::<(), wscore::Error>(())
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod extensions;
pub mod protocol;

pub use config::{Config, Limits};
pub use connection::{Connection, ConnectionState, Role, WSConnection};
pub use error::{Error, LocalProtocolError, RemoteProtocolError, Result};
pub use events::{
    AcceptConnection, BytesMessage, CloseCode, CloseConnection, Event, Ping, Pong,
    RejectConnection, RejectData, Request, TextMessage,
};
pub use extensions::Extension;
pub use protocol::{compute_accept_key, OpCode, WS_GUID};
