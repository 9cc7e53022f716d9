//! The data-phase connection and the full-lifecycle façade.
//!
//! [`Connection`] drives the post-handshake protocol: it can be built
//! directly with a role and already-agreed extensions for transports that
//! negotiate elsewhere (an HTTP/2 stream per RFC 8441), or it is produced by
//! a completed [`Handshake`]. [`WSConnection`] couples the two behind one
//! `receive_data` / `send` / `events` surface.

use std::collections::VecDeque;

use log::{debug, trace};

use crate::config::Config;
use crate::connection::{ConnectionState, Role};
use crate::error::{Error, Result};
use crate::events::{BytesMessage, CloseCode, CloseConnection, Event, Ping, Pong, TextMessage};
use crate::extensions::Extension;
use crate::protocol::assembler::{FrameProtocol, InboundFrame};
use crate::protocol::handshake::Handshake;

/// A WebSocket connection in its data phase.
pub struct Connection {
    state: ConnectionState,
    proto: FrameProtocol,
    pending: VecDeque<Event>,
    eof: bool,
    failed: bool,
}

impl Connection {
    /// Create a connection that starts out OPEN, with extensions already
    /// negotiated by some other mechanism.
    #[must_use]
    pub fn new(role: Role, extensions: Vec<Box<dyn Extension>>, config: Config) -> Self {
        Self {
            state: ConnectionState::Open,
            proto: FrameProtocol::new(role, extensions, config),
            pending: VecDeque::new(),
            eof: false,
            failed: false,
        }
    }

    /// Like [`Connection::new`], but seeds the decoder with bytes that
    /// arrived behind the handshake head.
    pub(crate) fn with_trailing_data(
        role: Role,
        extensions: Vec<Box<dyn Extension>>,
        config: Config,
        trailing: &[u8],
    ) -> Self {
        let mut connection = Self::new(role, extensions, config);
        if !trailing.is_empty() {
            connection.proto.receive_bytes(trailing);
        }
        connection
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reseed the masking generator; client output becomes deterministic.
    pub fn reseed_mask(&mut self, seed: u32) {
        self.proto.reseed_mask(seed);
    }

    /// Feed bytes from the transport; `None` marks EOF.
    ///
    /// This never yields events itself, it only updates internal state;
    /// drain [`events`](Self::events) afterwards.
    ///
    /// # Errors
    ///
    /// `LocalProtocolError` when called after EOF or once closed.
    pub fn receive_data(&mut self, data: Option<&[u8]>) -> Result<()> {
        if self.eof {
            return Err(Error::local("receive_data called after EOF"));
        }
        match data {
            None => {
                self.eof = true;
                if matches!(
                    self.state,
                    ConnectionState::Open | ConnectionState::LocalClosing
                ) {
                    // EOF without a close frame: surface 1006 to the caller.
                    self.pending.push_back(Event::CloseConnection(CloseConnection::new(
                        CloseCode::AbnormalClosure,
                    )));
                }
                self.state = ConnectionState::Closed;
                Ok(())
            }
            Some(data) => match self.state {
                ConnectionState::Open | ConnectionState::LocalClosing => {
                    self.proto.receive_bytes(data);
                    Ok(())
                }
                ConnectionState::Closed => {
                    Err(Error::local("connection is closed"))
                }
                // After the peer's close nothing further is meaningful.
                _ => Ok(()),
            },
        }
    }

    /// Drain all currently parseable events. The iterator is single-use:
    /// exhaust it before the next `receive_data`.
    pub fn events(&mut self) -> ConnectionEvents<'_> {
        ConnectionEvents { connection: self }
    }

    pub(crate) fn poll_event(&mut self) -> Option<Result<Event>> {
        if let Some(event) = self.pending.pop_front() {
            return Some(Ok(event));
        }
        if self.failed {
            return None;
        }
        match self.proto.next_frame() {
            Ok(None) => None,
            Ok(Some(frame)) => Some(Ok(self.frame_to_event(frame))),
            Err(err) => {
                self.failed = true;
                self.state = ConnectionState::Closed;
                Some(Err(err))
            }
        }
    }

    fn frame_to_event(&mut self, frame: InboundFrame) -> Event {
        match frame {
            InboundFrame::Text {
                data,
                frame_finished,
                message_finished,
            } => Event::Text(TextMessage {
                data,
                frame_finished,
                message_finished,
            }),
            InboundFrame::Bytes {
                data,
                frame_finished,
                message_finished,
            } => Event::Bytes(BytesMessage {
                data,
                frame_finished,
                message_finished,
            }),
            InboundFrame::Ping(payload) => Event::Ping(Ping { payload }),
            InboundFrame::Pong(payload) => Event::Pong(Pong { payload }),
            InboundFrame::Close { code, reason } => {
                debug!("received close frame: code {code}, reason {reason:?}");
                self.state = if self.state == ConnectionState::LocalClosing {
                    ConnectionState::Closed
                } else {
                    ConnectionState::RemoteClosing
                };
                Event::CloseConnection(CloseConnection { code, reason })
            }
        }
    }

    /// Validate `event` against the current state and serialize it.
    ///
    /// # Errors
    ///
    /// `LocalProtocolError` for event/state combinations outside the
    /// legality table, or malformed event fields.
    pub fn send(&mut self, event: Event) -> Result<Vec<u8>> {
        use ConnectionState::{LocalClosing, Open, RemoteClosing};
        match (self.state, event) {
            (Open, Event::Text(message)) => {
                self.proto.send_text(&message.data, message.message_finished)
            }
            (Open, Event::Bytes(message)) => {
                self.proto.send_binary(message.data, message.message_finished)
            }
            (Open, Event::Ping(ping)) => self.proto.ping(ping.payload),
            (Open | LocalClosing, Event::Pong(pong)) => self.proto.pong(pong.payload),
            (Open | RemoteClosing, Event::CloseConnection(close)) => {
                trace!("sending close frame: code {}", close.code);
                let bytes = self.proto.close(close.code, &close.reason)?;
                self.state = if self.state == RemoteClosing {
                    ConnectionState::Closed
                } else {
                    LocalClosing
                };
                Ok(bytes)
            }
            (state, event) => Err(Error::local(format!(
                "event {event:?} cannot be sent in state {state}"
            ))),
        }
    }
}

/// Single-use draining iterator over a connection's parseable events.
///
/// A `RemoteProtocolError` item closes the connection and ends the stream.
pub struct ConnectionEvents<'a> {
    connection: &'a mut Connection,
}

impl Iterator for ConnectionEvents<'_> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        self.connection.poll_event()
    }
}

/// The full-lifecycle connection: opening handshake, data phase, and the
/// closing handshake behind a single surface.
pub struct WSConnection {
    handshake: Handshake,
}

impl WSConnection {
    /// Create a connection in CONNECTING state with no extensions.
    #[must_use]
    pub fn new(role: Role, config: Config) -> Self {
        Self {
            handshake: Handshake::new(role, config),
        }
    }

    /// Create a connection that negotiates the given extensions during the
    /// handshake.
    #[must_use]
    pub fn with_extensions(
        role: Role,
        config: Config,
        extensions: Vec<Box<dyn Extension>>,
    ) -> Self {
        Self {
            handshake: Handshake::with_extensions(role, config, extensions),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        match self.handshake.connection() {
            Some(connection) => connection.state(),
            None => self.handshake.state(),
        }
    }

    /// The data-phase connection, once the handshake completed.
    #[must_use]
    pub fn connection(&self) -> Option<&Connection> {
        self.handshake.connection()
    }

    /// Mutable access to the data-phase connection.
    pub fn connection_mut(&mut self) -> Option<&mut Connection> {
        self.handshake.connection_mut()
    }

    /// Append bytes to the internal buffer; `None` marks EOF. Never yields
    /// events; drain [`events`](Self::events) afterwards.
    ///
    /// # Errors
    ///
    /// `LocalProtocolError` after EOF; `RemoteProtocolError` when the bytes
    /// violate the handshake requirements.
    pub fn receive_data(&mut self, data: Option<&[u8]>) -> Result<()> {
        match self.handshake.connection_mut() {
            Some(connection) => connection.receive_data(data),
            None => self.handshake.receive_data(data),
        }
    }

    /// Validate `event` against the current state and serialize it.
    ///
    /// # Errors
    ///
    /// `LocalProtocolError` for illegal event/state combinations.
    pub fn send(&mut self, event: Event) -> Result<Vec<u8>> {
        match self.handshake.connection_mut() {
            Some(connection) => connection.send(event),
            None => self.handshake.send(event),
        }
    }

    /// Drain all currently parseable events, handshake events first.
    pub fn events(&mut self) -> Events<'_> {
        Events { inner: self }
    }

    fn poll_event(&mut self) -> Option<Result<Event>> {
        if let Some(event) = self.handshake.pop_event() {
            return Some(Ok(event));
        }
        self.handshake.connection_mut()?.poll_event()
    }
}

/// Single-use draining iterator over the façade's events.
pub struct Events<'a> {
    inner: &'a mut WSConnection,
}

impl Iterator for Events<'_> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.poll_event()
    }
}
