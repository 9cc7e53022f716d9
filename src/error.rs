//! Error types for the protocol engine.
//!
//! Two failure kinds exist, mirroring the two parties that can get the
//! protocol wrong: [`LocalProtocolError`] for caller misuse (raised from
//! `send`) and [`RemoteProtocolError`] for peer violations (raised from
//! `events()`).

use thiserror::Error;

use crate::events::{CloseCode, CloseConnection, Event};

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The caller used the API in a way the current state forbids: an illegal
/// event for the state, malformed event fields, an oversized control
/// payload, or feeding data after EOF.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("local protocol error: {message}")]
pub struct LocalProtocolError {
    /// Human-readable description of the misuse.
    pub message: String,
}

impl LocalProtocolError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The remote peer violated the protocol.
///
/// `event_hint` carries the event the caller should send before tearing the
/// connection down: a [`CloseConnection`] with the appropriate status code
/// during the data phase, a [`RejectConnection`](crate::events::RejectConnection)
/// during the server handshake, or `None` when the peer already closed the
/// connection. After a remote protocol error the connection is CLOSED
/// whether or not the hint is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("remote protocol error: {message}")]
pub struct RemoteProtocolError {
    /// Human-readable description of the violation.
    pub message: String,
    /// Suggested reply, when one applies.
    pub event_hint: Option<Event>,
}

impl RemoteProtocolError {
    /// A violation answered with a close frame carrying `code`.
    pub(crate) fn close(message: impl Into<String>, code: CloseCode) -> Self {
        Self {
            message: message.into(),
            event_hint: Some(Event::CloseConnection(CloseConnection::new(code))),
        }
    }

    /// A violation answered with the given event.
    pub(crate) fn with_hint(message: impl Into<String>, hint: Event) -> Self {
        Self {
            message: message.into(),
            event_hint: Some(hint),
        }
    }

    /// A violation with nothing useful left to send.
    pub(crate) fn without_hint(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            event_hint: None,
        }
    }

    /// The close code suggested by the hint, if the hint is a close frame.
    #[must_use]
    pub fn close_code(&self) -> Option<CloseCode> {
        match &self.event_hint {
            Some(Event::CloseConnection(close)) => Some(close.code),
            _ => None,
        }
    }
}

/// Any engine failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Caller misused the API.
    #[error(transparent)]
    Local(#[from] LocalProtocolError),

    /// Peer violated the protocol.
    #[error(transparent)]
    Remote(#[from] RemoteProtocolError),
}

impl Error {
    pub(crate) fn local(message: impl Into<String>) -> Self {
        Error::Local(LocalProtocolError::new(message))
    }

    pub(crate) fn remote_close(message: impl Into<String>, code: CloseCode) -> Self {
        Error::Remote(RemoteProtocolError::close(message, code))
    }
}
