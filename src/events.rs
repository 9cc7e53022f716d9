//! Protocol events and close status codes (RFC 6455).
//!
//! Everything the engine tells the caller, and everything the caller asks the
//! engine to put on the wire, is one of these event values. Inbound events
//! are produced by [`events()`](crate::WSConnection::events); outbound events
//! are consumed by [`send()`](crate::WSConnection::send).

/// WebSocket close status code per RFC 6455 Section 7.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CloseCode {
    /// Normal closure (1000).
    #[default]
    Normal,
    /// Going away (1001). Endpoint is shutting down or navigating away.
    GoingAway,
    /// Protocol error (1002).
    ProtocolError,
    /// Unsupported data (1003).
    UnsupportedData,
    /// No status received (1005). Never sent on the wire; surfaced to the
    /// caller when a close frame arrives with an empty payload.
    NoStatusReceived,
    /// Abnormal closure (1006). Never sent on the wire; surfaced when the
    /// transport reports EOF before the closing handshake completed.
    AbnormalClosure,
    /// Invalid frame payload data (1007), e.g. non-UTF-8 in a text message.
    InvalidFramePayloadData,
    /// Policy violation (1008).
    PolicyViolation,
    /// Message too big (1009).
    MessageTooBig,
    /// Mandatory extension missing (1010).
    MandatoryExtension,
    /// Internal error (1011).
    InternalError,
    /// Service restart (1012).
    ServiceRestart,
    /// Try again later (1013).
    TryAgainLater,
    /// Bad gateway (1014).
    BadGateway,
    /// TLS handshake failure (1015). Never sent on the wire.
    TlsHandshakeFailed,
    /// Any other code (registered 1016-2999 or application 3000-4999).
    Other(u16),
}

impl CloseCode {
    /// Map a raw status code to its named variant.
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::UnsupportedData,
            1005 => CloseCode::NoStatusReceived,
            1006 => CloseCode::AbnormalClosure,
            1007 => CloseCode::InvalidFramePayloadData,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::MessageTooBig,
            1010 => CloseCode::MandatoryExtension,
            1011 => CloseCode::InternalError,
            1012 => CloseCode::ServiceRestart,
            1013 => CloseCode::TryAgainLater,
            1014 => CloseCode::BadGateway,
            1015 => CloseCode::TlsHandshakeFailed,
            other => CloseCode::Other(other),
        }
    }

    /// The numeric value of this close code.
    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::UnsupportedData => 1003,
            CloseCode::NoStatusReceived => 1005,
            CloseCode::AbnormalClosure => 1006,
            CloseCode::InvalidFramePayloadData => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::MandatoryExtension => 1010,
            CloseCode::InternalError => 1011,
            CloseCode::ServiceRestart => 1012,
            CloseCode::TryAgainLater => 1013,
            CloseCode::BadGateway => 1014,
            CloseCode::TlsHandshakeFailed => 1015,
            CloseCode::Other(code) => *code,
        }
    }

    /// Codes that only ever describe local conditions and MUST NOT appear in
    /// a close frame on the wire (RFC 6455 Section 7.4.1).
    #[must_use]
    pub const fn is_local_only(&self) -> bool {
        matches!(
            self,
            CloseCode::NoStatusReceived | CloseCode::AbnormalClosure | CloseCode::TlsHandshakeFailed
        )
    }

    /// Whether this code is acceptable in a close frame received from the
    /// peer: the registered codes 1000-1003 and 1007-1014 plus the
    /// library/application range 3000-4999.
    #[must_use]
    pub const fn is_valid_on_receive(&self) -> bool {
        let code = self.as_u16();
        matches!(code, 1000..=1003 | 1007..=1014 | 3000..=4999)
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// The opening handshake request (HTTP Upgrade).
///
/// Yielded to a SERVER when a client's upgrade request has been validated;
/// sent by a CLIENT to start the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Request {
    /// Host header value.
    pub host: String,
    /// Request target, kept as the opaque percent-encoded bytes that appear
    /// in the request line.
    pub target: Vec<u8>,
    /// Offered subprotocols, in preference order.
    pub subprotocols: Vec<String>,
    /// Offered extension descriptions (`name[; param=value]*`), as found in
    /// the Sec-WebSocket-Extensions header(s).
    pub extensions: Vec<String>,
    /// Remaining request headers, excluding the WebSocket-specific ones.
    pub extra_headers: Vec<(String, String)>,
}

/// Acceptance of the upgrade request.
///
/// Yielded to a CLIENT when the server switched protocols; sent by a SERVER
/// to accept a pending [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AcceptConnection {
    /// The agreed subprotocol, if any. When sending, must be one the client
    /// offered.
    pub subprotocol: Option<String>,
    /// Accepted extension descriptions.
    pub extensions: Vec<String>,
    /// Additional response headers.
    pub extra_headers: Vec<(String, String)>,
}

/// Rejection of the upgrade request: the non-101 HTTP response head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectConnection {
    /// HTTP status code of the rejection response.
    pub status_code: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// True when body bytes follow as [`RejectData`] events.
    pub has_body: bool,
}

impl Default for RejectConnection {
    fn default() -> Self {
        Self {
            status_code: 400,
            headers: Vec::new(),
            has_body: false,
        }
    }
}

/// A chunk of the rejection response body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RejectData {
    /// Raw body bytes.
    pub data: Vec<u8>,
    /// True on the final chunk.
    pub body_finished: bool,
}

/// A close frame, in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseConnection {
    /// Close status code.
    pub code: CloseCode,
    /// UTF-8 close reason. Truncated to 123 bytes on send.
    pub reason: String,
}

impl CloseConnection {
    /// Build a close event with an empty reason.
    #[must_use]
    pub fn new(code: CloseCode) -> Self {
        Self {
            code,
            reason: String::new(),
        }
    }

    /// The canonical reply completing the closing handshake: a close frame
    /// mirroring the received code and reason.
    #[must_use]
    pub fn response(&self) -> CloseConnection {
        self.clone()
    }
}

impl Default for CloseConnection {
    fn default() -> Self {
        Self::new(CloseCode::Normal)
    }
}

/// A text message, or one fragment of one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextMessage {
    /// Decoded UTF-8 data for this chunk. Multi-byte sequences split across
    /// frame boundaries are carried over, so every chunk is valid on its own.
    pub data: String,
    /// True when this chunk ends a wire frame. Carries no protocol meaning;
    /// it only preserves the peer's fragmentation pattern.
    pub frame_finished: bool,
    /// True when this chunk ends the message. When sending, leave false on
    /// every event but the last to fragment a message.
    pub message_finished: bool,
}

impl TextMessage {
    /// A complete single-frame text message.
    #[must_use]
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            frame_finished: true,
            message_finished: true,
        }
    }
}

/// A binary message, or one fragment of one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BytesMessage {
    /// Payload bytes for this chunk.
    pub data: Vec<u8>,
    /// True when this chunk ends a wire frame.
    pub frame_finished: bool,
    /// True when this chunk ends the message.
    pub message_finished: bool,
}

impl BytesMessage {
    /// A complete single-frame binary message.
    #[must_use]
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            frame_finished: true,
            message_finished: true,
        }
    }
}

/// A ping frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ping {
    /// Application payload, at most 125 bytes.
    pub payload: Vec<u8>,
}

impl Ping {
    /// The canonical reply: a pong echoing the ping payload.
    #[must_use]
    pub fn response(&self) -> Pong {
        Pong {
            payload: self.payload.clone(),
        }
    }
}

/// A pong frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pong {
    /// Application payload, at most 125 bytes.
    pub payload: Vec<u8>,
}

/// Everything that can pass between the engine and the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Event {
    /// Opening handshake request.
    Request(Request),
    /// Handshake accepted.
    AcceptConnection(AcceptConnection),
    /// Handshake rejected (HTTP response head).
    RejectConnection(RejectConnection),
    /// Rejection response body chunk.
    RejectData(RejectData),
    /// Close frame.
    CloseConnection(CloseConnection),
    /// Text data.
    Text(TextMessage),
    /// Binary data.
    Bytes(BytesMessage),
    /// Ping frame.
    Ping(Ping),
    /// Pong frame.
    Pong(Pong),
}

impl From<Request> for Event {
    fn from(e: Request) -> Self {
        Event::Request(e)
    }
}

impl From<AcceptConnection> for Event {
    fn from(e: AcceptConnection) -> Self {
        Event::AcceptConnection(e)
    }
}

impl From<RejectConnection> for Event {
    fn from(e: RejectConnection) -> Self {
        Event::RejectConnection(e)
    }
}

impl From<RejectData> for Event {
    fn from(e: RejectData) -> Self {
        Event::RejectData(e)
    }
}

impl From<CloseConnection> for Event {
    fn from(e: CloseConnection) -> Self {
        Event::CloseConnection(e)
    }
}

impl From<TextMessage> for Event {
    fn from(e: TextMessage) -> Self {
        Event::Text(e)
    }
}

impl From<BytesMessage> for Event {
    fn from(e: BytesMessage) -> Self {
        Event::Bytes(e)
    }
}

impl From<Ping> for Event {
    fn from(e: Ping) -> Self {
        Event::Ping(e)
    }
}

impl From<Pong> for Event {
    fn from(e: Pong) -> Self {
        Event::Pong(e)
    }
}
