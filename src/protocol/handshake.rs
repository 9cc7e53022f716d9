//! The HTTP opening handshake (RFC 6455 Section 4).
//!
//! [`Handshake`] drives the upgrade negotiation for both roles: it buffers
//! raw bytes, parses request/response heads with `httparse`, validates the
//! WebSocket headers, and emits the HTTP bytes for the caller to write. On
//! success it hands off to a data-phase [`Connection`], carrying over any
//! bytes that followed the head.

use std::collections::VecDeque;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::{Buf, BytesMut};
use log::debug;
use sha1::{Digest, Sha1};

use crate::config::Config;
use crate::connection::{Connection, ConnectionState, Role};
use crate::error::{Error, RemoteProtocolError, Result};
use crate::events::{AcceptConnection, Event, RejectConnection, RejectData, Request};
use crate::extensions::{Extension, ExtensionOffer};

/// GUID mixed into the accept token (RFC 6455 Section 1.3).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The one protocol version this engine speaks.
pub const WS_VERSION: &str = "13";

const MAX_HEADERS: usize = 64;

/// Compute the Sec-WebSocket-Accept token for a Sec-WebSocket-Key.
///
/// ```
/// use wscore::protocol::compute_accept_key;
///
/// let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

fn generate_nonce() -> String {
    let mut raw = [0u8; 16];
    // The nonce guards against cache poisoning, not confidentiality; a
    // clock fallback is acceptable when the entropy source is missing.
    if getrandom::getrandom(&mut raw).is_err() {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        raw[..16].copy_from_slice(&nanos.to_le_bytes());
    }
    BASE64.encode(raw)
}

fn validate_header_value(name: &str, value: &str) -> Result<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(Error::local(format!("{name} header value contains CR or LF")));
    }
    Ok(())
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        101 => "Switching Protocols",
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        426 => "Upgrade Required",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "",
    }
}

fn split_comma_header(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|piece| piece.trim().to_string())
        .filter(|piece| !piece.is_empty())
        .collect()
}

fn reject_hint(status_code: u16) -> Event {
    Event::RejectConnection(RejectConnection {
        status_code,
        headers: Vec::new(),
        has_body: false,
    })
}

/// Headers the engine consumes itself; everything else lands in
/// `extra_headers`.
const CONSUMED_HEADERS: &[&str] = &[
    "host",
    "upgrade",
    "connection",
    "sec-websocket-key",
    "sec-websocket-version",
    "sec-websocket-protocol",
    "sec-websocket-extensions",
    "sec-websocket-accept",
];

/// Progress through the opening negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    ClientStart,
    ClientWaitingResponse,
    ClientRejectBody,
    ServerWaitingRequest,
    ServerSentRejectHead,
    ServerSentRejectBody,
    Done,
}

/// The opening-handshake state machine.
pub struct Handshake {
    role: Role,
    config: Config,
    phase: Phase,
    state: ConnectionState,
    buffer: BytesMut,
    events: VecDeque<Event>,
    extensions: Vec<Box<dyn Extension>>,
    connection: Option<Connection>,
    eof: bool,

    // Client side.
    nonce: Option<String>,
    offered_subprotocols: Vec<String>,
    /// Remaining reject-body bytes when the response carried a
    /// Content-Length; `None` reads until EOF.
    reject_body_remaining: Option<usize>,

    // Server side.
    request_key: Option<String>,
    request_subprotocols: Vec<String>,
    request_extension_offers: Vec<String>,
    request_pending: bool,
}

impl Handshake {
    /// Create a handshake driver with no extensions.
    #[must_use]
    pub fn new(role: Role, config: Config) -> Self {
        Self::with_extensions(role, config, Vec::new())
    }

    /// Create a handshake driver with registered extensions. The client
    /// offers them all; the server accepts the ones the client asks for.
    #[must_use]
    pub fn with_extensions(
        role: Role,
        config: Config,
        extensions: Vec<Box<dyn Extension>>,
    ) -> Self {
        let phase = match role {
            Role::Client => Phase::ClientStart,
            Role::Server => Phase::ServerWaitingRequest,
        };
        Self {
            role,
            config,
            phase,
            state: ConnectionState::Connecting,
            buffer: BytesMut::new(),
            events: VecDeque::new(),
            extensions,
            connection: None,
            eof: false,
            nonce: None,
            offered_subprotocols: Vec::new(),
            reject_body_remaining: None,
            request_key: None,
            request_subprotocols: Vec::new(),
            request_extension_offers: Vec::new(),
            request_pending: false,
        }
    }

    /// Current connection-level state as seen from the handshake.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The established data-phase connection, once the handshake completed.
    #[must_use]
    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Mutable access to the established connection.
    pub fn connection_mut(&mut self) -> Option<&mut Connection> {
        self.connection.as_mut()
    }

    pub(crate) fn pop_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Drain handshake events produced so far.
    pub fn events(&mut self) -> impl Iterator<Item = Event> + '_ {
        std::iter::from_fn(move || self.events.pop_front())
    }

    /// Feed bytes from the transport; `None` means EOF.
    ///
    /// # Errors
    ///
    /// `LocalProtocolError` when called after EOF; `RemoteProtocolError`
    /// when the peer's HTTP head is malformed or violates the upgrade
    /// requirements.
    pub fn receive_data(&mut self, data: Option<&[u8]>) -> Result<()> {
        if let Some(connection) = self.connection.as_mut() {
            return connection.receive_data(data);
        }
        if self.eof {
            return Err(Error::local("receive_data called after EOF"));
        }
        let Some(data) = data else {
            self.eof = true;
            if self.phase == Phase::ClientRejectBody && self.reject_body_remaining.is_none() {
                self.events.push_back(Event::RejectData(RejectData {
                    data: Vec::new(),
                    body_finished: true,
                }));
            }
            self.state = ConnectionState::Closed;
            return Ok(());
        };

        match self.phase {
            Phase::ClientWaitingResponse => {
                self.buffer.extend_from_slice(data);
                self.try_parse_response()
            }
            Phase::ClientRejectBody => {
                self.buffer.extend_from_slice(data);
                self.drain_reject_body();
                Ok(())
            }
            Phase::ServerWaitingRequest => {
                self.buffer.extend_from_slice(data);
                self.try_parse_request()
            }
            // Bytes arriving before the client sent its Request wait in the
            // buffer.
            Phase::ClientStart => {
                self.buffer.extend_from_slice(data);
                Ok(())
            }
            // A rejecting server ignores late client bytes.
            Phase::ServerSentRejectHead | Phase::ServerSentRejectBody => Ok(()),
            Phase::Done => Err(Error::local("connection is closed")),
        }
    }

    /// Send a handshake event, returning the HTTP bytes to write.
    ///
    /// # Errors
    ///
    /// `LocalProtocolError` for events that are illegal in the current
    /// phase or carry malformed fields.
    pub fn send(&mut self, event: Event) -> Result<Vec<u8>> {
        match event {
            Event::Request(request) => self.initiate_connection(&request),
            Event::AcceptConnection(accept) => self.accept(&accept),
            Event::RejectConnection(reject) => self.reject(&reject),
            Event::RejectData(data) => self.send_reject_data(&data),
            other => Err(Error::local(format!(
                "event {other:?} cannot be sent during the handshake"
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Client side
    // ------------------------------------------------------------------

    fn initiate_connection(&mut self, request: &Request) -> Result<Vec<u8>> {
        if self.role != Role::Client {
            return Err(Error::local("only a client can send Request"));
        }
        if self.phase != Phase::ClientStart {
            return Err(Error::local("Request already sent"));
        }
        validate_header_value("Host", &request.host)?;
        for (name, value) in &request.extra_headers {
            validate_header_value(name, value)?;
        }
        if request.target.iter().any(|b| *b == b'\r' || *b == b'\n' || *b == b' ') {
            return Err(Error::local("request target contains whitespace"));
        }

        let nonce = generate_nonce();
        let target: &[u8] = if request.target.is_empty() {
            b"/"
        } else {
            &request.target
        };
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(b"GET ");
        out.extend_from_slice(target);
        out.extend_from_slice(b" HTTP/1.1\r\n");
        push_header(&mut out, "Host", &request.host);
        push_header(&mut out, "Upgrade", "WebSocket");
        push_header(&mut out, "Connection", "Upgrade");
        push_header(&mut out, "Sec-WebSocket-Key", &nonce);
        push_header(&mut out, "Sec-WebSocket-Version", WS_VERSION);

        if !request.subprotocols.is_empty() {
            let joined = request.subprotocols.join(", ");
            validate_header_value("Sec-WebSocket-Protocol", &joined)?;
            push_header(&mut out, "Sec-WebSocket-Protocol", &joined);
        }

        let offers: Vec<String> = self
            .extensions
            .iter()
            .filter_map(|ext| {
                ext.offer().map(|params| {
                    ExtensionOffer::with_params(ext.name(), params).to_string()
                })
            })
            .collect();
        if !offers.is_empty() {
            push_header(&mut out, "Sec-WebSocket-Extensions", &offers.join(", "));
        }

        for (name, value) in &request.extra_headers {
            push_header(&mut out, name, value);
        }
        out.extend_from_slice(b"\r\n");

        self.nonce = Some(nonce);
        self.offered_subprotocols = request.subprotocols.clone();
        self.phase = Phase::ClientWaitingResponse;
        Ok(out)
    }

    fn try_parse_response(&mut self) -> Result<()> {
        let (status, headers, head_len) = {
            let mut parsed = [httparse::EMPTY_HEADER; MAX_HEADERS];
            let mut response = httparse::Response::new(&mut parsed);
            match response.parse(&self.buffer) {
                Ok(httparse::Status::Complete(head_len)) => {
                    let status = response.code.unwrap_or(0);
                    let headers = collect_headers(response.headers);
                    (status, headers, head_len)
                }
                Ok(httparse::Status::Partial) => {
                    if self.buffer.len() > self.config.limits.max_handshake_size {
                        return Err(self.fail(RemoteProtocolError::without_hint(
                            "handshake response exceeds size limit",
                        )));
                    }
                    return Ok(());
                }
                Err(err) => {
                    return Err(self.fail(RemoteProtocolError::without_hint(format!(
                        "bad HTTP response: {err}"
                    ))));
                }
            }
        };
        self.buffer.advance(head_len);

        if status == 101 {
            let accept = self.establish_client_connection(&headers)?;
            debug!("handshake accepted, subprotocol {:?}", accept.subprotocol);
            self.events.push_back(Event::AcceptConnection(accept));
            Ok(())
        } else if (100..200).contains(&status) {
            // A 1xx other than 101 cannot carry a body; treat it as an
            // upgrade rejection.
            debug!("handshake rejected with informational status {status}");
            self.events.push_back(Event::RejectConnection(RejectConnection {
                status_code: status,
                headers,
                has_body: false,
            }));
            self.phase = Phase::Done;
            self.state = ConnectionState::Closed;
            Ok(())
        } else {
            debug!("handshake rejected with status {status}");
            self.reject_body_remaining = headers
                .iter()
                .find(|(name, _)| name == "content-length")
                .and_then(|(_, value)| value.trim().parse::<usize>().ok());
            self.events.push_back(Event::RejectConnection(RejectConnection {
                status_code: status,
                headers,
                has_body: true,
            }));
            self.phase = Phase::ClientRejectBody;
            self.state = ConnectionState::Rejecting;
            self.drain_reject_body();
            Ok(())
        }
    }

    fn drain_reject_body(&mut self) {
        match self.reject_body_remaining {
            Some(remaining) => {
                let take = remaining.min(self.buffer.len());
                let data = self.buffer.split_to(take).to_vec();
                let left = remaining - take;
                self.reject_body_remaining = Some(left);
                let body_finished = left == 0;
                if !data.is_empty() || body_finished {
                    self.events.push_back(Event::RejectData(RejectData {
                        data,
                        body_finished,
                    }));
                }
                if body_finished {
                    self.phase = Phase::Done;
                    self.state = ConnectionState::Closed;
                }
            }
            None => {
                // No Content-Length: the body runs until EOF.
                if !self.buffer.is_empty() {
                    let data = self.buffer.split_to(self.buffer.len()).to_vec();
                    self.events.push_back(Event::RejectData(RejectData {
                        data,
                        body_finished: false,
                    }));
                }
            }
        }
    }

    fn establish_client_connection(
        &mut self,
        headers: &[(String, String)],
    ) -> Result<AcceptConnection> {
        let header = |name: &str| -> Option<String> {
            let values: Vec<&str> = headers
                .iter()
                .filter(|(n, _)| n == name)
                .map(|(_, v)| v.as_str())
                .collect();
            if values.is_empty() {
                None
            } else {
                Some(values.join(", "))
            }
        };

        let connection = header("connection").unwrap_or_default();
        if !split_comma_header(&connection)
            .iter()
            .any(|token| token.eq_ignore_ascii_case("upgrade"))
        {
            return Err(self.fail(RemoteProtocolError::without_hint(
                "missing header, 'Connection: Upgrade'",
            )));
        }

        let upgrade = header("upgrade").unwrap_or_default();
        if !upgrade.trim().eq_ignore_ascii_case("websocket") {
            return Err(self.fail(RemoteProtocolError::without_hint(
                "missing header, 'Upgrade: websocket'",
            )));
        }

        let nonce = self.nonce.as_deref().expect("Request was sent first");
        let expected = compute_accept_key(nonce);
        if header("sec-websocket-accept").as_deref() != Some(expected.as_str()) {
            return Err(self.fail(RemoteProtocolError::without_hint("bad accept token")));
        }

        let subprotocol = header("sec-websocket-protocol");
        if let Some(ref proto) = subprotocol {
            if !self.offered_subprotocols.iter().any(|p| p == proto) {
                return Err(self.fail(RemoteProtocolError::without_hint(format!(
                    "unrecognized subprotocol {proto}"
                ))));
            }
        }

        let mut accepted = Vec::new();
        if let Some(raw) = header("sec-websocket-extensions") {
            for offer in ExtensionOffer::parse_header(&raw) {
                let Some(extension) = self
                    .extensions
                    .iter_mut()
                    .find(|e| e.name() == offer.name)
                else {
                    return Err(self.fail(RemoteProtocolError::without_hint(format!(
                        "unrecognized extension {}",
                        offer.name
                    ))));
                };
                if let Err(err) = extension.finalize(&offer.params) {
                    return Err(match err {
                        Error::Remote(remote) => self.fail(remote),
                        other => other,
                    });
                }
                accepted.push(offer.to_string());
            }
        }

        let extra_headers: Vec<(String, String)> = headers
            .iter()
            .filter(|(name, _)| !CONSUMED_HEADERS.contains(&name.as_str()))
            .cloned()
            .collect();

        self.phase = Phase::Done;
        self.state = ConnectionState::Open;
        let extensions = std::mem::take(&mut self.extensions);
        let trailing = self.buffer.split_to(self.buffer.len());
        self.connection = Some(Connection::with_trailing_data(
            self.role,
            extensions,
            self.config.clone(),
            &trailing,
        ));

        Ok(AcceptConnection {
            subprotocol,
            extensions: accepted,
            extra_headers,
        })
    }

    // ------------------------------------------------------------------
    // Server side
    // ------------------------------------------------------------------

    fn try_parse_request(&mut self) -> Result<()> {
        let (method, target, version, headers, head_len) = {
            let mut parsed = [httparse::EMPTY_HEADER; MAX_HEADERS];
            let mut request = httparse::Request::new(&mut parsed);
            match request.parse(&self.buffer) {
                Ok(httparse::Status::Complete(head_len)) => (
                    request.method.unwrap_or_default().to_string(),
                    request.path.unwrap_or_default().as_bytes().to_vec(),
                    request.version.unwrap_or(0),
                    collect_headers(request.headers),
                    head_len,
                ),
                Ok(httparse::Status::Partial) => {
                    if self.buffer.len() > self.config.limits.max_handshake_size {
                        return Err(self.fail(RemoteProtocolError::with_hint(
                            "handshake request exceeds size limit",
                            reject_hint(400),
                        )));
                    }
                    return Ok(());
                }
                Err(err) => {
                    return Err(self.fail(RemoteProtocolError::with_hint(
                        format!("bad HTTP request: {err}"),
                        reject_hint(400),
                    )));
                }
            }
        };
        self.buffer.advance(head_len);

        if method != "GET" {
            return Err(self.fail(RemoteProtocolError::with_hint(
                "request method must be GET",
                reject_hint(400),
            )));
        }
        if version < 1 {
            return Err(self.fail(RemoteProtocolError::with_hint(
                "HTTP/1.1 or later required",
                reject_hint(400),
            )));
        }

        let mut host = None;
        let mut key = None;
        let mut version_header = None;
        let mut upgrade = String::new();
        let mut connection_tokens: Option<Vec<String>> = None;
        let mut subprotocols = Vec::new();
        let mut extension_offers = Vec::new();
        let mut extra_headers = Vec::new();

        for (name, value) in &headers {
            match name.as_str() {
                "host" => host = Some(value.clone()),
                "sec-websocket-key" => key = Some(value.clone()),
                "sec-websocket-version" => version_header = Some(value.clone()),
                "upgrade" => upgrade = value.clone(),
                "connection" => {
                    connection_tokens
                        .get_or_insert_with(Vec::new)
                        .extend(split_comma_header(value));
                }
                "sec-websocket-protocol" => subprotocols.extend(split_comma_header(value)),
                "sec-websocket-extensions" => extension_offers.extend(split_comma_header(value)),
                _ => extra_headers.push((name.clone(), value.clone())),
            }
        }

        if !connection_tokens
            .unwrap_or_default()
            .iter()
            .any(|token| token.eq_ignore_ascii_case("upgrade"))
        {
            return Err(self.fail(RemoteProtocolError::with_hint(
                "missing header, 'Connection: Upgrade'",
                reject_hint(400),
            )));
        }
        match version_header.as_deref() {
            Some(WS_VERSION) => {}
            other => {
                let status = if other.is_some() { 426 } else { 400 };
                return Err(self.fail(RemoteProtocolError::with_hint(
                    "missing header, 'Sec-WebSocket-Version: 13'",
                    Event::RejectConnection(RejectConnection {
                        status_code: status,
                        headers: vec![("Sec-WebSocket-Version".into(), WS_VERSION.into())],
                        has_body: false,
                    }),
                )));
            }
        }
        let Some(key) = key else {
            return Err(self.fail(RemoteProtocolError::with_hint(
                "missing header, 'Sec-WebSocket-Key'",
                reject_hint(400),
            )));
        };
        match BASE64.decode(key.as_bytes()) {
            Ok(decoded) if decoded.len() == 16 => {}
            _ => {
                return Err(self.fail(RemoteProtocolError::with_hint(
                    "Sec-WebSocket-Key is not base64 of 16 bytes",
                    reject_hint(400),
                )));
            }
        }
        if !upgrade.trim().eq_ignore_ascii_case("websocket") {
            return Err(self.fail(RemoteProtocolError::with_hint(
                "missing header, 'Upgrade: websocket'",
                reject_hint(400),
            )));
        }
        let Some(host) = host else {
            return Err(self.fail(RemoteProtocolError::with_hint(
                "missing header, 'Host'",
                reject_hint(400),
            )));
        };

        self.request_key = Some(key);
        self.request_subprotocols = subprotocols.clone();
        self.request_extension_offers = extension_offers.clone();
        self.request_pending = true;

        self.events.push_back(Event::Request(Request {
            host,
            target,
            subprotocols,
            extensions: extension_offers,
            extra_headers,
        }));
        Ok(())
    }

    fn accept(&mut self, accept: &AcceptConnection) -> Result<Vec<u8>> {
        if self.role != Role::Server {
            return Err(Error::local("only a server can send AcceptConnection"));
        }
        if !self.request_pending {
            return Err(Error::local("no request to accept"));
        }

        let key = self.request_key.as_deref().expect("request was parsed");
        let accept_token = compute_accept_key(key);

        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
        push_header(&mut out, "Upgrade", "WebSocket");
        push_header(&mut out, "Connection", "Upgrade");
        push_header(&mut out, "Sec-WebSocket-Accept", &accept_token);

        if let Some(ref subprotocol) = accept.subprotocol {
            if !self.request_subprotocols.iter().any(|p| p == subprotocol) {
                return Err(Error::local(format!(
                    "unexpected subprotocol {subprotocol}"
                )));
            }
            validate_header_value("Sec-WebSocket-Protocol", subprotocol)?;
            push_header(&mut out, "Sec-WebSocket-Protocol", subprotocol);
        }

        let mut accepted = Vec::new();
        for raw in std::mem::take(&mut self.request_extension_offers) {
            let Some(offer) = ExtensionOffer::parse(&raw) else {
                continue;
            };
            if let Some(extension) = self
                .extensions
                .iter_mut()
                .find(|e| e.name() == offer.name && !e.enabled())
            {
                if let Some(params) = extension.accept(&offer.params)? {
                    accepted.push(ExtensionOffer::with_params(offer.name, params).to_string());
                }
            }
        }
        if !accepted.is_empty() {
            push_header(&mut out, "Sec-WebSocket-Extensions", &accepted.join(", "));
        }

        for (name, value) in &accept.extra_headers {
            validate_header_value(name, value)?;
            push_header(&mut out, name, value);
        }
        out.extend_from_slice(b"\r\n");

        debug!(
            "accepting upgrade, subprotocol {:?}, extensions {:?}",
            accept.subprotocol, accepted
        );

        self.phase = Phase::Done;
        self.state = ConnectionState::Open;
        self.request_pending = false;
        let extensions = std::mem::take(&mut self.extensions);
        let trailing = self.buffer.split_to(self.buffer.len());
        self.connection = Some(Connection::with_trailing_data(
            self.role,
            extensions,
            self.config.clone(),
            &trailing,
        ));
        Ok(out)
    }

    fn reject(&mut self, reject: &RejectConnection) -> Result<Vec<u8>> {
        if self.role != Role::Server {
            return Err(Error::local("only a server can send RejectConnection"));
        }
        if self.state != ConnectionState::Connecting {
            return Err(Error::local(format!(
                "connection cannot be rejected in state {}",
                self.state
            )));
        }

        debug!("rejecting upgrade with status {}", reject.status_code);

        let mut out = Vec::with_capacity(128);
        out.extend_from_slice(
            format!(
                "HTTP/1.1 {} {}\r\n",
                reject.status_code,
                reason_phrase(reject.status_code)
            )
            .as_bytes(),
        );
        for (name, value) in &reject.headers {
            validate_header_value(name, value)?;
            push_header(&mut out, name, value);
        }
        if !reject.has_body {
            push_header(&mut out, "Content-Length", "0");
        }
        out.extend_from_slice(b"\r\n");

        if reject.has_body {
            self.phase = Phase::ServerSentRejectHead;
            self.state = ConnectionState::Rejecting;
        } else {
            self.phase = Phase::Done;
            self.state = ConnectionState::Closed;
        }
        Ok(out)
    }

    fn send_reject_data(&mut self, data: &RejectData) -> Result<Vec<u8>> {
        if !matches!(
            self.phase,
            Phase::ServerSentRejectHead | Phase::ServerSentRejectBody
        ) {
            return Err(Error::local(format!(
                "cannot send rejection data in state {}",
                self.state
            )));
        }
        self.phase = Phase::ServerSentRejectBody;
        if data.body_finished {
            self.phase = Phase::Done;
            self.state = ConnectionState::Closed;
        }
        Ok(data.data.clone())
    }

    /// Record the terminal state a remote violation leaves behind.
    fn fail(&mut self, error: RemoteProtocolError) -> Error {
        self.phase = Phase::Done;
        self.state = ConnectionState::Closed;
        Error::Remote(error)
    }
}

fn push_header(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(b"\r\n");
}

/// Lowercase header names; values are decoded lossily, which keeps the
/// ASCII-only WebSocket headers intact.
fn collect_headers(headers: &[httparse::Header<'_>]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|h| {
            (
                h.name.to_ascii_lowercase(),
                String::from_utf8_lossy(h.value).trim().to_string(),
            )
        })
        .collect()
}
