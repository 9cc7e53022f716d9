//! Message assembly and frame-level protocol rules.
//!
//! [`FrameProtocol`] sits between the frame codec and the connection: it
//! groups inbound frames into messages, enforces fragmentation and close
//! rules, and serializes outbound data through the extension pipeline.

use crate::config::Config;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::events::CloseCode;
use crate::extensions::{Extension, RsvBits};
use crate::protocol::frame::{FrameDecoder, FrameEncoder, MAX_CONTROL_FRAME_PAYLOAD};
use crate::protocol::utf8::{decode_utf8, Utf8Decoder};
use crate::protocol::OpCode;

/// A protocol-level frame produced by [`FrameProtocol::next_frame`]: data
/// chunks with their fragmentation flags, or a whole control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// A text chunk, decoded and validated.
    Text {
        /// Decoded text for this chunk.
        data: String,
        /// End of the wire frame.
        frame_finished: bool,
        /// End of the message.
        message_finished: bool,
    },
    /// A binary chunk.
    Bytes {
        /// Payload bytes for this chunk.
        data: Vec<u8>,
        /// End of the wire frame.
        frame_finished: bool,
        /// End of the message.
        message_finished: bool,
    },
    /// A ping frame.
    Ping(Vec<u8>),
    /// A pong frame.
    Pong(Vec<u8>),
    /// The peer's close frame, decoded per the close-code policy.
    Close {
        /// Received close code; 1005 when the payload was empty.
        code: CloseCode,
        /// Close reason text.
        reason: String,
    },
}

/// Frame-to-message layer over the codec.
pub struct FrameProtocol {
    role: Role,
    extensions: Vec<Box<dyn Extension>>,
    decoder: FrameDecoder,
    encoder: FrameEncoder,
    config: Config,

    // Inbound message state.
    inbound_opcode: Option<OpCode>,
    utf8: Option<Utf8Decoder>,
    inbound_message_size: usize,
    peer_closed: bool,

    // Outbound message state.
    outbound_opcode: Option<OpCode>,
}

impl FrameProtocol {
    /// Create the protocol layer for a role with already-negotiated
    /// extensions.
    #[must_use]
    pub fn new(role: Role, extensions: Vec<Box<dyn Extension>>, config: Config) -> Self {
        let decoder = FrameDecoder::new(role, config.limits.max_frame_size);
        Self {
            role,
            extensions,
            decoder,
            encoder: FrameEncoder::new(role),
            config,
            inbound_opcode: None,
            utf8: None,
            inbound_message_size: 0,
            peer_closed: false,
            outbound_opcode: None,
        }
    }

    /// Replace the mask generator seed, making client-side output
    /// deterministic.
    pub fn reseed_mask(&mut self, seed: u32) {
        self.encoder = FrameEncoder::with_seed(self.role, seed);
    }

    /// Feed raw bytes from the transport.
    pub fn receive_bytes(&mut self, data: &[u8]) {
        self.decoder.receive_bytes(data);
    }

    /// Whether the peer's close frame has been surfaced.
    #[must_use]
    pub fn peer_closed(&self) -> bool {
        self.peer_closed
    }

    /// Pull the next protocol frame. `None` when more bytes are needed, and
    /// always after the peer's close frame has been delivered.
    ///
    /// # Errors
    ///
    /// `RemoteProtocolError` on framing violations, fragmentation misuse,
    /// invalid UTF-8, invalid close payloads, or an oversized message.
    pub fn next_frame(&mut self) -> Result<Option<InboundFrame>> {
        if self.peer_closed {
            return Ok(None);
        }

        let Some(chunk) = self.decoder.next_frame(&mut self.extensions)? else {
            return Ok(None);
        };

        if chunk.opcode.is_control() {
            return match chunk.opcode {
                OpCode::Ping => Ok(Some(InboundFrame::Ping(chunk.payload))),
                OpCode::Pong => Ok(Some(InboundFrame::Pong(chunk.payload))),
                _ => {
                    let (code, reason) = process_close_payload(&chunk.payload)?;
                    self.peer_closed = true;
                    Ok(Some(InboundFrame::Close { code, reason }))
                }
            };
        }

        if chunk.opcode == OpCode::Continuation {
            if self.inbound_opcode.is_none() {
                return Err(Error::remote_close(
                    "unexpected continuation frame",
                    CloseCode::ProtocolError,
                ));
            }
        } else {
            if self.inbound_opcode.is_some() {
                return Err(Error::remote_close(
                    format!("expected continuation frame, got {}", chunk.opcode),
                    CloseCode::ProtocolError,
                ));
            }
            self.inbound_opcode = Some(chunk.opcode);
            if chunk.opcode == OpCode::Text {
                self.utf8 = Some(Utf8Decoder::new());
            }
        }

        self.inbound_message_size += chunk.payload.len();
        if self.inbound_message_size > self.config.limits.max_message_size {
            return Err(Error::remote_close(
                format!(
                    "message exceeds {} bytes",
                    self.config.limits.max_message_size
                ),
                CloseCode::MessageTooBig,
            ));
        }

        let message_finished = chunk.message_finished;
        let frame = match self.inbound_opcode.expect("latched above") {
            OpCode::Text => {
                let decoder = self.utf8.as_mut().expect("created with the text opcode");
                InboundFrame::Text {
                    data: decoder.decode(&chunk.payload, message_finished)?,
                    frame_finished: chunk.frame_finished,
                    message_finished,
                }
            }
            _ => InboundFrame::Bytes {
                data: chunk.payload,
                frame_finished: chunk.frame_finished,
                message_finished,
            },
        };

        if message_finished {
            self.inbound_opcode = None;
            self.utf8 = None;
            self.inbound_message_size = 0;
        }

        Ok(Some(frame))
    }

    /// Serialize a text message or fragment.
    ///
    /// # Errors
    ///
    /// `LocalProtocolError` when the data type flips mid-message.
    pub fn send_text(&mut self, data: &str, fin: bool) -> Result<Vec<u8>> {
        self.send_data(OpCode::Text, data.as_bytes().to_vec(), fin)
    }

    /// Serialize a binary message or fragment.
    ///
    /// # Errors
    ///
    /// `LocalProtocolError` when the data type flips mid-message.
    pub fn send_binary(&mut self, data: Vec<u8>, fin: bool) -> Result<Vec<u8>> {
        self.send_data(OpCode::Binary, data, fin)
    }

    fn send_data(&mut self, opcode: OpCode, payload: Vec<u8>, fin: bool) -> Result<Vec<u8>> {
        let wire_opcode = match self.outbound_opcode {
            None => {
                self.outbound_opcode = Some(opcode);
                opcode
            }
            Some(open) if open == opcode => OpCode::Continuation,
            Some(open) => {
                return Err(Error::local(format!(
                    "message started as {open}, cannot continue as {opcode}"
                )));
            }
        };
        if fin {
            self.outbound_opcode = None;
        }
        self.serialize(wire_opcode, payload, fin)
    }

    /// Serialize a ping frame.
    ///
    /// # Errors
    ///
    /// `LocalProtocolError` when the payload exceeds 125 bytes.
    pub fn ping(&mut self, payload: Vec<u8>) -> Result<Vec<u8>> {
        self.control(OpCode::Ping, payload)
    }

    /// Serialize a pong frame.
    ///
    /// # Errors
    ///
    /// `LocalProtocolError` when the payload exceeds 125 bytes.
    pub fn pong(&mut self, payload: Vec<u8>) -> Result<Vec<u8>> {
        self.control(OpCode::Pong, payload)
    }

    fn control(&mut self, opcode: OpCode, payload: Vec<u8>) -> Result<Vec<u8>> {
        if payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
            return Err(Error::local(format!(
                "{opcode} payload of {} bytes exceeds the 125-byte control frame limit",
                payload.len()
            )));
        }
        self.serialize(opcode, payload, true)
    }

    /// Serialize a close frame.
    ///
    /// Sending 1005 (NoStatusReceived) produces an empty payload. The
    /// local-only codes 1006 and 1015 are rewritten to 1000. The reason is
    /// truncated to 123 bytes on a character boundary.
    ///
    /// # Errors
    ///
    /// `LocalProtocolError` when a reason is given with code 1005.
    pub fn close(&mut self, code: CloseCode, reason: &str) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        if code == CloseCode::NoStatusReceived {
            if !reason.is_empty() {
                return Err(Error::local("cannot send a close reason without a code"));
            }
        } else {
            let code = if code.is_local_only() {
                CloseCode::Normal
            } else {
                code
            };
            payload.extend_from_slice(&code.as_u16().to_be_bytes());
            payload.extend_from_slice(truncate_utf8(reason, MAX_CONTROL_FRAME_PAYLOAD - 2));
        }
        self.serialize(OpCode::Close, payload, true)
    }

    fn serialize(&mut self, opcode: OpCode, payload: Vec<u8>, fin: bool) -> Result<Vec<u8>> {
        let mut rsv = RsvBits::NONE;
        let mut payload = payload;
        // Outbound hooks run in reverse registration order.
        for extension in self
            .extensions
            .iter_mut()
            .rev()
            .filter(|e| e.enabled())
        {
            let (next_rsv, next_payload) =
                extension.frame_outbound(self.role, opcode, rsv, payload, fin)?;
            rsv = next_rsv;
            payload = next_payload;
        }
        Ok(self.encoder.serialize(fin, rsv, opcode, &payload))
    }
}

/// Decode a close frame payload per the receive policy.
fn process_close_payload(payload: &[u8]) -> Result<(CloseCode, String)> {
    match payload.len() {
        0 => Ok((CloseCode::NoStatusReceived, String::new())),
        1 => Err(Error::remote_close(
            "close frame with a 1-byte payload",
            CloseCode::ProtocolError,
        )),
        _ => {
            let code = CloseCode::from_u16(u16::from_be_bytes([payload[0], payload[1]]));
            if !code.is_valid_on_receive() {
                return Err(Error::remote_close(
                    format!("invalid close code {code}"),
                    CloseCode::ProtocolError,
                ));
            }
            let reason = decode_utf8(&payload[2..])?.to_owned();
            Ok((code, reason))
        }
    }
}

/// Cut `s` to at most `max` bytes without splitting a character.
fn truncate_utf8(s: &str, max: usize) -> &[u8] {
    if s.len() <= max {
        return s.as_bytes();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].as_bytes()
}
