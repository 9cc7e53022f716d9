//! Extension framework (RFC 6455 Section 9).
//!
//! Extensions transform frames on both directions and take part in the
//! handshake negotiation. Register zero or more at construction; inbound
//! hooks run in registration order, outbound hooks in reverse order. The
//! sole built-in extension is [`deflate::PerMessageDeflate`].

#[cfg(feature = "deflate")]
pub mod deflate;

use std::fmt;

use crate::connection::Role;
use crate::error::Result;
use crate::protocol::OpCode;

/// A single extension parameter: `name` or `name=value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionParam {
    /// Parameter name, e.g. `client_max_window_bits`.
    pub name: String,
    /// Optional value. `None` for bare flags.
    pub value: Option<String>,
}

impl ExtensionParam {
    /// A parameter carrying a value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// A bare flag parameter.
    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Parse `name`, `name=value` or `name="value"`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        match s.split_once('=') {
            Some((name, value)) => Self {
                name: name.trim().to_string(),
                value: Some(value.trim().trim_matches('"').to_string()),
            },
            None => Self::flag(s),
        }
    }
}

impl fmt::Display for ExtensionParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}={}", self.name, v),
            None => write!(f, "{}", self.name),
        }
    }
}

/// One entry of a Sec-WebSocket-Extensions header: an extension name with
/// its parameters, e.g. `permessage-deflate; client_max_window_bits=15`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionOffer {
    /// Extension name.
    pub name: String,
    /// Parameters following the name.
    pub params: Vec<ExtensionParam>,
}

impl ExtensionOffer {
    /// An offer with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// An offer with parameters.
    pub fn with_params(name: impl Into<String>, params: Vec<ExtensionParam>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Parse one `name[; param]*` entry. Returns `None` for an empty entry.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split(';');
        let name = parts.next()?.trim().to_string();
        if name.is_empty() {
            return None;
        }
        let params = parts.map(ExtensionParam::parse).collect();
        Some(Self { name, params })
    }

    /// Parse a comma-separated header value into its entries. Empty entries
    /// are skipped.
    #[must_use]
    pub fn parse_header(header: &str) -> Vec<Self> {
        header.split(',').filter_map(Self::parse).collect()
    }
}

impl fmt::Display for ExtensionOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for param in &self.params {
            write!(f, "; {param}")?;
        }
        Ok(())
    }
}

/// RSV bit claims. An extension returns from
/// [`Extension::frame_inbound_header`] the bits it accounts for; bits set on
/// the wire that no extension claims fail the frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RsvBits {
    /// RSV1 (used by permessage-deflate).
    pub rsv1: bool,
    /// RSV2.
    pub rsv2: bool,
    /// RSV3.
    pub rsv3: bool,
}

impl RsvBits {
    /// No bits set.
    pub const NONE: Self = Self {
        rsv1: false,
        rsv2: false,
        rsv3: false,
    };

    /// RSV1 only.
    pub const RSV1: Self = Self {
        rsv1: true,
        rsv2: false,
        rsv3: false,
    };

    /// Union of two claims.
    #[must_use]
    pub const fn union(self, other: RsvBits) -> RsvBits {
        RsvBits {
            rsv1: self.rsv1 || other.rsv1,
            rsv2: self.rsv2 || other.rsv2,
            rsv3: self.rsv3 || other.rsv3,
        }
    }

    /// Whether any bit of `self` is set that `claimed` does not cover.
    #[must_use]
    pub const fn exceeds(self, claimed: RsvBits) -> bool {
        (self.rsv1 && !claimed.rsv1)
            || (self.rsv2 && !claimed.rsv2)
            || (self.rsv3 && !claimed.rsv3)
    }

    /// Whether any bit is set.
    #[must_use]
    pub const fn any(self) -> bool {
        self.rsv1 || self.rsv2 || self.rsv3
    }
}

/// The extension capability contract.
///
/// Three negotiation entry points (`offer` on the client, `accept` on the
/// server, `finalize` on the client once the server answered) and four
/// per-frame hooks. Hooks receive the connection [`Role`] so an extension
/// can pick direction-dependent parameters. `Send` keeps connections
/// movable across threads.
pub trait Extension: Send {
    /// Name as it appears in the Sec-WebSocket-Extensions header.
    fn name(&self) -> &str;

    /// Whether negotiation succeeded and the per-frame hooks should run.
    fn enabled(&self) -> bool;

    /// Parameters to offer in the client handshake, or `None` to stay
    /// silent.
    fn offer(&self) -> Option<Vec<ExtensionParam>>;

    /// Evaluate a client offer on the server. Returns the accepted response
    /// parameters, or `None` to decline this extension.
    ///
    /// # Errors
    ///
    /// Implementations may fail on offers that are malformed beyond
    /// declining.
    fn accept(&mut self, params: &[ExtensionParam]) -> Result<Option<Vec<ExtensionParam>>>;

    /// Apply the server's accepted parameters on the client.
    ///
    /// # Errors
    ///
    /// Fails when the server answered with parameters outside what this
    /// extension can honor.
    fn finalize(&mut self, params: &[ExtensionParam]) -> Result<()>;

    /// Inspect a frame header before payload processing. Returns the RSV
    /// bits this extension accounts for on this frame.
    ///
    /// # Errors
    ///
    /// Fails the frame, e.g. RSV1 on a control frame.
    fn frame_inbound_header(
        &mut self,
        role: Role,
        opcode: OpCode,
        rsv: RsvBits,
        payload_len: u64,
    ) -> Result<RsvBits>;

    /// Transform one inbound payload chunk.
    ///
    /// # Errors
    ///
    /// Fails the frame, e.g. on decompression errors.
    fn frame_inbound_payload_data(&mut self, role: Role, data: &[u8]) -> Result<Vec<u8>>;

    /// A frame finished; `fin` tells whether it ended the message. Any
    /// returned bytes are appended to the frame's payload.
    ///
    /// # Errors
    ///
    /// Fails the frame, e.g. on trailing decompression errors.
    fn frame_inbound_complete(&mut self, role: Role, fin: bool) -> Result<Option<Vec<u8>>>;

    /// Transform an outbound frame before serialization, returning the RSV
    /// bits to set and the payload to write.
    ///
    /// # Errors
    ///
    /// Fails the send, e.g. on compression errors.
    fn frame_outbound(
        &mut self,
        role: Role,
        opcode: OpCode,
        rsv: RsvBits,
        data: Vec<u8>,
        fin: bool,
    ) -> Result<(RsvBits, Vec<u8>)>;
}

impl fmt::Debug for dyn Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Extension({})", self.name())
    }
}
