//! Per-message DEFLATE compression (RFC 7692).

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress};

use crate::connection::Role;
use crate::error::{Error, RemoteProtocolError, Result};
use crate::events::CloseCode;
use crate::extensions::{Extension, ExtensionParam, RsvBits};
use crate::protocol::OpCode;

const MIN_WINDOW_BITS: u8 = 9;
const MAX_WINDOW_BITS: u8 = 15;
const DEFAULT_WINDOW_BITS: u8 = 15;
const DEFLATE_TRAILER: [u8; 4] = [0x00, 0x00, 0xff, 0xff];
const CHUNK: usize = 4096;

/// Negotiation parameters and compression settings.
#[derive(Debug, Clone)]
pub struct DeflateConfig {
    /// Client discards its compression context after each message.
    pub client_no_context_takeover: bool,
    /// Server discards its compression context after each message.
    pub server_no_context_takeover: bool,
    /// Client's LZ77 window size exponent, 9-15.
    pub client_max_window_bits: u8,
    /// Server's LZ77 window size exponent, 9-15.
    pub server_max_window_bits: u8,
    /// Compression level, 0-9. Default 6.
    pub compression_level: u32,
}

impl Default for DeflateConfig {
    fn default() -> Self {
        Self {
            client_no_context_takeover: false,
            server_no_context_takeover: false,
            client_max_window_bits: DEFAULT_WINDOW_BITS,
            server_max_window_bits: DEFAULT_WINDOW_BITS,
            compression_level: 6,
        }
    }
}

impl DeflateConfig {
    /// Defaults: full windows, context takeover both ways, level 6.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `client_no_context_takeover`.
    #[must_use]
    pub fn client_no_context_takeover(mut self, value: bool) -> Self {
        self.client_no_context_takeover = value;
        self
    }

    /// Set `server_no_context_takeover`.
    #[must_use]
    pub fn server_no_context_takeover(mut self, value: bool) -> Self {
        self.server_no_context_takeover = value;
        self
    }

    /// Set `client_max_window_bits` (9-15).
    ///
    /// # Errors
    ///
    /// Fails on values outside 9-15.
    pub fn client_max_window_bits(mut self, bits: u8) -> Result<Self> {
        if !(MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&bits) {
            return Err(Error::local(format!(
                "client_max_window_bits must be {MIN_WINDOW_BITS}-{MAX_WINDOW_BITS}, got {bits}"
            )));
        }
        self.client_max_window_bits = bits;
        Ok(self)
    }

    /// Set `server_max_window_bits` (9-15).
    ///
    /// # Errors
    ///
    /// Fails on values outside 9-15.
    pub fn server_max_window_bits(mut self, bits: u8) -> Result<Self> {
        if !(MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&bits) {
            return Err(Error::local(format!(
                "server_max_window_bits must be {MIN_WINDOW_BITS}-{MAX_WINDOW_BITS}, got {bits}"
            )));
        }
        self.server_max_window_bits = bits;
        Ok(self)
    }

    /// Set the compression level (0-9).
    ///
    /// # Errors
    ///
    /// Fails on levels above 9.
    pub fn compression_level(mut self, level: u32) -> Result<Self> {
        if level > 9 {
            return Err(Error::local(format!(
                "compression_level must be 0-9, got {level}"
            )));
        }
        self.compression_level = level;
        Ok(self)
    }
}

/// The permessage-deflate extension.
///
/// Holds the persistent compressor/decompressor contexts that context
/// takeover requires; with `no_context_takeover` in a direction, the
/// corresponding context is dropped after every message.
pub struct PerMessageDeflate {
    config: DeflateConfig,
    enabled: bool,
    compressor: Option<Compress>,
    decompressor: Option<Decompress>,
    /// Whether the current inbound frame carries message data (control
    /// frames pass through untouched).
    inbound_is_compressible: Option<bool>,
    /// Whether the current inbound message is compressed. Latched from RSV1
    /// of its first data frame and held until the message finishes.
    inbound_compressed: Option<bool>,
}

impl PerMessageDeflate {
    /// Create the extension with the given parameters.
    #[must_use]
    pub fn new(config: DeflateConfig) -> Self {
        Self {
            config,
            enabled: false,
            compressor: None,
            decompressor: None,
            inbound_is_compressible: None,
            inbound_compressed: None,
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &DeflateConfig {
        &self.config
    }

    #[cfg(test)]
    pub(crate) fn force_enabled(&mut self) {
        self.enabled = true;
    }

    fn parse_window_bits(value: Option<&str>) -> Option<u8> {
        match value {
            Some(s) => match s.parse::<u8>() {
                Ok(bits) if (MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&bits) => Some(bits),
                _ => None,
            },
            None => None,
        }
    }

    fn send_window_bits(&self, role: Role) -> u8 {
        match role {
            Role::Client => self.config.client_max_window_bits,
            Role::Server => self.config.server_max_window_bits,
        }
    }

    fn recv_window_bits(&self, role: Role) -> u8 {
        match role {
            Role::Client => self.config.server_max_window_bits,
            Role::Server => self.config.client_max_window_bits,
        }
    }

    fn send_no_takeover(&self, role: Role) -> bool {
        match role {
            Role::Client => self.config.client_no_context_takeover,
            Role::Server => self.config.server_no_context_takeover,
        }
    }

    fn recv_no_takeover(&self, role: Role) -> bool {
        match role {
            Role::Client => self.config.server_no_context_takeover,
            Role::Server => self.config.client_no_context_takeover,
        }
    }

    fn deflate(&mut self, role: Role, data: &[u8], flush: bool) -> Result<Vec<u8>> {
        if self.compressor.is_none() {
            let level = Compression::new(self.config.compression_level);
            self.compressor = Some(Compress::new_with_window_bits(
                level,
                false,
                self.send_window_bits(role),
            ));
        }
        let compressor = self.compressor.as_mut().expect("compressor just created");

        let mut out = Vec::with_capacity(data.len() / 2 + 16);
        let mut pos = 0;
        while pos < data.len() {
            let before_in = compressor.total_in();
            let before_out = compressor.total_out();
            let old = out.len();
            out.resize(old + CHUNK, 0);
            compressor
                .compress(&data[pos..], &mut out[old..], FlushCompress::None)
                .map_err(|e| Error::local(format!("deflate failed: {e}")))?;
            let consumed = (compressor.total_in() - before_in) as usize;
            let produced = (compressor.total_out() - before_out) as usize;
            out.truncate(old + produced);
            pos += consumed;
            if consumed == 0 && produced == 0 {
                break;
            }
        }

        if flush {
            loop {
                let before_out = compressor.total_out();
                let old = out.len();
                out.resize(old + CHUNK, 0);
                compressor
                    .compress(&[], &mut out[old..], FlushCompress::Sync)
                    .map_err(|e| Error::local(format!("deflate flush failed: {e}")))?;
                let produced = (compressor.total_out() - before_out) as usize;
                out.truncate(old + produced);
                if produced < CHUNK {
                    break;
                }
            }
            if out.ends_with(&DEFLATE_TRAILER) {
                out.truncate(out.len() - DEFLATE_TRAILER.len());
            }
        }

        Ok(out)
    }

    fn inflate(&mut self, role: Role, data: &[u8]) -> Result<Vec<u8>> {
        if self.decompressor.is_none() {
            self.decompressor = Some(Decompress::new_with_window_bits(
                false,
                self.recv_window_bits(role),
            ));
        }
        let decompressor = self.decompressor.as_mut().expect("decompressor just created");

        let mut out = Vec::with_capacity(data.len() * 2);
        let mut pos = 0;
        while pos < data.len() {
            let before_in = decompressor.total_in();
            let before_out = decompressor.total_out();
            let old = out.len();
            out.resize(old + CHUNK, 0);
            decompressor
                .decompress(&data[pos..], &mut out[old..], FlushDecompress::None)
                .map_err(|e| {
                    Error::Remote(RemoteProtocolError::close(
                        format!("decompression failed: {e}"),
                        CloseCode::InvalidFramePayloadData,
                    ))
                })?;
            let consumed = (decompressor.total_in() - before_in) as usize;
            let produced = (decompressor.total_out() - before_out) as usize;
            out.truncate(old + produced);
            pos += consumed;
            if consumed == 0 && produced == 0 {
                break;
            }
        }

        // The output buffer may have filled exactly as the input ran out;
        // keep draining until the decompressor goes quiet.
        loop {
            let before_out = decompressor.total_out();
            let old = out.len();
            out.resize(old + CHUNK, 0);
            decompressor
                .decompress(&[], &mut out[old..], FlushDecompress::None)
                .map_err(|e| {
                    Error::Remote(RemoteProtocolError::close(
                        format!("decompression failed: {e}"),
                        CloseCode::InvalidFramePayloadData,
                    ))
                })?;
            let produced = (decompressor.total_out() - before_out) as usize;
            out.truncate(old + produced);
            if produced == 0 {
                break;
            }
        }
        Ok(out)
    }
}

impl Extension for PerMessageDeflate {
    fn name(&self) -> &str {
        "permessage-deflate"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn offer(&self) -> Option<Vec<ExtensionParam>> {
        let mut params = vec![
            ExtensionParam::new(
                "client_max_window_bits",
                self.config.client_max_window_bits.to_string(),
            ),
            ExtensionParam::new(
                "server_max_window_bits",
                self.config.server_max_window_bits.to_string(),
            ),
        ];
        if self.config.client_no_context_takeover {
            params.push(ExtensionParam::flag("client_no_context_takeover"));
        }
        if self.config.server_no_context_takeover {
            params.push(ExtensionParam::flag("server_no_context_takeover"));
        }
        Some(params)
    }

    fn accept(&mut self, params: &[ExtensionParam]) -> Result<Option<Vec<ExtensionParam>>> {
        let mut client_bits = None;
        let mut server_bits = None;

        for param in params {
            match param.name.as_str() {
                "client_no_context_takeover" => {
                    self.config.client_no_context_takeover = true;
                }
                "server_no_context_takeover" => {
                    self.config.server_no_context_takeover = true;
                }
                "client_max_window_bits" => {
                    if param.value.is_some() {
                        match Self::parse_window_bits(param.value.as_deref()) {
                            Some(bits) => client_bits = Some(bits),
                            None => return Ok(None),
                        }
                    } else {
                        // Offered as a bare flag: we pick the value, and the
                        // response must carry it.
                        client_bits = Some(self.config.client_max_window_bits);
                    }
                }
                "server_max_window_bits" => {
                    if param.value.is_some() {
                        match Self::parse_window_bits(param.value.as_deref()) {
                            Some(bits) => server_bits = Some(bits),
                            None => return Ok(None),
                        }
                    } else {
                        // Same bare-flag handling as client_max_window_bits.
                        server_bits = Some(self.config.server_max_window_bits);
                    }
                }
                _ => return Ok(None),
            }
        }

        let mut response = Vec::new();
        if self.config.client_no_context_takeover {
            response.push(ExtensionParam::flag("client_no_context_takeover"));
        }
        if let Some(bits) = client_bits {
            self.config.client_max_window_bits = bits;
            response.push(ExtensionParam::new(
                "client_max_window_bits",
                bits.to_string(),
            ));
        }
        if self.config.server_no_context_takeover {
            response.push(ExtensionParam::flag("server_no_context_takeover"));
        }
        if let Some(bits) = server_bits {
            self.config.server_max_window_bits = bits;
            response.push(ExtensionParam::new(
                "server_max_window_bits",
                bits.to_string(),
            ));
        }

        self.enabled = true;
        Ok(Some(response))
    }

    fn finalize(&mut self, params: &[ExtensionParam]) -> Result<()> {
        for param in params {
            match param.name.as_str() {
                "client_no_context_takeover" => {
                    self.config.client_no_context_takeover = true;
                }
                "server_no_context_takeover" => {
                    self.config.server_no_context_takeover = true;
                }
                "client_max_window_bits" => {
                    self.config.client_max_window_bits =
                        Self::parse_window_bits(param.value.as_deref()).ok_or_else(|| {
                            bad_server_params("client_max_window_bits", param.value.as_deref())
                        })?;
                }
                "server_max_window_bits" => {
                    self.config.server_max_window_bits =
                        Self::parse_window_bits(param.value.as_deref()).ok_or_else(|| {
                            bad_server_params("server_max_window_bits", param.value.as_deref())
                        })?;
                }
                other => {
                    return Err(Error::Remote(RemoteProtocolError::close(
                        format!("unknown permessage-deflate parameter {other}"),
                        CloseCode::PolicyViolation,
                    )));
                }
            }
        }
        self.enabled = true;
        Ok(())
    }

    fn frame_inbound_header(
        &mut self,
        role: Role,
        opcode: OpCode,
        rsv: RsvBits,
        _payload_len: u64,
    ) -> Result<RsvBits> {
        if rsv.rsv1 && opcode.is_control() {
            return Err(Error::remote_close(
                "RSV1 set on control frame",
                CloseCode::ProtocolError,
            ));
        }
        if rsv.rsv1 && opcode == OpCode::Continuation {
            return Err(Error::remote_close(
                "RSV1 set on continuation frame",
                CloseCode::ProtocolError,
            ));
        }

        self.inbound_is_compressible = Some(opcode.is_data());

        if opcode.is_data() && self.inbound_compressed.is_none() {
            self.inbound_compressed = Some(rsv.rsv1);
            if rsv.rsv1 && self.decompressor.is_none() {
                self.decompressor = Some(Decompress::new_with_window_bits(
                    false,
                    self.recv_window_bits(role),
                ));
            }
        }

        Ok(RsvBits::RSV1)
    }

    fn frame_inbound_payload_data(&mut self, role: Role, data: &[u8]) -> Result<Vec<u8>> {
        if !self.inbound_is_compressible.unwrap_or(false)
            || !self.inbound_compressed.unwrap_or(false)
        {
            return Ok(data.to_vec());
        }
        self.inflate(role, data)
    }

    fn frame_inbound_complete(&mut self, role: Role, fin: bool) -> Result<Option<Vec<u8>>> {
        // Control frames end here without touching the per-message latch.
        if !self.inbound_is_compressible.take().unwrap_or(false) {
            return Ok(None);
        }
        if !fin {
            return Ok(None);
        }
        if !self.inbound_compressed.take().unwrap_or(false) {
            return Ok(None);
        }

        let tail = self.inflate(role, &DEFLATE_TRAILER)?;

        if self.recv_no_takeover(role) {
            self.decompressor = None;
        }

        Ok(Some(tail))
    }

    fn frame_outbound(
        &mut self,
        role: Role,
        opcode: OpCode,
        rsv: RsvBits,
        data: Vec<u8>,
        fin: bool,
    ) -> Result<(RsvBits, Vec<u8>)> {
        if !opcode.is_data() {
            return Ok((rsv, data));
        }

        let first_frame = opcode != OpCode::Continuation;
        let compressed = self.deflate(role, &data, fin)?;

        if fin && self.send_no_takeover(role) {
            self.compressor = None;

            // Single-frame message that got bigger: send it uncompressed.
            // Only safe here, where the dictionary is discarded anyway, so
            // the peer's context cannot drift out of sync.
            if first_frame && compressed.len() >= data.len() {
                return Ok((rsv, data));
            }
        }

        let rsv = if first_frame {
            RsvBits { rsv1: true, ..rsv }
        } else {
            rsv
        };
        Ok((rsv, compressed))
    }
}

fn bad_server_params(name: &str, value: Option<&str>) -> Error {
    Error::Remote(RemoteProtocolError::close(
        format!(
            "server selected invalid {name}: {}",
            value.unwrap_or("<missing>")
        ),
        CloseCode::PolicyViolation,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_pair() -> (PerMessageDeflate, PerMessageDeflate) {
        let mut client = PerMessageDeflate::new(DeflateConfig::default());
        let mut server = PerMessageDeflate::new(DeflateConfig::default());
        client.force_enabled();
        server.force_enabled();
        (client, server)
    }

    fn roundtrip_message(
        sender: &mut PerMessageDeflate,
        receiver: &mut PerMessageDeflate,
        sender_role: Role,
        message: &[u8],
    ) -> Vec<u8> {
        let receiver_role = match sender_role {
            Role::Client => Role::Server,
            Role::Server => Role::Client,
        };
        let (rsv, wire) = sender
            .frame_outbound(sender_role, OpCode::Binary, RsvBits::NONE, message.to_vec(), true)
            .unwrap();

        receiver
            .frame_inbound_header(receiver_role, OpCode::Binary, rsv, wire.len() as u64)
            .unwrap();
        let mut out = receiver
            .frame_inbound_payload_data(receiver_role, &wire)
            .unwrap();
        if let Some(tail) = receiver.frame_inbound_complete(receiver_role, true).unwrap() {
            out.extend_from_slice(&tail);
        }
        out
    }

    #[test]
    fn test_compression_roundtrip() {
        let (mut client, mut server) = enabled_pair();
        let message = b"Hello, WebSocket compression! This message repeats repeats repeats.";
        let out = roundtrip_message(&mut client, &mut server, Role::Client, message);
        assert_eq!(out, message);
    }

    #[test]
    fn test_roundtrip_both_directions() {
        let (mut client, mut server) = enabled_pair();
        let msg = vec![0x42u8; 2048];
        assert_eq!(roundtrip_message(&mut client, &mut server, Role::Client, &msg), msg);
        assert_eq!(roundtrip_message(&mut server, &mut client, Role::Server, &msg), msg);
    }

    #[test]
    fn test_rsv1_set_on_first_frame_only() {
        let (mut client, _) = enabled_pair();
        let (rsv, _) = client
            .frame_outbound(Role::Client, OpCode::Text, RsvBits::NONE, b"first".to_vec(), false)
            .unwrap();
        assert!(rsv.rsv1);

        let (rsv, _) = client
            .frame_outbound(
                Role::Client,
                OpCode::Continuation,
                RsvBits::NONE,
                b"rest".to_vec(),
                true,
            )
            .unwrap();
        assert!(!rsv.rsv1);
    }

    #[test]
    fn test_fragmented_message_roundtrip() {
        let (mut client, mut server) = enabled_pair();
        let part1 = b"The quick brown fox ".to_vec();
        let part2 = b"jumps over the lazy dog".to_vec();

        let (rsv1, wire1) = client
            .frame_outbound(Role::Client, OpCode::Text, RsvBits::NONE, part1.clone(), false)
            .unwrap();
        let (_, wire2) = client
            .frame_outbound(Role::Client, OpCode::Continuation, RsvBits::NONE, part2.clone(), true)
            .unwrap();

        let mut out = Vec::new();
        server
            .frame_inbound_header(Role::Server, OpCode::Text, rsv1, wire1.len() as u64)
            .unwrap();
        out.extend(server.frame_inbound_payload_data(Role::Server, &wire1).unwrap());
        assert!(server.frame_inbound_complete(Role::Server, false).unwrap().is_none());

        server
            .frame_inbound_header(Role::Server, OpCode::Continuation, RsvBits::NONE, wire2.len() as u64)
            .unwrap();
        out.extend(server.frame_inbound_payload_data(Role::Server, &wire2).unwrap());
        if let Some(tail) = server.frame_inbound_complete(Role::Server, true).unwrap() {
            out.extend(tail);
        }

        let mut expected = part1;
        expected.extend(part2);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_control_frame_mid_message_keeps_latch() {
        let (mut client, mut server) = enabled_pair();

        let (rsv1, wire1) = client
            .frame_outbound(Role::Client, OpCode::Text, RsvBits::NONE, b"abc ".to_vec(), false)
            .unwrap();
        let (_, wire2) = client
            .frame_outbound(Role::Client, OpCode::Continuation, RsvBits::NONE, b"def".to_vec(), true)
            .unwrap();

        let mut out = Vec::new();
        server
            .frame_inbound_header(Role::Server, OpCode::Text, rsv1, wire1.len() as u64)
            .unwrap();
        out.extend(server.frame_inbound_payload_data(Role::Server, &wire1).unwrap());
        server.frame_inbound_complete(Role::Server, false).unwrap();

        // Interleaved ping: passes through and must not reset the
        // compressed-message latch.
        server
            .frame_inbound_header(Role::Server, OpCode::Ping, RsvBits::NONE, 2)
            .unwrap();
        assert_eq!(
            server.frame_inbound_payload_data(Role::Server, b"hi").unwrap(),
            b"hi"
        );
        assert!(server.frame_inbound_complete(Role::Server, true).unwrap().is_none());

        server
            .frame_inbound_header(Role::Server, OpCode::Continuation, RsvBits::NONE, wire2.len() as u64)
            .unwrap();
        out.extend(server.frame_inbound_payload_data(Role::Server, &wire2).unwrap());
        if let Some(tail) = server.frame_inbound_complete(Role::Server, true).unwrap() {
            out.extend(tail);
        }
        assert_eq!(out, b"abc def");
    }

    #[test]
    fn test_rsv1_on_control_frame_rejected() {
        let (_, mut server) = enabled_pair();
        let result = server.frame_inbound_header(Role::Server, OpCode::Ping, RsvBits::RSV1, 0);
        assert!(result.is_err());
    }

    #[test]
    fn test_rsv1_on_continuation_rejected() {
        let (_, mut server) = enabled_pair();
        let result =
            server.frame_inbound_header(Role::Server, OpCode::Continuation, RsvBits::RSV1, 0);
        assert!(result.is_err());
    }

    #[test]
    fn test_garbage_decompression_fails_with_1007() {
        let (_, mut server) = enabled_pair();
        server
            .frame_inbound_header(Role::Server, OpCode::Binary, RsvBits::RSV1, 4)
            .unwrap();
        // Deflate streams never start with 0xff 0xff.
        let result = server.frame_inbound_payload_data(Role::Server, &[0xff, 0xff, 0xff, 0xff]);
        match result {
            Err(Error::Remote(remote)) => {
                assert_eq!(remote.close_code(), Some(CloseCode::InvalidFramePayloadData));
            }
            other => panic!("expected 1007 error, got {other:?}"),
        }
    }

    #[test]
    fn test_context_takeover_improves_compression() {
        let (mut client, mut server) = enabled_pair();
        let message = b"The quick brown fox jumps over the lazy dog. ".repeat(10);

        let (_, first) = client
            .frame_outbound(Role::Client, OpCode::Text, RsvBits::NONE, message.clone(), true)
            .unwrap();
        // The decoder must see the first message to stay in sync.
        server
            .frame_inbound_header(Role::Server, OpCode::Text, RsvBits::RSV1, first.len() as u64)
            .unwrap();
        server.frame_inbound_payload_data(Role::Server, &first).unwrap();
        server.frame_inbound_complete(Role::Server, true).unwrap();

        let (_, second) = client
            .frame_outbound(Role::Client, OpCode::Text, RsvBits::NONE, message.clone(), true)
            .unwrap();
        assert!(
            second.len() <= first.len(),
            "takeover should keep or shrink size: first={} second={}",
            first.len(),
            second.len()
        );
    }

    #[test]
    fn test_no_context_takeover_resets_state() {
        let config = DeflateConfig::new().client_no_context_takeover(true);
        let mut client = PerMessageDeflate::new(config.clone());
        let mut server = PerMessageDeflate::new(config);
        client.force_enabled();
        server.force_enabled();

        let message = b"The quick brown fox jumps over the lazy dog. ".repeat(10);
        let first = roundtrip_message(&mut client, &mut server, Role::Client, &message);
        assert_eq!(first, message);
        let second = roundtrip_message(&mut client, &mut server, Role::Client, &message);
        assert_eq!(second, message);
    }

    #[test]
    fn test_incompressible_message_skipped_with_no_takeover() {
        // Pseudo-random bytes do not compress; with no_context_takeover the
        // engine may fall back to the original payload and clear RSV1.
        let config = DeflateConfig::new().client_no_context_takeover(true);
        let mut client = PerMessageDeflate::new(config);
        client.force_enabled();

        let mut data = Vec::with_capacity(512);
        let mut x: u32 = 0x9e3779b9;
        for _ in 0..512 {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            data.push((x & 0xff) as u8);
        }

        let (rsv, wire) = client
            .frame_outbound(Role::Client, OpCode::Binary, RsvBits::NONE, data.clone(), true)
            .unwrap();
        assert!(!rsv.rsv1);
        assert_eq!(wire, data);
    }

    #[test]
    fn test_empty_message_roundtrip() {
        let (mut client, mut server) = enabled_pair();
        let out = roundtrip_message(&mut client, &mut server, Role::Client, b"");
        assert_eq!(out, b"");
    }

    #[test]
    fn test_offer_contains_window_bits() {
        let ext = PerMessageDeflate::new(DeflateConfig::default());
        let params = ext.offer().unwrap();
        assert!(params.iter().any(|p| p.name == "client_max_window_bits"));
        assert!(params.iter().any(|p| p.name == "server_max_window_bits"));
    }

    #[test]
    fn test_offer_includes_takeover_flags() {
        let config = DeflateConfig::new()
            .client_no_context_takeover(true)
            .server_no_context_takeover(true);
        let ext = PerMessageDeflate::new(config);
        let params = ext.offer().unwrap();
        assert!(params.iter().any(|p| p.name == "client_no_context_takeover"));
        assert!(params.iter().any(|p| p.name == "server_no_context_takeover"));
    }

    #[test]
    fn test_accept_echoes_flags_and_bits() {
        let mut ext = PerMessageDeflate::new(DeflateConfig::default());
        let offered = vec![
            ExtensionParam::flag("server_no_context_takeover"),
            ExtensionParam::new("client_max_window_bits", "12"),
        ];
        let response = ext.accept(&offered).unwrap().unwrap();

        assert!(ext.enabled());
        assert_eq!(ext.config.client_max_window_bits, 12);
        assert!(ext.config.server_no_context_takeover);
        assert!(response.iter().any(|p| p.name == "server_no_context_takeover"));
        assert!(response
            .iter()
            .any(|p| p.name == "client_max_window_bits" && p.value.as_deref() == Some("12")));
    }

    #[test]
    fn test_accept_bare_client_bits_flag_gets_value() {
        let mut ext = PerMessageDeflate::new(DeflateConfig {
            client_max_window_bits: 11,
            ..DeflateConfig::default()
        });
        let offered = vec![ExtensionParam::flag("client_max_window_bits")];
        let response = ext.accept(&offered).unwrap().unwrap();
        assert!(response
            .iter()
            .any(|p| p.name == "client_max_window_bits" && p.value.as_deref() == Some("11")));
    }

    #[test]
    fn test_accept_bare_server_bits_flag_gets_value() {
        let mut ext = PerMessageDeflate::new(DeflateConfig {
            server_max_window_bits: 12,
            ..DeflateConfig::default()
        });
        let offered = vec![ExtensionParam::flag("server_max_window_bits")];
        let response = ext.accept(&offered).unwrap().unwrap();
        assert!(response
            .iter()
            .any(|p| p.name == "server_max_window_bits" && p.value.as_deref() == Some("12")));
    }

    #[test]
    fn test_accept_declines_out_of_range_bits() {
        let mut ext = PerMessageDeflate::new(DeflateConfig::default());
        let offered = vec![ExtensionParam::new("server_max_window_bits", "8")];
        assert_eq!(ext.accept(&offered).unwrap(), None);

        let mut ext = PerMessageDeflate::new(DeflateConfig::default());
        let offered = vec![ExtensionParam::new("client_max_window_bits", "16")];
        assert_eq!(ext.accept(&offered).unwrap(), None);
    }

    #[test]
    fn test_accept_declines_unknown_parameter() {
        let mut ext = PerMessageDeflate::new(DeflateConfig::default());
        let offered = vec![ExtensionParam::flag("nonsense")];
        assert_eq!(ext.accept(&offered).unwrap(), None);
        assert!(!ext.enabled());
    }

    #[test]
    fn test_finalize_applies_server_params() {
        let mut ext = PerMessageDeflate::new(DeflateConfig::default());
        let params = vec![
            ExtensionParam::new("server_max_window_bits", "10"),
            ExtensionParam::flag("client_no_context_takeover"),
        ];
        ext.finalize(&params).unwrap();
        assert!(ext.enabled());
        assert_eq!(ext.config.server_max_window_bits, 10);
        assert!(ext.config.client_no_context_takeover);
    }

    #[test]
    fn test_finalize_rejects_bad_bits() {
        let mut ext = PerMessageDeflate::new(DeflateConfig::default());
        let params = vec![ExtensionParam::new("server_max_window_bits", "42")];
        assert!(ext.finalize(&params).is_err());
    }

    #[test]
    fn test_window_bits_validation() {
        assert!(DeflateConfig::new().client_max_window_bits(9).is_ok());
        assert!(DeflateConfig::new().client_max_window_bits(15).is_ok());
        assert!(DeflateConfig::new().client_max_window_bits(8).is_err());
        assert!(DeflateConfig::new().server_max_window_bits(16).is_err());
        assert!(DeflateConfig::new().compression_level(10).is_err());
    }

    #[test]
    fn test_reduced_window_roundtrip() {
        let config = DeflateConfig::new()
            .client_max_window_bits(9)
            .unwrap()
            .server_max_window_bits(9)
            .unwrap();
        let mut client = PerMessageDeflate::new(config.clone());
        let mut server = PerMessageDeflate::new(config);
        client.force_enabled();
        server.force_enabled();

        let message = b"window bits nine is the smallest zlib accepts ".repeat(20);
        let out = roundtrip_message(&mut client, &mut server, Role::Client, &message);
        assert_eq!(out, message);
    }
}
