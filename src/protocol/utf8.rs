//! Incremental UTF-8 decoding for fragmented text messages.
//!
//! Text message payloads are validated as they stream in, across frame
//! boundaries. A multi-byte sequence split between frames is held back and
//! prepended to the next chunk, so every returned `String` is complete on
//! its own.

use crate::error::{Error, RemoteProtocolError, Result};
use crate::events::CloseCode;

/// Streaming UTF-8 decoder with a three-way outcome per chunk: accept,
/// incomplete tail (carried over), or reject.
#[derive(Debug, Clone, Default)]
pub struct Utf8Decoder {
    /// Held-back bytes of a sequence split at a chunk boundary.
    pending: [u8; 4],
    pending_len: usize,
}

impl Utf8Decoder {
    /// Create a fresh decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk, returning the text completed by it.
    ///
    /// With `fin == false` an incomplete multi-byte sequence at the end of
    /// the chunk is buffered for the next call. With `fin == true` every
    /// byte must belong to a complete sequence.
    ///
    /// # Errors
    ///
    /// `RemoteProtocolError` with an INVALID_FRAME_PAYLOAD_DATA (1007) close
    /// hint on any invalid sequence.
    pub fn decode(&mut self, data: &[u8], fin: bool) -> Result<String> {
        let mut input;
        let bytes: &[u8] = if self.pending_len > 0 {
            input = Vec::with_capacity(self.pending_len + data.len());
            input.extend_from_slice(&self.pending[..self.pending_len]);
            input.extend_from_slice(data);
            self.pending_len = 0;
            &input
        } else {
            data
        };

        match std::str::from_utf8(bytes) {
            Ok(text) => Ok(text.to_owned()),
            Err(err) => {
                let valid_up_to = err.valid_up_to();
                let tail = &bytes[valid_up_to..];
                if err.error_len().is_none() && !fin && tail.len() < 4 {
                    self.pending[..tail.len()].copy_from_slice(tail);
                    self.pending_len = tail.len();
                    // Safe: everything before valid_up_to just validated.
                    Ok(std::str::from_utf8(&bytes[..valid_up_to])
                        .map_err(|_| invalid_utf8())?
                        .to_owned())
                } else {
                    Err(invalid_utf8())
                }
            }
        }
    }

    /// Whether bytes of an unfinished sequence are buffered.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending_len > 0
    }
}

fn invalid_utf8() -> Error {
    Error::Remote(RemoteProtocolError::close(
        "invalid UTF-8 in text message",
        CloseCode::InvalidFramePayloadData,
    ))
}

/// Validate a complete byte slice as UTF-8 and return it as text.
///
/// # Errors
///
/// Same failure mode as [`Utf8Decoder::decode`]. Used for close reasons,
/// which are never fragmented.
pub fn decode_utf8(data: &[u8]) -> Result<&str> {
    std::str::from_utf8(data).map_err(|_| invalid_utf8())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passthrough() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"Hello, World!", true).unwrap(), "Hello, World!");
    }

    #[test]
    fn test_multibyte_whole() {
        let mut decoder = Utf8Decoder::new();
        let text = "こんにちは 🌍";
        assert_eq!(decoder.decode(text.as_bytes(), true).unwrap(), text);
    }

    #[test]
    fn test_invalid_sequences_rejected() {
        for bad in [&[0x80u8][..], &[0xc0, 0x80], &[0xff], &[0xe0, 0x80]] {
            let mut decoder = Utf8Decoder::new();
            assert!(decoder.decode(bad, true).is_err());
        }
    }

    #[test]
    fn test_split_three_byte_sequence() {
        // Euro sign: E2 82 AC
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(&[0xe2], false).unwrap(), "");
        assert!(decoder.has_pending());
        assert_eq!(decoder.decode(&[0x82, 0xac], true).unwrap(), "€");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_split_four_byte_sequence_every_way() {
        // 🎉 = F0 9F 8E 89, split at every boundary
        let bytes = [0xf0u8, 0x9f, 0x8e, 0x89];
        for split in 1..4 {
            let mut decoder = Utf8Decoder::new();
            assert_eq!(decoder.decode(&bytes[..split], false).unwrap(), "");
            assert_eq!(decoder.decode(&bytes[split..], true).unwrap(), "🎉");
        }
    }

    #[test]
    fn test_text_before_split_is_released() {
        let mut decoder = Utf8Decoder::new();
        let mut chunk = b"Hello ".to_vec();
        chunk.push(0xf0);
        assert_eq!(decoder.decode(&chunk, false).unwrap(), "Hello ");
        assert_eq!(decoder.decode(&[0x9f, 0x8e, 0x89], true).unwrap(), "🎉");
    }

    #[test]
    fn test_incomplete_at_fin_rejected() {
        let mut decoder = Utf8Decoder::new();
        assert!(decoder.decode(&[0xe2], true).is_err());
    }

    #[test]
    fn test_empty_chunk_preserves_pending() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(&[0xe2], false).unwrap(), "");
        assert_eq!(decoder.decode(&[], false).unwrap(), "");
        assert!(decoder.has_pending());
        assert_eq!(decoder.decode(&[0x82, 0xac], true).unwrap(), "€");
    }

    #[test]
    fn test_three_chunk_message() {
        // "Hello 世界" fed in awkward slices; 世 = E4 B8 96, 界 = E7 95 8C
        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();
        let mut first = b"Hello ".to_vec();
        first.push(0xe4);
        out += &decoder.decode(&first, false).unwrap();
        out += &decoder.decode(&[0xb8, 0x96, 0xe7, 0x95], false).unwrap();
        out += &decoder.decode(&[0x8c], true).unwrap();
        assert_eq!(out, "Hello 世界");
    }

    #[test]
    fn test_invalid_in_middle_rejected_even_when_not_final() {
        let mut decoder = Utf8Decoder::new();
        assert!(decoder.decode(&[0x48, 0x65, 0x80, 0x6c], false).is_err());
    }

    #[test]
    fn test_error_carries_1007_hint() {
        let mut decoder = Utf8Decoder::new();
        let err = decoder.decode(&[0xff], true).unwrap_err();
        match err {
            Error::Remote(remote) => {
                assert_eq!(remote.close_code(), Some(CloseCode::InvalidFramePayloadData));
            }
            Error::Local(_) => panic!("expected remote error"),
        }
    }

    #[test]
    fn test_decode_utf8_helper() {
        assert_eq!(decode_utf8(b"plain").unwrap(), "plain");
        assert!(decode_utf8(&[0x80]).is_err());
    }
}
