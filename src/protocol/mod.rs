//! Wire-protocol core: frame codec, masking, UTF-8 validation, message
//! assembly and the opening handshake.

pub mod assembler;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;
pub mod utf8;

pub use assembler::{FrameProtocol, InboundFrame};
pub use frame::{FrameChunk, FrameDecoder, FrameEncoder};
pub use handshake::{compute_accept_key, Handshake, WS_GUID, WS_VERSION};
pub use mask::{apply_mask, apply_mask_offset};
pub use opcode::OpCode;
pub use utf8::Utf8Decoder;
