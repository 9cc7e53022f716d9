//! XOR payload masking (RFC 6455 Section 5.3).
//!
//! Masking and unmasking are the same operation. The decoder unmasks frame
//! payloads in streaming chunks, so the key cycle position must carry across
//! calls; `offset` is the number of payload bytes already processed.

/// XOR `data` with the 4-byte key, word-at-a-time where the length allows.
#[inline]
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    apply_mask_offset(data, key, 0);
}

/// XOR `data` with `key`, starting `offset` bytes into the key cycle.
pub fn apply_mask_offset(data: &mut [u8], key: [u8; 4], offset: usize) {
    let rot = offset % 4;
    let key = [
        key[rot],
        key[(rot + 1) % 4],
        key[(rot + 2) % 4],
        key[(rot + 3) % 4],
    ];
    let key_word = u32::from_ne_bytes(key);

    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&(word ^ key_word).to_ne_bytes());
    }
    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= key[i];
    }
}
