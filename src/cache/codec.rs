//! Entry Codec
//!
//! Artifact bodies are kept as padded standard base64 (RFC 4648) so the
//! stored values stay printable and readable by caches populated by earlier
//! versions of the service.

use base64::engine::general_purpose::STANDARD;
use base64::{DecodeError, Engine};

/// Encode raw artifact bytes into the stored text form
pub fn encode(raw: &[u8]) -> String {
    let mut stored = String::with_capacity(encoded_len(raw.len()));
    STANDARD.encode_string(raw, &mut stored);
    stored
}

/// Decode a stored value back into the raw artifact bytes
pub fn decode(stored: &[u8]) -> Result<Vec<u8>, DecodeError> {
    STANDARD.decode(stored)
}

/// Length of the encoded form of `raw_len` bytes
#[inline]
pub fn encoded_len(raw_len: usize) -> usize {
    raw_len.div_ceil(3) * 4
}
