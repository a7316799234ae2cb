//! PCM <-> wire payload conversion.
//!
//! Outbound audio is packed little-endian (two bytes per sample) and encoded
//! with standard base64. Inbound payloads go the other way.
//!
//! ## Lenient decoding
//!
//! [`decode`] never fails. It decodes the longest prefix made of base64
//! alphabet characters and stops at the first `=` or foreign character. A
//! single dangling character at the end of that prefix carries fewer than
//! eight bits and is ignored. Unpadded input is accepted.
//!
//! ## Odd byte counts
//!
//! [`bytes_to_samples`] drops a trailing odd byte silently.

use base64::{
    alphabet,
    engine::{
        general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD},
        DecodePaddingMode,
    },
    Engine,
};
use tracing::warn;

use crate::buffering::chunk::SampleBlock;

const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Pack samples little-endian and base64-encode them.
pub fn encode(samples: &[i16]) -> String {
    encode_bytes(&samples_to_bytes(samples))
}

/// Base64-encode raw bytes with the standard padded alphabet.
pub fn encode_bytes(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode base64 text, stopping silently at the first non-alphabet character.
pub fn decode(text: &str) -> Vec<u8> {
    let end = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '+' || c == '/'))
        .unwrap_or(text.len());
    let mut prefix = &text[..end];
    if prefix.len() % 4 == 1 {
        prefix = &prefix[..prefix.len() - 1];
    }

    match LENIENT.decode(prefix) {
        Ok(bytes) => bytes,
        Err(e) => {
            // Unreachable for an alphabet-only prefix, kept total anyway.
            warn!(error = %e, "base64 payload rejected");
            Vec::new()
        }
    }
}

pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Reinterpret byte pairs as little-endian `i16`. A trailing odd byte is dropped.
pub fn bytes_to_samples(bytes: &[u8]) -> SampleBlock {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
