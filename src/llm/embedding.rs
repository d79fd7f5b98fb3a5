//! Base64 codec for embedding vectors: little-endian IEEE-754 `f32`s.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::types::EmbeddingVector;

#[derive(Debug, thiserror::Error)]
pub enum Base64Error {
    #[error("invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("payload length {0} is not a multiple of 4 bytes")]
    Length(usize),
}

pub fn encode_base64(values: &[f32]) -> String {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    STANDARD.encode(bytes)
}

pub fn decode_base64(encoded: &str) -> Result<Vec<f32>, Base64Error> {
    let bytes = STANDARD.decode(encoded)?;
    if bytes.len() % 4 != 0 {
        return Err(Base64Error::Length(bytes.len()));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Wrap a float vector in the representation the client asked for.
pub fn vector(values: Vec<f64>, base64: bool) -> EmbeddingVector {
    if base64 {
        let narrowed: Vec<f32> = values.iter().map(|v| *v as f32).collect();
        EmbeddingVector::Base64(encode_base64(&narrowed))
    } else {
        EmbeddingVector::Float(values)
    }
}
