//! Numeric primitives for embedding vectors.
//!
//! - L2 normalization (copying and in place)
//! - cosine similarity with explicit dimension checking
//! - inner product for vectors that are already unit length
//! - a little-endian `f32` byte codec used for the `embedding` column
//!
//! The byte layout is fixed at 4 bytes per element, little-endian, so a blob
//! written on one machine decodes identically on any other.

use crate::error::{Result, RetrieverError};

/// Width in bytes of one encoded element.
const F32_WIDTH: usize = std::mem::size_of::<f32>();

/// L2 norm of `v`.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Return a unit-length copy of `v`. A zero vector is returned unchanged.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let mut out = v.to_vec();
    normalize_in_place(&mut out);
    out
}

/// Scale `v` to unit length in place. A zero vector is left unchanged.
pub fn normalize_in_place(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm == 0.0 {
        return;
    }
    for value in v.iter_mut() {
        *value /= norm;
    }
}

/// Inner product of two equal-length vectors.
///
/// Callers are expected to have checked lengths; extra elements of the longer
/// slice are ignored.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cosine similarity in `[-1, 1]`.
///
/// Fails with [`RetrieverError::DimensionMismatch`] when the lengths differ.
/// Returns 0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(RetrieverError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let mut dot_product = 0.0f64;
    let mut magnitude_a = 0.0f64;
    let mut magnitude_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot_product += x * y;
        magnitude_a += x * x;
        magnitude_b += y * y;
    }

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Ok(0.0);
    }

    let similarity = dot_product / (magnitude_a.sqrt() * magnitude_b.sqrt());
    Ok(similarity.clamp(-1.0, 1.0) as f32)
}

/// Encode a vector as little-endian `f32` bytes.
pub fn encode(v: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(v.len() * F32_WIDTH);
    for value in v {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode little-endian `f32` bytes produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % F32_WIDTH != 0 {
        return Err(RetrieverError::InvalidVectorBytes { len: bytes.len() });
    }
    Ok(bytes
        .chunks_exact(F32_WIDTH)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
