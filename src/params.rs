//! Codec parameters: the `(n, k, exp)` triple every layout name, block size
//! and size check is derived from.
//!
//! A store created with one triple can only be checked or fixed with the same
//! triple; nothing about the parameters is persisted inside the store itself,
//! the triple is encoded in the store's directory and file name instead.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EccError, Result};

/// Default result size (`n`): one full GF(2^8) codeword.
pub const DEFAULT_RESULT_SIZE:  usize = 255;
/// Default message size (`k`): 32 parity bytes, up to 16 byte errors per block.
pub const DEFAULT_MESSAGE_SIZE: usize = 223;
/// Default Galois field exponent.
pub const DEFAULT_GALOIS_EXP:   u32   = 8;

const MAX_GALOIS_EXP: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodecParams {
    result_size:     usize,
    message_size:    usize,
    galois_exponent: u32,
}

impl CodecParams {
    /// Validate and build a parameter triple.
    ///
    /// Requires `0 < k < n` and `n <= 2^exp - 1`.
    pub fn new(result_size: usize, message_size: usize, galois_exponent: u32) -> Result<Self> {
        if galois_exponent == 0 || galois_exponent > MAX_GALOIS_EXP {
            return Err(EccError::InvalidParameters(format!(
                "galois exponent {galois_exponent} must be between 1 and {MAX_GALOIS_EXP}"
            )));
        }
        if message_size == 0 {
            return Err(EccError::InvalidParameters("message size must be positive".into()));
        }
        if message_size >= result_size {
            return Err(EccError::InvalidParameters(format!(
                "message size {message_size} must be smaller than result size {result_size}"
            )));
        }
        let max_symbols = (1usize << galois_exponent) - 1;
        if result_size > max_symbols {
            return Err(EccError::InvalidParameters(format!(
                "result size {result_size} exceeds {max_symbols} symbols for GF(2^{galois_exponent})"
            )));
        }
        Ok(Self { result_size, message_size, galois_exponent })
    }

    /// `n`: codeword length in bytes.
    #[inline]
    pub fn result_size(&self) -> usize { self.result_size }

    /// `k`: message bytes per block.
    #[inline]
    pub fn message_size(&self) -> usize { self.message_size }

    /// `p = n - k`: parity bytes stored per block.
    #[inline]
    pub fn parity_size(&self) -> usize { self.result_size - self.message_size }

    #[inline]
    pub fn galois_exponent(&self) -> u32 { self.galois_exponent }

    /// Nominal number of symbol errors one block can absorb (`p / 2`).
    pub fn correction_capacity(&self) -> usize { self.parity_size() / 2 }

    /// `"ecc-<n>-<k>-<exp>"`, used both as the store directory name and as
    /// the store file suffix.
    pub fn tag(&self) -> String {
        format!("ecc-{}-{}-{}", self.result_size, self.message_size, self.galois_exponent)
    }

    /// Inverse of [`tag`](Self::tag).  Returns `None` for anything that is
    /// not a well-formed, valid tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let mut parts = tag.strip_prefix("ecc-")?.split('-');
        let n   = parts.next()?.parse().ok()?;
        let k   = parts.next()?.parse().ok()?;
        let exp = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Self::new(n, k, exp).ok()
    }
}

impl Default for CodecParams {
    fn default() -> Self {
        Self {
            result_size:     DEFAULT_RESULT_SIZE,
            message_size:    DEFAULT_MESSAGE_SIZE,
            galois_exponent: DEFAULT_GALOIS_EXP,
        }
    }
}

impl fmt::Display for CodecParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RS({}, {}) over GF(2^{})", self.result_size, self.message_size, self.galois_exponent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_triple() {
        let p = CodecParams::default();
        assert_eq!(p.parity_size(), 32);
        assert_eq!(p.correction_capacity(), 16);
        assert_eq!(p.tag(), "ecc-255-223-8");
        assert_eq!(CodecParams::new(255, 223, 8).unwrap(), p);
    }

    #[test]
    fn rejects_invalid_triples() {
        assert!(CodecParams::new(255, 0, 8).is_err());
        assert!(CodecParams::new(255, 255, 8).is_err());
        assert!(CodecParams::new(256, 223, 8).is_err());
        assert!(CodecParams::new(255, 223, 0).is_err());
        assert!(CodecParams::new(255, 223, 17).is_err());
        assert!(CodecParams::new(16383, 16367, 14).is_ok());
    }

    #[test]
    fn tag_roundtrip() {
        let p = CodecParams::new(100, 80, 8).unwrap();
        assert_eq!(CodecParams::from_tag(&p.tag()), Some(p));
        assert_eq!(CodecParams::from_tag("ecc-regenerated"), None);
        assert_eq!(CodecParams::from_tag("ecc-255-223"), None);
        assert_eq!(CodecParams::from_tag("ecc-255-223-8-1"), None);
        assert_eq!(CodecParams::from_tag("ecc-223-255-8"), None);
    }
}
