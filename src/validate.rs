//! Structural size check of a protected file against its ECC store.
//!
//! Pure arithmetic, no decoding: catches wrong parameters, truncated or
//! extended files and mismatched pairs, never content corruption.
//!
//! With `k = 223`, `p = 32` and a 64-byte store:
//!
//! ```text
//! store:   |   32   |   32   |            2 parity blocks
//! input:   |     223     |     223     |  at most 446 bytes
//!                        ^ 224           the last block holds 1..=223 bytes
//! ```
//!
//! so any input length in `224..=446` is consistent.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EccError, Result};
use crate::params::CodecParams;

/// Accepted input length range derived from a store size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeCheck {
    pub blocks:    u64,
    /// Smallest consistent input length (inclusive).
    pub min_input: u64,
    /// Largest consistent input length (inclusive).
    pub max_input: u64,
}

/// Range of input lengths consistent with an `ecc_len`-byte store.
pub fn expected_input_range(ecc_len: u64, message_size: usize, parity_size: usize) -> Result<SizeCheck> {
    let p = parity_size as u64;
    let k = message_size as u64;
    if ecc_len % p != 0 {
        return Err(EccError::InconsistentEccSize { ecc_len, parity_size });
    }
    let blocks = ecc_len / p;
    let max_input = blocks * k;
    let min_input = if blocks == 0 { 0 } else { max_input - k + 1 };
    Ok(SizeCheck { blocks, min_input, max_input })
}

/// Check that `input_len` lies in `(blocks * k - k, blocks * k]`.
pub fn check_sizes(input_len: u64, ecc_len: u64, message_size: usize, parity_size: usize) -> Result<SizeCheck> {
    let range = expected_input_range(ecc_len, message_size, parity_size)?;
    if input_len < range.min_input || input_len > range.max_input {
        return Err(EccError::InconsistentInputSize {
            input_len,
            min: range.min_input,
            max: range.max_input,
        });
    }
    Ok(range)
}

/// [`check_sizes`] on two files on disk.
pub fn check_pair(protected: &Path, ecc: &Path, params: CodecParams) -> Result<SizeCheck> {
    if !ecc.is_file() {
        return Err(EccError::EccStoreMissing(ecc.to_path_buf()));
    }
    let input_len = fs::metadata(protected)?.len();
    let ecc_len   = fs::metadata(ecc)?.len();
    check_sizes(input_len, ecc_len, params.message_size(), params.parity_size())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_block_window() {
        for len in [224, 300, 411, 446] {
            let c = check_sizes(len, 64, 223, 32).unwrap();
            assert_eq!(c, SizeCheck { blocks: 2, min_input: 224, max_input: 446 });
        }
        for len in [222, 223, 447] {
            assert!(matches!(
                check_sizes(len, 64, 223, 32),
                Err(EccError::InconsistentInputSize { min: 224, max: 446, .. })
            ));
        }
    }

    #[test]
    fn store_must_be_whole_blocks() {
        assert!(matches!(
            check_sizes(300, 65, 223, 32),
            Err(EccError::InconsistentEccSize { ecc_len: 65, parity_size: 32 })
        ));
    }

    #[test]
    fn empty_pair_is_consistent() {
        assert_eq!(check_sizes(0, 0, 223, 32).unwrap().blocks, 0);
        assert!(check_sizes(1, 0, 223, 32).is_err());
        assert!(check_sizes(0, 32, 223, 32).is_err());
    }

    #[test]
    fn single_block_window() {
        assert!(check_sizes(1, 32, 223, 32).is_ok());
        assert!(check_sizes(223, 32, 223, 32).is_ok());
        assert!(check_sizes(224, 32, 223, 32).is_err());
    }

    #[test]
    fn missing_store_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.gpg");
        fs::write(&input, [1u8; 10]).unwrap();
        let err = check_pair(&input, &dir.path().join("none"), CodecParams::default()).unwrap_err();
        assert!(matches!(err, EccError::EccStoreMissing(_)));

        let ecc = dir.path().join("a.ecc");
        fs::write(&ecc, [0u8; 32]).unwrap();
        assert_eq!(check_pair(&input, &ecc, CodecParams::default()).unwrap().blocks, 1);
    }
}
