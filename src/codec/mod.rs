//! Codec port: encode / verify / decode of exactly one fixed-size block.
//!
//! # Contract
//! - `encode(message[k]) -> codeword[n]` with `codeword[..k] == message`;
//!   the trailing `p = n - k` bytes are the parity.
//! - `verify(codeword[n]) -> bool` is a heuristic: `false` is a reliable
//!   sign of corruption (or of mismatched parameters), `true` only means no
//!   error was detected.
//! - `decode(codeword[n])` returns the corrected codeword and the number of
//!   symbols it had to correct, or [`CodecError::Uncorrectable`] once the
//!   errors exceed what `p` parity symbols can absorb.
//!
//! Implementations are deterministic and side-effect free per call, and must
//! be safe to call concurrently on different blocks (`Send + Sync`).
//!
//! The `*_until` variants take a [`CancelToken`].  By default they check it
//! once before the call; a codec that can block for long (an external
//! process) overrides them to abort mid-call.
//!
//! # Built-in implementations
//! - [`ReedSolomonCodec`]: in-process Reed-Solomon over GF(2^8).
//! - [`CommandCodec`]: delegates every call to an external executable.

use std::io;

use thiserror::Error;

use crate::cancel::CancelToken;
use crate::params::CodecParams;

mod command;

pub use command::{status, CommandCodec};

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Block length {actual} does not match expected {expected}")]
    BlockLength { expected: usize, actual: usize },
    /// Too many symbol errors in one block.  Fatal for that block.
    #[error("Too many errors to correct the block")]
    Uncorrectable,
    #[error("Unsupported codec parameters: {0}")]
    Unsupported(String),
    #[error("Codec call cancelled")]
    Cancelled,
    #[error("External codec failed: {0}")]
    External(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

/// Result of a successful [`Codec::decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Corrected codeword, `n` bytes; the message is `codeword[..k]`.
    pub codeword:  Vec<u8>,
    /// Number of symbols that differed from the input codeword.
    pub corrected: usize,
}

impl Decoded {
    pub fn message(&self, message_size: usize) -> &[u8] {
        &self.codeword[..message_size]
    }
}

pub trait Codec: Send + Sync {
    /// Short diagnostic name.
    fn name(&self) -> &str;
    fn params(&self) -> CodecParams;
    fn encode(&self, message: &[u8]) -> Result<Vec<u8>, CodecError>;
    fn verify(&self, codeword: &[u8]) -> Result<bool, CodecError>;
    fn decode(&self, codeword: &[u8]) -> Result<Decoded, CodecError>;

    fn encode_until(&self, message: &[u8], cancel: &CancelToken) -> Result<Vec<u8>, CodecError> {
        not_cancelled(cancel)?;
        self.encode(message)
    }

    fn verify_until(&self, codeword: &[u8], cancel: &CancelToken) -> Result<bool, CodecError> {
        not_cancelled(cancel)?;
        self.verify(codeword)
    }

    fn decode_until(&self, codeword: &[u8], cancel: &CancelToken) -> Result<Decoded, CodecError> {
        not_cancelled(cancel)?;
        self.decode(codeword)
    }
}

fn not_cancelled(cancel: &CancelToken) -> Result<(), CodecError> {
    if cancel.is_cancelled() {
        return Err(CodecError::Cancelled);
    }
    Ok(())
}

/// Reject a buffer whose length isn't exactly `expected`.
pub(crate) fn expect_len(buf: &[u8], expected: usize) -> Result<(), CodecError> {
    if buf.len() != expected {
        return Err(CodecError::BlockLength { expected, actual: buf.len() });
    }
    Ok(())
}

// ── Reed-Solomon (in-process) ────────────────────────────────────────────────

/// Reed-Solomon over GF(2^8) backed by the `reed-solomon` crate.
///
/// Only `exp == 8` is supported; `n` may be anything up to 255.  The field
/// uses the primitive polynomial 0x11d, so stores written by coders built on
/// a different polynomial cannot be checked with this codec.
pub struct ReedSolomonCodec {
    params:  CodecParams,
    encoder: reed_solomon::Encoder,
    decoder: reed_solomon::Decoder,
}

impl ReedSolomonCodec {
    pub fn new(params: CodecParams) -> Result<Self, CodecError> {
        if params.galois_exponent() != 8 {
            return Err(CodecError::Unsupported(format!(
                "in-process Reed-Solomon only supports GF(2^8), got GF(2^{})",
                params.galois_exponent()
            )));
        }
        let parity = params.parity_size();
        Ok(Self {
            params,
            encoder: reed_solomon::Encoder::new(parity),
            decoder: reed_solomon::Decoder::new(parity),
        })
    }
}

impl Codec for ReedSolomonCodec {
    fn name(&self) -> &str { "reed-solomon" }

    fn params(&self) -> CodecParams { self.params }

    fn encode(&self, message: &[u8]) -> Result<Vec<u8>, CodecError> {
        expect_len(message, self.params.message_size())?;
        let encoded = self.encoder.encode(message);
        let mut codeword = Vec::with_capacity(self.params.result_size());
        codeword.extend_from_slice(message);
        codeword.extend_from_slice(encoded.ecc());
        Ok(codeword)
    }

    fn verify(&self, codeword: &[u8]) -> Result<bool, CodecError> {
        expect_len(codeword, self.params.result_size())?;
        Ok(!self.decoder.is_corrupted(codeword))
    }

    fn decode(&self, codeword: &[u8]) -> Result<Decoded, CodecError> {
        expect_len(codeword, self.params.result_size())?;
        let mut work = codeword.to_vec();
        let recovered = self.decoder
            .correct(&mut work[..], None)
            .map_err(|_| CodecError::Uncorrectable)?;

        let mut corrected_word = Vec::with_capacity(codeword.len());
        corrected_word.extend_from_slice(recovered.data());
        corrected_word.extend_from_slice(recovered.ecc());
        let corrected = corrected_word.iter()
            .zip(codeword)
            .filter(|(a, b)| a != b)
            .count();
        Ok(Decoded { codeword: corrected_word, corrected })
    }
}
