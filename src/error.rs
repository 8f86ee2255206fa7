//! Crate-level error type.
//!
//! Every failure that can happen while processing one protected file is an
//! [`EccError`].  The batch runner never propagates these past a single file;
//! it turns them into a [`crate::report::FileOutcome`] and moves on.

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::CodecError;

pub type Result<T> = std::result::Result<T, EccError>;

#[derive(Error, Debug)]
pub enum EccError {
    #[error("Invalid codec parameters: {0}")]
    InvalidParameters(String),

    #[error("Invalid input {}: {reason}", .path.display())]
    InvalidInput { path: PathBuf, reason: String },

    #[error("ECC store doesn't exist: {}", .0.display())]
    EccStoreMissing(PathBuf),

    #[error("ECC store already exists: {}", .0.display())]
    EccStoreAlreadyExists(PathBuf),

    #[error("ECC store size {ecc_len} is not a multiple of the parity size {parity_size}")]
    InconsistentEccSize { ecc_len: u64, parity_size: usize },

    #[error("ECC store ends before block {block}")]
    EccStoreTruncated { block: u64 },

    #[error("Input size {input_len} is not between {min} and {max}")]
    InconsistentInputSize { input_len: u64, min: u64, max: u64 },

    #[error("{} of {total_blocks} block(s) failed verification", .failed_blocks.len())]
    VerificationFailed { failed_blocks: Vec<u64>, total_blocks: u64 },

    #[error("Block {block} has more errors than the code can correct")]
    UncorrectableBlock { block: u64 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Codec error: {0}")]
    Codec(#[source] CodecError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Serialisable discriminant of [`EccError`], used in batch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidParameters,
    InvalidInput,
    EccStoreMissing,
    EccStoreAlreadyExists,
    InconsistentEccSize,
    InconsistentInputSize,
    VerificationFailed,
    UncorrectableBlock,
    Cancelled,
    Codec,
    Io,
}

impl EccError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EccError::InvalidParameters(_)          => ErrorKind::InvalidParameters,
            EccError::InvalidInput { .. }           => ErrorKind::InvalidInput,
            EccError::EccStoreMissing(_)            => ErrorKind::EccStoreMissing,
            EccError::EccStoreAlreadyExists(_)      => ErrorKind::EccStoreAlreadyExists,
            EccError::InconsistentEccSize { .. }    => ErrorKind::InconsistentEccSize,
            EccError::EccStoreTruncated { .. }      => ErrorKind::InconsistentEccSize,
            EccError::InconsistentInputSize { .. }  => ErrorKind::InconsistentInputSize,
            EccError::VerificationFailed { .. }     => ErrorKind::VerificationFailed,
            EccError::UncorrectableBlock { .. }     => ErrorKind::UncorrectableBlock,
            EccError::Cancelled                     => ErrorKind::Cancelled,
            EccError::Codec(_)                      => ErrorKind::Codec,
            EccError::Io(_)                         => ErrorKind::Io,
        }
    }

    /// Errors that mean "nothing to do for this file" rather than a failure.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            EccError::EccStoreMissing(_)
                | EccError::EccStoreAlreadyExists(_)
                | EccError::InvalidInput { .. }
        )
    }

    pub(crate) fn invalid_input(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        EccError::InvalidInput { path: path.into(), reason: reason.into() }
    }
}

impl From<CodecError> for EccError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Cancelled => EccError::Cancelled,
            other => EccError::Codec(other),
        }
    }
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::InvalidParameters     => "invalid-parameters",
            ErrorKind::InvalidInput          => "invalid-input",
            ErrorKind::EccStoreMissing       => "ecc-store-missing",
            ErrorKind::EccStoreAlreadyExists => "ecc-store-already-exists",
            ErrorKind::InconsistentEccSize   => "inconsistent-ecc-size",
            ErrorKind::InconsistentInputSize => "inconsistent-input-size",
            ErrorKind::VerificationFailed    => "verification-failed",
            ErrorKind::UncorrectableBlock    => "uncorrectable-block",
            ErrorKind::Cancelled             => "cancelled",
            ErrorKind::Codec                 => "codec",
            ErrorKind::Io                    => "io",
        }
    }
}
