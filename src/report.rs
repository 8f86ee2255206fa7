//! Per-file and per-batch outcome records.
//!
//! A batch run never aborts on a single file; every file ends up with one
//! [`FileReport`] that says whether it was skipped, succeeded or failed,
//! and why.  The whole [`BatchReport`] serialises to JSON for `--report`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{EccError, ErrorKind};
use crate::validate::SizeCheck;

// ── Check ─────────────────────────────────────────────────────────────────────

/// Result of verifying every block of one file.
///
/// A clean report is not a proof of integrity: verification is a necessary
/// test only, and a block with more errors than the code can see may still
/// pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub total_blocks:  u64,
    /// Indices of blocks that failed verification, ascending.
    pub failed_blocks: Vec<u64>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool { self.failed_blocks.is_empty() }

    /// Percentage of blocks that verified (0.0–100.0).
    pub fn health_pct(&self) -> f64 {
        if self.total_blocks == 0 { return 100.0; }
        (self.total_blocks - self.failed_blocks.len() as u64) as f64 / self.total_blocks as f64 * 100.0
    }

    pub fn summary(&self) -> String {
        if self.is_clean() {
            format!("no error detected in {} block(s)", self.total_blocks)
        } else {
            format!(
                "{}/{} block(s) failed verification ({:.1}% healthy)",
                self.failed_blocks.len(),
                self.total_blocks,
                self.health_pct(),
            )
        }
    }

    pub fn into_result(self) -> Result<Self, EccError> {
        if self.is_clean() {
            Ok(self)
        } else {
            Err(EccError::VerificationFailed {
                failed_blocks: self.failed_blocks,
                total_blocks:  self.total_blocks,
            })
        }
    }
}

// ── Create / Fix ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReport {
    pub blocks:    u64,
    pub ecc_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixReport {
    pub blocks:            u64,
    /// Blocks where the decoder changed at least one symbol.
    pub repaired_blocks:   u64,
    pub corrected_symbols: u64,
    pub output_bytes:      u64,
    /// Set by `fix --compare`: whether the repaired output equals the input.
    pub identical:         Option<bool>,
}

// ── Per-file outcome ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Success {
    Created(CreateReport),
    Checked(CheckReport),
    SizeChecked(SizeCheck),
    Fixed(FixReport),
}

impl Success {
    pub fn summary(&self) -> String {
        match self {
            Success::Created(r) => format!("{} parity block(s), {} bytes", r.blocks, r.ecc_bytes),
            Success::Checked(r) => r.summary(),
            Success::SizeChecked(s) => format!(
                "{} block(s), input size within {}..={}",
                s.blocks, s.min_input, s.max_input
            ),
            Success::Fixed(r) => {
                let mut s = format!(
                    "{} block(s), {} repaired, {} symbol(s) corrected",
                    r.blocks, r.repaired_blocks, r.corrected_symbols
                );
                match r.identical {
                    Some(true)  => s.push_str(", output identical to input"),
                    Some(false) => s.push_str(", output differs from input"),
                    None        => {}
                }
                s
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Succeeded { result: Success },
    Skipped   { kind: ErrorKind, reason: String },
    Failed {
        kind:   ErrorKind,
        reason: String,
        /// Blocks that failed verification, for a Check that found corruption.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        failed_blocks: Vec<u64>,
    },
}

impl FileOutcome {
    pub fn from_result(result: Result<Success, EccError>) -> Self {
        match result {
            Ok(result) => FileOutcome::Succeeded { result },
            Err(e) if e.is_skip() => FileOutcome::Skipped { kind: e.kind(), reason: e.to_string() },
            Err(e) => {
                let (kind, reason) = (e.kind(), e.to_string());
                let failed_blocks = match e {
                    EccError::VerificationFailed { failed_blocks, .. } => failed_blocks,
                    _ => Vec::new(),
                };
                FileOutcome::Failed { kind, reason, failed_blocks }
            }
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            FileOutcome::Succeeded { .. } => None,
            FileOutcome::Skipped { kind, .. } | FileOutcome::Failed { kind, .. } => Some(*kind),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FileOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub path:       PathBuf,
    pub outcome:    FileOutcome,
    pub elapsed_ms: u64,
}

// ── Batch ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub operation:  String,
    /// Unix timestamp of the start of the run.
    pub started_at: i64,
    pub files:      Vec<FileReport>,
}

impl BatchReport {
    pub fn new(operation: impl Into<String>, started_at: i64) -> Self {
        Self { operation: operation.into(), started_at, files: Vec::new() }
    }

    pub fn succeeded(&self) -> usize {
        self.files.iter().filter(|f| matches!(f.outcome, FileOutcome::Succeeded { .. })).count()
    }

    pub fn skipped(&self) -> usize {
        self.files.iter().filter(|f| matches!(f.outcome, FileOutcome::Skipped { .. })).count()
    }

    pub fn failed(&self) -> usize {
        self.files.iter().filter(|f| f.outcome.is_failure()).count()
    }

    /// True if any file's check found corruption or a size mismatch.
    pub fn found_corruption(&self) -> bool {
        self.files.iter().any(|f| matches!(
            f.outcome.kind(),
            Some(ErrorKind::VerificationFailed)
                | Some(ErrorKind::InconsistentEccSize)
                | Some(ErrorKind::InconsistentInputSize)
        ))
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} file(s), {} succeeded, {} skipped, {} failed",
            self.operation,
            self.files.len(),
            self.succeeded(),
            self.skipped(),
            self.failed(),
        )
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
