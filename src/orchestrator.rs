//! High-level [`Orchestrator`] API: run one operation over a batch of files.
//!
//! ```no_run
//! use eccvault::codec::ReedSolomonCodec;
//! use eccvault::orchestrator::{EccOptions, Operation, Orchestrator};
//! use eccvault::params::CodecParams;
//! use std::path::PathBuf;
//!
//! let codec = ReedSolomonCodec::new(CodecParams::default())?;
//! let orch  = Orchestrator::new(Box::new(codec), EccOptions::default());
//! let report = orch.run(Operation::Create, &[PathBuf::from("backups")])?;
//! println!("{}", report.summary());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Files are processed one after the other; blocks within a file in
//! parallel.  A file's failure never stops the batch: it is recorded in
//! the [`BatchReport`] and the next file starts.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};

use crate::block::DEFAULT_BLOCKS_PER_CHUNK;
use crate::cancel::CancelToken;
use crate::codec::Codec;
use crate::error::{EccError, Result};
use crate::io_stream::{check_stream, create_stream, digest, fix_stream};
use crate::layout::{ensure_parent, EccLayout};
use crate::params::CodecParams;
use crate::report::{BatchReport, CheckReport, CreateReport, FileOutcome, FileReport, FixReport, Success};
use crate::select::{FileSelector, ProtectedFile, SelectOptions, Selection};
use crate::validate::{check_pair, SizeCheck};

// ── Operation ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Check,
    CheckSize,
    /// With `compare`, the repaired output is compared with the input.
    Fix { compare: bool },
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::Create                   => "create",
            Operation::Check                    => "check",
            Operation::CheckSize                => "check-size",
            Operation::Fix { compare: false }   => "fix",
            Operation::Fix { compare: true }    => "fix-and-compare",
        }
    }
}

// ── EccOptions ────────────────────────────────────────────────────────────────

/// Configuration for [`Orchestrator::new`].
#[derive(Debug, Clone)]
pub struct EccOptions {
    /// Directory holding `ecc-<n>-<k>-<exp>/` and `ecc-regenerated/`.
    pub store_root:       PathBuf,
    pub select:           SelectOptions,
    /// Per-file deadline; an operation past it stops as cancelled.
    pub file_timeout:     Option<Duration>,
    pub blocks_per_chunk: usize,
}

impl Default for EccOptions {
    fn default() -> Self {
        Self {
            store_root:       PathBuf::from("."),
            select:           SelectOptions::default(),
            file_timeout:     None,
            blocks_per_chunk: DEFAULT_BLOCKS_PER_CHUNK,
        }
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct Orchestrator {
    codec:   Box<dyn Codec>,
    layout:  EccLayout,
    options: EccOptions,
    cancel:  CancelToken,
}

impl Orchestrator {
    pub fn new(codec: Box<dyn Codec>, options: EccOptions) -> Self {
        let layout = EccLayout::new(options.store_root.clone(), codec.params());
        Self { codec, layout, options, cancel: CancelToken::new() }
    }

    pub fn cancel_token(&self) -> &CancelToken { &self.cancel }

    pub fn layout(&self) -> &EccLayout { &self.layout }

    pub fn params(&self) -> CodecParams { self.codec.params() }

    // ── Batch ────────────────────────────────────────────────────────────────

    /// Resolve `roots` into the files a run would touch.
    pub fn select(&self, roots: &[PathBuf]) -> Result<Vec<Selection>> {
        FileSelector::new(&self.layout, &self.options.select).select_all(roots)
    }

    /// Select from `roots` and run `op` on every selected file.
    ///
    /// Only fails when a root is missing; per-file failures are recorded in
    /// the returned report.
    pub fn run(&self, op: Operation, roots: &[PathBuf]) -> Result<BatchReport> {
        let selection = self.select(roots)?;
        Ok(self.run_selection(op, selection))
    }

    pub fn run_selection(&self, op: Operation, selection: Vec<Selection>) -> BatchReport {
        let mut batch = BatchReport::new(op.name(), chrono::Utc::now().timestamp());
        info!(
            operation = op.name(),
            files     = selection.len(),
            params    = %self.params(),
            codec     = self.codec.name(),
            "starting batch"
        );

        for sel in selection {
            let start = Instant::now();
            let (path, result) = match sel {
                Selection::Eligible(file)          => { let r = self.process(op, &file); (file.path, r) }
                Selection::Rejected { path, error } => (path, Err(error)),
            };
            let outcome = FileOutcome::from_result(result);
            match &outcome {
                FileOutcome::Succeeded { result } =>
                    info!(path = %path.display(), "{}", result.summary()),
                FileOutcome::Skipped { reason, .. } =>
                    info!(path = %path.display(), reason = %reason, "skipped"),
                FileOutcome::Failed { kind, reason, .. } =>
                    error!(path = %path.display(), kind = kind.name(), reason = %reason, "failed"),
            }
            batch.files.push(FileReport {
                path,
                outcome,
                elapsed_ms: start.elapsed().as_millis() as u64,
            });
        }

        info!("{}", batch.summary());
        batch
    }

    /// Run `op` on one file.  A Check that finds corrupted blocks returns
    /// [`EccError::VerificationFailed`].
    pub fn process(&self, op: Operation, file: &ProtectedFile) -> Result<Success> {
        match op {
            Operation::Create            => self.create(file).map(Success::Created),
            Operation::Check             => self.check(file)?.into_result().map(Success::Checked),
            Operation::CheckSize         => self.check_size(file).map(Success::SizeChecked),
            Operation::Fix { compare }   => self.fix(file, compare).map(Success::Fixed),
        }
    }

    // ── Per-file operations ──────────────────────────────────────────────────

    /// Write the ECC store of `file`.  An existing store is never touched.
    ///
    /// On failure the partial store is cut back to whole parity blocks and
    /// left in place; it must be deleted before a new Create.
    #[instrument(skip(self, file), fields(path = %file.path.display()))]
    pub fn create(&self, file: &ProtectedFile) -> Result<CreateReport> {
        let ecc_path = self.layout.ecc_path(&file.path);
        if ecc_path.exists() {
            return Err(EccError::EccStoreAlreadyExists(ecc_path));
        }
        ensure_parent(&ecc_path)?;

        let src = File::open(&file.path)?;
        let dst = OpenOptions::new().write(true).create_new(true).open(&ecc_path)?;
        debug!(ecc = %ecc_path.display(), len = file.len, "creating ecc store");

        let cancel = self.cancel.child(self.options.file_timeout);
        match create_stream(self.codec.as_ref(), src, &dst, self.options.blocks_per_chunk, &cancel) {
            Ok(report) => {
                dst.sync_all()?;
                Ok(report)
            }
            Err(e) => Err(abandon_partial_store(&dst, &ecc_path, self.params().parity_size() as u64, e)),
        }
    }

    /// Verify every block of `file`.  Corrupted blocks are listed in the
    /// report, not returned as an error.
    #[instrument(skip(self, file), fields(path = %file.path.display()))]
    pub fn check(&self, file: &ProtectedFile) -> Result<CheckReport> {
        let ecc_path = self.layout.ecc_path(&file.path);
        check_pair(&file.path, &ecc_path, self.params())?;

        let cancel = self.cancel.child(self.options.file_timeout);
        let report = check_stream(
            self.codec.as_ref(),
            File::open(&file.path)?,
            File::open(&ecc_path)?,
            self.options.blocks_per_chunk,
            &cancel,
        )?;
        for block in &report.failed_blocks {
            warn!(block, "there are errors");
        }
        Ok(report)
    }

    /// Structural size check only; nothing is decoded.
    #[instrument(skip(self, file), fields(path = %file.path.display()))]
    pub fn check_size(&self, file: &ProtectedFile) -> Result<SizeCheck> {
        check_pair(&file.path, &self.layout.ecc_path(&file.path), self.params())
    }

    /// Write the repaired output of `file`, overwriting an earlier one.
    ///
    /// If any block cannot be corrected the output is removed: a repaired
    /// output that exists is complete.
    #[instrument(skip(self, file), fields(path = %file.path.display()))]
    pub fn fix(&self, file: &ProtectedFile, compare: bool) -> Result<FixReport> {
        let ecc_path = self.layout.ecc_path(&file.path);
        check_pair(&file.path, &ecc_path, self.params())?;

        let out_path = self.layout.repaired_path(&file.path);
        ensure_parent(&out_path)?;
        let out = File::create(&out_path)?;

        let cancel = self.cancel.child(self.options.file_timeout);
        let result = fix_stream(
            self.codec.as_ref(),
            File::open(&file.path)?,
            File::open(&ecc_path)?,
            &out,
            self.options.blocks_per_chunk,
            &cancel,
        )
        .and_then(|report| {
            out.sync_all()?;
            Ok(report)
        });
        drop(out);

        let mut report = match result {
            Ok(r) => r,
            Err(e) => {
                if let Err(rm) = fs::remove_file(&out_path) {
                    warn!(output = %out_path.display(), error = %rm, "could not remove unusable output");
                }
                return Err(e);
            }
        };

        if compare {
            let before = digest(File::open(&file.path)?)?;
            let after  = digest(File::open(&out_path)?)?;
            debug!(input = %hex::encode(before), output = %hex::encode(after), "blake3 digests");
            let identical = before == after;
            if !identical {
                info!(output = %out_path.display(), "repaired output differs from input");
            }
            report.identical = Some(identical);
        }
        Ok(report)
    }
}

/// Trim a failed Create's store to whole parity blocks and hand back the
/// error that stopped it.  A failed trim is only logged.
fn abandon_partial_store(dst: &File, ecc_path: &Path, parity_size: u64, cause: EccError) -> EccError {
    let trimmed = dst.metadata().and_then(|m| {
        let len = m.len();
        dst.set_len(len - len % parity_size)
    });
    match trimmed {
        Ok(()) => warn!(ecc = %ecc_path.display(), "partial ecc store left behind; delete it before retrying"),
        Err(t) => error!(ecc = %ecc_path.display(), error = %t, "could not trim partial ecc store; delete it"),
    }
    cause
}
