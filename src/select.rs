//! Batch file selection.
//!
//! A root is either a single file or a directory walked recursively,
//! hidden entries included, in file-name order so runs are reproducible.
//! A file is eligible when it
//!
//! 1. is a regular file,
//! 2. carries the protected extension (`.gpg` unless configured otherwise),
//! 3. is not a store or repaired output this tool produced,
//! 4. does not exceed the size ceiling.
//!
//! Inside a directory scan, files failing 1–3 are silently passed over:
//! a backup tree is full of unrelated files.  Files over the ceiling are
//! reported as rejected so the user knows they are unprotected.  A root
//! that is itself a file is always reported when it is not eligible.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{EccError, Result};
use crate::layout::{is_derived_dir_name, EccLayout};

/// Extension of files that went through the upstream encryption step.
pub const DEFAULT_EXTENSION: &str = "gpg";

const BYTES_PER_MB: u64 = 1_000_000;

/// A file selected for processing, with its length at selection time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedFile {
    pub path: PathBuf,
    pub len:  u64,
}

#[derive(Debug)]
pub enum Selection {
    Eligible(ProtectedFile),
    Rejected { path: PathBuf, error: EccError },
}

impl Selection {
    pub fn path(&self) -> &Path {
        match self {
            Selection::Eligible(f)          => &f.path,
            Selection::Rejected { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectOptions {
    /// Required extension without the dot; `None` accepts any file.
    pub extension: Option<String>,
    /// Size ceiling in bytes; `None` for no ceiling.
    pub max_size:  Option<u64>,
}

impl SelectOptions {
    pub fn max_size_mb(mut self, mb: u64) -> Self {
        self.max_size = Some(mb.saturating_mul(BYTES_PER_MB));
        self
    }
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self { extension: Some(DEFAULT_EXTENSION.to_owned()), max_size: None }
    }
}

pub struct FileSelector<'a> {
    layout:  &'a EccLayout,
    options: &'a SelectOptions,
}

impl<'a> FileSelector<'a> {
    pub fn new(layout: &'a EccLayout, options: &'a SelectOptions) -> Self {
        Self { layout, options }
    }

    /// Select from every root, in the order given.
    ///
    /// Fails up front, before anything is selected, if any root does not
    /// exist or is neither a file nor a directory.
    pub fn select_all(&self, roots: &[PathBuf]) -> Result<Vec<Selection>> {
        let missing: Vec<&PathBuf> = roots.iter()
            .filter(|r| !r.is_file() && !r.is_dir())
            .collect();
        if let Some(first) = missing.first() {
            return Err(EccError::invalid_input(
                first.as_path(),
                format!("{} input path(s) don't exist or aren't files/directories", missing.len()),
            ));
        }

        let mut out = Vec::new();
        for root in roots {
            out.extend(self.select(root)?);
        }
        Ok(self.reject_shared_stores(out))
    }

    /// Keep the first of several selections that would share one ECC store
    /// (overlapping roots, `a/x` next to `a/./x`); reject the others.
    fn reject_shared_stores(&self, selection: Vec<Selection>) -> Vec<Selection> {
        let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
        selection.into_iter()
            .map(|sel| match sel {
                Selection::Eligible(file) => {
                    let store = self.layout.ecc_path(&file.path);
                    match claimed.get(&store) {
                        Some(first) => {
                            warn!(
                                path  = %file.path.display(),
                                first = %first.display(),
                                "skip: shares its ecc store with an earlier selection"
                            );
                            let reason = format!("same ECC store as {}", first.display());
                            Selection::Rejected {
                                error: EccError::invalid_input(&file.path, reason),
                                path:  file.path,
                            }
                        }
                        None => {
                            claimed.insert(store, file.path.clone());
                            Selection::Eligible(file)
                        }
                    }
                }
                rejected => rejected,
            })
            .collect()
    }

    pub fn select(&self, root: &Path) -> Result<Vec<Selection>> {
        if root.is_file() {
            return Ok(vec![self.select_single(root)]);
        }
        if !root.is_dir() {
            return Err(EccError::invalid_input(root, "no such file or directory"));
        }

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !e.file_type().is_dir()
                    || !e.file_name().to_str().is_some_and(is_derived_dir_name)
            });

        let mut out = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                    warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                    out.push(Selection::Rejected {
                        error: EccError::invalid_input(&path, e.to_string()),
                        path,
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if let Err(reason) = self.check_name(path) {
                debug!(path = %path.display(), reason, "not eligible");
                continue;
            }
            let len = match entry.metadata() {
                Ok(m) => m.len(),
                Err(e) => {
                    out.push(Selection::Rejected {
                        path: path.to_path_buf(),
                        error: EccError::invalid_input(path, e.to_string()),
                    });
                    continue;
                }
            };
            out.push(self.check_size(path, len));
        }
        Ok(out)
    }

    fn select_single(&self, path: &Path) -> Selection {
        if let Err(reason) = self.check_name(path) {
            return Selection::Rejected {
                path: path.to_path_buf(),
                error: EccError::invalid_input(path, reason),
            };
        }
        match fs::metadata(path) {
            Ok(m) if m.is_file() => self.check_size(path, m.len()),
            Ok(_) => Selection::Rejected {
                path: path.to_path_buf(),
                error: EccError::invalid_input(path, "not a regular file"),
            },
            Err(e) => Selection::Rejected {
                path: path.to_path_buf(),
                error: EccError::invalid_input(path, e.to_string()),
            },
        }
    }

    /// Extension and derived-artifact rules.
    fn check_name(&self, path: &Path) -> std::result::Result<(), &'static str> {
        if self.layout.is_derived(path) {
            return Err("generated ECC artifact");
        }
        if let Some(ext) = &self.options.extension {
            let matches = path.extension().and_then(|e| e.to_str()) == Some(ext.as_str());
            if !matches {
                return Err("extension mismatch");
            }
        }
        Ok(())
    }

    fn check_size(&self, path: &Path, len: u64) -> Selection {
        match self.options.max_size {
            Some(max) if len > max => {
                warn!(
                    path = %path.display(),
                    size_mb = len / BYTES_PER_MB,
                    "skip: file too big"
                );
                Selection::Rejected {
                    path: path.to_path_buf(),
                    error: EccError::invalid_input(
                        path,
                        format!("file too big: {} MB (limit {} MB)", len / BYTES_PER_MB, max / BYTES_PER_MB),
                    ),
                }
            }
            _ => Selection::Eligible(ProtectedFile { path: path.to_path_buf(), len }),
        }
    }
}
