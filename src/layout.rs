//! Where the companion files of a protected file live.
//!
//! ```text
//! <root>/
//! ├── ecc-255-223-8/                      # one directory per parameter triple
//! │   └── backups/2024/home.tar.gpg.ecc-255-223-8
//! └── ecc-regenerated/
//!     └── backups/2024/home.tar.gpg.regenerated
//! ```
//!
//! The protected file's path is mirrored under each directory, so changing
//! parameters never collides with older stores and the tree stays browsable.
//! Mirroring is one-to-one on the component chain: the root of an absolute
//! path becomes `@root`, a Windows prefix `@drive-…`, `..` becomes `@up`,
//! and a real component that starts with `@` gets a second `@`.  Only `.`
//! is dropped.  `a/x.gpg`, `/a/x.gpg` and `../a/x.gpg` therefore get three
//! different stores.  Directories are created by [`ensure_parent`] right
//! before a write.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::params::CodecParams;

pub const REGENERATED_DIR:    &str = "ecc-regenerated";
pub const REGENERATED_SUFFIX: &str = "regenerated";

#[derive(Debug, Clone)]
pub struct EccLayout {
    root:   PathBuf,
    params: CodecParams,
}

impl EccLayout {
    pub fn new(root: impl Into<PathBuf>, params: CodecParams) -> Self {
        Self { root: root.into(), params }
    }

    pub fn params(&self) -> CodecParams { self.params }

    /// `<root>/ecc-<n>-<k>-<exp>`
    pub fn store_dir(&self) -> PathBuf {
        self.root.join(self.params.tag())
    }

    /// `<root>/ecc-regenerated`
    pub fn regenerated_dir(&self) -> PathBuf {
        self.root.join(REGENERATED_DIR)
    }

    /// `<root>/ecc-<n>-<k>-<exp>/<path>.ecc-<n>-<k>-<exp>`
    pub fn ecc_path(&self, protected: &Path) -> PathBuf {
        let tag = self.params.tag();
        with_appended_suffix(self.root.join(&tag).join(mirrored(protected)), &tag)
    }

    /// `<root>/ecc-regenerated/<path>.regenerated`
    pub fn repaired_path(&self, protected: &Path) -> PathBuf {
        with_appended_suffix(self.regenerated_dir().join(mirrored(protected)), REGENERATED_SUFFIX)
    }

    /// True for files this tool generated, under any parameter triple:
    /// anything inside a store or regenerated directory, or named like one.
    pub fn is_derived(&self, path: &Path) -> bool {
        let in_derived_dir = path.parent().is_some_and(|parent| {
            parent.components().any(|c| match c {
                Component::Normal(name) => name.to_str().is_some_and(is_derived_dir_name),
                _ => false,
            })
        });
        let derived_name = path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_derived_file_name);
        in_derived_dir || derived_name
    }
}

/// `ecc-regenerated` or any valid `ecc-<n>-<k>-<exp>` tag.
pub fn is_derived_dir_name(name: &str) -> bool {
    name == REGENERATED_DIR || CodecParams::from_tag(name).is_some()
}

fn is_derived_file_name(name: &str) -> bool {
    if name.ends_with(&format!(".{REGENERATED_SUFFIX}")) {
        return true;
    }
    name.rsplit_once('.')
        .is_some_and(|(_, ext)| CodecParams::from_tag(ext).is_some())
}

const ROOT_SEGMENT:   &str = "@root";
const PARENT_SEGMENT: &str = "@up";
const DRIVE_PREFIX:   &str = "@drive-";

/// `path` as a relative path below a store directory, one segment per
/// component.
fn mirrored(path: &Path) -> PathBuf {
    path.components()
        .filter_map(|c| match c {
            Component::Prefix(p) => {
                let drive: String = p.as_os_str()
                    .to_string_lossy()
                    .chars()
                    .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
                    .collect();
                Some(OsString::from(format!("{DRIVE_PREFIX}{drive}")))
            }
            Component::RootDir      => Some(OsString::from(ROOT_SEGMENT)),
            Component::ParentDir    => Some(OsString::from(PARENT_SEGMENT)),
            Component::CurDir       => None,
            Component::Normal(part) => Some(escape_segment(part)),
        })
        .collect()
}

/// Double a leading `@` so real names never look like reserved segments.
fn escape_segment(part: &OsStr) -> OsString {
    if part.as_encoded_bytes().first() == Some(&b'@') {
        let mut escaped = OsString::from("@");
        escaped.push(part);
        escaped
    } else {
        part.to_os_string()
    }
}

/// `foo.gpg` + `x` → `foo.gpg.x` (never replaces the existing extension).
fn with_appended_suffix(path: PathBuf, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Create the parent directory of `path` if it doesn't exist yet.
pub fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
