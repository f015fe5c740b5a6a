//! Request-scoped workspace directories.
//!
//! Every downloaded artifact lives in its own temp directory; dropping the
//! [`Workspace`] removes the directory and everything in it, so cleanup
//! happens on every exit path without an explicit step.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

const WORKSPACE_PREFIX: &str = "textmill-";
const DEFAULT_FILE_NAME: &str = "input.bin";

/// A unique directory rooted in the process temp dir, owned by one request.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix(WORKSPACE_PREFIX).tempdir()?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for the artifact file, derived from the sanitized base name of
    /// the declared file name.
    pub fn file_path(&self, file_name: &str) -> PathBuf {
        self.dir.path().join(sanitize_file_name(file_name))
    }
}

/// Reduce a declared file name to a safe base name: path separators and
/// parent components are stripped, and an empty or fully-stripped name falls
/// back to `input.bin`.
pub fn sanitize_file_name(name: &str) -> String {
    let trimmed = name.trim();
    let base = trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if base.is_empty() || base == "." || base == ".." {
        return DEFAULT_FILE_NAME.to_string();
    }
    base.to_string()
}
