//! Fetched artifacts and the deployed copy.
//!
//! The working directory (`workdir/<id>`) holds what was last fetched; the
//! target directory (`targetpath/<name>`) holds what is deployed. A file is
//! rewritten in the target only when its bytes differ, so an unchanged
//! remote leaves the deployed copy (and its mtime) untouched.
//!
//! Writes go through `<file>.orca.tmp` and a rename, so readers of the target
//! never observe a partially written file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use similar::TextDiff;

use orca_compose::COMPOSE_FILE_NAMES;

use crate::error::{io_err, SyncError};

/// Suffix of in-flight temporary files. Never treated as an artifact.
pub const TMP_SUFFIX: &str = ".orca.tmp";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One file read from the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Outcome of materializing a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// Target was absent or differed and has been replaced.
    Written { path: PathBuf },
    /// Target already held identical bytes.
    Unchanged { path: PathBuf },
}

impl WriteResult {
    pub fn path(&self) -> &Path {
        match self {
            WriteResult::Written { path } | WriteResult::Unchanged { path } => path,
        }
    }
}

/// Outcome of materializing every fetched file of a stack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    pub writes: Vec<WriteResult>,
}

impl MaterializeReport {
    /// Whether any file in the target changed.
    pub fn changed(&self) -> bool {
        self.writes
            .iter()
            .any(|w| matches!(w, WriteResult::Written { .. }))
    }
}

// ---------------------------------------------------------------------------
// ArtifactStore
// ---------------------------------------------------------------------------

/// Pairs a stack's working directory with its deployed directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    source_dir: PathBuf,
    target_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(source_dir: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            target_dir: target_dir.into(),
        }
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Read every regular file of the working directory, sorted by name.
    ///
    /// A missing working directory yields an empty list.
    pub fn collect(&self) -> Result<Vec<FetchedFile>, SyncError> {
        let entries = match std::fs::read_dir(&self.source_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.source_dir, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&self.source_dir, e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| io_err(&path, e))?;
            if !file_type.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!(
                    target: "puller",
                    path = %path.display(),
                    "skipping non UTF-8 file name",
                );
                continue;
            };
            if name.ends_with(TMP_SUFFIX) {
                continue;
            }
            let bytes = std::fs::read(&path).map_err(|e| io_err(&path, e))?;
            files.push(FetchedFile { name, bytes });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Copy `files` into the target directory, rewriting only what differs.
    pub fn materialize(&self, files: &[FetchedFile]) -> Result<MaterializeReport, SyncError> {
        std::fs::create_dir_all(&self.target_dir).map_err(|e| io_err(&self.target_dir, e))?;

        let mut report = MaterializeReport::default();
        for file in files {
            let path = self.target_dir.join(&file.name);
            report.writes.push(write_if_changed(&path, &file.bytes)?);
        }
        Ok(report)
    }
}

/// The file holding the stack definition: the first recognized compose file
/// name, else the only file fetched.
pub fn compose_definition(files: &[FetchedFile]) -> Option<&FetchedFile> {
    COMPOSE_FILE_NAMES
        .iter()
        .find_map(|wanted| files.iter().find(|f| f.name == *wanted))
        .or(match files {
            [only] => Some(only),
            _ => None,
        })
}

// ---------------------------------------------------------------------------
// Write helpers
// ---------------------------------------------------------------------------

fn write_if_changed(path: &Path, content: &[u8]) -> Result<WriteResult, SyncError> {
    let tmp = PathBuf::from(format!("{}{TMP_SUFFIX}", path.display()));
    write_if_changed_with_tmp(path, content, &tmp)
}

fn write_if_changed_with_tmp(
    path: &Path,
    content: &[u8],
    tmp: &Path,
) -> Result<WriteResult, SyncError> {
    let existing = match std::fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => return Err(io_err(path, e)),
    };

    match &existing {
        Some(current) if current.as_slice() == content => {
            tracing::debug!(target: "puller", path = %path.display(), "unchanged");
            return Ok(WriteResult::Unchanged {
                path: path.to_path_buf(),
            });
        }
        Some(current) => log_drift(path, current, content),
        None => tracing::debug!(target: "puller", path = %path.display(), "target absent"),
    }

    std::fs::write(tmp, content).map_err(|e| io_err(tmp, e))?;
    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::info!(target: "puller", path = %path.display(), "wrote");
    Ok(WriteResult::Written {
        path: path.to_path_buf(),
    })
}

fn log_drift(path: &Path, old: &[u8], new: &[u8]) {
    if !tracing::enabled!(target: "puller", tracing::Level::DEBUG) {
        return;
    }
    let (Ok(old), Ok(new)) = (std::str::from_utf8(old), std::str::from_utf8(new)) else {
        tracing::debug!(target: "puller", path = %path.display(), "binary content drifted");
        return;
    };
    let unified = TextDiff::from_lines(old, new)
        .unified_diff()
        .header("deployed", "fetched")
        .context_radius(3)
        .to_string();
    tracing::debug!(target: "puller", path = %path.display(), "drift detected\n{unified}");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
