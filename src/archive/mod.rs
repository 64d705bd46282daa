//! Tar archiving of mirror clones.
//!
//! Produces a single seekable `.tar` stream per repository. Entry names
//! are rooted at the source directory's own name, so the archive keeps
//! the repository directory as its top level and never leaks the
//! absolute scratch path it was built from.
//!
//! Tar I/O is blocking, so the walk runs on the blocking thread pool.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

/// Errors from archiving one repository's mirror. Fatal for that
/// repository's task only.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The source could not be stat'ed at all.
    #[error("cannot stat archive source {path}: {source}")]
    Source {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("archive source {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("i/o error while archiving: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Archive `source` into the tar file at `dest`.
///
/// Walks the tree recursively, directories before their contents, writing
/// a header (name, mode, size) per entry followed by the raw bytes of
/// regular files. On any error the partially written destination file is
/// removed so it can never be mistaken for an uploadable artifact.
#[instrument(fields(source = %source.display(), dest = %dest.display()))]
pub async fn archive_dir(source: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let source = source.to_path_buf();
    let dest = dest.to_path_buf();

    // Blocking tar I/O stays off the async runtime.
    tokio::task::spawn_blocking(move || archive_dir_blocking(&source, &dest)).await?
}

fn archive_dir_blocking(source: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let metadata = std::fs::metadata(source).map_err(|e| ArchiveError::Source {
        path: source.to_path_buf(),
        source: e,
    })?;
    if !metadata.is_dir() {
        return Err(ArchiveError::NotADirectory(source.to_path_buf()));
    }
    let base = source
        .file_name()
        .ok_or_else(|| ArchiveError::NotADirectory(source.to_path_buf()))?
        .to_owned();

    let result = write_archive(source, Path::new(&base), dest);
    if result.is_err() {
        // Never leave a half-written archive eligible for upload.
        let _ = std::fs::remove_file(dest);
    } else {
        debug!("archive written");
    }
    result
}

fn write_archive(source: &Path, base: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let file = std::fs::File::create(dest)?;
    let mut builder = tar::Builder::new(file);

    // append_dir_all walks depth-first with each directory entry emitted
    // before its contents, rewriting names relative to `base`.
    builder.append_dir_all(base, source)?;

    let mut file = builder.into_inner()?;
    file.flush()?;
    Ok(())
}
