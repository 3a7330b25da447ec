//! Staging a verified artifact into a sandbox.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StageError {
  #[error("failed to unpack {}: {source}", path.display())]
  Unpack {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to stage {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("staging task failed: {0}")]
  Join(String),
}

/// Whether the artifact at `path` is unpacked rather than copied.
pub fn is_tarball(path: &Path) -> bool {
  let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
  name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

/// Stage `artifact` into `dest` and return the source directory.
///
/// Tarballs are unpacked; when the archive holds a single top-level directory
/// that directory is the source. Any other artifact is copied into `dest`.
pub async fn stage(artifact: &Path, dest: &Path) -> Result<PathBuf, StageError> {
  let artifact = artifact.to_path_buf();
  let dest = dest.to_path_buf();
  tokio::task::spawn_blocking(move || stage_blocking(&artifact, &dest))
    .await
    .map_err(|e| StageError::Join(e.to_string()))?
}

fn stage_blocking(artifact: &Path, dest: &Path) -> Result<PathBuf, StageError> {
  let io_err = |path: &Path| {
    let path = path.to_path_buf();
    move |source| StageError::Io { path, source }
  };

  fs::create_dir_all(dest).map_err(io_err(dest))?;

  if !is_tarball(artifact) {
    let file_name = artifact.file_name().unwrap_or(artifact.as_os_str());
    let target = dest.join(file_name);
    fs::copy(artifact, &target).map_err(io_err(&target))?;
    debug!(artifact = %artifact.display(), dest = %dest.display(), "copied artifact");
    return Ok(dest.to_path_buf());
  }

  let unpack_err = |source| StageError::Unpack {
    path: artifact.to_path_buf(),
    source,
  };
  let file = fs::File::open(artifact).map_err(unpack_err)?;
  let mut archive = tar::Archive::new(GzDecoder::new(file));
  archive.set_preserve_permissions(true);
  archive.unpack(dest).map_err(unpack_err)?;

  let mut entries: Vec<PathBuf> = fs::read_dir(dest)
    .map_err(io_err(dest))?
    .flatten()
    .map(|e| e.path())
    .collect();

  let source = if entries.len() == 1 && entries[0].is_dir() {
    entries.remove(0)
  } else {
    dest.to_path_buf()
  };
  debug!(artifact = %artifact.display(), source = %source.display(), "unpacked artifact");
  Ok(source)
}
