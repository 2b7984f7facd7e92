//! Where a model's files come from.
//!
//! Archive extraction is an external concern: callers plug in an
//! [`ArchiveExtractor`]. This module only owns the temporary directory the
//! archive is unpacked into, and removes it when the last user lets go.

use crate::error::{ModelError, ModelResult};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A model given either as an extracted directory or as a packaged archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FmuSource {
    Directory(PathBuf),
    Archive(PathBuf),
}

/// Unpacks an archive into a destination directory.
pub trait ArchiveExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> io::Result<()>;
}

/// An extracted model directory.
#[derive(Debug)]
pub struct UnpackedFmu {
    dir: PathBuf,
    // Dropping this removes the extracted files.
    temp: Option<TempDir>,
}

impl UnpackedFmu {
    pub fn open(source: FmuSource, extractor: &dyn ArchiveExtractor) -> ModelResult<Self> {
        match source {
            FmuSource::Directory(dir) => {
                if !dir.is_dir() {
                    return Err(ModelError::InstantiationFailed {
                        reason: format!("model directory {} does not exist", dir.display()),
                    });
                }
                Ok(Self { dir, temp: None })
            }
            FmuSource::Archive(archive) => {
                if !archive.is_file() {
                    return Err(ModelError::InstantiationFailed {
                        reason: format!("archive {} does not exist", archive.display()),
                    });
                }
                let temp = tempfile::Builder::new().prefix("fmu-").tempdir()?;
                extractor.extract(&archive, temp.path())?;
                tracing::debug!(
                    "Extracted {} into {}",
                    archive.display(),
                    temp.path().display()
                );
                Ok(Self {
                    dir: temp.path().to_path_buf(),
                    temp: Some(temp),
                })
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True when the directory was created by extraction and will be removed.
    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }

    /// Location of the model's resources folder.
    pub fn resource_dir(&self) -> PathBuf {
        self.dir.join("resources")
    }
}
