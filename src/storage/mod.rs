//! Flat-directory file storage for template sources and image files.
//!
//! Every name that reaches the filesystem goes through [`validate_name`], so a
//! caller can never escape the configured root directory.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            return StorageError::NotFound(path.display().to_string());
        }
        StorageError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Reject names that are empty, hidden, or could address anything outside the
/// storage root.
pub fn validate_name(name: &str) -> StorageResult<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0'])
        || name.contains("..");

    if invalid {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// A directory of files addressed by logical name.
///
/// With an `extension` configured (templates), the logical name `welcome`
/// maps to `welcome.html`. Without one (images), the logical name is the file
/// name itself.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    extension: Option<&'static str>,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: None,
        }
    }

    pub fn with_extension(root: impl Into<PathBuf>, extension: &'static str) -> Self {
        Self {
            root: root.into(),
            extension: Some(extension),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if it does not exist yet.
    pub async fn ensure_root(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::io(&self.root, e))?;

        let meta = fs::metadata(&self.root)
            .await
            .map_err(|e| StorageError::io(&self.root, e))?;
        if !meta.is_dir() {
            return Err(StorageError::Io {
                path: self.root.display().to_string(),
                source: io::Error::other("not a directory"),
            });
        }
        Ok(())
    }

    /// Filesystem path for a logical name.
    pub fn path_for(&self, name: &str) -> StorageResult<PathBuf> {
        validate_name(name)?;
        let file_name = match self.extension {
            Some(ext) => format!("{}.{}", name, ext),
            None => name.to_string(),
        };
        Ok(self.root.join(file_name))
    }

    pub async fn read(&self, name: &str) -> StorageResult<Vec<u8>> {
        let path = self.path_for(name)?;
        fs::read(&path).await.map_err(|e| StorageError::io(&path, e))
    }

    pub async fn read_to_string(&self, name: &str) -> StorageResult<String> {
        let path = self.path_for(name)?;
        fs::read_to_string(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))
    }

    pub async fn write(&self, name: &str, contents: &[u8]) -> StorageResult<()> {
        let path = self.path_for(name)?;
        let mut file = fs::File::create(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        file.write_all(contents)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        file.flush().await.map_err(|e| StorageError::io(&path, e))?;
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> StorageResult<()> {
        let path = self.path_for(name)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))
    }

    /// Logical names of all stored files, sorted.
    pub async fn list(&self) -> StorageResult<Vec<String>> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| StorageError::io(&self.root, e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.root, e))?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = self.logical_name(&entry.path()) {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }

    fn logical_name(&self, path: &Path) -> Option<String> {
        let name = match self.extension {
            Some(ext) => {
                if path.extension().and_then(|e| e.to_str()) != Some(ext) {
                    return None;
                }
                path.file_stem()?.to_str()?.to_string()
            }
            None => path.file_name()?.to_str()?.to_string(),
        };
        validate_name(&name).ok().map(|_| name)
    }
}
