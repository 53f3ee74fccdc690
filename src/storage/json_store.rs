use std::{
    io::ErrorKind,
    marker::PhantomData,
    path::{Path, PathBuf},
};

use fs4::tokio::AsyncFileExt;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::fs::{self, File};
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path:?}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("malformed document {path:?}: {error}")]
    Format {
        path: PathBuf,
        #[source]
        error: serde_json::Error,
    },
}

/// A single JSON document on disk. Missing files read as `T::default()`. Writes go to a sibling
/// temporary file first and are renamed into place.
#[derive(Debug, Clone)]
pub struct JsonStore<T> {
    path: PathBuf,
    _document: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned + Default> JsonStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _document: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(skip(self), fields(path = ?self.path))]
    pub async fn load(&self) -> Result<T, StoreError> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Document is missing, using defaults");
                return Ok(T::default());
            }
            Err(error) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    error,
                })
            }
        };
        serde_json::from_slice(&raw).map_err(|error| StoreError::Format {
            path: self.path.clone(),
            error,
        })
    }

    pub async fn save(&self, value: &T) -> Result<(), StoreError> {
        let lock = self.lock().await?;
        let result = self.write(value).await;
        self.unlock(lock).await?;
        result
    }

    /// Loads the document, applies `change` and writes the result back under an exclusive lock.
    /// Nothing is written when `change` fails.
    pub async fn update<R, E>(&self, change: impl FnOnce(&mut T) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let lock = self.lock().await?;
        let result: Result<R, E> = async {
            let mut document = self.load().await?;
            let value = change(&mut document)?;
            self.write(&document).await?;
            Ok(value)
        }
        .await;
        self.unlock(lock).await?;
        result
    }

    async fn write(&self, value: &T) -> Result<(), StoreError> {
        let io = |error| StoreError::Io {
            path: self.path.clone(),
            error,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(io)?;
        }
        let buffer = serde_json::to_vec_pretty(value).map_err(|error| StoreError::Format {
            path: self.path.clone(),
            error,
        })?;
        let temporary = self.path.with_extension("tmp");
        fs::write(&temporary, buffer).await.map_err(io)?;
        fs::rename(&temporary, &self.path).await.map_err(io)?;
        Ok(())
    }

    async fn lock(&self) -> Result<File, StoreError> {
        let path = self.path.with_extension("lock");
        let io = |error| StoreError::Io {
            path: path.clone(),
            error,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(io)?;
        }
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await
            .map_err(io)?;
        file.lock_exclusive().map_err(io)?;
        Ok(file)
    }

    async fn unlock(&self, file: File) -> Result<(), StoreError> {
        file.unlock_async().await.map_err(|error| StoreError::Io {
            path: self.path.with_extension("lock"),
            error,
        })
    }
}
