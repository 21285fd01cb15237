use std::io;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs;
use tracing::trace;

use super::fs::safe_write_all;

/// A filesystem backed JSON document store
///
/// Documents are addressed by a collection path and a name, and are kept
/// as `<root>/<collection>/<name>.json`. Writes are atomic but there is no
/// locking, two stores on the same root may overwrite each other.
#[derive(Clone, Debug)]
pub struct Store {
    root: PathBuf,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("invalid document location: {0}")]
    InvalidPath(String),
}

impl Store {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn document_path(&self, collection: &Path, name: &str) -> Result<PathBuf, StoreError> {
        let collection = collection.strip_prefix("/").unwrap_or(collection);
        if collection
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StoreError::InvalidPath(collection.display().to_string()));
        }

        // names become file names, so they cannot carry separators
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(StoreError::InvalidPath(name.to_owned()));
        }

        Ok(self
            .root
            .join(collection)
            .join(format!("{name}.json")))
    }

    /// Create or replace the document `name` in `collection`
    pub async fn write<P: AsRef<Path>, V: Serialize>(
        &self,
        collection: P,
        name: &str,
        value: &V,
    ) -> Result<(), StoreError> {
        let path = self.document_path(collection.as_ref(), name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let buf = serde_json::to_vec(value)?;
        trace!("writing {}", path.display());
        tokio::task::spawn_blocking(move || safe_write_all(path, buf))
            .await
            .map_err(io::Error::other)??;
        Ok(())
    }

    /// Read the document `name` from `collection`, returns `None` if it
    /// does not exist
    pub async fn read<P: AsRef<Path>, V: DeserializeOwned>(
        &self,
        collection: P,
        name: &str,
    ) -> Result<Option<V>, StoreError> {
        let path = self.document_path(collection.as_ref(), name)?;
        trace!("reading {}", path.display());

        match fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(serde_json::from_str::<V>(&contents)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Delete the document `name` from `collection`.
    ///
    /// Deleting a document that does not exist succeeds.
    pub async fn delete<P: AsRef<Path>>(&self, collection: P, name: &str) -> Result<(), StoreError> {
        let path = self.document_path(collection.as_ref(), name)?;
        trace!("removing {}", path.display());
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
