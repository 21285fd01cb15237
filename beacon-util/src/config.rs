use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::store::{Store, StoreError};

/// A configuration persisted as a JSON document at the root of a [`Store`]
pub trait StoredConfig
where
    Self: Serialize,
    Self: DeserializeOwned,
{
    fn kind() -> &'static str;

    /// This config's preferred file name excluding the extension.
    fn default_name() -> &'static str {
        Self::kind()
    }
}

/// Load the config of type `C`, if one was stored before
pub async fn get<C: StoredConfig>(store: &Store) -> Result<Option<C>, StoreError> {
    debug!("reading {} config", C::kind());
    store.read("/", C::default_name()).await
}

/// Persist `config` under its default name
pub async fn put<C: StoredConfig>(store: &Store, config: &C) -> Result<(), StoreError> {
    debug!("storing {} config", C::kind());
    store.write("/", C::default_name(), config).await
}
