use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{Span, debug, field, instrument, warn};

use crate::client::{ActivationRequest, Cloud, CloudError};
use crate::device::Device;
use crate::util::crypto::sha256_hex_digest;
use crate::util::http::Uri;
use crate::util::store::{Store, StoreError};
use crate::util::types::{ApiKey, Uuid};

#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("failed to read/write device keys: {0}")]
    Store(#[from] StoreError),

    #[error("activation failed: {0}")]
    Cloud(#[from] CloudError),
}

/// Device keys issued against one cloud endpoint
///
/// Keys live under `keys/<endpoint digest>/` in the store, with keys for
/// activations in progress kept in a `pending` sub-collection. Activated keys
/// are also kept in memory after the first lookup.
#[derive(Debug)]
pub struct KeyCache {
    store: Store,
    collection: PathBuf,
    pending: PathBuf,
    keys: HashMap<Uuid, ApiKey>,
}

impl KeyCache {
    pub fn new(store: Store, api_endpoint: &Uri) -> Self {
        let collection = Path::new("keys").join(sha256_hex_digest(api_endpoint.to_string()));
        let pending = collection.join("pending");
        Self {
            store,
            collection,
            pending,
            keys: HashMap::new(),
        }
    }

    /// Return the key of an activated device
    pub async fn get(&mut self, device: &Uuid) -> Result<Option<ApiKey>, StoreError> {
        if let Some(key) = self.keys.get(device) {
            return Ok(Some(key.clone()));
        }

        let key: Option<ApiKey> = self.store.read(&self.collection, device).await?;
        if let Some(key) = &key {
            self.keys.insert(device.clone(), key.clone());
        }
        Ok(key)
    }

    /// Store the key of an activated device
    pub async fn put(&mut self, device: &Uuid, key: &ApiKey) -> Result<(), StoreError> {
        self.store.write(&self.collection, device, key).await?;
        self.keys.insert(device.clone(), key.clone());
        Ok(())
    }

    /// Remove the key of a device, the next activation will request a new
    /// one
    pub async fn forget(&mut self, device: &Uuid) -> Result<(), StoreError> {
        self.keys.remove(device);
        self.store.delete(&self.collection, device).await
    }

    /// Return the key of an activation that did not complete
    pub async fn pending(&self, device: &Uuid) -> Result<Option<ApiKey>, StoreError> {
        self.store.read(&self.pending, device).await
    }

    pub async fn put_pending(&self, device: &Uuid, key: &ApiKey) -> Result<(), StoreError> {
        self.store.write(&self.pending, device, key).await
    }

    pub async fn clear_pending(&self, device: &Uuid) -> Result<(), StoreError> {
        self.store.delete(&self.pending, device).await
    }
}

/// Make sure `device` is activated with the cloud and return its key
///
/// A device that already has a key is not activated again. Otherwise a new
/// key is generated and stored as pending before calling the cloud. If the
/// process stops after the cloud accepted the key but before it was cached,
/// the next attempt re-uses the pending key, and the cloud replies that the
/// device is already activated, which completes the activation.
#[instrument(skip_all, fields(device = %device.uuid, result = field::Empty), err)]
pub async fn activate<C: Cloud>(
    cloud: &mut C,
    cache: &mut KeyCache,
    device: &Device,
) -> Result<ApiKey, ActivationError> {
    if let Some(key) = cache.get(&device.uuid).await? {
        Span::current().record("result", "cached");
        return Ok(key);
    }

    let key = if let Some(key) = cache.pending(&device.uuid).await? {
        debug!("resuming pending activation");
        key
    } else {
        let key = ApiKey::default();
        cache.put_pending(&device.uuid, &key).await?;
        key
    };

    let request = ActivationRequest {
        uuid: device.uuid.clone(),
        name: device.name.clone(),
        device_type: device.device_type,
        device_key: key.clone(),
    };

    let result = match cloud.activate(&request).await {
        Ok(()) => "activated",
        Err(CloudError::AlreadyActivated) => "recovered",
        Err(err) => return Err(err.into()),
    };
    Span::current().record("result", result);

    cache.put(&device.uuid, &key).await?;
    if let Err(err) = cache.clear_pending(&device.uuid).await {
        warn!("failed to remove pending key: {err}");
    }

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{DeliveryStatus, MessageReceipt};
    use crate::device::{DeviceType, Message};
    use crate::request::RequestError;
    use reqwest::StatusCode;
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeCloud {
        activated: Vec<ActivationRequest>,
        fail_with: Option<StatusCode>,
    }

    impl Cloud for FakeCloud {
        async fn activate(&mut self, request: &ActivationRequest) -> Result<(), CloudError> {
            if let Some(status) = self.fail_with {
                return Err(RequestError::Status(status, String::new()).into());
            }
            if self
                .activated
                .iter()
                .any(|r| r.uuid == request.uuid && r.device_key == request.device_key)
            {
                return Err(CloudError::AlreadyActivated);
            }
            self.activated.push(request.clone());
            Ok(())
        }

        async fn send(&mut self, _: &ApiKey, _: &Message) -> Result<MessageReceipt, CloudError> {
            unreachable!()
        }

        async fn status(
            &mut self,
            _: &ApiKey,
            _: &MessageReceipt,
        ) -> Result<DeliveryStatus, CloudError> {
            unreachable!()
        }
    }

    fn device() -> Device {
        Device {
            uuid: "dev-1".parse().unwrap(),
            name: "kitchen".into(),
            device_type: DeviceType::Hygrometer,
            active: true,
        }
    }

    fn cache(store: &Store) -> KeyCache {
        KeyCache::new(store.clone(), &Uri::from_static("https://api.example.com"))
    }

    #[tokio::test]
    async fn it_activates_once_and_caches_the_key() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());
        let mut cloud = FakeCloud::default();
        let mut cache = cache(&store);

        let key = activate(&mut cloud, &mut cache, &device()).await.unwrap();
        let again = activate(&mut cloud, &mut cache, &device()).await.unwrap();

        assert_eq!(key, again);
        assert_eq!(cloud.activated.len(), 1);
        assert_eq!(cloud.activated[0].device_key, key);
        assert_eq!(cache.pending(&device().uuid).await.unwrap(), None);

        // a fresh cache on the same store finds the key on disk
        let mut reloaded = self::cache(&store);
        assert_eq!(reloaded.get(&device().uuid).await.unwrap(), Some(key));
    }

    #[tokio::test]
    async fn failed_activation_keeps_the_pending_key() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());
        let mut cache = cache(&store);
        let mut cloud = FakeCloud {
            fail_with: Some(StatusCode::BAD_GATEWAY),
            ..Default::default()
        };

        let res = activate(&mut cloud, &mut cache, &device()).await;
        assert!(matches!(res, Err(ActivationError::Cloud(_))));
        let pending = cache.pending(&device().uuid).await.unwrap().unwrap();
        assert_eq!(cache.get(&device().uuid).await.unwrap(), None);

        cloud.fail_with = None;
        let key = activate(&mut cloud, &mut cache, &device()).await.unwrap();
        assert_eq!(key, pending);
    }

    #[tokio::test]
    async fn already_activated_completes_a_pending_activation() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());
        let mut cache = cache(&store);

        // the cloud accepted the key but the process stopped before caching it
        let key = ApiKey::from("pending-key");
        cache.put_pending(&device().uuid, &key).await.unwrap();
        let mut cloud = FakeCloud {
            activated: vec![ActivationRequest {
                uuid: device().uuid,
                name: "kitchen".into(),
                device_type: DeviceType::Hygrometer,
                device_key: key.clone(),
            }],
            ..Default::default()
        };

        let res = activate(&mut cloud, &mut cache, &device()).await.unwrap();
        assert_eq!(res, key);
        assert_eq!(cloud.activated.len(), 1);
        assert_eq!(cache.pending(&device().uuid).await.unwrap(), None);
        assert_eq!(cache.get(&device().uuid).await.unwrap(), Some(key));
    }

    #[tokio::test]
    async fn keys_are_scoped_to_the_endpoint() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());
        let mut cache = cache(&store);
        cache
            .put(&device().uuid, &ApiKey::from("device-key"))
            .await
            .unwrap();

        let mut other = KeyCache::new(store, &Uri::from_static("https://staging.example.com"));
        assert_eq!(other.get(&device().uuid).await.unwrap(), None);
    }

    #[tokio::test]
    async fn forgotten_keys_are_requested_again() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());
        let mut cache = cache(&store);
        let mut cloud = FakeCloud::default();

        let first = activate(&mut cloud, &mut cache, &device()).await.unwrap();
        cache.forget(&device().uuid).await.unwrap();
        let second = activate(&mut cloud, &mut cache, &device()).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(cloud.activated.len(), 2);
    }
}
