use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{path::Path as ObjPath, ObjectStore};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::utils::config::{AppConfig, StorageKind};

pub type DynObjectStore = Arc<dyn ObjectStore>;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Upload payload is empty")]
    EmptyPayload,

    #[error("Object storage failure: {0}")]
    Backend(#[from] object_store::Error),
}

/// Capability interface for turning raw bytes into a durable content
/// reference. The ingestion coordinator only depends on this seam, so tests
/// and alternative backends can stand in freely.
#[async_trait]
pub trait UploadAdapter: Send + Sync {
    async fn upload(&self, data: Bytes, destination_hint: &str) -> Result<String, UploadError>;
}

pub type DynUploader = Arc<dyn UploadAdapter>;

/// Object storage wrapper over the configured backend.
#[derive(Clone)]
pub struct AssetStore {
    store: DynObjectStore,
    backend_kind: StorageKind,
    local_base: Option<PathBuf>,
}

impl AssetStore {
    /// Create an AssetStore with the backend named in the configuration.
    pub async fn new(cfg: &AppConfig) -> object_store::Result<Self> {
        let backend_kind = cfg.storage.clone();
        let (store, local_base) = create_storage_backend(cfg).await?;

        Ok(Self {
            store,
            backend_kind,
            local_base,
        })
    }

    /// Create an AssetStore with a custom storage backend, useful for
    /// injecting a specific backend in tests.
    pub fn with_backend(store: DynObjectStore, backend_kind: StorageKind) -> Self {
        Self {
            store,
            backend_kind,
            local_base: None,
        }
    }

    pub fn backend_kind(&self) -> &StorageKind {
        &self.backend_kind
    }

    /// The resolved base directory when the backend is local.
    pub fn local_base_path(&self) -> Option<&std::path::Path> {
        self.local_base.as_deref()
    }

    pub async fn put(&self, location: &str, data: Bytes) -> object_store::Result<()> {
        let path = ObjPath::from(location);
        let payload = object_store::PutPayload::from_bytes(data);
        self.store.put(&path, payload).await.map(|_| ())
    }

    pub async fn get(&self, location: &str) -> object_store::Result<Bytes> {
        let path = ObjPath::from(location);
        let result = self.store.get(&path).await?;
        result.bytes().await
    }

    pub async fn exists(&self, location: &str) -> object_store::Result<bool> {
        let path = ObjPath::from(location);
        self.store
            .head(&path)
            .await
            .map(|_| true)
            .or_else(|e| match e {
                object_store::Error::NotFound { .. } => Ok(false),
                _ => Err(e),
            })
    }

    pub async fn list(
        &self,
        prefix: Option<&str>,
    ) -> object_store::Result<Vec<object_store::ObjectMeta>> {
        let prefix_path = prefix.map(ObjPath::from);
        self.store.list(prefix_path.as_ref()).try_collect().await
    }
}

/// Uploader that content-addresses objects by SHA-256 under the caller's
/// destination hint. Re-uploading identical bytes lands on the same
/// location, so duplicate submissions cost one `head` call and no write.
#[derive(Clone)]
pub struct ObjectStoreUploader {
    assets: AssetStore,
}

impl ObjectStoreUploader {
    pub fn new(assets: AssetStore) -> Self {
        Self { assets }
    }
}

#[async_trait]
impl UploadAdapter for ObjectStoreUploader {
    async fn upload(&self, data: Bytes, destination_hint: &str) -> Result<String, UploadError> {
        if data.is_empty() {
            return Err(UploadError::EmptyPayload);
        }

        let digest = Sha256::digest(&data);
        let hint = destination_hint.trim_matches('/');
        let location = if hint.is_empty() {
            format!("{digest:x}")
        } else {
            format!("{hint}/{digest:x}")
        };

        if self.assets.exists(&location).await? {
            debug!(%location, "upload deduplicated against existing object");
            return Ok(location);
        }

        self.assets.put(&location, data).await?;
        debug!(%location, "uploaded object");

        Ok(location)
    }
}

/// Create a storage backend based on configuration.
async fn create_storage_backend(
    cfg: &AppConfig,
) -> object_store::Result<(DynObjectStore, Option<PathBuf>)> {
    match cfg.storage {
        StorageKind::Local => {
            let base = resolve_base_dir(cfg);
            if !base.exists() {
                tokio::fs::create_dir_all(&base).await.map_err(|e| {
                    object_store::Error::Generic {
                        store: "LocalFileSystem",
                        source: e.into(),
                    }
                })?;
            }
            let store = LocalFileSystem::new_with_prefix(base.clone())?;
            Ok((Arc::new(store), Some(base)))
        }
        StorageKind::Memory => {
            let store = InMemory::new();
            Ok((Arc::new(store), None))
        }
    }
}

/// Resolve the absolute base directory used for local storage from config.
///
/// If `data_dir` is relative, it is resolved against the current working directory.
fn resolve_base_dir(cfg: &AppConfig) -> PathBuf {
    if cfg.data_dir.starts_with('/') {
        PathBuf::from(&cfg.data_dir)
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(&cfg.data_dir)
    }
}
