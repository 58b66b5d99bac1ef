use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

/// Backing store for uploaded objects, keyed by client id and remote
/// path. The trait is the seam a remote object store would plug into;
/// the shipped backend writes to the local filesystem.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store the object and return its full storage key.
    async fn put(&self, client_id: &str, remote_path: &str, data: Bytes) -> Result<String>;

    async fn exists(&self, client_id: &str, remote_path: &str) -> Result<bool>;

    /// `Ok(None)` when no object is stored under the key.
    async fn read(&self, client_id: &str, remote_path: &str) -> Result<Option<Bytes>>;
}

/// Filesystem-backed storage rooted at `root`, laying objects out as
/// `root/prefix/<client>/<remote-path>`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    prefix: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
        }
    }

    /// Absolute on-disk location of an object, mainly for tests.
    pub fn object_path(&self, client_id: &str, remote_path: &str) -> PathBuf {
        self.root.join(&self.prefix).join(client_id).join(remote_path)
    }

    fn key(&self, client_id: &str, remote_path: &str) -> String {
        format!("{}/{}/{}", self.prefix, client_id, remote_path)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn put(&self, client_id: &str, remote_path: &str, data: Bytes) -> Result<String> {
        let path = self.object_path(client_id, remote_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;
        Ok(self.key(client_id, remote_path))
    }

    async fn exists(&self, client_id: &str, remote_path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.object_path(client_id, remote_path)).await?)
    }

    async fn read(&self, client_id: &str, remote_path: &str) -> Result<Option<Bytes>> {
        match tokio::fs::read(self.object_path(client_id, remote_path)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
