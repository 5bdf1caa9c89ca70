use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use directories::BaseDirs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::client::ApiClient;
use crate::error::CbioError;

/// Opaque byte storage addressed by hex keys.
pub trait BlobStore: Send + Sync {
    fn key_to_path(&self, key: &str) -> Utf8PathBuf;
    fn contains(&self, key: &str) -> bool;
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CbioError>;
    fn write(&self, key: &str, content: &[u8]) -> Result<(), CbioError>;
    fn clear(&self) -> Result<(), CbioError>;
}

#[derive(Debug, Clone)]
pub struct DiskStore {
    root: Utf8PathBuf,
}

impl DiskStore {
    pub fn new() -> Result<Self, CbioError> {
        let root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("kira-cbioportal"))
                    .ok()
            })
            .ok_or_else(|| {
                CbioError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self { root })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

impl BlobStore for DiskStore {
    /// Entries fan out over two-character prefix directories.
    fn key_to_path(&self, key: &str) -> Utf8PathBuf {
        let prefix = key.get(..2).unwrap_or("__");
        self.root.join(prefix).join(format!("{key}.json"))
    }

    fn contains(&self, key: &str) -> bool {
        self.key_to_path(key).as_std_path().exists()
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CbioError> {
        let path = self.key_to_path(key);
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        fs::read(path.as_std_path())
            .map(Some)
            .map_err(|err| CbioError::Filesystem(format!("read {path}: {err}")))
    }

    fn write(&self, key: &str, content: &[u8]) -> Result<(), CbioError> {
        write_bytes_atomic(&self.key_to_path(key), content)
    }

    fn clear(&self) -> Result<(), CbioError> {
        if self.root.as_std_path().exists() {
            fs::remove_dir_all(self.root.as_std_path())
                .map_err(|err| CbioError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryStore {
    fn key_to_path(&self, key: &str) -> Utf8PathBuf {
        Utf8PathBuf::from("memory").join(key)
    }

    fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CbioError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| CbioError::Filesystem("memory store poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, content: &[u8]) -> Result<(), CbioError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CbioError::Filesystem("memory store poisoned".to_string()))?;
        entries.insert(key.to_string(), content.to_vec());
        Ok(())
    }

    fn clear(&self) -> Result<(), CbioError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CbioError::Filesystem("memory store poisoned".to_string()))?;
        entries.clear();
        Ok(())
    }
}

/// Deterministic identity of a planner query: function name, client
/// identity and arguments in call order. List arguments must be sorted by
/// the caller before being added.
#[derive(Debug, Clone)]
pub struct QueryKey {
    function: String,
    parts: Vec<Value>,
}

impl QueryKey {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            parts: Vec::new(),
        }
    }

    pub fn client(mut self, client: &ApiClient) -> Self {
        self.parts.push(client.identity());
        self
    }

    pub fn arg(mut self, name: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.parts.push(Value::Array(vec![Value::from(name), value]));
        self
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn digest(&self) -> String {
        let canonical = Value::Array(
            std::iter::once(Value::from(self.function.as_str()))
                .chain(self.parts.iter().cloned())
                .collect(),
        );
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope<T> {
    key: String,
    function: String,
    stored_at: DateTime<Utc>,
    value: T,
}

/// Typed results keyed by [`QueryKey`], persisted in a [`BlobStore`].
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn BlobStore>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    pub fn get<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<Option<T>, CbioError> {
        let digest = key.digest();
        let Some(content) = self.store.read(&digest)? else {
            debug!(function = key.function(), key = %digest, "result cache miss");
            return Ok(None);
        };
        let envelope: CacheEnvelope<T> = serde_json::from_slice(&content)
            .map_err(|err| CbioError::Decode(format!("cache entry {digest}: {err}")))?;
        info!(
            function = key.function(),
            key = %digest,
            stored_at = %envelope.stored_at,
            "result cache hit"
        );
        Ok(Some(envelope.value))
    }

    pub fn put<T: Serialize>(&self, key: &QueryKey, value: &T) -> Result<(), CbioError> {
        let digest = key.digest();
        let envelope = CacheEnvelope {
            key: digest.clone(),
            function: key.function().to_string(),
            stored_at: Utc::now(),
            value,
        };
        let content =
            serde_json::to_vec(&envelope).map_err(|err| CbioError::Decode(err.to_string()))?;
        self.store.write(&digest, &content)?;
        info!(function = key.function(), key = %digest, "result cached");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), CbioError> {
        self.store.clear()
    }
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CbioError> {
    let parent = path
        .parent()
        .ok_or_else(|| CbioError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| CbioError::Filesystem(err.to_string()))?;
    let temp = tempfile::Builder::new()
        .prefix("kira-cbio")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| CbioError::Filesystem(err.to_string()))?;
    fs::write(temp.path(), content).map_err(|err| CbioError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| CbioError::Filesystem(err.to_string()))?;
    Ok(())
}
