use async_trait::async_trait;
use serde_json::{Map, Value};
use std::{
    collections::HashMap,
    fmt,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::{fs, sync::Mutex};
use tracing::{debug, warn};

#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Unavailable,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(err) => write!(f, "storage io error: {err}"),
            StorageError::Json(err) => write!(f, "storage file is not valid json: {err}"),
            StorageError::Unavailable => write!(f, "storage is unavailable"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(err) => Some(err),
            StorageError::Json(err) => Some(err),
            StorageError::Unavailable => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Json(err)
    }
}

/// Key/value string store the event logs persist into.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// All keys live in one JSON object file: `{ "<key>": "<value>", ... }`.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read_map(&self) -> Result<Map<String, Value>, StorageError> {
        match fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes)? {
                Value::Object(map) => Ok(map),
                _ => {
                    warn!(path = %self.path.display(), "data file is not a json object, ignoring it");
                    Ok(Map::new())
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl StorageProvider for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().await;
        let map = self.read_map().await?;
        Ok(map.get(key).and_then(Value::as_str).map(str::to_owned))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut map = match self.read_map().await {
            Ok(map) => map,
            Err(StorageError::Json(err)) => {
                warn!("overwriting corrupt data file: {err}");
                Map::new()
            }
            Err(err) => return Err(err),
        };
        map.insert(key.to_owned(), Value::String(value.to_owned()));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let payload = serde_json::to_vec_pretty(&Value::Object(map))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, payload).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!(key, path = %self.path.display(), "persisted");
        Ok(())
    }
}

/// In-process store. Can be switched off to behave like disabled storage.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: &str) -> Self {
        let mut values = HashMap::new();
        values.insert(key.to_owned(), value.to_owned());
        Self {
            values: Mutex::new(values),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub async fn raw(&self, key: &str) -> Option<String> {
        self.values.lock().await.get(key).cloned()
    }
}

#[async_trait]
impl StorageProvider for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable);
        }
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable);
        }
        self.values
            .lock()
            .await
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// Reads prefer `primary` and copy hits into `mirror`; writes go to both.
pub struct MirroredStore {
    primary: Arc<dyn StorageProvider>,
    mirror: Arc<dyn StorageProvider>,
}

impl MirroredStore {
    pub fn new(primary: Arc<dyn StorageProvider>, mirror: Arc<dyn StorageProvider>) -> Self {
        Self { primary, mirror }
    }
}

#[async_trait]
impl StorageProvider for MirroredStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.primary.get(key).await {
            Ok(Some(value)) => {
                if let Err(err) = self.mirror.set(key, &value).await {
                    warn!(key, "failed to mirror value: {err}");
                }
                return Ok(Some(value));
            }
            Ok(None) => {}
            Err(err) => warn!(key, "primary store read failed: {err}"),
        }

        self.mirror.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let primary = self.primary.set(key, value).await;
        let mirror = self.mirror.set(key, value).await;
        match (primary, mirror) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(err)) => {
                warn!(key, "mirror write failed: {err}");
                Ok(())
            }
            (Err(err), Ok(())) => {
                warn!(key, "primary write failed: {err}");
                Ok(())
            }
            (Err(err), Err(_)) => Err(err),
        }
    }
}
