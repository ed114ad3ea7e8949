use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::{task::JoinHandle, time};
use tracing::{debug, warn};

pub const WEBHOOK_URL_KEY: &str = "hookcast.webhook_url";

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("store file {0} is not a JSON object")]
    Malformed(String),
    #[error("store encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait]
pub trait UrlStore: Send + Sync {
    async fn load(&self) -> Result<Option<String>, StoreError>;
    async fn save(&self, value: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("hookcast").join("store.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<Map<String, Value>, StoreError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(source) => return Err(self.io_error(source)),
        };

        match serde_json::from_slice(&raw)? {
            Value::Object(map) => Ok(map),
            _ => Err(StoreError::Malformed(self.path.display().to_string())),
        }
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl UrlStore for FileStore {
    async fn load(&self) -> Result<Option<String>, StoreError> {
        let map = self.read_map().await?;
        Ok(map
            .get(WEBHOOK_URL_KEY)
            .and_then(Value::as_str)
            .map(ToOwned::to_owned))
    }

    async fn save(&self, value: &str) -> Result<(), StoreError> {
        let mut map = self.read_map().await?;
        map.insert(WEBHOOK_URL_KEY.to_owned(), Value::String(value.to_owned()));

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| self.io_error(source))?;
        }

        let encoded = serde_json::to_vec_pretty(&Value::Object(map))?;
        tokio::fs::write(&self.path, encoded)
            .await
            .map_err(|source| self.io_error(source))
    }
}

/// Debounces webhook URL writes: only a value left untouched for the whole
/// window reaches the store.
pub struct PersistScheduler {
    store: Arc<dyn UrlStore>,
    window: Duration,
    pending: Option<JoinHandle<()>>,
}

impl PersistScheduler {
    pub fn new(store: Arc<dyn UrlStore>, window: Duration) -> Self {
        Self {
            store,
            window,
            pending: None,
        }
    }

    pub fn schedule(&mut self, value: String) {
        self.cancel();

        let store = Arc::clone(&self.store);
        let window = self.window;
        self.pending = Some(tokio::spawn(async move {
            time::sleep(window).await;
            match store.save(&value).await {
                Ok(()) => debug!("webhook url persisted"),
                Err(err) => warn!(?err, "failed to persist webhook url"),
            }
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for PersistScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
