use facegate_store::{Backend, FileStore, RemoteConfig, RemoteStore, StorageMode, StoreError};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:5001).
    pub bind: SocketAddr,
    /// Which backend holds enrolled embeddings.
    pub storage_mode: StorageMode,
    /// Base URL of the remote embedding service (database mode).
    pub backend_api_url: String,
    /// Path of the JSON embeddings file (file mode).
    pub embeddings_file: PathBuf,
    /// Directory containing `det_10g.onnx` and `w600k_r50.onnx`.
    pub model_dir: PathBuf,
    /// Timeout for remote reads.
    pub read_timeout: Duration,
    /// Timeout for remote writes.
    pub write_timeout: Duration,
    /// Largest accepted request body, in bytes.
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facegate");

        let storage_mode = match std::env::var("FACEGATE_STORAGE_MODE") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to database storage mode");
                StorageMode::Database
            }),
            Err(_) => StorageMode::Database,
        };

        let bind = std::env::var("FACEGATE_BIND")
            .ok()
            .and_then(|v| match v.parse() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    tracing::warn!(value = %v, error = %e, "invalid FACEGATE_BIND, using default");
                    None
                }
            })
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 5001)));

        Self {
            bind,
            storage_mode,
            backend_api_url: std::env::var("FACEGATE_BACKEND_API_URL")
                .unwrap_or_else(|_| "http://localhost:8080/api/v1".to_string()),
            embeddings_file: std::env::var("FACEGATE_EMBEDDINGS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("embeddings_store.json")),
            model_dir: std::env::var("FACEGATE_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| facegate_core::default_model_dir()),
            read_timeout: Duration::from_secs(env_u64("FACEGATE_READ_TIMEOUT_SECS", 5)),
            write_timeout: Duration::from_secs(env_u64("FACEGATE_WRITE_TIMEOUT_SECS", 10)),
            max_upload_bytes: upload_limit_bytes(env_usize("FACEGATE_MAX_UPLOAD_MB", 20)),
        }
    }

    /// Construct the configured storage backend.
    pub fn build_backend(&self) -> Result<Backend, StoreError> {
        match self.storage_mode {
            StorageMode::Database => {
                let remote = RemoteStore::new(RemoteConfig {
                    base_url: self.backend_api_url.clone(),
                    read_timeout: self.read_timeout,
                    write_timeout: self.write_timeout,
                })?;
                tracing::info!(url = %self.backend_api_url, "storage mode: database");
                Ok(Backend::Remote(remote))
            }
            StorageMode::File => {
                tracing::info!(path = %self.embeddings_file.display(), "storage mode: file");
                Ok(Backend::File(FileStore::new(&self.embeddings_file)))
            }
        }
    }
}

fn upload_limit_bytes(megabytes: usize) -> usize {
    megabytes.saturating_mul(1024 * 1024)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
