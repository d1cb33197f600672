//! Remote artifact storage

use async_trait::async_trait;
use rowforge_common::{Result, RowforgeError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;
use suppaftp::{FtpStream, Mode};
use tracing::{debug, info};

/// Destination for published artifacts
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Store `data` under `filename`, overwriting any existing object
    async fn put(&self, filename: &str, data: Vec<u8>) -> Result<()>;
}

/// FTP connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Directory uploads land in, created on demand
    pub remote_dir: String,
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 21,
            username: "anonymous".to_string(),
            password: "anonymous".to_string(),
            remote_dir: "uploads".to_string(),
        }
    }
}

/// Publishes artifacts over plain FTP
///
/// suppaftp's stream is synchronous, so every upload runs on a blocking
/// thread with a fresh connection. Upload volume is low enough that
/// connection reuse is not worth the shared-state plumbing.
pub struct FtpStore {
    config: FtpConfig,
}

impl FtpStore {
    pub fn new(config: FtpConfig) -> Self {
        Self { config }
    }

    fn connect(config: &FtpConfig) -> std::result::Result<FtpStream, suppaftp::FtpError> {
        let mut ftp = FtpStream::connect(format!("{}:{}", config.host, config.port))?;
        ftp.login(&config.username, &config.password)?;
        ftp.set_mode(Mode::Passive);
        Ok(ftp)
    }

    // cwd into remote_dir, creating missing components one level at a time
    fn enter_remote_dir(
        ftp: &mut FtpStream,
        remote_dir: &str,
    ) -> std::result::Result<(), suppaftp::FtpError> {
        for component in remote_dir.split('/').filter(|c| !c.is_empty()) {
            if ftp.cwd(component).is_err() {
                ftp.mkdir(component)?;
                ftp.cwd(component)?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FtpStore {
    async fn put(&self, filename: &str, data: Vec<u8>) -> Result<()> {
        let config = self.config.clone();
        let filename = filename.to_string();
        let size = data.len();

        debug!(host = %config.host, filename, size, "Uploading over FTP");

        let task_filename = filename.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let filename = task_filename;
            let mut ftp = Self::connect(&config)
                .map_err(|e| RowforgeError::Upload(format!("FTP connect failed: {}", e)))?;

            Self::enter_remote_dir(&mut ftp, &config.remote_dir).map_err(|e| {
                RowforgeError::Upload(format!(
                    "Entering remote dir '{}' failed: {}",
                    config.remote_dir, e
                ))
            })?;

            ftp.put_file(&filename, &mut Cursor::new(data))
                .map_err(|e| RowforgeError::Upload(format!("Upload of '{}' failed: {}", filename, e)))?;

            let _ = ftp.quit();
            Ok(())
        })
        .await
        .map_err(|e| RowforgeError::Upload(format!("Upload task failed: {}", e)))??;

        info!(filename, size, "Uploaded");
        Ok(())
    }
}

/// In-memory store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    put_count: Mutex<usize>,
    fail_names: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future `put` of `filename` fail
    pub fn fail_on(&self, filename: &str) {
        if let Ok(mut names) = self.fail_names.lock() {
            names.push(filename.to_string());
        }
    }

    pub fn get(&self, filename: &str) -> Option<Vec<u8>> {
        self.objects.lock().ok()?.get(filename).cloned()
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.objects.lock().map(|o| o.contains_key(filename)).unwrap_or(false)
    }

    /// Total successful `put` calls, across overwrites
    pub fn put_count(&self) -> usize {
        self.put_count.lock().map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn put(&self, filename: &str, data: Vec<u8>) -> Result<()> {
        let should_fail = self
            .fail_names
            .lock()
            .map(|names| names.iter().any(|n| n == filename))
            .unwrap_or(false);
        if should_fail {
            return Err(RowforgeError::Upload(format!("injected failure for '{}'", filename)));
        }

        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(filename.to_string(), data);
        }
        if let Ok(mut count) = self.put_count.lock() {
            *count += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_put_and_get() {
        let store = MemoryStore::new();
        store.put("a.webp", vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.get("a.webp"), Some(vec![1, 2, 3]));
        assert_eq!(store.put_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_overwrite_counts() {
        let store = MemoryStore::new();
        store.put("a.webp", vec![1]).await.unwrap();
        store.put("a.webp", vec![2]).await.unwrap();
        assert_eq!(store.get("a.webp"), Some(vec![2]));
        assert_eq!(store.put_count(), 2);
    }

    #[tokio::test]
    async fn test_memory_store_injected_failure() {
        let store = MemoryStore::new();
        store.fail_on("a.webp");
        let result = store.put("a.webp", vec![1]).await;
        assert!(matches!(result, Err(RowforgeError::Upload(_))));
        assert!(!store.contains("a.webp"));
    }
}
