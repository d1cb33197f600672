//! Publication ledger (image_status.json)
//!
//! The ledger is the cross-run source of truth for what has already been
//! downloaded, transformed, and uploaded. It is loaded fully into memory at
//! publisher construction and rewritten to disk after every state
//! transition, so an interrupted run resumes with at most one repeated
//! remote side effect (at-least-once, never lost).

use chrono::{DateTime, Utc};
use rowforge_common::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Ledger format version written to new files
const LEDGER_VERSION: u32 = 1;

/// State of one published image, keyed by `{code}-{slug}-{index}`
///
/// Unknown keys in persisted entries are ignored on load for forward
/// compatibility; absent fields read as their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PublishRecord {
    /// Original fetched and stored locally
    #[serde(default)]
    pub downloaded: bool,

    /// Transformed artifact produced from the fetched original
    #[serde(default)]
    pub processed: bool,

    /// Transformed artifact published to the remote location
    #[serde(default)]
    pub uploaded: bool,

    /// sha-256 of the fetched original
    #[serde(default)]
    pub original_hash: String,

    /// sha-256 of the transformed artifact
    #[serde(default)]
    pub processed_hash: String,

    /// sha-256 of the artifact at the time of the last upload
    #[serde(default)]
    pub uploaded_hash: String,

    /// Local path of the fetched original
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_path: Option<String>,

    /// Local path of the transformed artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_path: Option<String>,

    #[serde(default)]
    pub last_downloaded: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_processed: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_uploaded: Option<DateTime<Utc>>,
}

/// Serialized shape of the ledger file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerFile {
    version: u32,
    last_updated: DateTime<Utc>,
    #[serde(default)]
    images: HashMap<String, PublishRecord>,
}

impl Default for LedgerFile {
    fn default() -> Self {
        Self {
            version: LEDGER_VERSION,
            last_updated: Utc::now(),
            images: HashMap::new(),
        }
    }
}

/// Persistent publication ledger
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    data: LedgerFile,
}

impl Ledger {
    /// Build the composite key for one image. `index` is 1-based and
    /// matches the published filename.
    pub fn key(code: &str, slug: &str, index: usize) -> String {
        format!("{}-{}-{}", code, slug, index)
    }

    /// Load the ledger from disk, starting empty when the file is missing
    /// or unreadable. Corruption is never a hard failure: a fresh ledger
    /// just means every image looks new again.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();

        let data = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<LedgerFile>(&content) {
                Ok(data) => {
                    debug!(entries = data.images.len(), path = %path.display(), "Ledger loaded");
                    data
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ledger unreadable, starting empty");
                    LedgerFile::default()
                },
            },
            Err(_) => {
                debug!(path = %path.display(), "No ledger file, starting empty");
                LedgerFile::default()
            },
        };

        Self { path, data }
    }

    /// Look up the record for one image, if any
    pub fn get(&self, key: &str) -> Option<&PublishRecord> {
        self.data.images.get(key)
    }

    /// Number of tracked images
    pub fn len(&self) -> usize {
        self.data.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.images.is_empty()
    }

    /// Record a completed fetch. Replaces any previous record: a changed
    /// original invalidates downstream transform and upload state.
    pub fn mark_downloaded(&mut self, key: &str, path: &Path, hash: String) -> Result<()> {
        self.data.images.insert(
            key.to_string(),
            PublishRecord {
                downloaded: true,
                original_hash: hash,
                downloaded_path: Some(path.display().to_string()),
                last_downloaded: Some(Utc::now()),
                ..PublishRecord::default()
            },
        );
        self.save()
    }

    /// Record a completed transform
    pub fn mark_processed(&mut self, key: &str, path: &Path, hash: String) -> Result<()> {
        let record = self.data.images.entry(key.to_string()).or_default();
        record.processed = true;
        record.processed_hash = hash;
        record.processed_path = Some(path.display().to_string());
        record.last_processed = Some(Utc::now());
        self.save()
    }

    /// Record a completed upload of the artifact with the given hash
    pub fn mark_uploaded(&mut self, key: &str, hash: String) -> Result<()> {
        let record = self.data.images.entry(key.to_string()).or_default();
        record.uploaded = true;
        record.uploaded_hash = hash;
        record.last_uploaded = Some(Utc::now());
        self.save()
    }

    /// Whether the transform step must run for this image
    pub fn needs_processing(&self, key: &str) -> bool {
        match self.get(key) {
            Some(record) => record.downloaded && !record.processed,
            None => true,
        }
    }

    /// Whether the upload step must run for this image. True when the
    /// artifact was never uploaded or its bytes changed since the last
    /// upload.
    pub fn needs_upload(&self, key: &str) -> bool {
        match self.get(key) {
            Some(record) => {
                record.processed
                    && (!record.uploaded || record.processed_hash != record.uploaded_hash)
            },
            None => false,
        }
    }

    /// Rewrite the whole ledger. Writes to a sibling temp file first and
    /// renames over the target so a crash mid-write cannot corrupt the
    /// previous ledger.
    fn save(&mut self) -> Result<()> {
        self.data.last_updated = Utc::now();

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&self.data)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record_path() -> PathBuf {
        PathBuf::from("/tmp/a.webp")
    }

    #[test]
    fn test_key_is_one_based_composite() {
        assert_eq!(Ledger::key("ns-1001", "hand-dryer", 1), "ns-1001-hand-dryer-1");
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::load_or_default(dir.path().join("image_status.json"));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("image_status.json");
        std::fs::write(&path, "{not json").unwrap();
        let ledger = Ledger::load_or_default(&path);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_transitions_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("status/image_status.json");
        let key = Ledger::key("ns-1", "x", 1);

        {
            let mut ledger = Ledger::load_or_default(&path);
            ledger.mark_downloaded(&key, &record_path(), "h1".into()).unwrap();
            ledger.mark_processed(&key, &record_path(), "h2".into()).unwrap();
            ledger.mark_uploaded(&key, "h2".into()).unwrap();
        }

        let ledger = Ledger::load_or_default(&path);
        let record = ledger.get(&key).unwrap();
        assert!(record.downloaded && record.processed && record.uploaded);
        assert_eq!(record.original_hash, "h1");
        assert_eq!(record.processed_hash, "h2");
        assert!(!ledger.needs_processing(&key));
        assert!(!ledger.needs_upload(&key));
    }

    #[test]
    fn test_redownload_resets_downstream_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("image_status.json");
        let key = Ledger::key("ns-1", "x", 1);

        let mut ledger = Ledger::load_or_default(&path);
        ledger.mark_downloaded(&key, &record_path(), "h1".into()).unwrap();
        ledger.mark_processed(&key, &record_path(), "h2".into()).unwrap();
        ledger.mark_uploaded(&key, "h2".into()).unwrap();

        ledger.mark_downloaded(&key, &record_path(), "h3".into()).unwrap();
        assert!(ledger.needs_processing(&key));
        assert!(!ledger.get(&key).unwrap().uploaded);
    }

    #[test]
    fn test_changed_artifact_needs_upload_again() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("image_status.json");
        let key = Ledger::key("ns-1", "x", 1);

        let mut ledger = Ledger::load_or_default(&path);
        ledger.mark_downloaded(&key, &record_path(), "h1".into()).unwrap();
        ledger.mark_processed(&key, &record_path(), "h2".into()).unwrap();
        ledger.mark_uploaded(&key, "h2".into()).unwrap();
        assert!(!ledger.needs_upload(&key));

        // A re-transform with different output must force a fresh upload
        // even though `uploaded` is still set.
        ledger.mark_processed(&key, &record_path(), "h4".into()).unwrap();
        assert!(ledger.needs_upload(&key));
    }

    #[test]
    fn test_unknown_keys_tolerated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("image_status.json");
        std::fs::write(
            &path,
            r#"{
                "version": 1,
                "last_updated": "2026-01-01T00:00:00Z",
                "images": {
                    "ns-1-x-1": {
                        "downloaded": true,
                        "original_hash": "h1",
                        "future_field": {"nested": true}
                    }
                }
            }"#,
        )
        .unwrap();

        let ledger = Ledger::load_or_default(&path);
        let record = ledger.get("ns-1-x-1").unwrap();
        assert!(record.downloaded);
        assert!(!record.processed);
        assert_eq!(record.original_hash, "h1");
    }
}
