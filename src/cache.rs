//! Two-tier store for downloaded schema documents.
//!
//! Remote schema locations are fetched once and kept in a `moka` memory tier backed by a
//! `cacache` disk tier, so repeated process starts do not hit the network while the entry's
//! TTL holds. Compiled schemas are not cached here; they live in the
//! [`SchemaRegistry`](crate::schema_loader::SchemaRegistry) for the lifetime of the process.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub directory: PathBuf,
    /// Disk entry lifetime in hours
    pub ttl_hours: u64,
    pub max_memory_entries: u64,
    pub memory_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: std::env::temp_dir().join("validate-bag-cache"),
            ttl_hours: 24,
            max_memory_entries: 64,
            memory_ttl_seconds: 3600,
        }
    }
}

pub type CacheResult<T> = Result<T, ValidationError>;

/// Sidecar metadata stored next to each disk entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaEntryMetadata {
    pub key: String,
    pub location: String,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub size_bytes: u64,
}

impl SchemaEntryMetadata {
    pub fn new(key: String, location: String, ttl: Duration, size_bytes: u64) -> Self {
        let now = Utc::now();
        let expires_at =
            now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(24));

        Self {
            key,
            location,
            fetched_at: now,
            expires_at,
            size_bytes,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct CachedSchemaDocument {
    pub data: Arc<Vec<u8>>,
    pub metadata: SchemaEntryMetadata,
}

/// Stable key for a schema location
pub fn cache_key(location: &str) -> String {
    format!("schema_{}", hex::encode(Sha256::digest(location.as_bytes())))
}

struct DiskTier {
    directory: PathBuf,
}

impl DiskTier {
    async fn get(&self, key: &str) -> CacheResult<Option<CachedSchemaDocument>> {
        let metadata = match self.read_metadata(key).await? {
            Some(metadata) if !metadata.is_expired() => metadata,
            Some(_) => {
                debug!(key, "disk cache entry expired");
                self.remove(key).await;
                return Ok(None);
            }
            None => return Ok(None),
        };

        match cacache::read(&self.directory, key).await {
            Ok(data) => Ok(Some(CachedSchemaDocument {
                data: Arc::new(data),
                metadata,
            })),
            Err(cacache::Error::EntryNotFound(_, _)) => Ok(None),
            Err(e) => Err(ValidationError::Cache(format!(
                "Failed to read from disk cache: {}",
                e
            ))),
        }
    }

    async fn set(&self, key: &str, data: &[u8], metadata: &SchemaEntryMetadata) -> CacheResult<()> {
        cacache::write(&self.directory, key, data)
            .await
            .map_err(|e| ValidationError::Cache(format!("Failed to write to disk cache: {}", e)))?;

        let metadata_path = self.metadata_path(key);
        if let Some(parent) = metadata_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                ValidationError::Cache(format!("Failed to create metadata directory: {}", e))
            })?;
        }
        let content = serde_json::to_string_pretty(metadata)
            .map_err(|e| ValidationError::Cache(format!("Failed to serialize metadata: {}", e)))?;
        fs::write(&metadata_path, content)
            .await
            .map_err(|e| ValidationError::Cache(format!("Failed to write metadata: {}", e)))
    }

    async fn remove(&self, key: &str) {
        let _ = cacache::remove(&self.directory, key).await;
        let _ = fs::remove_file(self.metadata_path(key)).await;
    }

    async fn read_metadata(&self, key: &str) -> CacheResult<Option<SchemaEntryMetadata>> {
        match fs::read_to_string(self.metadata_path(key)).await {
            Ok(content) => serde_json::from_str(&content).map(Some).map_err(|e| {
                ValidationError::Cache(format!("Failed to parse metadata: {}", e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ValidationError::Cache(format!(
                "Failed to read metadata: {}",
                e
            ))),
        }
    }

    fn metadata_path(&self, key: &str) -> PathBuf {
        self.directory.join("metadata").join(format!("{}.json", key))
    }
}

/// Memory-then-disk cache of schema bytes keyed by location
pub struct SchemaDocumentCache {
    memory: Cache<String, Arc<CachedSchemaDocument>>,
    disk: DiskTier,
    config: CacheConfig,
}

impl SchemaDocumentCache {
    pub fn new(config: CacheConfig) -> Self {
        let memory = Cache::builder()
            .max_capacity(config.max_memory_entries)
            .time_to_live(Duration::from_secs(config.memory_ttl_seconds))
            .build();
        let disk = DiskTier {
            directory: config.directory.clone(),
        };

        Self {
            memory,
            disk,
            config,
        }
    }

    pub async fn get(&self, location: &str) -> CacheResult<Option<Arc<CachedSchemaDocument>>> {
        let key = cache_key(location);

        if let Some(entry) = self.memory.get(&key).await {
            debug!(location, "schema cache hit (memory)");
            return Ok(Some(entry));
        }

        if let Some(entry) = self.disk.get(&key).await? {
            debug!(location, "schema cache hit (disk)");
            let entry = Arc::new(entry);
            self.memory.insert(key, Arc::clone(&entry)).await;
            return Ok(Some(entry));
        }

        debug!(location, "schema cache miss");
        Ok(None)
    }

    pub async fn set(&self, location: &str, data: Vec<u8>) -> CacheResult<()> {
        let key = cache_key(location);
        let ttl = Duration::from_secs(self.config.ttl_hours * 3600);
        let metadata =
            SchemaEntryMetadata::new(key.clone(), location.to_string(), ttl, data.len() as u64);

        self.disk.set(&key, &data, &metadata).await?;
        self.memory
            .insert(
                key,
                Arc::new(CachedSchemaDocument {
                    data: Arc::new(data),
                    metadata,
                }),
            )
            .await;

        Ok(())
    }

    pub async fn remove(&self, location: &str) {
        let key = cache_key(location);
        self.memory.remove(&key).await;
        self.disk.remove(&key).await;
    }

    pub async fn clear(&self) -> CacheResult<()> {
        self.memory.invalidate_all();
        cacache::clear(&self.config.directory)
            .await
            .map_err(|e| ValidationError::Cache(format!("Failed to clear disk cache: {}", e)))
    }
}
