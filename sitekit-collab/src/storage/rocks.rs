//! RocksDB-backed layout store.
//!
//! Column families:
//! - `layouts`   — current layout snapshot per key (JSON, LZ4 compressed)
//! - `revisions` — the last `max_revisions` snapshots per key, keyed
//!                 `<key>\0<revision:8 bytes big-endian>`
//! - `metadata`  — [`LayoutMetadata`] as JSON
//!
//! Every save writes all three in one atomic `WriteBatch`. Saves and
//! deletes are serialised so concurrent writers never reuse a revision.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    Direction, IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::{Deserialize, Serialize};
use sitekit_core::LayoutDocument;

use super::{check_key, LayoutPersistence, StoreError};

const CF_LAYOUTS: &str = "layouts";
const CF_REVISIONS: &str = "revisions";
const CF_METADATA: &str = "metadata";

const COLUMN_FAMILIES: &[&str] = &[CF_LAYOUTS, CF_REVISIONS, CF_METADATA];

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// fsync on every save (default: true; autosaves are infrequent)
    pub sync_writes: bool,
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 16MB)
    pub write_buffer_size: usize,
    /// Snapshots kept per key in the `revisions` family; 0 disables history.
    pub max_revisions: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("sitekit_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: true,
            max_open_files: 512,
            write_buffer_size: 16 * 1024 * 1024,
            max_revisions: 20,
        }
    }
}

impl StoreConfig {
    /// Small caches, no fsync.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024,
            max_revisions: 5,
        }
    }
}

/// Bookkeeping stored next to each layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutMetadata {
    pub key: String,
    /// Incremented on every save, starting at 1.
    pub revision: u64,
    pub page_count: u64,
    pub block_count: u64,
    /// Uncompressed JSON size in bytes
    pub snapshot_size: u64,
    pub compressed_size: u64,
    /// Seconds since epoch
    pub created_at: u64,
    pub updated_at: u64,
}

impl LayoutMetadata {
    fn new(key: &str) -> Self {
        let now = unix_now();
        Self {
            key: key.to_string(),
            revision: 0,
            page_count: 0,
            block_count: 0,
            snapshot_size: 0,
            compressed_size: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn encode(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

/// RocksDB layout store.
pub struct RocksLayoutStore {
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
    /// Held across the metadata read and the batch write.
    write_lock: Mutex<()>,
}

impl RocksLayoutStore {
    /// Open (creating if missing) the database at `config.path`.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;

        log::info!("Opened layout store at {}", config.path.display());
        Ok(Self {
            db,
            config,
            write_lock: Mutex::new(()),
        })
    }

    fn cf_options(name: &str, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        opts.set_block_based_table_factory(&block_opts);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            // values are already LZ4 framed
            CF_LAYOUTS | CF_REVISIONS => {
                opts.set_compression_type(DBCompressionType::None);
                opts.set_max_write_buffer_number(2);
            }
            CF_METADATA => {
                opts.set_compression_type(DBCompressionType::Lz4);
                opts.optimize_for_point_lookup(config.block_cache_size as u64);
            }
            _ => {}
        }

        opts
    }

    // ─── Snapshots ────────────────────────────────────────────────────

    /// Save `layout` as the current snapshot and as a new revision.
    pub fn save_layout(&self, key: &str, layout: &LayoutDocument) -> Result<LayoutMetadata, StoreError> {
        check_key(key)?;
        let cf_layouts = self.cf(CF_LAYOUTS)?;
        let cf_revisions = self.cf(CF_REVISIONS)?;
        let cf_meta = self.cf(CF_METADATA)?;

        let json =
            serde_json::to_vec(layout).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let compressed = lz4_flex::compress_prepend_size(&json);

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut meta = match self.load_metadata(key) {
            Ok(meta) => meta,
            Err(StoreError::NotFound(_)) => LayoutMetadata::new(key),
            Err(e) => return Err(e),
        };
        meta.revision += 1;
        meta.page_count = layout.pages.len() as u64;
        meta.block_count = layout.block_count() as u64;
        meta.snapshot_size = json.len() as u64;
        meta.compressed_size = compressed.len() as u64;
        meta.updated_at = unix_now();

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_layouts, key.as_bytes(), &compressed);
        batch.put_cf(&cf_meta, key.as_bytes(), meta.encode()?);
        if self.config.max_revisions > 0 {
            batch.put_cf(&cf_revisions, revision_key(key, meta.revision), &compressed);
            if meta.revision > self.config.max_revisions {
                // drop everything older than the retention window
                let oldest_kept = meta.revision - self.config.max_revisions + 1;
                batch.delete_range_cf(
                    &cf_revisions,
                    revision_key(key, 0),
                    revision_key(key, oldest_kept),
                );
            }
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;

        log::debug!(
            "Saved layout {key} rev {} ({} -> {} bytes)",
            meta.revision,
            meta.snapshot_size,
            meta.compressed_size
        );
        Ok(meta)
    }

    pub fn load_layout(&self, key: &str) -> Result<LayoutDocument, StoreError> {
        check_key(key)?;
        let cf = self.cf(CF_LAYOUTS)?;
        match self.db.get_cf(&cf, key.as_bytes())? {
            Some(compressed) => decode_snapshot(&compressed),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    /// Load a retained historical revision.
    pub fn load_revision(&self, key: &str, revision: u64) -> Result<LayoutDocument, StoreError> {
        check_key(key)?;
        let cf = self.cf(CF_REVISIONS)?;
        match self.db.get_cf(&cf, revision_key(key, revision))? {
            Some(compressed) => decode_snapshot(&compressed),
            None => Err(StoreError::NotFound(format!("{key}@{revision}"))),
        }
    }

    /// Retained revision numbers for `key`, oldest first.
    pub fn list_revisions(&self, key: &str) -> Result<Vec<u64>, StoreError> {
        check_key(key)?;
        let cf = self.cf(CF_REVISIONS)?;
        let prefix = revision_prefix(key);

        let mut revisions = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (k, _) = item?;
            if !k.starts_with(&prefix) || k.len() != prefix.len() + 8 {
                break;
            }
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&k[prefix.len()..]);
            revisions.push(u64::from_be_bytes(buf));
        }
        Ok(revisions)
    }

    // ─── Metadata ─────────────────────────────────────────────────────

    pub fn load_metadata(&self, key: &str) -> Result<LayoutMetadata, StoreError> {
        check_key(key)?;
        let cf = self.cf(CF_METADATA)?;
        match self.db.get_cf(&cf, key.as_bytes())? {
            Some(bytes) => LayoutMetadata::decode(&bytes),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    pub fn exists(&self, key: &str) -> Result<bool, StoreError> {
        check_key(key)?;
        let cf = self.cf(CF_METADATA)?;
        Ok(self.db.get_cf(&cf, key.as_bytes())?.is_some())
    }

    /// Every key with a stored layout.
    pub fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        let mut keys = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (k, _) = item?;
            let key = String::from_utf8(k.to_vec())
                .map_err(|e| StoreError::InvalidKey(e.to_string()))?;
            keys.push(key);
        }
        Ok(keys)
    }

    /// Remove a layout, its history and its metadata.
    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        check_key(key)?;
        let cf_layouts = self.cf(CF_LAYOUTS)?;
        let cf_revisions = self.cf(CF_REVISIONS)?;
        let cf_meta = self.cf(CF_METADATA)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_layouts, key.as_bytes());
        batch.delete_cf(&cf_meta, key.as_bytes());
        batch.delete_range_cf(&cf_revisions, revision_key(key, 0), revision_prefix_end(key));
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.db.write(batch)?;
        Ok(())
    }

    /// Flush memtables to disk.
    pub fn sync(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("Column family '{name}' not found")))
    }
}

impl LayoutPersistence for RocksLayoutStore {
    fn save(&self, key: &str, layout: &LayoutDocument) -> Result<(), StoreError> {
        self.save_layout(key, layout).map(|_| ())
    }

    fn load(&self, key: &str) -> Result<LayoutDocument, StoreError> {
        self.load_layout(key)
    }
}

fn decode_snapshot(compressed: &[u8]) -> Result<LayoutDocument, StoreError> {
    let json = lz4_flex::decompress_size_prepended(compressed)
        .map_err(|e| StoreError::Compression(e.to_string()))?;
    serde_json::from_slice(&json).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn revision_prefix(key: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(key.len() + 1);
    prefix.extend_from_slice(key.as_bytes());
    prefix.push(0);
    prefix
}

/// Exclusive upper bound of every revision key for `key`.
fn revision_prefix_end(key: &str) -> Vec<u8> {
    let mut end = Vec::with_capacity(key.len() + 1);
    end.extend_from_slice(key.as_bytes());
    end.push(1);
    end
}

fn revision_key(key: &str, revision: u64) -> Vec<u8> {
    let mut k = revision_prefix(key);
    k.extend_from_slice(&revision.to_be_bytes());
    k
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitekit_core::{Block, Page};

    fn open(dir: &tempfile::TempDir) -> RocksLayoutStore {
        RocksLayoutStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap()
    }

    fn doc(title: &str) -> LayoutDocument {
        LayoutDocument::with_pages(vec![Page::new("home", "", title)
            .block(Block::with_id("hero-1", "heading").prop("text", title))
            .block(Block::with_id("body", "text").prop("text", "lorem ipsum ".repeat(20)))])
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);

        let meta = store.save_layout("acme:shop:home", &doc("Welcome")).unwrap();
        assert_eq!(meta.revision, 1);
        assert_eq!(meta.block_count, 2);
        assert!(meta.compressed_size < meta.snapshot_size);

        assert_eq!(store.load_layout("acme:shop:home").unwrap(), doc("Welcome"));
        assert!(store.path().exists());
    }

    #[test]
    fn test_concurrent_saves_get_distinct_revisions() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(open(&dir));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..5)
                        .map(|i| {
                            store
                                .save_layout("acme:shop:home", &doc(&format!("t{t} #{i}")))
                                .unwrap()
                                .revision
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut revisions: Vec<u64> =
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        revisions.sort_unstable();
        assert_eq!(revisions, (1..=20).collect::<Vec<_>>());
        assert_eq!(store.load_metadata("acme:shop:home").unwrap().revision, 20);
    }

    #[test]
    fn test_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        assert_eq!(
            store.load_layout("acme:shop:missing"),
            Err(StoreError::NotFound("acme:shop:missing".into()))
        );
        assert!(!store.exists("acme:shop:missing").unwrap());
    }

    #[test]
    fn test_revisions_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);

        for i in 1..=8 {
            store.save_layout("k", &doc(&format!("v{i}"))).unwrap();
        }
        // for_testing keeps 5
        assert_eq!(store.list_revisions("k").unwrap(), vec![4, 5, 6, 7, 8]);
        assert_eq!(store.load_revision("k", 6).unwrap(), doc("v6"));
        assert!(store.load_revision("k", 2).is_err());
        assert_eq!(store.load_metadata("k").unwrap().revision, 8);
    }

    #[test]
    fn test_revisions_do_not_leak_across_prefixed_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        store.save_layout("a:b:c", &doc("x")).unwrap();
        store.save_layout("a:b:cd", &doc("y")).unwrap();
        assert_eq!(store.list_revisions("a:b:c").unwrap(), vec![1]);
    }

    #[test]
    fn test_list_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        store.save_layout("t:s:home", &doc("a")).unwrap();
        store.save_layout("t:s:about", &doc("b")).unwrap();

        let mut keys = store.list_keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["t:s:about".to_string(), "t:s:home".to_string()]);

        store.delete("t:s:home").unwrap();
        assert!(!store.exists("t:s:home").unwrap());
        assert!(store.list_revisions("t:s:home").unwrap().is_empty());
        assert!(store.exists("t:s:about").unwrap());
    }

    #[test]
    fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open(&dir);
            store.save("t:s:p", &doc("durable")).unwrap();
            store.sync().unwrap();
        }
        let store = open(&dir);
        assert_eq!(store.load("t:s:p").unwrap(), doc("durable"));
    }

    #[test]
    fn test_invalid_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        assert!(matches!(
            store.save("", &doc("x")),
            Err(StoreError::InvalidKey(_))
        ));
    }
}
