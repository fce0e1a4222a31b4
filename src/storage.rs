//! Durable storage layer over RocksDB

use rocksdb::{DBCompressionType, Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;

use crate::config::{CompressionType, StorageConfig};

/// Thin wrapper around a shared RocksDB handle. All multi-row invariants in
/// the crate are enforced by committing a single `StorageBatch`.
#[derive(Clone)]
pub struct Storage {
    db: std::sync::Arc<DB>,
}

impl Storage {
    /// Open (and if configured, wipe) the database described by `config`.
    pub fn open(config: &StorageConfig) -> Result<Self, rocksdb::Error> {
        if config.clear_on_start && Path::new(&config.data_directory).exists() {
            DB::destroy(&Options::default(), &config.data_directory)?;
        }

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size_mb * 1024 * 1024);
        opts.set_max_write_buffer_number(config.max_write_buffer_number as i32);
        opts.set_target_file_size_base((config.target_file_size_mb * 1024 * 1024) as u64);
        opts.set_compression_type(compression(&config.compression_type));

        let db = DB::open(&opts, &config.data_directory)?;
        Ok(Self {
            db: std::sync::Arc::new(db),
        })
    }

    /// Open with default tuning at an explicit path. Used by tools and tests.
    pub fn open_at_path<P: AsRef<Path>>(path: P) -> Result<Self, rocksdb::Error> {
        let config = StorageConfig {
            data_directory: path.as_ref().to_string_lossy().to_string(),
            ..StorageConfig::default()
        };
        Self::open(&config)
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, rocksdb::Error> {
        self.db.get(key)
    }

    pub fn put<K, V>(&self, key: K, value: V) -> Result<(), rocksdb::Error>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        self.db.put(key, value)
    }

    pub fn delete<K: AsRef<[u8]>>(&self, key: K) -> Result<(), rocksdb::Error> {
        self.db.delete(key)
    }

    /// Commit a batch atomically: either every put and delete in it lands,
    /// or none do.
    pub fn commit(&self, batch: StorageBatch) -> Result<(), rocksdb::Error> {
        self.db.write(batch.batch)
    }

    /// All rows whose key starts with `prefix`, in key order.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, rocksdb::Error> {
        let mut results = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }
        Ok(results)
    }
}

/// Accumulates puts and deletes for one atomic commit.
#[derive(Default)]
pub struct StorageBatch {
    batch: WriteBatch,
}

impl StorageBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<K, V>(&mut self, key: K, value: V)
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        self.batch.put(key, value);
    }

    pub fn delete<K: AsRef<[u8]>>(&mut self, key: K) {
        self.batch.delete(key);
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

fn compression(compression_type: &CompressionType) -> DBCompressionType {
    match compression_type {
        CompressionType::None => DBCompressionType::None,
        CompressionType::Snappy => DBCompressionType::Snappy,
        CompressionType::Lz4 => DBCompressionType::Lz4,
        CompressionType::Zstd => DBCompressionType::Zstd,
    }
}
