//! Arc Store.
//!
//! A clone-able handle that puts the single-writer store behind a
//! reader-writer lock, for callers that share one database across threads.

use std::sync::{Arc, RwLock};

use crate::error::Result;
use crate::storage::Storage;
use crate::{Store, StoreOptions};

/// Build custom open options.
#[derive(Debug)]
pub struct OpenOptions(StoreOptions);

impl OpenOptions {
    pub fn new() -> Self {
        Self(StoreOptions::default())
    }

    pub fn max_log_file_size(mut self, value: u64) -> Self {
        self.0.max_log_file_size = value;
        self
    }

    pub fn sync(mut self, value: bool) -> Self {
        self.0.sync = value;
        self
    }

    pub fn max_value_size(mut self, value: u64) -> Self {
        self.0.max_value_size = value;
        self
    }

    pub fn max_key_size(mut self, value: u64) -> Self {
        self.0.max_key_size = value;
        self
    }

    pub fn open(&self, path: impl AsRef<std::path::Path>) -> Result<BitCask> {
        BitCask::open_with_options(path, self.0)
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Store handle for multiple threads.
#[derive(Debug)]
pub struct BitCask {
    inner: Arc<RwLock<Store>>,
}

impl BitCask {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::open_with_options(path, StoreOptions::default())
    }

    pub fn open_with_options(
        path: impl AsRef<std::path::Path>,
        opts: StoreOptions,
    ) -> Result<Self> {
        let path = path.as_ref();

        let disk_storage = RwLock::new(Store::open_with_options(path, opts)?);
        Ok(Self {
            inner: Arc::new(disk_storage),
        })
    }
}

impl Clone for BitCask {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Storage for BitCask {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let store = self.inner.read().unwrap();
        store.get(key)
    }

    fn put(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        let mut store = self.inner.write().unwrap();
        store.put(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        let mut store = self.inner.write().unwrap();
        store.delete(key)
    }

    fn list_keys(&self) -> Result<Vec<Vec<u8>>> {
        let store = self.inner.read().unwrap();
        store.list_keys()
    }

    fn merge(&mut self) -> Result<()> {
        let mut store = self.inner.write().unwrap();
        store.merge()
    }

    fn len(&self) -> u64 {
        let store = self.inner.read().unwrap();
        store.len()
    }

    fn is_empty(&self) -> bool {
        let store = self.inner.read().unwrap();
        store.is_empty()
    }

    fn contains_key(&self, key: &[u8]) -> bool {
        let store = self.inner.read().unwrap();
        store.contains_key(key)
    }

    fn sync(&mut self) -> Result<()> {
        let mut store = self.inner.write().unwrap();
        store.sync()
    }

    fn close(&mut self) -> Result<()> {
        let mut store = self.inner.write().unwrap();
        store.close()
    }
}
