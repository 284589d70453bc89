//! An embeddable, single-writer, persistent key-value store in the bitcask
//! style: an append-only log of records plus an in-memory keydir mapping
//! each live key to the location of its latest value.
//!
//! A `put` appends one record to the active data file and points the keydir
//! at it; a `get` is one keydir lookup plus one positioned read. Recovery
//! replays the data files in id order, using hint files where a merge has
//! produced them, and `merge` rewrites immutable files so only live records
//! remain.
//!
//! ```no_run
//! use caskdb::{Storage, Store};
//!
//! # fn main() -> caskdb::Result<()> {
//! let mut db = Store::open("/tmp/demo.db")?;
//! db.put(b"hello".to_vec(), b"world".to_vec())?;
//! assert_eq!(db.get(b"hello")?, b"world".to_vec());
//! # Ok(())
//! # }
//! ```

pub mod arc;
pub mod clock;
pub mod error;
pub mod keydir;
pub mod storage;

mod format;
mod lockfile;
mod logfile;
mod settings;

use clock::SystemClock;
use keydir::HashmapKeydir;
use storage::DiskStorage;

#[derive(Debug, Copy, Clone)]
pub struct StoreOptions {
    /// rotate the active data file once it grows past this size.
    pub(crate) max_log_file_size: u64,

    // sync data to storage after each writing operation.
    // we should balance data reliability and writing performance.
    pub(crate) sync: bool,

    pub(crate) max_key_size: u64,

    pub(crate) max_value_size: u64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_log_file_size: settings::DEFAULT_MAX_DATA_FILE_SIZE, // 2GB
            sync: false,
            max_key_size: settings::DEFAULT_MAX_KEY_SIZE,
            max_value_size: settings::DEFAULT_MAX_VALUE_SIZE,
        }
    }
}

/// Single-threaded store over the default hashmap keydir and system clock.
pub type Store = DiskStorage<HashmapKeydir, SystemClock>;

pub use arc::{BitCask, OpenOptions};
pub use error::{Result, StoreError};
pub use storage::Storage;
