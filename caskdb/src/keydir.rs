//! Keydir implementation.
//!
//! Keydir is an in-memory structure that maps all keys to their
//! corresponding locations on the disk. Deleted keys stay in the map as
//! tombstones so that replaying files in id order always lands on the
//! latest state; lookups treat tombstoned keys as absent.

use std::collections::HashMap;

use crate::format::DataEntry;

/// Where the latest value of a live key sits on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// file id the record was appended to.
    pub file_id: u32,

    /// byte offset of the value within the file.
    pub value_offset: u64,

    /// size of the value in bytes.
    pub value_size: u32,

    /// timestamp of the record.
    pub timestamp: u32,
}

impl Location {
    pub fn new(file_id: u32, value_offset: u64, value_size: u32, timestamp: u32) -> Self {
        Self {
            file_id,
            value_offset,
            value_size,
            timestamp,
        }
    }
}

impl From<&DataEntry> for Location {
    fn from(v: &DataEntry) -> Self {
        Location {
            file_id: v.file_id.expect("entry file id not set"),
            value_offset: v.value_offset(),
            value_size: v.value.len() as u32,
            timestamp: v.timestamp(),
        }
    }
}

/// A keydir slot: either a live record location or a deletion marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeydirEntry {
    Live(Location),
    Tombstone { timestamp: u32 },
}

impl KeydirEntry {
    pub fn is_tombstone(&self) -> bool {
        matches!(self, KeydirEntry::Tombstone { .. })
    }
}

/// Keydir methods.
pub trait Keydir: Default {
    /// Returns the location of the given key, `None` for missing and
    /// tombstoned keys.
    fn get(&self, key: &[u8]) -> Option<&Location>;

    /// Puts a key and its location into the keydir, replacing any prior
    /// entry for the key.
    fn put(&mut self, key: Vec<u8>, location: Location);

    /// Installs a tombstone for the key with the given timestamp.
    fn remove(&mut self, key: &[u8], timestamp: u32);

    /// List all live keys in the keydir.
    fn keys(&self) -> Vec<Vec<u8>>;

    /// Number of live keys in the keydir.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return `true` if the keydir holds a live entry for the given key.
    fn contains_key(&self, key: &[u8]) -> bool;

    /// Snapshot of every live key and its location, for hint generation
    /// and merge planning.
    fn export_hints(&self) -> Vec<(Vec<u8>, Location)>;
}

/// Keydir represented as a hashmap.
#[derive(Debug, Default)]
pub struct HashmapKeydir {
    /// mapping from a key to its keydir entry.
    mapping: HashMap<Vec<u8>, KeydirEntry>,
}

impl Keydir for HashmapKeydir {
    fn get(&self, key: &[u8]) -> Option<&Location> {
        match self.mapping.get(key) {
            Some(KeydirEntry::Live(location)) => Some(location),
            _ => None,
        }
    }

    fn put(&mut self, key: Vec<u8>, location: Location) {
        self.mapping.insert(key, KeydirEntry::Live(location));
    }

    fn remove(&mut self, key: &[u8], timestamp: u32) {
        self.mapping
            .insert(key.to_vec(), KeydirEntry::Tombstone { timestamp });
    }

    fn keys(&self) -> Vec<Vec<u8>> {
        self.mapping
            .iter()
            .filter(|(_, e)| !e.is_tombstone())
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn len(&self) -> u64 {
        self.mapping.values().filter(|e| !e.is_tombstone()).count() as u64
    }

    fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    fn export_hints(&self) -> Vec<(Vec<u8>, Location)> {
        self.mapping
            .iter()
            .filter_map(|(k, e)| match e {
                KeydirEntry::Live(location) => Some((k.clone(), location.clone())),
                KeydirEntry::Tombstone { .. } => None,
            })
            .collect()
    }
}
