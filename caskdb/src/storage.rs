//! Store Module.

use std::collections::BTreeMap;
use std::fs::{self, DirBuilder};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use glob::glob;
use log::{debug, info, trace, warn};

use crate::clock::Clock;
use crate::error::{Result, StoreError};
use crate::format::DataEntry;
use crate::keydir::{Keydir, Location};
use crate::lockfile::Lockfile;
use crate::logfile::{DataFile, HintFile};
use crate::settings;
use crate::StoreOptions;

/// Store implementation methods.
pub trait Storage {
    /// Put key and value into the store.
    fn put(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()>;

    /// Get value by key from the store.
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    /// Delete key from the store.
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// List all keys in the store.
    fn list_keys(&self) -> Result<Vec<Vec<u8>>>;

    /// Compact immutable data files in the store.
    /// Clear stale entries from data files and reclaim disk space.
    fn merge(&mut self) -> Result<()>;

    /// Return total number of keys in datastore.
    fn len(&self) -> u64;

    /// Check datastore is empty or not.
    fn is_empty(&self) -> bool;

    /// Return `true` if datastore contains the given key.
    fn contains_key(&self, key: &[u8]) -> bool;

    /// Force flushing any pending writes to the datastore.
    fn sync(&mut self) -> Result<()>;

    /// Close a datastore, flush all pending writes to the datastore.
    fn close(&mut self) -> Result<()>;
}

/// Disk storage.
#[derive(Debug)]
pub struct DiskStorage<K, C>
where
    K: Keydir + Default,
    C: Clock + Default,
{
    /// directory for database.
    path: PathBuf,

    /// lock for database directory.
    _lock: Lockfile,

    /// read-only views of every data file, the active one included.
    data_files: BTreeMap<u32, DataFile>,

    /// only the active data file is writeable.
    active_data_file: Option<DataFile>,

    /// keydir maintains key value index for fast query.
    keydir: K,

    /// source of record timestamps.
    clock: C,

    /// id handed to the next rotated or merged file.
    next_file_id: u32,

    /// store options.
    opts: StoreOptions,
}

impl<K, C> DiskStorage<K, C>
where
    K: Keydir + Default,
    C: Clock + Default,
{
    /// Initialize key value store with the given path.
    /// If the given path not found, a new one will be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, StoreOptions::default())
    }

    /// Open datastore directory with custom options.
    pub fn open_with_options(path: impl AsRef<Path>, opts: StoreOptions) -> Result<Self> {
        let path = path.as_ref();

        info!("open store path: {}", path.display());

        DirBuilder::new().recursive(true).mode(0o755).create(path)?;

        let lock =
            Lockfile::lock(path.join(settings::LOCK_FILE)).or(Err(StoreError::AlreadyLocked))?;

        let mut store = Self {
            path: path.to_path_buf(),
            _lock: lock,
            data_files: BTreeMap::new(),
            active_data_file: None,
            keydir: K::default(),
            clock: C::default(),
            next_file_id: 0,
            opts,
        };

        store.remove_merge_residue()?;
        store.open_data_files()?;
        store.build_keydir()?;
        store.activate()?;

        Ok(store)
    }

    /// Leftovers of a merge interrupted by a crash are worthless: the old
    /// data files are still in place, so just drop the scratch directory.
    fn remove_merge_residue(&mut self) -> Result<()> {
        let merge_dir = self.path.join(settings::MERGE_DIR);
        if merge_dir.exists() {
            debug!(
                "remove interrupted merge residue at {}",
                merge_dir.display()
            );
            fs::remove_dir_all(&merge_dir)?;
        }
        Ok(())
    }

    /// Open read-only views of all data files in the directory.
    fn open_data_files(&mut self) -> Result<()> {
        let pattern = format!(
            "{}/{}*",
            self.path.display(),
            settings::DATA_FILE_PREFIX
        );
        trace!("read data files with pattern: {}", &pattern);

        for path in glob(&pattern)? {
            let path = path?;

            if path
                .to_str()
                .map_or(false, |p| p.ends_with(settings::HINT_FILE_SUFFIX))
            {
                continue;
            }

            match settings::parse_file_id(&path) {
                Some(_) => {
                    let df = DataFile::new(path.as_path(), false)?;
                    self.data_files.insert(df.file_id(), df);
                }
                None => {
                    trace!("ignore alien file {}", path.display());
                }
            }
        }
        trace!("got {} data files", &self.data_files.len());

        Ok(())
    }

    /// Replay data files in ascending id order so later appends win.
    fn build_keydir(&mut self) -> Result<()> {
        let file_ids: Vec<u32> = self.data_files.keys().cloned().collect();

        for file_id in file_ids {
            let hint_file_path = hint_file_path(&self.path, file_id);
            if hint_file_path.exists() {
                if self.build_keydir_from_hint_file(&hint_file_path)? {
                    continue;
                }
                warn!(
                    "hint file {} is malformed, fall back to scanning the data file",
                    hint_file_path.display()
                );
            }
            self.build_keydir_from_data_file(file_id)?;
        }

        info!("build keydir done, got {} keys.", self.keydir.len());

        Ok(())
    }

    /// Returns `false` when the hint file is truncated mid-entry; the caller
    /// then rescans the data file, which overwrites anything ingested here.
    fn build_keydir_from_hint_file(&mut self, path: &Path) -> Result<bool> {
        trace!("build keydir from hint file {}", path.display());
        let mut hint_file = HintFile::new(path, false)?;
        let hint_file_id = hint_file.file_id();

        for entry in hint_file.iter() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(StoreError::HintFileTruncated(_)) => return Ok(false),
                Err(e) => return Err(e),
            };

            let location = Location::new(
                hint_file_id,
                entry.value_offset(),
                entry.value_sz(),
                entry.timestamp(),
            );
            self.keydir.put(entry.key, location);
        }

        Ok(true)
    }

    fn build_keydir_from_data_file(&mut self, file_id: u32) -> Result<()> {
        let df = self.data_files.get_mut(&file_id).unwrap();
        info!("build keydir from data file {}", df.path().display());

        for entry in df.iter() {
            let entry = entry?;

            if entry.value == settings::REMOVE_TOMBSTONE {
                trace!("{} is a remove tombstone", &entry);

                self.keydir.remove(&entry.key, entry.timestamp());
            } else {
                let location = Location::from(&entry);
                self.keydir.put(entry.key, location);
            }
        }

        Ok(())
    }

    /// Reopen the newest data file as the writable active file, or create
    /// `cask.0` in a fresh directory.
    fn activate(&mut self) -> Result<()> {
        match self.data_files.keys().max().cloned() {
            Some(max_id) => {
                let p = data_file_path(&self.path, max_id);
                debug!("reopen data file {} as active", p.display());

                self.active_data_file = Some(DataFile::new(p.as_path(), true)?);
                self.next_file_id = max_id + 1;

                // A merged file can carry a hint; once it takes appends the
                // hint no longer describes it, so drop the hint now.
                let hint_path = hint_file_path(&self.path, max_id);
                if hint_path.exists() {
                    debug!("remove hint file {} of active file", hint_path.display());
                    fs::remove_file(&hint_path)?;
                }
            }
            None => {
                self.new_active_data_file(0)?;
                self.next_file_id = 1;
            }
        }

        Ok(())
    }

    fn new_active_data_file(&mut self, file_id: u32) -> Result<()> {
        let p = data_file_path(&self.path, file_id);
        debug!("new data file at: {}", &p.display());
        self.active_data_file = Some(DataFile::new(p.as_path(), true)?);

        // prepare a read-only view of the same file for lookups.
        let df = DataFile::new(p.as_path(), false)?;
        self.data_files.insert(df.file_id(), df);

        Ok(())
    }

    /// Append a record to the active file, rotating afterwards when the
    /// file has grown to the configured limit.
    fn append(&mut self, key: &[u8], value: &[u8], timestamp: u32) -> Result<DataEntry> {
        let df = self
            .active_data_file
            .as_mut()
            .expect("active data file not found");

        let entry = df.write(key, value, timestamp)?;
        if self.opts.sync {
            // make sure data entry is persisted in storage.
            df.sync()?;
        }

        if df.size()? >= self.opts.max_log_file_size {
            info!(
                "size of active data file `{}` reached maximum size of {} bytes, switch to another one",
                df.path().display(),
                self.opts.max_log_file_size
            );

            // sync data to disk before the file goes immutable.
            let _ = df.sync();

            let next = self.next_file_id;
            self.next_file_id += 1;
            self.new_active_data_file(next)?;
        }

        Ok(entry)
    }
}

impl<K, C> Storage for DiskStorage<K, C>
where
    K: Keydir + Default,
    C: Clock + Default,
{
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        match self.keydir.get(key) {
            None => Err(StoreError::KeyNotFound(key.to_vec())),
            Some(location) => {
                trace!(
                    "found key `{}` in keydir at {:?}",
                    String::from_utf8_lossy(key),
                    &location,
                );

                let df = self.data_files.get(&location.file_id).unwrap_or_else(|| {
                    panic!("data file {} not found", location.file_id);
                });

                df.read_value(location.value_offset, location.value_size)
            }
        }
    }

    fn put(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        let (key, value) = (key.as_ref(), value.as_ref());

        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }

        if key.len() as u64 > self.opts.max_key_size {
            return Err(StoreError::KeyIsTooLarge);
        }

        if value.len() as u64 > self.opts.max_value_size {
            return Err(StoreError::ValueIsTooLarge);
        }

        let timestamp = self.clock.now();

        // save data to the active data file.
        let data_entry = self.append(key, value, timestamp)?;

        // update keydir, the in-memory index.
        let location = Location::from(&data_entry);
        self.keydir.put(data_entry.key, location);

        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        if !self.keydir.contains_key(key) {
            trace!(
                "remove key `{}`, but it not found in datastore",
                String::from_utf8_lossy(key)
            );
            return Err(StoreError::KeyNotFound(key.to_vec()));
        }

        trace!(
            "remove key `{}` from datastore",
            String::from_utf8_lossy(key)
        );

        // write tombstone, will be dropped on the next merge.
        let timestamp = self.clock.now();
        self.append(key, settings::REMOVE_TOMBSTONE, timestamp)?;

        // shadow the key in the in-memory index.
        self.keydir.remove(key, timestamp);

        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<Vec<u8>>> {
        Ok(self.keydir.keys())
    }

    fn len(&self) -> u64 {
        self.keydir.len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains_key(&self, key: &[u8]) -> bool {
        self.keydir.contains_key(key)
    }

    fn sync(&mut self) -> Result<()> {
        if let Some(df) = self.active_data_file.as_mut() {
            df.sync()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.sync()?;
        Ok(())
    }

    fn merge(&mut self) -> Result<()> {
        let active_id = self
            .active_data_file
            .as_ref()
            .expect("active data file not found")
            .file_id();

        let old_ids: Vec<u32> = self
            .data_files
            .keys()
            .filter(|&&id| id != active_id)
            .cloned()
            .collect();

        if old_ids.is_empty() {
            debug!("no immutable data files, nothing to merge");
            return Ok(());
        }

        // group live keys by the file their current value lives in; keys in
        // the active file stay where they are.
        let mut groups: BTreeMap<u32, Vec<(Vec<u8>, Location)>> = BTreeMap::new();
        for (key, location) in self.keydir.export_hints() {
            if location.file_id == active_id {
                continue;
            }
            groups.entry(location.file_id).or_default().push((key, location));
        }

        let merge_dir = self.path.join(settings::MERGE_DIR);
        DirBuilder::new().recursive(true).mode(0o755).create(&merge_dir)?;

        info!(
            "merge {} immutable data files under {}",
            old_ids.len(),
            self.path.display()
        );

        let mut merged_ids: Vec<u32> = Vec::new();
        let mut relocated: Vec<(Vec<u8>, Location)> = Vec::new();

        for (src_id, group) in groups {
            let merged_id = self.next_file_id;
            self.next_file_id += 1;

            let mut merged_df = DataFile::new(data_file_path(&merge_dir, merged_id), true)?;
            let mut hint_file = HintFile::new(hint_file_path(&merge_dir, merged_id), true)?;

            for (key, location) in group {
                let src = self.data_files.get(&src_id).unwrap_or_else(|| {
                    panic!("data file {} not found", src_id);
                });

                let value = src.read_value(location.value_offset, location.value_size)?;

                let entry = merged_df.write(&key, &value, location.timestamp)?;
                hint_file.write(&key, location.timestamp, entry.value_offset(), location.value_size)?;

                relocated.push((key, Location::from(&entry)));
            }

            merged_df.sync()?;
            hint_file.sync()?;

            merged_ids.push(merged_id);
        }

        // Move the merged files into place first; their ids never collide
        // with the old ones, so a crash in between still leaves every live
        // record reachable on the next open.
        for &id in &merged_ids {
            fs::rename(
                data_file_path(&merge_dir, id),
                data_file_path(&self.path, id),
            )?;
            fs::rename(
                hint_file_path(&merge_dir, id),
                hint_file_path(&self.path, id),
            )?;
        }

        for &id in &old_ids {
            self.data_files.remove(&id);

            let data_path = data_file_path(&self.path, id);
            if data_path.exists() {
                info!("remove stale data file {}", data_path.display());
                fs::remove_file(&data_path)?;
            }

            let hint_path = hint_file_path(&self.path, id);
            if hint_path.exists() {
                info!("remove stale hint file {}", hint_path.display());
                fs::remove_file(&hint_path)?;
            }
        }

        let _ = fs::remove_dir(&merge_dir);

        // attach fresh read-only views and repoint the keydir.
        for &id in &merged_ids {
            let df = DataFile::new(data_file_path(&self.path, id), false)?;
            self.data_files.insert(id, df);
        }

        for (key, location) in relocated {
            self.keydir.put(key, location);
        }

        Ok(())
    }
}

impl<K, C> Drop for DiskStorage<K, C>
where
    K: Keydir + Default,
    C: Clock + Default,
{
    fn drop(&mut self) {
        // ignore sync errors.
        trace!("sync all pending writes to disk.");
        let _r = self.sync();
    }
}

fn data_file_path(dir: &Path, file_id: u32) -> PathBuf {
    dir.join(format!("{}{}", settings::DATA_FILE_PREFIX, file_id))
}

fn hint_file_path(dir: &Path, file_id: u32) -> PathBuf {
    dir.join(format!(
        "{}{}{}",
        settings::DATA_FILE_PREFIX,
        file_id,
        settings::HINT_FILE_SUFFIX
    ))
}

#[cfg(test)]
mod tests {
    use std::io::{Seek, SeekFrom, Write};

    use tempdir;

    use super::*;
    use crate::clock::SystemClock;
    use crate::keydir::HashmapKeydir;
    use crate::Store;

    fn small_file_opts(max_log_file_size: u64) -> StoreOptions {
        StoreOptions {
            max_log_file_size,
            ..StoreOptions::default()
        }
    }

    #[test]
    fn disk_storage_should_get_put() {
        let dir = tempdir::TempDir::new("disk-storage-test.db").unwrap();
        let mut db = Store::open(dir.path()).unwrap();

        assert_eq!(db.len(), 0);
        assert!(db.is_empty());

        let res = db.get(b"hello");
        assert!(matches!(res, Err(StoreError::KeyNotFound(_))));

        db.put(b"hello".to_vec(), b"world".to_vec()).unwrap();

        assert_eq!(db.len(), 1);
        assert_eq!(db.contains_key(b"hello"), true);

        let res = db.get(b"hello").unwrap();
        assert_eq!(res, b"world".to_vec());

        db.put(b"hello".to_vec(), b"underworld".to_vec()).unwrap();

        let res = db.get(b"hello").unwrap();
        assert_eq!(res, b"underworld".to_vec());

        db.delete(b"hello").unwrap();

        let res = db.get(b"hello");
        assert!(matches!(res, Err(StoreError::KeyNotFound(_))));
    }

    #[test]
    fn disk_storage_should_list_keys() {
        let dir = tempdir::TempDir::new("disk-storage-test.db").unwrap();
        let mut db = Store::open(dir.path()).unwrap();

        db.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        db.put(b"b".to_vec(), b"2".to_vec()).unwrap();

        assert_eq!(db.get(b"a").unwrap(), b"1".to_vec());
        assert_eq!(db.get(b"b").unwrap(), b"2".to_vec());

        let mut keys = db.list_keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn disk_storage_should_reject_bad_arguments() {
        let dir = tempdir::TempDir::new("disk-storage-test.db").unwrap();
        let opts = StoreOptions {
            max_key_size: 4,
            max_value_size: 8,
            ..StoreOptions::default()
        };
        let mut db: DiskStorage<HashmapKeydir, SystemClock> =
            DiskStorage::open_with_options(dir.path(), opts).unwrap();

        let res = db.put(b"".to_vec(), b"value".to_vec());
        assert!(matches!(res, Err(StoreError::EmptyKey)));

        let res = db.put(b"too-long".to_vec(), b"value".to_vec());
        assert!(matches!(res, Err(StoreError::KeyIsTooLarge)));

        let res = db.put(b"key".to_vec(), b"way-too-long".to_vec());
        assert!(matches!(res, Err(StoreError::ValueIsTooLarge)));

        let res = db.delete(b"missing");
        assert!(matches!(res, Err(StoreError::KeyNotFound(_))));
    }

    #[test]
    fn disk_storage_should_persist() {
        let dir = tempdir::TempDir::new("disk-storage-test.db").unwrap();

        {
            let mut db = Store::open(dir.path()).unwrap();
            db.put(b"persistence".to_vec(), b"check".to_vec()).unwrap();
            db.put(b"removed".to_vec(), b"entry".to_vec()).unwrap();
            db.delete(b"removed").unwrap();
        }

        {
            let mut db = Store::open(dir.path()).unwrap();
            let res = db.get(b"persistence").unwrap();
            assert_eq!(res, b"check".to_vec());

            let res = db.get(b"removed");
            assert!(matches!(res, Err(StoreError::KeyNotFound(_))));
        }
    }

    #[test]
    fn disk_storage_should_keep_last_write_across_reopen() {
        let dir = tempdir::TempDir::new("disk-storage-test.db").unwrap();

        {
            let mut db = Store::open(dir.path()).unwrap();
            db.put(b"a".to_vec(), b"1".to_vec()).unwrap();
            db.put(b"a".to_vec(), b"2".to_vec()).unwrap();
        }

        let mut db = Store::open(dir.path()).unwrap();
        assert_eq!(db.get(b"a").unwrap(), b"2".to_vec());
    }

    #[test]
    fn disk_storage_should_restore_deleted_key() {
        let dir = tempdir::TempDir::new("disk-storage-test.db").unwrap();

        {
            let mut db = Store::open(dir.path()).unwrap();
            db.put(b"a".to_vec(), b"1".to_vec()).unwrap();
            db.delete(b"a").unwrap();
            db.put(b"a".to_vec(), b"3".to_vec()).unwrap();
        }

        let mut db = Store::open(dir.path()).unwrap();
        assert_eq!(db.get(b"a").unwrap(), b"3".to_vec());
    }

    #[test]
    fn disk_storage_should_rotate_logs() {
        const VERSION: u8 = 10;
        let dir = tempdir::TempDir::new("disk-storage-test.db").unwrap();

        {
            let mut db: DiskStorage<HashmapKeydir, SystemClock> =
                DiskStorage::open_with_options(dir.path(), small_file_opts(50)).unwrap();

            for i in 0..=VERSION {
                db.put(b"version".to_vec(), vec![i]).unwrap();
            }

            let logfile = data_file_path(dir.path(), 1);
            assert!(logfile.exists(), "log file has not been rotated");
        }

        {
            let mut db: DiskStorage<HashmapKeydir, SystemClock> =
                DiskStorage::open_with_options(dir.path(), small_file_opts(50)).unwrap();

            let res = db.get(b"version").unwrap();
            assert_eq!(res, vec![VERSION]);
        }
    }

    #[test]
    fn disk_storage_should_keep_keys_readable_across_rotation() {
        let dir = tempdir::TempDir::new("disk-storage-test.db").unwrap();
        let mut db: DiskStorage<HashmapKeydir, SystemClock> =
            DiskStorage::open_with_options(dir.path(), small_file_opts(64)).unwrap();

        db.put(b"k1".to_vec(), vec![b'x'; 40]).unwrap();
        db.put(b"k2".to_vec(), vec![b'x'; 40]).unwrap();

        assert_eq!(db.get(b"k1").unwrap(), vec![b'x'; 40]);
        assert_eq!(db.get(b"k2").unwrap(), vec![b'x'; 40]);

        assert!(data_file_path(dir.path(), 0).exists());
        assert!(data_file_path(dir.path(), 1).exists());
        assert!(!data_file_path(dir.path(), 2).exists());
    }

    #[test]
    fn disk_storage_should_merge_stale_files() {
        let dir = tempdir::TempDir::new("disk-storage-test.db").unwrap();
        let mut db: DiskStorage<HashmapKeydir, SystemClock> =
            DiskStorage::open_with_options(dir.path(), small_file_opts(64)).unwrap();

        db.put(b"k1".to_vec(), vec![b'x'; 40]).unwrap();
        db.put(b"k2".to_vec(), vec![b'x'; 40]).unwrap();
        db.delete(b"k1").unwrap();

        db.merge().unwrap();

        // cask.0 was rewritten into a merged file with a hint; the active
        // file is untouched.
        assert!(!data_file_path(dir.path(), 0).exists());
        assert!(data_file_path(dir.path(), 1).exists());
        assert!(data_file_path(dir.path(), 2).exists());
        assert!(hint_file_path(dir.path(), 2).exists());
        assert!(!dir.path().join(settings::MERGE_DIR).exists());

        assert_eq!(db.get(b"k2").unwrap(), vec![b'x'; 40]);
        let res = db.get(b"k1");
        assert!(matches!(res, Err(StoreError::KeyNotFound(_))));
    }

    #[test]
    fn disk_storage_merge_should_preserve_reads_and_reclaim_space() {
        let dir = tempdir::TempDir::new("disk-storage-test.db").unwrap();
        let mut db: DiskStorage<HashmapKeydir, SystemClock> =
            DiskStorage::open_with_options(dir.path(), small_file_opts(64)).unwrap();

        for i in 0..20u8 {
            db.put(b"churn".to_vec(), vec![i; 32]).unwrap();
            db.put(vec![b'k', i], vec![i]).unwrap();
        }

        let before = immutable_bytes(dir.path());

        db.merge().unwrap();

        let after = immutable_bytes(dir.path());
        assert!(after <= before, "merge grew the store: {} > {}", after, before);

        assert_eq!(db.get(b"churn").unwrap(), vec![19; 32]);
        for i in 0..20u8 {
            assert_eq!(db.get(&[b'k', i]).unwrap(), vec![i]);
        }

        // a second merge changes nothing observable.
        let keys_before = sorted_keys(&db);
        db.merge().unwrap();
        assert_eq!(sorted_keys(&db), keys_before);
        assert_eq!(db.get(b"churn").unwrap(), vec![19; 32]);
    }

    #[test]
    fn disk_storage_should_recover_from_hint_files() {
        let dir = tempdir::TempDir::new("disk-storage-test.db").unwrap();

        {
            let mut db: DiskStorage<HashmapKeydir, SystemClock> =
                DiskStorage::open_with_options(dir.path(), small_file_opts(64)).unwrap();

            db.put(b"k1".to_vec(), vec![b'x'; 40]).unwrap();
            db.put(b"k2".to_vec(), vec![b'y'; 40]).unwrap();
            db.merge().unwrap();
        }

        let mut db = Store::open(dir.path()).unwrap();
        assert_eq!(db.get(b"k1").unwrap(), vec![b'x'; 40]);
        assert_eq!(db.get(b"k2").unwrap(), vec![b'y'; 40]);
    }

    #[test]
    fn disk_storage_should_keep_appends_to_a_reopened_merged_file() {
        let dir = tempdir::TempDir::new("disk-storage-test.db").unwrap();

        {
            let mut db: DiskStorage<HashmapKeydir, SystemClock> =
                DiskStorage::open_with_options(dir.path(), small_file_opts(64)).unwrap();

            db.put(b"k1".to_vec(), vec![b'x'; 40]).unwrap();
            db.put(b"k2".to_vec(), vec![b'y'; 40]).unwrap();
            db.merge().unwrap();
        }

        // the merged file is now the newest; it takes the next appends.
        {
            let mut db = Store::open(dir.path()).unwrap();
            db.put(b"k3".to_vec(), b"fresh".to_vec()).unwrap();
        }

        let mut db = Store::open(dir.path()).unwrap();
        assert_eq!(db.get(b"k1").unwrap(), vec![b'x'; 40]);
        assert_eq!(db.get(b"k2").unwrap(), vec![b'y'; 40]);
        assert_eq!(db.get(b"k3").unwrap(), b"fresh".to_vec());
    }

    #[test]
    fn disk_storage_should_fall_back_on_malformed_hint() {
        let dir = tempdir::TempDir::new("disk-storage-test.db").unwrap();

        {
            let mut db: DiskStorage<HashmapKeydir, SystemClock> =
                DiskStorage::open_with_options(dir.path(), small_file_opts(64)).unwrap();

            db.put(b"k1".to_vec(), vec![b'x'; 40]).unwrap();
            db.put(b"k2".to_vec(), vec![b'y'; 40]).unwrap();
            db.merge().unwrap();
        }

        // chop the hint mid-entry; recovery must rescan the data file.
        let hint_path = hint_file_path(dir.path(), 2);
        let size = fs::metadata(&hint_path).unwrap().len();
        let f = fs::OpenOptions::new().write(true).open(&hint_path).unwrap();
        f.set_len(size - 2).unwrap();
        drop(f);

        let mut db = Store::open(dir.path()).unwrap();
        assert_eq!(db.get(b"k1").unwrap(), vec![b'x'; 40]);
    }

    #[test]
    fn disk_storage_should_tolerate_torn_tail() {
        let dir = tempdir::TempDir::new("disk-storage-test.db").unwrap();

        {
            let mut db = Store::open(dir.path()).unwrap();
            db.put(b"a".to_vec(), b"old".to_vec()).unwrap();
            db.put(b"a".to_vec(), b"new".to_vec()).unwrap();
            db.put(b"b".to_vec(), b"gone".to_vec()).unwrap();
        }

        // rip the final record apart, as a crash mid-append would.
        let path = data_file_path(dir.path(), 0);
        let size = fs::metadata(&path).unwrap().len();
        let f = fs::OpenOptions::new().write(true).open(&path).unwrap();
        f.set_len(size - 2).unwrap();
        drop(f);

        let mut db = Store::open(dir.path()).unwrap();
        assert_eq!(db.get(b"a").unwrap(), b"new".to_vec());
        let res = db.get(b"b");
        assert!(matches!(res, Err(StoreError::KeyNotFound(_))));
    }

    #[test]
    fn disk_storage_should_drop_corrupt_suffix() {
        let dir = tempdir::TempDir::new("disk-storage-test.db").unwrap();

        {
            let mut db = Store::open(dir.path()).unwrap();
            db.put(b"a".to_vec(), b"1".to_vec()).unwrap();
            db.put(b"b".to_vec(), b"2".to_vec()).unwrap();
            db.put(b"c".to_vec(), b"3".to_vec()).unwrap();
        }

        // each record is 18 bytes; flip the value byte of the second one.
        let path = data_file_path(dir.path(), 0);
        let mut f = fs::OpenOptions::new().write(true).open(&path).unwrap();
        f.seek(SeekFrom::Start(18 + 17)).unwrap();
        f.write_all(&[b'X']).unwrap();
        drop(f);

        let mut db = Store::open(dir.path()).unwrap();
        assert_eq!(db.get(b"a").unwrap(), b"1".to_vec());
        assert!(matches!(db.get(b"b"), Err(StoreError::KeyNotFound(_))));
        assert!(matches!(db.get(b"c"), Err(StoreError::KeyNotFound(_))));
    }

    #[test]
    fn disk_storage_should_use_injected_clock() {
        #[derive(Debug, Default)]
        struct FixedClock;

        impl Clock for FixedClock {
            fn now(&self) -> u32 {
                1234
            }
        }

        let dir = tempdir::TempDir::new("disk-storage-test.db").unwrap();

        {
            let mut db: DiskStorage<HashmapKeydir, FixedClock> =
                DiskStorage::open(dir.path()).unwrap();
            db.put(b"frozen".to_vec(), b"time".to_vec()).unwrap();
        }

        let mut db: DiskStorage<HashmapKeydir, FixedClock> =
            DiskStorage::open(dir.path()).unwrap();
        assert_eq!(db.get(b"frozen").unwrap(), b"time".to_vec());
    }

    #[test]
    fn test_lock_file() {
        let dir = tempdir::TempDir::new("disk-storage-test.db").unwrap();
        let _db = Store::open(dir.path()).unwrap();

        let db2: Result<Store> = Store::open(dir.path());
        assert!(matches!(db2, Err(StoreError::AlreadyLocked)));
    }

    fn sorted_keys(db: &Store) -> Vec<Vec<u8>> {
        let mut keys = db.list_keys().unwrap();
        keys.sort();
        keys
    }

    /// Bytes held by data files (hints excluded).
    fn immutable_bytes(dir: &Path) -> u64 {
        let mut total = 0;
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            let is_hint = path
                .to_str()
                .map_or(false, |p| p.ends_with(settings::HINT_FILE_SUFFIX));
            if !is_hint && settings::parse_file_id(&path).is_some() {
                total += fs::metadata(&path).unwrap().len();
            }
        }
        total
    }
}
