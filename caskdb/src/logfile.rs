//! Data File Module.

use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use log::{error, trace, warn};

use crate::error::{Result, StoreError};
use crate::format::{DataEntry, EntryIO, HintEntry};
use crate::settings::parse_file_id;

#[derive(Debug)]
pub struct LogFile {
    /// file path.
    pub path: PathBuf,

    /// file id.
    pub id: u32,

    /// Mark current data file can be writable or not.
    writeable: bool,

    /// File handle of data file for writing.
    writer: Option<File>,

    /// File handle of data file for reading.
    reader: File,
}

impl LogFile {
    pub fn new(path: impl AsRef<Path>, writeable: bool) -> Result<Self> {
        let path = path.as_ref();

        // File name must carry a valid file id.
        let file_id = parse_file_id(path).expect("file id not found in file path");

        let writer = if writeable {
            let f = fs::OpenOptions::new()
                .create(true)
                .write(true)
                .append(true)
                .open(path)?;
            Some(f)
        } else {
            None
        };

        let reader = fs::File::open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            id: file_id,
            writeable,
            writer,
            reader,
        })
    }

    /// Flush all pending writes to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.flush()?;
        if let Some(file) = &mut self.writer {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Flush buf writer.
    fn flush(&mut self) -> Result<()> {
        if self.writeable {
            self.writer.as_mut().unwrap().flush()?;
        }
        Ok(())
    }

    /// file size.
    pub fn size(&self) -> Result<u64> {
        Ok(self.reader.metadata()?.len())
    }
}

impl Drop for LogFile {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            error!(
                "failed to sync log file: {}, got error: {}",
                self.path.display(),
                e
            );
        }

        // auto clean up if file size is zero.
        if self.writeable && self.size().map_or(false, |s| s == 0) {
            trace!("log file `{}` is empty, remove it.", self.path.display());

            if let Err(e) = fs::remove_file(self.path.as_path()) {
                error!(
                    "failed to remove empty log file: {}, got error: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

/// DataFile
#[derive(Debug)]
pub struct DataFile {
    inner: LogFile,
}

impl DataFile {
    pub fn new(path: impl AsRef<Path>, writeable: bool) -> Result<Self> {
        let inner = LogFile::new(path, writeable)?;

        Ok(Self { inner })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn file_id(&self) -> u32 {
        self.inner.id
    }

    pub fn size(&self) -> Result<u64> {
        self.inner.size()
    }

    pub fn iter(&mut self) -> DataEntryIter {
        DataEntryIter {
            reader: &mut self.inner.reader,
            offset: 0,
            file_id: self.inner.id,
        }
    }

    /// Append a key-value record to the data file.
    pub fn write(&mut self, key: &[u8], value: &[u8], timestamp: u32) -> Result<DataEntry> {
        let path = self.inner.path.as_path();
        let w = self
            .inner
            .writer
            .as_mut()
            .ok_or_else(|| StoreError::FileNotWriteable(path.to_path_buf()))?;

        trace!(
            "append {} to data file {}",
            String::from_utf8_lossy(key),
            self.inner.path.display()
        );

        let data_entry = DataEntry::new(key.to_vec(), value.to_vec(), timestamp);
        let offset = data_entry.write_to(w)?;

        trace!(
            "successfully append {} to data file {}",
            &data_entry,
            self.inner.path.display()
        );

        Ok(data_entry.offset(offset).file_id(self.inner.id))
    }

    /// Positioned read of exactly `size` bytes at `offset`.
    ///
    /// Leaves the reader's cursor alone, so concurrent readers behind a
    /// shared lock never step on each other.
    pub fn read_value(&self, offset: u64, size: u32) -> Result<Vec<u8>> {
        trace!(
            "read {} bytes at offset {} in data file {}",
            size,
            offset,
            self.inner.path.display()
        );

        let mut value = vec![0u8; size as usize];
        self.inner.reader.read_exact_at(&mut value, offset)?;

        Ok(value)
    }

    /// Flush all pending writes to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.inner.sync()
    }
}

/// Scans a data file from offset zero, yielding records in append order.
///
/// The scan stops at the first torn or corrupt record, so a tail damaged by
/// a crash mid-append simply truncates the sequence.
pub struct DataEntryIter<'a> {
    reader: &'a mut File,
    offset: u64,
    file_id: u32,
}

impl<'a> Iterator for DataEntryIter<'a> {
    type Item = Result<DataEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        match DataEntry::read_from(self.reader, self.offset) {
            Ok(None) => None,
            Ok(Some(entry)) => {
                let entry = entry.offset(self.offset).file_id(self.file_id);
                self.offset += entry.size();
                Some(Ok(entry))
            }
            Err(StoreError::DataEntryCorrupted { offset, .. }) => {
                warn!(
                    "crc mismatch at offset {} in data file {}, stop scanning",
                    offset, self.file_id
                );
                None
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// HintFile
#[derive(Debug)]
pub struct HintFile {
    inner: LogFile,
}

impl HintFile {
    pub fn new(path: impl AsRef<Path>, writeable: bool) -> Result<Self> {
        let inner = LogFile::new(path, writeable)?;

        Ok(Self { inner })
    }

    pub fn file_id(&self) -> u32 {
        self.inner.id
    }

    pub fn iter(&mut self) -> HintEntryIter {
        HintEntryIter {
            reader: &mut self.inner.reader,
            offset: 0,
        }
    }

    pub fn write(
        &mut self,
        key: impl AsRef<[u8]>,
        timestamp: u32,
        value_offset: u64,
        value_sz: u32,
    ) -> Result<u64> {
        let entry = HintEntry::new(key.as_ref().to_vec(), timestamp, value_offset, value_sz);
        trace!("append {} to file {}", &entry, self.inner.path.display());

        let path = self.inner.path.as_path();
        let w = self
            .inner
            .writer
            .as_mut()
            .ok_or_else(|| StoreError::FileNotWriteable(path.to_path_buf()))?;

        let offset = entry.write_to(w)?;

        self.inner.flush()?;

        Ok(offset)
    }

    /// Sync all pending writes to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.inner.sync()
    }
}

/// Iterates a hint file from offset zero.
///
/// Yields `HintFileTruncated` for a short read mid-entry; the caller decides
/// whether to fall back to scanning the data file.
pub struct HintEntryIter<'a> {
    reader: &'a mut File,
    offset: u64,
}

impl<'a> Iterator for HintEntryIter<'a> {
    type Item = Result<HintEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        match HintEntry::read_from(self.reader, self.offset) {
            Ok(None) => None,
            Ok(Some(entry)) => {
                self.offset += entry.selfsize();
                Some(Ok(entry))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
