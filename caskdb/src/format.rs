//! entries module.
//!
//! On-disk record layout. A data entry is a 16-byte header followed by the
//! raw key and value bytes; a hint entry is a 20-byte header followed by the
//! key. All header integers are little-endian. The data header leads with a
//! CRC-32 (ISO-HDLC) over everything after the checksum itself, i.e. over
//! `timestamp || key_sz || value_sz || key || value`.

use std::{
    fmt::Display,
    io::{ErrorKind, Read, Seek, SeekFrom, Write},
};

use crc32fast::Hasher;

use crate::error::{Result, StoreError};

/// EntryIO trait.
pub trait EntryIO {
    type Entry;

    fn read_from<R>(r: &mut R, offset: u64) -> Result<Option<Self::Entry>>
    where
        R: Read + Seek;

    fn write_to<W>(&self, w: &mut W) -> Result<u64>
    where
        W: Write + Seek;
}

pub const HEADER_SIZE: usize = 16;
pub const HINT_HEADER_SIZE: usize = 20;

/// Checksum over the parts of a record the header CRC covers.
fn checksum(timestamp: u32, key: &[u8], value: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&timestamp.to_le_bytes());
    hasher.update(&(key.len() as u32).to_le_bytes());
    hasher.update(&(value.len() as u32).to_le_bytes());
    hasher.update(key);
    hasher.update(value);
    hasher.finalize()
}

/// Entry Header Structure.
///
/// # fields:
/// - crc: u32
/// - timestamp: u32
/// - key_sz: u32
/// - value_sz: u32
///
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DataHeader([u8; HEADER_SIZE]);

impl DataHeader {
    pub fn new(crc: u32, timestamp: u32, key_sz: u32, value_sz: u32) -> Self {
        let mut buf = [0u8; HEADER_SIZE];

        buf[0..4].copy_from_slice(&crc.to_le_bytes());
        buf[4..8].copy_from_slice(&timestamp.to_le_bytes());
        buf[8..12].copy_from_slice(&key_sz.to_le_bytes());
        buf[12..16].copy_from_slice(&value_sz.to_le_bytes());

        Self(buf)
    }

    pub fn crc(&self) -> u32 {
        u32::from_le_bytes(self.0[0..4].try_into().unwrap())
    }

    pub fn timestamp(&self) -> u32 {
        u32::from_le_bytes(self.0[4..8].try_into().unwrap())
    }

    pub fn key_sz(&self) -> u32 {
        u32::from_le_bytes(self.0[8..12].try_into().unwrap())
    }

    pub fn value_sz(&self) -> u32 {
        u32::from_le_bytes(self.0[12..16].try_into().unwrap())
    }
}

impl AsRef<[u8]> for DataHeader {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; HEADER_SIZE]> for DataHeader {
    fn from(value: [u8; HEADER_SIZE]) -> Self {
        Self(value)
    }
}

impl From<DataHeader> for [u8; HEADER_SIZE] {
    fn from(v: DataHeader) -> Self {
        v.0
    }
}

/// Disk Entry Structure.
#[derive(Debug, PartialEq, Eq)]
pub struct DataEntry {
    /// header of disk entry.
    header: DataHeader,

    /// key of disk entry.
    pub key: Vec<u8>,

    /// value of disk entry.
    pub value: Vec<u8>,

    /// offset of disk entry.
    pub offset: Option<u64>,

    /// file id of disk entry.
    pub file_id: Option<u32>,
}

impl DataEntry {
    pub fn new(key: Vec<u8>, value: Vec<u8>, timestamp: u32) -> Self {
        let crc = checksum(timestamp, &key, &value);
        let (key_sz, value_sz) = (key.len() as u32, value.len() as u32);
        let header = DataHeader::new(crc, timestamp, key_sz, value_sz);

        Self {
            header,
            key,
            value,
            offset: None,
            file_id: None,
        }
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn file_id(mut self, file_id: u32) -> Self {
        self.file_id = Some(file_id);
        self
    }

    pub fn size(&self) -> u64 {
        (HEADER_SIZE + self.key.len() + self.value.len()) as u64
    }

    pub fn timestamp(&self) -> u32 {
        self.header.timestamp()
    }

    /// Byte offset of the value within the data file.
    pub fn value_offset(&self) -> u64 {
        self.offset.expect("entry offset not set") + HEADER_SIZE as u64 + self.key.len() as u64
    }
}

impl Display for DataEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DataEntry(file_id={:?}, key='{}', offset={:?}, size={})",
            self.file_id,
            String::from_utf8_lossy(self.key.as_ref()),
            self.offset,
            self.size(),
        )
    }
}

impl EntryIO for DataEntry {
    type Entry = Self;

    /// Read one record at `offset`.
    ///
    /// Returns `Ok(None)` at end of file and on a torn tail (a header or
    /// body that runs past the end of the file), `DataEntryCorrupted` when
    /// the stored CRC disagrees with the record content.
    fn read_from<R>(r: &mut R, offset: u64) -> Result<Option<Self::Entry>>
    where
        R: Read + Seek,
    {
        r.seek(SeekFrom::Start(offset))?;

        let mut buf = [0u8; HEADER_SIZE];
        let n = r.read(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        if n < HEADER_SIZE {
            return Ok(None);
        }

        let header = DataHeader::from(buf);

        // A flipped size field can point past the end of the file; treat it
        // like a torn record rather than attempting a giant read.
        let end = r.seek(SeekFrom::End(0))?;
        let body = header.key_sz() as u64 + header.value_sz() as u64;
        if offset + HEADER_SIZE as u64 + body > end {
            return Ok(None);
        }
        r.seek(SeekFrom::Start(offset + HEADER_SIZE as u64))?;

        let mut key = vec![0u8; header.key_sz() as usize];
        r.read_exact(&mut key)?;

        let mut value = vec![0u8; header.value_sz() as usize];
        r.read_exact(&mut value)?;

        if checksum(header.timestamp(), &key, &value) != header.crc() {
            return Err(StoreError::DataEntryCorrupted { key, offset });
        }

        Ok(Some(Self {
            header,
            key,
            value,
            offset: None,
            file_id: None,
        }))
    }

    fn write_to<W>(&self, w: &mut W) -> Result<u64>
    where
        W: Write + Seek,
    {
        let offset = w.seek(SeekFrom::End(0))?;

        w.write_all(self.header.as_ref())?;
        w.write_all(self.key.as_ref())?;
        w.write_all(self.value.as_ref())?;

        Ok(offset)
    }
}

/// Hint Entry Header Structure.
///
/// # fields:
/// - timestamp: u32
/// - key_sz: u32
/// - value_sz: u32
/// - value_offset: u64
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintHeader([u8; HINT_HEADER_SIZE]);

impl HintHeader {
    pub fn new(timestamp: u32, key_sz: u32, value_sz: u32, value_offset: u64) -> Self {
        let mut buf = [0u8; HINT_HEADER_SIZE];

        buf[0..4].copy_from_slice(&timestamp.to_le_bytes());
        buf[4..8].copy_from_slice(&key_sz.to_le_bytes());
        buf[8..12].copy_from_slice(&value_sz.to_le_bytes());
        buf[12..20].copy_from_slice(&value_offset.to_le_bytes());

        Self(buf)
    }

    pub fn timestamp(&self) -> u32 {
        u32::from_le_bytes(self.0[0..4].try_into().unwrap())
    }

    pub fn key_sz(&self) -> u32 {
        u32::from_le_bytes(self.0[4..8].try_into().unwrap())
    }

    pub fn value_sz(&self) -> u32 {
        u32::from_le_bytes(self.0[8..12].try_into().unwrap())
    }

    pub fn value_offset(&self) -> u64 {
        u64::from_le_bytes(self.0[12..20].try_into().unwrap())
    }
}

impl AsRef<[u8]> for HintHeader {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; HINT_HEADER_SIZE]> for HintHeader {
    fn from(buf: [u8; HINT_HEADER_SIZE]) -> Self {
        Self(buf)
    }
}

/// Entry in the hint file.
#[derive(Debug, PartialEq, Eq)]
pub struct HintEntry {
    /// header of hint entry.
    header: HintHeader,

    /// key of the referenced data entry.
    pub key: Vec<u8>,
}

impl HintEntry {
    pub fn new(key: Vec<u8>, timestamp: u32, value_offset: u64, value_sz: u32) -> Self {
        let key_sz = key.len() as u32;
        let header = HintHeader::new(timestamp, key_sz, value_sz, value_offset);
        Self { header, key }
    }

    pub fn timestamp(&self) -> u32 {
        self.header.timestamp()
    }

    pub fn value_offset(&self) -> u64 {
        self.header.value_offset()
    }

    pub fn value_sz(&self) -> u32 {
        self.header.value_sz()
    }

    /// Bytes this hint entry occupies in the hint file.
    pub fn selfsize(&self) -> u64 {
        HINT_HEADER_SIZE as u64 + self.key.len() as u64
    }
}

impl Display for HintEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "HintEntry(key='{}', value_offset={}, value_sz={})",
            String::from_utf8_lossy(self.key.as_ref()),
            self.value_offset(),
            self.value_sz(),
        )
    }
}

impl EntryIO for HintEntry {
    type Entry = Self;

    /// Read one hint entry at `offset`.
    ///
    /// Returns `Ok(None)` at a clean end of file. A short read anywhere
    /// inside an entry yields `HintFileTruncated`: hint files carry no
    /// checksum, so the caller falls back to scanning the data file.
    fn read_from<R>(r: &mut R, offset: u64) -> Result<Option<Self::Entry>>
    where
        R: Read + Seek,
    {
        r.seek(SeekFrom::Start(offset))?;

        let mut buf = [0u8; HINT_HEADER_SIZE];
        let n = r.read(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        if n < HINT_HEADER_SIZE {
            return Err(StoreError::HintFileTruncated(offset));
        }

        let header = HintHeader::from(buf);

        let end = r.seek(SeekFrom::End(0))?;
        if offset + HINT_HEADER_SIZE as u64 + header.key_sz() as u64 > end {
            return Err(StoreError::HintFileTruncated(offset));
        }
        r.seek(SeekFrom::Start(offset + HINT_HEADER_SIZE as u64))?;

        let mut key = vec![0u8; header.key_sz() as usize];
        r.read_exact(&mut key).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                StoreError::HintFileTruncated(offset)
            } else {
                StoreError::Io(e)
            }
        })?;

        Ok(Some(Self::Entry { header, key }))
    }

    fn write_to<W>(&self, w: &mut W) -> Result<u64>
    where
        W: Write + Seek,
    {
        let offset = w.seek(SeekFrom::End(0))?;

        w.write_all(self.header.as_ref())?;
        w.write_all(self.key.as_ref())?;

        Ok(offset)
    }
}
