//! Datastore settings and file naming.

use std::path::Path;

/// Data files are named `cask.<id>`, hint files `cask.<id>.hint`.
pub const DATA_FILE_PREFIX: &str = "cask.";
pub const HINT_FILE_SUFFIX: &str = ".hint";

/// Scratch sub-directory used while a merge is in flight.
pub const MERGE_DIR: &str = ".merge";

/// Guard file against a second process opening the same directory.
pub const LOCK_FILE: &str = "LOCK";

/// On-disk marker for a deleted key: a record with an empty value.
pub const REMOVE_TOMBSTONE: &[u8] = b"";

pub const DEFAULT_MAX_DATA_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024; // 2GB
pub const DEFAULT_MAX_KEY_SIZE: u64 = 64 * 1024; // 64KB
pub const DEFAULT_MAX_VALUE_SIZE: u64 = 256 * 1024 * 1024; // 256MB

/// Extract the file id from a `cask.<id>` or `cask.<id>.hint` basename.
/// Returns `None` for anything else, so stray files are ignored.
pub fn parse_file_id(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    let rest = name.strip_prefix(DATA_FILE_PREFIX)?;
    let rest = rest.strip_suffix(HINT_FILE_SUFFIX).unwrap_or(rest);
    rest.parse::<u32>().ok()
}
