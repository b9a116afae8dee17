//! Component C: the flag file codec.
//!
//! A flag file is the flag vector serialized verbatim: one byte per document,
//! no header. `' '` marks an active (non-duplicate) document, `'D'` a
//! committed duplicate, `'d'` an in-progress duplicate local to the band
//! currently being processed (never observed outside `group_dedup`).

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DedupeError, DedupeResult};
use crate::util::replace_file_atomic_backoff;

pub const FLAG_ACTIVE: u8 = b' ';
pub const FLAG_DUPLICATE: u8 = b'D';
pub const FLAG_DUPLICATE_LOCAL: u8 = b'd';

pub fn dup_path(basename: &Path) -> PathBuf {
    with_suffix(basename, ".dup")
}

pub fn dup_merge_path(basename: &Path) -> PathBuf {
    with_suffix(basename, ".dup.merge")
}

fn with_suffix(basename: &Path, suffix: &str) -> PathBuf {
    let mut s = basename.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// Reads the whole flag vector into memory.
pub fn flag_load(path: impl AsRef<Path>) -> DedupeResult<Vec<u8>> {
    let path = path.as_ref();
    fs::read(path).map_err(|e| DedupeError::io(path, e))
}

/// Writes the whole flag vector, atomically replacing any prior file at `path`.
pub fn flag_save(path: impl AsRef<Path>, flags: &[u8]) -> DedupeResult<()> {
    let path = path.as_ref();
    let tmp = with_suffix(path, ".tmp");
    fs::write(&tmp, flags).map_err(|e| DedupeError::io(&tmp, e))?;
    replace_file_atomic_backoff(&tmp, path)
        .map_err(|e| DedupeError::format(path, format!("atomic replace failed: {e:#}")))
}

/// Creates a fresh all-active flag vector of the given length.
pub fn new_active_flags(len: usize) -> Vec<u8> {
    vec![FLAG_ACTIVE; len]
}

/// Promotes every in-progress `'d'` to the committed `'D'`. Must run after
/// every split of a band has finished writing.
pub fn promote_local_duplicates(flags: &mut [u8]) {
    for f in flags.iter_mut() {
        if *f == FLAG_DUPLICATE_LOCAL {
            *f = FLAG_DUPLICATE;
        }
    }
}
