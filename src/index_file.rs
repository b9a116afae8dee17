//! Component B: the per-band, per-split bucket index file codec.
//!
//! One band produces 256 split files, sharded by the bucket's last byte, so
//! that later stages (trim, cross-group merge) can work split-by-split in
//! parallel without coordinating on a single file.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{DedupeError, DedupeResult};

pub const MAGIC: &[u8; 8] = b"DoubriI4";
pub const ID_LEN: usize = 8;

/// Builds the conventional index file path for one (band, split) pair.
///
/// `basename.index.BBBBB.ss` for the untrimmed layout, `basename.idx.BBBBB.ss`
/// for the trimmed one, where `BBBBB` is the band number zero-padded to five
/// decimal digits and `ss` is the split byte in two lowercase hex digits.
pub fn index_path(basename: &Path, band: u32, split: u8, trimmed: bool) -> PathBuf {
    let ext = if trimmed { "idx" } else { "index" };
    let mut s = basename.as_os_str().to_os_string();
    s.push(format!(".{ext}.{band:05}.{split:02x}"));
    PathBuf::from(s)
}

/// Packs a (group, ordinal) pair into the big-endian 8-byte record id.
pub fn pack_id(group: u16, ordinal: u64) -> DedupeResult<[u8; 8]> {
    if ordinal >= (1u64 << 48) {
        return Err(DedupeError::range(format!("ordinal {ordinal} does not fit in 48 bits")));
    }
    let packed: u64 = ((group as u64) << 48) | ordinal;
    Ok(packed.to_be_bytes())
}

pub fn unpack_group(id: &[u8]) -> u16 {
    let packed = u64::from_be_bytes(id[0..8].try_into().unwrap());
    (packed >> 48) as u16
}

pub fn unpack_ordinal(id: &[u8]) -> u64 {
    let packed = u64::from_be_bytes(id[0..8].try_into().unwrap());
    packed & ((1u64 << 48) - 1)
}

#[derive(Clone, Copy, Debug)]
pub struct IndexHeader {
    pub band: u32,
    pub bytes_per_bucket: u32,
    pub num_total_items: u64,
    pub num_active_items: u64,
}

pub struct IndexWriter {
    path: PathBuf,
    file: BufWriter<File>,
    bytes_per_bucket: u32,
    num_total_items: u64,
    num_active_items: u64,
}

impl IndexWriter {
    pub fn create(basename: &Path, band: u32, split: u8, bytes_per_bucket: u32, trimmed: bool) -> DedupeResult<Self> {
        let path = index_path(basename, band, split, trimmed);
        let file = File::create(&path).map_err(|e| DedupeError::io(&path, e))?;
        let mut w = BufWriter::new(file);
        w.write_all(MAGIC).map_err(|e| DedupeError::io(&path, e))?;
        w.write_u32::<LittleEndian>(band).map_err(|e| DedupeError::io(&path, e))?;
        w.write_u32::<LittleEndian>(bytes_per_bucket).map_err(|e| DedupeError::io(&path, e))?;
        w.write_u64::<LittleEndian>(0).map_err(|e| DedupeError::io(&path, e))?;
        w.write_u64::<LittleEndian>(0).map_err(|e| DedupeError::io(&path, e))?;
        Ok(Self { path, file: w, bytes_per_bucket, num_total_items: 0, num_active_items: 0 })
    }

    /// Appends one survivor record. `bucket` must be `bytes_per_bucket` long.
    pub fn write_item(&mut self, group: u16, ordinal: u64, bucket: &[u8]) -> DedupeResult<()> {
        if bucket.len() != self.bytes_per_bucket as usize {
            return Err(DedupeError::consistency(format!(
                "write_item bucket length {} != bytes_per_bucket {}",
                bucket.len(),
                self.bytes_per_bucket
            )));
        }
        let id = pack_id(group, ordinal)?;
        self.file.write_all(&id).map_err(|e| DedupeError::io(&self.path, e))?;
        self.file.write_all(bucket).map_err(|e| DedupeError::io(&self.path, e))?;
        self.num_active_items += 1;
        Ok(())
    }

    /// Copies a pre-framed `(id, bucket)` record verbatim, as used by trim and merge.
    pub fn write_raw(&mut self, record: &[u8]) -> DedupeResult<()> {
        if record.len() != ID_LEN + self.bytes_per_bucket as usize {
            return Err(DedupeError::consistency("write_raw record length mismatch"));
        }
        self.file.write_all(record).map_err(|e| DedupeError::io(&self.path, e))?;
        self.num_active_items += 1;
        Ok(())
    }

    pub fn note_total_items(&mut self, n: u64) {
        self.num_total_items = n;
    }

    /// Flushes the body and patches `num_total_items`/`num_active_items` in the header.
    pub fn close(mut self) -> DedupeResult<IndexHeader> {
        self.file.flush().map_err(|e| DedupeError::io(&self.path, e))?;
        let mut file = self.file.into_inner().map_err(|e| DedupeError::io(&self.path, e.into_error()))?;
        file.seek(SeekFrom::Start(16)).map_err(|e| DedupeError::io(&self.path, e))?;
        file.write_u64::<LittleEndian>(self.num_total_items).map_err(|e| DedupeError::io(&self.path, e))?;
        file.write_u64::<LittleEndian>(self.num_active_items).map_err(|e| DedupeError::io(&self.path, e))?;
        file.flush().map_err(|e| DedupeError::io(&self.path, e))?;
        Ok(IndexHeader {
            band: 0, // caller already knows; kept for symmetry with IndexReader
            bytes_per_bucket: self.bytes_per_bucket,
            num_total_items: self.num_total_items,
            num_active_items: self.num_active_items,
        })
    }
}

pub struct IndexReader {
    path: PathBuf,
    file: BufReader<File>,
    header: IndexHeader,
    record_len: usize,
}

impl IndexReader {
    pub fn open(basename: &Path, band: u32, split: u8, trimmed: bool) -> DedupeResult<Self> {
        let path = index_path(basename, band, split, trimmed);
        Self::open_path(path)
    }

    pub fn open_path(path: PathBuf) -> DedupeResult<Self> {
        let file = File::open(&path).map_err(|e| DedupeError::io(&path, e))?;
        let mut r = BufReader::new(file);

        let mut magic = [0u8; 8];
        r.read_exact(&mut magic).map_err(|e| DedupeError::io(&path, e))?;
        if &magic != MAGIC {
            return Err(DedupeError::format(&path, "bad magic, expected DoubriI4"));
        }
        let band = r.read_u32::<LittleEndian>().map_err(|e| DedupeError::io(&path, e))?;
        let bytes_per_bucket = r.read_u32::<LittleEndian>().map_err(|e| DedupeError::io(&path, e))?;
        let num_total_items = r.read_u64::<LittleEndian>().map_err(|e| DedupeError::io(&path, e))?;
        let num_active_items = r.read_u64::<LittleEndian>().map_err(|e| DedupeError::io(&path, e))?;

        let record_len = ID_LEN + bytes_per_bucket as usize;
        Ok(Self {
            path,
            file: r,
            header: IndexHeader { band, bytes_per_bucket, num_total_items, num_active_items },
            record_len,
        })
    }

    pub fn header(&self) -> IndexHeader {
        self.header
    }

    pub fn record_len(&self) -> usize {
        self.record_len
    }

    /// Reads one `(id, bucket)` record into `record` (sized `record_len()`).
    /// Returns `false` at end of stream.
    pub fn next(&mut self, record: &mut [u8]) -> DedupeResult<bool> {
        debug_assert_eq!(record.len(), self.record_len);
        match self.file.read_exact(record) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(DedupeError::io(&self.path, e)),
        }
    }

    /// Bulk-reads every remaining record into `buffer` (must be exactly
    /// `num_active_items * record_len()` bytes, minus whatever `next()` already consumed).
    pub fn read_all(&mut self, buffer: &mut [u8]) -> DedupeResult<()> {
        self.file.read_exact(buffer).map_err(|e| DedupeError::io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_item() {
        let dir = tempdir().unwrap();
        let basename = dir.path().join("g0");
        let bucket = [1u8, 2, 3, 4];
        let mut w = IndexWriter::create(&basename, 3, 0xAB, 4, false).unwrap();
        w.write_item(7, 42, &bucket).unwrap();
        w.note_total_items(5);
        w.close().unwrap();

        let mut r = IndexReader::open(&basename, 3, 0xAB, false).unwrap();
        assert_eq!(r.header().num_active_items, 1);
        assert_eq!(r.header().num_total_items, 5);
        let mut record = vec![0u8; r.record_len()];
        assert!(r.next(&mut record).unwrap());
        assert_eq!(unpack_group(&record), 7);
        assert_eq!(unpack_ordinal(&record), 42);
        assert_eq!(&record[ID_LEN..], &bucket);
        assert!(!r.next(&mut record).unwrap());
    }

    #[test]
    fn path_uses_trimmed_extension() {
        let base = PathBuf::from("/tmp/corpus");
        assert_eq!(index_path(&base, 3, 0xAB, false), PathBuf::from("/tmp/corpus.index.00003.ab"));
        assert_eq!(index_path(&base, 3, 0xAB, true), PathBuf::from("/tmp/corpus.idx.00003.ab"));
    }

    #[test]
    fn pack_unpack_round_trips() {
        let id = pack_id(0xBEEF, (1u64 << 48) - 1).unwrap();
        assert_eq!(unpack_group(&id), 0xBEEF);
        assert_eq!(unpack_ordinal(&id), (1u64 << 48) - 1);
    }

    #[test]
    fn pack_rejects_oversized_ordinal() {
        assert!(pack_id(0, 1u64 << 48).is_err());
    }
}
