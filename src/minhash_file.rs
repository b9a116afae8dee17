//! Component A: the bucket-major MinHash file codec.
//!
//! Documents are grouped into fixed-size sectors (512 documents). Within one
//! sector the layout is bucket-major: all of band `begin`'s buckets for the
//! sector's documents, then all of band `begin+1`'s, and so on. This lets a
//! single `seek`+bulk `read` pull every document's bucket for one band out of
//! a sector, instead of one short read per document.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::config::SECTOR_SIZE;
use crate::error::{DedupeError, DedupeResult};

pub const MAGIC: &[u8; 8] = b"DoubriH4";
const HEADER_LEN: u64 = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MinHashHeader {
    pub num_items: u64,
    pub bytes_per_hash: u16,
    pub num_hash_values: u16,
    pub begin: u32,
    pub end: u32,
    pub sector_size: u32,
}

impl MinHashHeader {
    pub fn bands(&self) -> u32 {
        self.end - self.begin
    }
    pub fn bytes_per_bucket(&self) -> usize {
        self.num_hash_values as usize * self.bytes_per_hash as usize
    }
}

/// Sequential writer for one MinHash file.
pub struct MinHashWriter {
    path: PathBuf,
    file: BufWriter<File>,
    bytes_per_hash: u16,
    num_hash_values: u16,
    begin: u32,
    end: u32,
    bands: u32,
    bucket_bytes: usize,
    /// Per-band scratch for the current (possibly partial) sector.
    scratch: Vec<Vec<u8>>,
    cur_count: u32,
    num_items: u64,
}

impl MinHashWriter {
    pub fn create(
        path: impl AsRef<Path>,
        num_hash_values: u16,
        begin: u32,
        end: u32,
        bytes_per_hash: u16,
    ) -> DedupeResult<Self> {
        let path = path.as_ref().to_path_buf();
        if end <= begin {
            return Err(DedupeError::range(format!("end ({end}) must be greater than begin ({begin})")));
        }
        let file = File::create(&path).map_err(|e| DedupeError::io(&path, e))?;
        let mut w = BufWriter::new(file);
        w.write_all(MAGIC).map_err(|e| DedupeError::io(&path, e))?;
        w.write_u64::<LittleEndian>(0).map_err(|e| DedupeError::io(&path, e))?; // num_items, patched on close
        w.write_u16::<LittleEndian>(bytes_per_hash).map_err(|e| DedupeError::io(&path, e))?;
        w.write_u16::<LittleEndian>(num_hash_values).map_err(|e| DedupeError::io(&path, e))?;
        w.write_u32::<LittleEndian>(begin).map_err(|e| DedupeError::io(&path, e))?;
        w.write_u32::<LittleEndian>(end).map_err(|e| DedupeError::io(&path, e))?;
        w.write_u32::<LittleEndian>(SECTOR_SIZE).map_err(|e| DedupeError::io(&path, e))?;

        let bands = end - begin;
        let bucket_bytes = num_hash_values as usize * bytes_per_hash as usize;
        let scratch = (0..bands).map(|_| Vec::with_capacity(SECTOR_SIZE as usize * bucket_bytes)).collect();

        Ok(Self {
            path,
            file: w,
            bytes_per_hash,
            num_hash_values,
            begin,
            end,
            bands,
            bucket_bytes,
            scratch,
            cur_count: 0,
            num_items: 0,
        })
    }

    /// Appends one document. `hashes` must contain `bands * num_hash_values`
    /// values, band-major: band `begin`'s `num_hash_values` values first, etc.
    pub fn put(&mut self, hashes: &[u64]) -> DedupeResult<()> {
        let expected = self.bands as usize * self.num_hash_values as usize;
        if hashes.len() != expected {
            return Err(DedupeError::consistency(format!(
                "put() expected {expected} hash values, got {}",
                hashes.len()
            )));
        }
        for (band_idx, chunk) in hashes.chunks(self.num_hash_values as usize).enumerate() {
            let buf = &mut self.scratch[band_idx];
            for &h in chunk {
                buf.write_uint::<BigEndian>(h, self.bytes_per_hash as usize)
                    .map_err(|e| DedupeError::io(&self.path, e))?;
            }
        }
        self.cur_count += 1;
        self.num_items += 1;
        if self.cur_count == SECTOR_SIZE {
            self.flush_sector()?;
        }
        Ok(())
    }

    fn flush_sector(&mut self) -> DedupeResult<()> {
        if self.cur_count == 0 {
            return Ok(());
        }
        for buf in self.scratch.iter_mut() {
            self.file.write_all(buf).map_err(|e| DedupeError::io(&self.path, e))?;
            buf.clear();
        }
        self.cur_count = 0;
        Ok(())
    }

    /// Flushes any partial sector and patches the header's `num_items`.
    pub fn close(mut self) -> DedupeResult<u64> {
        self.flush_sector()?;
        self.file.flush().map_err(|e| DedupeError::io(&self.path, e))?;
        let mut file = self.file.into_inner().map_err(|e| DedupeError::io(&self.path, e.into_error()))?;
        file.seek(SeekFrom::Start(8)).map_err(|e| DedupeError::io(&self.path, e))?;
        file.write_u64::<LittleEndian>(self.num_items).map_err(|e| DedupeError::io(&self.path, e))?;
        file.flush().map_err(|e| DedupeError::io(&self.path, e))?;
        Ok(self.num_items)
    }
}

/// Random-access reader for one MinHash file.
pub struct MinHashReader {
    path: PathBuf,
    file: BufReader<File>,
    header: MinHashHeader,
}

impl MinHashReader {
    pub fn open(path: impl AsRef<Path>) -> DedupeResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| DedupeError::io(&path, e))?;
        let mut r = BufReader::new(file);

        let mut magic = [0u8; 8];
        r.read_exact(&mut magic).map_err(|e| DedupeError::io(&path, e))?;
        if &magic != MAGIC {
            return Err(DedupeError::format(&path, "bad magic, expected DoubriH4"));
        }
        let num_items = r.read_u64::<LittleEndian>().map_err(|e| DedupeError::io(&path, e))?;
        let bytes_per_hash = r.read_u16::<LittleEndian>().map_err(|e| DedupeError::io(&path, e))?;
        let num_hash_values = r.read_u16::<LittleEndian>().map_err(|e| DedupeError::io(&path, e))?;
        let begin = r.read_u32::<LittleEndian>().map_err(|e| DedupeError::io(&path, e))?;
        let end = r.read_u32::<LittleEndian>().map_err(|e| DedupeError::io(&path, e))?;
        let sector_size = r.read_u32::<LittleEndian>().map_err(|e| DedupeError::io(&path, e))?;
        if sector_size != SECTOR_SIZE {
            return Err(DedupeError::format(&path, format!("unsupported sector_size {sector_size}")));
        }
        if end <= begin {
            return Err(DedupeError::format(&path, "end must be greater than begin"));
        }

        Ok(Self {
            path,
            file: r,
            header: MinHashHeader { num_items, bytes_per_hash, num_hash_values, begin, end, sector_size },
        })
    }

    pub fn header(&self) -> MinHashHeader {
        self.header
    }

    /// Reads all `num_items` buckets of band `b` into `buffer`, which must be
    /// exactly `num_items * bytes_per_bucket` bytes long.
    pub fn read_bucket_array(&mut self, buffer: &mut [u8], b: u32) -> DedupeResult<()> {
        if b < self.header.begin || b >= self.header.end {
            return Err(DedupeError::range(format!(
                "band {b} out of range [{}, {})",
                self.header.begin, self.header.end
            )));
        }
        let bucket_bytes = self.header.bytes_per_bucket();
        let expected_len = self.header.num_items as usize * bucket_bytes;
        if buffer.len() != expected_len {
            return Err(DedupeError::range(format!(
                "read_bucket_array buffer length {} != expected {}",
                buffer.len(),
                expected_len
            )));
        }
        if self.header.num_items == 0 {
            return Ok(());
        }

        let band_offset = (b - self.header.begin) as u64;
        let bands = self.header.bands() as u64;
        let sector_size = self.header.sector_size as u64;
        let full_sectors = self.header.num_items / sector_size;
        let remainder = self.header.num_items % sector_size;

        let mut docs_done: u64 = 0;
        let mut sector_idx: u64 = 0;
        while docs_done < self.header.num_items {
            let count_s = if sector_idx < full_sectors { sector_size } else { remainder };
            // Every full sector before this one is uniform size; only the tail sector is short.
            let sector_offset = HEADER_LEN + sector_idx * bands * sector_size * bucket_bytes as u64;
            let chunk_offset = sector_offset + band_offset * count_s * bucket_bytes as u64;
            self.file.seek(SeekFrom::Start(chunk_offset)).map_err(|e| DedupeError::io(&self.path, e))?;
            let dst_start = docs_done as usize * bucket_bytes;
            let dst_len = count_s as usize * bucket_bytes;
            self.file
                .read_exact(&mut buffer[dst_start..dst_start + dst_len])
                .map_err(|e| DedupeError::io(&self.path, e))?;
            docs_done += count_s;
            sector_idx += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_single_sector() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.mh");
        let begin = 0u32;
        let end = 3u32;
        let r = 2u16;
        let mut w = MinHashWriter::create(&path, r, begin, end, 8).unwrap();
        // 3 documents, each with bands*r = 6 hash values.
        let docs: Vec<Vec<u64>> = vec![
            vec![1, 2, 10, 20, 100, 200],
            vec![3, 4, 30, 40, 300, 400],
            vec![5, 6, 50, 60, 500, 600],
        ];
        for d in &docs {
            w.put(d).unwrap();
        }
        let n = w.close().unwrap();
        assert_eq!(n, 3);

        let mut reader = MinHashReader::open(&path).unwrap();
        let header = reader.header();
        assert_eq!(header.num_items, 3);
        assert_eq!(header.bands(), 3);

        for b in 0..3u32 {
            let mut buf = vec![0u8; 3 * header.bytes_per_bucket()];
            reader.read_bucket_array(&mut buf, b).unwrap();
            for (doc_idx, doc) in docs.iter().enumerate() {
                let expected_vals = &doc[b as usize * r as usize..(b as usize + 1) * r as usize];
                let got = &buf[doc_idx * header.bytes_per_bucket()..(doc_idx + 1) * header.bytes_per_bucket()];
                let mut expected_bytes = Vec::new();
                for &v in expected_vals {
                    expected_bytes.extend_from_slice(&v.to_be_bytes());
                }
                assert_eq!(got, &expected_bytes[..]);
            }
        }
    }

    #[test]
    fn round_trip_spans_multiple_sectors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.mh");
        let mut w = MinHashWriter::create(&path, 1, 0, 1, 4).unwrap();
        let n_docs = 1200u64; // > 2 sectors of 512
        for i in 0..n_docs {
            w.put(&[i]).unwrap();
        }
        let n = w.close().unwrap();
        assert_eq!(n, n_docs);

        let mut reader = MinHashReader::open(&path).unwrap();
        let header = reader.header();
        let mut buf = vec![0u8; n_docs as usize * header.bytes_per_bucket()];
        reader.read_bucket_array(&mut buf, 0).unwrap();
        for i in 0..n_docs as usize {
            let got = u32::from_be_bytes(buf[i * 4..i * 4 + 4].try_into().unwrap());
            assert_eq!(got as u64, i as u64);
        }
    }

    #[test]
    fn bad_magic_is_format_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.mh");
        std::fs::write(&path, b"not-a-minhash-file-at-all-00000").unwrap();
        let err = MinHashReader::open(&path).unwrap_err();
        assert!(matches!(err, DedupeError::Format { .. }));
    }
}
