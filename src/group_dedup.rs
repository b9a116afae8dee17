//! Component E: single-group deduplication.
//!
//! Reads one or more MinHash files belonging to the same logical corpus
//! ("group"), and for every LSH band sorts the documents by bucket bytes,
//! marks duplicates, and writes the band's 256 split index files.
//!
//! The distilled description of the emit phase calls for "256 parallel
//! sweeps" over the sorted array, one per split. That is correct but
//! wasteful: since the array is sorted by bucket bytes and the split key is
//! the bucket's own last byte, a single sequential sweep already visits
//! every maximal run of equal buckets exactly once, in order, and can hand
//! each run's record straight to the right split's writer. This crate
//! performs that single O(n) sweep instead, parallelizing across bands'
//! *reads* (disjoint file ranges) rather than duplicating the sweep 256
//! times; see DESIGN.md.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::config::{BandParams, NUM_SPLITS};
use crate::element::{buckets_equal, compare_ascending, compare_descending, BucketView, Element};
use crate::error::{DedupeError, DedupeResult};
use crate::flag_file::{self, FLAG_ACTIVE, FLAG_DUPLICATE_LOCAL};
use crate::index_file::IndexWriter;
use crate::minhash_file::MinHashReader;

struct FileEntry {
    path: PathBuf,
    num_items: u64,
    start_number: u64,
}

pub struct GroupDeduplicator {
    group: u16,
    params: Option<BandParams>,
    files: Vec<PathBuf>,
    entries: Vec<FileEntry>,
    num_items: u64,
    bucket_buffer: Vec<u8>,
    elements: Vec<Element>,
    flags: Vec<u8>,
    trim: bool,
}

/// Per-band statistics, used both for logging and for tests.
#[derive(Clone, Copy, Debug, Default, serde::Serialize)]
pub struct BandReport {
    pub band: u32,
    pub active_before: u64,
    pub active_after: u64,
}

impl GroupDeduplicator {
    pub fn new(group: u16) -> Self {
        Self {
            group,
            params: None,
            files: Vec::new(),
            entries: Vec::new(),
            num_items: 0,
            bucket_buffer: Vec::new(),
            elements: Vec::new(),
            flags: Vec::new(),
            trim: false,
        }
    }

    pub fn with_trim(mut self, trim: bool) -> Self {
        self.trim = trim;
        self
    }

    pub fn append_file(&mut self, path: impl Into<PathBuf>) {
        self.files.push(path.into());
    }

    /// Opens every appended file, checks their parameters agree, and
    /// allocates the shared buffers used across all bands.
    pub fn initialize(&mut self) -> DedupeResult<()> {
        if self.files.is_empty() {
            return Err(DedupeError::consistency("no MinHash files appended"));
        }
        let mut start_number = 0u64;
        let mut params: Option<BandParams> = None;
        let mut entries = Vec::with_capacity(self.files.len());
        for path in &self.files {
            let reader = MinHashReader::open(path)?;
            let h = reader.header();
            let p = BandParams {
                begin: h.begin,
                end: h.end,
                num_hash_values: h.num_hash_values,
                bytes_per_hash: h.bytes_per_hash,
            };
            match &params {
                None => params = Some(p),
                Some(existing) if *existing == p => {}
                Some(existing) => {
                    return Err(DedupeError::consistency(format!(
                        "MinHash file {:?} has params {:?}, expected {:?}",
                        path, p, existing
                    )));
                }
            }
            entries.push(FileEntry { path: path.clone(), num_items: h.num_items, start_number });
            start_number += h.num_items;
        }
        let params = params.unwrap();
        let bucket_bytes = params.bytes_per_bucket();
        self.num_items = start_number;
        self.bucket_buffer = vec![0u8; self.num_items as usize * bucket_bytes];
        self.elements = (0..self.num_items).map(|i| Element { ordinal: i }).collect();
        self.flags = flag_file::new_active_flags(self.num_items as usize);
        self.entries = entries;
        self.params = Some(params);
        Ok(())
    }

    pub fn num_items(&self) -> u64 {
        self.num_items
    }

    /// Runs every band in `[params.begin, params.end)` in sequence.
    pub fn run(&mut self, basename: &Path, reverse: bool) -> DedupeResult<Vec<BandReport>> {
        let params = self.params.ok_or_else(|| DedupeError::consistency("initialize() not called"))?;
        let mut reports = Vec::with_capacity(params.bands() as usize);
        for b in params.begin..params.end {
            reports.push(self.deduplicate_bucket(basename, b, reverse, params)?);
        }
        Ok(reports)
    }

    fn deduplicate_bucket(
        &mut self,
        basename: &Path,
        b: u32,
        reverse: bool,
        params: BandParams,
    ) -> DedupeResult<BandReport> {
        let bucket_bytes = params.bytes_per_bucket();
        let active_before = self.flags.iter().filter(|&&f| f == FLAG_ACTIVE).count() as u64;

        // Parallel read: each file's MinHash reader fills its own disjoint
        // slice of the shared bucket buffer, so no locking is needed.
        {
            let mut slices: Vec<&mut [u8]> = Vec::with_capacity(self.entries.len());
            let mut rest: &mut [u8] = &mut self.bucket_buffer[..];
            for e in &self.entries {
                let len = e.num_items as usize * bucket_bytes;
                let (head, tail) = rest.split_at_mut(len);
                slices.push(head);
                rest = tail;
            }
            self.entries
                .par_iter()
                .zip(slices.into_par_iter())
                .try_for_each(|(entry, slice)| -> DedupeResult<()> {
                    let mut reader = MinHashReader::open(&entry.path)?;
                    reader.read_bucket_array(slice, b)
                })?;
        }

        // Reset ordinals (the previous band's sort permuted this array).
        self.elements.par_iter_mut().enumerate().for_each(|(i, e)| e.ordinal = i as u64);

        // Sort: comparator closes over an immutable slice reference, not a
        // thread-shared mutable static (see crate::element).
        let view = BucketView::new(&self.bucket_buffer, bucket_bytes);
        if reverse {
            self.elements.par_sort_unstable_by(|a, c| compare_descending(view, a, c));
        } else {
            self.elements.par_sort_unstable_by(|a, c| compare_ascending(view, a, c));
        }

        // Emit: one sequential sweep over the sorted array, writing each
        // maximal equal-bucket run's survivor straight to its split writer.
        let mut writers: Vec<Option<IndexWriter>> = (0..NUM_SPLITS)
            .map(|split| IndexWriter::create(basename, b, split as u8, bucket_bytes as u32, false).map(Some))
            .collect::<DedupeResult<Vec<_>>>()?;
        let mut trimmed_writers: Vec<Option<IndexWriter>> = if self.trim {
            (0..NUM_SPLITS)
                .map(|split| IndexWriter::create(basename, b, split as u8, bucket_bytes as u32, true).map(Some))
                .collect::<DedupeResult<Vec<_>>>()?
        } else {
            Vec::new()
        };
        let mut total_items = vec![0u64; NUM_SPLITS as usize];

        let n = self.elements.len();
        let mut i = 0usize;
        while i < n {
            let mut j = i + 1;
            while j < n && buckets_equal(view, &self.elements[i], &self.elements[j]) {
                j += 1;
            }
            let run = &self.elements[i..j];
            let survivor = run[0];
            let split = view.split_of(survivor.ordinal) as usize;
            total_items[split] += run.len() as u64;

            if self.flags[survivor.ordinal as usize] == FLAG_ACTIVE {
                let bucket = view.bucket(survivor.ordinal);
                let w = writers[split].as_mut().unwrap();
                w.write_item(self.group, survivor.ordinal, bucket)?;
                if self.trim {
                    trimmed_writers[split].as_mut().unwrap().write_item(self.group, survivor.ordinal, bucket)?;
                }
            }
            for elem in &run[1..] {
                self.flags[elem.ordinal as usize] = FLAG_DUPLICATE_LOCAL;
            }
            i = j;
        }

        for (split, w) in writers.into_iter().enumerate() {
            let mut w = w.unwrap();
            w.note_total_items(total_items[split]);
            w.close()?;
        }
        for (split, w) in trimmed_writers.into_iter().enumerate() {
            if let Some(mut w) = w {
                w.note_total_items(total_items[split]);
                w.close()?;
            }
        }

        flag_file::promote_local_duplicates(&mut self.flags);
        let active_after = self.flags.iter().filter(|&&f| f == FLAG_ACTIVE).count() as u64;

        let ratio = if active_before == 0 {
            0.0
        } else {
            (active_before - active_after) as f64 / active_before as f64
        };
        tracing::info!(band = b, active_before, active_after, ratio, "Deduplication completed");

        Ok(BandReport { band: b, active_before, active_after })
    }

    /// Writes the `.src` source-list file (`"<num_items>\t<filename>\n"` per line).
    pub fn save_source_list(&self, basename: &Path) -> DedupeResult<()> {
        let path = {
            let mut s = basename.as_os_str().to_os_string();
            s.push(".src");
            PathBuf::from(s)
        };
        let mut body = String::new();
        for e in &self.entries {
            body.push_str(&format!("{}\t{}\n", e.num_items, e.path.display()));
        }
        std::fs::write(&path, body).map_err(|err| DedupeError::io(&path, err))
    }

    /// Persists the flag vector to `<basename>.dup`.
    pub fn save_flag(&self, basename: &Path) -> DedupeResult<()> {
        flag_file::flag_save(flag_file::dup_path(basename), &self.flags)
    }

    pub fn flags(&self) -> &[u8] {
        &self.flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minhash_file::MinHashWriter;
    use tempfile::tempdir;

    fn write_minhash(path: &Path, docs: &[Vec<u64>], begin: u32, end: u32, r: u16) {
        let mut w = MinHashWriter::create(path, r, begin, end, 8).unwrap();
        for d in docs {
            w.put(d).unwrap();
        }
        w.close().unwrap();
    }

    /// Two identical documents in one band: forward mode keeps ordinal 0.
    #[test]
    fn exact_duplicate_forward_keeps_first() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("g0.mh");
        // one band, one hash value per band
        write_minhash(&path, &[vec![42], vec![42]], 0, 1, 1);

        let mut dedup = GroupDeduplicator::new(0);
        dedup.append_file(&path);
        dedup.initialize().unwrap();
        let basename = dir.path().join("g0");
        dedup.run(&basename, false).unwrap();
        dedup.save_flag(&basename).unwrap();

        assert_eq!(dedup.flags(), &[FLAG_ACTIVE, b'D']);
    }

    /// Same input, reverse mode: the later ordinal survives instead.
    #[test]
    fn exact_duplicate_reverse_keeps_last() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("g0.mh");
        write_minhash(&path, &[vec![42], vec![42]], 0, 1, 1);

        let mut dedup = GroupDeduplicator::new(0);
        dedup.append_file(&path);
        dedup.initialize().unwrap();
        let basename = dir.path().join("g0");
        dedup.run(&basename, true).unwrap();

        assert_eq!(dedup.flags(), &[b'D', FLAG_ACTIVE]);
    }

    #[test]
    fn empty_group_produces_empty_flags() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("g0.mh");
        write_minhash(&path, &[], 0, 1, 1);

        let mut dedup = GroupDeduplicator::new(0);
        dedup.append_file(&path);
        dedup.initialize().unwrap();
        let basename = dir.path().join("g0");
        dedup.run(&basename, false).unwrap();
        assert!(dedup.flags().is_empty());
    }

    #[test]
    fn mismatched_params_is_consistency_error() {
        let dir = tempdir().unwrap();
        let p0 = dir.path().join("a.mh");
        let p1 = dir.path().join("b.mh");
        write_minhash(&p0, &[vec![1]], 0, 1, 1);
        write_minhash(&p1, &[vec![1, 2]], 0, 1, 2);

        let mut dedup = GroupDeduplicator::new(0);
        dedup.append_file(&p0);
        dedup.append_file(&p1);
        let err = dedup.initialize().unwrap_err();
        assert!(matches!(err, DedupeError::Consistency { .. }));
    }
}
