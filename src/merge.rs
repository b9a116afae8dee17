//! Component F: cross-group merge.
//!
//! Given several already-deduplicated groups, merges each band's 256 split
//! index files across groups with a k-way merge (directly generalizing the
//! teacher's own external-sort merge step — see `crate::dedupe`'s
//! `merge_runs_sorted` — from string keys to fixed-width bucket byte keys),
//! and marks every group's flag vector wherever a bucket value recurs across
//! groups.
//!
//! Within one group's split index, every record already has a unique bucket
//! value (group dedup only ever emits one survivor per run of equal
//! buckets), so a tie in this merge can involve at most one record per
//! group — but it may involve any number of groups at once. The generalized
//! tie rule: among every group tied on the current bucket value, the single
//! lowest-index group survives in forward mode, the highest-index group
//! survives in reverse mode; every other tied group's record is marked
//! duplicate.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};

use crate::error::{DedupeError, DedupeResult};
use crate::flag_file::{self, FLAG_DUPLICATE};
use crate::index_file::{self, IndexReader, ID_LEN};

struct GroupHandle {
    basename: PathBuf,
    flags: Vec<u8>,
}

pub struct CrossGroupMerger {
    groups: Vec<GroupHandle>,
    trimmed: bool,
}

#[derive(Clone, Copy, Debug, Default, serde::Serialize)]
pub struct MergeBandReport {
    pub band: u32,
    pub marked_duplicate: u64,
}

impl CrossGroupMerger {
    pub fn new(trimmed: bool) -> Self {
        Self { groups: Vec::new(), trimmed }
    }

    /// Appends one group's source, loading its `.dup` flag vector.
    pub fn append_source(&mut self, basename: impl Into<PathBuf>) -> DedupeResult<()> {
        let basename = basename.into();
        let flags = flag_file::flag_load(flag_file::dup_path(&basename))?;
        self.groups.push(GroupHandle { basename, flags });
        Ok(())
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Merges every band in `[begin, end)` across all appended groups.
    pub fn run(&mut self, begin: u32, end: u32, reverse: bool) -> DedupeResult<Vec<MergeBandReport>> {
        if self.groups.is_empty() {
            return Err(DedupeError::consistency("no group sources appended to merge"));
        }
        let mut reports = Vec::with_capacity((end - begin) as usize);
        for b in begin..end {
            reports.push(self.merge_band(b, reverse)?);
        }
        Ok(reports)
    }

    fn merge_band(&mut self, b: u32, reverse: bool) -> DedupeResult<MergeBandReport> {
        let mut marked = 0u64;
        for split in 0u16..256 {
            marked += self.merge_split(b, split as u8, reverse)?;
        }
        Ok(MergeBandReport { band: b, marked_duplicate: marked })
    }

    fn merge_split(&mut self, b: u32, split: u8, reverse: bool) -> DedupeResult<u64> {
        let num_groups = self.groups.len();
        let mut readers: Vec<IndexReader> = Vec::with_capacity(num_groups);
        for g in &self.groups {
            readers.push(IndexReader::open(&g.basename, b, split, self.trimmed)?);
        }

        let bytes_per_bucket = readers[0].header().bytes_per_bucket;
        for r in &readers[1..] {
            if r.header().bytes_per_bucket != bytes_per_bucket {
                return Err(DedupeError::consistency(format!(
                    "bytes_per_bucket mismatch across groups at band {b} split {split:#04x}"
                )));
            }
        }
        let record_len = ID_LEN + bytes_per_bucket as usize;

        // Bulk-read every group's (already sorted, unique-bucket) run.
        let mut buffers: Vec<Vec<u8>> = Vec::with_capacity(num_groups);
        for (g_idx, r) in readers.iter_mut().enumerate() {
            let n = r.header().num_active_items as usize;
            let mut buf = vec![0u8; n * record_len];
            if n > 0 {
                r.read_all(&mut buf)?;
            }
            // Re-stamp the group field: the on-disk value may still be the
            // writer's original caller-supplied number (normally already
            // correct), but older single-group artifacts stamp 0 universally.
            for rec in buf.chunks_mut(record_len) {
                let ordinal = index_file::unpack_ordinal(&rec[..ID_LEN]);
                let id = index_file::pack_id(g_idx as u16, ordinal)?;
                rec[..ID_LEN].copy_from_slice(&id);
            }
            buffers.push(buf);
        }

        let mut cursors = vec![0usize; num_groups];
        let mut heap: BinaryHeap<Reverse<(Vec<u8>, usize)>> = BinaryHeap::new();
        for (g_idx, buf) in buffers.iter().enumerate() {
            if !buf.is_empty() {
                let bucket = buf[ID_LEN..record_len].to_vec();
                heap.push(Reverse((bucket, g_idx)));
            }
        }

        let mut marked = 0u64;
        while let Some(Reverse((bucket, first_group))) = heap.pop() {
            // Collect every group whose current record shares this bucket value.
            let mut tied: Vec<usize> = vec![first_group];
            while let Some(&Reverse((ref next_bucket, _))) = heap.peek() {
                if next_bucket == &bucket {
                    let Reverse((_, g_idx)) = heap.pop().unwrap();
                    tied.push(g_idx);
                } else {
                    break;
                }
            }

            let keeper = if reverse { *tied.iter().max().unwrap() } else { *tied.iter().min().unwrap() };
            for &g_idx in &tied {
                let pos = cursors[g_idx] * record_len;
                let rec = &buffers[g_idx][pos..pos + record_len];
                let ordinal = index_file::unpack_ordinal(&rec[..ID_LEN]) as usize;
                if g_idx != keeper {
                    self.groups[g_idx].flags[ordinal] = FLAG_DUPLICATE;
                    marked += 1;
                }
                cursors[g_idx] += 1;
                let next_pos = cursors[g_idx] * record_len;
                if next_pos < buffers[g_idx].len() {
                    let next_bucket = buffers[g_idx][next_pos + ID_LEN..next_pos + record_len].to_vec();
                    heap.push(Reverse((next_bucket, g_idx)));
                }
            }
        }

        Ok(marked)
    }

    /// Persists every group's updated flag vector to `<basename>.dup.merge`.
    pub fn save_flags(&self) -> DedupeResult<()> {
        for g in &self.groups {
            flag_file::flag_save(flag_file::dup_merge_path(&g.basename), &g.flags)?;
        }
        Ok(())
    }

    pub fn flags_for(&self, basename: &Path) -> Option<&[u8]> {
        self.groups.iter().find(|g| g.basename == basename).map(|g| g.flags.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BandParams;
    use crate::flag_file::FLAG_ACTIVE;
    use crate::group_dedup::GroupDeduplicator;
    use crate::minhash_file::MinHashWriter;
    use tempfile::tempdir;

    fn write_minhash(path: &Path, docs: &[Vec<u64>], params: BandParams) {
        let mut w =
            MinHashWriter::create(path, params.num_hash_values, params.begin, params.end, params.bytes_per_hash)
                .unwrap();
        for d in docs {
            w.put(d).unwrap();
        }
        w.close().unwrap();
    }

    fn dedup_group(dir: &Path, group: u16, name: &str, docs: &[Vec<u64>], params: BandParams) -> PathBuf {
        let mh_path = dir.join(format!("{name}.mh"));
        write_minhash(&mh_path, docs, params);
        let mut d = GroupDeduplicator::new(group);
        d.append_file(&mh_path);
        d.initialize().unwrap();
        let basename = dir.join(name);
        d.run(&basename, false).unwrap();
        d.save_flag(&basename).unwrap();
        basename
    }

    /// Two groups share one document (`X`): forward merge keeps group 0, marks group 1.
    #[test]
    fn cross_group_duplicate_forward() {
        let dir = tempdir().unwrap();
        let params = BandParams { begin: 0, end: 1, num_hash_values: 1, bytes_per_hash: 8 };

        let g0 = dedup_group(dir.path(), 0, "g0", &[vec![99]], params);
        let g1 = dedup_group(dir.path(), 1, "g1", &[vec![99]], params);

        let mut merger = CrossGroupMerger::new(false);
        merger.append_source(&g0).unwrap();
        merger.append_source(&g1).unwrap();
        merger.run(0, 1, false).unwrap();
        merger.save_flags().unwrap();

        assert_eq!(merger.flags_for(&g0).unwrap(), &[FLAG_ACTIVE]);
        assert_eq!(merger.flags_for(&g1).unwrap(), &[FLAG_DUPLICATE]);
    }

    /// Three groups each contribute one copy of `X`: only the first survives.
    #[test]
    fn three_group_chain() {
        let dir = tempdir().unwrap();
        let params = BandParams { begin: 0, end: 1, num_hash_values: 1, bytes_per_hash: 8 };

        let g0 = dedup_group(dir.path(), 0, "g0", &[vec![7]], params);
        let g1 = dedup_group(dir.path(), 1, "g1", &[vec![7]], params);
        let g2 = dedup_group(dir.path(), 2, "g2", &[vec![7]], params);

        let mut merger = CrossGroupMerger::new(false);
        merger.append_source(&g0).unwrap();
        merger.append_source(&g1).unwrap();
        merger.append_source(&g2).unwrap();
        merger.run(0, 1, false).unwrap();
        merger.save_flags().unwrap();

        assert_eq!(merger.flags_for(&g0).unwrap(), &[FLAG_ACTIVE]);
        assert_eq!(merger.flags_for(&g1).unwrap(), &[FLAG_DUPLICATE]);
        assert_eq!(merger.flags_for(&g2).unwrap(), &[FLAG_DUPLICATE]);
    }
}
