use std::path::{Path, PathBuf};

use banddedupe::{BandParams, CrossGroupMerger, GroupDeduplicator, MinHashWriter};

/// Writes a single-file MinHash corpus where each document's every band/row
/// value is the same constant, so two documents compare equal iff their
/// constants match.
pub fn write_minhash(dir: &Path, name: &str, docs: &[u64], params: BandParams) -> PathBuf {
    let path = dir.join(format!("{name}.mh"));
    let mut w =
        MinHashWriter::create(&path, params.num_hash_values, params.begin, params.end, params.bytes_per_hash)
            .unwrap();
    let total = params.bands() as usize * params.num_hash_values as usize;
    for &v in docs {
        w.put(&vec![v; total]).unwrap();
    }
    w.close().unwrap();
    path
}

/// Runs single-group dedup end to end over one MinHash file and returns the
/// group's basename (flag file and index files live alongside it).
pub fn dedup_group(dir: &Path, group: u16, name: &str, docs: &[u64], params: BandParams, reverse: bool) -> PathBuf {
    let mh_path = write_minhash(dir, name, docs, params);
    let mut dedup = GroupDeduplicator::new(group).with_trim(true);
    dedup.append_file(&mh_path);
    dedup.initialize().unwrap();
    let basename = dir.join(name);
    dedup.run(&basename, reverse).unwrap();
    dedup.save_flag(&basename).unwrap();
    dedup.save_source_list(&basename).unwrap();
    basename
}

/// Merges a set of already-deduplicated group basenames and returns the
/// merger so callers can inspect `flags_for`.
pub fn merge_groups(basenames: &[PathBuf], params: BandParams, reverse: bool) -> CrossGroupMerger {
    let mut merger = CrossGroupMerger::new(true);
    for b in basenames {
        merger.append_source(b).unwrap();
    }
    merger.run(params.begin, params.end, reverse).unwrap();
    merger.save_flags().unwrap();
    merger
}
