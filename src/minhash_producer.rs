//! Component G: the first-party MinHash producer.
//!
//! Streams JSONL records, extracts a text field, shingles it into
//! Unicode-codepoint n-grams, and computes one MinHash value per LSH seed by
//! taking the minimum hash (over all of the document's n-grams) under that
//! seed's independently-seeded `ahash` hasher — the same seeded-hasher idiom
//! this crate's sharding code already uses for deterministic partitioning.
//!
//! Documents shorter than the n-gram width, and lines that fail to parse as
//! JSON, both produce the sentinel all-`0xFF` bucket (`u64::MAX`, which
//! big-endian-encodes to all-`0xFF` bytes regardless of `bytes_per_hash`).
//! A parse failure additionally appends a line to `<path>.err` and does not
//! abort the run — every input line still produces exactly one output item.

use std::fs::File;
use std::hash::{BuildHasher, Hash, Hasher};
use std::io::{BufRead, Write};
use std::path::Path;

use ahash::RandomState;
use serde_json::Value;

use crate::config::ProducerConfig;
use crate::error::{DedupeError, DedupeResult};
use crate::minhash_file::MinHashWriter;
use crate::ngram::{char_vec, encode_window, ngram_windows};
use crate::progress::ProgressScope;

const SENTINEL: u64 = u64::MAX;

#[derive(Clone, Copy, Debug, Default, serde::Serialize)]
pub struct ProducerReport {
    pub num_items: u64,
    pub num_parse_errors: u64,
}

/// Derives four independent 64-bit seeds for `ahash::RandomState::with_seeds`
/// from one global seed index, via a splitmix64-style mix so that nearby
/// seed indices don't produce correlated hashers.
fn derive_seeds(seed_index: u64) -> (u64, u64, u64, u64) {
    fn mix(mut x: u64) -> u64 {
        x ^= x >> 30;
        x = x.wrapping_mul(0xbf58476d1ce4e5b9);
        x ^= x >> 27;
        x = x.wrapping_mul(0x94d049bb133111eb);
        x ^= x >> 31;
        x
    }
    let base = seed_index.wrapping_mul(0x9E3779B97F4A7C15).wrapping_add(1);
    (mix(base), mix(base ^ 0x1), mix(base ^ 0x2), mix(base ^ 0x3))
}

fn extract_text<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get(field).and_then(Value::as_str)
}

/// Computes one document's full band-major hash vector (length
/// `bands * num_hash_values`) for `text`, or the all-sentinel vector if
/// `text` is shorter than the n-gram width or has no n-grams at all.
fn minhash_document(text: &str, cfg: &ProducerConfig) -> Vec<u64> {
    let bands = cfg.bands.bands();
    let r = cfg.bands.num_hash_values as usize;
    let total = bands as usize * r;

    let chars = char_vec(text);
    if chars.len() < cfg.ngram_size {
        return vec![SENTINEL; total];
    }
    let encoded_grams: Vec<Vec<u8>> = ngram_windows(&chars, cfg.ngram_size).map(encode_window).collect();
    if encoded_grams.is_empty() {
        return vec![SENTINEL; total];
    }

    let mut out = Vec::with_capacity(total);
    for band_idx in 0..bands {
        let b = cfg.bands.begin + band_idx;
        for k in 0..r {
            let seed_index = b as u64 * r as u64 + k as u64;
            let (s0, s1, s2, s3) = derive_seeds(seed_index);
            let state = RandomState::with_seeds(s0, s1, s2, s3);
            let min = encoded_grams
                .iter()
                .map(|g| {
                    let mut h = state.build_hasher();
                    g.hash(&mut h);
                    h.finish()
                })
                .min()
                .unwrap_or(SENTINEL);
            out.push(min);
        }
    }
    out
}

/// Streams `input` (one JSON object per line) into a MinHash file at `basename`.
pub fn run_producer(cfg: &ProducerConfig, mut input: impl BufRead, basename: &Path) -> DedupeResult<ProducerReport> {
    let mut writer = MinHashWriter::create(
        basename,
        cfg.bands.num_hash_values,
        cfg.bands.begin,
        cfg.bands.end,
        cfg.bands.bytes_per_hash,
    )?;

    let err_path = {
        let mut s = basename.as_os_str().to_os_string();
        s.push(".err");
        std::path::PathBuf::from(s)
    };
    let mut err_file: Option<File> = None;

    let progress = if cfg.quiet { None } else { Some(ProgressScope::count("minhash", 0)) };

    let mut line = String::new();
    let mut line_no: u64 = 0;
    let mut num_parse_errors = 0u64;
    loop {
        line.clear();
        let n = input.read_line(&mut line).map_err(|e| DedupeError::io(basename, e))?;
        if n == 0 {
            break;
        }
        line_no += 1;
        let trimmed = line.trim_end_matches(['\n', '\r']);

        let hashes = match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => match extract_text(&value, &cfg.text_field) {
                Some(text) => minhash_document(text, cfg),
                None => vec![SENTINEL; cfg.bands.bands() as usize * cfg.bands.num_hash_values as usize],
            },
            Err(e) => {
                num_parse_errors += 1;
                let f = err_file.get_or_insert_with(|| {
                    File::create(&err_path).unwrap_or_else(|e| panic!("cannot create {err_path:?}: {e}"))
                });
                let _ = writeln!(f, "{line_no}\t{e}");
                vec![SENTINEL; cfg.bands.bands() as usize * cfg.bands.num_hash_values as usize]
            }
        };
        writer.put(&hashes)?;
        if let Some(p) = &progress {
            p.inc_items(1);
        }
    }
    if let Some(p) = progress {
        p.finish("done");
    }

    let num_items = writer.close()?;
    Ok(ProducerReport { num_items, num_parse_errors })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minhash_file::MinHashReader;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn identical_text_yields_identical_bucket() {
        let dir = tempdir().unwrap();
        let basename = dir.path().join("out");
        let cfg = ProducerConfig::default().with_bands(0, 2).with_num_hash_values(3).with_ngram_size(3);
        let input = "{\"text\":\"the quick brown fox\"}\n{\"text\":\"the quick brown fox\"}\n{\"text\":\"totally different sentence here\"}\n";
        let report = run_producer(&cfg, Cursor::new(input), &basename).unwrap();
        assert_eq!(report.num_items, 3);

        let mut reader = MinHashReader::open(&basename).unwrap();
        let header = reader.header();
        let mut buf = vec![0u8; 3 * header.bytes_per_bucket()];
        reader.read_bucket_array(&mut buf, 0).unwrap();
        let bucket_bytes = header.bytes_per_bucket();
        let b0 = &buf[0..bucket_bytes];
        let b1 = &buf[bucket_bytes..2 * bucket_bytes];
        let b2 = &buf[2 * bucket_bytes..3 * bucket_bytes];
        assert_eq!(b0, b1);
        assert_ne!(b0, b2);
    }

    #[test]
    fn short_text_is_sentinel_bucket() {
        let dir = tempdir().unwrap();
        let basename = dir.path().join("out");
        let cfg = ProducerConfig::default().with_bands(0, 1).with_num_hash_values(2).with_ngram_size(5);
        let input = "{\"text\":\"hi\"}\n";
        run_producer(&cfg, Cursor::new(input), &basename).unwrap();

        let mut reader = MinHashReader::open(&basename).unwrap();
        let header = reader.header();
        let mut buf = vec![0xAAu8; header.bytes_per_bucket()];
        reader.read_bucket_array(&mut buf, 0).unwrap();
        assert!(buf.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn malformed_json_line_recovers_and_logs() {
        let dir = tempdir().unwrap();
        let basename = dir.path().join("out");
        let cfg = ProducerConfig::default().with_bands(0, 1).with_num_hash_values(2).with_ngram_size(3);
        let input = "not json\n{\"text\":\"valid one here\"}\n";
        let report = run_producer(&cfg, Cursor::new(input), &basename).unwrap();
        assert_eq!(report.num_items, 2);
        assert_eq!(report.num_parse_errors, 1);

        let err_path = dir.path().join("out.err");
        assert!(err_path.exists());
    }
}
