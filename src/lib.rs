mod config;
mod element;
mod error;
mod flag_file;
mod group_dedup;
mod index_file;
mod merge;
mod minhash_file;
mod minhash_producer;
mod ngram;
mod progress;
mod util;

pub use crate::config::{BandParams, DedupeConfig, MergeConfig, ProducerConfig, NUM_SPLITS, SECTOR_SIZE};
pub use crate::error::{DedupeError, DedupeResult};

pub use crate::flag_file::{
    dup_merge_path, dup_path, flag_load, flag_save, new_active_flags, promote_local_duplicates, FLAG_ACTIVE,
    FLAG_DUPLICATE, FLAG_DUPLICATE_LOCAL,
};

pub use crate::minhash_file::{MinHashHeader, MinHashReader, MinHashWriter};
pub use crate::index_file::{index_path, unpack_group, unpack_ordinal, IndexHeader, IndexReader, IndexWriter};
pub use crate::element::{BucketView, Element};

pub use crate::group_dedup::{BandReport, GroupDeduplicator};
pub use crate::merge::{CrossGroupMerger, MergeBandReport};
pub use crate::minhash_producer::{run_producer, ProducerReport};

pub use crate::progress::{make_count_progress, make_progress_bar_labeled, set_global_multiprogress, ProgressScope};
pub use crate::util::{
    create_with_backoff, init_tracing_once, init_tracing_with_file, open_with_backoff, remove_with_backoff,
    replace_file_atomic_backoff,
};
