//! Builder-style configuration for the three pipeline stages, in the same
//! `Default` + chainable `with_*` style the rest of this crate's config uses.

/// LSH band layout shared by the producer, the group deduplicator, and the merger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BandParams {
    pub begin: u32,
    pub end: u32,
    pub num_hash_values: u16,
    pub bytes_per_hash: u16,
}

impl BandParams {
    pub fn bands(&self) -> u32 {
        self.end - self.begin
    }

    pub fn bytes_per_bucket(&self) -> usize {
        self.num_hash_values as usize * self.bytes_per_hash as usize
    }
}

impl Default for BandParams {
    fn default() -> Self {
        Self { begin: 0, end: 40, num_hash_values: 20, bytes_per_hash: 8 }
    }
}

pub const NUM_SPLITS: u32 = 256;
pub const SECTOR_SIZE: u32 = 512;

/// Options for the `minhash` producer binary.
#[derive(Clone, Debug)]
pub struct ProducerConfig {
    pub bands: BandParams,
    pub ngram_size: usize,
    pub text_field: String,
    pub quiet: bool,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            bands: BandParams::default(),
            ngram_size: 5,
            text_field: "text".to_string(),
            quiet: false,
        }
    }
}

impl ProducerConfig {
    pub fn with_ngram_size(mut self, n: usize) -> Self {
        self.ngram_size = n.max(1);
        self
    }
    pub fn with_bands(mut self, begin: u32, end: u32) -> Self {
        self.bands.begin = begin;
        self.bands.end = end;
        self
    }
    pub fn with_num_hash_values(mut self, r: u16) -> Self {
        self.bands.num_hash_values = r;
        self
    }
    pub fn with_text_field(mut self, field: impl Into<String>) -> Self {
        self.text_field = field.into();
        self
    }
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }
}

/// Options for the single-group `dedup` binary.
#[derive(Clone, Debug)]
pub struct DedupeConfig {
    pub reverse: bool,
    pub trim: bool,
    pub console_level: String,
    pub file_level: String,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            reverse: false,
            trim: false,
            console_level: "info".to_string(),
            file_level: "info".to_string(),
        }
    }
}

impl DedupeConfig {
    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }
    pub fn with_trim(mut self, trim: bool) -> Self {
        self.trim = trim;
        self
    }
    pub fn with_console_level(mut self, level: impl Into<String>) -> Self {
        self.console_level = level.into();
        self
    }
    pub fn with_file_level(mut self, level: impl Into<String>) -> Self {
        self.file_level = level.into();
        self
    }
}

/// Options for the cross-group `merge` binary.
#[derive(Clone, Debug)]
pub struct MergeConfig {
    pub reverse: bool,
    pub begin: u32,
    pub end: u32,
    pub console_level: String,
    pub file_level: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            reverse: false,
            begin: 0,
            end: 40,
            console_level: "info".to_string(),
            file_level: "info".to_string(),
        }
    }
}

impl MergeConfig {
    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }
    pub fn with_range(mut self, begin: u32, end: u32) -> Self {
        self.begin = begin;
        self.end = end;
        self
    }
    pub fn with_console_level(mut self, level: impl Into<String>) -> Self {
        self.console_level = level.into();
        self
    }
    pub fn with_file_level(mut self, level: impl Into<String>) -> Self {
        self.file_level = level.into();
        self
    }
}
