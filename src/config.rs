// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::CompressionType;
use std::path::PathBuf;

/// Compaction style of the tree
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum CompactionStyle {
    /// Score-driven leveled compaction (LCS)
    ///
    /// When a level reaches some threshold size, parts of it
    /// are merged into the next level.
    #[default]
    Leveled,

    /// Universal (tiered) compaction
    ///
    /// All tables live in level 0 as sorted runs, ordered newest to oldest;
    /// runs of similar size are merged together.
    Universal,

    /// FIFO compaction
    ///
    /// Keeps the data set under a size cap by deleting the oldest tables.
    /// No merging ever happens.
    Fifo,

    /// No automatic compaction
    None,
}

/// When to stop adding tables to a universal compaction run
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum StopStyle {
    /// Admit the next table while it is similar in size
    /// to the previously admitted one
    SimilarSize,

    /// Admit the next table while it is not larger than
    /// everything admitted so far
    #[default]
    TotalSize,
}

/// Sub-options of universal compaction
#[derive(Clone, Debug)]
pub struct UniversalCompactionOptions {
    /// Percentage by which table sizes may differ while still being
    /// considered "similar enough" to merge
    ///
    /// Default = 1
    pub size_ratio: u64,

    /// Minimum number of tables in a merge run
    ///
    /// Values below 2 are treated as 2.
    ///
    /// Default = 2
    pub min_merge_width: usize,

    /// Maximum number of tables in a merge run
    ///
    /// Default = unlimited
    pub max_merge_width: usize,

    /// Once the bytes newer than the oldest table exceed this percentage of
    /// the oldest table's size, a full compaction is triggered
    ///
    /// Default = 200
    pub max_size_amplification_percent: u64,

    /// Disable output compression when at least this percentage of the
    /// level's bytes is older than the picked run
    ///
    /// `None` compresses unconditionally.
    ///
    /// Default = None
    pub compression_size_percent: Option<u8>,

    /// When to stop adding tables to a run
    ///
    /// Default = [`StopStyle::TotalSize`]
    pub stop_style: StopStyle,
}

impl Default for UniversalCompactionOptions {
    fn default() -> Self {
        Self {
            size_ratio: 1,
            min_merge_width: 2,
            max_merge_width: usize::MAX,
            max_size_amplification_percent: 200,
            compression_size_percent: None,
            stop_style: StopStyle::TotalSize,
        }
    }
}

/// Sub-options of FIFO compaction
#[derive(Clone, Debug)]
pub struct FifoCompactionOptions {
    /// Data set size limit in bytes
    ///
    /// Default = 1 GiB
    pub max_table_files_size: u64,
}

impl Default for FifoCompactionOptions {
    fn default() -> Self {
        Self {
            max_table_files_size: /* 1 GiB */ 1_024 * 1_024 * 1_024,
        }
    }
}

/// A storage path tables can be written to, with a byte budget
///
/// Buckets are filled in order; universal compaction places its output in
/// the first bucket whose remaining budget can hold it and its projected
/// successors.
#[derive(Clone, Debug)]
pub struct DataPath {
    /// Folder path
    pub path: PathBuf,

    /// How many bytes this path is meant to hold
    pub target_size: u64,
}

impl DataPath {
    /// Creates a new data path with the given byte budget.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, target_size: u64) -> Self {
        Self {
            path: path.into(),
            target_size,
        }
    }
}

/// Immutable picker configuration
#[derive(Clone, Debug)]
pub struct Options {
    /// Compaction style to use
    pub compaction_style: CompactionStyle,

    /// Amount of levels of the LSM tree (depth of tree)
    pub level_count: usize,

    /// Compression to use for output tables when no per-level
    /// compression is configured
    pub compression: CompressionType,

    /// Compression per level; out-of-range levels use the nearest
    /// configured entry
    ///
    /// Empty means: always use [`Options::compression`].
    pub compression_per_level: Vec<CompressionType>,

    /// Universal compaction sub-options
    pub universal: UniversalCompactionOptions,

    /// FIFO compaction sub-options
    pub fifo: FifoCompactionOptions,

    /// Storage paths with byte budgets
    ///
    /// Empty means: everything goes to path 0.
    pub data_paths: Vec<DataPath>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            compaction_style: CompactionStyle::Leveled,
            level_count: 7,
            compression: CompressionType::Lz4,
            compression_per_level: Vec::new(),
            universal: UniversalCompactionOptions::default(),
            fifo: FifoCompactionOptions::default(),
            data_paths: Vec::new(),
        }
    }
}

impl Options {
    /// Sets the compaction style.
    #[must_use]
    pub fn with_compaction_style(mut self, style: CompactionStyle) -> Self {
        self.compaction_style = style;
        self
    }

    /// Sets the level count.
    ///
    /// # Panics
    ///
    /// Panics if `n` is 0.
    #[must_use]
    pub fn with_level_count(mut self, n: usize) -> Self {
        assert!(n > 0, "level count may not be 0");
        self.level_count = n;
        self
    }

    /// Sets the default compression type.
    #[must_use]
    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Sets a compression type per level.
    #[must_use]
    pub fn with_compression_per_level(mut self, compression: Vec<CompressionType>) -> Self {
        self.compression_per_level = compression;
        self
    }

    /// Sets the universal compaction sub-options.
    #[must_use]
    pub fn with_universal_options(mut self, universal: UniversalCompactionOptions) -> Self {
        self.universal = universal;
        self
    }

    /// Sets the FIFO compaction sub-options.
    #[must_use]
    pub fn with_fifo_options(mut self, fifo: FifoCompactionOptions) -> Self {
        self.fifo = fifo;
        self
    }

    /// Sets the storage paths.
    #[must_use]
    pub fn with_data_paths(mut self, paths: Vec<DataPath>) -> Self {
        self.data_paths = paths;
        self
    }
}

/// Mutable picker configuration
///
/// These settings may change between picker invocations (the engine may
/// apply user option changes at runtime), so they are passed into every
/// entry point instead of being captured at construction.
#[derive(Clone, Debug)]
pub struct MutableOptions {
    /// Target size of tables written to level 1
    ///
    /// Default = 2 MiB
    pub target_table_size_base: u64,

    /// Growth factor of the table target size per level
    ///
    /// Default = 1
    pub target_table_size_multiplier: u64,

    /// Byte budget of level 1
    ///
    /// Default = 10 MiB
    pub max_bytes_for_level_base: u64,

    /// Growth factor of the level byte budget per level
    ///
    /// Default = 10
    pub max_bytes_for_level_multiplier: u64,

    /// When the number of tables in level 0 reaches this threshold,
    /// a compaction into level 1 is triggered
    ///
    /// Default = 4
    pub level0_table_count_trigger: usize,

    /// Bounds how many grandparent bytes a compaction output may overlap,
    /// as a multiple of the level's table target size
    ///
    /// Default = 10
    pub max_grandparent_overlap_factor: u64,

    /// Bounds opportunistic widening of a compaction's source set,
    /// as a multiple of the level's table target size
    ///
    /// Default = 25
    pub expanded_compaction_factor: u64,

    /// Bounds how many bytes a user-requested range compaction may pick up
    /// in one chunk, as a multiple of the level's table target size
    ///
    /// Default = 1
    pub source_compaction_factor: u64,
}

impl Default for MutableOptions {
    fn default() -> Self {
        Self {
            target_table_size_base: /* 2 MiB */ 2 * 1_024 * 1_024,
            target_table_size_multiplier: 1,
            max_bytes_for_level_base: /* 10 MiB */ 10 * 1_024 * 1_024,
            max_bytes_for_level_multiplier: 10,
            level0_table_count_trigger: 4,
            max_grandparent_overlap_factor: 10,
            expanded_compaction_factor: 25,
            source_compaction_factor: 1,
        }
    }
}

impl MutableOptions {
    /// Sets the table target size of level 1.
    #[must_use]
    pub fn with_target_table_size_base(mut self, bytes: u64) -> Self {
        self.target_table_size_base = bytes;
        self
    }

    /// Sets the byte budget of level 1.
    #[must_use]
    pub fn with_max_bytes_for_level_base(mut self, bytes: u64) -> Self {
        self.max_bytes_for_level_base = bytes;
        self
    }

    /// Sets the level 0 table count compaction trigger.
    #[must_use]
    pub fn with_level0_table_count_trigger(mut self, n: usize) -> Self {
        self.level0_table_count_trigger = n;
        self
    }

    /// Sets the source compaction factor.
    #[must_use]
    pub fn with_source_compaction_factor(mut self, factor: u64) -> Self {
        self.source_compaction_factor = factor;
        self
    }

    /// Maximum size of a table written to the given level.
    #[must_use]
    pub fn max_table_size_for_level(&self, level: usize) -> u64 {
        let mut size = self.target_table_size_base;

        for _ in 1..level {
            size = size.saturating_mul(self.target_table_size_multiplier);
        }

        size
    }

    /// Byte budget of the given level; levels 0 and 1 share the base budget.
    #[must_use]
    pub fn max_bytes_for_level(&self, level: usize) -> u64 {
        let mut bytes = self.max_bytes_for_level_base;

        for _ in 1..level {
            bytes = bytes.saturating_mul(self.max_bytes_for_level_multiplier);
        }

        bytes
    }

    /// Maximum number of grandparent bytes a compaction picked at the given
    /// level may overlap before the executor must cut a new output table.
    #[must_use]
    pub fn max_grandparent_overlap_bytes(&self, level: usize) -> u64 {
        self.max_table_size_for_level(level)
            .saturating_mul(self.max_grandparent_overlap_factor)
    }

    /// Byte cap for opportunistically widened compaction inputs at the
    /// given level.
    #[must_use]
    pub fn expanded_compaction_byte_size_limit(&self, level: usize) -> u64 {
        self.max_table_size_for_level(level)
            .saturating_mul(self.expanded_compaction_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::MutableOptions;
    use test_log::test;

    #[test]
    fn level_size_derivations() {
        let opts = MutableOptions {
            target_table_size_base: 10,
            target_table_size_multiplier: 2,
            max_bytes_for_level_base: 100,
            max_bytes_for_level_multiplier: 10,
            ..Default::default()
        };

        assert_eq!(10, opts.max_table_size_for_level(0));
        assert_eq!(10, opts.max_table_size_for_level(1));
        assert_eq!(20, opts.max_table_size_for_level(2));
        assert_eq!(40, opts.max_table_size_for_level(3));

        assert_eq!(100, opts.max_bytes_for_level(1));
        assert_eq!(1_000, opts.max_bytes_for_level(2));
        assert_eq!(10_000, opts.max_bytes_for_level(3));

        assert_eq!(10 * 10, opts.max_grandparent_overlap_bytes(1));
        assert_eq!(20 * 25, opts.expanded_compaction_byte_size_limit(2));
    }
}
