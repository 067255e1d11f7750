// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    key_range::KeyRange,
    table::{aggregate_key_range, TableMeta},
    version::Version,
    CompressionType,
};
use std::sync::Arc;

/// The tables a compaction consumes at one level
#[derive(Clone)]
pub struct CompactionInputFiles {
    /// Level the tables live in
    pub level: usize,

    /// Tables, in level order
    pub tables: Vec<Arc<TableMeta>>,
}

impl CompactionInputFiles {
    pub(crate) fn empty(level: usize) -> Self {
        Self {
            level,
            tables: Vec::new(),
        }
    }

    /// Returns `true` if no tables are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Returns the number of tables held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }
}

/// A compaction chosen by a picker, to be carried out by the engine's
/// merge executor
///
/// A plan is an inert, owned descriptor: nothing happens until the executor
/// merges (or, for a deletion compaction, unlinks) its input tables. The
/// caller owns the plan once a picker returns it and must eventually hand it
/// back through
/// [`CompactionPicker::release_compaction_tables`](crate::CompactionPicker::release_compaction_tables),
/// which clears the `being_compacted` marks on every listed table. Ownership
/// makes releasing twice unrepresentable.
pub struct CompactionPlan {
    pub(crate) id: u64,

    input_version: Arc<Version>,

    level: usize,
    output_level: usize,

    // inputs[0] holds the source level tables, inputs[1] the overlapping
    // tables of the output level; the pluggable picker may span more levels
    pub(crate) inputs: Vec<CompactionInputFiles>,

    pub(crate) grandparents: Vec<Arc<TableMeta>>,

    max_output_table_size: u64,
    max_grandparent_overlap_bytes: u64,

    pub(crate) output_path_id: u32,
    compression: CompressionType,

    pub(crate) score: f64,

    // Position of the seed table within its level and start position of the
    // parent slice; carried so follow-up overlap queries stay logarithmic
    pub(crate) base_index: Option<usize>,
    pub(crate) parent_index: Option<usize>,

    pub(crate) bottommost_level: bool,
    pub(crate) is_full_compaction: bool,
    pub(crate) is_manual_compaction: bool,
    pub(crate) is_deletion_compaction: bool,
}

impl CompactionPlan {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: u64,
        input_version: Arc<Version>,
        level: usize,
        output_level: usize,
        max_output_table_size: u64,
        max_grandparent_overlap_bytes: u64,
        output_path_id: u32,
        compression: CompressionType,
    ) -> Self {
        Self {
            id,
            input_version,
            level,
            output_level,
            inputs: vec![
                CompactionInputFiles::empty(level),
                CompactionInputFiles::empty(output_level),
            ],
            grandparents: Vec::new(),
            max_output_table_size,
            max_grandparent_overlap_bytes,
            output_path_id,
            compression,
            score: 0.0,
            base_index: None,
            parent_index: None,
            bottommost_level: false,
            is_full_compaction: false,
            is_manual_compaction: false,
            is_deletion_compaction: false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_inputs(
        id: u64,
        input_version: Arc<Version>,
        inputs: Vec<CompactionInputFiles>,
        output_level: usize,
        max_grandparent_overlap_bytes: u64,
        max_output_table_size: u64,
        compression: CompressionType,
        is_deletion_compaction: bool,
    ) -> Self {
        assert!(!inputs.is_empty(), "compaction plan needs input tables");

        let level = inputs.first().map_or(0, |i| i.level);

        Self {
            id,
            input_version,
            level,
            output_level,
            inputs,
            grandparents: Vec::new(),
            max_output_table_size,
            max_grandparent_overlap_bytes,
            output_path_id: 0,
            compression,
            score: 0.0,
            base_index: None,
            parent_index: None,
            bottommost_level: false,
            is_full_compaction: false,
            is_manual_compaction: false,
            is_deletion_compaction,
        }
    }

    /// Returns the source level.
    #[must_use]
    pub fn level(&self) -> usize {
        self.level
    }

    /// Returns the level the merged output goes into.
    #[must_use]
    pub fn output_level(&self) -> usize {
        self.output_level
    }

    /// Returns the version this plan was picked from.
    #[must_use]
    pub fn input_version(&self) -> &Arc<Version> {
        &self.input_version
    }

    /// Returns the input table lists, one per participating level.
    #[must_use]
    pub fn inputs(&self) -> &[CompactionInputFiles] {
        &self.inputs
    }

    /// Returns the tables consumed at the `nth` participating level
    /// (0 = source level).
    ///
    /// # Panics
    ///
    /// Panics if `nth` is out of bounds.
    #[must_use]
    pub fn input_tables(&self, nth: usize) -> &[Arc<TableMeta>] {
        &self
            .inputs
            .get(nth)
            .unwrap_or_else(|| panic!("no compaction input list #{nth}"))
            .tables
    }

    /// Returns the tables at the output level's grandparent level
    /// (output level + 2) overlapping the plan's key range.
    ///
    /// The executor starts a new output table whenever the current one
    /// overlaps too many grandparent bytes, bounding future write
    /// amplification.
    #[must_use]
    pub fn grandparents(&self) -> &[Arc<TableMeta>] {
        &self.grandparents
    }

    /// Returns the target size for output tables.
    #[must_use]
    pub fn max_output_table_size(&self) -> u64 {
        self.max_output_table_size
    }

    /// Returns the grandparent overlap cap in bytes.
    #[must_use]
    pub fn max_grandparent_overlap_bytes(&self) -> u64 {
        self.max_grandparent_overlap_bytes
    }

    /// Returns the storage path the output tables go to.
    #[must_use]
    pub fn output_path_id(&self) -> u32 {
        self.output_path_id
    }

    /// Returns the compression to apply to output tables.
    #[must_use]
    pub fn compression(&self) -> CompressionType {
        self.compression
    }

    /// Returns the compaction score of the source level at pick time.
    #[must_use]
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Returns `true` if this plan was requested by the user
    /// rather than triggered by scoring.
    #[must_use]
    pub fn is_manual_compaction(&self) -> bool {
        self.is_manual_compaction
    }

    /// Returns `true` if the plan consumes every table of the tree.
    #[must_use]
    pub fn is_full_compaction(&self) -> bool {
        self.is_full_compaction
    }

    /// Returns `true` if the output lands in the bottommost populated level,
    /// meaning tombstones can be dropped for good.
    #[must_use]
    pub fn is_bottommost_level(&self) -> bool {
        self.bottommost_level
    }

    /// Returns `true` if the input tables are deleted instead of merged
    /// (FIFO eviction).
    #[must_use]
    pub fn is_deletion_compaction(&self) -> bool {
        self.is_deletion_compaction
    }

    /// Returns the key range of the `nth` input list.
    ///
    /// # Panics
    ///
    /// Panics if the list is empty.
    #[must_use]
    pub fn input_range(&self, nth: usize) -> KeyRange {
        aggregate_key_range(self.input_tables(nth))
    }

    /// Returns the key range spanning the source and output level inputs.
    pub(crate) fn combined_range(&self) -> KeyRange {
        aggregate_key_range(
            self.inputs
                .iter()
                .flat_map(|input| input.tables.iter()),
        )
    }

    pub(crate) fn mark_tables_being_compacted(&self, flag: bool) {
        for input in &self.inputs {
            for table in &input.tables {
                table.set_being_compacted(flag);
            }
        }
    }

    // A failed compaction rewinds the by-size walk, so the next pick
    // reconsiders the tables this plan had claimed.
    pub(crate) fn reset_next_compaction_index(&self) {
        self.input_version
            .set_next_compaction_index(self.level, 0);
    }
}

impl std::fmt::Debug for CompactionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CompactionPlan(L{}->L{}, {} tables{}{})",
            self.level,
            self.output_level,
            self.inputs.iter().map(CompactionInputFiles::len).sum::<usize>(),
            if self.is_manual_compaction { ", manual" } else { "" },
            if self.is_deletion_compaction { ", deletion" } else { "" },
        )
    }
}
