// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    key::InternalKey,
    table::{total_compensated_size, TableMeta},
    MutableOptions,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// An ordered run of tables forming one level of the tree
///
/// Level 0 is ordered newest to oldest and may contain overlapping key
/// ranges; levels 1 and up are ordered by smallest key and are disjoint.
pub struct Level(Vec<Arc<TableMeta>>);

impl std::ops::Deref for Level {
    type Target = [Arc<TableMeta>];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Level {
    /// Gets the level size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.iter().map(|t| t.file_size).sum()
    }

    /// Gets the level size in compensated bytes.
    #[must_use]
    pub fn compensated_size(&self) -> u64 {
        total_compensated_size(self.iter())
    }
}

/// An immutable snapshot of the tree's table layout
///
/// A new version is published by the engine whenever the manifest changes;
/// the picker never mutates the layout, only the per-table
/// `being_compacted` flags and the per-level iteration cursors, and only
/// under the engine mutex.
pub struct Version {
    levels: Vec<Level>,

    // Per level: table positions, sorted descending by compensated size.
    // Drives round-robin candidate selection in the leveled picker.
    files_by_size: Vec<Vec<usize>>,

    // Per level: position into `files_by_size` where the next candidate
    // walk starts. Rewound to 0 when a compaction fails, so the failed
    // candidate is reconsidered promptly.
    next_table_to_compact_by_size: Vec<AtomicUsize>,
}

impl Version {
    /// Creates a version from per-level table lists.
    ///
    /// Level 0 is reordered newest to oldest (by largest sequence number);
    /// deeper levels are sorted by smallest key.
    #[must_use]
    pub fn new(levels: Vec<Vec<Arc<TableMeta>>>) -> Self {
        let levels: Vec<_> = levels
            .into_iter()
            .enumerate()
            .map(|(idx, mut tables)| {
                if idx == 0 {
                    tables.sort_by_key(|t| std::cmp::Reverse(t.largest_seqno));
                } else {
                    tables.sort_by(|a, b| a.smallest.cmp(&b.smallest));
                }
                Level(tables)
            })
            .collect();

        debug_assert!(
            {
                let mut seen = crate::HashSet::default();
                levels
                    .iter()
                    .flat_map(|level| level.iter())
                    .all(|table| seen.insert(table.id))
            },
            "table numbers must be unique across the version",
        );

        let files_by_size = levels
            .iter()
            .map(|level| {
                let mut positions: Vec<usize> = (0..level.len()).collect();
                positions
                    .sort_by_key(|&pos| std::cmp::Reverse(level.0[pos].compensated_file_size));
                positions
            })
            .collect();

        let next_table_to_compact_by_size =
            levels.iter().map(|_| AtomicUsize::new(0)).collect();

        Self {
            levels,
            files_by_size,
            next_table_to_compact_by_size,
        }
    }

    /// Returns the number of levels.
    #[must_use]
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Returns the tables of the given level.
    ///
    /// # Panics
    ///
    /// Panics if the level does not exist; that means the picker and the
    /// manifest disagree about the tree shape, which is unrecoverable.
    #[must_use]
    pub fn level(&self, level: usize) -> &Level {
        assert!(level < self.levels.len(), "level {level} does not exist");

        &self.levels[level]
    }

    /// Looks up a table by number, returning its level and position.
    #[must_use]
    pub fn find_table(&self, id: crate::TableId) -> Option<(usize, usize)> {
        for (level_idx, level) in self.levels.iter().enumerate() {
            if let Some(pos) = level.iter().position(|t| t.id == id) {
                return Some((level_idx, pos));
            }
        }
        None
    }

    pub(crate) fn files_by_size(&self, level: usize) -> &[usize] {
        self.assert_level(level);

        &self.files_by_size[level]
    }

    pub(crate) fn next_compaction_index(&self, level: usize) -> usize {
        self.assert_level(level);

        self.next_table_to_compact_by_size[level].load(Ordering::Relaxed)
    }

    pub(crate) fn set_next_compaction_index(&self, level: usize, index: usize) {
        self.assert_level(level);

        self.next_table_to_compact_by_size[level].store(index, Ordering::Relaxed);
    }

    fn assert_level(&self, level: usize) {
        assert!(level < self.levels.len(), "level {level} does not exist");
    }

    /// Collects all tables at `level` whose user-key range touches
    /// `[begin, end]` (both inclusive, `None` = unbounded).
    ///
    /// For level 0, an admitted table may widen the range beyond the query
    /// bounds; the scan then restarts with the widened range until the
    /// result set stabilizes, because level 0 tables may overlap each other.
    ///
    /// For deeper levels, a contiguous slice is located by binary search;
    /// `hint` is a lower bound for the search and the returned hint is the
    /// slice's start position, to be fed into the next query.
    #[must_use]
    pub fn overlapping_tables(
        &self,
        level: usize,
        begin: Option<&InternalKey>,
        end: Option<&InternalKey>,
        hint: Option<usize>,
    ) -> (Vec<Arc<TableMeta>>, Option<usize>) {
        let tables = &self.level(level).0;

        if level == 0 {
            return (
                Self::overlapping_tables_level0(tables, begin, end),
                None,
            );
        }

        let lo = match (hint, begin) {
            (Some(h), Some(b)) if h < tables.len() => {
                if tables[h].largest.user_key < b.user_key {
                    h
                } else {
                    0
                }
            }
            _ => 0,
        };

        let start = lo
            + tables[lo..].partition_point(|t| {
                begin.is_some_and(|b| t.largest.user_key < b.user_key)
            });

        let mut out = Vec::new();

        for table in &tables[start..] {
            if end.is_some_and(|e| table.smallest.user_key > e.user_key) {
                break;
            }
            out.push(table.clone());
        }

        (out, Some(start))
    }

    fn overlapping_tables_level0(
        tables: &[Arc<TableMeta>],
        begin: Option<&InternalKey>,
        end: Option<&InternalKey>,
    ) -> Vec<Arc<TableMeta>> {
        let mut user_begin = begin.map(|k| k.user_key.clone());
        let mut user_end = end.map(|k| k.user_key.clone());

        let mut out = Vec::new();
        let mut idx = 0;

        while idx < tables.len() {
            let table = &tables[idx];
            idx += 1;

            let before = user_begin
                .as_ref()
                .is_some_and(|b| table.largest.user_key < *b);
            let after = user_end
                .as_ref()
                .is_some_and(|e| table.smallest.user_key > *e);

            if before || after {
                continue;
            }

            out.push(table.clone());

            // An admitted table may stick out of the queried range; widen
            // and rescan, so transitively overlapping tables are found too
            let mut restart = false;

            if let Some(b) = &user_begin {
                if table.smallest.user_key < *b {
                    user_begin = Some(table.smallest.user_key.clone());
                    restart = true;
                }
            }

            if !restart {
                if let Some(e) = &user_end {
                    if table.largest.user_key > *e {
                        user_end = Some(table.largest.user_key.clone());
                        restart = true;
                    }
                }
            }

            if restart {
                out.clear();
                idx = 0;
            }
        }

        out
    }

    /// Returns `true` if widening a compaction's source set to `tables`
    /// would split a user key across the level boundary.
    ///
    /// `tables` must be a contiguous slice of the given level; the check
    /// compares its outer boundaries against the neighboring tables that
    /// would be left behind.
    ///
    /// # Panics
    ///
    /// Panics if a table is not present at the level.
    #[must_use]
    pub fn has_overlapping_user_key(&self, tables: &[Arc<TableMeta>], level: usize) -> bool {
        if tables.is_empty() || level == 0 {
            return false;
        }

        let level_tables = &self.level(level).0;

        let position = |id: crate::TableId| {
            level_tables
                .iter()
                .position(|t| t.id == id)
                .unwrap_or_else(|| panic!("table {id} is not part of level {level}"))
        };

        if let (Some(first), Some(last)) = (tables.first(), tables.last()) {
            let last_pos = position(last.id);

            if last_pos + 1 < level_tables.len()
                && level_tables[last_pos + 1].smallest.user_key == last.largest.user_key
            {
                return true;
            }

            let first_pos = position(first.id);

            if first_pos > 0
                && level_tables[first_pos - 1].largest.user_key == first.smallest.user_key
            {
                return true;
            }
        }

        false
    }

    /// Computes per-level compaction scores and returns the levels ranked
    /// by urgency (descending score, ties broken by lower level first).
    ///
    /// A score of 1.0 or above means the level wants compaction. Bytes that
    /// are input to running compactions do not count towards a level's
    /// size, so a level is not over-compacted while a job is in flight;
    /// this is why scores are computed at picker entry instead of being
    /// cached in the version.
    #[must_use]
    pub fn compaction_priority(
        &self,
        mutable: &MutableOptions,
        bytes_being_compacted: &[u64],
    ) -> Vec<(usize, f64)> {
        let considered_levels = self.levels.len().saturating_sub(1);
        let mut ranking = Vec::with_capacity(considered_levels);

        for (level_idx, level) in self.levels.iter().take(considered_levels).enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let score = if level_idx == 0 {
                let candidate_count = level
                    .iter()
                    .filter(|t| !t.is_being_compacted())
                    .count();

                candidate_count as f64 / mutable.level0_table_count_trigger.max(1) as f64
            } else {
                let in_flight = bytes_being_compacted.get(level_idx).copied().unwrap_or(0);
                let bytes = level.compensated_size().saturating_sub(in_flight);

                bytes as f64 / mutable.max_bytes_for_level(level_idx).max(1) as f64
            };

            ranking.push((level_idx, score));
        }

        // Stable sort keeps lower levels first on equal scores
        ranking.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        ranking
    }
}
