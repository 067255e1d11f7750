// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Contains the compaction pickers

pub mod fifo;
pub mod leveled;
pub mod pluggable;
pub mod universal;

use crate::{
    key::InternalKey,
    key_range::KeyRange,
    plan::{CompactionInputFiles, CompactionPlan},
    registry::CompactionRegistry,
    table::{aggregate_key_range, total_compensated_size, TableMeta},
    version::Version,
    CompactionStyle, CompressionType, Error, MutableOptions, Options, TableId, UserKey,
};
use std::{collections::BTreeSet, sync::Arc};

/// Trait for a compaction picker
///
/// Given an immutable [`Version`], a picker decides which tables to compact
/// next and wraps the decision in an owned [`CompactionPlan`]. Pickers never
/// perform I/O and never block.
///
/// All methods must be called under the engine mutex that also guards
/// version installation, so that the `being_compacted` marks and the
/// in-progress bookkeeping stay coherent with what concurrent picks see.
pub trait CompactionPicker {
    /// Gets the picker name.
    fn get_name(&self) -> &'static str;

    /// Returns the deepest level this picker will ever write to.
    fn max_output_level(&self) -> usize;

    /// Picks the next compaction, or `None` if there is nothing to do.
    ///
    /// Returned plans have their tables marked as being compacted and are
    /// remembered until released.
    fn pick_compaction(
        &mut self,
        mutable: &MutableOptions,
        version: &Arc<Version>,
    ) -> Option<CompactionPlan>;

    /// Plans a user-requested compaction of `[begin, end]` (both inclusive,
    /// `None` = unbounded) from `input_level` into `output_level`.
    ///
    /// Large ranges are compacted in chunks: when the gathered tables exceed
    /// the size budget, the plan is truncated and `compaction_end` receives
    /// the key to resume from; it is `None` once the whole range is covered.
    ///
    /// Returns `Ok(None)` if the range contains no tables or the picked set
    /// conflicts with a running compaction.
    #[allow(clippy::too_many_arguments)]
    fn compact_range(
        &mut self,
        mutable: &MutableOptions,
        version: &Arc<Version>,
        input_level: usize,
        output_level: usize,
        output_path_id: u32,
        begin: Option<&InternalKey>,
        end: Option<&InternalKey>,
        compaction_end: &mut Option<InternalKey>,
    ) -> crate::Result<Option<CompactionPlan>>;

    /// Releases a plan, clearing the `being_compacted` mark on every table
    /// it holds.
    ///
    /// If `status` is an error (the compaction failed or was canceled), the
    /// source level's iteration cursor is rewound, so the released tables
    /// are reconsidered by the next pick.
    fn release_compaction_tables(&mut self, plan: CompactionPlan, status: &crate::Result<()>);

    /// Returns how many compensated bytes of the given level are input to
    /// currently running compactions.
    fn size_being_compacted(&self, level: usize) -> u64;

    /// Expands an externally supplied table set to a closed, self-contained
    /// compaction input set, or refuses it.
    ///
    /// On success, `input_set` contains every table whose user-key range
    /// transitively overlaps the seed set, across all levels up to and
    /// including `output_level`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the seed set is empty, the output
    ///   level is out of bounds, or a table number is unknown
    /// - [`Error::Aborted`] if the expanded set overlaps a compaction that
    ///   is currently running
    fn sanitize_compaction_input_tables(
        &self,
        input_set: &mut BTreeSet<TableId>,
        version: &Version,
        output_level: usize,
    ) -> crate::Result<()> {
        sanitize_input_tables(version, input_set, output_level, self.max_output_level())
    }
}

/// Returns `true` if any of the given tables is input to a running compaction.
pub(crate) fn tables_in_compaction(tables: &[Arc<TableMeta>]) -> bool {
    tables.iter().any(|t| t.is_being_compacted())
}

/// Two user-key ranges overlap iff each one starts at or before the other
/// one ends. Both endpoint comparisons are spelled out, so nested ranges
/// classify correctly.
pub(crate) fn user_ranges_overlap(a: (&UserKey, &UserKey), b: (&UserKey, &UserKey)) -> bool {
    let (a_lo, a_hi) = a;
    let (b_lo, b_hi) = b;
    a_lo <= b_hi && b_lo <= a_hi
}

// State shared by all picker implementations: the immutable options, the
// per-level in-progress bookkeeping, and the plan id counter.
pub(crate) struct PickerCore {
    pub(crate) opts: Arc<Options>,
    pub(crate) registry: CompactionRegistry,
    next_plan_id: u64,
}

impl PickerCore {
    pub(crate) fn new(opts: Arc<Options>) -> Self {
        let level_count = opts.level_count;

        Self {
            opts,
            registry: CompactionRegistry::new(level_count),
            next_plan_id: 0,
        }
    }

    pub(crate) fn next_plan_id(&mut self) -> u64 {
        self.next_plan_id += 1;
        self.next_plan_id
    }

    pub(crate) fn release(&mut self, plan: &CompactionPlan, status: &crate::Result<()>) {
        plan.mark_tables_being_compacted(false);
        self.registry.remove(plan.level(), plan.id);

        if status.is_err() {
            plan.reset_next_compaction_index();
        }
    }

    /// Picks the compression for output tables of the given level.
    pub(crate) fn compression_for_level(
        &self,
        level: usize,
        enable_compression: bool,
    ) -> CompressionType {
        if !enable_compression {
            return CompressionType::None;
        }

        if self.opts.compression_per_level.is_empty() {
            return self.opts.compression;
        }

        // Out-of-range levels use the last configured entry
        let idx = level.min(self.opts.compression_per_level.len() - 1);

        self.opts
            .compression_per_level
            .get(idx)
            .copied()
            .unwrap_or(self.opts.compression)
    }

    /// Returns `true` if tables of `level + 1` overlapping `range` are input
    /// to a running compaction. `parent_index` is updated to the start of
    /// the overlapping slice.
    pub(crate) fn parent_range_in_compaction(
        &self,
        version: &Version,
        range: &KeyRange,
        level: usize,
        parent_index: &mut Option<usize>,
    ) -> bool {
        assert!(
            level + 1 < version.level_count(),
            "parent level does not exist",
        );

        let (tables, hint) = version.overlapping_tables(
            level + 1,
            Some(range.min()),
            Some(range.max()),
            *parent_index,
        );
        *parent_index = hint;

        tables_in_compaction(&tables)
    }

    /// Grows a plan's source set until no user key straddles the boundary
    /// between the set and the tables left behind at the source level.
    ///
    /// Returns `false` (and empties the plan's inputs) if the expansion
    /// yields nothing, or collides with a running compaction at the source
    /// or parent level; the plan must then be discarded.
    pub(crate) fn expand_while_overlapping(
        &self,
        version: &Version,
        plan: &mut CompactionPlan,
    ) -> bool {
        if plan.input_tables(0).is_empty() {
            assert!(plan.input_tables(1).is_empty());
            return false;
        }

        // Level 0 queries already close over transitive overlap
        if plan.level() == 0 {
            return true;
        }

        let level = plan.level();
        let mut hint = None;

        loop {
            let old_size = plan.inputs[0].len();
            let range = plan.input_range(0);

            let (tables, new_hint) = version.overlapping_tables(
                level,
                Some(range.min()),
                Some(range.max()),
                hint,
            );
            hint = new_hint;
            plan.inputs[0].tables = tables;

            if plan.inputs[0].len() <= old_size {
                break;
            }
        }

        if plan.inputs[0].is_empty() {
            log::debug!("expansion failure because of zero input tables");
            plan.inputs[1].tables.clear();
            return false;
        }

        let range = plan.input_range(0);
        let mut parent_index = None;

        if tables_in_compaction(plan.input_tables(0))
            || (level != plan.output_level()
                && self.parent_range_in_compaction(version, &range, level, &mut parent_index))
        {
            plan.inputs[0].tables.clear();
            plan.inputs[1].tables.clear();
            return false;
        }

        true
    }

    /// Attaches the output level's overlapping tables (and the grandparents)
    /// to a plan whose source set is final.
    ///
    /// While at it, the source set is widened opportunistically when that
    /// pulls in more source tables without changing the parent set, without
    /// splitting a user key and without blowing the byte budget.
    pub(crate) fn setup_other_inputs(
        &self,
        mutable: &MutableOptions,
        version: &Version,
        plan: &mut CompactionPlan,
    ) {
        if plan.input_tables(0).is_empty() || plan.level() == plan.output_level() {
            return;
        }

        let level = plan.level();
        let range = plan.input_range(0);

        let mut parent_index = plan.parent_index;
        let (parents, hint) = version.overlapping_tables(
            level + 1,
            Some(range.min()),
            Some(range.max()),
            parent_index,
        );
        parent_index = hint;
        plan.inputs[1].tables = parents;

        let mut all_range = plan.combined_range();

        if !plan.inputs[1].is_empty() {
            let (expanded0, _) = version.overlapping_tables(
                level,
                Some(all_range.min()),
                Some(all_range.max()),
                plan.base_index,
            );

            let inputs0_size = total_compensated_size(plan.input_tables(0));
            let inputs1_size = total_compensated_size(plan.input_tables(1));
            let expanded0_size = total_compensated_size(&expanded0);
            let limit = mutable.expanded_compaction_byte_size_limit(level);

            if expanded0.len() > plan.inputs[0].len()
                && inputs1_size + expanded0_size < limit
                && !tables_in_compaction(&expanded0)
                && !version.has_overlapping_user_key(&expanded0, level)
            {
                let new_range = aggregate_key_range(&expanded0);

                let (expanded1, hint) = version.overlapping_tables(
                    level + 1,
                    Some(new_range.min()),
                    Some(new_range.max()),
                    parent_index,
                );
                parent_index = hint;

                if expanded1.len() == plan.inputs[1].len() && !tables_in_compaction(&expanded1) {
                    log::debug!(
                        "expanding@{level} {}+{} ({inputs0_size}+{inputs1_size} bytes) to {}+{} ({expanded0_size}+{inputs1_size} bytes)",
                        plan.inputs[0].len(),
                        plan.inputs[1].len(),
                        expanded0.len(),
                        expanded1.len(),
                    );

                    plan.inputs[0].tables = expanded0;
                    plan.inputs[1].tables = expanded1;
                    all_range = plan.combined_range();
                }
            }
        }

        plan.parent_index = parent_index;

        // Grandparents bound how much the output may carry over into
        // later compactions (parent == level+1; grandparent == level+2)
        if level + 2 < version.level_count() {
            let (grandparents, _) = version.overlapping_tables(
                level + 2,
                Some(all_range.min()),
                Some(all_range.max()),
                None,
            );
            plan.grandparents = grandparents;
        }
    }

    pub(crate) fn setup_bottommost_level(
        &self,
        version: &Version,
        plan: &mut CompactionPlan,
        is_manual: bool,
    ) {
        if matches!(
            self.opts.compaction_style,
            CompactionStyle::Universal | CompactionStyle::Fifo
        ) {
            // A manual universal pass covers every table, so its output is
            // bottommost by definition; automatic picks set the flag when
            // choosing the run
            if is_manual {
                plan.bottommost_level = true;
            }
            return;
        }

        plan.bottommost_level = (plan.output_level() + 1..version.level_count())
            .all(|level| version.level(level).is_empty());
    }

    /// Plans a user-requested range compaction; shared by the leveled and
    /// universal pickers (FIFO has its own take).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn compact_range(
        &mut self,
        mutable: &MutableOptions,
        version: &Arc<Version>,
        input_level: usize,
        output_level: usize,
        output_path_id: u32,
        mut begin: Option<&InternalKey>,
        mut end: Option<&InternalKey>,
        compaction_end: &mut Option<InternalKey>,
    ) -> crate::Result<Option<CompactionPlan>> {
        debug_assert!(
            self.opts.compaction_style != CompactionStyle::Fifo,
            "FIFO compaction has its own range planner",
        );

        if input_level >= version.level_count() || output_level >= version.level_count() {
            return Err(Error::InvalidArgument(format!(
                "compaction level out of range, tree has {} levels",
                version.level_count(),
            )));
        }

        *compaction_end = None;

        // In a tiered layout all tables may mutually overlap,
        // so the entire key space has to be compacted in one shot
        if self.opts.compaction_style == CompactionStyle::Universal {
            begin = None;
            end = None;
        }

        let (mut inputs, _) = version.overlapping_tables(input_level, begin, end, None);
        if inputs.is_empty() {
            return Ok(None);
        }

        let mut covering_the_whole_range = true;

        // Avoid compacting too much in one shot in case the range is large.
        // Level 0 cannot be chunked: its tables overlap, and picking one
        // table while dropping an older overlapping one would lose data.
        if input_level > 0 {
            let limit = mutable
                .max_table_size_for_level(input_level)
                .saturating_mul(mutable.source_compaction_factor);

            let mut total = 0u64;

            for idx in 0..inputs.len().saturating_sub(1) {
                total += inputs[idx].compensated_file_size;

                if total >= limit {
                    *compaction_end = Some(inputs[idx + 1].smallest.clone());
                    covering_the_whole_range = false;
                    inputs.truncate(idx + 1);
                    break;
                }
            }
        }

        assert!(
            (output_path_id as usize) < self.opts.data_paths.len().max(1),
            "output path does not exist",
        );

        let id = self.next_plan_id();
        let mut plan = CompactionPlan::new(
            id,
            version.clone(),
            input_level,
            output_level,
            mutable.max_table_size_for_level(output_level),
            mutable.max_grandparent_overlap_bytes(input_level),
            output_path_id,
            self.compression_for_level(output_level, true),
        );
        plan.inputs[0].tables = inputs;

        if !self.expand_while_overlapping(version, &mut plan) {
            log::warn!("could not compact range due to expansion failure");
            return Ok(None);
        }

        self.setup_other_inputs(mutable, version, &mut plan);

        if covering_the_whole_range {
            *compaction_end = None;
        }

        // Manual plans are not remembered in the registry: the engine runs
        // at most one manual compaction at a time, and an unregistered plan
        // cannot starve automatic level 0 picks
        plan.mark_tables_being_compacted(true);
        self.setup_bottommost_level(version, &mut plan, true);
        plan.is_manual_compaction = true;

        Ok(Some(plan))
    }

    /// Builds a plan from externally chosen, already sanitized inputs.
    pub(crate) fn form_plan(
        &mut self,
        compact_options: &pluggable::CompactionOptions,
        inputs: Vec<CompactionInputFiles>,
        output_level: usize,
        version: &Arc<Version>,
        mutable: &MutableOptions,
    ) -> CompactionPlan {
        // The cap only matters when a grandparent level exists below the
        // output; everything deeper is unbounded
        let max_grandparent_overlap_bytes = if output_level + 1 < version.level_count() {
            mutable.max_grandparent_overlap_bytes(output_level + 1)
        } else {
            u64::MAX
        };

        let id = self.next_plan_id();
        let mut plan = CompactionPlan::from_inputs(
            id,
            version.clone(),
            inputs,
            output_level,
            max_grandparent_overlap_bytes,
            compact_options.output_table_size_limit,
            compact_options.compression,
            false,
        );

        plan.mark_tables_being_compacted(true);
        self.setup_bottommost_level(version, &mut plan, output_level + 1 == version.level_count());

        plan
    }
}

/// Validates and closes an externally supplied table set over overlap;
/// see [`CompactionPicker::sanitize_compaction_input_tables`].
pub(crate) fn sanitize_input_tables(
    version: &Version,
    input_set: &mut BTreeSet<TableId>,
    output_level: usize,
    max_output_level: usize,
) -> crate::Result<()> {
    if output_level >= version.level_count() {
        return Err(Error::InvalidArgument(format!(
            "output level must be between 0 and {}",
            version.level_count() - 1,
        )));
    }

    if output_level > max_output_level {
        return Err(Error::InvalidArgument(format!(
            "output level exceeds the maximum output level of the compaction strategy ({max_output_level})",
        )));
    }

    if input_set.is_empty() {
        return Err(Error::InvalidArgument(
            "a compaction must contain at least one table".into(),
        ));
    }

    // The per-level pass only looks downwards, so a widening at a deep
    // level cannot retroactively pull in shallower tables; re-running the
    // pass until the set stops growing closes the set for good
    loop {
        let size_before = input_set.len();
        sanitize_input_tables_for_all_levels(version, input_set, output_level)?;

        if input_set.len() == size_before {
            break;
        }
    }

    // Every table number must resolve against the version
    for &id in input_set.iter() {
        match version.find_table(id) {
            Some((level, pos)) => {
                if version.level(level)[pos].is_being_compacted() {
                    return Err(Error::Aborted(format!(
                        "input table {id} is already being compacted",
                    )));
                }
            }
            None => {
                return Err(Error::InvalidArgument(format!(
                    "input table {id} does not exist",
                )));
            }
        }
    }

    Ok(())
}

// For each level up to the output level: include everything between the
// first and last seed table, widen across shared user-key boundaries, grow
// the accumulated key range, and pull every deeper table overlapping that
// range into the set. Iterating levels top-down makes the closure
// transitive.
fn sanitize_input_tables_for_all_levels(
    version: &Version,
    input_set: &mut BTreeSet<TableId>,
    output_level: usize,
) -> crate::Result<()> {
    let mut accumulated: Option<(UserKey, UserKey)> = None;

    for level in 0..=output_level {
        let tables = version.level(level);

        let mut first_included = tables.len();
        let mut last_included: Option<usize> = None;

        for (pos, table) in tables.iter().enumerate() {
            if input_set.contains(&table.id) {
                first_included = first_included.min(pos);
                last_included = Some(last_included.map_or(pos, |last| last.max(pos)));

                if accumulated.is_none() {
                    accumulated = Some((
                        table.smallest.user_key.clone(),
                        table.largest.user_key.clone(),
                    ));
                }
            }
        }

        let Some(mut last) = last_included else {
            continue;
        };
        let mut first = first_included;

        if level != 0 {
            // Neighbors sharing (or overlapping) a user-key boundary belong
            // to the same clean cut
            while first > 0 {
                if tables[first - 1].largest.user_key < tables[first].smallest.user_key {
                    break;
                }
                first -= 1;
            }

            while last + 1 < tables.len() {
                if tables[last + 1].smallest.user_key > tables[last].largest.user_key {
                    break;
                }
                last += 1;
            }
        }

        for table in &tables[first..=last] {
            if table.is_being_compacted() {
                return Err(Error::Aborted(format!(
                    "table {} has a key range overlapping the compaction inputs, but is currently being compacted",
                    table.id,
                )));
            }
            input_set.insert(table.id);
        }

        if let Some((smallest, largest)) = &mut accumulated {
            if level == 0 {
                // Level 0 tables overlap arbitrarily; union over all of them
                for table in &tables[first..=last] {
                    if table.smallest.user_key < *smallest {
                        *smallest = table.smallest.user_key.clone();
                    }
                    if table.largest.user_key > *largest {
                        *largest = table.largest.user_key.clone();
                    }
                }

                // Other level 0 tables may fall into the unioned range
                // without sitting between the seeds; sweep until the range
                // stops growing, so no overlapping table stays behind
                loop {
                    let mut grew = false;

                    for table in tables.iter() {
                        if !input_set.contains(&table.id)
                            && user_ranges_overlap(
                                (&table.smallest.user_key, &table.largest.user_key),
                                (smallest, largest),
                            )
                        {
                            if table.is_being_compacted() {
                                return Err(Error::Aborted(format!(
                                    "table {} has a key range overlapping the compaction inputs, but is currently being compacted",
                                    table.id,
                                )));
                            }

                            input_set.insert(table.id);
                            grew = true;

                            if table.smallest.user_key < *smallest {
                                *smallest = table.smallest.user_key.clone();
                            }
                            if table.largest.user_key > *largest {
                                *largest = table.largest.user_key.clone();
                            }
                        }
                    }

                    if !grew {
                        break;
                    }
                }
            } else {
                if tables[first].smallest.user_key < *smallest {
                    *smallest = tables[first].smallest.user_key.clone();
                }
                if tables[last].largest.user_key > *largest {
                    *largest = tables[last].largest.user_key.clone();
                }
            }
        }

        if let Some((smallest, largest)) = &accumulated {
            for deeper in (level + 1)..=output_level {
                for table in version.level(deeper).iter() {
                    if user_ranges_overlap(
                        (&table.smallest.user_key, &table.largest.user_key),
                        (smallest, largest),
                    ) {
                        if table.is_being_compacted() {
                            return Err(Error::Aborted(format!(
                                "table {} has a key range overlapping the compaction inputs, but is currently being compacted",
                                table.id,
                            )));
                        }
                        input_set.insert(table.id);
                    }
                }
            }
        }
    }

    Ok(())
}

/// Resolves table numbers to per-level input lists, preserving level order.
///
/// The returned lists span every level between the shallowest and deepest
/// matched level, including empty ones in between.
pub(crate) fn compaction_inputs_from_table_ids(
    version: &Version,
    input_set: &mut BTreeSet<TableId>,
) -> crate::Result<Vec<CompactionInputFiles>> {
    if input_set.is_empty() {
        return Err(Error::InvalidArgument(
            "a compaction must contain at least one table".into(),
        ));
    }

    let mut per_level: Vec<CompactionInputFiles> = (0..version.level_count())
        .map(CompactionInputFiles::empty)
        .collect();

    let mut first_non_empty = None;
    let mut last_non_empty = None;

    for level in 0..version.level_count() {
        for table in version.level(level).iter() {
            if input_set.remove(&table.id) {
                per_level[level].tables.push(table.clone());
                last_non_empty = Some(level);

                if first_non_empty.is_none() {
                    first_non_empty = Some(level);
                }
            }
        }
    }

    if !input_set.is_empty() {
        let missing = input_set
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");

        return Err(Error::InvalidArgument(format!(
            "no matching tables for the following numbers: {missing}",
        )));
    }

    let (Some(first), Some(last)) = (first_non_empty, last_non_empty) else {
        return Err(Error::InvalidArgument(
            "a compaction must contain at least one table".into(),
        ));
    };

    Ok(per_level.drain(first..=last).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HashSet, InternalKey, TableMeta, ValueType};
    use test_log::test;

    fn key(k: &str) -> InternalKey {
        InternalKey::new(k, 0, ValueType::Value)
    }

    fn fixture_table(id: TableId, min: &str, max: &str) -> Arc<TableMeta> {
        Arc::new(TableMeta::new(id, key(min), key(max), 10))
    }

    #[test]
    fn overlap_predicate() {
        let a = (&UserKey::from("a"), &UserKey::from("f"));
        let b = (&UserKey::from("f"), &UserKey::from("k"));
        let c = (&UserKey::from("g"), &UserKey::from("h"));

        assert!(user_ranges_overlap(a, b));
        assert!(!user_ranges_overlap(a, c));

        // nested
        assert!(user_ranges_overlap(b, c));
        assert!(user_ranges_overlap(c, b));
    }

    #[test]
    fn sanitize_pulls_in_level0_overlap() {
        let version = Version::new(vec![
            vec![fixture_table(1, "05", "15"), fixture_table(2, "12", "20")],
            vec![],
        ]);

        let mut input_set: BTreeSet<TableId> = [1].into_iter().collect();
        sanitize_input_tables(&version, &mut input_set, 0, 1)
            .expect("sanitization should succeed");

        let ids = input_set.into_iter().collect::<HashSet<_>>();
        assert_eq!(set![1, 2], ids);
    }

    #[test]
    fn sanitize_closes_over_deeper_levels() {
        let version = Version::new(vec![
            vec![fixture_table(1, "d", "f")],
            vec![fixture_table(2, "a", "e"), fixture_table(3, "u", "z")],
            vec![fixture_table(4, "b", "c"), fixture_table(5, "g", "h")],
        ]);

        let mut input_set: BTreeSet<TableId> = [1].into_iter().collect();
        sanitize_input_tables(&version, &mut input_set, 2, 2)
            .expect("sanitization should succeed");

        // table 2 overlaps the seed, table 4 overlaps the widened range;
        // tables 3 and 5 stay out
        let ids = input_set.into_iter().collect::<HashSet<_>>();
        assert_eq!(set![1, 2, 4], ids);
    }

    #[test]
    fn sanitize_widens_across_shared_boundary() {
        let version = Version::new(vec![
            vec![],
            vec![
                fixture_table(1, "a", "c"),
                fixture_table(2, "c", "f"),
                fixture_table(3, "g", "h"),
            ],
        ]);

        let mut input_set: BTreeSet<TableId> = [2].into_iter().collect();
        sanitize_input_tables(&version, &mut input_set, 1, 1)
            .expect("sanitization should succeed");

        let ids = input_set.into_iter().collect::<HashSet<_>>();
        assert_eq!(set![1, 2], ids);
    }

    #[test]
    fn sanitize_rejects_bad_requests() {
        let version = Version::new(vec![vec![fixture_table(1, "a", "b")], vec![]]);

        let mut empty = BTreeSet::new();
        assert!(matches!(
            sanitize_input_tables(&version, &mut empty, 0, 1),
            Err(Error::InvalidArgument(_)),
        ));

        let mut unknown: BTreeSet<TableId> = [42].into_iter().collect();
        assert!(matches!(
            sanitize_input_tables(&version, &mut unknown, 0, 1),
            Err(Error::InvalidArgument(_)),
        ));

        let mut ok: BTreeSet<TableId> = [1].into_iter().collect();
        assert!(matches!(
            sanitize_input_tables(&version, &mut ok, 9, 9),
            Err(Error::InvalidArgument(_)),
        ));

        // output level above the strategy's reach
        assert!(matches!(
            sanitize_input_tables(&version, &mut ok, 1, 0),
            Err(Error::InvalidArgument(_)),
        ));
    }

    #[test]
    fn sanitize_aborts_on_running_compaction() {
        let blocked = fixture_table(2, "b", "d");
        blocked.set_being_compacted(true);

        let version = Version::new(vec![
            vec![],
            vec![fixture_table(1, "a", "c"), blocked],
        ]);

        let mut input_set: BTreeSet<TableId> = [1].into_iter().collect();
        assert!(matches!(
            sanitize_input_tables(&version, &mut input_set, 1, 1),
            Err(Error::Aborted(_)),
        ));
    }

    #[test]
    fn inputs_from_table_ids_spans_levels() {
        let version = Version::new(vec![
            vec![],
            vec![fixture_table(1, "a", "c")],
            vec![],
            vec![fixture_table(2, "a", "c")],
        ]);

        let mut input_set: BTreeSet<TableId> = [1, 2].into_iter().collect();
        let inputs = compaction_inputs_from_table_ids(&version, &mut input_set)
            .expect("tables should resolve");

        // level 2 is included as an empty list, keeping levels contiguous
        assert_eq!(3, inputs.len());
        assert_eq!(vec![1, 2, 3], inputs.iter().map(|i| i.level).collect::<Vec<_>>());
        assert_eq!(1, inputs[0].len());
        assert!(inputs[1].is_empty());
        assert_eq!(1, inputs[2].len());

        let mut unknown: BTreeSet<TableId> = [7].into_iter().collect();
        assert!(compaction_inputs_from_table_ids(&version, &mut unknown).is_err());
    }
}
