// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Universal (tiered) compaction picking

use super::{CompactionPicker, PickerCore};
use crate::{
    key::InternalKey,
    plan::CompactionPlan,
    version::Version,
    MutableOptions, Options, StopStyle,
};
use std::sync::Arc;

/// Universal (tiered) compaction picker
///
/// All tables live in level 0 as sorted runs, ordered newest to oldest.
/// Three triggers are tried in order; the first one producing a plan wins:
///
/// 1. **Size amplification** - once the bytes newer than the oldest table
///    exceed a percentage of the oldest table's size, everything is merged
///    into one run.
/// 2. **Size ratio** - a run of adjacent tables of similar enough size is
///    merged, keeping read amplification down without rewriting large
///    tables behind small ones.
/// 3. **Table count** - if there are still too many tables, adjacent tables
///    are merged regardless of their size ratio.
///
/// Universal compaction has low write amplification, at the cost of read
/// and transient space amplification.
pub struct UniversalPicker {
    core: PickerCore,
}

impl UniversalPicker {
    /// Creates a new universal picker.
    #[must_use]
    pub fn new(opts: Arc<Options>) -> Self {
        Self {
            core: PickerCore::new(opts),
        }
    }

    /// Considers candidate runs based on their size differences with the
    /// next table in time order.
    ///
    /// A run starts at a table that is not being compacted and grows while
    /// the next table's size stays within `ratio` percent of the size
    /// accumulated so far (or of the last admitted table, with
    /// [`StopStyle::SimilarSize`]). Runs shorter than the configured
    /// minimum merge width are skipped.
    #[allow(clippy::cast_precision_loss)]
    fn pick_by_read_amp(
        &mut self,
        mutable: &MutableOptions,
        version: &Arc<Version>,
        score: f64,
        ratio: u64,
        max_number_of_tables_to_compact: usize,
    ) -> Option<CompactionPlan> {
        let universal = &self.core.opts.universal;

        let min_merge_width = universal.min_merge_width.max(2);
        let max_tables_to_compact = universal
            .max_merge_width
            .min(max_number_of_tables_to_compact);

        // The tables are sorted from newest first to oldest last
        let tables = version.level(0);

        let mut start_index = 0;
        let mut candidate_count = 0;
        let mut done = false;

        let mut cursor = 0;
        while cursor < tables.len() {
            // Skip tables that are already being compacted
            let mut first = None;
            while cursor < tables.len() {
                let table = &tables[cursor];

                if !table.is_being_compacted() {
                    first = Some(table);
                    candidate_count = 1;
                    break;
                }

                log::trace!(
                    "universal: table #{}[{cursor}] being compacted, skipping",
                    table.id,
                );
                cursor += 1;
            }

            let Some(first) = first else {
                break;
            };

            log::trace!(
                "universal: possible candidate table #{}[{cursor}]",
                first.id,
            );

            let mut candidate_size = first.compensated_file_size;

            // Check if the succeeding tables need compaction
            let mut next = cursor + 1;
            while candidate_count < max_tables_to_compact && next < tables.len() {
                let table = &tables[next];

                if table.is_being_compacted() {
                    break;
                }

                // Admit the table while the size accumulated so far
                // (increased by the allowed percentage) still covers it
                let allowed = candidate_size as f64 * (100.0 + ratio as f64) / 100.0;

                if allowed < table.file_size as f64 {
                    break;
                }

                if universal.stop_style == StopStyle::SimilarSize {
                    // Similar-size stopping rule: also check the last picked
                    // table isn't far larger than the next candidate. If the
                    // small table we hit begins a run of similar-size tables,
                    // a later iteration picks them up; a lonely straggler is
                    // dealt with by the last-resort table count trigger.
                    let allowed = table.file_size as f64 * (100.0 + ratio as f64) / 100.0;

                    if allowed < candidate_size as f64 {
                        break;
                    }

                    candidate_size = table.compensated_file_size;
                } else {
                    candidate_size += table.compensated_file_size;
                }

                candidate_count += 1;
                next += 1;
            }

            // Found a series of consecutive tables that need compaction
            if candidate_count >= min_merge_width {
                start_index = cursor;
                done = true;
                break;
            }

            for table in tables.iter().skip(cursor).take(candidate_count) {
                log::trace!(
                    "universal: skipping table #{} with size {} (compensated {})",
                    table.id,
                    table.file_size,
                    table.compensated_file_size,
                );
            }

            cursor += 1;
        }

        if !done || candidate_count <= 1 {
            return None;
        }

        let first_index_after = start_index + candidate_count;

        // Compression is disabled if enough of the level's bytes live in
        // tables older than the picked run; freshly written data tends to
        // be rewritten soon anyway
        let mut enable_compression = true;
        if let Some(percent) = self.core.opts.universal.compression_size_percent {
            let total_size = version.level(0).size();
            let mut older_table_size = 0u64;

            for table in tables.iter().skip(first_index_after).rev() {
                older_table_size += table.file_size;

                if older_table_size.saturating_mul(100)
                    >= total_size.saturating_mul(u64::from(percent))
                {
                    enable_compression = false;
                    break;
                }
            }
        }

        let estimated_total_size: u64 = tables
            .iter()
            .take(first_index_after)
            .map(|t| t.file_size)
            .sum();
        let path_id = path_for_output(&self.core.opts, estimated_total_size);

        let id = self.core.next_plan_id();
        let mut plan = CompactionPlan::new(
            id,
            version.clone(),
            0,
            0,
            mutable.max_table_size_for_level(0),
            u64::MAX,
            path_id,
            self.core.compression_for_level(0, enable_compression),
        );
        plan.score = score;

        for table in &tables[start_index..first_index_after] {
            log::trace!(
                "universal: picking table #{} with size {} (compensated {})",
                table.id,
                table.file_size,
                table.compensated_file_size,
            );
            plan.inputs[0].tables.push(table.clone());
        }

        Some(plan)
    }

    /// Looks at overall size amplification: the ratio of the bytes newer
    /// than the oldest table to the oldest table's size. Once it exceeds
    /// the configured percentage, all candidate tables are compacted into
    /// one run, overriding size ratios and merge widths.
    fn pick_by_size_amp(
        &mut self,
        mutable: &MutableOptions,
        version: &Arc<Version>,
        score: f64,
    ) -> Option<CompactionPlan> {
        let ratio = self.core.opts.universal.max_size_amplification_percent;

        // The tables are sorted from newest first to oldest last
        let tables = version.level(0);

        // Skip tables that are already being compacted; the first free one
        // starts the candidate run
        let mut start_index = None;
        for (idx, table) in tables.iter().take(tables.len().saturating_sub(1)).enumerate() {
            if table.is_being_compacted() {
                log::trace!(
                    "universal: skipping table #{}[{idx}], it cannot be a candidate to reduce size amp",
                    table.id,
                );
            } else {
                start_index = Some(idx);
                break;
            }
        }

        let start_index = start_index?;

        log::trace!("universal: first candidate table [{start_index}] to reduce size amp");

        // Add up the bytes of everything newer than the oldest table.
        // The oldest table itself is the baseline the extra bytes are
        // measured against, so it stays out of the sum
        let mut candidate_size = 0u64;
        let mut candidate_count = 0usize;

        for table in tables.iter().take(tables.len().saturating_sub(1)).skip(start_index) {
            if table.is_being_compacted() {
                log::trace!(
                    "universal: table #{} is already being compacted, no size amp reduction possible",
                    table.id,
                );
                return None;
            }

            candidate_size += table.compensated_file_size;
            candidate_count += 1;
        }

        if candidate_count == 0 {
            return None;
        }

        let earliest_table_size = tables.last().map_or(0, |t| t.file_size);

        // size amplification = percentage of additional bytes
        if candidate_size.saturating_mul(100) < ratio.saturating_mul(earliest_table_size) {
            log::trace!(
                "universal: size amp not needed, newer-tables-total-size {candidate_size}, earliest-table-size {earliest_table_size}",
            );
            return None;
        }

        log::debug!(
            "universal: size amp needed, newer-tables-total-size {candidate_size}, earliest-table-size {earliest_table_size}",
        );

        let estimated_total_size: u64 = tables
            .iter()
            .skip(start_index)
            .map(|t| t.file_size)
            .sum();
        let path_id = path_for_output(&self.core.opts, estimated_total_size);

        // We always compact all the tables, so always compress
        let id = self.core.next_plan_id();
        let mut plan = CompactionPlan::new(
            id,
            version.clone(),
            0,
            0,
            mutable.max_table_size_for_level(0),
            u64::MAX,
            path_id,
            self.core.compression_for_level(0, true),
        );
        plan.score = score;

        for table in tables.iter().skip(start_index) {
            log::trace!(
                "universal: size amp picking table #{} with size {} (compensated {})",
                table.id,
                table.file_size,
                table.compensated_file_size,
            );
            plan.inputs[0].tables.push(table.clone());
        }

        Some(plan)
    }
}

/// Picks the storage path for a compaction output of the given size.
///
/// Two conditions have to hold: the path's budget can take the output, and
/// the budget left in this and all previous paths still covers the output's
/// projected future compactions (estimated from the size ratio), so the
/// grown table does not have to move paths later. Falls back to the last
/// path.
fn path_for_output(opts: &Options, output_size: u64) -> u32 {
    let future_size = output_size
        .saturating_mul(100u64.saturating_sub(opts.universal.size_ratio))
        / 100;

    let mut accumulated = 0u64;
    let mut path = 0usize;

    while path + 1 < opts.data_paths.len() {
        let target_size = opts.data_paths[path].target_size;

        if target_size > output_size && accumulated + (target_size - output_size) > future_size {
            break;
        }

        accumulated += target_size;
        path += 1;
    }

    u32::try_from(path).unwrap_or(u32::MAX)
}

impl CompactionPicker for UniversalPicker {
    fn get_name(&self) -> &'static str {
        "UniversalCompactionPicker"
    }

    fn max_output_level(&self) -> usize {
        0
    }

    fn pick_compaction(
        &mut self,
        mutable: &MutableOptions,
        version: &Arc<Version>,
    ) -> Option<CompactionPlan> {
        let table_count = version.level(0).len();

        if table_count < mutable.level0_table_count_trigger {
            log::trace!("universal: nothing to do");
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let score = table_count as f64 / mutable.level0_table_count_trigger.max(1) as f64;

        log::trace!("universal: candidate tables ({table_count})");

        // Check for size amplification first
        let plan = if let Some(plan) = self.pick_by_size_amp(mutable, version, score) {
            log::debug!("universal: compacting for size amp");
            Some(plan)
        } else {
            // Size amplification is within limits. Try reducing read
            // amplification while maintaining table size ratios
            let ratio = self.core.opts.universal.size_ratio;

            if let Some(plan) =
                self.pick_by_read_amp(mutable, version, score, ratio, usize::MAX)
            {
                log::debug!("universal: compacting for size ratio");
                Some(plan)
            } else {
                // Size amplification and size ratios are within limits.
                // If read amplification is still too high, forcibly reduce
                // the table count below the trigger, ignoring size ratios
                let excess = table_count - mutable.level0_table_count_trigger;

                if let Some(plan) =
                    self.pick_by_read_amp(mutable, version, score, u64::MAX, excess)
                {
                    log::debug!("universal: compacting for table count");
                    Some(plan)
                } else {
                    None
                }
            }
        };

        let mut plan = plan?;
        assert!(plan.inputs[0].len() > 1, "universal runs merge 2+ tables");

        // The chosen run must be contiguous in time: every table strictly
        // newer than the next
        debug_assert!(
            plan.input_tables(0)
                .windows(2)
                .all(|pair| pair[0].smallest_seqno > pair[1].largest_seqno),
            "universal input tables overlap in time",
        );

        let tables = version.level(0);

        // Is the earliest table part of this compaction?
        plan.bottommost_level = match (plan.input_tables(0).last(), tables.last()) {
            (Some(last_input), Some(last_table)) => last_input.id == last_table.id,
            _ => false,
        };

        // Record whether this compaction includes every table
        plan.is_full_compaction = plan.inputs[0].len() == tables.len();

        plan.mark_tables_being_compacted(true);
        self.core.registry.register(&plan);

        Some(plan)
    }

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
    ) -> crate::Result<Option<CompactionPlan>> {
        self.core.compact_range(
            mutable,
            version,
            input_level,
            output_level,
            output_path_id,
            begin,
            end,
            compaction_end,
        )
    }

    fn release_compaction_tables(&mut self, plan: CompactionPlan, status: &crate::Result<()>) {
        self.core.release(&plan, status);
    }

    fn size_being_compacted(&self, level: usize) -> u64 {
        self.core.registry.bytes_being_compacted(level)
    }
}
