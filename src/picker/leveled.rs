// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Leveled compaction picking

use super::{CompactionPicker, PickerCore};
use crate::{
    key::InternalKey,
    plan::CompactionPlan,
    table::aggregate_key_range,
    version::Version,
    MutableOptions, Options,
};
use std::sync::Arc;

/// Score-driven leveled compaction picker (LCS)
///
/// Each level has a byte budget growing exponentially with depth. The level
/// exceeding its budget the most is compacted first, one table at a time,
/// into the next level; tables are visited largest first in a round-robin
/// walk, so every table gets its turn.
///
/// LCS suffers from comparatively high write amplification, but has decent
/// read amplification and great space amplification (~1.1x).
pub struct LeveledPicker {
    core: PickerCore,
}

impl LeveledPicker {
    /// Creates a new leveled picker.
    #[must_use]
    pub fn new(opts: Arc<Options>) -> Self {
        Self {
            core: PickerCore::new(opts),
        }
    }

    /// Picks the single best table of `level` to compact into `level + 1`,
    /// walking the level's tables in descending compensated size from the
    /// round-robin cursor.
    ///
    /// Tables that are being compacted, or whose parent range is, are
    /// skipped; the cursor remembers the first skipped candidate so the
    /// next pick resumes fairly.
    fn pick_compaction_by_size(
        &mut self,
        mutable: &MutableOptions,
        version: &Arc<Version>,
        level: usize,
        score: f64,
    ) -> Option<CompactionPlan> {
        // Level 0 tables overlap each other, so at most one level 0
        // compaction may run; anything smarter would need to compare the
        // key ranges currently being compacted
        if level == 0 && self.core.registry.num_live(0) > 0 {
            return None;
        }

        assert!(
            level + 1 < version.level_count(),
            "cannot compact the last level",
        );

        let id = self.core.next_plan_id();
        let mut plan = CompactionPlan::new(
            id,
            version.clone(),
            level,
            level + 1,
            mutable.max_table_size_for_level(level + 1),
            mutable.max_grandparent_overlap_bytes(level),
            0,
            self.core.compression_for_level(level + 1, true),
        );
        plan.score = score;

        let tables = version.level(level);
        let order = version.files_by_size(level);

        // Where the walk starts next time; parks at the end when the level
        // has no pickable table left
        let mut next_index = None;

        for walk_pos in version.next_compaction_index(level)..order.len() {
            let table_pos = order[walk_pos];
            let table = &tables[table_pos];

            if table.is_being_compacted() {
                continue;
            }

            if next_index.is_none() {
                next_index = Some(walk_pos);
            }

            // Do not pick this table if its parent range is being compacted;
            // the expansion would collide with it anyway
            let mut parent_index = None;
            if self.core.parent_range_in_compaction(
                version,
                &table.key_range(),
                level,
                &mut parent_index,
            ) {
                continue;
            }

            plan.inputs[0].tables.push(table.clone());
            plan.base_index = Some(table_pos);
            plan.parent_index = parent_index;
            break;
        }

        version.set_next_compaction_index(level, next_index.unwrap_or_else(|| order.len()));

        if plan.inputs[0].is_empty() {
            return None;
        }

        Some(plan)
    }
}

impl CompactionPicker for LeveledPicker {
    fn get_name(&self) -> &'static str {
        "LeveledCompactionPicker"
    }

    fn max_output_level(&self) -> usize {
        self.core.opts.level_count - 1
    }

    fn pick_compaction(
        &mut self,
        mutable: &MutableOptions,
        version: &Arc<Version>,
    ) -> Option<CompactionPlan> {
        // Scores must be recomputed here: what counts as "being compacted"
        // may have changed since this version was published
        let bytes_being_compacted: Vec<u64> = (0..version.level_count())
            .map(|level| self.core.registry.bytes_being_compacted(level))
            .collect();

        let ranking = version.compaction_priority(mutable, &bytes_being_compacted);

        let mut plan = None;

        for (level, score) in ranking {
            if score < 1.0 {
                break;
            }

            if let Some(mut candidate) =
                self.pick_compaction_by_size(mutable, version, level, score)
            {
                if self.core.expand_while_overlapping(version, &mut candidate) {
                    plan = Some(candidate);
                    break;
                }

                log::trace!(
                    "leveled: L{level} candidate dropped, it straddles a running compaction",
                );
            }
        }

        let mut plan = plan?;
        let level = plan.level();

        if level == 0 {
            assert!(
                self.core.registry.num_live(0) == 0,
                "two level 0 compactions cannot run at the same time",
            );

            // Replace the picked table with every level 0 table overlapping
            // its range; leaving an overlapping newer table behind would
            // shadow the compaction output
            let range = plan.input_range(0);
            let (tables, _) = version.overlapping_tables(
                0,
                Some(range.min()),
                Some(range.max()),
                None,
            );
            plan.inputs[0].tables = tables;

            // Pulling in more tables may have extended the range, so
            // re-derive it before the parent probe
            let range = aggregate_key_range(plan.input_tables(0));

            let mut parent_index = plan.parent_index;
            if self
                .core
                .parent_range_in_compaction(version, &range, level, &mut parent_index)
            {
                return None;
            }
            plan.parent_index = parent_index;

            assert!(!plan.inputs[0].is_empty());
        }

        self.core.setup_other_inputs(mutable, version, &mut plan);

        plan.mark_tables_being_compacted(true);
        self.core.setup_bottommost_level(version, &mut plan, false);
        self.core.registry.register(&plan);

        log::debug!(
            "leveled: picked {} tables at L{} (score {:.2})",
            plan.inputs[0].len(),
            level,
            plan.score(),
        );

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CompactionStyle, InternalKey, TableId, TableMeta, ValueType};
    use test_log::test;

    fn key(k: &str) -> InternalKey {
        InternalKey::new(k, 0, ValueType::Value)
    }

    fn fixture_table(id: TableId, min: &str, max: &str, size: u64) -> Arc<TableMeta> {
        Arc::new(TableMeta::new(id, key(min), key(max), size))
    }

    fn fixture_opts() -> Arc<Options> {
        Arc::new(
            Options::default()
                .with_compaction_style(CompactionStyle::Leveled)
                .with_level_count(3),
        )
    }

    fn ids(tables: &[Arc<TableMeta>]) -> Vec<TableId> {
        tables.iter().map(|t| t.id).collect()
    }

    #[test]
    fn leveled_empty_tree() {
        let mut picker = LeveledPicker::new(fixture_opts());
        let version = Arc::new(Version::new(vec![vec![], vec![], vec![]]));

        assert!(picker
            .pick_compaction(&MutableOptions::default(), &version)
            .is_none());
    }

    #[test]
    fn leveled_picks_largest_table_of_worst_level() {
        let mut picker = LeveledPicker::new(fixture_opts());

        // level 1 is at 1.5x its budget; B is the largest table.
        // The tight table target size keeps opportunistic widening out
        let mutable = MutableOptions::default()
            .with_max_bytes_for_level_base(200)
            .with_target_table_size_base(4);

        let version = Arc::new(Version::new(vec![
            vec![],
            vec![
                fixture_table(1, "01", "10", 90),
                fixture_table(2, "20", "30", 120),
                fixture_table(3, "40", "50", 90),
            ],
            vec![fixture_table(4, "25", "45", 100)],
        ]));

        let plan = picker
            .pick_compaction(&mutable, &version)
            .expect("should pick a compaction");

        assert_eq!(1, plan.level());
        assert_eq!(2, plan.output_level());
        assert_eq!(vec![2], ids(plan.input_tables(0)));
        assert_eq!(vec![4], ids(plan.input_tables(1)));
        assert!(plan.grandparents().is_empty());
        assert!(plan.score() >= 1.0);

        // everything picked is now marked
        assert!(plan.input_tables(0).iter().all(|t| t.is_being_compacted()));
        assert_eq!(120, picker.size_being_compacted(1));

        picker.release_compaction_tables(plan, &Ok(()));
        assert_eq!(0, picker.size_being_compacted(1));
    }

    #[test]
    fn leveled_expands_to_clean_cut() {
        let mut picker = LeveledPicker::new(fixture_opts());
        let mutable = MutableOptions::default().with_max_bytes_for_level_base(10);

        // A and B share user key "10"; picking A must pull in B
        let version = Arc::new(Version::new(vec![
            vec![],
            vec![
                fixture_table(1, "01", "10", 50),
                fixture_table(2, "10", "20", 40),
            ],
            vec![],
        ]));

        let plan = picker
            .pick_compaction(&mutable, &version)
            .expect("should pick a compaction");

        assert_eq!(vec![1, 2], ids(plan.input_tables(0)));
    }

    #[test]
    fn leveled_level0_takes_all_overlapping_tables() {
        let mut picker = LeveledPicker::new(fixture_opts());
        let mutable = MutableOptions::default()
            .with_level0_table_count_trigger(2)
            .with_max_bytes_for_level_base(u64::MAX);

        let t1 = Arc::new(
            TableMeta::new(1, key("a"), key("m"), 50).with_seqno_range(4, 5),
        );
        let t2 = Arc::new(
            TableMeta::new(2, key("k"), key("z"), 40).with_seqno_range(2, 3),
        );

        let version = Arc::new(Version::new(vec![vec![t1, t2], vec![], vec![]]));

        let plan = picker
            .pick_compaction(&mutable, &version)
            .expect("should pick a compaction");

        assert_eq!(0, plan.level());
        assert_eq!(1, plan.output_level());
        assert_eq!(2, plan.input_tables(0).len());
    }

    #[test]
    fn leveled_only_one_level0_compaction() {
        let mut picker = LeveledPicker::new(fixture_opts());
        let mutable = MutableOptions::default().with_level0_table_count_trigger(2);

        let version = Arc::new(Version::new(vec![
            vec![
                fixture_table(1, "a", "m", 50),
                fixture_table(2, "k", "z", 40),
            ],
            vec![],
            vec![],
        ]));

        let first = picker
            .pick_compaction(&mutable, &version)
            .expect("should pick a compaction");

        assert!(picker.pick_compaction(&mutable, &version).is_none());

        picker.release_compaction_tables(first, &Ok(()));
    }

    #[test]
    fn leveled_skips_busy_tables() {
        let mut picker = LeveledPicker::new(fixture_opts());
        let mutable = MutableOptions::default().with_max_bytes_for_level_base(10);

        let busy = fixture_table(1, "a", "c", 100);
        busy.set_being_compacted(true);

        let version = Arc::new(Version::new(vec![
            vec![],
            vec![busy, fixture_table(2, "e", "g", 50)],
            vec![],
        ]));

        let plan = picker
            .pick_compaction(&mutable, &version)
            .expect("should pick a compaction");

        assert_eq!(vec![2], ids(plan.input_tables(0)));
    }

    #[test]
    fn leveled_failed_release_rewinds_cursor() {
        let mut picker = LeveledPicker::new(fixture_opts());
        let mutable = MutableOptions::default().with_max_bytes_for_level_base(10);

        let version = Arc::new(Version::new(vec![
            vec![],
            vec![
                fixture_table(1, "a", "c", 100),
                fixture_table(2, "e", "g", 50),
            ],
            vec![],
        ]));

        let plan = picker
            .pick_compaction(&mutable, &version)
            .expect("should pick a compaction");
        assert_eq!(vec![1], ids(plan.input_tables(0)));

        // the walk moved past table 1 ...
        let next = picker
            .pick_compaction(&mutable, &version)
            .expect("should pick a compaction");
        assert_eq!(vec![2], ids(next.input_tables(0)));
        picker.release_compaction_tables(next, &Ok(()));

        // ... but a failed release brings it back to the front
        picker.release_compaction_tables(plan, &Err(crate::Error::Aborted("test".into())));

        let retry = picker
            .pick_compaction(&mutable, &version)
            .expect("should pick a compaction");
        assert_eq!(vec![1], ids(retry.input_tables(0)));
    }
}
