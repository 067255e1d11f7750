// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! FIFO compaction picking

use super::{CompactionPicker, PickerCore};
use crate::{
    key::InternalKey,
    plan::CompactionPlan,
    version::Version,
    CompressionType, MutableOptions, Options,
};
use std::sync::Arc;

/// FIFO compaction picker
///
/// Keeps the data set under `max_table_files_size` bytes by deleting the
/// oldest tables; nothing is ever merged or rewritten. The resulting plans
/// are *deletion compactions*: the executor unlinks the input tables
/// instead of merging them.
///
/// ###### Caution
///
/// Only use it for specific workloads where:
///
/// 1) You only want to store recent data (unimportant logs, ...)
/// 2) Your keyspace grows monotonically (e.g. time series)
/// 3) You only insert new data (no updates)
pub struct FifoPicker {
    core: PickerCore,
}

impl FifoPicker {
    /// Creates a new FIFO picker.
    #[must_use]
    pub fn new(opts: Arc<Options>) -> Self {
        Self {
            core: PickerCore::new(opts),
        }
    }
}

impl CompactionPicker for FifoPicker {
    fn get_name(&self) -> &'static str {
        "FifoCompactionPicker"
    }

    fn max_output_level(&self) -> usize {
        0
    }

    fn pick_compaction(
        &mut self,
        _mutable: &MutableOptions,
        version: &Arc<Version>,
    ) -> Option<CompactionPlan> {
        assert!(
            version.level_count() == 1,
            "FIFO compaction needs a single-level layout",
        );

        let tables = version.level(0);
        let cap = self.core.opts.fifo.max_table_files_size;

        let mut total_size = tables.compensated_size();

        if total_size <= cap || tables.is_empty() {
            log::trace!(
                "fifo: nothing to do, total size {total_size}, max size {cap}",
            );
            return None;
        }

        if self.core.registry.num_live(0) > 0 {
            // Deleting tables is nearly free, one pass at a time is plenty
            log::trace!("fifo: eviction already running");
            return None;
        }

        let id = self.core.next_plan_id();
        let mut plan = CompactionPlan::new(
            id,
            version.clone(),
            0,
            0,
            0,
            0,
            0,
            CompressionType::None,
        );
        plan.is_deletion_compaction = true;

        // Delete the oldest tables until the cap holds again
        for table in tables.iter().rev() {
            total_size -= table.compensated_file_size;
            plan.inputs[0].tables.push(table.clone());

            log::debug!(
                "fifo: picking table #{} with size {} for deletion",
                table.id,
                table.file_size,
            );

            if total_size <= cap {
                break;
            }
        }

        plan.mark_tables_being_compacted(true);
        self.core.registry.register(&plan);

        Some(plan)
    }

    fn compact_range(
        &mut self,
        _mutable: &MutableOptions,
        version: &Arc<Version>,
        input_level: usize,
        output_level: usize,
        output_path_id: u32,
        _begin: Option<&InternalKey>,
        _end: Option<&InternalKey>,
        compaction_end: &mut Option<InternalKey>,
    ) -> crate::Result<Option<CompactionPlan>> {
        assert!(input_level == 0, "FIFO compaction only knows level 0");
        assert!(output_level == 0, "FIFO compaction only knows level 0");

        *compaction_end = None;

        // A FIFO range request is just a nudge to evict now; the key range
        // is irrelevant because tables are only ever dropped whole
        let mut plan = self.pick_compaction(_mutable, version);

        if let Some(plan) = &mut plan {
            plan.output_path_id = output_path_id;
        }

        Ok(plan)
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

    fn fixture_opts(limit: u64) -> Arc<Options> {
        let mut opts = Options::default()
            .with_compaction_style(CompactionStyle::Fifo)
            .with_level_count(1);
        opts.fifo.max_table_files_size = limit;
        Arc::new(opts)
    }

    // newest -> oldest
    fn fixture_version(sizes: &[u64]) -> Arc<Version> {
        let count = sizes.len() as u64;

        let tables = sizes
            .iter()
            .enumerate()
            .map(|(idx, size)| {
                let seqno = count - idx as u64;

                Arc::new(
                    TableMeta::new(
                        idx as TableId + 1,
                        InternalKey::new("a", seqno, ValueType::Value),
                        InternalKey::new("z", seqno, ValueType::Value),
                        *size,
                    )
                    .with_seqno_range(seqno, seqno),
                )
            })
            .collect();

        Arc::new(Version::new(vec![tables]))
    }

    #[test]
    fn fifo_below_limit_does_nothing() {
        let mut picker = FifoPicker::new(fixture_opts(100));
        let version = fixture_version(&[30, 30, 30]);

        assert!(picker
            .pick_compaction(&MutableOptions::default(), &version)
            .is_none());
    }

    #[test]
    fn fifo_evicts_oldest_first() {
        let mut picker = FifoPicker::new(fixture_opts(100));
        let version = fixture_version(&[30, 30, 30, 30]);

        let plan = picker
            .pick_compaction(&MutableOptions::default(), &version)
            .expect("should evict");

        assert!(plan.is_deletion_compaction());
        assert_eq!(CompressionType::None, plan.compression());

        // 120 bytes total; dropping the oldest 30-byte table is enough
        let ids: Vec<_> = plan.input_tables(0).iter().map(|t| t.id).collect();
        assert_eq!(vec![4], ids);
    }

    #[test]
    fn fifo_evicts_until_under_limit() {
        let mut picker = FifoPicker::new(fixture_opts(25));
        let version = fixture_version(&[10, 10, 10, 10]);

        let plan = picker
            .pick_compaction(&MutableOptions::default(), &version)
            .expect("should evict");

        // 40 bytes total; two tables have to go
        let ids: Vec<_> = plan.input_tables(0).iter().map(|t| t.id).collect();
        assert_eq!(vec![4, 3], ids);
    }

    #[test]
    fn fifo_one_eviction_at_a_time() {
        let mut picker = FifoPicker::new(fixture_opts(100));
        let version = fixture_version(&[60, 60, 60]);

        let first = picker
            .pick_compaction(&MutableOptions::default(), &version)
            .expect("should evict");

        assert!(picker
            .pick_compaction(&MutableOptions::default(), &version)
            .is_none());

        picker.release_compaction_tables(first, &Ok(()));

        assert!(picker
            .pick_compaction(&MutableOptions::default(), &version)
            .is_some());
    }

    #[test]
    fn fifo_compact_range_delegates() {
        let mut picker = FifoPicker::new(fixture_opts(100));
        let version = fixture_version(&[60, 60, 60]);

        let mut compaction_end = None;
        let plan = picker
            .compact_range(
                &MutableOptions::default(),
                &version,
                0,
                0,
                0,
                None,
                None,
                &mut compaction_end,
            )
            .expect("valid request")
            .expect("should evict");

        assert!(plan.is_deletion_compaction());
        assert!(compaction_end.is_none());

        picker.release_compaction_tables(plan, &Ok(()));
    }
}
