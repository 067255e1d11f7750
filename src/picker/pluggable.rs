// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Compaction picking through an externally provided strategy

use super::{compaction_inputs_from_table_ids, CompactionPicker, PickerCore};
use crate::{
    key::InternalKey,
    plan::CompactionPlan,
    version::Version,
    CompressionType, MutableOptions, Options, TableId,
};
use std::{collections::BTreeSet, sync::Arc};

/// How an [`ExternalCompactor`]'s output should be written
#[derive(Clone, Debug)]
pub struct CompactionOptions {
    /// Size cap for output tables; `u64::MAX` means a single output table
    pub output_table_size_limit: u64,

    /// Compression for output tables
    pub compression: CompressionType,
}

impl Default for CompactionOptions {
    fn default() -> Self {
        Self {
            output_table_size_limit: u64::MAX,
            compression: CompressionType::Lz4,
        }
    }
}

/// An externally provided compaction strategy
///
/// Implementations inspect the [`Version`] and nominate table numbers plus
/// an output level; the [`PluggablePicker`] validates the nomination,
/// closes it over key-range overlap and wraps it into a plan. A strategy
/// can therefore never corrupt the tree, only propose work.
pub trait ExternalCompactor {
    /// Nominates tables for the next compaction, or `None` for "no work".
    ///
    /// # Errors
    ///
    /// May fail with a strategy-specific error; the pick is then skipped.
    fn pick_compaction(
        &self,
        version: &Version,
    ) -> crate::Result<Option<(Vec<TableId>, usize)>>;

    /// Nominates tables for a user-requested compaction from `input_level`
    /// to `output_level`, or `None` for "no work".
    ///
    /// # Errors
    ///
    /// May fail with a strategy-specific error.
    fn pick_compaction_by_range(
        &self,
        version: &Version,
        input_level: usize,
        output_level: usize,
    ) -> crate::Result<Option<Vec<TableId>>>;

    /// How the compaction output should be written.
    fn compact_options(&self) -> CompactionOptions;
}

/// Compaction picker that delegates selection to an [`ExternalCompactor`]
///
/// Without a compactor installed, it never picks anything.
pub struct PluggablePicker {
    core: PickerCore,
    compactor: Option<Arc<dyn ExternalCompactor>>,
}

impl PluggablePicker {
    /// Creates a new pluggable picker around the given strategy.
    #[must_use]
    pub fn new(opts: Arc<Options>, compactor: Arc<dyn ExternalCompactor>) -> Self {
        Self {
            core: PickerCore::new(opts),
            compactor: Some(compactor),
        }
    }

    /// Creates a pluggable picker with no strategy installed.
    #[must_use]
    pub fn disabled(opts: Arc<Options>) -> Self {
        Self {
            core: PickerCore::new(opts),
            compactor: None,
        }
    }

    fn materialize(
        &mut self,
        ids: Vec<TableId>,
        output_level: usize,
        compact_options: &CompactionOptions,
        version: &Arc<Version>,
        mutable: &MutableOptions,
    ) -> crate::Result<CompactionPlan> {
        let mut input_set: BTreeSet<TableId> = ids.into_iter().collect();

        self.sanitize_compaction_input_tables(&mut input_set, version, output_level)?;

        let inputs = compaction_inputs_from_table_ids(version, &mut input_set)?;

        let plan = self
            .core
            .form_plan(compact_options, inputs, output_level, version, mutable);

        self.core.registry.register(&plan);

        Ok(plan)
    }
}

impl CompactionPicker for PluggablePicker {
    fn get_name(&self) -> &'static str {
        "PluggableCompactionPicker"
    }

    fn max_output_level(&self) -> usize {
        self.core.opts.level_count - 1
    }

    fn pick_compaction(
        &mut self,
        mutable: &MutableOptions,
        version: &Arc<Version>,
    ) -> Option<CompactionPlan> {
        let compactor = self.compactor.clone()?;

        let picked = match compactor.pick_compaction(version) {
            Ok(picked) => picked,
            Err(e) => {
                log::warn!("pluggable: strategy failed to pick: {e}");
                return None;
            }
        };

        let (ids, output_level) = picked?;
        if ids.is_empty() {
            return None;
        }

        match self.materialize(
            ids,
            output_level,
            &compactor.compact_options(),
            version,
            mutable,
        ) {
            Ok(plan) => Some(plan),
            Err(e) => {
                log::warn!("pluggable: rejecting picked tables: {e}");
                None
            }
        }
    }

    fn compact_range(
        &mut self,
        mutable: &MutableOptions,
        version: &Arc<Version>,
        input_level: usize,
        output_level: usize,
        _output_path_id: u32,
        _begin: Option<&InternalKey>,
        _end: Option<&InternalKey>,
        compaction_end: &mut Option<InternalKey>,
    ) -> crate::Result<Option<CompactionPlan>> {
        *compaction_end = None;

        let Some(compactor) = self.compactor.clone() else {
            return Ok(None);
        };

        let Some(ids) =
            compactor.pick_compaction_by_range(version, input_level, output_level)?
        else {
            return Ok(None);
        };

        if ids.is_empty() {
            return Ok(None);
        }

        self.materialize(
            ids,
            output_level,
            &compactor.compact_options(),
            version,
            mutable,
        )
        .map(Some)
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
    use crate::{Error, TableMeta, ValueType};
    use test_log::test;

    struct FixedCompactor {
        ids: Vec<TableId>,
        output_level: usize,
    }

    impl ExternalCompactor for FixedCompactor {
        fn pick_compaction(
            &self,
            _version: &Version,
        ) -> crate::Result<Option<(Vec<TableId>, usize)>> {
            Ok(Some((self.ids.clone(), self.output_level)))
        }

        fn pick_compaction_by_range(
            &self,
            _version: &Version,
            _input_level: usize,
            _output_level: usize,
        ) -> crate::Result<Option<Vec<TableId>>> {
            Ok(Some(self.ids.clone()))
        }

        fn compact_options(&self) -> CompactionOptions {
            CompactionOptions::default()
        }
    }

    fn key(k: &str) -> InternalKey {
        InternalKey::new(k, 0, ValueType::Value)
    }

    fn fixture_table(id: TableId, min: &str, max: &str) -> Arc<TableMeta> {
        Arc::new(TableMeta::new(id, key(min), key(max), 10))
    }

    fn fixture_version() -> Arc<Version> {
        Arc::new(Version::new(vec![
            vec![],
            vec![fixture_table(1, "a", "e"), fixture_table(2, "k", "p")],
            vec![fixture_table(3, "c", "f"), fixture_table(4, "x", "z")],
        ]))
    }

    #[test]
    fn pluggable_without_strategy_is_inert() {
        let mut picker =
            PluggablePicker::disabled(Arc::new(Options::default().with_level_count(3)));

        assert!(picker
            .pick_compaction(&MutableOptions::default(), &fixture_version())
            .is_none());
    }

    #[test]
    fn pluggable_materializes_sanitized_inputs() {
        let compactor = Arc::new(FixedCompactor {
            ids: vec![1],
            output_level: 2,
        });

        let mut picker = PluggablePicker::new(
            Arc::new(Options::default().with_level_count(3)),
            compactor,
        );

        let plan = picker
            .pick_compaction(&MutableOptions::default(), &fixture_version())
            .expect("should build a plan");

        // table 3 overlaps the nominated table 1 and is pulled in;
        // the plan spans levels 1..=2
        assert_eq!(1, plan.level());
        assert_eq!(2, plan.output_level());
        assert_eq!(2, plan.inputs().len());
        assert_eq!(vec![1], plan.input_tables(0).iter().map(|t| t.id).collect::<Vec<_>>());
        assert_eq!(vec![3], plan.input_tables(1).iter().map(|t| t.id).collect::<Vec<_>>());

        assert!(plan.input_tables(0).iter().all(|t| t.is_being_compacted()));
        assert_eq!(10, picker.size_being_compacted(1));

        picker.release_compaction_tables(plan, &Ok(()));
        assert_eq!(0, picker.size_being_compacted(1));
    }

    #[test]
    fn pluggable_rejects_unknown_tables() {
        let compactor = Arc::new(FixedCompactor {
            ids: vec![42],
            output_level: 2,
        });

        let mut picker = PluggablePicker::new(
            Arc::new(Options::default().with_level_count(3)),
            compactor,
        );

        assert!(picker
            .pick_compaction(&MutableOptions::default(), &fixture_version())
            .is_none());
    }

    #[test]
    fn pluggable_range_surfaces_errors() {
        let compactor = Arc::new(FixedCompactor {
            ids: vec![42],
            output_level: 2,
        });

        let mut picker = PluggablePicker::new(
            Arc::new(Options::default().with_level_count(3)),
            compactor,
        );

        let mut compaction_end = None;
        let result = picker.compact_range(
            &MutableOptions::default(),
            &fixture_version(),
            1,
            2,
            0,
            None,
            None,
            &mut compaction_end,
        );

        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
}
