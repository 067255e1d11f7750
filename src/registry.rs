// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{plan::CompactionPlan, table::total_compensated_size, table::TableMeta, HashMap};
use std::sync::Arc;

// What the registry remembers about a live plan: enough to account for the
// bytes its source level has in flight.
struct LivePlan {
    source_tables: Vec<Arc<TableMeta>>,
}

/// Tracks the compactions currently being executed, per source level
///
/// The registry is how concurrent picks stay out of each other's way:
/// a level's score is computed net of the bytes already in flight, level 0
/// admits only one live plan at a time, and FIFO refuses to run two
/// eviction passes concurrently.
#[derive(Default)]
pub(crate) struct CompactionRegistry {
    levels: Vec<HashMap<u64, LivePlan>>,
}

impl CompactionRegistry {
    pub(crate) fn new(level_count: usize) -> Self {
        let mut levels = Vec::with_capacity(level_count);
        levels.resize_with(level_count, HashMap::default);
        Self { levels }
    }

    pub(crate) fn register(&mut self, plan: &CompactionPlan) {
        let entry = LivePlan {
            source_tables: plan.input_tables(0).to_vec(),
        };

        let level = self.level_mut(plan.level());
        let previous = level.insert(plan.id, entry);
        assert!(previous.is_none(), "compaction plan registered twice");
    }

    pub(crate) fn remove(&mut self, level: usize, plan_id: u64) -> bool {
        self.level_mut(level).remove(&plan_id).is_some()
    }

    pub(crate) fn num_live(&self, level: usize) -> usize {
        self.levels.get(level).map_or(0, HashMap::len)
    }

    /// Sum of the compensated sizes of all source tables currently being
    /// compacted out of the given level.
    pub(crate) fn bytes_being_compacted(&self, level: usize) -> u64 {
        self.levels.get(level).map_or(0, |plans| {
            plans
                .values()
                .map(|plan| total_compensated_size(&plan.source_tables))
                .sum()
        })
    }

    fn level_mut(&mut self, level: usize) -> &mut HashMap<u64, LivePlan> {
        assert!(level < self.levels.len(), "level {level} does not exist");
        &mut self.levels[level]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CompressionType, InternalKey, TableMeta, ValueType, Version};
    use test_log::test;

    fn fixture_plan(id: u64, level: usize, sizes: &[u64]) -> CompactionPlan {
        let tables: Vec<_> = sizes
            .iter()
            .enumerate()
            .map(|(idx, size)| {
                Arc::new(TableMeta::new(
                    id * 100 + idx as u64,
                    InternalKey::new(format!("{idx}"), 0, ValueType::Value),
                    InternalKey::new(format!("{idx}x"), 0, ValueType::Value),
                    *size,
                ))
            })
            .collect();

        let version = Arc::new(Version::new(vec![vec![], vec![], vec![]]));

        let mut plan = CompactionPlan::new(
            id,
            version,
            level,
            level + 1,
            0,
            0,
            0,
            CompressionType::None,
        );
        plan.inputs[0].tables = tables;
        plan
    }

    #[test]
    fn registry_accounting() {
        let mut registry = CompactionRegistry::new(3);

        let a = fixture_plan(1, 1, &[10, 20]);
        let b = fixture_plan(2, 1, &[5]);

        registry.register(&a);
        registry.register(&b);

        assert_eq!(2, registry.num_live(1));
        assert_eq!(35, registry.bytes_being_compacted(1));
        assert_eq!(0, registry.bytes_being_compacted(0));

        assert!(registry.remove(1, a.id));
        assert_eq!(1, registry.num_live(1));
        assert_eq!(5, registry.bytes_being_compacted(1));

        // removing again is a no-op
        assert!(!registry.remove(1, a.id));
        assert_eq!(1, registry.num_live(1));
    }
}
