use compaction_picker::{
    CompactionPicker, InternalKey, LeveledPicker, MutableOptions, Options, TableMeta, ValueType,
    Version,
};
use std::sync::Arc;
use test_log::test;

fn key(k: &str) -> InternalKey {
    InternalKey::new(k, 0, ValueType::Value)
}

fn table(id: u64, min: &str, max: &str, size: u64) -> Arc<TableMeta> {
    Arc::new(TableMeta::new(id, key(min), key(max), size))
}

#[test]
fn leveled_trivial() {
    let mut picker = LeveledPicker::new(Arc::new(Options::default().with_level_count(3)));

    // level 1 sits at 1.5x its byte budget, B is the largest table;
    // the small table target keeps opportunistic widening away
    let mutable = MutableOptions::default()
        .with_max_bytes_for_level_base(200)
        .with_target_table_size_base(4);

    let a = table(1, "01", "10", 90);
    let b = table(2, "20", "30", 120);
    let c = table(3, "40", "50", 90);
    let parent = table(4, "25", "45", 100);

    let version = Arc::new(Version::new(vec![
        vec![],
        vec![a, b, c],
        vec![parent],
    ]));

    let plan = picker
        .pick_compaction(&mutable, &version)
        .expect("level 1 should be compacted");

    assert_eq!(1, plan.level());
    assert_eq!(2, plan.output_level());

    let source: Vec<_> = plan.input_tables(0).iter().map(|t| t.id).collect();
    assert_eq!(vec![2], source);

    let parents: Vec<_> = plan.input_tables(1).iter().map(|t| t.id).collect();
    assert_eq!(vec![4], parents);

    assert!(plan.grandparents().is_empty());
    assert!(plan.score() >= 1.0);
    assert!(!plan.is_manual_compaction());

    // a second pick sees the claimed bytes and leaves level 1 alone
    assert!(picker.pick_compaction(&mutable, &version).is_none());

    picker.release_compaction_tables(plan, &Ok(()));
}
