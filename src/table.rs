// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{key::InternalKey, key_range::KeyRange, SeqNo};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Unique table (SST) number
pub type TableId = u64;

/// Metadata of a table (SST) on disk
///
/// The picker never opens the table itself; everything it needs to know
/// is carried here.
pub struct TableMeta {
    /// Table number, unique within the engine
    pub id: TableId,

    /// Index of the storage path the table lives in
    pub path_id: u32,

    /// Physical size in bytes
    pub file_size: u64,

    /// Physical size, inflated by a heuristic for the bytes that
    /// compacting away the table's tombstones will reclaim
    ///
    /// Tables full of tombstones compact earlier this way.
    pub compensated_file_size: u64,

    /// Smallest internal key in the table
    pub smallest: InternalKey,

    /// Largest internal key in the table
    pub largest: InternalKey,

    /// Smallest sequence number in the table
    pub smallest_seqno: SeqNo,

    /// Largest sequence number in the table
    pub largest_seqno: SeqNo,

    // Flipped while a compaction holds the table as input, under the
    // engine mutex; Relaxed is enough because the mutex orders all access.
    being_compacted: AtomicBool,
}

impl TableMeta {
    /// Creates new table metadata.
    ///
    /// The compensated size defaults to the physical size and the sequence
    /// number range to the endpoint keys' sequence numbers.
    #[must_use]
    pub fn new(id: TableId, smallest: InternalKey, largest: InternalKey, file_size: u64) -> Self {
        let smallest_seqno = smallest.seqno.min(largest.seqno);
        let largest_seqno = smallest.seqno.max(largest.seqno);

        Self {
            id,
            path_id: 0,
            file_size,
            compensated_file_size: file_size,
            smallest,
            largest,
            smallest_seqno,
            largest_seqno,
            being_compacted: AtomicBool::new(false),
        }
    }

    /// Sets the compensated size.
    #[must_use]
    pub fn with_compensated_file_size(mut self, bytes: u64) -> Self {
        self.compensated_file_size = bytes;
        self
    }

    /// Sets the sequence number range.
    #[must_use]
    pub fn with_seqno_range(mut self, smallest: SeqNo, largest: SeqNo) -> Self {
        self.smallest_seqno = smallest;
        self.largest_seqno = largest;
        self
    }

    /// Sets the storage path index.
    #[must_use]
    pub fn with_path_id(mut self, path_id: u32) -> Self {
        self.path_id = path_id;
        self
    }

    /// Returns `true` if the table is input to a running compaction.
    pub fn is_being_compacted(&self) -> bool {
        self.being_compacted.load(Ordering::Relaxed)
    }

    /// Sets whether the table is input to a running compaction.
    pub fn set_being_compacted(&self, flag: bool) {
        self.being_compacted.store(flag, Ordering::Relaxed);
    }

    /// Returns the table's key range.
    #[must_use]
    pub fn key_range(&self) -> KeyRange {
        KeyRange::new((self.smallest.clone(), self.largest.clone()))
    }
}

impl std::fmt::Debug for TableMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Table:{}[{:?}<=>{:?}]{}b{}",
            self.id,
            self.smallest,
            self.largest,
            self.file_size,
            if self.is_being_compacted() { "*" } else { "" },
        )
    }
}

/// Sums the compensated sizes of the given tables.
#[must_use]
pub(crate) fn total_compensated_size<'a, I: IntoIterator<Item = &'a Arc<TableMeta>>>(
    tables: I,
) -> u64 {
    tables
        .into_iter()
        .map(|t| t.compensated_file_size)
        .sum::<u64>()
}

/// Aggregates the key range of a list of tables.
///
/// # Panics
///
/// Panics on empty input.
#[must_use]
pub(crate) fn aggregate_key_range<'a, I: IntoIterator<Item = &'a Arc<TableMeta>>>(
    tables: I,
) -> KeyRange {
    let mut iter = tables.into_iter();

    #[allow(clippy::expect_used)]
    let first = iter
        .next()
        .expect("cannot aggregate key range of zero tables");

    let mut smallest = &first.smallest;
    let mut largest = &first.largest;

    for table in iter {
        if table.smallest < *smallest {
            smallest = &table.smallest;
        }
        if table.largest > *largest {
            largest = &table.largest;
        }
    }

    KeyRange::new((smallest.clone(), largest.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ValueType;
    use test_log::test;

    fn fixture_table(id: TableId, min: &str, max: &str) -> Arc<TableMeta> {
        Arc::new(TableMeta::new(
            id,
            InternalKey::new(min, 0, ValueType::Value),
            InternalKey::new(max, 0, ValueType::Value),
            1,
        ))
    }

    #[test]
    fn table_aggregate_key_range() {
        let tables = [
            fixture_table(1, "d", "f"),
            fixture_table(2, "a", "c"),
            fixture_table(3, "x", "z"),
        ];

        let range = aggregate_key_range(&tables);
        assert_eq!(b"a", &*range.min().user_key);
        assert_eq!(b"z", &*range.max().user_key);
    }

    #[test]
    fn table_being_compacted_flag() {
        let table = fixture_table(1, "a", "b");
        assert!(!table.is_being_compacted());

        table.set_being_compacted(true);
        assert!(table.is_being_compacted());

        table.set_being_compacted(false);
        assert!(!table.is_being_compacted());
    }
}
