// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::key::InternalKey;

/// A key range in the format of [min, max] (inclusive on both sides)
///
/// Endpoints are internal keys; overlap tests between tables compare
/// user keys only, because a user key split across two tables overlaps
/// itself no matter which sequence numbers are involved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRange((InternalKey, InternalKey));

impl std::fmt::Display for KeyRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}<=>{}]",
            String::from_utf8_lossy(&self.0 .0.user_key),
            String::from_utf8_lossy(&self.0 .1.user_key),
        )
    }
}

impl KeyRange {
    /// Creates a new key range.
    #[must_use]
    pub fn new(range: (InternalKey, InternalKey)) -> Self {
        Self(range)
    }

    /// Returns the lower endpoint.
    #[must_use]
    pub fn min(&self) -> &InternalKey {
        &self.0 .0
    }

    /// Returns the upper endpoint.
    #[must_use]
    pub fn max(&self) -> &InternalKey {
        &self.0 .1
    }

    /// Returns `true` if `other` overlaps at least partially with this range,
    /// compared on user keys.
    ///
    /// Both endpoint orderings are checked explicitly, so a range nested
    /// inside another classifies as overlapping.
    #[must_use]
    pub fn overlaps_with_key_range(&self, other: &Self) -> bool {
        let (start1, end1) = (&self.0 .0.user_key, &self.0 .1.user_key);
        let (start2, end2) = (&other.0 .0.user_key, &other.0 .1.user_key);
        start1 <= end2 && start2 <= end1
    }

    /// Aggregates the key ranges, using the internal key order.
    ///
    /// # Panics
    ///
    /// Panics on empty input; an empty table set has no meaningful range.
    #[must_use]
    pub fn aggregate<'a>(mut iter: impl Iterator<Item = &'a Self>) -> Self {
        let first = iter.next().expect("cannot aggregate empty key range set");

        let mut min = first.min();
        let mut max = first.max();

        for other in iter {
            let x = other.min();
            if x < min {
                min = x;
            }

            let x = other.max();
            if x > max {
                max = x;
            }
        }

        Self((min.clone(), max.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::ValueType;
    use test_log::test;

    fn string_key_range(a: &str, b: &str) -> KeyRange {
        KeyRange::new((
            InternalKey::new(a, 0, ValueType::Value),
            InternalKey::new(b, 0, ValueType::Value),
        ))
    }

    #[test]
    fn key_range_overlap() {
        let a = string_key_range("a", "f");
        let b = string_key_range("b", "h");
        assert!(a.overlaps_with_key_range(&b));
        assert!(b.overlaps_with_key_range(&a));
    }

    #[test]
    fn key_range_overlap_edge() {
        let a = string_key_range("a", "f");
        let b = string_key_range("f", "t");
        assert!(a.overlaps_with_key_range(&b));
    }

    #[test]
    fn key_range_no_overlap() {
        let a = string_key_range("a", "f");
        let b = string_key_range("g", "t");
        assert!(!a.overlaps_with_key_range(&b));
        assert!(!b.overlaps_with_key_range(&a));
    }

    #[test]
    fn key_range_nested() {
        let outer = string_key_range("a", "z");
        let inner = string_key_range("m", "n");
        assert!(outer.overlaps_with_key_range(&inner));
        assert!(inner.overlaps_with_key_range(&outer));
    }

    #[test]
    fn key_range_aggregate() {
        let ranges = [
            string_key_range("d", "f"),
            string_key_range("a", "b"),
            string_key_range("h", "t"),
        ];
        let aggregated = KeyRange::aggregate(ranges.iter());
        assert_eq!(b"a", &*aggregated.min().user_key);
        assert_eq!(b"t", &*aggregated.max().user_key);
    }
}
