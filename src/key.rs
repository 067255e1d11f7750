// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::UserKey;
use std::cmp::Reverse;

/// Sequence number, a monotonically increasing counter
///
/// Tables remember the sequence number range of the items they hold;
/// the picker uses it to keep level 0 ordered newest to oldest.
pub type SeqNo = u64;

/// Value type tag carried by an internal key
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ValueType {
    /// Existing value
    Value,

    /// Deleted value
    Tombstone,
}

/// An internal key: a user key qualified by the sequence number that wrote it
#[derive(Clone, Eq)]
pub struct InternalKey {
    /// User key
    pub user_key: UserKey,

    /// Sequence number
    pub seqno: SeqNo,

    /// Value type tag
    pub value_type: ValueType,
}

impl InternalKey {
    /// Creates a new internal key.
    ///
    /// # Panics
    ///
    /// Panics if the user key is longer than 2^16 bytes.
    pub fn new<K: Into<UserKey>>(user_key: K, seqno: SeqNo, value_type: ValueType) -> Self {
        let user_key = user_key.into();

        assert!(
            u16::try_from(user_key.len()).is_ok(),
            "keys can be 65535 bytes in length",
        );

        Self {
            user_key,
            seqno,
            value_type,
        }
    }
}

impl AsRef<[u8]> for InternalKey {
    fn as_ref(&self) -> &[u8] {
        &self.user_key
    }
}

impl PartialEq for InternalKey {
    fn eq(&self, other: &Self) -> bool {
        self.user_key == other.user_key && self.seqno == other.seqno
    }
}

impl std::fmt::Debug for InternalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            String::from_utf8_lossy(&self.user_key),
            self.seqno,
            match self.value_type {
                ValueType::Value => "V",
                ValueType::Tombstone => "T",
            },
        )
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// Order by user key, THEN by sequence number descending,
// so that for the same user key the newest entry sorts first.
// This is the total order every overlap and boundary decision relies on.
impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.user_key, Reverse(self.seqno)).cmp(&(&other.user_key, Reverse(other.seqno)))
    }
}
