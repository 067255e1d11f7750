// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Compaction picking for LSM-trees.
//!
//! ##### NOTE
//!
//! > This crate only provides the *decision* half of compaction: given an
//! > immutable snapshot of the on-disk table layout, it chooses which tables
//! > to merge next, into which level, and with what boundaries.
//! > It performs no I/O; executing the chosen merge (and publishing the
//! > resulting manifest change) is the job of the storage engine that
//! > embeds it.
//!
//! ##### About
//!
//! An LSM-tree accumulates immutable sorted tables (SSTs) on disk, organized
//! into levels. Level 0 may contain overlapping tables; levels 1 and up hold
//! pairwise disjoint key ranges. Background compaction merges tables to bound
//! read and space amplification.
//!
//! Choosing *what* to compact is the delicate part: a bad choice can split a
//! user key across a level boundary (serving stale data), collide with an
//! already-running compaction, or starve a level forever. This crate
//! implements that choice for three strategies, plus a hook for external
//! strategies:
//!
//! - [`LeveledPicker`] - score-driven selection from a source level into the
//!   next level
//! - [`UniversalPicker`] - size-amplification, size-ratio and file-count
//!   triggers over the level 0 runs of a tiered layout
//! - [`FifoPicker`] - age-ordered deletion once the data set exceeds a size cap
//! - [`PluggablePicker`] - delegates selection to an [`ExternalCompactor`],
//!   then sanitizes the result
//!
//! All pickers implement [`CompactionPicker`]. They are synchronous and
//! non-blocking; the embedding engine must call them under the same mutex
//! that guards manifest installation, so that every invocation observes a
//! coherent [`Version`] and in-progress state.
//!
//! # Example
//!
//! ```
//! use compaction_picker::{
//!     CompactionPicker, InternalKey, LeveledPicker, MutableOptions, Options,
//!     TableMeta, ValueType, Version,
//! };
//! use std::sync::Arc;
//!
//! fn key(k: &str, seqno: u64) -> InternalKey {
//!     InternalKey::new(k, seqno, ValueType::Value)
//! }
//!
//! let table = Arc::new(TableMeta::new(
//!     /* table number */ 1,
//!     key("a", 0),
//!     key("z", 0),
//!     /* bytes */ 64 * 1_024 * 1_024,
//! ));
//!
//! // Levels 1..n hold disjoint sorted runs; level 1 is over target size here
//! let version = Arc::new(Version::new(vec![vec![], vec![table], vec![]]));
//!
//! let mut picker = LeveledPicker::new(Arc::new(Options::default()));
//! let mutable = MutableOptions::default().with_max_bytes_for_level_base(1_024);
//!
//! if let Some(plan) = picker.pick_compaction(&mutable, &version) {
//!     assert_eq!(1, plan.level());
//!     assert_eq!(2, plan.output_level());
//!
//!     // ... hand the plan to the merge executor, then:
//!     picker.release_compaction_tables(plan, &Ok(()));
//! }
//! ```

#![doc(html_logo_url = "https://raw.githubusercontent.com/fjall-rs/lsm-tree/main/logo.png")]
#![doc(html_favicon_url = "https://raw.githubusercontent.com/fjall-rs/lsm-tree/main/logo.png")]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]

pub(crate) type HashMap<K, V> = std::collections::HashMap<K, V, rustc_hash::FxBuildHasher>;
pub(crate) type HashSet<K> = std::collections::HashSet<K, rustc_hash::FxBuildHasher>;

#[allow(unused)]
macro_rules! set {
    ($($x:expr),+ $(,)?) => {
        [$($x),+].into_iter().collect::<HashSet<_>>()
    }
}

mod config;
mod compression;
mod error;
mod key;
mod key_range;

pub mod picker;

mod plan;
mod registry;
mod slice;
mod table;
mod version;

pub use {
    compression::CompressionType,
    config::{
        CompactionStyle, DataPath, FifoCompactionOptions, MutableOptions, Options, StopStyle,
        UniversalCompactionOptions,
    },
    error::{Error, Result},
    key::{InternalKey, SeqNo, ValueType},
    key_range::KeyRange,
    picker::{
        fifo::FifoPicker,
        leveled::LeveledPicker,
        pluggable::{CompactionOptions, ExternalCompactor, PluggablePicker},
        universal::UniversalPicker,
        CompactionPicker,
    },
    plan::{CompactionInputFiles, CompactionPlan},
    slice::Slice,
    table::{TableId, TableMeta},
    version::{Level, Version},
};

/// User defined key
pub type UserKey = Slice;

/// Creates the compaction picker matching the configured compaction style.
///
/// Returns `None` for [`CompactionStyle::None`], which disables automatic
/// compaction entirely.
#[must_use]
pub fn new_compaction_picker(
    opts: std::sync::Arc<Options>,
) -> Option<Box<dyn CompactionPicker>> {
    match opts.compaction_style {
        CompactionStyle::Leveled => Some(Box::new(LeveledPicker::new(opts))),
        CompactionStyle::Universal => Some(Box::new(UniversalPicker::new(opts))),
        CompactionStyle::Fifo => Some(Box::new(FifoPicker::new(opts))),
        CompactionStyle::None => None,
    }
}
