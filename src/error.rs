// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Represents errors that can occur when validating a compaction request
///
/// Picking itself is infallible: a picker that finds no work returns no plan,
/// which is not an error. Errors only arise for externally supplied inputs
/// (see the input sanitizer and the range planner).
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The request itself is malformed (unknown table number, empty input
    /// set, output level out of bounds, ...)
    InvalidArgument(String),

    /// The request is well-formed, but conflicts with a compaction that is
    /// currently running; it may succeed when retried later
    Aborted(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Aborted(msg) => write!(f, "aborted: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// Picker result
pub type Result<T> = std::result::Result<T, Error>;
