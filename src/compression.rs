// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Compression algorithm to use for a compaction's output tables
///
/// The picker only *selects* a compression type per output level;
/// applying it is up to the table writer.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum CompressionType {
    /// No compression
    None,

    /// LZ4 compression
    ///
    /// Recommended for use cases with a focus
    /// on speed over compression ratio.
    #[default]
    Lz4,

    /// Zlib/DEFLATE compression with a compression level
    ///
    /// Recommended for cold levels with a focus
    /// on compression ratio over speed.
    Zlib(u8),
}

impl std::fmt::Display for CompressionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::None => "no compression",
                Self::Lz4 => "lz4",
                Self::Zlib(_) => "zlib",
            }
        )
    }
}
