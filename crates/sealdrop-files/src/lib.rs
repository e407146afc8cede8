//! # sealdrop Files
//!
//! File handling for the sealdrop transfer protocol.
//!
//! This crate provides:
//! - Byte-offset partitioning of a source file into fixed-size chunks
//! - The 16-bit per-chunk checksum
//! - The 128-bit whole-file digest
//! - Writing the reassembled file on the receiving side

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunker;
pub mod integrity;

pub use chunker::{FileChunker, sanitize_file_name, write_reassembled};
pub use integrity::{Digest128, FileDigest, checksum, digest};

/// Default chunk size (1 KiB).
pub const DEFAULT_CHUNK_SIZE: u32 = 1024;

/// Largest chunk size either endpoint accepts (8 MiB).
///
/// An encrypted chunk plus framing must stay below the transport's 16 MiB
/// frame limit.
pub const MAX_CHUNK_SIZE: u32 = 8 * 1024 * 1024;

/// Number of chunks a file of `file_size` bytes splits into.
///
/// `ceil(file_size / chunk_size)`; an empty file has zero chunks.
///
/// # Panics
///
/// Panics if `chunk_size` is zero.
#[must_use]
pub fn chunk_count(file_size: u64, chunk_size: u32) -> u64 {
    file_size.div_ceil(u64::from(chunk_size))
}
