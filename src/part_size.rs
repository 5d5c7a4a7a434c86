//! Optimal part-size calculator
//!
//! Maps a declared upload size to an S3 part size that satisfies both the
//! 5 MiB minimum part size and the 10,000-part ceiling.

/// Minimum S3 multipart part size (all but the last part must meet this).
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum number of parts in a single S3 multipart upload.
pub const MAX_MULTIPART_PARTS: u64 = 10_000;

/// Default preferred part size absent an explicit override.
pub const DEFAULT_PREFERRED_PART_SIZE: u64 = 8 * 1024 * 1024;

/// Compute the part size to use for an upload of `size` bytes, given a
/// `preferred_part_size` (the caller's configured target, typically
/// [`DEFAULT_PREFERRED_PART_SIZE`]).
///
/// Callers must know `size` in advance; this function must not be called
/// for a defer-length upload before the length is declared.
pub fn calc_optimal_part_size(size: u64, preferred_part_size: u64) -> u64 {
    if size <= preferred_part_size {
        size
    } else if size <= preferred_part_size * MAX_MULTIPART_PARTS {
        preferred_part_size
    } else {
        size.div_ceil(MAX_MULTIPART_PARTS)
    }
}
