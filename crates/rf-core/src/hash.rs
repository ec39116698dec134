//! Hash functions for the request filter
//!
//! Checksums are xxHash64 over the raw payload bytes (everything after the
//! version header), rendered as 16 lowercase hex digits. The value is stable
//! across runs and platforms, so it can be persisted next to rule sources.
//!
//! # N-grams
//!
//! The rules index keys candidate lists by 5-byte n-grams packed into a
//! `u64`. N-grams never span the `*` and `^` pattern placeholders and are
//! always built from lowercased bytes, on both the rule and the URL side.

use std::hash::Hasher;

use twox_hash::XxHash64;

/// Seed for persistent checksums. Changing it invalidates every stored index.
const CHECKSUM_SEED: u64 = 0;

/// Length of index n-grams in bytes.
pub const NGRAM_SIZE: usize = 5;

/// Compute the persistent checksum of a payload.
pub fn checksum(data: &[u8]) -> String {
    let mut hasher = XxHash64::with_seed(CHECKSUM_SEED);
    hasher.write(data);
    format!("{:016x}", hasher.finish())
}

/// Pack an n-gram window into a `u64`.
#[inline]
fn pack_ngram(window: &[u8]) -> u64 {
    window
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | b.to_ascii_lowercase() as u64)
}

#[inline]
fn is_placeholder(b: u8) -> bool {
    b == b'*' || b == b'^'
}

/// Iterate over every n-gram of `text`, skipping windows that contain a
/// `*` or `^` placeholder.
pub fn ngrams(text: &[u8]) -> impl Iterator<Item = u64> + '_ {
    text.windows(NGRAM_SIZE)
        .filter(|window| !window.iter().copied().any(is_placeholder))
        .map(pack_ngram)
}
