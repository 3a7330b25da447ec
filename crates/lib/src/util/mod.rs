//! Shared utilities.
//!
//! Digest helpers used by the fetcher and test helpers.

pub mod hash;

#[cfg(test)]
pub mod testutil;
