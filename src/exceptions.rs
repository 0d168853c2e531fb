//! ## Custom Errors for srtree
//!
//! This module defines custom errors and exceptions used internally by this crate.

use std::error::Error;
use std::fmt;
use std::io;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Represents errors specific to invalid operations or parameters in srtree.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug)]
pub enum SrtreeError {
    /// `signature()` was called with an empty string or an empty string set.
    EmptyString,
    /// `q < 1` was requested for a q-gram scheme.
    InvalidQ { q: usize },
    /// Fan-out bounds violate `2 <= m <= M/2`.
    InvalidCapacity { m: usize, big_m: usize },
    /// The leading version byte of a serialized blob doesn't match this
    /// implementation's version.
    VersionMismatch { expected: u8, found: u8 },
    /// `edit_distance > 0` was requested against a scheme that only supports
    /// exact matches (the StringSet scheme).
    UnsupportedEditDistance { scheme: &'static str, k: usize },
    /// A consistency check (`--check`-equivalent) failed during a build stage.
    ConsistencyCheckFailed { stage: &'static str, detail: String },
    /// The underlying byte stream failed.
    Io(String),
}

impl fmt::Display for SrtreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SrtreeError::EmptyString => {
                write!(f, "Empty string (or empty string set) is not allowed")
            }
            SrtreeError::InvalidQ { q } => {
                write!(f, "Invalid q-gram length: {q}. q must be >= 1.")
            }
            SrtreeError::InvalidCapacity { m, big_m } => {
                write!(
                    f,
                    "Invalid fan-out bounds: m={m}, M={big_m}. Must satisfy 2 <= m <= M/2."
                )
            }
            SrtreeError::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Serialized blob version mismatch: expected {expected}, found {found}"
                )
            }
            SrtreeError::UnsupportedEditDistance { scheme, k } => {
                write!(
                    f,
                    "Scheme {scheme} does not support edit distance {k} (only k=0 is supported)"
                )
            }
            SrtreeError::ConsistencyCheckFailed { stage, detail } => {
                write!(f, "Consistency check failed at stage '{stage}': {detail}")
            }
            SrtreeError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl Error for SrtreeError {}

impl From<io::Error> for SrtreeError {
    fn from(e: io::Error) -> Self {
        SrtreeError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_capacity_display() {
        let err = SrtreeError::InvalidCapacity { m: 1, big_m: 32 };
        assert_eq!(
            format!("{}", err),
            "Invalid fan-out bounds: m=1, M=32. Must satisfy 2 <= m <= M/2."
        );
    }

    #[test]
    fn test_version_mismatch_display() {
        let err = SrtreeError::VersionMismatch {
            expected: 2,
            found: 1,
        };
        assert_eq!(
            format!("{}", err),
            "Serialized blob version mismatch: expected 2, found 1"
        );
    }

    #[test]
    fn test_unsupported_edit_distance_display() {
        let err = SrtreeError::UnsupportedEditDistance {
            scheme: "stringset",
            k: 1,
        };
        assert_eq!(
            format!("{}", err),
            "Scheme stringset does not support edit distance 1 (only k=0 is supported)"
        );
    }
}
