use std::fmt::Debug;

use stratum_error::StratumResult;

/// A single reversible byte-stream transform.
///
/// Filters are constructed from a [`crate::FilterSpec`] at schema-definition time and
/// are immutable afterwards. `reverse` must undo `apply` exactly for every input the
/// filter accepts.
pub trait Filter: Debug + Send + Sync {
    /// Transform raw bytes into their filtered form.
    fn apply(&self, input: &[u8]) -> StratumResult<Vec<u8>>;

    /// Undo [`Filter::apply`], recovering the exact input bytes.
    fn reverse(&self, input: &[u8]) -> StratumResult<Vec<u8>>;

    /// A short human-readable description of the filter and its options.
    fn describe(&self) -> String;

    /// Whether the filter recovers its input bit-for-bit. All shipped filters do;
    /// the pipeline rejects any that does not.
    fn is_lossless(&self) -> bool {
        true
    }
}
