#![deny(missing_docs)]

//! Error handling for Stratum.
//!
//! Every engine-level failure maps to exactly one [`StratumError`] variant, and every
//! variant maps to a stable integer [`ErrorCode`] for callers that cross the C ABI
//! boundary (zero is reserved for success).

pub use ext::*;

mod ext;

use std::fmt::Display;

use thiserror::Error;

/// A `Result` alias with [`StratumError`] as the error type.
pub type StratumResult<T> = Result<T, StratumError>;

/// The error taxonomy of the engine.
///
/// Validation errors (`InvalidArgument`, `Schema`, `OutOfBounds`, `FilterConfig`) are
/// raised before any mutation; `StorageIO` during fragment creation leaves the fragment
/// unsealed and invisible to readers.
#[derive(Debug, Error)]
pub enum StratumError {
    /// A caller-supplied argument is malformed (e.g. an inverted subarray range).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A schema is malformed or conflicts with itself.
    #[error("schema error: {0}")]
    Schema(String),
    /// The named array or fragment does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// An array with this name is already defined.
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// A coordinate lies outside the array domain.
    #[error("out of bounds: {0}")]
    OutOfBounds(String),
    /// Input declared as sorted violates the schema's cell order.
    #[error("unsorted input: {0}")]
    UnsortedInput(String),
    /// A filter option is invalid for the filter kind, or the filter cannot accept
    /// the data it was configured for.
    #[error("filter config error: {0}")]
    FilterConfig(String),
    /// A stored payload does not decode back to its declared shape.
    #[error("corrupt data: {0}")]
    CorruptData(String),
    /// The persistence layer failed.
    #[error("storage i/o error: {0}")]
    StorageIO(#[from] std::io::Error),
    /// A caller-supplied result buffer cannot hold the result.
    #[error("buffer too small: {0}")]
    BufferTooSmall(String),
}

impl StratumError {
    /// The stable integer code for this error, for C-ABI callers.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Schema(_) => ErrorCode::Schema,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::AlreadyExists(_) => ErrorCode::AlreadyExists,
            Self::OutOfBounds(_) => ErrorCode::OutOfBounds,
            Self::UnsortedInput(_) => ErrorCode::UnsortedInput,
            Self::FilterConfig(_) => ErrorCode::FilterConfig,
            Self::CorruptData(_) => ErrorCode::CorruptData,
            Self::StorageIO(_) => ErrorCode::StorageIO,
            Self::BufferTooSmall(_) => ErrorCode::BufferTooSmall,
        }
    }

    /// Attach context to the front of the error message, preserving the variant.
    pub fn with_context<D: Display>(self, context: D) -> Self {
        let prefix = |msg: String| format!("{context}: {msg}");
        match self {
            Self::InvalidArgument(m) => Self::InvalidArgument(prefix(m)),
            Self::Schema(m) => Self::Schema(prefix(m)),
            Self::NotFound(m) => Self::NotFound(prefix(m)),
            Self::AlreadyExists(m) => Self::AlreadyExists(prefix(m)),
            Self::OutOfBounds(m) => Self::OutOfBounds(prefix(m)),
            Self::UnsortedInput(m) => Self::UnsortedInput(prefix(m)),
            Self::FilterConfig(m) => Self::FilterConfig(prefix(m)),
            Self::CorruptData(m) => Self::CorruptData(prefix(m)),
            Self::StorageIO(e) => Self::StorageIO(std::io::Error::new(
                e.kind(),
                format!("{context}: {e}"),
            )),
            Self::BufferTooSmall(m) => Self::BufferTooSmall(prefix(m)),
        }
    }
}

/// Integer error codes returned from C-ABI entry points. Zero is success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    /// Success.
    Ok = 0,
    /// See [`StratumError::InvalidArgument`].
    InvalidArgument = -1,
    /// See [`StratumError::Schema`].
    Schema = -2,
    /// See [`StratumError::NotFound`].
    NotFound = -3,
    /// See [`StratumError::AlreadyExists`].
    AlreadyExists = -4,
    /// See [`StratumError::OutOfBounds`].
    OutOfBounds = -5,
    /// See [`StratumError::UnsortedInput`].
    UnsortedInput = -6,
    /// See [`StratumError::FilterConfig`].
    FilterConfig = -7,
    /// See [`StratumError::CorruptData`].
    CorruptData = -8,
    /// See [`StratumError::StorageIO`].
    StorageIO = -9,
    /// See [`StratumError::BufferTooSmall`].
    BufferTooSmall = -10,
}

impl From<flexbuffers::SerializationError> for StratumError {
    fn from(e: flexbuffers::SerializationError) -> Self {
        Self::Schema(format!("flexbuffer serialization failed: {e}"))
    }
}

impl From<flexbuffers::DeserializationError> for StratumError {
    fn from(e: flexbuffers::DeserializationError) -> Self {
        Self::CorruptData(format!("flexbuffer deserialization failed: {e}"))
    }
}

impl From<flexbuffers::ReaderError> for StratumError {
    fn from(e: flexbuffers::ReaderError) -> Self {
        Self::CorruptData(format!("flexbuffer reader failed: {e}"))
    }
}

impl From<serde_json::Error> for StratumError {
    fn from(e: serde_json::Error) -> Self {
        Self::Schema(format!("json serialization failed: {e}"))
    }
}

/// Construct a [`StratumError`].
///
/// `stratum_err!("...")` builds an `InvalidArgument`; `stratum_err!(Variant: "...")`
/// selects the variant explicitly.
#[macro_export]
macro_rules! stratum_err {
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::StratumError::$variant(format!($fmt $(, $arg)*))
    };
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::stratum_err!(InvalidArgument: $fmt $(, $arg)*)
    };
}

/// Return early with a [`StratumError`]. Accepts the same forms as [`stratum_err!`].
#[macro_export]
macro_rules! stratum_bail {
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {
        return Err($crate::stratum_err!($variant: $fmt $(, $arg)*))
    };
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        return Err($crate::stratum_err!($fmt $(, $arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_and_nonzero() {
        let errs = [
            stratum_err!("a"),
            stratum_err!(Schema: "b"),
            stratum_err!(NotFound: "c"),
            stratum_err!(AlreadyExists: "d"),
            stratum_err!(OutOfBounds: "e"),
            stratum_err!(UnsortedInput: "f"),
            stratum_err!(FilterConfig: "g"),
            stratum_err!(CorruptData: "h"),
            StratumError::from(std::io::Error::other("i")),
            stratum_err!(BufferTooSmall: "j"),
        ];
        let mut codes: Vec<i32> = errs.iter().map(|e| e.code() as i32).collect();
        assert!(codes.iter().all(|&c| c != ErrorCode::Ok as i32));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), 10);
    }

    #[test]
    fn context_preserves_variant() {
        let e = stratum_err!(NotFound: "array foo").with_context("opening array");
        assert_eq!(e.code(), ErrorCode::NotFound);
        assert_eq!(e.to_string(), "not found: opening array: array foo");
    }

    #[test]
    fn bail_selects_variant() {
        fn f() -> StratumResult<()> {
            stratum_bail!(OutOfBounds: "coordinate {} exceeds domain", 9)
        }
        let e = f().unwrap_err();
        assert_eq!(e.code(), ErrorCode::OutOfBounds);
    }
}
