#![deny(missing_docs)]

//! The array schema model for Stratum.
//!
//! A schema declares an array's dimensions and domain, its attributes (each with a
//! filter pipeline), whether the array is dense or sparse, and the tile/cell orders
//! that linearize its multi-dimensional coordinates. Schemas are created once at
//! array-define time, validated eagerly, immutable thereafter, and round-trip
//! losslessly through both a compact binary encoding (flexbuffers) and JSON.

pub use attribute::*;
pub use datatype::*;
pub use dimension::*;
pub use schema::*;

mod attribute;
mod datatype;
mod dimension;
mod schema;

/// Name reserved for the coordinates pseudo-attribute; no declared attribute may use it.
pub const COORDS_NAME: &str = "__coords";

/// Validate a dimension or attribute name: ASCII alphanumerics and underscores only,
/// and the `__` prefix is reserved for engine-internal names. Names become file names
/// inside a fragment, so the character set is deliberately narrow.
pub(crate) fn validate_name(kind: &str, name: &str) -> stratum_error::StratumResult<()> {
    use stratum_error::stratum_bail;

    if name.is_empty() {
        stratum_bail!(Schema: "{kind} names may not be empty");
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        stratum_bail!(
            Schema: "{kind} name '{name}' contains characters outside [A-Za-z0-9_]"
        );
    }
    if name.starts_with("__") {
        stratum_bail!(Schema: "{kind} name '{name}' uses the reserved '__' prefix");
    }
    Ok(())
}
