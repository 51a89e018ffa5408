#![deny(missing_docs)]

//! Stratum: an embeddable storage engine for dense and sparse multi-dimensional
//! arrays.
//!
//! An array is a schema (dimensions, attributes, tiling, filter pipelines) plus an
//! ordered set of immutable fragments, one per write. Reads resolve a subarray
//! against every fragment, newest write winning cell by cell. [`Context`] is the
//! entry point: it opens a storage root and hands out the manager, loader, and
//! query processor over it.
//!
//! ```no_run
//! use stratum::schema::{ArraySchema, Attribute, Datatype, Dimension};
//! use stratum::{Context, ReadRequest, Subarray};
//!
//! # fn main() -> stratum::error::StratumResult<()> {
//! let ctx = Context::create("/tmp/stratum-demo")?;
//! let schema = ArraySchema::builder("line")
//!     .dimension(Dimension::int("x", Datatype::I64, 1, 8))
//!     .attribute(Attribute::new("v", Datatype::I32))
//!     .dense(vec![4])
//!     .build()?;
//! ctx.define_array(&schema)?;
//! let result = ctx.read("line", &ReadRequest::new(Subarray::from_ints(&[(3, 6)])))?;
//! # Ok(())
//! # }
//! ```

pub use context::*;
pub use stratum_query::*;
pub use {
    stratum_error as error, stratum_filter as filter, stratum_layout as layout,
    stratum_schema as schema, stratum_storage as storage,
};

mod context;
