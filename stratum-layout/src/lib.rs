#![deny(missing_docs)]

//! Coordinate-to-tile mapping for Stratum arrays.
//!
//! This crate is pure computation over a schema: it normalizes declared-datatype
//! coordinates into order-preserving `u64` keys, linearizes multi-dimensional
//! coordinates by the schema's tile and cell orders (row-major, column-major, or the
//! Morton space-filling curve), and maps every in-domain coordinate of a dense array
//! to a unique `(tile id, offset)` pair.

pub use coords::*;
pub use dense::*;
pub use order::*;
pub use sparse::*;

mod coords;
mod dense;
mod order;
mod sparse;

/// A coordinate tuple normalized to per-dimension `u64` keys (domain low maps to 0).
pub type CoordKeys = Vec<u64>;
