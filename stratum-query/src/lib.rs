#![deny(missing_docs)]

//! Query processing for Stratum arrays.
//!
//! A read resolves a subarray against every sealed fragment of an array, newest
//! write winning cell by cell, and returns results in the array's cell order
//! (optionally reversed). A write is validated and handed to the loader as one new
//! fragment. [`QueryPayload`] is the serialized form of a query for callers that
//! ship queries across a process boundary.

pub use payload::*;
pub use processor::*;
pub use subarray::*;

mod payload;
mod processor;
mod subarray;
