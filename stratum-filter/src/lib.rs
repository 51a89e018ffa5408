#![deny(missing_docs)]

//! Reversible byte-transform pipelines for Stratum tiles.
//!
//! A [`FilterPipeline`] is an ordered sequence of [`Filter`] stages applied to a tile's
//! raw cell bytes on write and reversed, in exact reverse order, on read. Pipelines are
//! declared in an array schema as a list of [`FilterSpec`]s and validated once, at
//! schema-definition time; no per-call type checks happen afterwards.
//!
//! Every shipped filter is lossless: `pipeline.reverse(pipeline.apply(x)) == x` for any
//! input the pipeline accepts.

pub use filter::*;
pub use pipeline::*;
pub use spec::*;

mod bitwidth;
mod compression;
mod delta;
mod filter;
mod noop;
mod pipeline;
mod rle;
mod shuffle;
mod spec;

pub use bitwidth::BitWidthReduce;
pub use compression::{Gzip, Lz4};
pub use delta::{Delta, PositiveDelta};
pub use noop::NoOp;
pub use rle::Rle;
pub use shuffle::ByteShuffle;
