#![deny(missing_docs)]

//! The persistence layer of Stratum: array lifecycle, immutable fragments, and bulk
//! loading.
//!
//! An array on storage is its schema plus an ordered set of sealed fragments. Each
//! fragment is one write's worth of tiles: per-attribute payload files, a tile index,
//! and a completion marker written last. A fragment missing its marker is invisible
//! to readers, which is the engine's only crash-consistency mechanism — partial
//! fragments are ignored, never repaired. Readers take no locks; writers only
//! serialize on the per-array timestamp counter.

pub use cells::*;
pub use fragment::*;
pub use loader::*;
pub use manager::*;

mod cells;
mod fragment;
mod loader;
mod manager;
