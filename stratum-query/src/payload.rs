use serde::{Deserialize, Serialize};
use stratum_error::StratumResult;

use crate::Subarray;

/// Whether a query reads results out of the array or writes cells into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryDirection {
    /// Resolve a subarray into result buffers.
    Read,
    /// Load a batch of cells as a new fragment.
    Write,
}

/// Result ordering relative to the array's cell order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResultOrder {
    /// The array's cell order.
    #[default]
    Natural,
    /// The array's cell order, reversed.
    Reversed,
}

/// Lifecycle of a query as reported to remote callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QueryStatus {
    /// Created but not yet submitted.
    #[default]
    Pending,
    /// Submitted and executing.
    InProgress,
    /// Finished with results (or the write sealed).
    Completed,
    /// Finished with an error.
    Failed,
}

/// The wire form of a query: everything a remote peer needs to re-create it.
///
/// `buffer_sizes` carries the caller's result buffer capacities in bytes, one per
/// requested attribute (plus one for coordinates on sparse reads), in request order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPayload {
    /// Target array name.
    pub array: String,
    /// Read or write.
    pub direction: QueryDirection,
    /// The queried region of the domain.
    pub subarray: Subarray,
    /// Requested attributes, in result order. Empty means all, in schema order.
    pub attributes: Vec<String>,
    /// Result ordering.
    pub order: ResultOrder,
    /// Query lifecycle state.
    pub status: QueryStatus,
    /// Caller-side result buffer capacities in bytes.
    pub buffer_sizes: Vec<u64>,
}

impl QueryPayload {
    /// Serialize to the compact binary encoding.
    pub fn to_flexbuffers(&self) -> StratumResult<Vec<u8>> {
        let mut ser = flexbuffers::FlexbufferSerializer::new();
        self.serialize(&mut ser)?;
        Ok(ser.take_buffer())
    }

    /// Deserialize from the compact binary encoding.
    pub fn from_flexbuffers(bytes: &[u8]) -> StratumResult<Self> {
        let reader = flexbuffers::Reader::get_root(bytes)?;
        Ok(Self::deserialize(reader)?)
    }

    /// Serialize to the human-readable JSON encoding.
    pub fn to_json(&self) -> StratumResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from the JSON encoding.
    pub fn from_json(json: &str) -> StratumResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
