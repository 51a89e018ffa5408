use stratum_error::StratumResult;

use crate::Filter;

/// Transposes cell bytes so that the i-th byte of every cell is contiguous in the
/// output. On its own this changes nothing about the size; it exists to expose
/// redundancy to a downstream compressor.
///
/// Bytes past the last whole cell pass through untouched, so the filter also accepts
/// payloads an upstream length-changing stage (a compressor, say) already reshaped.
#[derive(Debug, Clone, Copy)]
pub struct ByteShuffle {
    cell_width: usize,
}

impl ByteShuffle {
    /// Create a shuffle for cells of `cell_width` bytes.
    pub fn new(cell_width: usize) -> Self {
        Self { cell_width }
    }
}

impl Filter for ByteShuffle {
    fn apply(&self, input: &[u8]) -> StratumResult<Vec<u8>> {
        let cells = input.len() / self.cell_width;
        let (whole, tail) = input.split_at(cells * self.cell_width);
        let mut out = vec![0u8; whole.len()];
        for (cell, bytes) in whole.chunks_exact(self.cell_width).enumerate() {
            for (lane, byte) in bytes.iter().enumerate() {
                out[lane * cells + cell] = *byte;
            }
        }
        out.extend_from_slice(tail);
        Ok(out)
    }

    fn reverse(&self, input: &[u8]) -> StratumResult<Vec<u8>> {
        let cells = input.len() / self.cell_width;
        let (whole, tail) = input.split_at(cells * self.cell_width);
        let mut out = vec![0u8; whole.len()];
        for (lane, lane_bytes) in whole.chunks_exact(cells.max(1)).enumerate() {
            for (cell, byte) in lane_bytes.iter().enumerate() {
                out[cell * self.cell_width + lane] = *byte;
            }
        }
        out.extend_from_slice(tail);
        Ok(out)
    }

    fn describe(&self) -> String {
        format!("byteshuffle(width={})", self.cell_width)
    }
}
