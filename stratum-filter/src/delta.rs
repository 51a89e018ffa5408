use stratum_error::{stratum_bail, StratumResult};

use crate::Filter;

fn read_cell(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

fn write_cell(out: &mut Vec<u8>, value: u64, width: usize) {
    out.extend_from_slice(&value.to_le_bytes()[..width]);
}

/// Stores the first integer cell verbatim and every subsequent cell as the wrapping
/// difference from its predecessor, modulo the cell width. Same-size output; the
/// payoff comes from a downstream compressor seeing small deltas.
///
/// Bytes past the last whole cell pass through untouched, so a payload already
/// reshaped by an upstream stage still round-trips.
#[derive(Debug, Clone, Copy)]
pub struct Delta {
    cell_width: usize,
}

impl Delta {
    /// Create a delta filter for integer cells of `cell_width` bytes.
    pub fn new(cell_width: usize) -> Self {
        Self { cell_width }
    }
}

impl Filter for Delta {
    fn apply(&self, input: &[u8]) -> StratumResult<Vec<u8>> {
        let mut out = Vec::with_capacity(input.len());
        let mut previous = 0u64;
        let chunks = input.chunks_exact(self.cell_width);
        let tail = chunks.remainder();
        for (i, cell) in chunks.enumerate() {
            let value = read_cell(cell);
            let delta = if i == 0 { value } else { value.wrapping_sub(previous) };
            write_cell(&mut out, delta, self.cell_width);
            previous = value;
        }
        out.extend_from_slice(tail);
        Ok(out)
    }

    fn reverse(&self, input: &[u8]) -> StratumResult<Vec<u8>> {
        let mask = width_mask(self.cell_width);
        let mut out = Vec::with_capacity(input.len());
        let mut previous = 0u64;
        let chunks = input.chunks_exact(self.cell_width);
        let tail = chunks.remainder();
        for (i, cell) in chunks.enumerate() {
            let delta = read_cell(cell);
            let value = if i == 0 { delta } else { previous.wrapping_add(delta) & mask };
            write_cell(&mut out, value, self.cell_width);
            previous = value;
        }
        out.extend_from_slice(tail);
        Ok(out)
    }

    fn describe(&self) -> String {
        format!("delta(width={})", self.cell_width)
    }
}

/// Like [`Delta`], but fails when a cell is ever smaller than its predecessor. The
/// guaranteed-non-negative deltas make the output safe for unsigned downstream
/// transforms such as bit-width reduction.
#[derive(Debug, Clone, Copy)]
pub struct PositiveDelta {
    cell_width: usize,
}

impl PositiveDelta {
    /// Create a positive-delta filter for integer cells of `cell_width` bytes.
    pub fn new(cell_width: usize) -> Self {
        Self { cell_width }
    }
}

impl Filter for PositiveDelta {
    fn apply(&self, input: &[u8]) -> StratumResult<Vec<u8>> {
        let mut out = Vec::with_capacity(input.len());
        let mut previous = 0u64;
        let chunks = input.chunks_exact(self.cell_width);
        let tail = chunks.remainder();
        for (i, cell) in chunks.enumerate() {
            let value = read_cell(cell);
            if i > 0 && value < previous {
                stratum_bail!(
                    FilterConfig: "positive-delta filter requires non-decreasing values, \
                     cell {i} dropped from {previous} to {value}"
                );
            }
            let delta = if i == 0 { value } else { value - previous };
            write_cell(&mut out, delta, self.cell_width);
            previous = value;
        }
        out.extend_from_slice(tail);
        Ok(out)
    }

    fn reverse(&self, input: &[u8]) -> StratumResult<Vec<u8>> {
        let mask = width_mask(self.cell_width);
        let mut out = Vec::with_capacity(input.len());
        let mut previous = 0u64;
        let chunks = input.chunks_exact(self.cell_width);
        let tail = chunks.remainder();
        for (i, cell) in chunks.enumerate() {
            let delta = read_cell(cell);
            let value = if i == 0 { delta } else { previous.wrapping_add(delta) & mask };
            write_cell(&mut out, value, self.cell_width);
            previous = value;
        }
        out.extend_from_slice(tail);
        Ok(out)
    }

    fn describe(&self) -> String {
        format!("positive-delta(width={})", self.cell_width)
    }
}

fn width_mask(width: usize) -> u64 {
    if width >= 8 {
        u64::MAX
    } else {
        (1u64 << (width * 8)) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_handles_wrapping() {
        let filter = Delta::new(2);
        let raw: Vec<u8> = [u16::MAX, 0, 5].iter().flat_map(|v| v.to_le_bytes()).collect();
        let encoded = filter.apply(&raw).unwrap();
        assert_eq!(filter.reverse(&encoded).unwrap(), raw);
    }

    #[test]
    fn delta_ragged_tail_passes_through() {
        let filter = Delta::new(4);
        let raw: Vec<u8> = (0..10).collect();
        let encoded = filter.apply(&raw).unwrap();
        assert_eq!(&encoded[8..], &raw[8..]);
        assert_eq!(filter.reverse(&encoded).unwrap(), raw);
    }

    #[test]
    fn positive_delta_rejects_decreasing_input() {
        let filter = PositiveDelta::new(4);
        let raw: Vec<u8> = [10u32, 20, 15].iter().flat_map(|v| v.to_le_bytes()).collect();
        let err = filter.apply(&raw).unwrap_err();
        assert_eq!(err.code(), stratum_error::ErrorCode::FilterConfig);
    }

    #[test]
    fn positive_delta_round_trips_monotone_input() {
        let filter = PositiveDelta::new(8);
        let raw: Vec<u8> = (0..100u64).map(|i| i * i).flat_map(u64::to_le_bytes).collect();
        let encoded = filter.apply(&raw).unwrap();
        assert_eq!(filter.reverse(&encoded).unwrap(), raw);
    }
}
