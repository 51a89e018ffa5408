use stratum_error::{stratum_bail, StratumResult};

use crate::Filter;

/// Truncates little-endian unsigned integer cells to the narrowest byte width that
/// holds every value in the tile. A three-byte header records the original width, the
/// reduced width, and the length of any ragged tail past the last whole cell; the tail
/// is stored verbatim. Values whose high bytes are set (e.g. negative two's-complement
/// values) simply keep the full width; the transform is always lossless.
#[derive(Debug, Clone, Copy)]
pub struct BitWidthReduce {
    cell_width: usize,
}

impl BitWidthReduce {
    /// Create a reducer for integer cells of `cell_width` bytes.
    pub fn new(cell_width: usize) -> Self {
        Self { cell_width }
    }
}

impl Filter for BitWidthReduce {
    fn apply(&self, input: &[u8]) -> StratumResult<Vec<u8>> {
        let w = self.cell_width;
        let cells = input.len() / w;
        let (whole, tail) = input.split_at(cells * w);
        // Narrowest width that keeps every cell's high bytes zero.
        let mut reduced = 1usize;
        for cell in whole.chunks_exact(w) {
            let used = w - cell.iter().rev().take_while(|b| **b == 0).count();
            reduced = reduced.max(used);
        }
        let mut out = Vec::with_capacity(3 + cells * reduced + tail.len());
        out.push(w as u8);
        out.push(reduced as u8);
        out.push(tail.len() as u8);
        for cell in whole.chunks_exact(w) {
            out.extend_from_slice(&cell[..reduced]);
        }
        out.extend_from_slice(tail);
        Ok(out)
    }

    fn reverse(&self, input: &[u8]) -> StratumResult<Vec<u8>> {
        let Some((header, body)) = input.split_at_checked(3) else {
            stratum_bail!(CorruptData: "bit-width payload is missing its header");
        };
        let (w, reduced, tail_len) = (header[0] as usize, header[1] as usize, header[2] as usize);
        if w != self.cell_width || reduced == 0 || reduced > w || tail_len >= w {
            stratum_bail!(
                CorruptData: "bit-width header ({w} -> {reduced}, tail {tail_len}) does not \
                 match cell width {}",
                self.cell_width
            );
        }
        let Some(split) = body.len().checked_sub(tail_len) else {
            stratum_bail!(CorruptData: "bit-width payload is shorter than its declared tail");
        };
        let (whole, tail) = body.split_at(split);
        if whole.len() % reduced != 0 {
            stratum_bail!(
                CorruptData: "bit-width payload of {} bytes is not a whole number of \
                 {reduced}-byte cells",
                whole.len()
            );
        }
        let mut out = Vec::with_capacity((whole.len() / reduced) * w + tail.len());
        for cell in whole.chunks_exact(reduced) {
            out.extend_from_slice(cell);
            out.extend(std::iter::repeat_n(0u8, w - reduced));
        }
        out.extend_from_slice(tail);
        Ok(out)
    }

    fn describe(&self) -> String {
        format!("bit-width-reduce(width={})", self.cell_width)
    }
}
