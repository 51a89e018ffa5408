use std::cmp::Ordering;

use stratum_error::{stratum_bail, stratum_err, StratumResult};
use stratum_schema::CellOrder;

/// Compare two normalized coordinate tuples under a cell order.
///
/// Row-major is lexicographic (last dimension fastest), column-major compares
/// dimensions in reverse, and Morton compares positions along the bit-interleaved
/// space-filling curve without materializing curve indices: the dimension holding the
/// most significant differing bit decides.
pub fn cmp_keys(order: CellOrder, a: &[u64], b: &[u64]) -> Ordering {
    debug_assert_eq!(a.len(), b.len());
    match order {
        CellOrder::RowMajor => a.cmp(b),
        CellOrder::ColMajor => a.iter().rev().cmp(b.iter().rev()),
        CellOrder::Morton => {
            // Chan's trick: the dimension whose xor holds the highest set bit decides;
            // ties favor the earlier dimension, which interleaves at the higher bit.
            fn less_msb(x: u64, y: u64) -> bool {
                x < y && x < (x ^ y)
            }
            let mut deciding = 0usize;
            for dim in 1..a.len() {
                if less_msb(a[deciding] ^ b[deciding], a[dim] ^ b[dim]) {
                    deciding = dim;
                }
            }
            a[deciding].cmp(&b[deciding])
        }
    }
}

/// Map a multi-dimensional index inside a box of the given per-dimension sizes to its
/// position in the order's enumeration. Only the affine orders enumerate boxes.
pub fn linearize(index: &[u64], sizes: &[u64], order: CellOrder) -> StratumResult<u64> {
    debug_assert_eq!(index.len(), sizes.len());
    let step = |acc: u64, (i, s): (&u64, &u64)| {
        acc.checked_mul(*s)
            .and_then(|v| v.checked_add(*i))
            .ok_or_else(|| stratum_err!("box position overflows u64"))
    };
    match order {
        CellOrder::RowMajor => index.iter().zip(sizes).try_fold(0u64, step),
        CellOrder::ColMajor => index.iter().zip(sizes).rev().try_fold(0u64, step),
        CellOrder::Morton => {
            stratum_bail!("morton order does not linearize box offsets")
        }
    }
}

/// Invert [`linearize`].
pub fn delinearize(mut pos: u64, sizes: &[u64], order: CellOrder) -> StratumResult<Vec<u64>> {
    let mut index = vec![0u64; sizes.len()];
    match order {
        CellOrder::RowMajor => {
            for (i, s) in index.iter_mut().zip(sizes).rev() {
                *i = pos % s;
                pos /= s;
            }
        }
        CellOrder::ColMajor => {
            for (i, s) in index.iter_mut().zip(sizes) {
                *i = pos % s;
                pos /= s;
            }
        }
        CellOrder::Morton => {
            stratum_bail!("morton order does not linearize box offsets")
        }
    }
    Ok(index)
}

/// Iterate every coordinate tuple in an axis-aligned box of inclusive per-dimension
/// ranges, in row- or column-major order.
pub struct RangeIter {
    ranges: Vec<(u64, u64)>,
    current: Vec<u64>,
    order: CellOrder,
    done: bool,
}

impl RangeIter {
    /// Create the iterator; empty if any range is inverted.
    pub fn new(ranges: &[(u64, u64)], order: CellOrder) -> StratumResult<Self> {
        if matches!(order, CellOrder::Morton) {
            stratum_bail!("morton order does not enumerate boxes");
        }
        let done = ranges.iter().any(|(lo, hi)| lo > hi);
        Ok(Self {
            ranges: ranges.to_vec(),
            current: ranges.iter().map(|(lo, _)| *lo).collect(),
            order,
            done,
        })
    }

    fn advance(&mut self) {
        // Odometer: the fastest-varying dimension is the last (row-major) or the
        // first (column-major).
        let dims: Vec<usize> = match self.order {
            CellOrder::RowMajor => (0..self.ranges.len()).rev().collect(),
            _ => (0..self.ranges.len()).collect(),
        };
        for dim in dims {
            if self.current[dim] < self.ranges[dim].1 {
                self.current[dim] += 1;
                return;
            }
            self.current[dim] = self.ranges[dim].0;
        }
        self.done = true;
    }
}

impl Iterator for RangeIter {
    type Item = Vec<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.current.clone();
        self.advance();
        Some(item)
    }
}

/// Number of cells in a box of inclusive ranges, zero if any range is inverted.
/// Fails if the count does not fit in `u64`.
pub fn box_cell_count(ranges: &[(u64, u64)]) -> StratumResult<u64> {
    ranges.iter().try_fold(1u64, |acc, (lo, hi)| {
        if lo > hi {
            return Ok(0);
        }
        (hi - lo)
            .checked_add(1)
            .and_then(|span| acc.checked_mul(span))
            .ok_or_else(|| stratum_err!("cell count of box {ranges:?} overflows u64"))
    })
}

/// Intersect two boxes of inclusive ranges; `None` when they are disjoint.
pub fn intersect_ranges(a: &[(u64, u64)], b: &[(u64, u64)]) -> Option<Vec<(u64, u64)>> {
    let out: Vec<(u64, u64)> = a
        .iter()
        .zip(b)
        .map(|((alo, ahi), (blo, bhi))| ((*alo).max(*blo), (*ahi).min(*bhi)))
        .collect();
    out.iter().all(|(lo, hi)| lo <= hi).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major_enumerates_last_dim_fastest() {
        let cells: Vec<_> = RangeIter::new(&[(0, 1), (0, 2)], CellOrder::RowMajor)
            .unwrap()
            .collect();
        assert_eq!(
            cells,
            vec![
                vec![0, 0],
                vec![0, 1],
                vec![0, 2],
                vec![1, 0],
                vec![1, 1],
                vec![1, 2]
            ]
        );
    }

    #[test]
    fn col_major_enumerates_first_dim_fastest() {
        let cells: Vec<_> = RangeIter::new(&[(0, 1), (0, 2)], CellOrder::ColMajor)
            .unwrap()
            .collect();
        assert_eq!(
            cells,
            vec![
                vec![0, 0],
                vec![1, 0],
                vec![0, 1],
                vec![1, 1],
                vec![0, 2],
                vec![1, 2]
            ]
        );
    }

    #[test]
    fn linearize_matches_enumeration_order() {
        for order in [CellOrder::RowMajor, CellOrder::ColMajor] {
            let sizes = [3u64, 4, 2];
            let ranges: Vec<_> = sizes.iter().map(|s| (0, s - 1)).collect();
            for (pos, coord) in RangeIter::new(&ranges, order).unwrap().enumerate() {
                assert_eq!(linearize(&coord, &sizes, order).unwrap(), pos as u64);
                assert_eq!(delinearize(pos as u64, &sizes, order).unwrap(), coord);
            }
        }
    }

    #[test]
    fn morton_agrees_with_interleaved_bits_in_2d() {
        // Reference: explicitly interleave 8-bit coordinates.
        fn interleave(x: u64, y: u64) -> u64 {
            let mut out = 0u64;
            for bit in 0..8 {
                out |= ((x >> bit) & 1) << (2 * bit + 1);
                out |= ((y >> bit) & 1) << (2 * bit);
            }
            out
        }
        let coords: Vec<[u64; 2]> = (0..16).flat_map(|x| (0..16).map(move |y| [x, y])).collect();
        let mut by_cmp = coords.clone();
        by_cmp.sort_by(|a, b| cmp_keys(CellOrder::Morton, a, b));
        let mut by_key = coords;
        by_key.sort_by_key(|[x, y]| interleave(*x, *y));
        assert_eq!(by_cmp, by_key);
    }

    #[test]
    fn oversized_boxes_are_rejected() {
        let err = linearize(&[1, 1], &[u64::MAX, u64::MAX], CellOrder::RowMajor).unwrap_err();
        assert_eq!(err.code(), stratum_error::ErrorCode::InvalidArgument);
        assert!(box_cell_count(&[(0, u64::MAX)]).is_err());
        assert!(box_cell_count(&[(0, u64::MAX - 1), (0, 1)]).is_err());
        assert_eq!(box_cell_count(&[(3, 7)]).unwrap(), 5);
        assert_eq!(box_cell_count(&[(2, 1)]).unwrap(), 0);
    }

    #[test]
    fn intersection_of_disjoint_boxes_is_none() {
        assert!(intersect_ranges(&[(0, 3)], &[(5, 9)]).is_none());
        assert_eq!(intersect_ranges(&[(0, 5)], &[(3, 9)]), Some(vec![(3, 5)]));
    }
}
