use std::cmp::Ordering;

use stratum_error::{stratum_bail, StratumResult};
use stratum_schema::CellOrder;

use crate::{cmp_keys, CoordKeys};

/// A permutation that sorts cells by the declared cell order. The sort is stable, so
/// duplicate coordinates keep their input order and a later duplicate can supersede
/// an earlier one downstream.
pub fn sort_permutation(coords: &[CoordKeys], order: CellOrder) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..coords.len()).collect();
    perm.sort_by(|a, b| cmp_keys(order, &coords[*a], &coords[*b]));
    perm
}

/// Cheap fast-fail check that a batch claimed to be sorted actually is.
pub fn check_sorted(coords: &[CoordKeys], order: CellOrder) -> StratumResult<()> {
    for (i, pair) in coords.windows(2).enumerate() {
        if cmp_keys(order, &pair[0], &pair[1]) == Ordering::Greater {
            stratum_bail!(
                UnsortedInput: "cell {} precedes cell {} but sorts after it",
                i,
                i + 1
            );
        }
    }
    Ok(())
}

/// The run index a sorted cell falls into when grouped into capacity-sized tiles.
pub fn sparse_tile_of(cell_index: usize, capacity: u64) -> u64 {
    cell_index as u64 / capacity
}
