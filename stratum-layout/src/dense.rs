use itertools::Itertools;
use stratum_error::{stratum_bail, StratumResult};
use stratum_schema::{ArraySchema, CellOrder, Dimension};

use crate::{linearize, CoordKeys, RangeIter};

/// Tile arithmetic for a dense array: the bijection between in-domain normalized
/// coordinates and `(tile id, in-tile offset)` pairs, and the tile coverage of a
/// subarray. All coordinates here are normalized keys (domain low = 0).
#[derive(Debug, Clone)]
pub struct DenseLayout {
    spans: Vec<u64>,
    extents: Vec<u64>,
    tile_grid: Vec<u64>,
    tile_order: CellOrder,
    cell_order: CellOrder,
}

impl DenseLayout {
    /// Build the layout from a dense schema.
    pub fn new(schema: &ArraySchema) -> StratumResult<Self> {
        let spans = schema
            .dimensions()
            .iter()
            .map(Dimension::extent)
            .collect::<StratumResult<Vec<_>>>()?;
        let extents = schema.dense_extents()?.to_vec();
        let tile_grid = spans
            .iter()
            .zip(&extents)
            .map(|(span, extent)| span / extent)
            .collect_vec();
        Ok(Self {
            spans,
            extents,
            tile_grid,
            tile_order: schema.tile_order(),
            cell_order: schema.cell_order(),
        })
    }

    /// Tile extents per dimension.
    pub fn extents(&self) -> &[u64] {
        &self.extents
    }

    /// Cells per full tile.
    pub fn tile_cells(&self) -> u64 {
        self.extents.iter().product()
    }

    /// Total number of tiles in the domain.
    pub fn tile_count(&self) -> u64 {
        self.tile_grid.iter().product()
    }

    fn check_in_domain(&self, keys: &[u64]) -> StratumResult<()> {
        if keys.len() != self.spans.len() {
            stratum_bail!(
                "coordinate has {} dimensions, expected {}",
                keys.len(),
                self.spans.len()
            );
        }
        for (dim, (key, span)) in keys.iter().zip(&self.spans).enumerate() {
            if key >= span {
                stratum_bail!(
                    OutOfBounds: "normalized coordinate {key} exceeds the {span}-unit \
                     domain of dimension {dim}"
                );
            }
        }
        Ok(())
    }

    /// The tile id holding a coordinate: per-dimension division by the tile extent,
    /// linearized in tile order over the tile grid.
    pub fn coord_to_tile(&self, keys: &[u64]) -> StratumResult<u64> {
        self.check_in_domain(keys)?;
        let tile_idx = keys
            .iter()
            .zip(&self.extents)
            .map(|(key, extent)| key / extent)
            .collect_vec();
        linearize(&tile_idx, &self.tile_grid, self.tile_order)
    }

    /// The offset of a coordinate within its tile, linearized in cell order.
    /// Fails if `tile_id` is not the coordinate's tile.
    pub fn coord_to_offset(&self, keys: &[u64], tile_id: u64) -> StratumResult<u64> {
        let actual = self.coord_to_tile(keys)?;
        if actual != tile_id {
            stratum_bail!(
                "coordinate belongs to tile {actual}, not tile {tile_id}"
            );
        }
        let in_tile = keys
            .iter()
            .zip(&self.extents)
            .map(|(key, extent)| key % extent)
            .collect_vec();
        linearize(&in_tile, &self.extents, self.cell_order)
    }

    /// The low corner (normalized keys) of a tile.
    pub fn tile_base(&self, tile_id: u64) -> StratumResult<CoordKeys> {
        if tile_id >= self.tile_count() {
            stratum_bail!(OutOfBounds: "tile id {tile_id} exceeds tile count {}", self.tile_count());
        }
        let tile_idx = crate::delinearize(tile_id, &self.tile_grid, self.tile_order)?;
        Ok(tile_idx
            .iter()
            .zip(&self.extents)
            .map(|(t, extent)| t * extent)
            .collect())
    }

    /// The inclusive normalized coordinate ranges a tile covers.
    pub fn tile_ranges(&self, tile_id: u64) -> StratumResult<Vec<(u64, u64)>> {
        let base = self.tile_base(tile_id)?;
        Ok(base
            .iter()
            .zip(&self.extents)
            .map(|(lo, extent)| (*lo, lo + extent - 1))
            .collect())
    }

    /// Tile ids intersecting a normalized subarray, in tile order.
    pub fn tiles_covering(&self, ranges: &[(u64, u64)]) -> StratumResult<Vec<u64>> {
        let tile_ranges = ranges
            .iter()
            .zip(&self.extents)
            .map(|((lo, hi), extent)| (lo / extent, hi / extent))
            .collect_vec();
        RangeIter::new(&tile_ranges, self.tile_order)?
            .map(|tile_idx| linearize(&tile_idx, &self.tile_grid, self.tile_order))
            .collect()
    }

    /// Whether a normalized subarray is aligned to whole tiles.
    pub fn is_tile_aligned(&self, ranges: &[(u64, u64)]) -> bool {
        ranges
            .iter()
            .zip(&self.extents)
            .all(|((lo, hi), extent)| lo % extent == 0 && (hi + 1) % extent == 0)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rstest::rstest;
    use stratum_schema::{ArraySchema, Attribute, Datatype, Dimension};

    use super::*;

    fn schema(tile_order: CellOrder, cell_order: CellOrder) -> ArraySchema {
        ArraySchema::builder("grid")
            .dimension(Dimension::int("r", Datatype::I64, 0, 7))
            .dimension(Dimension::int("c", Datatype::I64, 0, 11))
            .attribute(Attribute::new("v", Datatype::I32))
            .tile_order(tile_order)
            .cell_order(cell_order)
            .dense(vec![4, 3])
            .build()
            .unwrap()
    }

    #[rstest]
    #[case(CellOrder::RowMajor, CellOrder::RowMajor)]
    #[case(CellOrder::RowMajor, CellOrder::ColMajor)]
    #[case(CellOrder::ColMajor, CellOrder::RowMajor)]
    #[case(CellOrder::ColMajor, CellOrder::ColMajor)]
    fn coord_mapping_is_a_bijection(#[case] tile_order: CellOrder, #[case] cell_order: CellOrder) {
        let layout = DenseLayout::new(&schema(tile_order, cell_order)).unwrap();
        let mut seen = HashSet::new();
        for r in 0..8u64 {
            for c in 0..12u64 {
                let keys = vec![r, c];
                let tile = layout.coord_to_tile(&keys).unwrap();
                let offset = layout.coord_to_offset(&keys, tile).unwrap();
                assert!(tile < layout.tile_count());
                assert!(offset < layout.tile_cells());
                assert!(seen.insert((tile, offset)), "collision at ({r}, {c})");
            }
        }
        assert_eq!(seen.len(), 96);
    }

    #[test]
    fn out_of_domain_coordinate_fails() {
        let layout = DenseLayout::new(&schema(CellOrder::RowMajor, CellOrder::RowMajor)).unwrap();
        let err = layout.coord_to_tile(&[8, 0]).unwrap_err();
        assert_eq!(err.code(), stratum_error::ErrorCode::OutOfBounds);
    }

    #[test]
    fn tile_ranges_cover_the_tile() {
        let layout = DenseLayout::new(&schema(CellOrder::RowMajor, CellOrder::RowMajor)).unwrap();
        let base = layout.tile_base(5).unwrap();
        let ranges = layout.tile_ranges(5).unwrap();
        assert_eq!(ranges[0].0, base[0]);
        assert_eq!(ranges[0].1 - ranges[0].0 + 1, 4);
        assert_eq!(ranges[1].1 - ranges[1].0 + 1, 3);
    }

    #[test]
    fn covering_tiles_of_a_subarray() {
        // 8x12 domain, 4x3 tiles -> 2x4 tile grid, row-major tile ids.
        let layout = DenseLayout::new(&schema(CellOrder::RowMajor, CellOrder::RowMajor)).unwrap();
        let tiles = layout.tiles_covering(&[(2, 5), (4, 7)]).unwrap();
        assert_eq!(tiles, vec![1, 2, 5, 6]);
    }

    #[test]
    fn alignment_check() {
        let layout = DenseLayout::new(&schema(CellOrder::RowMajor, CellOrder::RowMajor)).unwrap();
        assert!(!layout.is_tile_aligned(&[(1, 4), (0, 11)]));
        assert!(layout.is_tile_aligned(&[(4, 7), (3, 8)]));
        assert!(layout.is_tile_aligned(&[(0, 7), (0, 11)]));
    }
}
