use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use itertools::Itertools;
use rayon::prelude::*;
use stratum_error::{stratum_bail, stratum_err, ResultExt, StratumResult};
use stratum_layout::{
    box_cell_count, cmp_keys, intersect_ranges, linearize, CoordKeys, CoordMapper, DenseLayout,
    RangeIter,
};
use stratum_schema::{ArrayKind, ArraySchema, Attribute, CellOrder};
use stratum_storage::{
    AttrData, FragmentMeta, FragmentReader, LoadInput, Loader, StorageManager,
};

use crate::{ResultOrder, Subarray};

/// A read query: the subarray to resolve, which attributes to return, and how.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    /// The queried region.
    pub subarray: Subarray,
    /// Attributes to return, in request order. Empty means all, in schema order.
    pub attributes: Vec<String>,
    /// Result ordering relative to the array's cell order.
    pub order: ResultOrder,
    /// Caller-side capacity in cells; a larger result fails before any buffer is
    /// filled so the caller can retry with more room.
    pub max_cells: Option<u64>,
}

impl ReadRequest {
    /// A request for all attributes in natural order, with no capacity limit.
    pub fn new(subarray: Subarray) -> Self {
        Self {
            subarray,
            attributes: Vec::new(),
            order: ResultOrder::Natural,
            max_cells: None,
        }
    }

    /// Restrict the result to the named attributes.
    pub fn with_attributes(mut self, attributes: Vec<String>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Set the result ordering.
    pub fn with_order(mut self, order: ResultOrder) -> Self {
        self.order = order;
        self
    }

    /// Declare the caller's result capacity in cells.
    pub fn with_max_cells(mut self, max_cells: u64) -> Self {
        self.max_cells = Some(max_cells);
        self
    }
}

/// The resolved cells of a read.
#[derive(Debug)]
pub struct ReadResult {
    /// Result coordinates in the array's native encoding; sparse reads only.
    pub coords: Option<Vec<u8>>,
    /// One column per requested attribute, in request order.
    pub attrs: Vec<(String, AttrData)>,
    /// Number of result cells.
    pub cells: u64,
}

/// Executes reads and writes against arrays under one storage manager.
///
/// Reads visit fragments oldest first so a later write overlays an earlier one cell
/// by cell; tiles are decoded in parallel, the overlay itself is sequential.
#[derive(Debug, Clone)]
pub struct QueryProcessor {
    manager: Arc<StorageManager>,
    loader: Loader,
}

impl QueryProcessor {
    /// A processor over the given storage root.
    pub fn new(manager: Arc<StorageManager>) -> Self {
        let loader = Loader::new(Arc::clone(&manager));
        Self { manager, loader }
    }

    /// Execute a write query: one new sealed fragment.
    pub fn execute_write(
        &self,
        array: &str,
        input: LoadInput,
        sorted: bool,
    ) -> StratumResult<FragmentMeta> {
        self.loader.load(array, input, sorted)
    }

    /// Execute a read query against a snapshot of everything sealed so far.
    pub fn execute_read(&self, array: &str, request: &ReadRequest) -> StratumResult<ReadResult> {
        let open = self.manager.open_array(array)?;
        let schema = open.schema();
        let ranges = request.subarray.keys(schema)?;
        let attrs = select_attrs(schema, &request.attributes)?;
        log::debug!(
            "read on '{array}': {} fragment(s), subarray {ranges:?}",
            open.fragments().len()
        );
        match schema.kind() {
            ArrayKind::Dense => {
                read_dense(schema, &ranges, &attrs, open.fragments(), request)
            }
            ArrayKind::Sparse => {
                read_sparse(schema, &ranges, &attrs, open.fragments(), request)
            }
        }
    }
}

fn select_attrs<'a>(
    schema: &'a ArraySchema,
    names: &[String],
) -> StratumResult<Vec<&'a Attribute>> {
    if names.is_empty() {
        return Ok(schema.attributes().iter().collect());
    }
    names
        .iter()
        .map(|name| {
            schema.attribute(name).ok_or_else(|| {
                stratum_err!(
                    NotFound: "array '{}' has no attribute '{name}'",
                    schema.name()
                )
            })
        })
        .collect()
}

fn check_capacity(cells: u64, max_cells: Option<u64>) -> StratumResult<()> {
    if let Some(max) = max_cells {
        if cells > max {
            stratum_bail!(
                BufferTooSmall: "result holds {cells} cells, caller capacity is {max}"
            );
        }
    }
    Ok(())
}

/// Position of a global tile id inside a fragment's tile list.
fn fragment_tile_pos(meta: &FragmentMeta, tile_id: u64) -> StratumResult<usize> {
    meta.tile_ids
        .iter()
        .position(|t| *t == tile_id)
        .ok_or_else(|| {
            stratum_err!(
                CorruptData: "fragment '{}' covers tile {tile_id} but does not store it",
                meta.id
            )
        })
}

fn read_dense(
    schema: &ArraySchema,
    ranges: &[(u64, u64)],
    attrs: &[&Attribute],
    fragments: &[FragmentReader],
    request: &ReadRequest,
) -> StratumResult<ReadResult> {
    let layout = DenseLayout::new(schema)?;
    let total = box_cell_count(ranges)?;
    check_capacity(total, request.max_cells)?;
    let sizes = ranges.iter().map(|(lo, hi)| hi - lo + 1).collect_vec();

    // One growable cell per result position, starting at the zero fill. A dense
    // cell no fragment ever wrote reads as zeroes (an empty value for var cells).
    let mut cells: Vec<Vec<Vec<u8>>> = attrs
        .iter()
        .map(|attr| vec![vec![0u8; attr.cell_size().unwrap_or(0)]; total as usize])
        .collect();

    for reader in fragments {
        if reader.meta().kind == ArrayKind::Sparse {
            overlay_scattered(schema, reader, ranges, &sizes, attrs, &mut cells)?;
            continue;
        }
        let Some(frag_ranges) = reader.meta().dense_ranges.as_deref() else {
            stratum_bail!(
                CorruptData: "fragment '{}' of dense array '{}' has no subarray",
                reader.meta().id,
                schema.name()
            );
        };
        let Some(inter) = intersect_ranges(ranges, frag_ranges) else {
            continue;
        };
        let tile_ids = layout.tiles_covering(&inter)?;
        let decoded = tile_ids
            .par_iter()
            .map(|tile_id| {
                fragment_tile_pos(reader.meta(), *tile_id)
                    .map(|pos| {
                        attrs
                            .iter()
                            .map(|attr| reader.read_attr_tile(attr, pos))
                            .collect::<StratumResult<Vec<_>>>()
                    })
                    .flatten()
                    .map(|data| (*tile_id, data))
            })
            .collect::<StratumResult<Vec<_>>>()?;

        for (tile_id, tile_data) in decoded {
            let tile_ranges = layout.tile_ranges(tile_id)?;
            let Some(overlap) = intersect_ranges(&inter, &tile_ranges) else {
                continue;
            };
            for coord in RangeIter::new(&overlap, schema.cell_order())? {
                let src = layout.coord_to_offset(&coord, tile_id)? as usize;
                let rel = coord
                    .iter()
                    .zip(ranges)
                    .map(|(c, (lo, _))| c - lo)
                    .collect_vec();
                let dst = linearize(&rel, &sizes, schema.cell_order())? as usize;
                for (col, (attr, data)) in cells.iter_mut().zip(attrs.iter().zip(&tile_data)) {
                    col[dst] = data.cell_bytes(src, attr.cell_size()).to_vec();
                }
            }
        }
    }

    let attrs_out = attrs
        .iter()
        .zip(cells)
        .map(|(attr, col)| {
            let mut out = AttrData::empty(attr);
            match request.order {
                ResultOrder::Natural => col.iter().for_each(|cell| out.push_cell(cell)),
                ResultOrder::Reversed => col.iter().rev().for_each(|cell| out.push_cell(cell)),
            }
            (attr.name().to_string(), out)
        })
        .collect();
    Ok(ReadResult {
        coords: None,
        attrs: attrs_out,
        cells: total,
    })
}

/// Overlay a scattered (coordinate-keyed) fragment onto a dense result buffer.
/// Dense updates that name individual cells land as these; only the named cells
/// are overwritten.
fn overlay_scattered(
    schema: &ArraySchema,
    reader: &FragmentReader,
    ranges: &[(u64, u64)],
    sizes: &[u64],
    attrs: &[&Attribute],
    cells: &mut [Vec<Vec<u8>>],
) -> StratumResult<()> {
    let positions = reader
        .meta()
        .tile_mbrs
        .iter()
        .enumerate()
        .filter(|(_, mbr)| mbr_intersects(mbr, ranges))
        .map(|(pos, _)| pos)
        .collect_vec();
    let decoded = positions
        .par_iter()
        .map(|pos| {
            reader
                .read_coords_tile(schema, *pos)
                .map(|coords| {
                    attrs
                        .iter()
                        .map(|attr| reader.read_attr_tile(attr, *pos))
                        .collect::<StratumResult<Vec<_>>>()
                        .map(|data| (coords, data))
                })
                .flatten()
        })
        .collect::<StratumResult<Vec<_>>>()?;
    for (coords, data) in decoded {
        for (i, keys) in coords.iter().enumerate() {
            if !in_ranges(keys, ranges) {
                continue;
            }
            let rel = keys
                .iter()
                .zip(ranges)
                .map(|(k, (lo, _))| k - lo)
                .collect_vec();
            let dst = linearize(&rel, sizes, schema.cell_order())? as usize;
            for (col, (attr, col_data)) in cells.iter_mut().zip(attrs.iter().zip(&data)) {
                col[dst] = col_data.cell_bytes(i, attr.cell_size()).to_vec();
            }
        }
    }
    Ok(())
}

/// Coordinate key tuple ordered by the array's cell order, for the merge map.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OrderedKey {
    keys: CoordKeys,
    order: CellOrder,
}

impl PartialOrd for OrderedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_keys(self.order, &self.keys, &other.keys)
    }
}

fn mbr_intersects(mbr: &[(u64, u64)], ranges: &[(u64, u64)]) -> bool {
    mbr.iter()
        .zip(ranges)
        .all(|((mlo, mhi), (lo, hi))| mlo <= hi && mhi >= lo)
}

fn in_ranges(keys: &[u64], ranges: &[(u64, u64)]) -> bool {
    keys.iter()
        .zip(ranges)
        .all(|(k, (lo, hi))| k >= lo && k <= hi)
}

fn read_sparse(
    schema: &ArraySchema,
    ranges: &[(u64, u64)],
    attrs: &[&Attribute],
    fragments: &[FragmentReader],
    request: &ReadRequest,
) -> StratumResult<ReadResult> {
    let mapper = CoordMapper::new(schema)?;
    let order = schema.cell_order();

    // Keyed overlay: fragments are visited oldest first, so a later fragment's
    // cell replaces an earlier one at the same coordinates.
    let mut merged: BTreeMap<OrderedKey, Vec<Vec<u8>>> = BTreeMap::new();
    for reader in fragments {
        let positions = reader
            .meta()
            .tile_mbrs
            .iter()
            .enumerate()
            .filter(|(_, mbr)| mbr_intersects(mbr, ranges))
            .map(|(pos, _)| pos)
            .collect_vec();
        let decoded = positions
            .par_iter()
            .map(|pos| {
                reader
                    .read_coords_tile(schema, *pos)
                    .map(|coords| {
                        attrs
                            .iter()
                            .map(|attr| reader.read_attr_tile(attr, *pos))
                            .collect::<StratumResult<Vec<_>>>()
                            .map(|data| (coords, data))
                    })
                    .flatten()
            })
            .collect::<StratumResult<Vec<_>>>()?;

        for (coords, data) in decoded {
            for (i, keys) in coords.iter().enumerate() {
                if !in_ranges(keys, ranges) {
                    continue;
                }
                let cell = attrs
                    .iter()
                    .zip(&data)
                    .map(|(attr, col)| col.cell_bytes(i, attr.cell_size()).to_vec())
                    .collect_vec();
                merged.insert(
                    OrderedKey {
                        keys: keys.clone(),
                        order,
                    },
                    cell,
                );
            }
        }
    }

    check_capacity(merged.len() as u64, request.max_cells)?;
    let cells = merged.len() as u64;
    let entries = merged.into_iter().collect_vec();
    let ordered: Box<dyn Iterator<Item = &(OrderedKey, Vec<Vec<u8>>)>> = match request.order {
        ResultOrder::Natural => Box::new(entries.iter()),
        ResultOrder::Reversed => Box::new(entries.iter().rev()),
    };

    let mut coords_out = Vec::with_capacity(entries.len());
    let mut cols = attrs.iter().map(|attr| AttrData::empty(attr)).collect_vec();
    for (key, cell) in ordered {
        coords_out.push(key.keys.clone());
        for (col, bytes) in cols.iter_mut().zip(cell) {
            col.push_cell(bytes);
        }
    }

    let attrs_out = attrs
        .iter()
        .zip(cols)
        .map(|(attr, col)| (attr.name().to_string(), col))
        .collect();
    Ok(ReadResult {
        coords: Some(mapper.keys_to_bytes(&coords_out)),
        attrs: attrs_out,
        cells,
    })
}
