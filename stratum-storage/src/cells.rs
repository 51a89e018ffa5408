use stratum_error::{stratum_bail, StratumResult};
use stratum_layout::{check_sorted, sort_permutation, CoordKeys, CoordMapper};
use stratum_schema::{ArrayKind, ArraySchema, Attribute, CellOrder};

/// One attribute's values for a batch of cells.
///
/// Fixed-size attributes pack cells contiguously; variable-sized attributes carry one
/// start offset per cell into a shared values buffer (the last cell ends at the
/// buffer's end). This mirrors the engine's bulk-load input contract.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrData {
    /// Contiguous fixed-size cells.
    Fixed(Vec<u8>),
    /// Variable-sized cells: `offsets[i]` is the byte start of cell `i` in `values`.
    Var {
        /// Byte start of each cell in `values`, non-decreasing.
        offsets: Vec<u64>,
        /// Concatenated cell values.
        values: Vec<u8>,
    },
}

impl AttrData {
    /// An empty column of the right shape for `attr`.
    pub fn empty(attr: &Attribute) -> Self {
        if attr.is_var_sized() {
            Self::Var {
                offsets: Vec::new(),
                values: Vec::new(),
            }
        } else {
            Self::Fixed(Vec::new())
        }
    }

    /// Number of cells, given the attribute's fixed cell size (`None` for var).
    pub fn cell_count(&self, cell_size: Option<usize>) -> u64 {
        match (self, cell_size) {
            (Self::Fixed(bytes), Some(size)) if size > 0 => (bytes.len() / size) as u64,
            (Self::Fixed(_), _) => 0,
            (Self::Var { offsets, .. }, _) => offsets.len() as u64,
        }
    }

    /// Validate shape against the declared attribute and an expected cell count.
    pub fn validate(&self, attr: &Attribute, expected_cells: u64) -> StratumResult<()> {
        match (self, attr.cell_size()) {
            (Self::Fixed(bytes), Some(size)) => {
                if bytes.len() % size != 0 {
                    stratum_bail!(
                        "attribute '{}' buffer of {} bytes is not a whole number of \
                         {size}-byte cells",
                        attr.name(),
                        bytes.len()
                    );
                }
                if (bytes.len() / size) as u64 != expected_cells {
                    stratum_bail!(
                        "attribute '{}' buffer holds {} cells, expected {expected_cells}",
                        attr.name(),
                        bytes.len() / size
                    );
                }
            }
            (Self::Var { offsets, values }, None) => {
                if offsets.len() as u64 != expected_cells {
                    stratum_bail!(
                        "attribute '{}' offsets buffer holds {} cells, expected {expected_cells}",
                        attr.name(),
                        offsets.len()
                    );
                }
                let value_size = attr.datatype().size() as u64;
                let mut previous = 0u64;
                for (i, offset) in offsets.iter().enumerate() {
                    if *offset < previous || *offset > values.len() as u64 {
                        stratum_bail!(
                            "attribute '{}' offset {offset} at cell {i} is out of order",
                            attr.name()
                        );
                    }
                    previous = *offset;
                }
                if values.len() as u64 % value_size != 0 {
                    stratum_bail!(
                        "attribute '{}' values buffer is not a whole number of {} values",
                        attr.name(),
                        attr.datatype()
                    );
                }
            }
            (Self::Fixed(_), None) => stratum_bail!(
                "attribute '{}' is variable-sized but a fixed buffer was supplied",
                attr.name()
            ),
            (Self::Var { .. }, Some(_)) => stratum_bail!(
                "attribute '{}' is fixed-size but an offsets buffer was supplied",
                attr.name()
            ),
        }
        Ok(())
    }

    /// The bytes of cell `index`.
    pub fn cell_bytes(&self, index: usize, cell_size: Option<usize>) -> &[u8] {
        match self {
            Self::Fixed(bytes) => {
                let size = cell_size.unwrap_or(0);
                &bytes[index * size..(index + 1) * size]
            }
            Self::Var { offsets, values } => {
                let start = offsets[index] as usize;
                let end = offsets
                    .get(index + 1)
                    .map_or(values.len(), |o| *o as usize);
                &values[start..end]
            }
        }
    }

    /// Append one cell's bytes.
    pub fn push_cell(&mut self, bytes: &[u8]) {
        match self {
            Self::Fixed(out) => out.extend_from_slice(bytes),
            Self::Var { offsets, values } => {
                offsets.push(values.len() as u64);
                values.extend_from_slice(bytes);
            }
        }
    }

    /// Gather the cells at `indices`, in that order, into a new column.
    pub fn gather(&self, indices: &[usize], cell_size: Option<usize>) -> Self {
        let mut out = match self {
            Self::Fixed(_) => Self::Fixed(Vec::with_capacity(
                indices.len() * cell_size.unwrap_or(0),
            )),
            Self::Var { .. } => Self::Var {
                offsets: Vec::with_capacity(indices.len()),
                values: Vec::new(),
            },
        };
        for index in indices {
            out.push_cell(self.cell_bytes(*index, cell_size));
        }
        out
    }

    /// Serialize the column as a single tile payload.
    ///
    /// Fixed columns are their raw bytes. Var columns are framed as
    /// `[cell count u64][end offset u64 per cell][values]` so the payload is
    /// self-describing after the filter pipeline is reversed.
    pub fn tile_payload(&self) -> Vec<u8> {
        match self {
            Self::Fixed(bytes) => bytes.clone(),
            Self::Var { offsets, values } => {
                let mut out =
                    Vec::with_capacity(8 + offsets.len() * 8 + values.len());
                out.extend_from_slice(&(offsets.len() as u64).to_le_bytes());
                for (i, _) in offsets.iter().enumerate() {
                    let end = offsets.get(i + 1).copied().unwrap_or(values.len() as u64);
                    out.extend_from_slice(&end.to_le_bytes());
                }
                out.extend_from_slice(values);
                out
            }
        }
    }

    /// Invert [`AttrData::tile_payload`].
    pub fn from_tile_payload(var_sized: bool, payload: &[u8]) -> StratumResult<Self> {
        if !var_sized {
            return Ok(Self::Fixed(payload.to_vec()));
        }
        let Some((count_bytes, rest)) = payload.split_at_checked(8) else {
            stratum_bail!(CorruptData: "var tile payload is missing its cell count");
        };
        let mut buf = [0u8; 8];
        buf.copy_from_slice(count_bytes);
        let count = u64::from_le_bytes(buf) as usize;
        let Some((ends_bytes, values)) = rest.split_at_checked(count * 8) else {
            stratum_bail!(CorruptData: "var tile payload is missing offsets for {count} cells");
        };
        let mut offsets = Vec::with_capacity(count);
        let mut start = 0u64;
        for end_bytes in ends_bytes.chunks_exact(8) {
            buf.copy_from_slice(end_bytes);
            let end = u64::from_le_bytes(buf);
            if end < start || end > values.len() as u64 {
                stratum_bail!(CorruptData: "var tile payload has an out-of-order offset");
            }
            offsets.push(start);
            start = end;
        }
        if start != values.len() as u64 {
            stratum_bail!(CorruptData: "var tile payload values extend past the last offset");
        }
        Ok(Self::Var {
            offsets,
            values: values.to_vec(),
        })
    }
}

/// A validated, schema-shaped batch of cells bound for one fragment.
#[derive(Debug, Clone)]
pub struct CellBatch {
    coords: Option<Vec<CoordKeys>>,
    attrs: Vec<AttrData>,
    cells: u64,
}

impl CellBatch {
    /// Build a coordinate batch from a packed coordinate buffer and one column per
    /// schema attribute, in schema order. Coordinates are normalized and bounds
    /// checked here, before any mutation of storage. Dense arrays take coordinate
    /// batches too, for scattered updates.
    pub fn new_sparse(
        schema: &ArraySchema,
        coords_bytes: &[u8],
        attrs: Vec<AttrData>,
    ) -> StratumResult<Self> {
        let mapper = CoordMapper::new(schema)?;
        let coords = mapper.keys_from_bytes(coords_bytes)?;
        let batch = Self::with_cells(schema, Some(coords), attrs)?;
        Ok(batch)
    }

    /// Build a dense batch: columns hold `expected_cells` cells in the cell-order
    /// enumeration of the write's subarray.
    pub fn new_dense(
        schema: &ArraySchema,
        expected_cells: u64,
        attrs: Vec<AttrData>,
    ) -> StratumResult<Self> {
        if schema.kind() != ArrayKind::Dense {
            stratum_bail!("array '{}' is sparse; dense batches are positional", schema.name());
        }
        let batch = Self::with_cells(schema, None, attrs)?;
        if batch.cells != expected_cells {
            stratum_bail!(
                "dense batch holds {} cells but the subarray covers {expected_cells}",
                batch.cells
            );
        }
        Ok(batch)
    }

    fn with_cells(
        schema: &ArraySchema,
        coords: Option<Vec<CoordKeys>>,
        attrs: Vec<AttrData>,
    ) -> StratumResult<Self> {
        if attrs.len() != schema.attributes().len() {
            stratum_bail!(
                "batch has {} attribute columns, schema declares {}",
                attrs.len(),
                schema.attributes().len()
            );
        }
        let cells = match &coords {
            Some(c) => c.len() as u64,
            None => {
                let first = &schema.attributes()[0];
                attrs[0].cell_count(first.cell_size())
            }
        };
        for (attr, data) in schema.attributes().iter().zip(&attrs) {
            data.validate(attr, cells)?;
        }
        Ok(Self {
            coords,
            attrs,
            cells,
        })
    }

    /// Number of cells in the batch.
    pub fn cell_count(&self) -> u64 {
        self.cells
    }

    /// Normalized coordinates (sparse batches only).
    pub fn coords(&self) -> Option<&[CoordKeys]> {
        self.coords.as_deref()
    }

    /// The attribute columns, in schema order.
    pub fn attrs(&self) -> &[AttrData] {
        &self.attrs
    }

    /// Consume the batch into its parts.
    pub fn into_parts(self) -> (Option<Vec<CoordKeys>>, Vec<AttrData>) {
        (self.coords, self.attrs)
    }

    /// Fail fast with `UnsortedInput` if a batch claimed sorted is not.
    pub fn check_sorted(&self, order: CellOrder) -> StratumResult<()> {
        if let Some(coords) = &self.coords {
            check_sorted(coords, order)?;
        }
        Ok(())
    }

    /// Sort a sparse batch by the cell order and drop duplicate coordinates,
    /// keeping the last occurrence so a later cell in the input wins.
    pub fn sort_and_dedup(&mut self, schema: &ArraySchema, order: CellOrder) {
        let Some(coords) = &self.coords else {
            return;
        };
        let perm = sort_permutation(coords, order);
        // Keep only the final duplicate of each coordinate.
        let mut keep = Vec::with_capacity(perm.len());
        for (i, idx) in perm.iter().enumerate() {
            let last_of_run = perm
                .get(i + 1)
                .is_none_or(|next| coords[*idx] != coords[*next]);
            if last_of_run {
                keep.push(*idx);
            }
        }
        let coords = self.coords.take().unwrap_or_default();
        self.coords = Some(keep.iter().map(|i| coords[*i].clone()).collect());
        self.attrs = schema
            .attributes()
            .iter()
            .zip(&self.attrs)
            .map(|(attr, data)| data.gather(&keep, attr.cell_size()))
            .collect();
        self.cells = keep.len() as u64;
    }
}

#[cfg(test)]
mod tests {
    use stratum_schema::{Attribute, CellValNum, Datatype, Dimension};

    use super::*;

    fn sparse_schema() -> ArraySchema {
        ArraySchema::builder("pts")
            .dimension(Dimension::int("x", Datatype::I64, 0, 99))
            .dimension(Dimension::int("y", Datatype::I64, 0, 99))
            .attribute(Attribute::new("v", Datatype::I32))
            .sparse(2)
            .build()
            .unwrap()
    }

    fn coords_bytes(pairs: &[(i64, i64)]) -> Vec<u8> {
        pairs
            .iter()
            .flat_map(|(x, y)| [x.to_le_bytes(), y.to_le_bytes()].concat())
            .collect()
    }

    fn i32_cells(values: &[i32]) -> AttrData {
        AttrData::Fixed(values.iter().flat_map(|v| v.to_le_bytes()).collect())
    }

    #[test]
    fn sort_and_dedup_keeps_last_duplicate() {
        let schema = sparse_schema();
        let coords = coords_bytes(&[(2, 2), (1, 1), (2, 2)]);
        let mut batch =
            CellBatch::new_sparse(&schema, &coords, vec![i32_cells(&[10, 20, 30])]).unwrap();
        batch.sort_and_dedup(&schema, CellOrder::RowMajor);
        assert_eq!(batch.cell_count(), 2);
        assert_eq!(batch.coords().unwrap(), &[vec![1, 1], vec![2, 2]]);
        assert_eq!(batch.attrs()[0], i32_cells(&[20, 30]));
    }

    #[test]
    fn mismatched_cell_counts_rejected() {
        let schema = sparse_schema();
        let coords = coords_bytes(&[(1, 1), (2, 2)]);
        let err = CellBatch::new_sparse(&schema, &coords, vec![i32_cells(&[10])]).unwrap_err();
        assert_eq!(err.code(), stratum_error::ErrorCode::InvalidArgument);
    }

    #[test]
    fn var_payload_round_trip() {
        let data = AttrData::Var {
            offsets: vec![0, 4, 4, 10],
            values: (0..14u8).collect(),
        };
        let payload = data.tile_payload();
        assert_eq!(AttrData::from_tile_payload(true, &payload).unwrap(), data);
    }

    #[test]
    fn var_shape_validated() {
        let attr = Attribute::new("s", Datatype::U8).with_cell_val_num(CellValNum::Var);
        let bad = AttrData::Var {
            offsets: vec![4, 0],
            values: vec![0; 8],
        };
        assert!(bad.validate(&attr, 2).is_err());
    }
}
