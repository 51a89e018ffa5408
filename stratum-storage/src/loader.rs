use std::sync::Arc;

use itertools::Itertools;
use stratum_error::{stratum_bail, stratum_err, StratumResult};
use stratum_layout::{box_cell_count, linearize, CoordMapper};
use stratum_schema::{
    match_each_datatype, ArrayKind, ArraySchema, Attribute, CellValNum, CoordScalar, Datatype,
};

use crate::{AttrData, CellBatch, FragmentInput, FragmentMeta, StorageManager};

/// One bulk write's worth of cells, in one of the supported input formats.
#[derive(Debug)]
pub enum LoadInput {
    /// Coordinate cells as a packed buffer plus one binary column per schema
    /// attribute, in schema order. On a dense array this writes a scattered
    /// fragment superseding only the named cells.
    SparseBinary {
        /// Coordinate tuples in the array's native coordinate encoding.
        coords: Vec<u8>,
        /// Attribute columns, in schema order.
        attrs: Vec<AttrData>,
    },
    /// A dense subarray write: columns enumerate the subarray in cell order.
    DenseBinary {
        /// Inclusive per-dimension bounds of the (tile-aligned) target subarray.
        subarray: Vec<(CoordScalar, CoordScalar)>,
        /// Attribute columns, in schema order.
        attrs: Vec<AttrData>,
    },
    /// Delimited text records: coordinates first, then attribute values, one cell
    /// per line.
    Text {
        /// The record text.
        text: String,
        /// Field delimiter.
        delimiter: char,
    },
}

/// Turns load inputs into sealed fragments: parsing, validation, ordering, then a
/// single fragment write through the storage manager.
#[derive(Debug, Clone)]
pub struct Loader {
    manager: Arc<StorageManager>,
}

impl Loader {
    /// A loader writing through the given manager.
    pub fn new(manager: Arc<StorageManager>) -> Self {
        Self { manager }
    }

    /// Load a batch of cells into an array as one new fragment.
    ///
    /// `sorted` is the caller's claim that coordinate cells already arrive in the
    /// array's cell order; a false claim fails fast with `UnsortedInput` before
    /// anything is written. Unsorted input is sorted and deduplicated here, keeping
    /// the last occurrence of a repeated coordinate.
    ///
    /// Text records on a dense array are taken as the initial population: they
    /// scatter into a zero-filled full-domain fragment. Use [`Loader::update`] for
    /// incremental dense writes.
    pub fn load(&self, array: &str, input: LoadInput, sorted: bool) -> StratumResult<FragmentMeta> {
        self.write(array, input, sorted, false)
    }

    /// Append another batch to an existing array at a newer timestamp; later
    /// fragments win over earlier ones cell by cell.
    ///
    /// On a dense array, text records become a coordinate-scattered fragment that
    /// supersedes only the cells it names; every other cell keeps its prior value.
    /// Tile-aligned binary subarrays write dense fragments, as in [`Loader::load`].
    pub fn update(
        &self,
        array: &str,
        input: LoadInput,
        sorted: bool,
    ) -> StratumResult<FragmentMeta> {
        self.write(array, input, sorted, true)
    }

    fn write(
        &self,
        array: &str,
        input: LoadInput,
        sorted: bool,
        incremental: bool,
    ) -> StratumResult<FragmentMeta> {
        let schema = self.manager.load_schema(array)?;
        let input = match input {
            LoadInput::SparseBinary { coords, attrs } => {
                let batch = CellBatch::new_sparse(&schema, &coords, attrs)?;
                self.sparse_input(&schema, batch, sorted)?
            }
            LoadInput::DenseBinary { subarray, attrs } => {
                let ranges = normalize_subarray(&schema, &subarray)?;
                let batch = CellBatch::new_dense(&schema, box_cell_count(&ranges)?, attrs)?;
                let (_, attrs) = batch.into_parts();
                FragmentInput::Dense { ranges, attrs }
            }
            LoadInput::Text { text, delimiter } => {
                if schema.kind() == ArrayKind::Sparse || incremental {
                    let (coords, attrs) = parse_sparse_text(&schema, &text, delimiter)?;
                    let batch = CellBatch::new_sparse(&schema, &coords, attrs)?;
                    self.sparse_input(&schema, batch, sorted)?
                } else {
                    parse_dense_text(&schema, &text, delimiter)?
                }
            }
        };
        self.manager.create_fragment(&schema, input)
    }

    fn sparse_input(
        &self,
        schema: &ArraySchema,
        mut batch: CellBatch,
        sorted: bool,
    ) -> StratumResult<FragmentInput> {
        if sorted {
            batch.check_sorted(schema.cell_order())?;
        } else {
            batch.sort_and_dedup(schema, schema.cell_order());
        }
        let (coords, attrs) = batch.into_parts();
        let coords = coords
            .ok_or_else(|| stratum_err!("sparse batch carries no coordinates"))?;
        Ok(FragmentInput::Sparse { coords, attrs })
    }
}

/// Normalize and bounds-check a user subarray into per-dimension key ranges.
pub fn normalize_subarray(
    schema: &ArraySchema,
    subarray: &[(CoordScalar, CoordScalar)],
) -> StratumResult<Vec<(u64, u64)>> {
    if subarray.len() != schema.ndim() {
        stratum_bail!(
            "subarray has {} ranges for {} dimensions",
            subarray.len(),
            schema.ndim()
        );
    }
    let mapper = CoordMapper::new(schema)?;
    let mut ranges = Vec::with_capacity(subarray.len());
    for (dim, (lo, hi)) in subarray.iter().enumerate() {
        let lo = mapper.normalize(dim, *lo)?;
        let hi = mapper.normalize(dim, *hi)?;
        if lo > hi {
            stratum_bail!(
                "subarray range for dimension '{}' has low above high",
                schema.dimensions()[dim].name()
            );
        }
        ranges.push((lo, hi));
    }
    Ok(ranges)
}

fn parse_sparse_text(
    schema: &ArraySchema,
    text: &str,
    delimiter: char,
) -> StratumResult<(Vec<u8>, Vec<AttrData>)> {
    let mut coords = Vec::new();
    let mut attrs = schema.attributes().iter().map(AttrData::empty).collect_vec();
    for (line_no, line) in records(text) {
        let mut fields = line.split(delimiter);
        for _ in 0..schema.ndim() {
            let field = next_field(&mut fields, line_no)?;
            coords.extend_from_slice(&parse_value(schema.coords_datatype(), field, line_no)?);
        }
        parse_attr_fields(schema, &mut fields, &mut attrs, line_no)?;
    }
    Ok((coords, attrs))
}

/// Initial dense load: text records scatter into a zero-filled buffer covering the
/// full domain, so the fragment is always tile-aligned and later reads see an
/// explicit zero for any cell the text left out. Incremental writes go through the
/// scattered-update path instead.
fn parse_dense_text(
    schema: &ArraySchema,
    text: &str,
    delimiter: char,
) -> StratumResult<FragmentInput> {
    let mapper = CoordMapper::new(schema)?;
    let spans = schema
        .dimensions()
        .iter()
        .map(stratum_schema::Dimension::extent)
        .collect::<StratumResult<Vec<_>>>()?;
    let ranges = spans.iter().map(|span| (0, span - 1)).collect_vec();
    let total = box_cell_count(&ranges)? as usize;

    let sizes = schema
        .attributes()
        .iter()
        .map(|attr| {
            attr.cell_size().ok_or_else(|| {
                stratum_err!(
                    "attribute '{}' is variable-sized; text loads require fixed cells",
                    attr.name()
                )
            })
        })
        .collect::<StratumResult<Vec<_>>>()?;
    let mut attrs = sizes
        .iter()
        .map(|size| AttrData::Fixed(vec![0u8; total * size]))
        .collect_vec();

    for (line_no, line) in records(text) {
        let mut fields = line.split(delimiter);
        let mut keys = Vec::with_capacity(schema.ndim());
        for dim in 0..schema.ndim() {
            let field = next_field(&mut fields, line_no)?;
            let value: i64 = field.trim().parse().map_err(|_| {
                stratum_err!("line {line_no}: '{field}' is not an integer coordinate")
            })?;
            keys.push(mapper.normalize(dim, CoordScalar::Int(value))?);
        }
        let pos = linearize(&keys, &spans, schema.cell_order())? as usize;
        for ((attr, data), size) in schema.attributes().iter().zip(&mut attrs).zip(&sizes) {
            let bytes = parse_cell(attr, &mut fields, line_no)?;
            let AttrData::Fixed(buf) = data else {
                stratum_bail!("dense text columns are always fixed-size");
            };
            buf[pos * size..(pos + 1) * size].copy_from_slice(&bytes);
        }
    }
    Ok(FragmentInput::Dense { ranges, attrs })
}

fn records(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
}

fn next_field<'a>(
    fields: &mut impl Iterator<Item = &'a str>,
    line_no: usize,
) -> StratumResult<&'a str> {
    fields
        .next()
        .ok_or_else(|| stratum_err!("line {line_no}: record has too few fields"))
}

fn parse_attr_fields<'a>(
    schema: &ArraySchema,
    fields: &mut impl Iterator<Item = &'a str>,
    attrs: &mut [AttrData],
    line_no: usize,
) -> StratumResult<()> {
    for (attr, data) in schema.attributes().iter().zip(attrs) {
        let bytes = parse_cell(attr, fields, line_no)?;
        data.push_cell(&bytes);
    }
    Ok(())
}

fn parse_cell<'a>(
    attr: &Attribute,
    fields: &mut impl Iterator<Item = &'a str>,
    line_no: usize,
) -> StratumResult<Vec<u8>> {
    let CellValNum::Fixed(values) = attr.cell_val_num() else {
        stratum_bail!(
            "attribute '{}' is variable-sized; text loads require fixed cells",
            attr.name()
        );
    };
    let mut bytes = Vec::with_capacity(attr.cell_size().unwrap_or(0));
    for _ in 0..values {
        let field = next_field(fields, line_no)?;
        bytes.extend_from_slice(&parse_value(attr.datatype(), field, line_no)?);
    }
    Ok(bytes)
}

fn parse_value(datatype: Datatype, field: &str, line_no: usize) -> StratumResult<Vec<u8>> {
    match_each_datatype!(datatype, |$T| {
        let value: $T = field.trim().parse().map_err(|_| {
            stratum_err!("line {line_no}: '{field}' is not a valid {datatype}")
        })?;
        Ok(value.to_le_bytes().to_vec())
    })
}

#[cfg(test)]
mod tests {
    use stratum_error::ErrorCode;
    use stratum_schema::{ArraySchema, Attribute, Datatype, Dimension};

    use super::*;

    fn sparse_schema() -> ArraySchema {
        ArraySchema::builder("pts")
            .dimension(Dimension::int("x", Datatype::I64, 0, 15))
            .dimension(Dimension::int("y", Datatype::I64, 0, 15))
            .attribute(Attribute::new("v", Datatype::I32))
            .sparse(4)
            .build()
            .unwrap()
    }

    fn dense_schema() -> ArraySchema {
        ArraySchema::builder("grid")
            .dimension(Dimension::int("x", Datatype::I64, 0, 3))
            .attribute(Attribute::new("v", Datatype::I32))
            .dense(vec![2])
            .build()
            .unwrap()
    }

    fn manager() -> (tempfile::TempDir, Arc<StorageManager>) {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(StorageManager::create(dir.path()).unwrap());
        (dir, manager)
    }

    #[test]
    fn sparse_text_load_writes_a_sealed_fragment() {
        let (_dir, manager) = manager();
        let schema = sparse_schema();
        manager.define_array(&schema).unwrap();
        let loader = Loader::new(Arc::clone(&manager));
        let meta = loader
            .load(
                "pts",
                LoadInput::Text {
                    text: "3,4,30\n1,2,10\n".into(),
                    delimiter: ',',
                },
                false,
            )
            .unwrap();
        assert_eq!(meta.cell_count, 2);
        assert_eq!(manager.list_fragments("pts").unwrap().len(), 1);
    }

    #[test]
    fn sorted_claim_is_checked() {
        let (_dir, manager) = manager();
        manager.define_array(&sparse_schema()).unwrap();
        let loader = Loader::new(manager);
        let err = loader
            .load(
                "pts",
                LoadInput::Text {
                    text: "3,4,30\n1,2,10\n".into(),
                    delimiter: ',',
                },
                true,
            )
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsortedInput);
    }

    #[test]
    fn dense_text_fills_unmentioned_cells_with_zero() {
        let (_dir, manager) = manager();
        manager.define_array(&dense_schema()).unwrap();
        let loader = Loader::new(manager);
        let meta = loader
            .load(
                "grid",
                LoadInput::Text {
                    text: "2,77\n".into(),
                    delimiter: ',',
                },
                false,
            )
            .unwrap();
        // Full-domain fragment, not just the mentioned cell.
        assert_eq!(meta.cell_count, 4);
    }

    #[test]
    fn dense_text_update_writes_only_the_named_cells() {
        let (_dir, manager) = manager();
        manager.define_array(&dense_schema()).unwrap();
        let loader = Loader::new(manager);
        let meta = loader
            .update(
                "grid",
                LoadInput::Text {
                    text: "2,77\n".into(),
                    delimiter: ',',
                },
                false,
            )
            .unwrap();
        // A scattered fragment, not a full-domain one.
        assert_eq!(meta.cell_count, 1);
        assert!(meta.dense_ranges.is_none());
        assert_eq!(meta.kind, ArrayKind::Sparse);
    }

    #[test]
    fn malformed_field_is_reported_with_its_line() {
        let (_dir, manager) = manager();
        manager.define_array(&sparse_schema()).unwrap();
        let loader = Loader::new(manager);
        let err = loader
            .load(
                "pts",
                LoadInput::Text {
                    text: "1,2,ten\n".into(),
                    delimiter: ',',
                },
                false,
            )
            .unwrap_err();
        assert!(err.to_string().contains("line 1"), "{err}");
    }

    #[test]
    fn out_of_domain_text_coordinate_rejected() {
        let (_dir, manager) = manager();
        manager.define_array(&sparse_schema()).unwrap();
        let loader = Loader::new(manager);
        let err = loader
            .load(
                "pts",
                LoadInput::Text {
                    text: "99,0,1\n".into(),
                    delimiter: ',',
                },
                false,
            )
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::OutOfBounds);
    }
}
