use std::fmt::{Display, Formatter};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use stratum_error::{stratum_bail, StratumResult};
use stratum_filter::{FilterPipeline, FilterSpec};

use crate::{Attribute, Datatype, Dimension};

/// Whether every in-domain coordinate has a cell (dense) or only written ones (sparse).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrayKind {
    /// Every in-domain coordinate has a defined cell.
    Dense,
    /// Only explicitly written coordinates exist.
    Sparse,
}

/// A linearization rule for multi-dimensional coordinates. Used both to order tiles
/// within the array and cells within a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellOrder {
    /// Last dimension varies fastest.
    RowMajor,
    /// First dimension varies fastest.
    ColMajor,
    /// Space-filling curve: bit-interleave of the normalized coordinates.
    Morton,
}

/// The physical tiling of the array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Tiling {
    /// Dense arrays tile the domain with fixed per-dimension extents.
    Dense {
        /// Tile extent per dimension, in domain units.
        extents: Vec<u64>,
    },
    /// Sparse arrays group sorted cells into runs of at most `capacity` cells.
    Sparse {
        /// Target number of cells per tile.
        capacity: u64,
    },
}

/// The immutable, validated description of an array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArraySchema {
    name: String,
    dimensions: Vec<Dimension>,
    attributes: Vec<Attribute>,
    tile_order: CellOrder,
    cell_order: CellOrder,
    tiling: Tiling,
    coords_filters: Vec<FilterSpec>,
}

impl ArraySchema {
    /// Start building a schema for the named array.
    pub fn builder(name: impl Into<String>) -> ArraySchemaBuilder {
        ArraySchemaBuilder {
            name: name.into(),
            dimensions: Vec::new(),
            attributes: Vec::new(),
            tile_order: CellOrder::RowMajor,
            cell_order: CellOrder::RowMajor,
            tiling: None,
            coords_filters: Vec::new(),
        }
    }

    /// The array name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ordered dimension list. Order is significant: it defines the coordinate
    /// tuple layout.
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.dimensions.len()
    }

    /// The declared attributes.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name() == name)
    }

    /// Dense or sparse.
    pub fn kind(&self) -> ArrayKind {
        match self.tiling {
            Tiling::Dense { .. } => ArrayKind::Dense,
            Tiling::Sparse { .. } => ArrayKind::Sparse,
        }
    }

    /// The order of tiles within the array.
    pub fn tile_order(&self) -> CellOrder {
        self.tile_order
    }

    /// The order of cells within a tile (and of results in a read).
    pub fn cell_order(&self) -> CellOrder {
        self.cell_order
    }

    /// The physical tiling.
    pub fn tiling(&self) -> &Tiling {
        &self.tiling
    }

    /// Per-dimension tile extents; only valid for dense arrays.
    pub fn dense_extents(&self) -> StratumResult<&[u64]> {
        match &self.tiling {
            Tiling::Dense { extents } => Ok(extents),
            Tiling::Sparse { .. } => Err(stratum_error::stratum_err!(
                Schema: "array '{}' is sparse and has no tile extents",
                self.name
            )),
        }
    }

    /// Cells-per-tile capacity; only valid for sparse arrays.
    pub fn sparse_capacity(&self) -> StratumResult<u64> {
        match self.tiling {
            Tiling::Sparse { capacity } => Ok(capacity),
            Tiling::Dense { .. } => Err(stratum_error::stratum_err!(
                Schema: "array '{}' is dense and has no tile capacity",
                self.name
            )),
        }
    }

    /// The shared coordinate datatype of every dimension.
    pub fn coords_datatype(&self) -> Datatype {
        self.dimensions[0].datatype()
    }

    /// Size in bytes of one full coordinate tuple.
    pub fn coords_size(&self) -> usize {
        self.coords_datatype().size() * self.ndim()
    }

    /// The filter specs applied to coordinate tiles.
    pub fn coords_filters(&self) -> &[FilterSpec] {
        &self.coords_filters
    }

    /// Build the validated coordinate filter pipeline.
    pub fn coords_pipeline(&self) -> StratumResult<FilterPipeline> {
        FilterPipeline::try_new(&self.coords_filters, Some(self.coords_size()))
    }

    /// Serialize to the compact binary encoding.
    pub fn to_flexbuffers(&self) -> StratumResult<Vec<u8>> {
        let mut ser = flexbuffers::FlexbufferSerializer::new();
        self.serialize(&mut ser)?;
        Ok(ser.take_buffer())
    }

    /// Deserialize from the compact binary encoding.
    pub fn from_flexbuffers(bytes: &[u8]) -> StratumResult<Self> {
        let reader = flexbuffers::Reader::get_root(bytes)?;
        let schema = Self::deserialize(reader)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Serialize to the human-readable JSON encoding.
    pub fn to_json(&self) -> StratumResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from the JSON encoding.
    pub fn from_json(json: &str) -> StratumResult<Self> {
        let schema: Self = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Check every schema invariant. Called by the builder and again after
    /// deserialization, so a stored schema is never trusted blindly.
    pub fn validate(&self) -> StratumResult<()> {
        if self.dimensions.is_empty() {
            stratum_bail!(Schema: "array '{}' declares no dimensions", self.name);
        }
        if self.attributes.is_empty() {
            stratum_bail!(Schema: "array '{}' declares no attributes", self.name);
        }
        for dim in &self.dimensions {
            dim.validate()?;
        }
        for attr in &self.attributes {
            attr.validate()?;
        }

        let names = self
            .dimensions
            .iter()
            .map(Dimension::name)
            .chain(self.attributes.iter().map(Attribute::name))
            .collect_vec();
        if let Some(dup) = names.iter().duplicates().next() {
            stratum_bail!(
                Schema: "array '{}' declares the name '{dup}' more than once",
                self.name
            );
        }

        let coords_dt = self.coords_datatype();
        if self.dimensions.iter().any(|d| d.datatype() != coords_dt) {
            stratum_bail!(
                Schema: "array '{}' mixes coordinate datatypes across dimensions",
                self.name
            );
        }

        match &self.tiling {
            Tiling::Dense { extents } => {
                if !coords_dt.is_integer() {
                    stratum_bail!(
                        Schema: "dense array '{}' requires integer coordinates, got {}",
                        self.name,
                        coords_dt
                    );
                }
                if self.tile_order == CellOrder::Morton || self.cell_order == CellOrder::Morton {
                    stratum_bail!(
                        Schema: "dense array '{}' supports row-major and column-major orders only",
                        self.name
                    );
                }
                if extents.len() != self.ndim() {
                    stratum_bail!(
                        Schema: "array '{}' has {} tile extents for {} dimensions",
                        self.name,
                        extents.len(),
                        self.ndim()
                    );
                }
                for (dim, &extent) in self.dimensions.iter().zip(extents) {
                    if extent == 0 {
                        stratum_bail!(
                            Schema: "dimension '{}' has a zero tile extent",
                            dim.name()
                        );
                    }
                    let span = dim.extent()?;
                    if span % extent != 0 {
                        stratum_bail!(
                            Schema: "tile extent {extent} does not evenly tile the \
                             {span}-unit domain of dimension '{}'",
                            dim.name()
                        );
                    }
                }
            }
            Tiling::Sparse { capacity } => {
                if *capacity == 0 {
                    stratum_bail!(
                        Schema: "sparse array '{}' has a zero tile capacity",
                        self.name
                    );
                }
            }
        }

        self.coords_pipeline()
            .map_err(|e| e.with_context("coordinate filters"))?;
        Ok(())
    }
}

impl Display for ArraySchema {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "array '{}' ({:?})", self.name, self.kind())?;
        writeln!(
            f,
            "  tile order {:?}, cell order {:?}",
            self.tile_order, self.cell_order
        )?;
        for dim in &self.dimensions {
            writeln!(f, "  dim  {dim}")?;
        }
        for attr in &self.attributes {
            writeln!(f, "  attr {attr}")?;
        }
        match &self.tiling {
            Tiling::Dense { extents } => writeln!(f, "  tile extents {extents:?}"),
            Tiling::Sparse { capacity } => writeln!(f, "  tile capacity {capacity}"),
        }
    }
}

/// Builder for [`ArraySchema`]; `build` validates every invariant.
pub struct ArraySchemaBuilder {
    name: String,
    dimensions: Vec<Dimension>,
    attributes: Vec<Attribute>,
    tile_order: CellOrder,
    cell_order: CellOrder,
    tiling: Option<Tiling>,
    coords_filters: Vec<FilterSpec>,
}

impl ArraySchemaBuilder {
    /// Append a dimension. Order of calls defines coordinate order.
    pub fn dimension(mut self, dim: Dimension) -> Self {
        self.dimensions.push(dim);
        self
    }

    /// Append an attribute.
    pub fn attribute(mut self, attr: Attribute) -> Self {
        self.attributes.push(attr);
        self
    }

    /// Set the tile order (default row-major).
    pub fn tile_order(mut self, order: CellOrder) -> Self {
        self.tile_order = order;
        self
    }

    /// Set the cell order (default row-major).
    pub fn cell_order(mut self, order: CellOrder) -> Self {
        self.cell_order = order;
        self
    }

    /// Make this a dense array with the given per-dimension tile extents.
    pub fn dense(mut self, extents: Vec<u64>) -> Self {
        self.tiling = Some(Tiling::Dense { extents });
        self
    }

    /// Make this a sparse array with the given cells-per-tile capacity.
    pub fn sparse(mut self, capacity: u64) -> Self {
        self.tiling = Some(Tiling::Sparse { capacity });
        self
    }

    /// Set the coordinate tile filters.
    pub fn coords_filters(mut self, filters: Vec<FilterSpec>) -> Self {
        self.coords_filters = filters;
        self
    }

    /// Validate and produce the immutable schema.
    pub fn build(self) -> StratumResult<ArraySchema> {
        let Some(tiling) = self.tiling else {
            stratum_bail!(
                Schema: "array '{}' must be declared dense or sparse",
                self.name
            );
        };
        let schema = ArraySchema {
            name: self.name,
            dimensions: self.dimensions,
            attributes: self.attributes,
            tile_order: self.tile_order,
            cell_order: self.cell_order,
            tiling,
            coords_filters: self.coords_filters,
        };
        schema.validate()?;
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use stratum_error::ErrorCode;

    use super::*;

    fn dense_2d() -> ArraySchema {
        ArraySchema::builder("weather")
            .dimension(Dimension::int("row", Datatype::I64, 0, 99))
            .dimension(Dimension::int("col", Datatype::I64, 0, 99))
            .attribute(Attribute::new("temp", Datatype::F32))
            .attribute(
                Attribute::new("station", Datatype::U64)
                    .with_filters(vec![FilterSpec::Delta, FilterSpec::Lz4]),
            )
            .dense(vec![10, 10])
            .build()
            .unwrap()
    }

    #[test]
    fn flexbuffers_round_trip() {
        let schema = dense_2d();
        let bytes = schema.to_flexbuffers().unwrap();
        assert_eq!(ArraySchema::from_flexbuffers(&bytes).unwrap(), schema);
    }

    #[test]
    fn json_round_trip() {
        let schema = dense_2d();
        let json = schema.to_json().unwrap();
        assert_eq!(ArraySchema::from_json(&json).unwrap(), schema);
    }

    #[test]
    fn duplicate_attribute_name_rejected() {
        let err = ArraySchema::builder("a")
            .dimension(Dimension::int("x", Datatype::I32, 0, 9))
            .attribute(Attribute::new("v", Datatype::I32))
            .attribute(Attribute::new("v", Datatype::F64))
            .dense(vec![5])
            .build()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Schema);
    }

    #[test]
    fn empty_dimension_list_rejected() {
        let err = ArraySchema::builder("a")
            .attribute(Attribute::new("v", Datatype::I32))
            .sparse(100)
            .build()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Schema);
    }

    #[test]
    fn uneven_tiling_rejected() {
        let err = ArraySchema::builder("a")
            .dimension(Dimension::int("x", Datatype::I32, 1, 10))
            .attribute(Attribute::new("v", Datatype::I32))
            .dense(vec![3])
            .build()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Schema);
    }

    #[test]
    fn dense_float_coordinates_rejected() {
        let err = ArraySchema::builder("a")
            .dimension(Dimension::float("x", Datatype::F64, 0.0, 1.0))
            .attribute(Attribute::new("v", Datatype::I32))
            .dense(vec![1])
            .build()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Schema);
    }

    #[test]
    fn sparse_float_schema_accepted() {
        ArraySchema::builder("pts")
            .dimension(Dimension::float("x", Datatype::F64, -1.0, 1.0))
            .dimension(Dimension::float("y", Datatype::F64, -1.0, 1.0))
            .attribute(Attribute::new("v", Datatype::F32))
            .cell_order(CellOrder::Morton)
            .sparse(1000)
            .build()
            .unwrap();
    }
}
