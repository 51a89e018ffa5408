use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use stratum_error::{stratum_bail, StratumResult};
use stratum_filter::{FilterPipeline, FilterSpec};

use crate::Datatype;

/// How many values one cell of an attribute holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellValNum {
    /// Every cell holds exactly this many values.
    Fixed(u32),
    /// Cells hold a variable number of values, described by an offsets buffer.
    Var,
}

/// A named attribute with a primitive datatype, a fixed or variable cell size, and an
/// ordered filter pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    name: String,
    datatype: Datatype,
    cell_val_num: CellValNum,
    filters: Vec<FilterSpec>,
}

impl Attribute {
    /// Create a single-value fixed-size attribute with no filters.
    pub fn new(name: impl Into<String>, datatype: Datatype) -> Self {
        Self {
            name: name.into(),
            datatype,
            cell_val_num: CellValNum::Fixed(1),
            filters: Vec::new(),
        }
    }

    /// Set the number of values per cell.
    pub fn with_cell_val_num(mut self, cell_val_num: CellValNum) -> Self {
        self.cell_val_num = cell_val_num;
        self
    }

    /// Set the ordered filter list.
    pub fn with_filters(mut self, filters: Vec<FilterSpec>) -> Self {
        self.filters = filters;
        self
    }

    /// The attribute name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value datatype.
    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    /// The declared values-per-cell.
    pub fn cell_val_num(&self) -> CellValNum {
        self.cell_val_num
    }

    /// The declared filter specs, in apply order.
    pub fn filters(&self) -> &[FilterSpec] {
        &self.filters
    }

    /// The fixed cell size in bytes, or `None` for variable-sized cells.
    pub fn cell_size(&self) -> Option<usize> {
        match self.cell_val_num {
            CellValNum::Fixed(n) => Some(self.datatype.size() * n as usize),
            CellValNum::Var => None,
        }
    }

    /// Whether cells are variable-sized.
    pub fn is_var_sized(&self) -> bool {
        matches!(self.cell_val_num, CellValNum::Var)
    }

    /// Build the attribute's validated filter pipeline.
    pub fn pipeline(&self) -> StratumResult<FilterPipeline> {
        FilterPipeline::try_new(&self.filters, self.cell_size())
    }

    /// Validate name and shape invariants, including that the filter pipeline is
    /// constructible for this cell shape.
    pub fn validate(&self) -> StratumResult<()> {
        crate::validate_name("attribute", &self.name)?;
        if matches!(self.cell_val_num, CellValNum::Fixed(0)) {
            stratum_bail!(
                Schema: "attribute '{}' declares zero values per cell",
                self.name
            );
        }
        self.pipeline()
            .map_err(|e| e.with_context(format!("attribute '{}'", self.name)))?;
        Ok(())
    }
}

impl Display for Attribute {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.cell_val_num {
            CellValNum::Fixed(1) => write!(f, "{} {}", self.name, self.datatype)?,
            CellValNum::Fixed(n) => write!(f, "{} {}[{n}]", self.name, self.datatype)?,
            CellValNum::Var => write!(f, "{} {}[var]", self.name, self.datatype)?,
        }
        if !self.filters.is_empty() {
            write!(f, " filters={:?}", self.filters)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::COORDS_NAME;

    #[test]
    fn reserved_name_rejected() {
        let attr = Attribute::new(COORDS_NAME, Datatype::I32);
        assert!(attr.validate().is_err());
    }

    #[test]
    fn fixed_width_filter_on_var_cells_rejected() {
        let attr = Attribute::new("a", Datatype::I32)
            .with_cell_val_num(CellValNum::Var)
            .with_filters(vec![FilterSpec::ByteShuffle]);
        assert!(attr.validate().is_err());
    }

    #[test]
    fn cell_size_accounts_for_multi_value_cells() {
        let attr = Attribute::new("a", Datatype::F32).with_cell_val_num(CellValNum::Fixed(3));
        assert_eq!(attr.cell_size(), Some(12));
    }
}
