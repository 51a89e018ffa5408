use serde::{Deserialize, Serialize};
use stratum_error::{stratum_bail, StratumResult};

use crate::{BitWidthReduce, ByteShuffle, Delta, Filter, Gzip, Lz4, NoOp, PositiveDelta, Rle};

/// Cell widths the integer-oriented filters accept.
const INTEGER_WIDTHS: [usize; 4] = [1, 2, 4, 8];

/// The declarative description of one filter stage, as stored in an array schema.
///
/// Specs are validated and turned into [`Filter`] instances once, when the schema is
/// defined; see [`crate::FilterPipeline::try_new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterSpec {
    /// Pass bytes through unchanged.
    NoOp,
    /// Gzip compression at the given level (0..=9).
    Gzip {
        /// Compression level, 0 (store) through 9 (best).
        level: u32,
    },
    /// LZ4 block compression.
    Lz4,
    /// Byte-level run-length encoding.
    Rle,
    /// Transpose cell bytes so that equal-significance bytes are contiguous.
    /// Requires a fixed cell width.
    ByteShuffle,
    /// Truncate little-endian integer cells to the narrowest width that holds every
    /// value in the tile. Requires a fixed integer cell width.
    BitWidthReduce,
    /// Store the wrapping difference between consecutive integer cells.
    /// Requires a fixed integer cell width.
    Delta,
    /// Like [`FilterSpec::Delta`] but rejects tiles whose values ever decrease.
    PositiveDelta,
}

impl FilterSpec {
    /// Whether this filter kind only operates on fixed-width cells.
    pub fn requires_fixed_width(&self) -> bool {
        matches!(
            self,
            Self::ByteShuffle | Self::BitWidthReduce | Self::Delta | Self::PositiveDelta
        )
    }

    /// Validate the spec against an attribute's cell width and build the filter.
    ///
    /// `cell_width` is `None` for variable-sized attributes. Fails with
    /// `FilterConfig` when an option is out of range or the filter kind cannot be
    /// applied to cells of this shape.
    pub fn build(&self, cell_width: Option<usize>) -> StratumResult<Box<dyn Filter>> {
        if self.requires_fixed_width() && cell_width.is_none() {
            stratum_bail!(
                FilterConfig: "{:?} filter requires fixed-size cells",
                self
            );
        }
        Ok(match *self {
            Self::NoOp => Box::new(NoOp),
            Self::Gzip { level } => Box::new(Gzip::try_new(level)?),
            Self::Lz4 => Box::new(Lz4),
            Self::Rle => Box::new(Rle),
            Self::ByteShuffle => Box::new(ByteShuffle::new(fixed_width(self, cell_width)?)),
            Self::BitWidthReduce => {
                Box::new(BitWidthReduce::new(integer_width(self, cell_width)?))
            }
            Self::Delta => Box::new(Delta::new(integer_width(self, cell_width)?)),
            Self::PositiveDelta => {
                Box::new(PositiveDelta::new(integer_width(self, cell_width)?))
            }
        })
    }
}

fn fixed_width(spec: &FilterSpec, cell_width: Option<usize>) -> StratumResult<usize> {
    match cell_width {
        Some(w) if w > 0 => Ok(w),
        _ => Err(stratum_error::stratum_err!(
            FilterConfig: "{:?} filter requires a positive fixed cell width",
            spec
        )),
    }
}

fn integer_width(spec: &FilterSpec, cell_width: Option<usize>) -> StratumResult<usize> {
    let w = fixed_width(spec, cell_width)?;
    if !INTEGER_WIDTHS.contains(&w) {
        stratum_bail!(
            FilterConfig: "{:?} filter requires an integer cell width of 1, 2, 4 or 8, got {}",
            spec,
            w
        );
    }
    Ok(w)
}

#[cfg(test)]
mod tests {
    use stratum_error::ErrorCode;

    use super::*;

    #[test]
    fn gzip_level_out_of_range() {
        let err = FilterSpec::Gzip { level: 10 }.build(Some(4)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::FilterConfig);
    }

    #[test]
    fn shuffle_rejects_var_sized_cells() {
        let err = FilterSpec::ByteShuffle.build(None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::FilterConfig);
    }

    #[test]
    fn delta_rejects_odd_widths() {
        let err = FilterSpec::Delta.build(Some(3)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::FilterConfig);
        assert!(FilterSpec::Delta.build(Some(4)).is_ok());
    }
}
