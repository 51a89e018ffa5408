use serde::{Deserialize, Serialize};
use stratum_error::StratumResult;
use stratum_schema::{ArraySchema, CoordScalar};
use stratum_storage::normalize_subarray;

/// An inclusive per-dimension slice of an array's domain, in domain units.
///
/// Validation happens against a schema when the subarray is normalized: a range
/// with low above high is an invalid argument, a range leaving the domain is out of
/// bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subarray {
    ranges: Vec<(CoordScalar, CoordScalar)>,
}

impl Subarray {
    /// A subarray from explicit per-dimension bounds.
    pub fn new(ranges: Vec<(CoordScalar, CoordScalar)>) -> Self {
        Self { ranges }
    }

    /// Integer bounds shorthand.
    pub fn from_ints(ranges: &[(i64, i64)]) -> Self {
        Self {
            ranges: ranges
                .iter()
                .map(|(lo, hi)| (CoordScalar::Int(*lo), CoordScalar::Int(*hi)))
                .collect(),
        }
    }

    /// The whole domain of a schema.
    pub fn full(schema: &ArraySchema) -> Self {
        Self {
            ranges: schema.dimensions().iter().map(|d| d.domain()).collect(),
        }
    }

    /// The raw per-dimension bounds.
    pub fn ranges(&self) -> &[(CoordScalar, CoordScalar)] {
        &self.ranges
    }

    /// Validate against a schema and map to normalized key ranges.
    pub fn keys(&self, schema: &ArraySchema) -> StratumResult<Vec<(u64, u64)>> {
        normalize_subarray(schema, &self.ranges)
    }
}

#[cfg(test)]
mod tests {
    use stratum_error::ErrorCode;
    use stratum_schema::{Attribute, Datatype, Dimension};

    use super::*;

    fn schema() -> ArraySchema {
        ArraySchema::builder("grid")
            .dimension(Dimension::int("x", Datatype::I64, 1, 8))
            .attribute(Attribute::new("v", Datatype::I32))
            .dense(vec![4])
            .build()
            .unwrap()
    }

    #[test]
    fn keys_are_domain_relative() {
        let keys = Subarray::from_ints(&[(3, 6)]).keys(&schema()).unwrap();
        assert_eq!(keys, vec![(2, 5)]);
    }

    #[test]
    fn inverted_range_rejected() {
        let err = Subarray::from_ints(&[(6, 3)]).keys(&schema()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn out_of_domain_range_rejected() {
        let err = Subarray::from_ints(&[(0, 4)]).keys(&schema()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::OutOfBounds);
    }

    #[test]
    fn full_covers_the_domain() {
        let keys = Subarray::full(&schema()).keys(&schema()).unwrap();
        assert_eq!(keys, vec![(0, 7)]);
    }
}
