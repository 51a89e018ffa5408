use std::fmt::{Debug, Formatter};

use stratum_error::{stratum_bail, StratumResult};

use crate::{Filter, FilterSpec};

/// Framing prepended by [`FilterPipeline::apply`]: the raw input length as u64 LE.
const LEN_HEADER: usize = size_of::<u64>();

/// An ordered, validated sequence of [`Filter`] stages for one attribute.
///
/// `apply` runs stages in declared order and prepends the raw input length;
/// `reverse` strips the length header, runs stages in exact reverse order, and fails
/// with `CorruptData` if the decoded length does not match the declared one.
pub struct FilterPipeline {
    specs: Vec<FilterSpec>,
    filters: Vec<Box<dyn Filter>>,
}

impl FilterPipeline {
    /// Build a pipeline from specs, validating each against the attribute's cell
    /// width. `cell_width` is `None` for variable-sized attributes.
    pub fn try_new(specs: &[FilterSpec], cell_width: Option<usize>) -> StratumResult<Self> {
        let filters = specs
            .iter()
            .map(|spec| spec.build(cell_width))
            .collect::<StratumResult<Vec<_>>>()?;
        for filter in &filters {
            if !filter.is_lossless() {
                stratum_bail!(FilterConfig: "lossy filter {} is not supported", filter.describe());
            }
        }
        Ok(Self {
            specs: specs.to_vec(),
            filters,
        })
    }

    /// An empty pipeline that only adds the length framing.
    pub fn empty() -> Self {
        Self {
            specs: Vec::new(),
            filters: Vec::new(),
        }
    }

    /// The specs this pipeline was built from.
    pub fn specs(&self) -> &[FilterSpec] {
        &self.specs
    }

    /// Run every stage in declared order over `raw`.
    pub fn apply(&self, raw: &[u8]) -> StratumResult<Vec<u8>> {
        let mut buf = raw.to_vec();
        for filter in &self.filters {
            buf = filter.apply(&buf)?;
        }
        let mut framed = Vec::with_capacity(LEN_HEADER + buf.len());
        framed.extend_from_slice(&(raw.len() as u64).to_le_bytes());
        framed.extend_from_slice(&buf);
        Ok(framed)
    }

    /// Run every stage in reverse order over `filtered`, recovering the raw bytes.
    pub fn reverse(&self, filtered: &[u8]) -> StratumResult<Vec<u8>> {
        if filtered.len() < LEN_HEADER {
            stratum_bail!(
                CorruptData: "filtered payload of {} bytes is shorter than its length header",
                filtered.len()
            );
        }
        let (header, body) = filtered.split_at(LEN_HEADER);
        let mut declared = [0u8; LEN_HEADER];
        declared.copy_from_slice(header);
        let declared = u64::from_le_bytes(declared);

        let mut buf = body.to_vec();
        for filter in self.filters.iter().rev() {
            buf = filter.reverse(&buf)?;
        }
        if buf.len() as u64 != declared {
            stratum_bail!(
                CorruptData: "declared raw size {} does not match decoded size {}",
                declared,
                buf.len()
            );
        }
        Ok(buf)
    }
}

impl Debug for FilterPipeline {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.filters.iter().map(|x| x.describe()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rstest::rstest;

    use super::*;

    fn random_cells(count: usize, width: usize) -> Vec<u8> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(17);
        // Low-cardinality values so compression stages have something to chew on.
        (0..count * width)
            .map(|_| rng.random_range(0u8..16))
            .collect()
    }

    #[rstest]
    #[case::empty(&[])]
    #[case::noop(&[FilterSpec::NoOp])]
    #[case::gzip(&[FilterSpec::Gzip { level: 6 }])]
    #[case::lz4(&[FilterSpec::Lz4])]
    #[case::rle(&[FilterSpec::Rle])]
    #[case::shuffle(&[FilterSpec::ByteShuffle])]
    #[case::bitwidth(&[FilterSpec::BitWidthReduce])]
    #[case::delta(&[FilterSpec::Delta])]
    #[case::shuffle_then_gzip(&[FilterSpec::ByteShuffle, FilterSpec::Gzip { level: 1 }])]
    #[case::delta_shuffle_lz4(&[FilterSpec::Delta, FilterSpec::ByteShuffle, FilterSpec::Lz4])]
    #[case::gzip_then_shuffle(&[FilterSpec::Gzip { level: 6 }, FilterSpec::ByteShuffle])]
    #[case::lz4_then_delta(&[FilterSpec::Lz4, FilterSpec::Delta])]
    #[case::rle_then_bitwidth(&[FilterSpec::Rle, FilterSpec::BitWidthReduce])]
    fn round_trip(#[case] specs: &[FilterSpec]) {
        let pipeline = FilterPipeline::try_new(specs, Some(4)).unwrap();
        for count in [0usize, 1, 7, 1000] {
            let raw = random_cells(count, 4);
            let filtered = pipeline.apply(&raw).unwrap();
            assert_eq!(pipeline.reverse(&filtered).unwrap(), raw);
        }
    }

    #[test]
    fn gzip_then_shuffle_reverses_in_shuffle_then_decompress_order() {
        // 1000 fixed-width cells through compress-then-shuffle, as declared.
        let pipeline =
            FilterPipeline::try_new(&[FilterSpec::Gzip { level: 6 }, FilterSpec::ByteShuffle], Some(4))
                .unwrap();
        let raw: Vec<u8> = (0..1000u32).flat_map(|i| (i % 97).to_le_bytes()).collect();
        let filtered = pipeline.apply(&raw).unwrap();
        assert_eq!(pipeline.reverse(&filtered).unwrap(), raw);
    }

    #[test]
    fn truncated_payload_is_corrupt() {
        let pipeline = FilterPipeline::try_new(&[FilterSpec::Lz4], Some(4)).unwrap();
        let filtered = pipeline.apply(&random_cells(100, 4)).unwrap();
        let err = pipeline.reverse(&filtered[..4]).unwrap_err();
        assert_eq!(err.code(), stratum_error::ErrorCode::CorruptData);
    }

    #[test]
    fn mismatched_declared_size_is_corrupt() {
        let pipeline = FilterPipeline::empty();
        let mut filtered = pipeline.apply(&[1, 2, 3, 4]).unwrap();
        filtered[0] = 9; // declared length no longer matches
        let err = pipeline.reverse(&filtered).unwrap_err();
        assert_eq!(err.code(), stratum_error::ErrorCode::CorruptData);
    }
}
