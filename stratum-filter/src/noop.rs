use stratum_error::StratumResult;

use crate::Filter;

/// The identity filter.
#[derive(Debug, Clone, Copy)]
pub struct NoOp;

impl Filter for NoOp {
    fn apply(&self, input: &[u8]) -> StratumResult<Vec<u8>> {
        Ok(input.to_vec())
    }

    fn reverse(&self, input: &[u8]) -> StratumResult<Vec<u8>> {
        Ok(input.to_vec())
    }

    fn describe(&self) -> String {
        "noop".to_string()
    }
}
