use stratum_error::{stratum_bail, StratumResult};

use crate::Filter;

/// Byte-level run-length encoding: the output is a sequence of `(run_length, value)`
/// pairs with runs capped at 255 bytes.
#[derive(Debug, Clone, Copy)]
pub struct Rle;

impl Filter for Rle {
    fn apply(&self, input: &[u8]) -> StratumResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut iter = input.iter().copied();
        let Some(mut current) = iter.next() else {
            return Ok(out);
        };
        let mut run = 1u16;
        for byte in iter {
            if byte == current && run < u16::from(u8::MAX) {
                run += 1;
            } else {
                out.push(run as u8);
                out.push(current);
                current = byte;
                run = 1;
            }
        }
        out.push(run as u8);
        out.push(current);
        Ok(out)
    }

    fn reverse(&self, input: &[u8]) -> StratumResult<Vec<u8>> {
        if input.len() % 2 != 0 {
            stratum_bail!(CorruptData: "rle payload has odd length {}", input.len());
        }
        let mut out = Vec::new();
        for pair in input.chunks_exact(2) {
            if pair[0] == 0 {
                stratum_bail!(CorruptData: "rle payload contains a zero-length run");
            }
            out.extend(std::iter::repeat_n(pair[1], pair[0] as usize));
        }
        Ok(out)
    }

    fn describe(&self) -> String {
        "rle".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_collapse() {
        let raw = [1, 1, 1, 2, 3, 3];
        let encoded = Rle.apply(&raw).unwrap();
        assert_eq!(encoded, vec![3, 1, 1, 2, 2, 3]);
        assert_eq!(Rle.reverse(&encoded).unwrap(), raw);
    }

    #[test]
    fn long_runs_split_at_255() {
        let raw = vec![7u8; 300];
        let encoded = Rle.apply(&raw).unwrap();
        assert_eq!(encoded, vec![255, 7, 45, 7]);
        assert_eq!(Rle.reverse(&encoded).unwrap(), raw);
    }

    #[test]
    fn odd_payload_is_corrupt() {
        let err = Rle.reverse(&[3, 1, 2]).unwrap_err();
        assert_eq!(err.code(), stratum_error::ErrorCode::CorruptData);
    }
}
