use std::io::Write;

use flate2::write::{GzDecoder, GzEncoder};
use flate2::Compression;
use stratum_error::{stratum_bail, stratum_err, StratumResult};

use crate::Filter;

/// Gzip compression with a configurable level.
#[derive(Debug, Clone, Copy)]
pub struct Gzip {
    level: u32,
}

impl Gzip {
    /// Maximum gzip compression level.
    pub const MAX_LEVEL: u32 = 9;
    /// Default gzip compression level.
    pub const DEFAULT_LEVEL: u32 = 6;

    /// Create a gzip filter, rejecting levels above [`Gzip::MAX_LEVEL`].
    pub fn try_new(level: u32) -> StratumResult<Self> {
        if level > Self::MAX_LEVEL {
            stratum_bail!(
                FilterConfig: "gzip level must be in 0..={}, got {}",
                Self::MAX_LEVEL,
                level
            );
        }
        Ok(Self { level })
    }
}

impl Filter for Gzip {
    fn apply(&self, input: &[u8]) -> StratumResult<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level));
        encoder.write_all(input)?;
        Ok(encoder.finish()?)
    }

    fn reverse(&self, input: &[u8]) -> StratumResult<Vec<u8>> {
        let mut decoder = GzDecoder::new(Vec::new());
        decoder
            .write_all(input)
            .and_then(|()| decoder.finish())
            .map_err(|e| stratum_err!(CorruptData: "gzip stream failed to decode: {e}"))
    }

    fn describe(&self) -> String {
        format!("gzip(level={})", self.level)
    }
}

/// LZ4 block compression.
#[derive(Debug, Clone, Copy)]
pub struct Lz4;

impl Filter for Lz4 {
    fn apply(&self, input: &[u8]) -> StratumResult<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(input))
    }

    fn reverse(&self, input: &[u8]) -> StratumResult<Vec<u8>> {
        lz4_flex::decompress_size_prepended(input)
            .map_err(|e| stratum_err!(CorruptData: "lz4 block failed to decode: {e}"))
    }

    fn describe(&self) -> String {
        "lz4".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_compresses_repetitive_input() {
        let gzip = Gzip::try_new(Gzip::DEFAULT_LEVEL).unwrap();
        let raw = vec![42u8; 4096];
        let compressed = gzip.apply(&raw).unwrap();
        assert!(compressed.len() < raw.len());
        assert_eq!(gzip.reverse(&compressed).unwrap(), raw);
    }

    #[test]
    fn gzip_garbage_is_corrupt() {
        let gzip = Gzip::try_new(1).unwrap();
        let err = gzip.reverse(&[0xde, 0xad, 0xbe, 0xef]).unwrap_err();
        assert_eq!(err.code(), stratum_error::ErrorCode::CorruptData);
    }

    #[test]
    fn lz4_round_trips_empty_input() {
        let filtered = Lz4.apply(&[]).unwrap();
        assert!(Lz4.reverse(&filtered).unwrap().is_empty());
    }
}
