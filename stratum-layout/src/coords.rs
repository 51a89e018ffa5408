use stratum_error::{stratum_bail, StratumResult};
use stratum_schema::{match_each_datatype, ArraySchema, CoordScalar, Datatype};

use crate::CoordKeys;

/// A native Rust coordinate type, convertible to and from [`CoordScalar`] and its
/// little-endian byte encoding.
pub trait NativeCoord: Copy {
    /// Encoded size in bytes.
    const SIZE: usize;
    /// Decode from little-endian bytes.
    fn from_le(bytes: &[u8]) -> Self;
    /// Append the little-endian encoding to `out`.
    fn write_le(self, out: &mut Vec<u8>);
    /// Widen to a [`CoordScalar`].
    fn to_scalar(self) -> CoordScalar;
    /// Narrow from a [`CoordScalar`] of the matching class.
    fn from_scalar(scalar: CoordScalar) -> Self;
}

macro_rules! int_native_coord {
    ($($t:ty),*) => {$(
        impl NativeCoord for $t {
            const SIZE: usize = size_of::<$t>();

            fn from_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; size_of::<$t>()];
                buf.copy_from_slice(bytes);
                <$t>::from_le_bytes(buf)
            }

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn to_scalar(self) -> CoordScalar {
                CoordScalar::Int(self as i64)
            }

            fn from_scalar(scalar: CoordScalar) -> Self {
                match scalar {
                    CoordScalar::Int(v) => v as $t,
                    CoordScalar::Float(v) => v as $t,
                }
            }
        }
    )*};
}

macro_rules! float_native_coord {
    ($($t:ty),*) => {$(
        impl NativeCoord for $t {
            const SIZE: usize = size_of::<$t>();

            fn from_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; size_of::<$t>()];
                buf.copy_from_slice(bytes);
                <$t>::from_le_bytes(buf)
            }

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn to_scalar(self) -> CoordScalar {
                CoordScalar::Float(self as f64)
            }

            fn from_scalar(scalar: CoordScalar) -> Self {
                match scalar {
                    CoordScalar::Int(v) => v as $t,
                    CoordScalar::Float(v) => v as $t,
                }
            }
        }
    )*};
}

int_native_coord!(i8, i16, i32, i64, u8, u16, u32, u64);
float_native_coord!(f32, f64);

#[derive(Debug, Clone, Copy)]
enum DimNorm {
    Int { lo: i64, hi: i64 },
    Float { lo: f64, hi: f64 },
}

/// Per-dimension, order-preserving bijection between declared-datatype coordinates
/// and `u64` keys. Integer dimensions map the domain low to key 0; float dimensions
/// use the monotone IEEE total-order mapping. `normalize` and `denormalize` are exact
/// inverses; out-of-domain values fail with `OutOfBounds`.
#[derive(Debug, Clone)]
pub struct CoordMapper {
    datatype: Datatype,
    dims: Vec<DimNorm>,
}

impl CoordMapper {
    /// Build the mapper for a schema's dimensions.
    pub fn new(schema: &ArraySchema) -> StratumResult<Self> {
        let dims = schema
            .dimensions()
            .iter()
            .map(|dim| match dim.domain() {
                (CoordScalar::Int(lo), CoordScalar::Int(hi)) => Ok(DimNorm::Int { lo, hi }),
                (CoordScalar::Float(lo), CoordScalar::Float(hi)) => {
                    Ok(DimNorm::Float { lo, hi })
                }
                _ => Err(stratum_error::stratum_err!(
                    Schema: "dimension '{}' mixes bound classes",
                    dim.name()
                )),
            })
            .collect::<StratumResult<Vec<_>>>()?;
        Ok(Self {
            datatype: schema.coords_datatype(),
            dims,
        })
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// The shared coordinate datatype.
    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    /// Bytes per full coordinate tuple.
    pub fn coords_size(&self) -> usize {
        self.datatype.size() * self.ndim()
    }

    /// Map one coordinate value on dimension `dim` to its key.
    pub fn normalize(&self, dim: usize, value: CoordScalar) -> StratumResult<u64> {
        match (self.dims[dim], value) {
            (DimNorm::Int { lo, hi }, CoordScalar::Int(v)) => {
                if v < lo || v > hi {
                    stratum_bail!(
                        OutOfBounds: "coordinate {v} outside domain [{lo}, {hi}] on dimension {dim}"
                    );
                }
                Ok(v.wrapping_sub(lo) as u64)
            }
            (DimNorm::Float { lo, hi }, CoordScalar::Float(v)) => {
                if !v.is_finite() || v < lo || v > hi {
                    stratum_bail!(
                        OutOfBounds: "coordinate {v} outside domain [{lo}, {hi}] on dimension {dim}"
                    );
                }
                Ok(f64_key(v))
            }
            _ => Err(stratum_error::stratum_err!(
                OutOfBounds: "coordinate class does not match dimension {dim}"
            )),
        }
    }

    /// Invert [`CoordMapper::normalize`].
    pub fn denormalize(&self, dim: usize, key: u64) -> CoordScalar {
        match self.dims[dim] {
            DimNorm::Int { lo, .. } => CoordScalar::Int(lo.wrapping_add(key as i64)),
            DimNorm::Float { .. } => CoordScalar::Float(key_f64(key)),
        }
    }

    /// Normalize a full coordinate tuple.
    pub fn normalize_tuple(&self, values: &[CoordScalar]) -> StratumResult<CoordKeys> {
        if values.len() != self.ndim() {
            stratum_bail!(
                "coordinate tuple has {} values for {} dimensions",
                values.len(),
                self.ndim()
            );
        }
        values
            .iter()
            .enumerate()
            .map(|(dim, v)| self.normalize(dim, *v))
            .collect()
    }

    /// Decode a packed buffer of native coordinates (dimension-interleaved, one tuple
    /// per cell) into normalized key tuples.
    pub fn keys_from_bytes(&self, bytes: &[u8]) -> StratumResult<Vec<CoordKeys>> {
        let stride = self.coords_size();
        if stride == 0 || bytes.len() % stride != 0 {
            stratum_bail!(
                "coordinate buffer of {} bytes is not a whole number of {}-byte tuples",
                bytes.len(),
                stride
            );
        }
        match_each_datatype!(self.datatype, |$T| self.keys_from_native::<$T>(bytes))
    }

    fn keys_from_native<T: NativeCoord>(&self, bytes: &[u8]) -> StratumResult<Vec<CoordKeys>> {
        let mut out = Vec::with_capacity(bytes.len() / self.coords_size());
        for tuple in bytes.chunks_exact(self.coords_size()) {
            let keys = tuple
                .chunks_exact(T::SIZE)
                .enumerate()
                .map(|(dim, raw)| self.normalize(dim, T::from_le(raw).to_scalar()))
                .collect::<StratumResult<CoordKeys>>()?;
            out.push(keys);
        }
        Ok(out)
    }

    /// Encode normalized key tuples back into the packed native representation.
    pub fn keys_to_bytes(&self, tuples: &[CoordKeys]) -> Vec<u8> {
        match_each_datatype!(self.datatype, |$T| self.keys_to_native::<$T>(tuples))
    }

    fn keys_to_native<T: NativeCoord>(&self, tuples: &[CoordKeys]) -> Vec<u8> {
        let mut out = Vec::with_capacity(tuples.len() * self.coords_size());
        for keys in tuples {
            for (dim, key) in keys.iter().enumerate() {
                T::from_scalar(self.denormalize(dim, *key)).write_le(&mut out);
            }
        }
        out
    }
}

/// Monotone bijection from f64 to u64: preserves `<` and is exactly invertible.
fn f64_key(v: f64) -> u64 {
    let bits = v.to_bits() as i64;
    if bits < 0 {
        !(bits as u64)
    } else {
        (bits as u64) | (1 << 63)
    }
}

fn key_f64(key: u64) -> f64 {
    if key & (1 << 63) != 0 {
        f64::from_bits(key & !(1 << 63))
    } else {
        f64::from_bits(!key)
    }
}

#[cfg(test)]
mod tests {
    use stratum_error::ErrorCode;
    use stratum_schema::{ArraySchema, Attribute, Datatype, Dimension};

    use super::*;

    fn int_schema() -> ArraySchema {
        ArraySchema::builder("grid")
            .dimension(Dimension::int("x", Datatype::I32, -4, 3))
            .dimension(Dimension::int("y", Datatype::I32, 1, 8))
            .attribute(Attribute::new("v", Datatype::I32))
            .dense(vec![4, 4])
            .build()
            .unwrap()
    }

    #[test]
    fn int_normalization_rebases_to_zero() {
        let mapper = CoordMapper::new(&int_schema()).unwrap();
        assert_eq!(mapper.normalize(0, CoordScalar::Int(-4)).unwrap(), 0);
        assert_eq!(mapper.normalize(0, CoordScalar::Int(3)).unwrap(), 7);
        assert_eq!(mapper.denormalize(0, 7), CoordScalar::Int(3));
    }

    #[test]
    fn out_of_domain_coordinate_fails() {
        let mapper = CoordMapper::new(&int_schema()).unwrap();
        let err = mapper.normalize(1, CoordScalar::Int(0)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::OutOfBounds);
    }

    #[test]
    fn bytes_round_trip() {
        let mapper = CoordMapper::new(&int_schema()).unwrap();
        let raw: Vec<u8> = [(-4i32, 1i32), (3, 8), (0, 4)]
            .iter()
            .flat_map(|(x, y)| [x.to_le_bytes(), y.to_le_bytes()].concat())
            .collect();
        let keys = mapper.keys_from_bytes(&raw).unwrap();
        assert_eq!(keys, vec![vec![0, 0], vec![7, 7], vec![4, 3]]);
        assert_eq!(mapper.keys_to_bytes(&keys), raw);
    }

    #[test]
    fn float_keys_preserve_order_and_value() {
        let schema = ArraySchema::builder("pts")
            .dimension(Dimension::float("x", Datatype::F64, -10.0, 10.0))
            .attribute(Attribute::new("v", Datatype::F32))
            .sparse(16)
            .build()
            .unwrap();
        let mapper = CoordMapper::new(&schema).unwrap();
        let values = [-10.0, -1.5, -0.0, 0.0, 2.25, 10.0];
        let keys: Vec<u64> = values
            .iter()
            .map(|v| mapper.normalize(0, CoordScalar::Float(*v)).unwrap())
            .collect();
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        for (v, k) in values.iter().zip(&keys) {
            assert_eq!(mapper.denormalize(0, *k), CoordScalar::Float(*v));
        }
    }
}
