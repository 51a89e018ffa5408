use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use stratum_error::{stratum_err, StratumError};

/// The primitive cell datatypes supported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Datatype {
    /// 8-bit signed integer.
    I8,
    /// 16-bit signed integer.
    I16,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 8-bit unsigned integer.
    U8,
    /// 16-bit unsigned integer.
    U16,
    /// 32-bit unsigned integer.
    U32,
    /// 64-bit unsigned integer.
    U64,
    /// 32-bit IEEE float.
    F32,
    /// 64-bit IEEE float.
    F64,
}

impl Datatype {
    /// The size of one value in bytes.
    pub const fn size(&self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    /// Whether this is a signed or unsigned integer type.
    pub const fn is_integer(&self) -> bool {
        !self.is_float()
    }

    /// Whether this is a signed integer type.
    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    /// Whether this is a floating-point type.
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

impl Display for Datatype {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Datatype {
    type Err = StratumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "i8" => Ok(Self::I8),
            "i16" => Ok(Self::I16),
            "i32" => Ok(Self::I32),
            "i64" => Ok(Self::I64),
            "u8" => Ok(Self::U8),
            "u16" => Ok(Self::U16),
            "u32" => Ok(Self::U32),
            "u64" => Ok(Self::U64),
            "f32" => Ok(Self::F32),
            "f64" => Ok(Self::F64),
            _ => Err(stratum_err!(Schema: "unknown datatype '{s}'")),
        }
    }
}

/// Dispatch over every [`Datatype`], binding the matching native Rust type.
///
/// ```
/// use stratum_schema::{match_each_datatype, Datatype};
///
/// let dt = Datatype::I32;
/// let size = match_each_datatype!(dt, |$T| std::mem::size_of::<$T>());
/// assert_eq!(size, 4);
/// ```
#[macro_export]
macro_rules! match_each_datatype {
    ($dt:expr, | $_:tt $T:ident | $($body:tt)*) => ({
        macro_rules! __with__ {( $_ $T:ident ) => ( $($body)* )}
        match $dt {
            $crate::Datatype::I8 => __with__! { i8 },
            $crate::Datatype::I16 => __with__! { i16 },
            $crate::Datatype::I32 => __with__! { i32 },
            $crate::Datatype::I64 => __with__! { i64 },
            $crate::Datatype::U8 => __with__! { u8 },
            $crate::Datatype::U16 => __with__! { u16 },
            $crate::Datatype::U32 => __with__! { u32 },
            $crate::Datatype::U64 => __with__! { u64 },
            $crate::Datatype::F32 => __with__! { f32 },
            $crate::Datatype::F64 => __with__! { f64 },
        }
    });
}
