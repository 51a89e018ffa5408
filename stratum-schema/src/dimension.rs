use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use stratum_error::{stratum_bail, StratumResult};

use crate::Datatype;

/// One bound of a dimension domain. Integer and float dimensions carry their bounds
/// in the matching representation so integer domains keep full 64-bit precision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CoordScalar {
    /// Bound of an integer dimension.
    Int(i64),
    /// Bound of a floating-point dimension.
    Float(f64),
}

impl CoordScalar {
    /// The integer value, if this is an integer bound.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(_) => None,
        }
    }

    /// The float value, if this is a float bound.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Int(_) => None,
            Self::Float(v) => Some(*v),
        }
    }
}

impl Display for CoordScalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// A named dimension with an inclusive, finite `(low, high)` domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    name: String,
    datatype: Datatype,
    domain: (CoordScalar, CoordScalar),
}

impl Dimension {
    /// Create an integer dimension.
    pub fn int(name: impl Into<String>, datatype: Datatype, low: i64, high: i64) -> Self {
        Self {
            name: name.into(),
            datatype,
            domain: (CoordScalar::Int(low), CoordScalar::Int(high)),
        }
    }

    /// Create a floating-point dimension.
    pub fn float(name: impl Into<String>, datatype: Datatype, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            datatype,
            domain: (CoordScalar::Float(low), CoordScalar::Float(high)),
        }
    }

    /// The dimension name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The coordinate datatype.
    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    /// The inclusive `(low, high)` domain bounds.
    pub fn domain(&self) -> (CoordScalar, CoordScalar) {
        self.domain
    }

    /// The integer domain bounds; only valid for integer dimensions.
    pub fn int_domain(&self) -> StratumResult<(i64, i64)> {
        match self.domain {
            (CoordScalar::Int(lo), CoordScalar::Int(hi)) => Ok((lo, hi)),
            _ => Err(stratum_error::stratum_err!(
                Schema: "dimension '{}' does not have an integer domain",
                self.name
            )),
        }
    }

    /// Number of distinct integer coordinates in the domain; only valid for integer
    /// dimensions.
    pub fn extent(&self) -> StratumResult<u64> {
        let (lo, hi) = self.int_domain()?;
        hi.abs_diff(lo).checked_add(1).ok_or_else(|| {
            stratum_error::stratum_err!(
                Schema: "dimension '{}' spans the entire i64 range",
                self.name
            )
        })
    }

    /// Validate the dimension invariants: finite bounds, `low <= high`, and bounds
    /// matching the datatype's class.
    pub fn validate(&self) -> StratumResult<()> {
        crate::validate_name("dimension", &self.name)?;
        match (self.datatype.is_float(), self.domain) {
            (false, (CoordScalar::Int(lo), CoordScalar::Int(hi))) => {
                if lo > hi {
                    stratum_bail!(
                        Schema: "dimension '{}' has inverted domain [{lo}, {hi}]",
                        self.name
                    );
                }
                let (min, max) = int_range(self.datatype);
                if lo < min || hi > max {
                    stratum_bail!(
                        Schema: "dimension '{}' domain [{lo}, {hi}] exceeds the range of {}",
                        self.name,
                        self.datatype
                    );
                }
            }
            (true, (CoordScalar::Float(lo), CoordScalar::Float(hi))) => {
                if !lo.is_finite() || !hi.is_finite() {
                    stratum_bail!(
                        Schema: "dimension '{}' has non-finite domain bounds",
                        self.name
                    );
                }
                if lo > hi {
                    stratum_bail!(
                        Schema: "dimension '{}' has inverted domain [{lo}, {hi}]",
                        self.name
                    );
                }
            }
            _ => stratum_bail!(
                Schema: "dimension '{}' has domain bounds of the wrong class for {}",
                self.name,
                self.datatype
            ),
        }
        Ok(())
    }
}

/// Representable domain bounds per integer datatype. u64 domains are capped at
/// `i64::MAX` so bounds always fit the engine's signed bound representation.
fn int_range(datatype: Datatype) -> (i64, i64) {
    match datatype {
        Datatype::I8 => (i64::from(i8::MIN), i64::from(i8::MAX)),
        Datatype::I16 => (i64::from(i16::MIN), i64::from(i16::MAX)),
        Datatype::I32 => (i64::from(i32::MIN), i64::from(i32::MAX)),
        Datatype::I64 => (i64::MIN, i64::MAX),
        Datatype::U8 => (0, i64::from(u8::MAX)),
        Datatype::U16 => (0, i64::from(u16::MAX)),
        Datatype::U32 => (0, i64::from(u32::MAX)),
        Datatype::U64 | Datatype::F32 | Datatype::F64 => (0, i64::MAX),
    }
}

impl Display for Dimension {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} [{}, {}]",
            self.name, self.datatype, self.domain.0, self.domain.1
        )
    }
}
