//! Data type tags and the numeric element trait shared by every kernel

use crate::comm::{Comm, ReduceOp};
use crate::errors::{Result, StatsError};
use crate::field::{FieldData, SharedBuffer};
use crate::statistics::utils::kahan_update;
use num_traits::{Bounded, Num, NumCast};
use std::fmt;
use std::str::FromStr;

/// Floating point element type
pub type Real = f64;

/// Integer element type
pub type Int = i32;

/// Closed set of element types a field can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataType {
    #[default]
    Invalid,
    Real,
    Int,
}

impl DataType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Real => "real",
            Self::Int => "int",
        }
    }

    /// Size in bytes of one element
    #[must_use]
    pub const fn size_of(self) -> usize {
        match self {
            Self::Invalid => 0,
            Self::Real => std::mem::size_of::<Real>(),
            Self::Int => std::mem::size_of::<Int>(),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "real" | "double" | "float" => Ok(Self::Real),
            "int" | "integer" => Ok(Self::Int),
            other => Err(StatsError::InvalidParameter {
                list: "data_type".to_string(),
                param: other.to_string(),
                message: "expected 'real' or 'int'".to_string(),
            }),
        }
    }
}

/// Element types that can be stored in a [`crate::Field`]
///
/// Ties a Rust type to its [`DataType`] tag, to the matching storage variant
/// and to the matching collective.
pub trait FieldValue:
    Num + NumCast + Bounded + Copy + PartialOrd + Default + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    const DATA_TYPE: DataType;

    /// Borrow the shared buffer if `data` holds this type
    fn buffer(data: &FieldData) -> Option<&SharedBuffer<Self>>;

    /// Wrap a shared buffer of this type
    fn into_data(buffer: SharedBuffer<Self>) -> FieldData;

    /// In-place all-reduce across every rank of `comm`
    fn all_reduce(comm: &dyn Comm, data: &mut [Self], op: ReduceOp) -> Result<()>;

    fn to_real(self) -> Real;

    /// Add `value` into a running sum and its compensation term
    ///
    /// Returns `None` when the sum no longer fits the element type.
    fn accumulate(value: Self, sum: &mut Self, compensation: &mut Self) -> Option<()>;

    /// Addition that reports overflow instead of wrapping
    fn checked_sum(self, other: Self) -> Option<Self>;

    /// Saturating conversion from a real value
    fn from_real(value: Real) -> Self;
}

impl FieldValue for Real {
    const DATA_TYPE: DataType = DataType::Real;

    fn buffer(data: &FieldData) -> Option<&SharedBuffer<Self>> {
        match data {
            FieldData::Real(buffer) => Some(buffer),
            FieldData::Int(_) => None,
        }
    }

    fn into_data(buffer: SharedBuffer<Self>) -> FieldData {
        FieldData::Real(buffer)
    }

    fn all_reduce(comm: &dyn Comm, data: &mut [Self], op: ReduceOp) -> Result<()> {
        comm.all_reduce_real(data, op)
    }

    fn to_real(self) -> Real {
        self
    }

    fn accumulate(value: Self, sum: &mut Self, compensation: &mut Self) -> Option<()> {
        kahan_update(value, sum, compensation);
        Some(())
    }

    fn checked_sum(self, other: Self) -> Option<Self> {
        Some(self + other)
    }

    fn from_real(value: Real) -> Self {
        value
    }
}

impl FieldValue for Int {
    const DATA_TYPE: DataType = DataType::Int;

    fn buffer(data: &FieldData) -> Option<&SharedBuffer<Self>> {
        match data {
            FieldData::Int(buffer) => Some(buffer),
            FieldData::Real(_) => None,
        }
    }

    fn into_data(buffer: SharedBuffer<Self>) -> FieldData {
        FieldData::Int(buffer)
    }

    fn all_reduce(comm: &dyn Comm, data: &mut [Self], op: ReduceOp) -> Result<()> {
        comm.all_reduce_int(data, op)
    }

    fn to_real(self) -> Real {
        <Real as From<Int>>::from(self)
    }

    fn accumulate(value: Self, sum: &mut Self, _compensation: &mut Self) -> Option<()> {
        *sum = sum.checked_add(value)?;
        Some(())
    }

    fn checked_sum(self, other: Self) -> Option<Self> {
        self.checked_add(other)
    }

    fn from_real(value: Real) -> Self {
        <Int as NumCast>::from(value).unwrap_or(if value > 0.0 { Int::MAX } else { Int::MIN })
    }
}
