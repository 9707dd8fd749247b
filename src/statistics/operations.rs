//! Reduction operators shared by the global and along-axis stats

use crate::comm::ReduceOp;
use crate::data_type::FieldValue;

/// Supported reduction operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatOperation {
    /// Arithmetic mean
    Mean,
    /// Sum of values
    Sum,
    /// Minimum value
    Min,
    /// Maximum value
    Max,
}

impl StatOperation {
    /// Get the string representation of the operation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mean => "avg",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
        }
    }

    /// Collective combining per-rank partial results
    #[must_use]
    pub const fn reduce_op(self) -> ReduceOp {
        match self {
            Self::Mean | Self::Sum => ReduceOp::Sum,
            Self::Min => ReduceOp::Min,
            Self::Max => ReduceOp::Max,
        }
    }

    /// Starting value of a min/max accumulation
    #[must_use]
    pub fn identity<T: FieldValue>(self) -> T {
        match self {
            Self::Max => T::min_value(),
            Self::Min => T::max_value(),
            Self::Mean | Self::Sum => T::zero(),
        }
    }

    /// Registry key of the scalar reducer
    #[must_use]
    pub const fn global_stat_name(self) -> &'static str {
        match self {
            Self::Mean => "global_avg",
            Self::Sum => "global_sum",
            Self::Min => "global_min",
            Self::Max => "global_max",
        }
    }

    /// Registry key of the column reducer
    #[must_use]
    pub const fn along_columns_stat_name(self) -> &'static str {
        match self {
            Self::Mean => "avg_along_columns",
            Self::Sum => "sum_along_columns",
            Self::Min => "min_along_columns",
            Self::Max => "max_along_columns",
        }
    }
}
