//! Field statistics computed in place over partitioned fields
//!
//! # Organization
//!
//! - [`stat`]: the [`FieldStat`] contract, [`StatBase`] and [`StatContext`]
//! - [`factory`]: the name-keyed [`StatFactory`]
//! - [`utils`]: index mapping across partitions and compensated summation
//! - [`operations`]: reduction operators
//! - [`global`], [`along_axis`]: scalar and column reducers
//! - [`identity`], [`bounded`], [`zonal_mean`], [`masked_integral`]: selection
//!   and masking stats
//! - [`vertical_contraction`], [`pipe`]: level reduction and stat composition

pub mod along_axis;
pub mod bounded;
pub mod factory;
pub mod global;
pub mod identity;
pub mod masked_integral;
pub mod operations;
pub mod pipe;
pub mod stat;
pub mod utils;
pub mod vertical_contraction;
pub mod zonal_mean;

pub use along_axis::FieldStatAlongAxis;
pub use bounded::{FieldBounded, FieldBoundingBox};
pub use factory::{create_stat, BuildStat, StatCreator, StatFactory};
pub use global::FieldGlobalStat;
pub use identity::FieldIdentity;
pub use masked_integral::{FieldMaskedIntegral, MaskReader};
pub use operations::StatOperation;
pub use pipe::FieldStatPipe;
pub use stat::{FieldStat, StatBase, StatContext};
pub use utils::{KahanSum, PartitionIndexMap};
pub use vertical_contraction::FieldVerticalContraction;
pub use zonal_mean::FieldZonalMean;
