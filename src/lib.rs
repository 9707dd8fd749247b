//! insitu_stats: in-situ statistics over partitioned simulation fields
//!
//! A Rust library for computing diagnostics while a simulation runs. Fields are
//! registered with their layout and split into partitions along one dimension;
//! configured stats reduce, select or mask them on every step and the results
//! are archived per time stamp.
//!
//! ## Key Features
//!
//! - **Partitioned Fields**: View or Copy storage, validated at commit
//! - **Reductions**: Global and along-column sum, max, min and mean with
//!   compensated summation
//! - **Selection and Masking**: Bounded windows, lat/lon boxes, zonal means and
//!   integrals grouped by mask value
//! - **Composition**: Vertical contraction and stat pipes built through a
//!   name-keyed factory
//! - **Ranks**: Collectives over a `Comm` trait, with in-process ranks on Rayon
//!
//! ## Module Organization
//!
//! - [`field`], [`layout`], [`data_type`]: partitioned storage
//! - [`statistics`]: the stat contract, every stat and the factory
//! - [`comm`], [`parallel`]: collectives and in-process rank groups
//! - [`params`], [`bounds`], [`time_stamp`]: configuration and value types
//! - [`archive`], [`session`]: host-facing driver and result history
//! - [`netcdf_io`]: NetCDF field loading, mask reading and result writing
//! - [`errors`]: Centralized error handling
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use insitu_stats::prelude::*;
//! use insitu_stats::ParameterList;
//!
//! let layout = FieldLayout::new(&[4, 3], &["ncol", "lev"]).unwrap();
//! let field = Field::from_parts(
//!     "T",
//!     layout,
//!     0,
//!     vec![vec![1.0; 6], vec![2.0; 6]],
//! )
//! .unwrap();
//!
//! let ctx = StatContext::serial();
//! let mut stat = ctx.create_stat("global_sum", &ParameterList::new("T_sum")).unwrap();
//! stat.set_field(&field).unwrap();
//! stat.create_stat_field().unwrap();
//! let sum = stat.compute(&TimeStamp::new(20000101, 0).unwrap()).unwrap();
//! println!("{:?}", sum.to_vec::<f64>().unwrap());
//! ```

pub mod archive;
pub mod bounds;
pub mod comm;
pub mod data_type;
pub mod errors;
pub mod field;
pub mod layout;
pub mod netcdf_io;
pub mod parallel;
pub mod params;
pub mod session;
pub mod statistics;
pub mod time_stamp;

pub use archive::{ProfilingArchive, StatHistory};
pub use bounds::Bounds;
pub use comm::{Comm, ReduceOp, SerialComm, ThreadComm};
pub use data_type::{DataType, FieldValue, Int, Real};
pub use errors::{Result, StatsError};
pub use field::{shared_buffer, DataAccess, Field, SharedBuffer};
pub use layout::{FieldLayout, MAX_RANK};
pub use netcdf_io::{read_field, read_int_field, read_real_field, NetCDFWriter, NetcdfMaskReader};
pub use parallel::{get_parallel_info, run_ranks, ParallelInfo};
pub use params::ParameterList;
pub use session::{tracked_fields, ProfilingSession};
pub use statistics::*;
pub use time_stamp::TimeStamp;

pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::data_type::{DataType, FieldValue, Int, Real};
    pub use crate::errors::{Result, StatsError};
    pub use crate::field::{shared_buffer, DataAccess, Field};
    pub use crate::layout::FieldLayout;
    pub use crate::netcdf_io::{read_int_field, read_real_field, NetCDFWriter, NetcdfMaskReader};
    pub use crate::parallel::run_ranks;
    pub use crate::session::ProfilingSession;
    pub use crate::statistics::{FieldStat, StatContext};
    pub use crate::time_stamp::TimeStamp;
}
