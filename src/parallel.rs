//! In-process rank groups on a dedicated Rayon thread pool
//!
//! Each rank runs on its own pool thread with its own [`ThreadComm`]; since
//! collectives block until every rank arrives, the pool must have exactly one
//! thread per rank.

use crate::comm::ThreadComm;
use crate::errors::{Result, StatsError};
use rayon::ThreadPoolBuilder;
use tracing::debug;

/// Run `f` once per rank of an `nranks` group and collect the results in rank order
///
/// # Errors
///
/// Returns an error if the thread pool cannot be built, or the first error
/// returned by any rank.
pub fn run_ranks<F, R>(nranks: usize, f: F) -> Result<Vec<R>>
where
    F: Fn(&ThreadComm) -> Result<R> + Sync,
    R: Send,
{
    let comms = ThreadComm::group(nranks)?;
    let pool = ThreadPoolBuilder::new()
        .num_threads(nranks)
        .thread_name(|i| format!("rank-{i}"))
        .build()
        .map_err(|e| {
            StatsError::ThreadPool(format!(
                "Failed to initialize thread pool with {nranks} threads: {e}"
            ))
        })?;
    debug!(nranks, "running rank group");

    pool.broadcast(|ctx| f(&comms[ctx.index()]))
        .into_iter()
        .collect()
}

/// Information about the parallel processing environment
#[derive(Debug, Clone)]
pub struct ParallelInfo {
    pub current_threads: usize,
    pub available_parallelism: usize,
}

/// Get information about the current parallel configuration
#[must_use]
pub fn get_parallel_info() -> ParallelInfo {
    ParallelInfo {
        current_threads: rayon::current_num_threads(),
        available_parallelism: std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1),
    }
}
