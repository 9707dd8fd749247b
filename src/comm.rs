//! Collective communication between ranks
//!
//! Stats only talk to other ranks through the [`Comm`] trait. Every collective
//! is blocking: all ranks of a group must enter the same call or the group
//! hangs. [`SerialComm`] is the trivial single-rank group; [`ThreadComm`]
//! connects N in-process ranks (see [`crate::parallel::run_ranks`]).

use crate::data_type::{Int, Real};
use crate::errors::{Result, StatsError};
use std::fmt;
use std::ops::Add;
use std::sync::{Arc, Barrier, Mutex};

/// Associative operator of an all-reduce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Max,
    Min,
}

impl ReduceOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Max => "max",
            Self::Min => "min",
        }
    }

    /// Combine two partial results
    #[must_use]
    pub fn apply<T: Add<Output = T> + PartialOrd + Copy>(self, a: T, b: T) -> T {
        match self {
            Self::Sum => a + b,
            Self::Max => {
                if b > a {
                    b
                } else {
                    a
                }
            }
            Self::Min => {
                if b < a {
                    b
                } else {
                    a
                }
            }
        }
    }
}

/// A group of ranks taking part in collectives
pub trait Comm: Send + Sync + fmt::Debug {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn am_i_root(&self) -> bool {
        self.rank() == 0
    }

    fn barrier(&self) -> Result<()>;

    fn all_reduce_real(&self, data: &mut [Real], op: ReduceOp) -> Result<()>;

    fn all_reduce_int(&self, data: &mut [Int], op: ReduceOp) -> Result<()>;

    fn all_reduce_long(&self, data: &mut [i64], op: ReduceOp) -> Result<()>;

    /// Overwrite `data` on every rank with the content it has on `root`
    fn broadcast_real(&self, data: &mut [Real], root: usize) -> Result<()>;

    fn broadcast_int(&self, data: &mut [Int], root: usize) -> Result<()>;
}

/// Single-rank group: collectives leave data untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl SerialComm {
    fn check_root(root: usize) -> Result<()> {
        if root != 0 {
            return Err(StatsError::Comm(format!(
                "broadcast root {root} out of range for a group of size 1"
            )));
        }
        Ok(())
    }
}

impl Comm for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }

    fn all_reduce_real(&self, _data: &mut [Real], _op: ReduceOp) -> Result<()> {
        Ok(())
    }

    fn all_reduce_int(&self, _data: &mut [Int], _op: ReduceOp) -> Result<()> {
        Ok(())
    }

    fn all_reduce_long(&self, _data: &mut [i64], _op: ReduceOp) -> Result<()> {
        Ok(())
    }

    fn broadcast_real(&self, _data: &mut [Real], root: usize) -> Result<()> {
        Self::check_root(root)
    }

    fn broadcast_int(&self, _data: &mut [Int], root: usize) -> Result<()> {
        Self::check_root(root)
    }
}

#[derive(Debug, Clone)]
enum Payload {
    Real(Vec<Real>),
    Int(Vec<Int>),
    Long(Vec<i64>),
}

/// Element types that can travel through a [`ThreadComm`]
trait Exchange: Copy + Add<Output = Self> + PartialOrd + Sized {
    fn wrap(data: Vec<Self>) -> Payload;
    fn unwrap(payload: &Payload) -> Option<&Vec<Self>>;

    /// `None` when an integer sum overflows
    fn combine(op: ReduceOp, a: Self, b: Self) -> Option<Self> {
        Some(op.apply(a, b))
    }
}

impl Exchange for Real {
    fn wrap(data: Vec<Self>) -> Payload {
        Payload::Real(data)
    }
    fn unwrap(payload: &Payload) -> Option<&Vec<Self>> {
        match payload {
            Payload::Real(v) => Some(v),
            _ => None,
        }
    }
}

impl Exchange for Int {
    fn combine(op: ReduceOp, a: Self, b: Self) -> Option<Self> {
        match op {
            ReduceOp::Sum => a.checked_add(b),
            _ => Some(op.apply(a, b)),
        }
    }
    fn wrap(data: Vec<Self>) -> Payload {
        Payload::Int(data)
    }
    fn unwrap(payload: &Payload) -> Option<&Vec<Self>> {
        match payload {
            Payload::Int(v) => Some(v),
            _ => None,
        }
    }
}

impl Exchange for i64 {
    fn combine(op: ReduceOp, a: Self, b: Self) -> Option<Self> {
        match op {
            ReduceOp::Sum => a.checked_add(b),
            _ => Some(op.apply(a, b)),
        }
    }
    fn wrap(data: Vec<Self>) -> Payload {
        Payload::Long(data)
    }
    fn unwrap(payload: &Payload) -> Option<&Vec<Self>> {
        match payload {
            Payload::Long(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Shared {
    size: usize,
    barrier: Barrier,
    slots: Mutex<Vec<Option<Payload>>>,
}

/// One rank of a group of in-process ranks
///
/// Each collective is an all-gather through a shared slot table bracketed by
/// two barriers; every rank then combines the gathered contributions in rank
/// order, so all ranks compute bit-identical results.
#[derive(Debug, Clone)]
pub struct ThreadComm {
    rank: usize,
    shared: Arc<Shared>,
}

impl ThreadComm {
    /// Create the `size` connected ranks of a new group
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is zero.
    pub fn group(size: usize) -> Result<Vec<ThreadComm>> {
        if size == 0 {
            return Err(StatsError::Comm("cannot create an empty rank group".to_string()));
        }
        let shared = Arc::new(Shared {
            size,
            barrier: Barrier::new(size),
            slots: Mutex::new(vec![None; size]),
        });
        Ok((0..size)
            .map(|rank| ThreadComm {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect())
    }

    fn all_gather<T: Exchange>(&self, local: &[T]) -> Result<Vec<Vec<T>>> {
        let poisoned = || StatsError::Comm("communicator state poisoned".to_string());
        {
            let mut slots = self.shared.slots.lock().map_err(|_| poisoned())?;
            slots[self.rank] = Some(T::wrap(local.to_vec()));
        }
        self.shared.barrier.wait();
        let gathered = {
            let slots = self.shared.slots.lock().map_err(|_| poisoned())?;
            slots
                .iter()
                .map(|slot| slot.as_ref().and_then(T::unwrap).cloned())
                .collect::<Vec<_>>()
        };
        self.shared.barrier.wait();

        gathered
            .into_iter()
            .enumerate()
            .map(|(rank, data)| {
                data.ok_or_else(|| {
                    StatsError::Comm(format!("rank {rank} entered a different collective"))
                })
            })
            .collect()
    }

    fn all_reduce<T: Exchange>(&self, data: &mut [T], op: ReduceOp) -> Result<()> {
        let contributions = self.all_gather(data)?;
        if let Some((rank, c)) = contributions
            .iter()
            .enumerate()
            .find(|(_, c)| c.len() != data.len())
        {
            return Err(StatsError::Comm(format!(
                "all_reduce({}) buffer size mismatch: rank {} has {} entries, rank {rank} has {}",
                op.as_str(),
                self.rank,
                data.len(),
                c.len()
            )));
        }
        for (i, entry) in data.iter_mut().enumerate() {
            *entry = contributions[1..]
                .iter()
                .try_fold(contributions[0][i], |acc, c| T::combine(op, acc, c[i]))
                .ok_or_else(|| {
                    StatsError::Comm(format!("all_reduce({}) overflows entry {i}", op.as_str()))
                })?;
        }
        Ok(())
    }

    fn broadcast<T: Exchange>(&self, data: &mut [T], root: usize) -> Result<()> {
        if root >= self.shared.size {
            return Err(StatsError::Comm(format!(
                "broadcast root {root} out of range for a group of size {}",
                self.shared.size
            )));
        }
        let contributions = self.all_gather(data)?;
        let source = &contributions[root];
        if source.len() != data.len() {
            return Err(StatsError::Comm(format!(
                "broadcast buffer size mismatch: root {root} sends {} entries, rank {} expects {}",
                source.len(),
                self.rank,
                data.len()
            )));
        }
        data.copy_from_slice(source);
        Ok(())
    }
}

impl Comm for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) -> Result<()> {
        self.shared.barrier.wait();
        Ok(())
    }

    fn all_reduce_real(&self, data: &mut [Real], op: ReduceOp) -> Result<()> {
        self.all_reduce(data, op)
    }

    fn all_reduce_int(&self, data: &mut [Int], op: ReduceOp) -> Result<()> {
        self.all_reduce(data, op)
    }

    fn all_reduce_long(&self, data: &mut [i64], op: ReduceOp) -> Result<()> {
        self.all_reduce(data, op)
    }

    fn broadcast_real(&self, data: &mut [Real], root: usize) -> Result<()> {
        self.broadcast(data, root)
    }

    fn broadcast_int(&self, data: &mut [Int], root: usize) -> Result<()> {
        self.broadcast(data, root)
    }
}
