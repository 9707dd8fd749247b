//! Scalar reducers: `global_max`, `global_min`, `global_sum`, `global_avg`
//!
//! Each rank reduces its local partitions, then a single all-reduce with the
//! matching operator combines the ranks. The average divides the global sum
//! by the globally summed number of entries.

use crate::comm::ReduceOp;
use crate::data_type::{DataType, FieldValue, Int, Real};
use crate::errors::{Result, StatsError};
use crate::layout::FieldLayout;
use crate::params::ParameterList;
use crate::statistics::operations::StatOperation;
use crate::statistics::stat::{FieldStat, StatBase, StatContext};
use crate::statistics::utils::{dispatch_kernel, KahanSum};
use ndarray::Dimension;
use tracing::trace;

#[derive(Debug)]
pub struct FieldGlobalStat {
    base: StatBase,
    op: StatOperation,
}

impl FieldGlobalStat {
    pub fn new(ctx: &StatContext, params: &ParameterList, op: StatOperation) -> Result<Self> {
        Ok(Self {
            base: StatBase::new(ctx, params)?,
            op,
        })
    }

    #[must_use]
    pub fn operation(&self) -> StatOperation {
        self.op
    }

    fn compute_kernel<T: FieldValue, D: Dimension>(&self) -> Result<()> {
        let field = self.base.field()?;
        let comm = self.base.comm();
        let stat = self.base.stat_field()?;

        match self.op {
            StatOperation::Max | StatOperation::Min => {
                let mut value = [self.op.identity::<T>()];
                let reduce = self.op.reduce_op();
                for ipart in 0..field.nparts() {
                    let part = field.part_data::<T>(ipart)?;
                    value[0] = part
                        .view::<D>()?
                        .iter()
                        .fold(value[0], |acc, &x| reduce.apply(acc, x));
                }
                T::all_reduce(comm, &mut value, reduce)?;
                stat.data_mut::<T>()?.as_mut_slice()[0] = value[0];
            }
            StatOperation::Sum => {
                let (mut sum, mut comp) = (T::zero(), T::zero());
                let mut overflow = false;
                for ipart in 0..field.nparts() {
                    let part = field.part_data::<T>(ipart)?;
                    for &x in part.view::<D>()?.iter() {
                        if T::accumulate(x, &mut sum, &mut comp).is_none() {
                            overflow = true;
                            break;
                        }
                    }
                }
                let local = sum.checked_sum(comp);
                check_overflow(&self.base, self.op, overflow || local.is_none())?;
                let mut value = [local.unwrap_or_else(T::zero)];
                T::all_reduce(comm, &mut value, ReduceOp::Sum)?;
                stat.data_mut::<T>()?.as_mut_slice()[0] = value[0];
            }
            StatOperation::Mean => {
                let mut sum = KahanSum::<Real>::new();
                for ipart in 0..field.nparts() {
                    let part = field.part_data::<T>(ipart)?;
                    part.view::<D>()?.iter().for_each(|&x| sum.add(x.to_real()));
                }
                let mut value = [sum.value()];
                comm.all_reduce_real(&mut value, ReduceOp::Sum)?;
                let mut size = [field.layout().size() as i64];
                comm.all_reduce_long(&mut size, ReduceOp::Sum)?;
                stat.data_mut::<Real>()?.as_mut_slice()[0] = value[0] / size[0] as Real;
            }
        }
        trace!(stat = %self.base.name(), op = self.op.as_str(), "global reduction done");
        Ok(())
    }
}

/// Agree across ranks on whether any rank overflowed its local sum
///
/// Every rank returns the same result, so none is left waiting in a later
/// collective.
pub(crate) fn check_overflow(base: &StatBase, op: StatOperation, local: bool) -> Result<()> {
    let mut failed = [Int::from(local)];
    base.comm().all_reduce_int(&mut failed, ReduceOp::Max)?;
    if failed[0] != 0 {
        return Err(StatsError::IntegerOverflow {
            stat: base.name().to_string(),
            op: op.as_str().to_string(),
        });
    }
    Ok(())
}

impl FieldStat for FieldGlobalStat {
    fn base(&self) -> &StatBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StatBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        self.op.global_stat_name()
    }

    fn stat_layout(&self, _field_layout: &FieldLayout) -> Result<FieldLayout> {
        Ok(FieldLayout::scalar())
    }

    fn stat_data_type(&self) -> Result<DataType> {
        match self.op {
            StatOperation::Mean => Ok(DataType::Real),
            _ => Ok(self.base.field()?.data_type()),
        }
    }

    fn compute_impl(&mut self) -> Result<()> {
        let field = self.base.field()?.clone();
        dispatch_kernel!(self, &field, compute_kernel)
    }
}
