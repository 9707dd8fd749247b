//! Column reducers: `max_along_columns`, `min_along_columns`,
//! `sum_along_columns`, `avg_along_columns`
//!
//! The named axis (`axis_name`, default `ncol`) is collapsed; every other
//! axis survives. Sums keep a compensation buffer the size of the output,
//! and the average divides by the globally summed extent of the axis.

use crate::comm::ReduceOp;
use crate::data_type::{DataType, FieldValue, Real};
use crate::errors::{Result, StatsError};
use crate::field::{DataAccess, Field};
use crate::layout::FieldLayout;
use crate::params::ParameterList;
use crate::statistics::operations::StatOperation;
use crate::statistics::stat::{FieldStat, StatBase, StatContext};
use crate::statistics::global::check_overflow;
use crate::statistics::utils::{dispatch_kernel, part_target};
use ndarray::{Axis, RemoveAxis, Zip};

#[derive(Debug)]
pub struct FieldStatAlongAxis {
    base: StatBase,
    op: StatOperation,
    axis_name: String,
    compensation: Option<Field>,
}

impl FieldStatAlongAxis {
    pub fn new(ctx: &StatContext, params: &ParameterList, op: StatOperation) -> Result<Self> {
        Ok(Self {
            base: StatBase::new(ctx, params)?,
            op,
            axis_name: params.get_or("axis_name", "ncol".to_string())?,
            compensation: None,
        })
    }

    #[must_use]
    pub fn axis_name(&self) -> &str {
        &self.axis_name
    }

    fn compute_kernel<T: FieldValue, D: RemoveAxis>(&self) -> Result<()> {
        let field = self.base.field()?;
        let axis = field.layout().dim_idx(&self.axis_name)?;
        match self.op {
            StatOperation::Max | StatOperation::Min => self.extremum::<T, D>(field, axis),
            StatOperation::Sum => self.sum::<T, T, D>(field, axis, |x| x),
            StatOperation::Mean => {
                self.sum::<T, Real, D>(field, axis, T::to_real)?;
                let mut ncols = [field.layout().extent(axis)? as i64];
                self.base.comm().all_reduce_long(&mut ncols, ReduceOp::Sum)?;
                let stat = self.base.stat_field()?;
                let mut out = stat.data_mut::<Real>()?;
                for v in out.as_mut_slice() {
                    *v /= ncols[0] as Real;
                }
                Ok(())
            }
        }
    }

    fn extremum<T: FieldValue, D: RemoveAxis>(&self, field: &Field, axis: usize) -> Result<()> {
        let reduce = self.op.reduce_op();
        let stat = self.base.stat_field()?;
        let mut out = stat.data_mut::<T>()?;
        {
            let mut out_view = out.view_mut::<D::Smaller>()?;
            out_view.fill(self.op.identity::<T>());
            for ipart in 0..field.nparts() {
                let part = field.part_data::<T>(ipart)?;
                let view = part.view::<D>()?;
                let mut target = part_target(&mut out_view, field, ipart, axis)?;
                for lane in view.axis_iter(Axis(axis)) {
                    Zip::from(&mut target)
                        .and(&lane)
                        .for_each(|s, &x| *s = reduce.apply(*s, x));
                }
            }
        }
        T::all_reduce(self.base.comm(), out.as_mut_slice(), reduce)
    }

    fn sum<T: FieldValue, A: FieldValue, D: RemoveAxis>(
        &self,
        field: &Field,
        axis: usize,
        convert: impl Fn(T) -> A,
    ) -> Result<()> {
        let stat = self.base.stat_field()?;
        let compensation = self
            .compensation
            .as_ref()
            .ok_or_else(|| StatsError::stat(self.base.name(), "compensation buffer not allocated"))?;
        let mut out = stat.data_mut::<A>()?;
        let mut comp = compensation.data_mut::<A>()?;
        let mut overflow = false;
        {
            let mut out_view = out.view_mut::<D::Smaller>()?;
            let mut comp_view = comp.view_mut::<D::Smaller>()?;
            out_view.fill(A::zero());
            comp_view.fill(A::zero());
            for ipart in 0..field.nparts() {
                let part = field.part_data::<T>(ipart)?;
                let view = part.view::<D>()?;
                let mut target = part_target(&mut out_view, field, ipart, axis)?;
                let mut target_comp = part_target(&mut comp_view, field, ipart, axis)?;
                for lane in view.axis_iter(Axis(axis)) {
                    Zip::from(&mut target)
                        .and(&mut target_comp)
                        .and(&lane)
                        .for_each(|s, c, &x| {
                            overflow |= A::accumulate(convert(x), s, c).is_none();
                        });
                }
            }
            Zip::from(&mut out_view).and(&comp_view).for_each(|s, &c| {
                match s.checked_sum(c) {
                    Some(total) => *s = total,
                    None => overflow = true,
                }
            });
        }
        check_overflow(&self.base, self.op, overflow)?;
        A::all_reduce(self.base.comm(), out.as_mut_slice(), ReduceOp::Sum)
    }
}

impl FieldStat for FieldStatAlongAxis {
    fn base(&self) -> &StatBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StatBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        self.op.along_columns_stat_name()
    }

    fn stat_layout(&self, field_layout: &FieldLayout) -> Result<FieldLayout> {
        field_layout.strip_dim(&self.axis_name)
    }

    fn stat_data_type(&self) -> Result<DataType> {
        match self.op {
            StatOperation::Mean => Ok(DataType::Real),
            _ => Ok(self.base.field()?.data_type()),
        }
    }

    fn set_field_impl(&mut self, field: &Field) -> Result<()> {
        field.layout().dim_idx(&self.axis_name)?;
        self.compensation = None;
        Ok(())
    }

    fn create_stat_field_impl(&mut self) -> Result<()> {
        if matches!(self.op, StatOperation::Sum | StatOperation::Mean) {
            let stat = self.base.stat_field()?;
            let mut compensation = Field::single_part(
                &format!("{}_compensation", self.base.name()),
                stat.layout().clone(),
                DataAccess::Copy,
                stat.data_type(),
            )?;
            compensation.commit()?;
            self.compensation = Some(compensation);
        }
        Ok(())
    }

    fn compute_impl(&mut self) -> Result<()> {
        let field = self.base.field()?.clone();
        dispatch_kernel!(self, &field, compute_kernel)
    }
}
