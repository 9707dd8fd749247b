//! `identity`: copy a (possibly multi-part) field into a single-part output

use crate::data_type::FieldValue;
use crate::errors::Result;
use crate::layout::FieldLayout;
use crate::params::ParameterList;
use crate::statistics::factory::BuildStat;
use crate::statistics::stat::{FieldStat, StatBase, StatContext};
use crate::statistics::utils::{dispatch_kernel, PartitionIndexMap};
use ndarray::Dimension;

#[derive(Debug)]
pub struct FieldIdentity {
    base: StatBase,
}

impl FieldIdentity {
    fn compute_kernel<T: FieldValue, D: Dimension>(&self) -> Result<()> {
        let field = self.base.field()?;
        let stat = self.base.stat_field()?;
        let mut out = stat.data_mut::<T>()?;
        let out = out.as_mut_slice();
        for ipart in 0..field.nparts() {
            let map = PartitionIndexMap::new(field, ipart, field.layout().dims())?;
            let part = field.part_data::<T>(ipart)?;
            for (local, &x) in part.view::<D>()?.iter().enumerate() {
                out[map.global_index(local)] = x;
            }
        }
        Ok(())
    }
}

impl BuildStat for FieldIdentity {
    fn build(ctx: &StatContext, params: &ParameterList) -> Result<Self> {
        Ok(Self {
            base: StatBase::new(ctx, params)?,
        })
    }
}

impl FieldStat for FieldIdentity {
    fn base(&self) -> &StatBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StatBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "identity"
    }

    fn stat_layout(&self, field_layout: &FieldLayout) -> Result<FieldLayout> {
        FieldLayout::new(field_layout.dims(), field_layout.names())
    }

    fn compute_impl(&mut self) -> Result<()> {
        let field = self.base.field()?.clone();
        dispatch_kernel!(self, &field, compute_kernel)
    }
}
