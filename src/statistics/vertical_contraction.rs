//! `vertical_contraction`: sum or average over a window of vertical levels
//!
//! The level dimension is found by name (`lev`, then `ilev`) and may sit at
//! any position. `level_bounds` is an inclusive index range, the full column
//! by default. An optional rank-1 weight over the level dimension scales each
//! level; averages divide by the total weight (or the number of levels) of
//! the window. Levels are never split across ranks, so no collective is
//! needed.

use crate::bounds::Bounds;
use crate::data_type::{DataType, FieldValue, Real};
use crate::errors::{Result, StatsError};
use crate::field::Field;
use crate::layout::FieldLayout;
use crate::params::ParameterList;
use crate::statistics::factory::BuildStat;
use crate::statistics::stat::{FieldStat, StatBase, StatContext};
use crate::statistics::utils::{dispatch_kernel, find_level_dim, kahan_update, part_target};
use ndarray::{ArrayViewMut, Axis, RemoveAxis, Zip};
use tracing::debug;

#[derive(Debug)]
pub struct FieldVerticalContraction {
    base: StatBase,
    level_bounds: Option<Bounds<usize>>,
    average: bool,
    weight_field: Option<String>,
}

impl FieldVerticalContraction {
    fn level_dim(&self, layout: &FieldLayout) -> Result<usize> {
        find_level_dim(layout).ok_or_else(|| StatsError::DimensionNotFound {
            dim: "lev".to_string(),
            layout: layout.to_string(),
        })
    }

    /// Inclusive level window for a field with `nlevs` levels
    fn window(&self, nlevs: usize) -> Result<Bounds<usize>> {
        match self.level_bounds {
            Some(b) if b.max >= nlevs => Err(StatsError::config(
                self.base.name(),
                format!("level bounds {b} exceed the {nlevs} available levels"),
            )),
            Some(b) => Ok(b),
            None => Bounds::new(0, nlevs - 1),
        }
    }

    fn level_weights(&self, nlevs: usize) -> Result<Vec<Real>> {
        match &self.weight_field {
            Some(name) => self.base.aux_field(name)?.to_vec::<Real>(),
            None => Ok(vec![1.0; nlevs]),
        }
    }

    fn compute_kernel<T: FieldValue, D: RemoveAxis>(&self) -> Result<()> {
        let field = self.base.field()?;
        let lev_dim = self.level_dim(field.layout())?;
        let nlevs = field.layout().extent(lev_dim)?;
        let window = self.window(nlevs)?;
        let weights = self.level_weights(nlevs)?;

        let stat = self.base.stat_field()?;
        let mut out = stat.data_mut::<Real>()?;
        let mut comp = vec![0.0; out.as_slice().len()];
        {
            let stat_layout = out.layout().clone();
            let mut out_view = out.view_mut::<D::Smaller>()?;
            let mut comp_view = ArrayViewMut::from_shape(stat_layout.dims(), comp.as_mut_slice())?
                .into_dimensionality::<D::Smaller>()?;
            out_view.fill(0.0);
            for ipart in 0..field.nparts() {
                let lev_offset = if field.nparts() > 1 && field.part_dim() == lev_dim {
                    field.part_offset(ipart)?
                } else {
                    0
                };
                let part = field.part_data::<T>(ipart)?;
                let view = part.view::<D>()?;
                let mut target = part_target(&mut out_view, field, ipart, lev_dim)?;
                let mut target_comp = part_target(&mut comp_view, field, ipart, lev_dim)?;
                for (ilev, lane) in view.axis_iter(Axis(lev_dim)).enumerate() {
                    let lev = ilev + lev_offset;
                    if !window.contains(lev, true, true) {
                        continue;
                    }
                    let w = weights[lev];
                    Zip::from(&mut target)
                        .and(&mut target_comp)
                        .and(&lane)
                        .for_each(|s, c, &x| kahan_update(x.to_real() * w, s, c));
                }
            }
            Zip::from(&mut out_view)
                .and(&comp_view)
                .for_each(|s, &c| *s += c);
        }
        if self.average {
            let total: Real = weights[window.min..=window.max].iter().sum();
            if total == 0.0 {
                return Err(StatsError::config(
                    self.base.name(),
                    format!("level weights add up to zero over {window}"),
                ));
            }
            for s in out.as_mut_slice() {
                *s /= total;
            }
        }
        Ok(())
    }
}

impl BuildStat for FieldVerticalContraction {
    fn build(ctx: &StatContext, params: &ParameterList) -> Result<Self> {
        Ok(Self {
            base: StatBase::new(ctx, params)?,
            level_bounds: params.get_bounds_opt("level_bounds")?,
            average: params.get_or("average", true)?,
            weight_field: params.get_opt("weight_field")?,
        })
    }
}

impl FieldStat for FieldVerticalContraction {
    fn base(&self) -> &StatBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StatBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "vertical_contraction"
    }

    fn stat_layout(&self, field_layout: &FieldLayout) -> Result<FieldLayout> {
        field_layout.strip_dim_at(self.level_dim(field_layout)?)
    }

    fn stat_data_type(&self) -> Result<DataType> {
        Ok(DataType::Real)
    }

    fn aux_fields_names(&self) -> Vec<String> {
        self.weight_field.iter().cloned().collect()
    }

    fn set_field_impl(&mut self, field: &Field) -> Result<()> {
        let lev_dim = self.level_dim(field.layout())?;
        let window = self.window(field.layout().extent(lev_dim)?)?;
        debug!(stat = %self.base.name(), field = %field.name(), levels = %window, "level window set");
        Ok(())
    }

    fn set_aux_fields_impl(&mut self) -> Result<()> {
        let Some(name) = &self.weight_field else {
            return Ok(());
        };
        let field = self.base.field()?;
        let weight = self.base.aux_field(name)?;
        let lev_name = field.layout().name(self.level_dim(field.layout())?)?;
        let nlevs = field.layout().extent_of(lev_name)?;
        if weight.data_type() != DataType::Real
            || weight.layout().rank() != 1
            || weight.layout().names()[0] != lev_name
            || weight.layout().dims()[0] != nlevs
        {
            return Err(StatsError::IncompatibleAuxField {
                stat: self.base.name().to_string(),
                aux: name.clone(),
                message: format!(
                    "expected real weights over {lev_name}({nlevs}), found {} {}",
                    weight.data_type(),
                    weight.layout()
                ),
            });
        }
        Ok(())
    }

    fn compute_impl(&mut self) -> Result<()> {
        let field = self.base.field()?.clone();
        dispatch_kernel!(self, &field, compute_kernel)
    }
}
