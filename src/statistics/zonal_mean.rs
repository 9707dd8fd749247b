//! `zonal_mean`: area-weighted average over the columns of a latitude band
//!
//! The zonal area (total area of the in-band columns across all ranks) is
//! computed when the aux fields are bound and cached until they are bound
//! again. Band edges are inclusive.

use crate::bounds::Bounds;
use crate::comm::ReduceOp;
use crate::data_type::{DataType, FieldValue, Real};
use crate::errors::{Result, StatsError};
use crate::field::Field;
use crate::layout::FieldLayout;
use crate::params::ParameterList;
use crate::statistics::bounded::check_column_aux;
use crate::statistics::factory::BuildStat;
use crate::statistics::stat::{FieldStat, StatBase, StatContext};
use crate::statistics::utils::{
    compute_field_dim_index, dispatch_kernel, find_level_dim, kahan_update, KahanSum,
};
use ndarray::{Axis, Ix1, RemoveAxis};
use tracing::info;

#[derive(Debug)]
pub struct FieldZonalMean {
    base: StatBase,
    lat_bounds: Bounds<Real>,
    lev_bounds: Option<Bounds<usize>>,
    column_dim: String,
    zonal_area: Option<Real>,
}

impl FieldZonalMean {
    /// Total area of the in-band columns, once the aux fields are bound
    #[must_use]
    pub fn zonal_area(&self) -> Option<Real> {
        self.zonal_area
    }

    fn compute_zonal_area(&self) -> Result<Real> {
        let lat = self.base.aux_field("lat")?;
        let area = self.base.aux_field("area")?;
        let mut sum = KahanSum::<Real>::new();
        for ipart in 0..lat.nparts() {
            let lat_part = lat.part_data::<Real>(ipart)?;
            let area_part = area.part_data::<Real>(ipart)?;
            let lat_view = lat_part.view::<Ix1>()?;
            let area_view = area_part.view::<Ix1>()?;
            for (&l, &a) in lat_view.iter().zip(area_view.iter()) {
                if self.lat_bounds.contains(l, true, true) {
                    sum.add(a);
                }
            }
        }
        let mut total = [sum.value()];
        self.base.comm().all_reduce_real(&mut total, ReduceOp::Sum)?;
        Ok(total[0])
    }

    fn compute_kernel<T: FieldValue, D: RemoveAxis>(&self) -> Result<()> {
        let field = self.base.field()?;
        let zonal_area = self
            .zonal_area
            .ok_or_else(|| StatsError::stat(self.base.name(), "zonal area was not computed"))?;
        let lat = self.base.aux_field("lat")?;
        let area = self.base.aux_field("area")?;
        let col_dim = field.layout().dim_idx(&self.column_dim)?;

        let stat = self.base.stat_field()?;
        let stat_dims = stat.layout().dims().to_vec();
        let lev_dim = find_level_dim(stat.layout());
        let in_window = |k: usize| match (lev_dim, &self.lev_bounds) {
            (Some(lev), Some(window)) => {
                window.contains(compute_field_dim_index(k, lev, &stat_dims), true, true)
            }
            _ => true,
        };

        let mut out = stat.data_mut::<Real>()?;
        let out = out.as_mut_slice();
        let mut comp = vec![0.0; out.len()];
        out.fill(0.0);
        for ipart in 0..field.nparts() {
            let lat_part = lat.part_data::<Real>(ipart)?;
            let area_part = area.part_data::<Real>(ipart)?;
            let lat_view = lat_part.view::<Ix1>()?;
            let area_view = area_part.view::<Ix1>()?;
            let part = field.part_data::<T>(ipart)?;
            let view = part.view::<D>()?;
            for (icol, lane) in view.axis_iter(Axis(col_dim)).enumerate() {
                if !self.lat_bounds.contains(lat_view[icol], true, true) {
                    continue;
                }
                let weight = area_view[icol];
                for (k, &x) in lane.iter().enumerate() {
                    if in_window(k) {
                        kahan_update(x.to_real() * weight, &mut out[k], &mut comp[k]);
                    }
                }
            }
        }
        for (s, c) in out.iter_mut().zip(&comp) {
            *s += c;
        }
        self.base.comm().all_reduce_real(out, ReduceOp::Sum)?;
        for s in out.iter_mut() {
            *s /= zonal_area;
        }
        Ok(())
    }
}

impl BuildStat for FieldZonalMean {
    fn build(ctx: &StatContext, params: &ParameterList) -> Result<Self> {
        Ok(Self {
            base: StatBase::new(ctx, params)?,
            lat_bounds: params.get_bounds("lat_bounds")?,
            lev_bounds: params.get_bounds_opt("lev_bounds")?,
            column_dim: params.get_or("column_dim", "ncol".to_string())?,
            zonal_area: None,
        })
    }
}

impl FieldStat for FieldZonalMean {
    fn base(&self) -> &StatBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StatBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "zonal_mean"
    }

    fn stat_layout(&self, field_layout: &FieldLayout) -> Result<FieldLayout> {
        field_layout.strip_dim(&self.column_dim)
    }

    fn stat_data_type(&self) -> Result<DataType> {
        Ok(DataType::Real)
    }

    fn aux_fields_names(&self) -> Vec<String> {
        vec!["lat".to_string(), "area".to_string()]
    }

    fn set_field_impl(&mut self, field: &Field) -> Result<()> {
        field.layout().dim_idx(&self.column_dim)?;
        self.zonal_area = None;
        Ok(())
    }

    fn set_aux_fields_impl(&mut self) -> Result<()> {
        check_column_aux(&self.base, "lat", &self.column_dim)?;
        check_column_aux(&self.base, "area", &self.column_dim)?;
        let zonal_area = self.compute_zonal_area()?;
        if zonal_area <= 0.0 {
            return Err(StatsError::config(
                self.base.name(),
                format!(
                    "zonal area is {zonal_area}, latitude band {} holds no column",
                    self.lat_bounds
                ),
            ));
        }
        info!(stat = %self.base.name(), zonal_area, band = %self.lat_bounds, "zonal area computed");
        self.zonal_area = Some(zonal_area);
        Ok(())
    }

    fn compute_impl(&mut self) -> Result<()> {
        let field = self.base.field()?.clone();
        dispatch_kernel!(self, &field, compute_kernel)
    }
}
