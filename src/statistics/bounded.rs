//! Pass-through-or-mask stats: `bounded` and `bounding_box`
//!
//! Both produce an output shaped like the input, where every entry is either
//! the input value or the configured mask value.

use crate::bounds::Bounds;
use crate::data_type::{DataType, FieldValue, Real};
use crate::errors::{Result, StatsError};
use crate::field::Field;
use crate::layout::FieldLayout;
use crate::params::ParameterList;
use crate::statistics::factory::BuildStat;
use crate::statistics::stat::{FieldStat, StatBase, StatContext};
use crate::statistics::utils::{dispatch_kernel, find_level_dim, unravel_index, PartitionIndexMap};
use ndarray::{Dimension, Ix1};
use tracing::debug;

/// Keeps values inside `[min, max)`
#[derive(Debug)]
pub struct FieldBounded {
    base: StatBase,
    bounds: Bounds<Real>,
    mask_value: Real,
}

impl FieldBounded {
    #[must_use]
    pub fn bounds(&self) -> Bounds<Real> {
        self.bounds
    }

    fn compute_kernel<T: FieldValue, D: Dimension>(&self) -> Result<()> {
        let field = self.base.field()?;
        let mask = T::from_real(self.mask_value);
        let stat = self.base.stat_field()?;
        let mut out = stat.data_mut::<T>()?;
        let out = out.as_mut_slice();
        for ipart in 0..field.nparts() {
            let map = PartitionIndexMap::new(field, ipart, field.layout().dims())?;
            let part = field.part_data::<T>(ipart)?;
            for (local, &x) in part.view::<D>()?.iter().enumerate() {
                out[map.global_index(local)] = if self.bounds.contains(x.to_real(), true, false) {
                    x
                } else {
                    mask
                };
            }
        }
        Ok(())
    }
}

impl BuildStat for FieldBounded {
    fn build(ctx: &StatContext, params: &ParameterList) -> Result<Self> {
        Ok(Self {
            base: StatBase::new(ctx, params)?,
            bounds: params.get_bounds("bounds")?,
            mask_value: params.get_or("mask_value", 0.0)?,
        })
    }
}

impl FieldStat for FieldBounded {
    fn base(&self) -> &StatBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StatBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "bounded"
    }

    fn stat_layout(&self, field_layout: &FieldLayout) -> Result<FieldLayout> {
        FieldLayout::new(field_layout.dims(), field_layout.names())
    }

    fn compute_impl(&mut self) -> Result<()> {
        let field = self.base.field()?.clone();
        dispatch_kernel!(self, &field, compute_kernel)
    }
}

/// Keeps the columns whose coordinates fall in a lat/lon box
///
/// The box is closed on every side. With `lev_bounds`, entries outside the
/// (inclusive) level-index window are masked as well.
#[derive(Debug)]
pub struct FieldBoundingBox {
    base: StatBase,
    lat_bounds: Bounds<Real>,
    lon_bounds: Bounds<Real>,
    lev_bounds: Option<Bounds<usize>>,
    mask_value: Real,
    column_dim: String,
}

impl FieldBoundingBox {
    fn compute_kernel<T: FieldValue, D: Dimension>(&self) -> Result<()> {
        let field = self.base.field()?;
        let lat = self.base.aux_field("lat")?;
        let lon = self.base.aux_field("lon")?;
        let col_dim = field.layout().dim_idx(&self.column_dim)?;
        let lev_dim = find_level_dim(field.layout());
        let mask = T::from_real(self.mask_value);

        let stat = self.base.stat_field()?;
        let mut out = stat.data_mut::<T>()?;
        let out = out.as_mut_slice();
        for ipart in 0..field.nparts() {
            let map = PartitionIndexMap::new(field, ipart, field.layout().dims())?;
            let lat_part = lat.part_data::<Real>(ipart)?;
            let lon_part = lon.part_data::<Real>(ipart)?;
            let lat_view = lat_part.view::<Ix1>()?;
            let lon_view = lon_part.view::<Ix1>()?;
            let part = field.part_data::<T>(ipart)?;
            for (local, &x) in part.view::<D>()?.iter().enumerate() {
                let icol = unravel_index(local, map.part_dims())[col_dim];
                let mut inside = self.lat_bounds.contains(lat_view[icol], true, true)
                    && self.lon_bounds.contains(lon_view[icol], true, true);
                if let (Some(lev), Some(window)) = (lev_dim, &self.lev_bounds) {
                    inside = inside && window.contains(map.global_coords(local)[lev], true, true);
                }
                out[map.global_index(local)] = if inside { x } else { mask };
            }
        }
        Ok(())
    }
}

/// Check that a coordinate field is a rank-1 `Real` field over `column_dim`
/// split like the input field
pub(crate) fn check_column_aux(base: &StatBase, aux_name: &str, column_dim: &str) -> Result<()> {
    let field = base.field()?;
    let aux = base.aux_field(aux_name)?;
    let incompatible = |message: String| StatsError::IncompatibleAuxField {
        stat: base.name().to_string(),
        aux: aux_name.to_string(),
        message,
    };
    if aux.data_type() != DataType::Real {
        return Err(incompatible(format!(
            "expected data type real, found {}",
            aux.data_type()
        )));
    }
    if aux.layout().rank() != 1 || aux.layout().names()[0] != column_dim {
        return Err(incompatible(format!(
            "expected a rank-1 layout over '{column_dim}', found {}",
            aux.layout()
        )));
    }
    if aux.layout().dims()[0] != field.layout().extent_of(column_dim)? {
        return Err(incompatible(format!(
            "layout {} does not match input layout {}",
            aux.layout(),
            field.layout()
        )));
    }
    base.check_aux_partitioning(aux, column_dim)
}

impl BuildStat for FieldBoundingBox {
    fn build(ctx: &StatContext, params: &ParameterList) -> Result<Self> {
        Ok(Self {
            base: StatBase::new(ctx, params)?,
            lat_bounds: params.get_bounds("lat_bounds")?,
            lon_bounds: params.get_bounds("lon_bounds")?,
            lev_bounds: params.get_bounds_opt("lev_bounds")?,
            mask_value: params.get_or("mask_value", 0.0)?,
            column_dim: params.get_or("column_dim", "ncol".to_string())?,
        })
    }
}

impl FieldStat for FieldBoundingBox {
    fn base(&self) -> &StatBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StatBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "bounding_box"
    }

    fn stat_layout(&self, field_layout: &FieldLayout) -> Result<FieldLayout> {
        FieldLayout::new(field_layout.dims(), field_layout.names())
    }

    fn aux_fields_names(&self) -> Vec<String> {
        vec!["lat".to_string(), "lon".to_string()]
    }

    fn set_field_impl(&mut self, field: &Field) -> Result<()> {
        field.layout().dim_idx(&self.column_dim)?;
        Ok(())
    }

    fn set_aux_fields_impl(&mut self) -> Result<()> {
        check_column_aux(&self.base, "lat", &self.column_dim)?;
        check_column_aux(&self.base, "lon", &self.column_dim)?;
        debug!(
            stat = %self.base.name(),
            lat = %self.lat_bounds,
            lon = %self.lon_bounds,
            "bounding box aux fields bound"
        );
        Ok(())
    }

    fn compute_impl(&mut self) -> Result<()> {
        let field = self.base.field()?.clone();
        dispatch_kernel!(self, &field, compute_kernel)
    }
}
