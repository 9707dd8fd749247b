//! `masked_integral` and `bounded_masked_integral`
//!
//! The dimension of an integer mask field is collapsed into one output entry
//! per distinct mask value. The set of mask values is agreed by all ranks
//! when the aux fields are bound: each rank in turn broadcasts how many values
//! it holds and then the values themselves, and every rank merges them into
//! the same ordered set. Output entry `i` belongs to the `i`-th smallest value.
//!
//! Integration is optionally weighted (`weight_field`, laid out like the mask)
//! and optionally averaged (`average`). Plain averages divide by the weight
//! integral, computed by a nested `masked_integral` built through the factory.
//! The bounded variant skips values outside `valid_bounds` and divides each
//! output entry by the weight it actually accumulated; entries that received
//! nothing are set to `Real::MAX`.
//!
//! With `mask_file_name` the mask is read through the context's
//! [`MaskReader`] using the `col_gids` aux field. With `output_mask_field`
//! the output is the mask itself, refreshed on every compute.

use crate::bounds::Bounds;
use crate::comm::{Comm, ReduceOp};
use crate::data_type::{DataType, FieldValue, Int, Real};
use crate::errors::{Result, StatsError};
use crate::field::Field;
use crate::layout::FieldLayout;
use crate::params::ParameterList;
use crate::statistics::stat::{FieldStat, StatBase, StatContext};
use crate::statistics::utils::{
    compute_stat_strides, dispatch_kernel, kahan_update, ravel_index, unravel_index,
    PartitionIndexMap,
};
use crate::time_stamp::TimeStamp;
use ndarray::Dimension;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info};

/// Source of masks stored in reference files
pub trait MaskReader: Send + Sync + fmt::Debug {
    /// Read the 1-D integer variable `mask_name` of `file_name`, keeping the
    /// entries of the global columns listed in `col_gids`
    fn read_mask(
        &self,
        file_name: &str,
        mask_name: &str,
        col_gids: &Field,
        comm: &dyn Comm,
    ) -> Result<Field>;
}

/// A single-part version of a field, refreshed through an `identity` stat
/// when the source has several partitions
#[derive(Debug)]
struct SinglePart {
    field: Field,
    reshuffle: Option<Box<dyn FieldStat>>,
}

impl SinglePart {
    fn new(ctx: &StatContext, owner: &str, source: &Field, ts: &TimeStamp) -> Result<Self> {
        if source.nparts() == 1 {
            return Ok(Self {
                field: source.clone(),
                reshuffle: None,
            });
        }
        let params = ParameterList::new(&format!("{owner}::{}_single_part", source.name()));
        let mut identity = ctx.create_stat("identity", &params)?;
        identity.set_field(source)?;
        identity.create_stat_field()?;
        let field = identity.compute(ts)?;
        Ok(Self {
            field,
            reshuffle: Some(identity),
        })
    }

    fn refresh(&mut self, ts: &TimeStamp) -> Result<()> {
        if let Some(identity) = self.reshuffle.as_mut() {
            identity.compute(ts)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct FieldMaskedIntegral {
    base: StatBase,
    bounded: bool,
    mask_name: String,
    weight_name: Option<String>,
    mask_file_name: Option<String>,
    average: bool,
    output_mask_field: bool,
    valid_bounds: Option<Bounds<Real>>,

    mask: Option<SinglePart>,
    weight: Option<SinglePart>,
    weight_integral: Option<Box<dyn FieldStat>>,
    mask_val_to_stat_entry: BTreeMap<Int, usize>,
}

impl FieldMaskedIntegral {
    /// Build a masked integral; `bounded` selects the `valid_bounds` variant
    pub fn new(ctx: &StatContext, params: &ParameterList, bounded: bool) -> Result<Self> {
        let base = StatBase::new(ctx, params)?;
        let output_mask_field = params.get_or("output_mask_field", false)?;
        let valid_bounds = if bounded {
            Some(params.get_bounds("valid_bounds")?)
        } else {
            None
        };
        Ok(Self {
            bounded,
            mask_name: params.get("mask_field")?,
            weight_name: if output_mask_field {
                None
            } else {
                params.get_opt("weight_field")?
            },
            mask_file_name: params.get_opt("mask_file_name")?,
            average: !output_mask_field && params.get_or("average", true)?,
            output_mask_field,
            valid_bounds,
            mask: None,
            weight: None,
            weight_integral: None,
            mask_val_to_stat_entry: BTreeMap::new(),
            base,
        })
    }

    /// Mask values in output order
    #[must_use]
    pub fn mask_values(&self) -> Vec<Int> {
        self.mask_val_to_stat_entry.keys().copied().collect()
    }

    fn mask(&self) -> Result<&Field> {
        self.mask.as_ref().map(|m| &m.field).ok_or_else(|| {
            StatsError::stat(self.base.name(), "mask is only known once aux fields are bound")
        })
    }

    fn mask_dim_name(&self) -> Result<String> {
        Ok(self.mask()?.layout().name(0)?.to_string())
    }

    fn bind_time(&self) -> TimeStamp {
        self.base.timestamp().copied().unwrap_or_default()
    }

    /// The mask, supplied directly or read from `mask_file_name`
    fn acquire_mask(&mut self) -> Result<Field> {
        if let Ok(mask) = self.base.aux_field(&self.mask_name) {
            return Ok(mask.clone());
        }
        let file_name = self.mask_file_name.clone().ok_or_else(|| StatsError::MissingAuxField {
            stat: self.base.name().to_string(),
            aux: self.mask_name.clone(),
        })?;
        let reader = self.base.ctx().mask_reader().ok_or_else(|| {
            StatsError::config(
                self.base.name(),
                format!("no mask reader available to load '{}' from {file_name}", self.mask_name),
            )
        })?;
        let gids = SinglePart::new(
            self.base.ctx(),
            self.base.name(),
            self.base.aux_field("col_gids")?,
            &self.bind_time(),
        )?;
        let mask = reader
            .read_mask(&file_name, &self.mask_name, &gids.field, self.base.comm())?
            .renamed(&self.mask_name)
            .read_only();
        info!(stat = %self.base.name(), mask = %self.mask_name, file = %file_name, "mask loaded");
        self.base.insert_aux_field(mask.clone());
        Ok(mask)
    }

    fn check_mask(&self, mask: &Field) -> Result<()> {
        let field = self.base.field()?;
        let incompatible = |message: String| StatsError::IncompatibleAuxField {
            stat: self.base.name().to_string(),
            aux: mask.name().to_string(),
            message,
        };
        if mask.data_type() != DataType::Int || mask.layout().rank() != 1 {
            return Err(incompatible(format!(
                "expected a rank-1 int mask, found {} {}",
                mask.data_type(),
                mask.layout()
            )));
        }
        let mask_dim = mask.layout().name(0)?;
        if field.layout().extent_of(mask_dim)? != mask.layout().dims()[0] {
            return Err(incompatible(format!(
                "layout {} does not match input layout {}",
                mask.layout(),
                field.layout()
            )));
        }
        Ok(())
    }

    fn check_weight(&self, weight: &Field, mask: &Field) -> Result<()> {
        if weight.layout() != mask.layout() || weight.data_type() != DataType::Real {
            return Err(StatsError::IncompatibleAuxField {
                stat: self.base.name().to_string(),
                aux: weight.name().to_string(),
                message: format!(
                    "weights must be real and laid out like the mask {}, found {} {}",
                    mask.layout(),
                    weight.data_type(),
                    weight.layout()
                ),
            });
        }
        Ok(())
    }

    /// Rank-ordered exchange of the locally observed mask values
    fn discover_mask_values(&self, mask: &Field) -> Result<BTreeMap<Int, usize>> {
        let comm = self.base.comm();
        let local: BTreeSet<Int> = mask.to_vec::<Int>()?.into_iter().collect();
        let mut global = BTreeSet::new();
        for proc in 0..comm.size() {
            let mine = proc == comm.rank();
            let mut count = [if mine { local.len() as Int } else { 0 }];
            comm.broadcast_int(&mut count, proc)?;
            let mut values = if mine {
                local.iter().copied().collect()
            } else {
                vec![0; count[0].max(0) as usize]
            };
            comm.broadcast_int(&mut values, proc)?;
            global.extend(values);
        }
        Ok(global.into_iter().enumerate().map(|(i, v)| (v, i)).collect())
    }

    /// Nested plain integral of the weights per mask value
    fn build_weight_integral(&self, mask: &Field, weight: &Field) -> Result<Box<dyn FieldStat>> {
        let name = match &self.weight_name {
            Some(w) => format!("{w}_integral"),
            None => format!("{}_unit_weight_integral", self.base.name()),
        };
        let params = ParameterList::new(&name)
            .with("mask_field", mask.name())?
            .with("average", false)?;
        let mut stat = self.base.ctx().create_stat("masked_integral", &params)?;
        stat.set_field(weight)?;
        let aux = BTreeMap::from([(mask.name().to_string(), mask.clone())]);
        stat.set_aux_fields(&aux)?;
        stat.create_stat_field()?;
        Ok(stat)
    }

    fn compute_mask_output(&self) -> Result<()> {
        let mask = self.mask()?.to_vec::<Int>()?;
        let stat = self.base.stat_field()?;
        let mut out = stat.data_mut::<Real>()?;
        for (s, &m) in out.as_mut_slice().iter_mut().zip(&mask) {
            *s = Real::from(m);
        }
        Ok(())
    }

    fn compute_kernel<T: FieldValue, D: Dimension>(&self) -> Result<()> {
        let field = self.base.field()?;
        let mask = self.mask()?.to_vec::<Int>()?;
        let mask_pos = field.layout().dim_idx(&self.mask_dim_name()?)?;
        let weights = match &self.weight {
            Some(w) => Some(w.field.to_vec::<Real>()?),
            None => None,
        };
        let rank = field.layout().rank();

        let stat = self.base.stat_field()?;
        let stat_dims = stat.layout().dims().to_vec();
        let stat_strides = compute_stat_strides(&stat_dims);
        let mut out = stat.data_mut::<Real>()?;
        let out = out.as_mut_slice();
        out.fill(0.0);
        let mut comp = vec![0.0; out.len()];
        let mut accumulated = vec![0.0; if self.bounded { out.len() } else { 0 }];

        for ipart in 0..field.nparts() {
            let map = PartitionIndexMap::new(field, ipart, field.layout().dims())?;
            let part = field.part_data::<T>(ipart)?;
            for (local, &x) in part.view::<D>()?.iter().enumerate() {
                let value = x.to_real();
                if let Some(bounds) = &self.valid_bounds {
                    if !bounds.contains(value, true, true) {
                        continue;
                    }
                }
                let mut coords = map.global_coords(local);
                let icol = coords[mask_pos];
                coords[mask_pos] = self.stat_entry(mask[icol])?;
                let k = ravel_index(&coords[..rank], &stat_strides);
                let w = weights.as_ref().map_or(1.0, |w| w[icol]);
                kahan_update(value * w, &mut out[k], &mut comp[k]);
                if self.bounded {
                    accumulated[k] += w;
                }
            }
        }
        for (s, c) in out.iter_mut().zip(&comp) {
            *s += c;
        }
        let comm = self.base.comm();
        comm.all_reduce_real(out, ReduceOp::Sum)?;

        if !self.average {
            return Ok(());
        }
        if self.bounded {
            comm.all_reduce_real(&mut accumulated, ReduceOp::Sum)?;
            for (s, &w) in out.iter_mut().zip(&accumulated) {
                *s = if w == 0.0 { Real::MAX } else { *s / w };
            }
        } else {
            let integral = self
                .weight_integral
                .as_ref()
                .ok_or_else(|| StatsError::stat(self.base.name(), "weight integral missing"))?
                .stat_field()?
                .to_vec::<Real>()?;
            for (k, s) in out.iter_mut().enumerate() {
                *s /= integral[unravel_index(k, &stat_dims)[mask_pos]];
            }
        }
        Ok(())
    }

    fn stat_entry(&self, mask_value: Int) -> Result<usize> {
        self.mask_val_to_stat_entry
            .get(&mask_value)
            .copied()
            .ok_or_else(|| {
                StatsError::stat(
                    self.base.name(),
                    format!("mask value {mask_value} was not seen when aux fields were bound"),
                )
            })
    }
}

impl FieldStat for FieldMaskedIntegral {
    fn base(&self) -> &StatBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StatBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        if self.bounded {
            "bounded_masked_integral"
        } else {
            "masked_integral"
        }
    }

    fn stat_layout(&self, field_layout: &FieldLayout) -> Result<FieldLayout> {
        let mask = self.mask()?;
        if self.output_mask_field {
            return Ok(mask.layout().clone());
        }
        let nvals = self.mask_val_to_stat_entry.len();
        let pos = field_layout.dim_idx(mask.layout().name(0)?)?;
        field_layout.with_extent(pos, nvals, Some(&format!("dim{nvals}")))
    }

    fn stat_data_type(&self) -> Result<DataType> {
        Ok(DataType::Real)
    }

    fn aux_fields_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if self.mask_file_name.is_some() {
            names.push("col_gids".to_string());
        } else {
            names.push(self.mask_name.clone());
        }
        names.extend(self.weight_name.iter().cloned());
        names
    }

    fn optional_aux_fields_names(&self) -> Vec<String> {
        if self.mask_file_name.is_some() {
            vec![self.mask_name.clone()]
        } else {
            Vec::new()
        }
    }

    fn set_field_impl(&mut self, _field: &Field) -> Result<()> {
        self.mask = None;
        self.weight = None;
        self.weight_integral = None;
        self.mask_val_to_stat_entry.clear();
        Ok(())
    }

    fn set_aux_fields_impl(&mut self) -> Result<()> {
        let ts = self.bind_time();
        let mask = self.acquire_mask()?;
        self.check_mask(&mask)?;
        let single = SinglePart::new(self.base.ctx(), self.base.name(), &mask, &ts)?;
        let mask = single.field.clone();

        self.mask_val_to_stat_entry = self.discover_mask_values(&mask)?;
        info!(
            stat = %self.base.name(),
            mask = %mask.name(),
            values = ?self.mask_values(),
            "mask values discovered"
        );

        if let Some(wname) = self.weight_name.clone() {
            let weight = self.base.aux_field(&wname)?.clone();
            self.check_weight(&weight, &mask)?;
            self.weight = Some(SinglePart::new(self.base.ctx(), self.base.name(), &weight, &ts)?);
        }

        if self.average && !self.bounded {
            let weight = match &self.weight {
                Some(w) => w.field.clone(),
                None => Field::from_vec(
                    &format!("{}_unit_weight", self.base.name()),
                    mask.layout().clone(),
                    vec![1.0 as Real; mask.layout().size()],
                )?,
            };
            let integral = self.build_weight_integral(&mask, &weight)?;
            if self.weight.is_some() {
                let field = integral.stat_field()?;
                self.base.insert_aux_field(field);
            }
            self.weight_integral = Some(integral);
        }

        debug!(stat = %self.base.name(), nvals = self.mask_val_to_stat_entry.len(), "aux fields bound");
        self.mask = Some(single);
        Ok(())
    }

    fn compute_impl(&mut self) -> Result<()> {
        let ts = self
            .base
            .timestamp()
            .copied()
            .ok_or_else(|| StatsError::stat(self.base.name(), "compute called without a time stamp"))?;
        if let Some(mask) = self.mask.as_mut() {
            mask.refresh(&ts)?;
        }
        if self.output_mask_field {
            return self.compute_mask_output();
        }
        if let Some(weight) = self.weight.as_mut() {
            weight.refresh(&ts)?;
        }
        if let Some(integral) = self.weight_integral.as_mut() {
            integral.compute(&ts)?;
        }
        let field = self.base.field()?.clone();
        dispatch_kernel!(self, &field, compute_kernel)
    }
}
