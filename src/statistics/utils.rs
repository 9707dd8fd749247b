//! Shared kernel helpers: index mapping across partitions, compensated
//! summation and rank/type dispatch

use crate::errors::Result;
use crate::field::Field;
use crate::layout::{FieldLayout, MAX_RANK};
use ndarray::{ArrayViewMut, Axis, Dimension, Slice};
use num_traits::Num;
use std::ops::Range;

/// Row-major strides of a layout with extents `dims`
///
/// Walks from the fastest to the slowest dimension,
/// `stride[axis] = stride[axis + 1] * dims[axis + 1]`.
#[must_use]
pub fn compute_stat_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; dims.len()];
    for axis in (0..dims.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * dims[axis + 1];
    }
    strides
}

/// Global row-major index of entry `part_index` of a partition
///
/// The local index is decomposed using the partition's own extents
/// (`part_dims`), the coordinate along `part_dim` is shifted by the
/// partition's offset, and the result is re-linearized with the strides of
/// the unpartitioned output.
#[must_use]
pub fn compute_stat_index(
    part_offset: usize,
    part_index: usize,
    part_dim: usize,
    part_dims: &[usize],
    stat_strides: &[usize],
) -> usize {
    let mut work = part_index;
    let mut stat_index = 0;
    for axis in (0..part_dims.len()).rev() {
        let mut coord = work % part_dims[axis];
        if axis == part_dim {
            coord += part_offset;
        }
        stat_index += coord * stat_strides[axis];
        work /= part_dims[axis];
    }
    stat_index
}

/// Coordinate along `dim` of row-major entry `index` of a layout with extents `dims`
#[must_use]
pub fn compute_field_dim_index(index: usize, dim: usize, dims: &[usize]) -> usize {
    let mut work = index;
    for axis in (dim + 1..dims.len()).rev() {
        work /= dims[axis];
    }
    work % dims[dim]
}

/// All coordinates of row-major entry `index`
#[must_use]
pub fn unravel_index(index: usize, dims: &[usize]) -> [usize; MAX_RANK] {
    let mut coords = [0; MAX_RANK];
    let mut work = index;
    for axis in (0..dims.len()).rev() {
        coords[axis] = work % dims[axis];
        work /= dims[axis];
    }
    coords
}

#[must_use]
pub fn ravel_index(coords: &[usize], strides: &[usize]) -> usize {
    coords.iter().zip(strides).map(|(c, s)| c * s).sum()
}

/// Precomputed [`compute_stat_index`] for one partition of a field
#[derive(Debug, Clone)]
pub struct PartitionIndexMap {
    offset: usize,
    part_dim: usize,
    part_dims: Vec<usize>,
    stat_strides: Vec<usize>,
}

impl PartitionIndexMap {
    /// Map partition `ipart` of `field` into a row-major output with extents `stat_dims`
    pub fn new(field: &Field, ipart: usize, stat_dims: &[usize]) -> Result<Self> {
        Ok(Self {
            offset: field.part_offset(ipart)?,
            part_dim: field.part_dim(),
            part_dims: field.part_layout(ipart)?.dims().to_vec(),
            stat_strides: compute_stat_strides(stat_dims),
        })
    }

    #[must_use]
    pub fn global_index(&self, part_index: usize) -> usize {
        compute_stat_index(
            self.offset,
            part_index,
            self.part_dim,
            &self.part_dims,
            &self.stat_strides,
        )
    }

    /// Unpartitioned coordinates of a local entry
    #[must_use]
    pub fn global_coords(&self, part_index: usize) -> [usize; MAX_RANK] {
        let mut coords = unravel_index(part_index, &self.part_dims);
        if !self.part_dims.is_empty() {
            coords[self.part_dim] += self.offset;
        }
        coords
    }

    /// Local extents of the partition
    #[must_use]
    pub fn part_dims(&self) -> &[usize] {
        &self.part_dims
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

fn magnitude<T: Num + PartialOrd + Copy>(x: T) -> T {
    if x < T::zero() {
        T::zero() - x
    } else {
        x
    }
}

/// One step of Kahan-Babuska-Neumaier summation
///
/// The running total is `sum + compensation`; callers fold the compensation
/// in once accumulation is over.
#[inline]
pub fn kahan_update<T: Num + PartialOrd + Copy>(value: T, sum: &mut T, compensation: &mut T) {
    let total = *sum + value;
    if magnitude(*sum) >= magnitude(value) {
        *compensation = *compensation + ((*sum - total) + value);
    } else {
        *compensation = *compensation + ((value - total) + *sum);
    }
    *sum = total;
}

/// Scalar compensated accumulator
#[derive(Debug, Clone, Copy, Default)]
pub struct KahanSum<T> {
    sum: T,
    compensation: T,
}

impl<T: Num + PartialOrd + Copy> KahanSum<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sum: T::zero(),
            compensation: T::zero(),
        }
    }

    pub fn add(&mut self, value: T) {
        kahan_update(value, &mut self.sum, &mut self.compensation);
    }

    #[must_use]
    pub fn value(&self) -> T {
        self.sum + self.compensation
    }
}

impl<T: Num + PartialOrd + Copy> FromIterator<T> for KahanSum<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut acc = Self::new();
        for v in iter {
            acc.add(v);
        }
        acc
    }
}

/// Call `$stat.$kernel::<T, D>()` for the data type and rank of `$field`
///
/// Ranks 1 to 3 of `Real` and `Int` fields are supported; anything else is a
/// configuration error naming the stat and the field.
macro_rules! dispatch_kernel {
    ($stat:ident, $field:expr, $kernel:ident) => {{
        use $crate::data_type::{DataType, Int, Real};
        use $crate::errors::StatsError;
        let field: &$crate::field::Field = $field;
        match (field.data_type(), field.layout().rank()) {
            (DataType::Real, 1) => $stat.$kernel::<Real, ndarray::Ix1>(),
            (DataType::Real, 2) => $stat.$kernel::<Real, ndarray::Ix2>(),
            (DataType::Real, 3) => $stat.$kernel::<Real, ndarray::Ix3>(),
            (DataType::Int, 1) => $stat.$kernel::<Int, ndarray::Ix1>(),
            (DataType::Int, 2) => $stat.$kernel::<Int, ndarray::Ix2>(),
            (DataType::Int, 3) => $stat.$kernel::<Int, ndarray::Ix3>(),
            (DataType::Real | DataType::Int, rank) => Err(StatsError::UnsupportedRank {
                stat: $crate::statistics::FieldStat::name(&*$stat).to_string(),
                field: field.name().to_string(),
                rank,
            }),
            (data_type, _) => Err(StatsError::UnsupportedDataType {
                stat: $crate::statistics::FieldStat::name(&*$stat).to_string(),
                field: field.name().to_string(),
                data_type: data_type.to_string(),
            }),
        }
    }};
}

pub(crate) use dispatch_kernel;

/// Where partition `ipart` lands in an output that lost axis `removed_axis`
///
/// Returns `None` when the field is partitioned along the removed axis (every
/// partition then contributes to the whole output), otherwise the output axis
/// that carries the partition and the range the partition covers along it.
pub fn stripped_partition_range(
    field: &Field,
    ipart: usize,
    removed_axis: usize,
) -> Result<Option<(usize, Range<usize>)>> {
    if field.nparts() == 1 || field.part_dim() == removed_axis {
        return Ok(None);
    }
    let offset = field.part_offset(ipart)?;
    let extent = field.part_extent(ipart)?;
    let stat_axis = if field.part_dim() > removed_axis {
        field.part_dim() - 1
    } else {
        field.part_dim()
    };
    Ok(Some((stat_axis, offset..offset + extent)))
}

/// Portion of a full-size output fed by partition `ipart` of `field`
pub fn part_target<'a, T, D: Dimension>(
    out: &'a mut ArrayViewMut<'_, T, D>,
    field: &Field,
    ipart: usize,
    removed_axis: usize,
) -> Result<ArrayViewMut<'a, T, D>> {
    Ok(match stripped_partition_range(field, ipart, removed_axis)? {
        Some((stat_axis, range)) => out.slice_axis_mut(Axis(stat_axis), Slice::from(range)),
        None => out.view_mut(),
    })
}

/// Position of the vertical dimension (`lev` or `ilev`), if any
#[must_use]
pub fn find_level_dim(layout: &FieldLayout) -> Option<usize> {
    ["lev", "ilev"]
        .iter()
        .find_map(|name| layout.dim_idx(name).ok())
}
