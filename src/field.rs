//! Partitioned, typed, named arrays and their commit protocol
//!
//! A [`Field`] is split along one dimension (`part_dim`) into `nparts`
//! contiguous partitions. Each partition is either a **View** of a buffer the
//! caller keeps alive and may update between steps, or a **Copy** the field
//! owns. Extents and storage are set per partition, then [`Field::commit`]
//! validates the whole and freezes the structure. Committed fields are cheap
//! to clone: clones share storage.

use crate::data_type::{DataType, FieldValue, Int, Real};
use crate::errors::{Result, StatsError};
use crate::layout::FieldLayout;
use crate::statistics::utils::PartitionIndexMap;
use ndarray::{ArrayView, ArrayViewMut, Dimension, IxDyn, ShapeBuilder, Zip};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

/// Storage shared between a field and whoever else holds the same `Arc`
pub type SharedBuffer<T> = Arc<RwLock<Vec<T>>>;

/// Wrap a vector into a shareable buffer
#[must_use]
pub fn shared_buffer<T>(data: Vec<T>) -> SharedBuffer<T> {
    Arc::new(RwLock::new(data))
}

/// Type-tagged storage of one partition
#[derive(Debug, Clone)]
pub enum FieldData {
    Real(SharedBuffer<Real>),
    Int(SharedBuffer<Int>),
}

impl FieldData {
    fn zeros(data_type: DataType, len: usize) -> Option<Self> {
        match data_type {
            DataType::Real => Some(Self::Real(shared_buffer(vec![0.0; len]))),
            DataType::Int => Some(Self::Int(shared_buffer(vec![0; len]))),
            DataType::Invalid => None,
        }
    }

    /// True if both refer to the same underlying storage
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Real(a), Self::Real(b)) => Arc::ptr_eq(a, b),
            (Self::Int(a), Self::Int(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn deep_clone(&self, field: &str) -> Result<Self> {
        let poisoned = || StatsError::LockPoisoned {
            field: field.to_string(),
        };
        Ok(match self {
            Self::Real(b) => Self::Real(shared_buffer(b.read().map_err(|_| poisoned())?.clone())),
            Self::Int(b) => Self::Int(shared_buffer(b.read().map_err(|_| poisoned())?.clone())),
        })
    }
}

/// Ownership mode of a field's partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataAccess {
    /// Caller-owned buffer, shared, never copied
    View,
    /// Field-owned buffer, filled by deep copy
    Copy,
}

#[derive(Debug, Clone, Default)]
struct Partition {
    extent: Option<usize>,
    data: Option<FieldData>,
}

#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    layout: FieldLayout,
    data_type: DataType,
    access: DataAccess,
    part_dim: usize,
    part_dim_alloc_size: Option<usize>,
    parts: Vec<Partition>,
    committed: bool,
    read_only: bool,
}

impl Field {
    /// Create an uncommitted field
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The data type is `Invalid`
    /// - `part_dim` is not a dimension of the layout (must be 0 for scalars)
    /// - `nparts` is zero or larger than the extent along `part_dim`
    pub fn new(
        name: &str,
        layout: FieldLayout,
        nparts: usize,
        part_dim: usize,
        access: DataAccess,
        data_type: DataType,
    ) -> Result<Self> {
        if data_type == DataType::Invalid {
            return Err(StatsError::field(name, "cannot create a field with invalid data type"));
        }
        let part_extent = if layout.rank() == 0 {
            if part_dim != 0 {
                return Err(StatsError::PartitionMismatch {
                    field: name.to_string(),
                    message: format!("scalar field requires part_dim 0, got {part_dim}"),
                });
            }
            1
        } else {
            layout.extent(part_dim).map_err(|_| StatsError::PartitionMismatch {
                field: name.to_string(),
                message: format!("part_dim {part_dim} out of bounds for layout {layout}"),
            })?
        };
        if nparts == 0 || nparts > part_extent {
            return Err(StatsError::PartitionMismatch {
                field: name.to_string(),
                message: format!(
                    "cannot split extent {part_extent} of layout {layout} into {nparts} partitions"
                ),
            });
        }

        let mut parts = vec![Partition::default(); nparts];
        if nparts == 1 {
            parts[0].extent = Some(part_extent);
        }
        Ok(Self {
            name: name.to_string(),
            layout,
            data_type,
            access,
            part_dim,
            part_dim_alloc_size: None,
            parts,
            committed: false,
            read_only: false,
        })
    }

    /// Uncommitted field with a single partition
    pub fn single_part(
        name: &str,
        layout: FieldLayout,
        access: DataAccess,
        data_type: DataType,
    ) -> Result<Self> {
        Self::new(name, layout, 1, 0, access, data_type)
    }

    /// Committed single-partition View field over a fresh buffer
    pub fn from_vec<T: FieldValue>(name: &str, layout: FieldLayout, data: Vec<T>) -> Result<Self> {
        let mut field = Self::single_part(name, layout, DataAccess::View, T::DATA_TYPE)?;
        field.set_part_data(0, shared_buffer(data))?;
        field.commit()?;
        Ok(field)
    }

    /// Committed View field with one buffer per partition
    ///
    /// Each partition's extent along `part_dim` is inferred from its length.
    pub fn from_parts<T: FieldValue>(
        name: &str,
        layout: FieldLayout,
        part_dim: usize,
        parts: Vec<Vec<T>>,
    ) -> Result<Self> {
        let mut field = Self::new(
            name,
            layout.clone(),
            parts.len(),
            part_dim,
            DataAccess::View,
            T::DATA_TYPE,
        )?;
        let slab = if layout.rank() == 0 {
            1
        } else {
            layout.size() / layout.extent(part_dim)?
        };
        for (ipart, data) in parts.into_iter().enumerate() {
            if data.is_empty() || data.len() % slab != 0 {
                return Err(StatsError::PartitionMismatch {
                    field: name.to_string(),
                    message: format!(
                        "partition {ipart} holds {} entries, not a multiple of {slab}",
                        data.len()
                    ),
                });
            }
            field.set_part_extent(ipart, data.len() / slab)?;
            field.set_part_data(ipart, shared_buffer(data))?;
        }
        field.commit()?;
        Ok(field)
    }

    /// Padded allocation size of every partition along `part_dim`
    pub fn with_part_dim_alloc_size(mut self, alloc_size: usize) -> Result<Self> {
        if self.committed {
            return Err(StatsError::field(&self.name, "cannot change allocation size after commit"));
        }
        self.part_dim_alloc_size = Some(alloc_size);
        Ok(self)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renamed handle sharing the same storage
    #[must_use]
    pub fn renamed(&self, name: &str) -> Self {
        let mut field = self.clone();
        field.name = name.to_string();
        field
    }

    pub fn rename(&mut self, name: &str) {
        self.name = name.to_string();
    }

    #[must_use]
    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    #[must_use]
    pub fn data_access(&self) -> DataAccess {
        self.access
    }

    #[must_use]
    pub fn nparts(&self) -> usize {
        self.parts.len()
    }

    #[must_use]
    pub fn part_dim(&self) -> usize {
        self.part_dim
    }

    #[must_use]
    pub fn committed(&self) -> bool {
        self.committed
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Handle sharing storage that refuses mutable access
    #[must_use]
    pub fn read_only(&self) -> Self {
        let mut field = self.clone();
        field.read_only = true;
        field
    }

    fn check_part(&self, ipart: usize) -> Result<()> {
        if ipart >= self.parts.len() {
            return Err(StatsError::field(
                &self.name,
                format!("partition index {ipart} out of bounds (nparts={})", self.parts.len()),
            ));
        }
        Ok(())
    }

    fn check_type<T: FieldValue>(&self) -> Result<()> {
        if T::DATA_TYPE != self.data_type {
            return Err(StatsError::DataTypeMismatch {
                field: self.name.clone(),
                stored: self.data_type.to_string(),
                requested: T::DATA_TYPE.to_string(),
            });
        }
        Ok(())
    }

    fn check_committed(&self) -> Result<()> {
        if !self.committed {
            return Err(StatsError::field(&self.name, "field was not committed yet"));
        }
        Ok(())
    }

    fn check_uncommitted(&self, what: &str) -> Result<()> {
        if self.committed {
            return Err(StatsError::field(
                &self.name,
                format!("cannot {what} after the field was committed"),
            ));
        }
        Ok(())
    }

    pub fn part_extent(&self, ipart: usize) -> Result<usize> {
        self.check_part(ipart)?;
        self.parts[ipart].extent.ok_or_else(|| {
            StatsError::field(&self.name, format!("extent of partition {ipart} was not set"))
        })
    }

    /// Set the extent along `part_dim` of one partition
    ///
    /// Setting it again to the same value is a no-op; changing it is an error.
    pub fn set_part_extent(&mut self, ipart: usize, extent: usize) -> Result<()> {
        self.check_uncommitted("set a partition extent")?;
        self.check_part(ipart)?;
        if extent == 0 {
            return Err(StatsError::PartitionMismatch {
                field: self.name.clone(),
                message: format!("partition {ipart} has zero extent"),
            });
        }
        if let Some(alloc) = self.part_dim_alloc_size {
            if extent > alloc {
                return Err(StatsError::PartitionMismatch {
                    field: self.name.clone(),
                    message: format!(
                        "partition {ipart} extent {extent} exceeds allocation size {alloc}"
                    ),
                });
            }
        }
        match self.parts[ipart].extent {
            Some(current) if current != extent => Err(StatsError::field(
                &self.name,
                format!("extent of partition {ipart} already set to {current}"),
            )),
            _ => {
                self.parts[ipart].extent = Some(extent);
                Ok(())
            }
        }
    }

    /// Local layout of one partition
    pub fn part_layout(&self, ipart: usize) -> Result<FieldLayout> {
        let extent = self.part_extent(ipart)?;
        if self.parts.len() == 1 && self.part_dim_alloc_size.is_none() {
            return Ok(self.layout.clone());
        }
        let mut dims = self.layout.dims().to_vec();
        let mut alloc = self.layout.alloc_dims().to_vec();
        dims[self.part_dim] = extent;
        alloc[self.part_dim] = self.part_dim_alloc_size.unwrap_or(extent);
        FieldLayout::new(&dims, self.layout.names())?.with_alloc_dims(&alloc)
    }

    /// Prefix sum of the extents of the partitions preceding `ipart`
    pub fn part_offset(&self, ipart: usize) -> Result<usize> {
        self.check_part(ipart)?;
        (0..ipart).map(|i| self.part_extent(i)).sum()
    }

    /// Attach a caller-owned buffer to a partition of a View field
    ///
    /// # Errors
    ///
    /// Returns an error if the field is not a View field, is committed, has a
    /// different data type, if the partition already has data or no extent,
    /// or if the buffer is smaller than the partition's allocation.
    pub fn set_part_data<T: FieldValue>(&mut self, ipart: usize, buffer: SharedBuffer<T>) -> Result<()> {
        self.check_uncommitted("set partition data")?;
        if self.access != DataAccess::View {
            return Err(StatsError::field(
                &self.name,
                "set_part_data requires a View field (use copy_part_data)",
            ));
        }
        self.check_type::<T>()?;
        self.check_part(ipart)?;
        if self.parts[ipart].data.is_some() {
            return Err(StatsError::field(
                &self.name,
                format!("data of partition {ipart} was already set"),
            ));
        }
        let needed = self.part_layout(ipart)?.alloc_size();
        let len = buffer
            .read()
            .map_err(|_| StatsError::LockPoisoned {
                field: self.name.clone(),
            })?
            .len();
        if len < needed {
            return Err(StatsError::PartitionMismatch {
                field: self.name.clone(),
                message: format!("partition {ipart} buffer holds {len} entries, needs {needed}"),
            });
        }
        self.parts[ipart].data = Some(T::into_data(buffer));
        Ok(())
    }

    /// Deep copy values into a partition of a Copy field
    ///
    /// Before commit this allocates the partition (once); after commit it
    /// overwrites the partition's values.
    pub fn copy_part_data<T: FieldValue>(&mut self, ipart: usize, data: &[T]) -> Result<()> {
        if self.access != DataAccess::Copy {
            return Err(StatsError::field(
                &self.name,
                "copy_part_data requires a Copy field (use set_part_data)",
            ));
        }
        if self.read_only {
            return Err(StatsError::field(&self.name, "cannot copy data into a read-only field"));
        }
        self.check_type::<T>()?;
        self.check_part(ipart)?;
        let needed = self.part_layout(ipart)?.alloc_size();
        if data.len() < needed {
            return Err(StatsError::PartitionMismatch {
                field: self.name.clone(),
                message: format!(
                    "partition {ipart} given {} entries, needs {needed}",
                    data.len()
                ),
            });
        }
        match &self.parts[ipart].data {
            Some(_) if !self.committed => Err(StatsError::field(
                &self.name,
                format!("data of partition {ipart} was already set"),
            )),
            Some(existing) => {
                let buffer = T::buffer(existing).ok_or_else(|| StatsError::DataTypeMismatch {
                    field: self.name.clone(),
                    stored: self.data_type.to_string(),
                    requested: T::DATA_TYPE.to_string(),
                })?;
                let mut guard = buffer.write().map_err(|_| StatsError::LockPoisoned {
                    field: self.name.clone(),
                })?;
                guard[..needed].copy_from_slice(&data[..needed]);
                Ok(())
            }
            None => {
                self.parts[ipart].data = Some(T::into_data(shared_buffer(data[..needed].to_vec())));
                Ok(())
            }
        }
    }

    /// Single-partition shorthand for [`Field::set_part_data`]
    pub fn set_data<T: FieldValue>(&mut self, buffer: SharedBuffer<T>) -> Result<()> {
        self.require_single_part()?;
        self.set_part_data(0, buffer)
    }

    /// Single-partition shorthand for [`Field::copy_part_data`]
    pub fn copy_data<T: FieldValue>(&mut self, data: &[T]) -> Result<()> {
        self.require_single_part()?;
        self.copy_part_data(0, data)
    }

    fn require_single_part(&self) -> Result<()> {
        if self.parts.len() != 1 {
            return Err(StatsError::field(
                &self.name,
                format!(
                    "whole-field access requires a single partition (nparts={})",
                    self.parts.len()
                ),
            ));
        }
        Ok(())
    }

    /// Validate partitions and freeze the field's structure
    ///
    /// Copy fields get zero-initialised storage for partitions that have none.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is already committed, a partition lacks
    /// an extent or data, the extents do not add up to the layout extent along
    /// `part_dim`, or two partitions alias the same storage.
    pub fn commit(&mut self) -> Result<()> {
        self.check_uncommitted("commit")?;

        if self.access == DataAccess::Copy {
            for ipart in 0..self.parts.len() {
                if self.parts[ipart].data.is_none() && self.parts[ipart].extent.is_some() {
                    let len = self.part_layout(ipart)?.alloc_size();
                    self.parts[ipart].data = FieldData::zeros(self.data_type, len);
                }
            }
        }

        let mut total = 0;
        for (ipart, part) in self.parts.iter().enumerate() {
            let extent = part.extent.ok_or_else(|| StatsError::PartitionMismatch {
                field: self.name.clone(),
                message: format!("extent of partition {ipart} was not set"),
            })?;
            if part.data.is_none() {
                return Err(StatsError::PartitionMismatch {
                    field: self.name.clone(),
                    message: format!("data of partition {ipart} was not set"),
                });
            }
            total += extent;
        }
        let expected = if self.layout.rank() == 0 {
            1
        } else {
            self.layout.extent(self.part_dim)?
        };
        if total != expected {
            return Err(StatsError::PartitionMismatch {
                field: self.name.clone(),
                message: format!(
                    "partition extents add up to {total}, layout extent along dim {} is {expected}",
                    self.part_dim
                ),
            });
        }

        for first in 0..self.parts.len() {
            for second in first + 1..self.parts.len() {
                if let (Some(a), Some(b)) = (&self.parts[first].data, &self.parts[second].data) {
                    if a.ptr_eq(b) {
                        return Err(StatsError::AliasedPartitions {
                            field: self.name.clone(),
                            first,
                            second,
                        });
                    }
                }
            }
        }

        self.committed = true;
        trace!(field = %self.name, layout = %self.layout, nparts = self.parts.len(), "field committed");
        Ok(())
    }

    fn storage<T: FieldValue>(&self, ipart: usize) -> Result<&SharedBuffer<T>> {
        self.check_committed()?;
        self.check_part(ipart)?;
        self.check_type::<T>()?;
        let data = self.parts[ipart].data.as_ref().ok_or_else(|| {
            StatsError::field(&self.name, format!("data of partition {ipart} was not set"))
        })?;
        T::buffer(data).ok_or_else(|| StatsError::DataTypeMismatch {
            field: self.name.clone(),
            stored: self.data_type.to_string(),
            requested: T::DATA_TYPE.to_string(),
        })
    }

    /// Shared handle to a partition's buffer
    pub fn part_buffer<T: FieldValue>(&self, ipart: usize) -> Result<SharedBuffer<T>> {
        self.storage::<T>(ipart).map(Arc::clone)
    }

    /// Read access to one partition
    pub fn part_data<T: FieldValue>(&self, ipart: usize) -> Result<PartRef<'_, T>> {
        let buffer = self.storage::<T>(ipart)?;
        let guard = buffer.read().map_err(|_| StatsError::LockPoisoned {
            field: self.name.clone(),
        })?;
        Ok(PartRef {
            layout: self.part_layout(ipart)?,
            guard,
        })
    }

    /// Read access to the only partition
    pub fn data<T: FieldValue>(&self) -> Result<PartRef<'_, T>> {
        self.require_single_part()?;
        self.part_data(0)
    }

    /// Write access to one partition
    pub fn part_data_mut<T: FieldValue>(&self, ipart: usize) -> Result<PartMut<'_, T>> {
        if self.read_only {
            return Err(StatsError::field(&self.name, "cannot write to a read-only field"));
        }
        let buffer = self.storage::<T>(ipart)?;
        let guard = buffer.write().map_err(|_| StatsError::LockPoisoned {
            field: self.name.clone(),
        })?;
        Ok(PartMut {
            layout: self.part_layout(ipart)?,
            guard,
        })
    }

    /// Write access to the only partition
    pub fn data_mut<T: FieldValue>(&self) -> Result<PartMut<'_, T>> {
        self.require_single_part()?;
        self.part_data_mut(0)
    }

    /// Logical values of the whole field in row-major order, partitions reassembled
    pub fn to_vec<T: FieldValue>(&self) -> Result<Vec<T>> {
        self.check_committed()?;
        let mut out = vec![T::zero(); self.layout.size()];
        for ipart in 0..self.nparts() {
            let map = PartitionIndexMap::new(self, ipart, self.layout.dims())?;
            let part = self.part_data::<T>(ipart)?;
            for (local, &value) in part.view_dyn()?.iter().enumerate() {
                out[map.global_index(local)] = value;
            }
        }
        Ok(out)
    }

    /// Independent deep copy with Copy ownership
    pub fn deep_clone(&self) -> Result<Self> {
        let mut field = self.clone();
        field.access = DataAccess::Copy;
        field.read_only = false;
        for part in &mut field.parts {
            if let Some(data) = &part.data {
                part.data = Some(data.deep_clone(&self.name)?);
            }
        }
        Ok(field)
    }

    /// Element-wise overwrite from a field with identical layout and type
    ///
    /// The two fields may be partitioned differently.
    pub fn deep_copy(&self, src: &Field) -> Result<()> {
        self.check_same_shape(src)?;
        if self.shares_storage_with(src) {
            return Ok(());
        }
        match self.data_type {
            DataType::Real => self.scatter(&src.to_vec::<Real>()?),
            DataType::Int => self.scatter(&src.to_vec::<Int>()?),
            DataType::Invalid => Err(StatsError::field(&self.name, "invalid data type")),
        }
    }

    /// Set every entry to `value`
    pub fn deep_copy_value<T: FieldValue>(&self, value: T) -> Result<()> {
        for ipart in 0..self.nparts() {
            let mut part = self.part_data_mut::<T>(ipart)?;
            part.view_mut_dyn()?.fill(value);
        }
        Ok(())
    }

    /// `self = beta * self + alpha * x`, entry by entry
    pub fn update<T: FieldValue>(&self, x: &Field, alpha: T, beta: T) -> Result<()> {
        self.check_same_shape(x)?;
        if self.shares_storage_with(x) {
            return self.scale(alpha + beta);
        }
        let xs = x.to_vec::<T>()?;
        for ipart in 0..self.nparts() {
            let map = PartitionIndexMap::new(self, ipart, self.layout.dims())?;
            let mut part = self.part_data_mut::<T>(ipart)?;
            for (local, y) in part.view_mut_dyn()?.iter_mut().enumerate() {
                *y = beta * *y + alpha * xs[map.global_index(local)];
            }
        }
        Ok(())
    }

    pub fn scale<T: FieldValue>(&self, beta: T) -> Result<()> {
        for ipart in 0..self.nparts() {
            let mut part = self.part_data_mut::<T>(ipart)?;
            let mut view = part.view_mut_dyn()?;
            Zip::from(&mut view).for_each(|y| *y = *y * beta);
        }
        Ok(())
    }

    fn scatter<T: FieldValue>(&self, values: &[T]) -> Result<()> {
        for ipart in 0..self.nparts() {
            let map = PartitionIndexMap::new(self, ipart, self.layout.dims())?;
            let mut part = self.part_data_mut::<T>(ipart)?;
            for (local, y) in part.view_mut_dyn()?.iter_mut().enumerate() {
                *y = values[map.global_index(local)];
            }
        }
        Ok(())
    }

    fn check_same_shape(&self, other: &Field) -> Result<()> {
        if self.layout != other.layout {
            return Err(StatsError::field(
                &self.name,
                format!(
                    "layout {} differs from layout {} of field '{}'",
                    self.layout, other.layout, other.name
                ),
            ));
        }
        if self.data_type != other.data_type {
            return Err(StatsError::DataTypeMismatch {
                field: other.name.clone(),
                stored: other.data_type.to_string(),
                requested: self.data_type.to_string(),
            });
        }
        self.check_committed()?;
        other.check_committed()
    }

    /// True when every partition is the very buffer `other` holds at the
    /// same index, over the same extent
    fn shares_storage_with(&self, other: &Field) -> bool {
        self.part_dim == other.part_dim
            && self.parts.len() == other.parts.len()
            && self.parts.iter().zip(&other.parts).all(|(a, b)| {
                a.extent == b.extent
                    && match (&a.data, &b.data) {
                        (Some(a), Some(b)) => a.ptr_eq(b),
                        _ => false,
                    }
            })
    }
}

fn array_view<'a, T, D: Dimension>(layout: &FieldLayout, data: &'a [T]) -> Result<ArrayView<'a, T, D>> {
    let shape = IxDyn(layout.dims()).strides(IxDyn(&layout.strides()));
    let view = ArrayView::from_shape(shape, &data[..layout.alloc_size()])?;
    Ok(view.into_dimensionality::<D>()?)
}

fn array_view_mut<'a, T, D: Dimension>(
    layout: &FieldLayout,
    data: &'a mut [T],
) -> Result<ArrayViewMut<'a, T, D>> {
    let shape = IxDyn(layout.dims()).strides(IxDyn(&layout.strides()));
    let view = ArrayViewMut::from_shape(shape, &mut data[..layout.alloc_size()])?;
    Ok(view.into_dimensionality::<D>()?)
}

/// Read guard over one partition
pub struct PartRef<'a, T> {
    layout: FieldLayout,
    guard: RwLockReadGuard<'a, Vec<T>>,
}

impl<T> PartRef<'_, T> {
    /// Local layout of the partition
    #[must_use]
    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    /// Raw storage, padding included
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.guard[..self.layout.alloc_size()]
    }

    /// Typed n-d view honouring the allocation strides
    pub fn view<D: Dimension>(&self) -> Result<ArrayView<'_, T, D>> {
        array_view(&self.layout, &self.guard)
    }

    pub fn view_dyn(&self) -> Result<ArrayView<'_, T, IxDyn>> {
        self.view::<IxDyn>()
    }
}

/// Write guard over one partition
pub struct PartMut<'a, T> {
    layout: FieldLayout,
    guard: RwLockWriteGuard<'a, Vec<T>>,
}

impl<T> PartMut<'_, T> {
    #[must_use]
    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.guard[..self.layout.alloc_size()]
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.layout.alloc_size();
        &mut self.guard[..len]
    }

    pub fn view_mut<D: Dimension>(&mut self) -> Result<ArrayViewMut<'_, T, D>> {
        array_view_mut(&self.layout, &mut self.guard)
    }

    pub fn view_mut_dyn(&mut self) -> Result<ArrayViewMut<'_, T, IxDyn>> {
        self.view_mut::<IxDyn>()
    }
}
