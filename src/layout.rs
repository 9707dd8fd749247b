//! Named shape descriptor of a field
//!
//! A [`FieldLayout`] is an ordered list of `(name, extent)` pairs of rank 0 to 3.
//! An optional set of allocation extents describes padded storage; it only
//! affects strides, never iteration bounds.

use crate::errors::{Result, StatsError};
use std::fmt;

/// Highest rank supported by the stat kernels
pub const MAX_RANK: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct FieldLayout {
    dims: Vec<usize>,
    names: Vec<String>,
    alloc_dims: Option<Vec<usize>>,
}

impl FieldLayout {
    /// Create a layout from extents and matching dimension names
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The number of names differs from the number of extents
    /// - The rank exceeds [`MAX_RANK`]
    /// - An extent is zero or a name is repeated
    pub fn new<S: AsRef<str>>(dims: &[usize], names: &[S]) -> Result<Self> {
        if dims.len() != names.len() {
            return Err(StatsError::InvalidLayout {
                message: format!(
                    "{} extents given with {} dimension names",
                    dims.len(),
                    names.len()
                ),
            });
        }
        if dims.len() > MAX_RANK {
            return Err(StatsError::InvalidLayout {
                message: format!("rank {} exceeds the maximum rank {MAX_RANK}", dims.len()),
            });
        }
        let names: Vec<String> = names.iter().map(|n| n.as_ref().to_string()).collect();
        for (i, (&extent, name)) in dims.iter().zip(&names).enumerate() {
            if extent == 0 {
                return Err(StatsError::InvalidLayout {
                    message: format!("dimension '{name}' has zero extent"),
                });
            }
            if names[..i].contains(name) {
                return Err(StatsError::InvalidLayout {
                    message: format!("dimension name '{name}' appears more than once"),
                });
            }
        }
        Ok(Self {
            dims: dims.to_vec(),
            names,
            alloc_dims: None,
        })
    }

    /// The rank-0 layout of a scalar
    #[must_use]
    pub fn scalar() -> Self {
        Self::default()
    }

    /// Attach padded allocation extents (each at least the logical extent)
    pub fn with_alloc_dims(mut self, alloc_dims: &[usize]) -> Result<Self> {
        if alloc_dims.len() != self.dims.len() {
            return Err(StatsError::InvalidLayout {
                message: format!(
                    "{} allocation extents given for a rank {} layout",
                    alloc_dims.len(),
                    self.rank()
                ),
            });
        }
        if let Some((i, _)) = alloc_dims
            .iter()
            .zip(&self.dims)
            .enumerate()
            .find(|(_, (a, d))| a < d)
        {
            return Err(StatsError::InvalidLayout {
                message: format!(
                    "allocation extent {} of dimension '{}' is smaller than its extent {}",
                    alloc_dims[i], self.names[i], self.dims[i]
                ),
            });
        }
        self.alloc_dims = if alloc_dims == self.dims.as_slice() {
            None
        } else {
            Some(alloc_dims.to_vec())
        };
        Ok(self)
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Allocation extents (equal to the logical extents when unpadded)
    #[must_use]
    pub fn alloc_dims(&self) -> &[usize] {
        self.alloc_dims.as_deref().unwrap_or(&self.dims)
    }

    #[must_use]
    pub fn is_padded(&self) -> bool {
        self.alloc_dims.is_some()
    }

    /// Number of logical entries
    #[must_use]
    pub fn size(&self) -> usize {
        self.dims.iter().product()
    }

    /// Number of entries in padded storage
    #[must_use]
    pub fn alloc_size(&self) -> usize {
        self.alloc_dims().iter().product()
    }

    /// Row-major strides of the (possibly padded) storage
    #[must_use]
    pub fn strides(&self) -> Vec<usize> {
        crate::statistics::utils::compute_stat_strides(self.alloc_dims())
    }

    pub fn extent(&self, idim: usize) -> Result<usize> {
        self.dims.get(idim).copied().ok_or_else(|| StatsError::InvalidLayout {
            message: format!("dimension index {idim} out of bounds for layout {self}"),
        })
    }

    pub fn name(&self, idim: usize) -> Result<&str> {
        self.names
            .get(idim)
            .map(String::as_str)
            .ok_or_else(|| StatsError::InvalidLayout {
                message: format!("dimension index {idim} out of bounds for layout {self}"),
            })
    }

    /// Position of a dimension by name
    ///
    /// # Errors
    ///
    /// Fails if the name is absent or appears more than once.
    pub fn dim_idx(&self, name: &str) -> Result<usize> {
        let mut found = self.names.iter().enumerate().filter(|(_, n)| *n == name);
        match (found.next(), found.next()) {
            (Some((idx, _)), None) => Ok(idx),
            _ => Err(StatsError::DimensionNotFound {
                dim: name.to_string(),
                layout: self.to_string(),
            }),
        }
    }

    #[must_use]
    pub fn has_dim(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn extent_of(&self, name: &str) -> Result<usize> {
        Ok(self.dims[self.dim_idx(name)?])
    }

    /// Layout with the named dimension removed
    pub fn strip_dim(&self, name: &str) -> Result<Self> {
        self.strip_dim_at(self.dim_idx(name)?)
    }

    pub fn strip_dim_at(&self, idim: usize) -> Result<Self> {
        self.extent(idim)?;
        let mut stripped = self.clone();
        stripped.dims.remove(idim);
        stripped.names.remove(idim);
        if let Some(alloc) = stripped.alloc_dims.as_mut() {
            alloc.remove(idim);
        }
        Ok(stripped)
    }

    /// Layout with dimension `idim` resized to `extent` (and renamed, if a name is given)
    pub fn with_extent(&self, idim: usize, extent: usize, name: Option<&str>) -> Result<Self> {
        self.extent(idim)?;
        let mut names = self.names.clone();
        if let Some(name) = name {
            names[idim] = name.to_string();
        }
        let mut dims = self.dims.clone();
        dims[idim] = extent;
        Self::new(&dims, &names)
    }
}

impl PartialEq for FieldLayout {
    fn eq(&self, other: &Self) -> bool {
        self.dims == other.dims && self.names == other.names
    }
}

impl Eq for FieldLayout {}

impl fmt::Display for FieldLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.dims.iter().map(ToString::to_string).collect();
        write!(f, "<{}> ({})", self.names.join(","), dims.join(","))
    }
}
