//! Closed value windows used for validity checks and geographic/vertical windowing

use crate::errors::{Result, StatsError};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy + fmt::Display> Bounds<T> {
    /// # Errors
    ///
    /// Returns an error if `min > max`.
    pub fn new(min: T, max: T) -> Result<Self> {
        if min > max {
            return Err(StatsError::InvalidParameter {
                list: "bounds".to_string(),
                param: format!("[{min}, {max}]"),
                message: "lower bound exceeds upper bound".to_string(),
            });
        }
        Ok(Self { min, max })
    }

    /// Build from a two-entry list, as found in configuration files
    pub fn from_slice(values: &[T]) -> Result<Self> {
        match values {
            [min, max] => Self::new(*min, *max),
            _ => Err(StatsError::InvalidParameter {
                list: "bounds".to_string(),
                param: format!("{} values", values.len()),
                message: "expected exactly two values [min, max]".to_string(),
            }),
        }
    }

    #[must_use]
    pub fn contains(&self, value: T, inclusive_lo: bool, inclusive_hi: bool) -> bool {
        let above = if inclusive_lo {
            value >= self.min
        } else {
            value > self.min
        };
        let below = if inclusive_hi {
            value <= self.max
        } else {
            value < self.max
        };
        above && below
    }
}

impl<T: fmt::Display> fmt::Display for Bounds<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}
