//! Name-keyed registry of stat constructors
//!
//! The registry is an explicit object built once (usually with
//! [`StatFactory::with_builtin_stats`]) and shared through [`StatContext`],
//! so stats can build helper stats by name. Registering a name again
//! replaces the previous constructor.

use crate::errors::{Result, StatsError};
use crate::params::ParameterList;
use crate::statistics::along_axis::FieldStatAlongAxis;
use crate::statistics::bounded::{FieldBounded, FieldBoundingBox};
use crate::statistics::global::FieldGlobalStat;
use crate::statistics::identity::FieldIdentity;
use crate::statistics::masked_integral::FieldMaskedIntegral;
use crate::statistics::operations::StatOperation;
use crate::statistics::pipe::FieldStatPipe;
use crate::statistics::stat::{FieldStat, StatContext};
use crate::statistics::vertical_contraction::FieldVerticalContraction;
use crate::statistics::zonal_mean::FieldZonalMean;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

/// Constructor stored in the registry
pub type StatCreator = fn(&StatContext, &ParameterList) -> Result<Box<dyn FieldStat>>;

/// Stats constructible from a context and their parameters alone
pub trait BuildStat: FieldStat + Sized + 'static {
    fn build(ctx: &StatContext, params: &ParameterList) -> Result<Self>;
}

/// Generic [`StatCreator`] for any [`BuildStat`]
pub fn create_stat<S: BuildStat>(ctx: &StatContext, params: &ParameterList) -> Result<Box<dyn FieldStat>> {
    Ok(Box::new(S::build(ctx, params)?))
}

fn boxed<S: FieldStat + 'static>(stat: Result<S>) -> Result<Box<dyn FieldStat>> {
    Ok(Box::new(stat?))
}

#[derive(Default, Clone)]
pub struct StatFactory {
    creators: HashMap<String, StatCreator>,
}

impl fmt::Debug for StatFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatFactory")
            .field("registered", &self.registered_names())
            .finish()
    }
}

impl StatFactory {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every stat this crate provides
    #[must_use]
    pub fn with_builtin_stats() -> Self {
        let mut factory = Self::new();
        factory.register_builtin_stats();
        factory
    }

    pub fn register_builtin_stats(&mut self) {
        self.register("global_max", |ctx, pl| {
            boxed(FieldGlobalStat::new(ctx, pl, StatOperation::Max))
        });
        self.register("global_min", |ctx, pl| {
            boxed(FieldGlobalStat::new(ctx, pl, StatOperation::Min))
        });
        self.register("global_sum", |ctx, pl| {
            boxed(FieldGlobalStat::new(ctx, pl, StatOperation::Sum))
        });
        self.register("global_avg", |ctx, pl| {
            boxed(FieldGlobalStat::new(ctx, pl, StatOperation::Mean))
        });
        self.register("max_along_columns", |ctx, pl| {
            boxed(FieldStatAlongAxis::new(ctx, pl, StatOperation::Max))
        });
        self.register("min_along_columns", |ctx, pl| {
            boxed(FieldStatAlongAxis::new(ctx, pl, StatOperation::Min))
        });
        self.register("sum_along_columns", |ctx, pl| {
            boxed(FieldStatAlongAxis::new(ctx, pl, StatOperation::Sum))
        });
        self.register("avg_along_columns", |ctx, pl| {
            boxed(FieldStatAlongAxis::new(ctx, pl, StatOperation::Mean))
        });
        self.register("identity", create_stat::<FieldIdentity>);
        self.register("bounded", create_stat::<FieldBounded>);
        self.register("bounding_box", create_stat::<FieldBoundingBox>);
        self.register("zonal_mean", create_stat::<FieldZonalMean>);
        self.register("masked_integral", |ctx, pl| {
            boxed(FieldMaskedIntegral::new(ctx, pl, false))
        });
        self.register("bounded_masked_integral", |ctx, pl| {
            boxed(FieldMaskedIntegral::new(ctx, pl, true))
        });
        self.register("vertical_contraction", create_stat::<FieldVerticalContraction>);
        self.register("pipe", create_stat::<FieldStatPipe>);
        debug!(count = self.creators.len(), "registered built-in stats");
    }

    /// Register `creator` under `name`, replacing any previous registration
    pub fn register(&mut self, name: &str, creator: StatCreator) {
        if self.creators.insert(name.to_string(), creator).is_some() {
            info!(stat_type = name, "stat constructor overridden");
        }
    }

    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.creators.contains_key(name)
    }

    /// Registered names, sorted
    #[must_use]
    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.creators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build a stat of type `stat_type`
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::UnknownStatType`] if nothing is registered under
    /// `stat_type`, or the constructor's own error.
    pub fn create(
        &self,
        stat_type: &str,
        ctx: &StatContext,
        params: &ParameterList,
    ) -> Result<Box<dyn FieldStat>> {
        let creator = self
            .creators
            .get(stat_type)
            .ok_or_else(|| StatsError::UnknownStatType {
                stat_type: stat_type.to_string(),
            })?;
        let stat = creator(ctx, params)?;
        debug!(stat = %stat.name(), stat_type, "stat created");
        Ok(stat)
    }
}
