//! The [`FieldStat`] contract and the state every stat carries
//!
//! A stat moves through *configured* -> *field bound* -> *aux fields bound*
//! (when it declares any) -> *output allocated* -> *computed*. The provided
//! methods of the trait enforce that order; concrete stats only fill in the
//! `*_impl` hooks, the output layout and the kernel.

use crate::comm::{Comm, SerialComm};
use crate::data_type::DataType;
use crate::errors::{Result, StatsError};
use crate::field::{DataAccess, Field};
use crate::layout::FieldLayout;
use crate::params::ParameterList;
use crate::statistics::factory::StatFactory;
use crate::statistics::masked_integral::MaskReader;
use crate::time_stamp::TimeStamp;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Everything a stat constructor may need besides its own parameters
///
/// Carries the communicator, the registry (so stats can build helper stats)
/// and the optional reader used to load masks from reference files.
#[derive(Clone)]
pub struct StatContext {
    comm: Arc<dyn Comm>,
    factory: Arc<StatFactory>,
    mask_reader: Option<Arc<dyn MaskReader>>,
}

impl StatContext {
    #[must_use]
    pub fn new(comm: Arc<dyn Comm>, factory: Arc<StatFactory>) -> Self {
        Self {
            comm,
            factory,
            mask_reader: None,
        }
    }

    /// Single-rank context with every built-in stat registered
    #[must_use]
    pub fn serial() -> Self {
        Self::new(Arc::new(SerialComm), Arc::new(StatFactory::with_builtin_stats()))
    }

    #[must_use]
    pub fn with_mask_reader(mut self, reader: Arc<dyn MaskReader>) -> Self {
        self.mask_reader = Some(reader);
        self
    }

    #[must_use]
    pub fn comm(&self) -> &dyn Comm {
        self.comm.as_ref()
    }

    #[must_use]
    pub fn factory(&self) -> &StatFactory {
        &self.factory
    }

    #[must_use]
    pub fn mask_reader(&self) -> Option<&dyn MaskReader> {
        self.mask_reader.as_deref()
    }

    /// Build a stat through the registry
    pub fn create_stat(&self, stat_type: &str, params: &ParameterList) -> Result<Box<dyn FieldStat>> {
        self.factory.create(stat_type, self, params)
    }
}

impl fmt::Debug for StatContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatContext")
            .field("rank", &self.comm.rank())
            .field("size", &self.comm.size())
            .field("has_mask_reader", &self.mask_reader.is_some())
            .finish()
    }
}

/// State shared by every stat implementation
#[derive(Debug)]
pub struct StatBase {
    name: String,
    params: ParameterList,
    ctx: StatContext,
    timestamp: Option<TimeStamp>,
    field: Option<Field>,
    stat_field: Option<Field>,
    aux_fields: BTreeMap<String, Field>,
    aux_fields_set: bool,
}

impl StatBase {
    /// The stat is named by the `name` parameter, or after its parameter list
    pub fn new(ctx: &StatContext, params: &ParameterList) -> Result<Self> {
        let name = params.get_or("name", params.name().to_string())?;
        Ok(Self {
            name,
            params: params.clone(),
            ctx: ctx.clone(),
            timestamp: None,
            field: None,
            stat_field: None,
            aux_fields: BTreeMap::new(),
            aux_fields_set: false,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn params(&self) -> &ParameterList {
        &self.params
    }

    #[must_use]
    pub fn ctx(&self) -> &StatContext {
        &self.ctx
    }

    #[must_use]
    pub fn comm(&self) -> &dyn Comm {
        self.ctx.comm()
    }

    /// Time stamp of the last `compute`
    #[must_use]
    pub fn timestamp(&self) -> Option<&TimeStamp> {
        self.timestamp.as_ref()
    }

    /// The bound input field
    pub fn field(&self) -> Result<&Field> {
        self.field
            .as_ref()
            .ok_or_else(|| StatsError::stat(&self.name, "input field was not set"))
    }

    /// The allocated output field
    pub fn stat_field(&self) -> Result<&Field> {
        self.stat_field
            .as_ref()
            .ok_or_else(|| StatsError::stat(&self.name, "stat field was not created"))
    }

    pub fn aux_field(&self, name: &str) -> Result<&Field> {
        self.aux_fields.get(name).ok_or_else(|| StatsError::MissingAuxField {
            stat: self.name.clone(),
            aux: name.to_string(),
        })
    }

    #[must_use]
    pub fn aux_fields(&self) -> &BTreeMap<String, Field> {
        &self.aux_fields
    }

    #[must_use]
    pub fn aux_fields_set(&self) -> bool {
        self.aux_fields_set
    }

    /// Record a field the stat derived itself (exposed through `aux_fields`)
    pub fn insert_aux_field(&mut self, field: Field) {
        self.aux_fields.insert(field.name().to_string(), field);
    }

    /// Replace the output field (for stats whose output is another stat's)
    pub fn set_stat_field(&mut self, field: Field) {
        self.stat_field = Some(field);
    }

    /// Check that an aux field is split like the input field
    pub fn check_aux_partitioning(&self, aux: &Field, part_dim_name: &str) -> Result<()> {
        let field = self.field()?;
        let incompatible = |message: String| StatsError::IncompatibleAuxField {
            stat: self.name.clone(),
            aux: aux.name().to_string(),
            message,
        };
        if aux.nparts() != field.nparts() {
            return Err(incompatible(format!(
                "{} partitions, input field '{}' has {}",
                aux.nparts(),
                field.name(),
                field.nparts()
            )));
        }
        if field.nparts() > 1 {
            let field_part_name = field.layout().name(field.part_dim())?;
            let aux_part_name = aux.layout().name(aux.part_dim())?;
            if field_part_name != part_dim_name || aux_part_name != part_dim_name {
                return Err(incompatible(format!(
                    "partitioned along '{aux_part_name}', input field along '{field_part_name}', expected '{part_dim_name}'"
                )));
            }
            for ipart in 0..field.nparts() {
                if aux.part_extent(ipart)? != field.part_extent(ipart)? {
                    return Err(incompatible(format!(
                        "extent of partition {ipart} differs from the input field's"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A reduction or selection computed over a [`Field`]
pub trait FieldStat: fmt::Debug {
    fn base(&self) -> &StatBase;

    fn base_mut(&mut self) -> &mut StatBase;

    /// Registry key of this kind of stat
    fn type_name(&self) -> &'static str;

    /// Shape of the result for an input of shape `field_layout`
    fn stat_layout(&self, field_layout: &FieldLayout) -> Result<FieldLayout>;

    fn stat_data_type(&self) -> Result<DataType> {
        Ok(self.base().field()?.data_type())
    }

    /// Aux fields that must be supplied to `set_aux_fields`
    fn aux_fields_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Aux fields used when supplied (e.g. a mask some other stat already loaded)
    fn optional_aux_fields_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn set_field_impl(&mut self, _field: &Field) -> Result<()> {
        Ok(())
    }

    fn set_aux_fields_impl(&mut self) -> Result<()> {
        Ok(())
    }

    /// Runs right after the output field was allocated
    fn create_stat_field_impl(&mut self) -> Result<()> {
        Ok(())
    }

    fn compute_impl(&mut self) -> Result<()>;

    fn name(&self) -> &str {
        self.base().name()
    }

    /// Bind the input field; it must be committed
    ///
    /// Rebinding discards the aux fields and the output of a previous binding.
    fn set_field(&mut self, field: &Field) -> Result<()> {
        if !field.committed() {
            return Err(StatsError::stat(
                self.name(),
                format!("input field '{}' was not committed", field.name()),
            ));
        }
        {
            let base = self.base_mut();
            base.field = Some(field.read_only());
            base.stat_field = None;
            base.aux_fields.clear();
            base.aux_fields_set = false;
        }
        trace!(stat = %self.name(), field = %field.name(), "field bound");
        self.set_field_impl(field)
    }

    /// Bind the aux fields this stat declared
    ///
    /// # Errors
    ///
    /// Returns an error if the input field is not bound yet, a declared aux
    /// field is missing or uncommitted, or the stat rejects a field.
    fn set_aux_fields(&mut self, aux_fields: &BTreeMap<String, Field>) -> Result<()> {
        self.base().field()?;
        let required = self.aux_fields_names();
        let optional = self.optional_aux_fields_names();
        let mut bound = BTreeMap::new();
        for name in &required {
            let aux = aux_fields.get(name).ok_or_else(|| StatsError::MissingAuxField {
                stat: self.name().to_string(),
                aux: name.clone(),
            })?;
            bound.insert(name.clone(), aux.clone());
        }
        for name in &optional {
            if let Some(aux) = aux_fields.get(name) {
                bound.insert(name.clone(), aux.clone());
            }
        }
        for (name, aux) in &bound {
            if !aux.committed() {
                return Err(StatsError::IncompatibleAuxField {
                    stat: self.name().to_string(),
                    aux: name.clone(),
                    message: "field was not committed".to_string(),
                });
            }
        }
        {
            let base = self.base_mut();
            base.aux_fields = bound.into_iter().map(|(k, f)| (k, f.read_only())).collect();
            base.stat_field = None;
            base.aux_fields_set = true;
        }
        self.set_aux_fields_impl()
    }

    /// Allocate and commit the output field
    fn create_stat_field(&mut self) -> Result<()> {
        let field = self.base().field()?.clone();
        if !self.aux_fields_names().is_empty() && !self.base().aux_fields_set {
            return Err(StatsError::stat(
                self.name(),
                "aux fields must be set before creating the stat field",
            ));
        }
        let layout = self.stat_layout(field.layout())?;
        let data_type = self.stat_data_type()?;
        let mut stat_field = Field::single_part(self.name(), layout, DataAccess::Copy, data_type)?;
        stat_field.commit()?;
        debug!(
            stat = %self.name(),
            field = %field.name(),
            layout = %stat_field.layout(),
            data_type = %data_type,
            "stat field created"
        );
        self.base_mut().stat_field = Some(stat_field);
        self.create_stat_field_impl()
    }

    /// Output field (read-only handle)
    fn stat_field(&self) -> Result<Field> {
        Ok(self.base().stat_field()?.read_only())
    }

    fn aux_fields(&self) -> &BTreeMap<String, Field> {
        self.base().aux_fields()
    }

    /// Run the kernel for `timestamp` and return the (reused) output field
    fn compute(&mut self, timestamp: &TimeStamp) -> Result<Field> {
        if self.base().stat_field.is_none() {
            return Err(StatsError::stat(
                self.name(),
                "compute called before create_stat_field",
            ));
        }
        self.base_mut().timestamp = Some(*timestamp);
        trace!(stat = %self.name(), time = %timestamp, "computing stat");
        self.compute_impl()?;
        self.stat_field()
    }
}
