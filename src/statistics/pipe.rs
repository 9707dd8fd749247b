//! `pipe`: feed the output of an `inner` stat into an `outer` stat
//!
//! Both stats are built through the factory from the `inner` and `outer`
//! sublists. The pipe's output is the outer stat's output under the pipe's
//! name.

use crate::data_type::DataType;
use crate::errors::{Result, StatsError};
use crate::field::Field;
use crate::layout::FieldLayout;
use crate::params::ParameterList;
use crate::statistics::factory::BuildStat;
use crate::statistics::stat::{FieldStat, StatBase, StatContext};
use tracing::debug;

#[derive(Debug)]
pub struct FieldStatPipe {
    base: StatBase,
    inner: Box<dyn FieldStat>,
    outer: Box<dyn FieldStat>,
}

fn build_stage(
    ctx: &StatContext,
    params: &ParameterList,
    key: &str,
    pipe_name: &str,
) -> Result<Box<dyn FieldStat>> {
    let mut stage = params.sublist(key)?;
    let stat_type: String = stage.get("type")?;
    if !stage.is_parameter("name") {
        stage.set("name", format!("{pipe_name}_{key}"))?;
    }
    ctx.create_stat(&stat_type, &stage)
}

fn union(mut a: Vec<String>, b: Vec<String>) -> Vec<String> {
    a.extend(b);
    a.sort();
    a.dedup();
    a
}

impl FieldStatPipe {
    #[must_use]
    pub fn inner(&self) -> &dyn FieldStat {
        self.inner.as_ref()
    }

    #[must_use]
    pub fn outer(&self) -> &dyn FieldStat {
        self.outer.as_ref()
    }

    fn inner_needs_aux(&self) -> bool {
        !self.inner.aux_fields_names().is_empty() || !self.inner.optional_aux_fields_names().is_empty()
    }

    /// Allocate the inner output and bind it as the outer input
    fn chain(&mut self) -> Result<()> {
        self.inner.create_stat_field()?;
        let inner_out = self.inner.stat_field()?;
        self.outer.set_field(&inner_out)?;
        debug!(
            stat = %self.base.name(),
            inner = %self.inner.name(),
            outer = %self.outer.name(),
            "pipe chained"
        );
        Ok(())
    }
}

impl BuildStat for FieldStatPipe {
    fn build(ctx: &StatContext, params: &ParameterList) -> Result<Self> {
        let base = StatBase::new(ctx, params)?;
        let inner = build_stage(ctx, params, "inner", base.name())?;
        let outer = build_stage(ctx, params, "outer", base.name())?;
        Ok(Self { base, inner, outer })
    }
}

impl FieldStat for FieldStatPipe {
    fn base(&self) -> &StatBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StatBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "pipe"
    }

    fn stat_layout(&self, field_layout: &FieldLayout) -> Result<FieldLayout> {
        self.outer.stat_layout(&self.inner.stat_layout(field_layout)?)
    }

    fn stat_data_type(&self) -> Result<DataType> {
        self.outer.stat_data_type()
    }

    fn aux_fields_names(&self) -> Vec<String> {
        union(self.inner.aux_fields_names(), self.outer.aux_fields_names())
    }

    fn optional_aux_fields_names(&self) -> Vec<String> {
        union(
            self.inner.optional_aux_fields_names(),
            self.outer.optional_aux_fields_names(),
        )
    }

    fn set_field_impl(&mut self, field: &Field) -> Result<()> {
        self.inner.set_field(field)?;
        if !self.inner_needs_aux() {
            self.chain()?;
        }
        Ok(())
    }

    fn set_aux_fields_impl(&mut self) -> Result<()> {
        let aux = self.base.aux_fields().clone();
        if self.inner_needs_aux() {
            self.inner.set_aux_fields(&aux)?;
            self.chain()?;
        }
        if !self.outer.aux_fields_names().is_empty() || !self.outer.optional_aux_fields_names().is_empty() {
            self.outer.set_aux_fields(&aux)?;
        }
        Ok(())
    }

    fn create_stat_field(&mut self) -> Result<()> {
        self.base.field()?;
        if !self.aux_fields_names().is_empty() && !self.base.aux_fields_set() {
            return Err(StatsError::stat(
                self.base.name(),
                "aux fields must be set before creating the stat field",
            ));
        }
        self.outer.create_stat_field()?;
        let out = self.outer.stat_field()?.renamed(self.base.name());
        debug!(stat = %self.base.name(), layout = %out.layout(), "pipe stat field created");
        self.base.set_stat_field(out);
        Ok(())
    }

    fn compute_impl(&mut self) -> Result<()> {
        let ts = self
            .base
            .timestamp()
            .copied()
            .ok_or_else(|| StatsError::stat(self.base.name(), "compute called without a time stamp"))?;
        self.inner.compute(&ts)?;
        self.outer.compute(&ts)?;
        Ok(())
    }
}
