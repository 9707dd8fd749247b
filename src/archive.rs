//! Registry of the fields a session knows about and the history of their stats

use crate::errors::{Result, StatsError};
use crate::field::Field;
use crate::time_stamp::TimeStamp;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Time series of one stat of one field
#[derive(Debug, Clone, Default)]
pub struct StatHistory {
    times: Vec<TimeStamp>,
    values: Vec<Field>,
}

impl StatHistory {
    /// Record a deep copy of `value` at `time`
    pub fn append(&mut self, time: TimeStamp, value: &Field) -> Result<()> {
        self.values.push(value.deep_clone()?);
        self.times.push(time);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    #[must_use]
    pub fn times(&self) -> &[TimeStamp] {
        &self.times
    }

    #[must_use]
    pub fn values(&self) -> &[Field] {
        &self.values
    }

    /// Most recent entry
    #[must_use]
    pub fn last(&self) -> Option<(&TimeStamp, &Field)> {
        self.times.last().zip(self.values.last())
    }
}

#[derive(Debug, Default)]
pub struct ProfilingArchive {
    fields: BTreeMap<String, Field>,
    history: BTreeMap<String, BTreeMap<String, StatHistory>>,
    curr_time: Option<TimeStamp>,
}

impl ProfilingArchive {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Fails if a field with the same name was already added.
    pub fn add_field(&mut self, field: Field) -> Result<()> {
        let name = field.name().to_string();
        if self.fields.contains_key(&name) {
            return Err(StatsError::Session(format!("field '{name}' was already added")));
        }
        trace!(field = %name, "field archived");
        self.fields.insert(name, field);
        Ok(())
    }

    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn get_field(&self, name: &str) -> Result<&Field> {
        self.fields
            .get(name)
            .ok_or_else(|| StatsError::Session(format!("field '{name}' not found")))
    }

    pub fn get_field_mut(&mut self, name: &str) -> Result<&mut Field> {
        self.fields
            .get_mut(name)
            .ok_or_else(|| StatsError::Session(format!("field '{name}' not found")))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Commit every field that is not committed yet
    pub fn commit_all_fields(&mut self) -> Result<()> {
        for field in self.fields.values_mut().filter(|f| !f.committed()) {
            field.commit()?;
        }
        debug!(nfields = self.fields.len(), "all fields committed");
        Ok(())
    }

    /// Append the result of stat `stat_name` of field `field_name`
    pub fn append_stat(
        &mut self,
        field_name: &str,
        stat_name: &str,
        time: TimeStamp,
        value: &Field,
    ) -> Result<()> {
        if !self.has_field(field_name) {
            return Err(StatsError::Session(format!(
                "cannot record stat '{stat_name}' of unknown field '{field_name}'"
            )));
        }
        self.history
            .entry(field_name.to_string())
            .or_default()
            .entry(stat_name.to_string())
            .or_default()
            .append(time, value)
    }

    pub fn get_stat_history(&self, field_name: &str, stat_name: &str) -> Result<&StatHistory> {
        self.history
            .get(field_name)
            .and_then(|stats| stats.get(stat_name))
            .ok_or_else(|| {
                StatsError::Session(format!(
                    "no history for stat '{stat_name}' of field '{field_name}'"
                ))
            })
    }

    /// Histories of every stat of a field, keyed by stat name
    #[must_use]
    pub fn stat_histories(&self, field_name: &str) -> Option<&BTreeMap<String, StatHistory>> {
        self.history.get(field_name)
    }

    pub fn update_time(&mut self, time: TimeStamp) {
        self.curr_time = Some(time);
    }

    #[must_use]
    pub fn curr_time(&self) -> Option<&TimeStamp> {
        self.curr_time.as_ref()
    }
}
