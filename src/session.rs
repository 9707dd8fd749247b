//! Host-facing driver: register fields, build the configured stats, compute them
//!
//! A session is configured with a [`ParameterList`] of the form
//!
//! ```json
//! {
//!   "Fields To Track": ["T"],
//!   "Add Compute Stats Barrier": false,
//!   "T": {
//!     "Compute Stats": ["global_max", "t_band"],
//!     "t_band": { "type": "zonal_mean", "lat_bounds": [-30.0, 30.0] }
//!   }
//! }
//! ```
//!
//! Each stat's sublist is optional; its `type` defaults to the stat name.
//! Without `"Fields To Track"`, every sublist holding `"Compute Stats"` is
//! tracked.

use crate::archive::ProfilingArchive;
use crate::data_type::{DataType, FieldValue};
use crate::errors::{Result, StatsError};
use crate::field::{DataAccess, Field, SharedBuffer};
use crate::layout::FieldLayout;
use crate::params::ParameterList;
use crate::statistics::{FieldStat, StatContext};
use crate::time_stamp::TimeStamp;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Names of the fields a session configuration asks stats for
pub fn tracked_fields(params: &ParameterList) -> Result<Vec<String>> {
    if let Some(names) = params.get_opt::<Vec<String>>("Fields To Track")? {
        return Ok(names);
    }
    let mut names = Vec::new();
    for key in params.keys() {
        if params.is_sublist(key) && params.sublist(key)?.is_parameter("Compute Stats") {
            names.push(key.to_string());
        }
    }
    Ok(names)
}

#[derive(Debug)]
pub struct ProfilingSession {
    ctx: StatContext,
    params: ParameterList,
    archive: ProfilingArchive,
    requests: BTreeMap<String, Vec<Box<dyn FieldStat>>>,
    run_t0: Option<TimeStamp>,
    stats_created: bool,
}

impl ProfilingSession {
    /// `"Run T0": [ymd, tod]` in `params` sets the run start time stamp
    pub fn new(ctx: StatContext, params: ParameterList) -> Result<Self> {
        let run_t0 = match params.get_opt::<[i32; 2]>("Run T0")? {
            Some([ymd, tod]) => Some(TimeStamp::new(ymd, tod)?),
            None => None,
        };
        Ok(Self {
            ctx,
            params,
            archive: ProfilingArchive::new(),
            requests: BTreeMap::new(),
            run_t0,
            stats_created: false,
        })
    }

    /// Time stamp at which `compute_stats` does nothing
    #[must_use]
    pub fn with_run_t0(mut self, run_t0: TimeStamp) -> Self {
        self.run_t0 = Some(run_t0);
        self
    }

    #[must_use]
    pub fn context(&self) -> &StatContext {
        &self.ctx
    }

    #[must_use]
    pub fn archive(&self) -> &ProfilingArchive {
        &self.archive
    }

    /// Stats built for a tracked field
    #[must_use]
    pub fn stats(&self, field_name: &str) -> Option<&[Box<dyn FieldStat>]> {
        self.requests.get(field_name).map(Vec::as_slice)
    }

    /// Register a field; it stays uncommitted until its partitions are set
    #[allow(clippy::too_many_arguments)]
    pub fn add_field<S: AsRef<str>>(
        &mut self,
        name: &str,
        dims: &[usize],
        dim_names: &[S],
        nparts: usize,
        part_dim: usize,
        access: DataAccess,
        data_type: DataType,
    ) -> Result<()> {
        self.check_not_started("add a field")?;
        let layout = FieldLayout::new(dims, dim_names)?;
        let field = Field::new(name, layout, nparts, part_dim, access, data_type)?;
        debug!(field = name, layout = %field.layout(), nparts, "field registered");
        self.archive.add_field(field)
    }

    pub fn set_field_part_extent(&mut self, name: &str, ipart: usize, extent: usize) -> Result<()> {
        self.archive.get_field_mut(name)?.set_part_extent(ipart, extent)
    }

    /// Attach partition data: View fields share `buffer`, Copy fields copy it
    pub fn set_field_part_data<T: FieldValue>(
        &mut self,
        name: &str,
        ipart: usize,
        buffer: SharedBuffer<T>,
    ) -> Result<()> {
        let field = self.archive.get_field_mut(name)?;
        match field.data_access() {
            DataAccess::View => field.set_part_data(ipart, buffer),
            DataAccess::Copy => {
                let data = buffer.read().map_err(|_| StatsError::LockPoisoned {
                    field: name.to_string(),
                })?;
                field.copy_part_data(ipart, &data)
            }
        }
    }

    pub fn commit_field(&mut self, name: &str) -> Result<()> {
        self.archive.get_field_mut(name)?.commit()
    }

    /// Commit every field, then build the configured stats
    pub fn commit_all_fields(&mut self) -> Result<()> {
        self.archive.commit_all_fields()?;
        if !self.stats_created {
            self.create_stats()?;
            self.stats_created = true;
        }
        Ok(())
    }

    fn check_not_started(&self, what: &str) -> Result<()> {
        if self.stats_created {
            return Err(StatsError::Session(format!(
                "cannot {what} once stats were created"
            )));
        }
        Ok(())
    }

    fn create_stats(&mut self) -> Result<()> {
        for fname in tracked_fields(&self.params)? {
            let request = self.params.sublist(&fname)?;
            let field = self.archive.get_field(&fname)?.clone();
            let mut stats = Vec::new();
            for stat_name in request.get::<Vec<String>>("Compute Stats")? {
                let stat_pl = request.sublist_or_empty(&stat_name)?;
                let stat_type: String = stat_pl.get_or("type", stat_name.clone())?;
                let mut stat = self.ctx.create_stat(&stat_type, &stat_pl)?;
                stat.set_field(&field)?;

                // Missing aux fields are left to the stat: some can produce
                // them (e.g. a mask read from file) and share them below.
                let mut aux_fields = BTreeMap::new();
                for aux in stat
                    .aux_fields_names()
                    .into_iter()
                    .chain(stat.optional_aux_fields_names())
                {
                    if let Ok(f) = self.archive.get_field(&aux) {
                        aux_fields.insert(aux, f.clone());
                    }
                }
                stat.set_aux_fields(&aux_fields)?;
                stat.create_stat_field()?;

                let out = stat.stat_field()?;
                if !self.archive.has_field(out.name()) {
                    self.archive.add_field(out)?;
                }
                for (name, aux) in stat.aux_fields() {
                    if !self.archive.has_field(name) {
                        self.archive.add_field(aux.clone())?;
                    }
                }
                info!(field = %fname, stat = %stat.name(), stat_type = %stat_type, "stat created");
                stats.push(stat);
            }
            self.requests.insert(fname, stats);
        }
        Ok(())
    }

    /// Compute every stat for `time` and record the results
    ///
    /// Returns `false` (and computes nothing) when `time` is the run start.
    pub fn compute_stats(&mut self, time: TimeStamp) -> Result<bool> {
        if !self.stats_created {
            return Err(StatsError::Session(
                "compute_stats called before commit_all_fields".to_string(),
            ));
        }
        if self.run_t0 == Some(time) {
            debug!(%time, "skipping stats at run start");
            return Ok(false);
        }
        let comm = self.ctx.comm();
        if self.params.get_or("Add Compute Stats Barrier", false)? {
            comm.barrier()?;
        }
        if comm.am_i_root() {
            info!(%time, "computing stats");
        }
        for (fname, stats) in &mut self.requests {
            for stat in stats.iter_mut() {
                let out = stat.compute(&time)?;
                self.archive.append_stat(fname, stat.name(), time, &out)?;
            }
        }
        self.archive.update_time(time);
        Ok(true)
    }
}
