//! NetCDF I/O for fields: reading variables and masks, writing stat results

use crate::archive::{ProfilingArchive, StatHistory};
use crate::comm::{Comm, ReduceOp};
use crate::data_type::{DataType, Int, Real};
use crate::errors::{Result, StatsError};
use crate::field::Field;
use crate::layout::FieldLayout;
use crate::statistics::MaskReader;
use chrono::Utc;
use netcdf::{create, open, File, FileMut, Variable};
use std::collections::BTreeMap;
use std::{fs, path::Path};
use tracing::{debug, info};

fn find_variable<'f>(file: &'f File, var_name: &str) -> Result<Variable<'f>> {
    file.variable(var_name)
        .ok_or_else(|| StatsError::VariableNotFound {
            var: var_name.to_string(),
        })
}

fn variable_layout(var: &Variable<'_>) -> Result<FieldLayout> {
    let dims: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
    let names: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
    FieldLayout::new(&dims, &names)
}

/// Read a variable of `path` as a single-part Real field named after it
pub fn read_real_field(path: &Path, var_name: &str) -> Result<Field> {
    let file = open(path)?;
    let var = find_variable(&file, var_name)?;
    let layout = variable_layout(&var)?;
    let data: Vec<Real> = var.get_values::<Real, _>(..)?;
    debug!(var = var_name, layout = %layout, "real variable read");
    Field::from_vec(var_name, layout, data)
}

/// Read a variable of `path` as a single-part Int field named after it
pub fn read_int_field(path: &Path, var_name: &str) -> Result<Field> {
    let file = open(path)?;
    let var = find_variable(&file, var_name)?;
    let layout = variable_layout(&var)?;
    let data: Vec<Int> = var.get_values::<Int, _>(..)?;
    debug!(var = var_name, layout = %layout, "int variable read");
    Field::from_vec(var_name, layout, data)
}

/// Read a variable of `path` as a single-part field of `data_type`
pub fn read_field(path: &Path, var_name: &str, data_type: DataType) -> Result<Field> {
    match data_type {
        DataType::Real => read_real_field(path, var_name),
        DataType::Int => read_int_field(path, var_name),
        DataType::Invalid => Err(StatsError::field(var_name, "cannot read a field of invalid data type")),
    }
}

/// Reads masks stored as 1-D integer variables over the global columns
///
/// Global column ids are made zero-based by subtracting their minimum over
/// all ranks, then used as indices into the variable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetcdfMaskReader;

impl MaskReader for NetcdfMaskReader {
    fn read_mask(
        &self,
        file_name: &str,
        mask_name: &str,
        col_gids: &Field,
        comm: &dyn Comm,
    ) -> Result<Field> {
        let file = open(file_name)?;
        let var = find_variable(&file, mask_name)?;
        if var.dimensions().len() != 1 {
            return Err(StatsError::InvalidLayout {
                message: format!(
                    "mask '{mask_name}' in {file_name} has rank {}, expected 1",
                    var.dimensions().len()
                ),
            });
        }
        let values: Vec<Int> = var.get_values::<Int, _>(..)?;

        let gids = col_gids.to_vec::<Int>()?;
        let mut min_gid = [gids.iter().copied().min().unwrap_or(Int::MAX)];
        comm.all_reduce_int(&mut min_gid, ReduceOp::Min)?;

        let local = gids
            .iter()
            .map(|&gid| {
                usize::try_from(gid - min_gid[0])
                    .ok()
                    .and_then(|i| values.get(i).copied())
                    .ok_or_else(|| StatsError::InvalidLayout {
                        message: format!(
                            "column id {gid} outside mask '{mask_name}' of length {}",
                            values.len()
                        ),
                    })
            })
            .collect::<Result<Vec<Int>>>()?;

        let layout = FieldLayout::new(&[local.len()], &[col_gids.layout().name(0)?])?;
        debug!(mask = mask_name, file = file_name, ncols = local.len(), "mask read");
        Field::from_vec(mask_name, layout, local)
    }
}

/// Writes committed fields and stat histories to a new NetCDF file
pub struct NetCDFWriter<'a> {
    output_path: &'a Path,
}

impl<'a> NetCDFWriter<'a> {
    pub fn new(output_path: &'a Path) -> Self {
        Self { output_path }
    }

    fn create_file(&self) -> Result<FileMut> {
        if self.output_path.exists() {
            fs::remove_file(self.output_path)?;
        }
        Ok(create(self.output_path)?)
    }

    /// Dimensions shared by name must agree in length across variables
    fn ensure_dimension(file: &mut FileMut, name: &str, len: usize) -> Result<()> {
        if let Some(existing) = file.dimension(name) {
            if existing.len() != len {
                return Err(StatsError::InvalidLayout {
                    message: format!(
                        "dimension '{name}' written with length {} and {len}",
                        existing.len()
                    ),
                });
            }
            return Ok(());
        }
        file.add_dimension(name, len)?;
        Ok(())
    }

    fn put_field(file: &mut FileMut, var_name: &str, dim_names: &[&str], field: &Field) -> Result<()> {
        match field.data_type() {
            DataType::Real => {
                let data = field.to_vec::<Real>()?;
                let mut var = file.add_variable::<Real>(var_name, dim_names)?;
                var.put_values(&data, ..)?;
            }
            DataType::Int => {
                let data = field.to_vec::<Int>()?;
                let mut var = file.add_variable::<Int>(var_name, dim_names)?;
                var.put_values(&data, ..)?;
            }
            DataType::Invalid => {
                return Err(StatsError::field(field.name(), "cannot write a field of invalid data type"))
            }
        }
        Ok(())
    }

    fn add_history(file: &mut FileMut) -> Result<()> {
        file.add_attribute(
            "history",
            format!("Created by insitu-stats on {}", Utc::now().to_rfc3339()),
        )?;
        Ok(())
    }

    /// Write each field as a variable named after it
    pub fn write_fields(&self, fields: &[Field]) -> Result<()> {
        let mut file = self.create_file()?;
        for field in fields {
            let layout = field.layout();
            for (name, &len) in layout.names().iter().zip(layout.dims()) {
                Self::ensure_dimension(&mut file, name, len)?;
            }
            let dim_names: Vec<&str> = layout.names().iter().map(String::as_str).collect();
            Self::put_field(&mut file, field.name(), &dim_names, field)?;
        }
        Self::add_history(&mut file)?;
        info!(path = %self.output_path.display(), nfields = fields.len(), "fields written");
        Ok(())
    }

    /// Write the recorded history of every stat in `archive`
    ///
    /// Each stat becomes a variable `<field>_<stat>` with a leading `time`
    /// dimension. `time` holds days since the first record; `date` and `tod`
    /// hold the raw time stamps.
    pub fn write_history(&self, archive: &ProfilingArchive) -> Result<()> {
        let recorded: Vec<(&str, &BTreeMap<String, StatHistory>)> = archive
            .field_names()
            .filter_map(|name| archive.stat_histories(name).map(|h| (name, h)))
            .collect();
        let times = recorded
            .iter()
            .flat_map(|(_, histories)| histories.values())
            .next()
            .map(|h| h.times().to_vec())
            .unwrap_or_default();
        if times.is_empty() {
            return Err(StatsError::Session("no stats recorded".to_string()));
        }

        let mut file = self.create_file()?;
        file.add_dimension("time", times.len())?;

        let first = times[0];
        let days: Vec<f64> = times.iter().map(|t| t.days_since(&first)).collect();
        let mut time_var = file.add_variable::<f64>("time", &["time"])?;
        time_var.put_attribute("units", format!("days since {first}"))?;
        time_var.put_values(&days, ..)?;

        let dates: Vec<Int> = times.iter().map(|t| t.ymd()).collect();
        file.add_variable::<Int>("date", &["time"])?
            .put_values(&dates, ..)?;
        let tods = times
            .iter()
            .map(|t| Int::try_from(t.tod()).map_err(|e| StatsError::InvalidTimeStamp(e.to_string())))
            .collect::<Result<Vec<Int>>>()?;
        file.add_variable::<Int>("tod", &["time"])?
            .put_values(&tods, ..)?;

        let mut nvars = 0;
        for (field_name, histories) in recorded {
            for (stat_name, history) in histories {
                if history.times() != times.as_slice() {
                    return Err(StatsError::Session(format!(
                        "stat '{stat_name}' of field '{field_name}' was recorded at different times"
                    )));
                }
                Self::put_history(&mut file, &format!("{field_name}_{stat_name}"), history)?;
                nvars += 1;
            }
        }
        Self::add_history(&mut file)?;
        info!(path = %self.output_path.display(), nvars, nrecords = times.len(), "history written");
        Ok(())
    }

    fn put_history(file: &mut FileMut, var_name: &str, history: &StatHistory) -> Result<()> {
        let Some(sample) = history.values().first() else {
            return Ok(());
        };
        let layout = sample.layout();
        for (name, &len) in layout.names().iter().zip(layout.dims()) {
            Self::ensure_dimension(file, name, len)?;
        }
        let mut dim_names = vec!["time"];
        dim_names.extend(layout.names().iter().map(String::as_str));

        match sample.data_type() {
            DataType::Real => {
                let mut data = Vec::with_capacity(history.len() * layout.size());
                for value in history.values() {
                    data.extend(value.to_vec::<Real>()?);
                }
                file.add_variable::<Real>(var_name, &dim_names)?
                    .put_values(&data, ..)?;
            }
            DataType::Int => {
                let mut data = Vec::with_capacity(history.len() * layout.size());
                for value in history.values() {
                    data.extend(value.to_vec::<Int>()?);
                }
                file.add_variable::<Int>(var_name, &dim_names)?
                    .put_values(&data, ..)?;
            }
            DataType::Invalid => {
                return Err(StatsError::field(sample.name(), "cannot write a field of invalid data type"))
            }
        }
        Ok(())
    }
}
