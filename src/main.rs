//! Entry point for the insitu-stats driver.
//! Loads fields from a NetCDF snapshot, distributes their columns over in-process
//! ranks and partitions, and runs the configured stats session on every rank.

use clap::Parser;
use insitu_stats::prelude::*;
use insitu_stats::{get_parallel_info, tracked_fields, Comm, ParameterList, StatFactory};
use ndarray::{ArrayViewD, Axis, IxDyn, Slice};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

mod cli;

use cli::Args;

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt().with_env_filter(filter).with_target(false).init();
}

/// Global columns `[start, end)` owned by `rank`
fn column_range(ncols: usize, rank: usize, nranks: usize) -> Range<usize> {
    (rank * ncols / nranks)..((rank + 1) * ncols / nranks)
}

/// Values of `field` restricted to `cols` along `col_dim`, row-major
fn slab<T: FieldValue>(field: &Field, col_dim: usize, cols: Range<usize>) -> Result<Vec<T>> {
    let values = field.to_vec::<T>()?;
    let global = ArrayViewD::from_shape(IxDyn(field.layout().dims()), &values)?;
    Ok(global
        .slice_axis(Axis(col_dim), Slice::from(cols))
        .iter()
        .copied()
        .collect())
}

/// Register the rank-local piece of `field`, split into `nparts` partitions
fn register<T: FieldValue>(
    session: &mut ProfilingSession,
    field: &Field,
    col_dim: Option<usize>,
    cols: Range<usize>,
    nparts: usize,
) -> Result<()> {
    let layout = field.layout();
    let Some(col_dim) = col_dim else {
        // Fields without columns are replicated on every rank.
        session.add_field(
            field.name(),
            layout.dims(),
            layout.names(),
            1,
            0,
            DataAccess::Copy,
            T::DATA_TYPE,
        )?;
        session.set_field_part_data(field.name(), 0, shared_buffer(field.to_vec::<T>()?))?;
        return Ok(());
    };

    let mut dims = layout.dims().to_vec();
    dims[col_dim] = cols.len();
    session.add_field(
        field.name(),
        &dims,
        layout.names(),
        nparts,
        col_dim,
        DataAccess::View,
        T::DATA_TYPE,
    )?;
    for ipart in 0..nparts {
        let part = column_range(cols.len(), ipart, nparts);
        let global = (cols.start + part.start)..(cols.start + part.end);
        session.set_field_part_extent(field.name(), ipart, part.len())?;
        session.set_field_part_data(field.name(), ipart, shared_buffer(slab::<T>(field, col_dim, global)?))?;
    }
    Ok(())
}

/// Read the tracked fields, the configured aux fields and, when absent,
/// synthesize one-based `col_gids` over the column dimension
fn load_inputs(path: &Path, config: &ParameterList, col_name: &str) -> Result<Vec<Field>> {
    let mut inputs = Vec::new();
    for name in tracked_fields(config)? {
        inputs.push(read_real_field(path, &name)?);
    }
    for name in config.get_or::<Vec<String>>("Aux Fields", Vec::new())? {
        inputs.push(read_real_field(path, &name)?);
    }
    for name in config.get_or::<Vec<String>>("Int Aux Fields", Vec::new())? {
        inputs.push(read_int_field(path, &name)?);
    }

    if !inputs.iter().any(|f| f.name() == "col_gids") {
        if let Some(ncols) = inputs
            .iter()
            .find_map(|f| f.layout().extent_of(col_name).ok())
        {
            let gids = (1..=ncols)
                .map(|g| Int::try_from(g).map_err(|e| StatsError::Session(e.to_string())))
                .collect::<Result<Vec<Int>>>()?;
            inputs.push(Field::from_vec(
                "col_gids",
                FieldLayout::new(&[ncols], &[col_name])?,
                gids,
            )?);
        }
    }
    for input in &inputs {
        debug!(field = %input.name(), layout = %input.layout(), dtype = %input.data_type(), "input loaded");
    }
    Ok(inputs)
}

fn rank_output(output: &Path, rank: usize, nranks: usize) -> PathBuf {
    if nranks == 1 {
        return output.to_path_buf();
    }
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stats".to_string());
    output.with_file_name(format!("{stem}.rank{rank}.nc"))
}

fn print_results(session: &ProfilingSession) -> Result<()> {
    let archive = session.archive();
    for field_name in archive.field_names() {
        let Some(histories) = archive.stat_histories(field_name) else {
            continue;
        };
        for (stat_name, history) in histories {
            let Some((time, value)) = history.last() else {
                continue;
            };
            let values: Vec<Real> = match value.data_type() {
                DataType::Int => value.to_vec::<Int>()?.into_iter().map(Real::from).collect(),
                _ => value.to_vec::<Real>()?,
            };
            println!("\n {field_name} / {stat_name} at {time}  {}", value.layout());
            if values.len() <= 20 {
                for (i, v) in values.iter().enumerate() {
                    println!("   [{i}]: {v:.6}");
                }
            } else {
                for (i, v) in values.iter().take(10).enumerate() {
                    println!("   [{i}]: {v:.6}");
                }
                println!("   ... ({} more values)", values.len() - 10);
            }
        }
    }
    Ok(())
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.verbose);

    let info = get_parallel_info();
    info!(
        ranks = args.ranks,
        parts = args.parts,
        available = info.available_parallelism,
        "starting insitu-stats"
    );

    let config = ParameterList::from_json_file(&args.config)?;
    let col_name: String = config.get_or("Column Dim", "ncol".to_string())?;
    let inputs = load_inputs(&args.file, &config, &col_name)?;

    let ncols = inputs
        .iter()
        .find_map(|f| f.layout().extent_of(&col_name).ok());
    if let Some(ncols) = ncols {
        if ncols < args.ranks * args.parts {
            return Err(format!(
                "cannot split {ncols} columns over {} ranks with {} partitions each",
                args.ranks, args.parts
            )
            .into());
        }
    }

    let factory = Arc::new(StatFactory::with_builtin_stats());
    let start = TimeStamp::new(args.ymd, args.tod)?;

    run_ranks(args.ranks, |comm| {
        let ctx = StatContext::new(Arc::new(comm.clone()), Arc::clone(&factory))
            .with_mask_reader(Arc::new(NetcdfMaskReader));
        let mut session = ProfilingSession::new(ctx, config.clone())?;

        let cols = column_range(ncols.unwrap_or(0), comm.rank(), comm.size());
        for input in &inputs {
            let col_dim = input.layout().dim_idx(&col_name).ok();
            match input.data_type() {
                DataType::Int => register::<Int>(&mut session, input, col_dim, cols.clone(), args.parts)?,
                _ => register::<Real>(&mut session, input, col_dim, cols.clone(), args.parts)?,
            }
        }
        session.commit_all_fields()?;

        let mut time = start;
        for _ in 0..args.steps {
            time.advance(args.dt)?;
            session.compute_stats(time)?;
        }

        match &args.output {
            Some(output) => {
                let path = rank_output(output, comm.rank(), comm.size());
                NetCDFWriter::new(&path).write_history(session.archive())?;
                if comm.am_i_root() {
                    println!("✅ Saved stats to {}", path.display());
                }
            }
            None if comm.am_i_root() => print_results(&session)?,
            None => {}
        }
        Ok(())
    })?;

    Ok(())
}
