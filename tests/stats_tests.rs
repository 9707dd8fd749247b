//! Reductions, selection stats, the stat lifecycle and the factory

use insitu_stats::{
    errors::{Result, StatsError},
    field::Field,
    layout::FieldLayout,
    params::ParameterList,
    statistics::{
        FieldGlobalStat, FieldStat, FieldZonalMean, StatContext, StatFactory, StatOperation,
    },
    BuildStat, DataAccess, DataType, Int, Real, SerialComm, TimeStamp,
};
use ndarray::{ArrayD, Axis, IxDyn, Slice};
use std::collections::BTreeMap;
use std::sync::Arc;

fn now() -> Result<TimeStamp> {
    TimeStamp::new(20000101, 3600)
}

/// Build, bind and compute one stat, returning its output values
fn compute_stat(
    ctx: &StatContext,
    stat_type: &str,
    params: ParameterList,
    field: &Field,
    aux: &[&Field],
) -> Result<Field> {
    let mut stat = ctx.create_stat(stat_type, &params)?;
    stat.set_field(field)?;
    let aux: BTreeMap<String, Field> = aux
        .iter()
        .map(|f| (f.name().to_string(), (*f).clone()))
        .collect();
    stat.set_aux_fields(&aux)?;
    stat.create_stat_field()?;
    stat.compute(&now()?)
}

/// `values` laid out over (ncol, lev), split along `part_dim` into `extents`
fn split_field(
    name: &str,
    dims: &[usize],
    values: &[Real],
    part_dim: usize,
    extents: &[usize],
) -> Result<Field> {
    let names = ["ncol", "lev", "cmp"];
    let layout = FieldLayout::new(dims, &names[..dims.len()])?;
    let global = ArrayD::from_shape_vec(IxDyn(dims), values.to_vec())?;
    let mut parts = Vec::new();
    let mut start = 0;
    for &extent in extents {
        let slab = global.slice_axis(Axis(part_dim), Slice::from(start..start + extent));
        parts.push(slab.iter().copied().collect::<Vec<Real>>());
        start += extent;
    }
    Field::from_parts(name, layout, part_dim, parts)
}

fn column_field(name: &str, values: Vec<Real>) -> Result<Field> {
    let n = values.len();
    Field::from_vec(name, FieldLayout::new(&[n], &["ncol"])?, values)
}

#[test]
fn test_global_reductions_are_partition_invariant() -> Result<()> {
    let ctx = StatContext::serial();
    let values: Vec<Real> = (0..24).map(|i| ((i * 7) % 24) as Real - 3.5).collect();
    let splits: [(usize, &[usize]); 5] = [
        (0, &[4]),
        (0, &[1, 3]),
        (0, &[2, 1, 1]),
        (1, &[5, 1]),
        (1, &[2, 2, 2]),
    ];

    let mut results = Vec::new();
    for (part_dim, extents) in splits {
        let field = split_field("T", &[4, 6], &values, part_dim, extents)?;
        let mut row = Vec::new();
        for stat_type in ["global_sum", "global_avg", "global_max", "global_min"] {
            let out = compute_stat(&ctx, stat_type, ParameterList::new(stat_type), &field, &[])?;
            assert_eq!(out.layout().rank(), 0);
            row.push(out.to_vec::<Real>()?[0]);
        }
        results.push(row);
    }

    let total: Real = (0..24).map(|i| i as Real - 3.5).sum();
    assert_eq!(results[0], vec![total, total / 24.0, 19.5, -3.5]);
    for row in &results[1..] {
        assert_eq!(row, &results[0]);
    }
    Ok(())
}

#[test]
fn test_integer_reductions_keep_their_type() -> Result<()> {
    let ctx = StatContext::serial();
    let field = Field::from_vec("n", FieldLayout::new(&[5], &["ncol"])?, vec![3, -1, 4, 1, 5])?;

    let sum = compute_stat(&ctx, "global_sum", ParameterList::new("n_sum"), &field, &[])?;
    assert_eq!(sum.data_type(), DataType::Int);
    assert_eq!(sum.to_vec::<Int>()?, vec![12]);

    let max = compute_stat(&ctx, "global_max", ParameterList::new("n_max"), &field, &[])?;
    assert_eq!(max.to_vec::<Int>()?, vec![5]);

    let avg = compute_stat(&ctx, "global_avg", ParameterList::new("n_avg"), &field, &[])?;
    assert_eq!(avg.data_type(), DataType::Real);
    assert_eq!(avg.to_vec::<Real>()?, vec![2.4]);
    Ok(())
}

#[test]
fn test_integer_sums_report_overflow() -> Result<()> {
    let ctx = StatContext::serial();
    let field = Field::from_vec("n", FieldLayout::new(&[2], &["ncol"])?, vec![Int::MAX, 1])?;
    assert!(matches!(
        compute_stat(&ctx, "global_sum", ParameterList::new("n_sum"), &field, &[]),
        Err(StatsError::IntegerOverflow { .. })
    ));
    assert!(matches!(
        compute_stat(&ctx, "sum_along_columns", ParameterList::new("n_col"), &field, &[]),
        Err(StatsError::IntegerOverflow { .. })
    ));

    // Means accumulate in Real and are unaffected
    let avg = compute_stat(&ctx, "global_avg", ParameterList::new("n_avg"), &field, &[])?;
    assert_eq!(avg.to_vec::<Real>()?, vec![(Real::from(Int::MAX) + 1.0) / 2.0]);

    let fits = Field::from_vec("m", FieldLayout::new(&[2], &["ncol"])?, vec![Int::MAX, -1])?;
    let sum = compute_stat(&ctx, "global_sum", ParameterList::new("m_sum"), &fits, &[])?;
    assert_eq!(sum.to_vec::<Int>()?, vec![Int::MAX - 1]);
    Ok(())
}

#[test]
fn test_reductions_along_columns() -> Result<()> {
    let ctx = StatContext::serial();
    // v[c][l] = 3c + l
    let values: Vec<Real> = (0..12).map(Real::from).collect();
    for (part_dim, extents) in [(0, &[4][..]), (0, &[3, 1][..]), (1, &[1, 2][..])] {
        let field = split_field("T", &[4, 3], &values, part_dim, extents)?;

        let sum = compute_stat(&ctx, "sum_along_columns", ParameterList::new("s"), &field, &[])?;
        assert_eq!(sum.layout().names(), &["lev".to_string()]);
        assert_eq!(sum.to_vec::<Real>()?, vec![18.0, 22.0, 26.0]);

        let max = compute_stat(&ctx, "max_along_columns", ParameterList::new("mx"), &field, &[])?;
        assert_eq!(max.to_vec::<Real>()?, vec![9.0, 10.0, 11.0]);

        let min = compute_stat(&ctx, "min_along_columns", ParameterList::new("mn"), &field, &[])?;
        assert_eq!(min.to_vec::<Real>()?, vec![0.0, 1.0, 2.0]);

        let avg = compute_stat(&ctx, "avg_along_columns", ParameterList::new("a"), &field, &[])?;
        assert_eq!(avg.to_vec::<Real>()?, vec![4.5, 5.5, 6.5]);
    }
    Ok(())
}

#[test]
fn test_reduction_along_a_named_axis() -> Result<()> {
    let ctx = StatContext::serial();
    let values: Vec<Real> = (0..12).map(Real::from).collect();
    let field = split_field("T", &[4, 3], &values, 0, &[2, 2])?;
    let params = ParameterList::new("vsum").with("axis_name", "lev")?;
    let out = compute_stat(&ctx, "sum_along_columns", params, &field, &[])?;
    assert_eq!(out.layout().dims(), &[4]);
    assert_eq!(out.to_vec::<Real>()?, vec![3.0, 12.0, 21.0, 30.0]);

    let params = ParameterList::new("bad").with("axis_name", "time")?;
    assert!(matches!(
        compute_stat(&ctx, "sum_along_columns", params, &field, &[]),
        Err(StatsError::DimensionNotFound { .. })
    ));
    Ok(())
}

#[test]
fn test_bounded_keeps_or_masks() -> Result<()> {
    let ctx = StatContext::serial();
    let values: Vec<Real> = vec![0.5, 2.0, 3.0, 4.99, 5.0, -7.0, 2.5, 9.0];
    let field = split_field("T", &[4, 2], &values, 0, &[1, 3])?;
    let params = ParameterList::new("T_mid")
        .with("bounds", [2.0, 5.0])?
        .with("mask_value", -1.0)?;
    let out = compute_stat(&ctx, "bounded", params, &field, &[])?.to_vec::<Real>()?;

    assert_eq!(out, vec![-1.0, 2.0, 3.0, 4.99, -1.0, -1.0, 2.5, -1.0]);
    for (o, v) in out.iter().zip(&values) {
        assert!(o == v || *o == -1.0);
    }
    Ok(())
}

#[test]
fn test_bounding_box_selects_columns_and_levels() -> Result<()> {
    let ctx = StatContext::serial();
    let values: Vec<Real> = (1..=8).map(Real::from).collect();
    let field = split_field("T", &[4, 2], &values, 0, &[2, 2])?;
    let lat = Field::from_parts(
        "lat",
        FieldLayout::new(&[4], &["ncol"])?,
        0,
        vec![vec![-45.0, 0.0], vec![10.0, 60.0]],
    )?;
    let lon = Field::from_parts(
        "lon",
        FieldLayout::new(&[4], &["ncol"])?,
        0,
        vec![vec![100.0, 100.0], vec![250.0, 120.0]],
    )?;

    let params = ParameterList::new("box")
        .with("lat_bounds", [-45.0, 30.0])?
        .with("lon_bounds", [90.0, 180.0])?
        .with("mask_value", 0.0)?;
    let out = compute_stat(&ctx, "bounding_box", params, &field, &[&lat, &lon])?;
    // Columns 0 and 1 are inside (lat edge inclusive); 2 fails lon, 3 fails lat
    assert_eq!(out.to_vec::<Real>()?, vec![1.0, 2.0, 3.0, 4.0, 0.0, 0.0, 0.0, 0.0]);

    let params = ParameterList::new("box_top")
        .with("lat_bounds", [-45.0, 30.0])?
        .with("lon_bounds", [90.0, 180.0])?
        .with("lev_bounds", [1, 1])?
        .with("mask_value", -9.0)?;
    let out = compute_stat(&ctx, "bounding_box", params, &field, &[&lat, &lon])?;
    assert_eq!(out.to_vec::<Real>()?, vec![-9.0, 2.0, -9.0, 4.0, -9.0, -9.0, -9.0, -9.0]);
    Ok(())
}

#[test]
fn test_bounding_box_rejects_mismatched_coordinates() -> Result<()> {
    let ctx = StatContext::serial();
    let field = split_field("T", &[4, 2], &[1.0; 8], 0, &[2, 2])?;
    let lat = column_field("lat", vec![0.0; 4])?;
    let lon = column_field("lon", vec![0.0; 4])?;
    let params = ParameterList::new("box")
        .with("lat_bounds", [-10.0, 10.0])?
        .with("lon_bounds", [-10.0, 10.0])?;
    // The input has two partitions, the coordinates only one
    assert!(matches!(
        compute_stat(&ctx, "bounding_box", params.clone(), &field, &[&lat, &lon]),
        Err(StatsError::IncompatibleAuxField { .. })
    ));
    assert!(matches!(
        compute_stat(&ctx, "bounding_box", params, &field, &[&lat]),
        Err(StatsError::MissingAuxField { .. })
    ));
    Ok(())
}

#[test]
fn test_zonal_mean_of_a_constant_is_the_constant() -> Result<()> {
    let ctx = StatContext::serial();
    let lat_values = vec![-80.0, -30.0, -5.0, 0.0, 12.5, 30.0, 75.0];
    let area_values = vec![0.1, 0.7, 1.3, 0.2, 2.9, 0.05, 1.0];
    for extents in [&[7][..], &[3, 4][..], &[1, 1, 5][..]] {
        let split = |name: &str, values: &[Real]| -> Result<Field> {
            let mut parts = Vec::new();
            let mut start = 0;
            for &e in extents {
                parts.push(values[start..start + e].to_vec());
                start += e;
            }
            Field::from_parts(name, FieldLayout::new(&[7], &["ncol"])?, 0, parts)
        };
        let lat = split("lat", &lat_values)?;
        let area = split("area", &area_values)?;
        let field = split_field("T", &[7, 2], &[3.25; 14], 0, extents)?;

        for band in [[-30.0, 30.0], [-90.0, 90.0], [10.0, 20.0]] {
            let params = ParameterList::new("T_zonal").with("lat_bounds", band)?;
            let out = compute_stat(&ctx, "zonal_mean", params, &field, &[&lat, &area])?;
            assert_eq!(out.layout().names(), &["lev".to_string()]);
            for v in out.to_vec::<Real>()? {
                assert!((v - 3.25).abs() < 1e-12, "band {band:?}: {v}");
            }
        }

        let empty = ParameterList::new("T_polar").with("lat_bounds", [85.0, 90.0])?;
        assert!(matches!(
            compute_stat(&ctx, "zonal_mean", empty, &field, &[&lat, &area]),
            Err(StatsError::StatConfig { .. })
        ));
    }
    Ok(())
}

#[test]
fn test_zonal_mean_weights_by_area() -> Result<()> {
    let ctx = StatContext::serial();
    let lat = column_field("lat", vec![-10.0, 0.0, 10.0, 50.0])?;
    let area = column_field("area", vec![1.0, 2.0, 1.0, 4.0])?;
    let field = column_field("T", vec![4.0, 1.0, 2.0, 100.0])?;
    let params = ParameterList::new("T_trop").with("lat_bounds", [-20.0, 20.0])?;

    let mut stat = ctx.create_stat("zonal_mean", &params)?;
    stat.set_field(&field)?;
    stat.set_aux_fields(&BTreeMap::from([
        ("lat".to_string(), lat),
        ("area".to_string(), area),
    ]))?;
    stat.create_stat_field()?;
    let out = stat.compute(&now()?)?;
    assert_eq!(out.layout().rank(), 0);
    assert_eq!(out.to_vec::<Real>()?, vec![2.0]);
    Ok(())
}

#[test]
fn test_stat_lifecycle_is_enforced() -> Result<()> {
    let ctx = StatContext::serial();
    let field = column_field("T", vec![1.0, 2.0])?;
    let mut stat = ctx.create_stat("global_max", &ParameterList::new("T_max"))?;

    assert!(matches!(
        stat.create_stat_field(),
        Err(StatsError::StatProtocol { .. })
    ));
    stat.set_field(&field)?;
    assert!(matches!(
        stat.compute(&now()?),
        Err(StatsError::StatProtocol { .. })
    ));
    stat.create_stat_field()?;
    assert_eq!(stat.stat_field()?.name(), "T_max");
    assert_eq!(stat.compute(&now()?)?.to_vec::<Real>()?, vec![2.0]);

    // Stats never write through their input
    assert!(matches!(
        stat.base().field()?.data_mut::<Real>(),
        Err(StatsError::FieldProtocol { .. })
    ));

    let layout = FieldLayout::new(&[2], &["ncol"])?;
    let mut uncommitted = Field::single_part("U", layout, DataAccess::Copy, DataType::Real)?;
    assert!(matches!(
        stat.set_field(&uncommitted),
        Err(StatsError::StatProtocol { .. })
    ));
    uncommitted.commit()?;
    stat.set_field(&uncommitted)?;
    Ok(())
}

#[test]
fn test_stat_results_follow_view_updates() -> Result<()> {
    let ctx = StatContext::serial();
    let field = column_field("T", vec![1.0, 2.0, 3.0])?;
    let mut stat = ctx.create_stat("global_sum", &ParameterList::new("T_sum"))?;
    stat.set_field(&field)?;
    stat.create_stat_field()?;
    assert_eq!(stat.compute(&now()?)?.to_vec::<Real>()?, vec![6.0]);

    field.part_buffer::<Real>(0)?.write().expect("lock")[2] = 30.0;
    assert_eq!(stat.compute(&now()?)?.to_vec::<Real>()?, vec![33.0]);
    Ok(())
}

#[test]
fn test_unsupported_rank_is_reported() -> Result<()> {
    let ctx = StatContext::serial();
    let scalar = Field::from_vec("s", FieldLayout::scalar(), vec![1.0])?;
    match compute_stat(&ctx, "global_sum", ParameterList::new("s_sum"), &scalar, &[]) {
        Err(StatsError::UnsupportedRank { stat, field, rank }) => {
            assert_eq!(stat, "s_sum");
            assert_eq!(field, "s");
            assert_eq!(rank, 0);
        }
        other => panic!("expected an unsupported rank error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_factory_lookup_and_override() -> Result<()> {
    let ctx = StatContext::serial();
    assert!(matches!(
        ctx.create_stat("global_median", &ParameterList::new("x")),
        Err(StatsError::UnknownStatType { .. })
    ));
    assert!(ctx.factory().is_registered("pipe"));
    assert!(ctx.factory().is_registered("bounded_masked_integral"));

    let mut factory = StatFactory::with_builtin_stats();
    factory.register("global_max", |ctx, pl| {
        Ok(Box::new(FieldGlobalStat::new(ctx, pl, StatOperation::Min)?))
    });
    factory.register("zonal_band", insitu_stats::create_stat::<FieldZonalMean>);
    let ctx = StatContext::new(Arc::new(SerialComm), Arc::new(factory));

    let field = column_field("T", vec![4.0, -2.0, 8.0])?;
    let out = compute_stat(&ctx, "global_max", ParameterList::new("m"), &field, &[])?;
    assert_eq!(out.to_vec::<Real>()?, vec![-2.0]);

    let stat = FieldZonalMean::build(&ctx, &ParameterList::new("z").with("lat_bounds", [0.0, 1.0])?)?;
    assert_eq!(stat.type_name(), "zonal_mean");
    let stat = ctx.create_stat("zonal_band", &ParameterList::new("z").with("lat_bounds", [0.0, 1.0])?)?;
    assert_eq!(stat.aux_fields_names(), vec!["lat".to_string(), "area".to_string()]);
    Ok(())
}

#[test]
fn test_missing_parameters_are_configuration_errors() -> Result<()> {
    let ctx = StatContext::serial();
    assert!(matches!(
        ctx.create_stat("bounded", &ParameterList::new("b")),
        Err(StatsError::MissingParameter { .. })
    ));
    assert!(matches!(
        ctx.create_stat("bounded", &ParameterList::new("b").with("bounds", [3.0, 1.0])?),
        Err(StatsError::InvalidParameter { .. })
    ));
    assert!(matches!(
        ctx.create_stat("masked_integral", &ParameterList::new("mi")),
        Err(StatsError::MissingParameter { .. })
    ));
    Ok(())
}
