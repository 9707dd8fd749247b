//! Vertical contraction and stat pipes

use insitu_stats::{
    errors::{Result, StatsError},
    field::Field,
    layout::FieldLayout,
    params::ParameterList,
    statistics::{FieldStat, StatContext},
    Real, TimeStamp,
};
use std::collections::BTreeMap;

fn now() -> Result<TimeStamp> {
    TimeStamp::new(20000101, 0)
}

/// v[c][l] = 3c + l over (ncol=4, lev=3)
fn column_field() -> Result<Field> {
    let values: Vec<Real> = (0..12).map(Real::from).collect();
    Field::from_vec("T", FieldLayout::new(&[4, 3], &["ncol", "lev"])?, values)
}

fn compute(
    ctx: &StatContext,
    stat_type: &str,
    params: &ParameterList,
    field: &Field,
    aux: &BTreeMap<String, Field>,
) -> Result<Field> {
    let mut stat = ctx.create_stat(stat_type, params)?;
    stat.set_field(field)?;
    stat.set_aux_fields(aux)?;
    stat.create_stat_field()?;
    stat.compute(&now()?)
}

#[test]
fn test_vertical_sum_and_mean() -> Result<()> {
    let ctx = StatContext::serial();
    let field = column_field()?;
    let none = BTreeMap::new();

    let params = ParameterList::new("T_vsum").with("average", false)?;
    let out = compute(&ctx, "vertical_contraction", &params, &field, &none)?;
    assert_eq!(out.layout().names(), &["ncol".to_string()]);
    assert_eq!(out.to_vec::<Real>()?, vec![3.0, 12.0, 21.0, 30.0]);

    let params = ParameterList::new("T_vmean").with("level_bounds", [1, 2])?;
    let out = compute(&ctx, "vertical_contraction", &params, &field, &none)?;
    assert_eq!(out.to_vec::<Real>()?, vec![1.5, 4.5, 7.5, 10.5]);
    Ok(())
}

#[test]
fn test_vertical_weights() -> Result<()> {
    let ctx = StatContext::serial();
    let dp = Field::from_vec("dp", FieldLayout::new(&[3], &["lev"])?, vec![1.0, 2.0, 1.0])?;
    let aux = BTreeMap::from([("dp".to_string(), dp)]);
    let params = ParameterList::new("T_wmean").with("weight_field", "dp")?;

    // Same result whether levels or columns are split
    let values: Vec<Real> = (0..12).map(Real::from).collect();
    let by_lev = Field::from_parts(
        "T",
        FieldLayout::new(&[4, 3], &["ncol", "lev"])?,
        1,
        vec![
            values.iter().copied().filter(|v| *v as usize % 3 == 0).collect(),
            values.iter().copied().filter(|v| *v as usize % 3 != 0).collect(),
        ],
    )?;
    for field in [column_field()?, by_lev] {
        let out = compute(&ctx, "vertical_contraction", &params, &field, &aux)?;
        assert_eq!(out.to_vec::<Real>()?, vec![1.0, 4.0, 7.0, 10.0]);
    }

    let bad = Field::from_vec("dp", FieldLayout::new(&[4], &["ncol"])?, vec![1.0; 4])?;
    let aux = BTreeMap::from([("dp".to_string(), bad)]);
    assert!(matches!(
        compute(&ctx, "vertical_contraction", &params, &column_field()?, &aux),
        Err(StatsError::IncompatibleAuxField { .. })
    ));
    Ok(())
}

#[test]
fn test_vertical_contraction_errors() -> Result<()> {
    let ctx = StatContext::serial();
    let params = ParameterList::new("T_deep").with("level_bounds", [0, 3])?;
    let mut stat = ctx.create_stat("vertical_contraction", &params)?;
    assert!(matches!(
        stat.set_field(&column_field()?),
        Err(StatsError::StatConfig { .. })
    ));

    let flat = Field::from_vec("ps", FieldLayout::new(&[4], &["ncol"])?, vec![1.0; 4])?;
    let mut stat = ctx.create_stat("vertical_contraction", &ParameterList::new("ps_v"))?;
    assert!(matches!(
        stat.set_field(&flat),
        Err(StatsError::DimensionNotFound { .. })
    ));

    assert!(matches!(
        ctx.create_stat(
            "vertical_contraction",
            &ParameterList::new("x").with("level_bounds", [2, 1])?
        ),
        Err(StatsError::InvalidParameter { .. })
    ));
    Ok(())
}

#[test]
fn test_interface_levels_are_found() -> Result<()> {
    let ctx = StatContext::serial();
    let field = Field::from_vec(
        "w",
        FieldLayout::new(&[2, 2], &["ilev", "ncol"])?,
        vec![1.0, 2.0, 3.0, 4.0],
    )?;
    let params = ParameterList::new("w_v").with("average", false)?;
    let out = compute(&ctx, "vertical_contraction", &params, &field, &BTreeMap::new())?;
    assert_eq!(out.to_vec::<Real>()?, vec![4.0, 6.0]);
    Ok(())
}

#[test]
fn test_pipe_matches_the_direct_reduction() -> Result<()> {
    let ctx = StatContext::serial();
    let field = column_field()?;
    let none = BTreeMap::new();

    let params = ParameterList::new("T_total")
        .with_sublist(
            "inner",
            ParameterList::new("inner")
                .with("type", "vertical_contraction")?
                .with("average", false)?,
        )
        .with_sublist(
            "outer",
            ParameterList::new("outer").with("type", "sum_along_columns")?,
        );
    let mut pipe = ctx.create_stat("pipe", &params)?;
    pipe.set_field(&field)?;
    pipe.set_aux_fields(&none)?;
    pipe.create_stat_field()?;
    let piped = pipe.compute(&now()?)?;
    assert_eq!(piped.name(), "T_total");

    let direct = compute(&ctx, "global_sum", &ParameterList::new("T_sum"), &field, &none)?;
    assert_eq!(piped.to_vec::<Real>()?, direct.to_vec::<Real>()?);
    assert_eq!(piped.to_vec::<Real>()?, vec![66.0]);

    // Later computes see updated input values
    field.data_mut::<Real>()?.as_mut_slice()[0] = 100.0;
    assert_eq!(pipe.compute(&now()?)?.to_vec::<Real>()?, vec![166.0]);
    Ok(())
}

#[test]
fn test_pipe_matches_the_direct_reduction_on_rank_three() -> Result<()> {
    let ctx = StatContext::serial();
    let none = BTreeMap::new();
    // (ncol=4, cmp=2, lev=3) split along ncol into extents 1 and 3
    let values: Vec<Real> = (0..24).map(|i| Real::from(i % 7) - 1.5).collect();
    let field = Field::from_parts(
        "U",
        FieldLayout::new(&[4, 2, 3], &["ncol", "cmp", "lev"])?,
        0,
        vec![values[..6].to_vec(), values[6..].to_vec()],
    )?;
    assert_eq!(field.nparts(), 2);

    let params = ParameterList::new("U_columns")
        .with_sublist(
            "inner",
            ParameterList::new("inner")
                .with("type", "vertical_contraction")?
                .with("average", false)?,
        )
        .with_sublist(
            "outer",
            ParameterList::new("outer").with("type", "sum_along_columns")?,
        );
    let piped = compute(&ctx, "pipe", &params, &field, &none)?;
    assert_eq!(piped.layout().names(), &["cmp".to_string()]);

    let direct = compute(&ctx, "global_sum", &ParameterList::new("U_sum"), &field, &none)?;
    let total: Real = piped.to_vec::<Real>()?.iter().sum();
    assert!((total - direct.to_vec::<Real>()?[0]).abs() < 1e-12);
    assert_eq!(direct.to_vec::<Real>()?, vec![values.iter().sum::<Real>()]);
    Ok(())
}

#[test]
fn test_pipe_forwards_aux_fields() -> Result<()> {
    let ctx = StatContext::serial();
    let field = column_field()?;
    let lat = Field::from_vec("lat", FieldLayout::new(&[4], &["ncol"])?, vec![-50.0, -10.0, 10.0, 50.0])?;
    let area = Field::from_vec("area", FieldLayout::new(&[4], &["ncol"])?, vec![1.0, 1.0, 3.0, 1.0])?;

    let params = ParameterList::new("T_band_column")
        .with_sublist(
            "inner",
            ParameterList::new("inner")
                .with("type", "zonal_mean")?
                .with("lat_bounds", [-20.0, 20.0])?,
        )
        .with_sublist(
            "outer",
            ParameterList::new("outer")
                .with("type", "vertical_contraction")?
                .with("average", false)?,
        );
    let mut pipe = ctx.create_stat("pipe", &params)?;
    assert_eq!(pipe.aux_fields_names(), vec!["area".to_string(), "lat".to_string()]);
    pipe.set_field(&field)?;
    assert!(matches!(
        pipe.create_stat_field(),
        Err(StatsError::StatProtocol { .. })
    ));
    pipe.set_aux_fields(&BTreeMap::from([
        ("lat".to_string(), lat),
        ("area".to_string(), area),
    ]))?;
    pipe.create_stat_field()?;
    let out = pipe.compute(&now()?)?;
    assert_eq!(out.layout().rank(), 0);
    // Band mean per level: (3 + 3 * 6, 4 + 3 * 7, 5 + 3 * 8) / 4 = [5.25, 6.25, 7.25]
    assert_eq!(out.to_vec::<Real>()?, vec![18.75]);
    Ok(())
}

#[test]
fn test_pipe_requires_both_stages() -> Result<()> {
    let ctx = StatContext::serial();
    let params = ParameterList::new("half").with_sublist(
        "inner",
        ParameterList::new("inner").with("type", "global_sum")?,
    );
    assert!(matches!(
        ctx.create_stat("pipe", &params),
        Err(StatsError::MissingParameter { .. })
    ));

    let params = params.with_sublist("outer", ParameterList::new("outer").with("type", "median")?);
    assert!(matches!(
        ctx.create_stat("pipe", &params),
        Err(StatsError::UnknownStatType { .. })
    ));
    Ok(())
}
