//! Field layout, partitioning and commit protocol

use insitu_stats::{
    errors::{Result, StatsError},
    field::{shared_buffer, DataAccess, Field, SharedBuffer},
    layout::FieldLayout,
    DataType, Int, Real,
};

fn ncol_lev(ncol: usize, nlev: usize) -> Result<FieldLayout> {
    FieldLayout::new(&[ncol, nlev], &["ncol", "lev"])
}

#[test]
fn test_layout_validation() -> Result<()> {
    let layout = ncol_lev(4, 3)?;
    assert_eq!(layout.rank(), 2);
    assert_eq!(layout.size(), 12);
    assert_eq!(layout.strides(), vec![3, 1]);
    assert_eq!(layout.dim_idx("lev")?, 1);
    assert_eq!(layout.extent_of("ncol")?, 4);
    assert_eq!(layout.to_string(), "<ncol,lev> (4,3)");
    assert_eq!(layout.strip_dim("ncol")?.dims(), &[3]);

    assert!(matches!(
        FieldLayout::new(&[4, 0], &["ncol", "lev"]),
        Err(StatsError::InvalidLayout { .. })
    ));
    assert!(matches!(
        FieldLayout::new(&[4, 3], &["ncol", "ncol"]),
        Err(StatsError::InvalidLayout { .. })
    ));
    assert!(matches!(
        FieldLayout::new(&[4], &["ncol", "lev"]),
        Err(StatsError::InvalidLayout { .. })
    ));
    assert!(matches!(
        FieldLayout::new(&[2, 2, 2, 2], &["a", "b", "c", "d"]),
        Err(StatsError::InvalidLayout { .. })
    ));
    assert!(matches!(
        layout.dim_idx("time"),
        Err(StatsError::DimensionNotFound { .. })
    ));
    Ok(())
}

#[test]
fn test_commit_reassembles_partitions() -> Result<()> {
    // Two partitions along ncol: columns 0 and 1-3
    let field = Field::from_parts(
        "T",
        ncol_lev(4, 3)?,
        0,
        vec![
            vec![0.0, 1.0, 2.0],
            vec![3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0],
        ],
    )?;
    assert!(field.committed());
    assert_eq!(field.nparts(), 2);
    assert_eq!(field.part_extent(1)?, 3);
    assert_eq!(field.part_offset(1)?, 1);
    assert_eq!(field.part_layout(1)?.dims(), &[3, 3]);
    let expected: Vec<Real> = (0..12).map(Real::from).collect();
    assert_eq!(field.to_vec::<Real>()?, expected);
    Ok(())
}

#[test]
fn test_commit_requires_data_on_every_partition() -> Result<()> {
    let mut field = Field::new("T", ncol_lev(4, 3)?, 2, 0, DataAccess::View, DataType::Real)?;
    field.set_part_extent(0, 2)?;
    field.set_part_extent(1, 2)?;
    field.set_part_data(0, shared_buffer(vec![0.0; 6]))?;
    assert!(matches!(
        field.commit(),
        Err(StatsError::PartitionMismatch { .. })
    ));
    Ok(())
}

#[test]
fn test_commit_requires_extents_to_add_up() -> Result<()> {
    let mut field = Field::new("T", ncol_lev(4, 3)?, 2, 0, DataAccess::View, DataType::Real)?;
    field.set_part_extent(0, 1)?;
    field.set_part_extent(1, 2)?;
    field.set_part_data(0, shared_buffer(vec![0.0; 3]))?;
    field.set_part_data(1, shared_buffer(vec![0.0; 6]))?;
    match field.commit() {
        Err(StatsError::PartitionMismatch { field, message }) => {
            assert_eq!(field, "T");
            assert!(message.contains("add up to 3"));
        }
        other => panic!("expected a partition mismatch, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_commit_rejects_aliased_partitions() -> Result<()> {
    let mut field = Field::new("T", ncol_lev(4, 3)?, 2, 0, DataAccess::View, DataType::Real)?;
    let buffer = shared_buffer(vec![0.0; 6]);
    field.set_part_extent(0, 2)?;
    field.set_part_extent(1, 2)?;
    field.set_part_data(0, buffer.clone())?;
    field.set_part_data(1, buffer)?;
    assert!(matches!(
        field.commit(),
        Err(StatsError::AliasedPartitions {
            first: 0,
            second: 1,
            ..
        })
    ));
    Ok(())
}

#[test]
fn test_protocol_violations() -> Result<()> {
    let mut field = Field::single_part("T", ncol_lev(2, 2)?, DataAccess::View, DataType::Real)?;
    assert!(matches!(
        field.part_data::<Real>(0),
        Err(StatsError::FieldProtocol { .. })
    ));

    field.set_data(shared_buffer(vec![1.0; 4]))?;
    assert!(matches!(
        field.set_data(shared_buffer(vec![2.0; 4])),
        Err(StatsError::FieldProtocol { .. })
    ));
    field.commit()?;
    assert!(matches!(field.commit(), Err(StatsError::FieldProtocol { .. })));
    assert!(matches!(
        field.part_data::<Int>(0),
        Err(StatsError::DataTypeMismatch { .. })
    ));
    assert!(matches!(
        field.copy_data(&[1.0; 4]),
        Err(StatsError::FieldProtocol { .. })
    ));
    Ok(())
}

#[test]
fn test_partition_count_must_fit_the_extent() -> Result<()> {
    assert!(matches!(
        Field::new("T", ncol_lev(2, 3)?, 3, 0, DataAccess::Copy, DataType::Real),
        Err(StatsError::PartitionMismatch { .. })
    ));
    assert!(matches!(
        Field::new("T", ncol_lev(2, 3)?, 1, 2, DataAccess::Copy, DataType::Real),
        Err(StatsError::PartitionMismatch { .. })
    ));
    assert!(matches!(
        Field::new("T", ncol_lev(2, 3)?, 1, 0, DataAccess::Copy, DataType::Invalid),
        Err(StatsError::FieldProtocol { .. })
    ));
    Ok(())
}

#[test]
fn test_view_shares_and_copy_owns() -> Result<()> {
    let buffer = shared_buffer(vec![1.0, 2.0]);
    let layout = FieldLayout::new(&[2], &["ncol"])?;

    let mut view = Field::single_part("v", layout.clone(), DataAccess::View, DataType::Real)?;
    view.set_data(buffer.clone())?;
    view.commit()?;

    let mut copy = Field::single_part("c", layout, DataAccess::Copy, DataType::Real)?;
    copy.copy_data(&buffer.read().expect("lock")[..])?;
    copy.commit()?;

    buffer.write().expect("lock")[0] = 10.0;
    assert_eq!(view.to_vec::<Real>()?, vec![10.0, 2.0]);
    assert_eq!(copy.to_vec::<Real>()?, vec![1.0, 2.0]);

    // Copy fields accept new values after commit
    copy.copy_data(&[5.0, 6.0])?;
    assert_eq!(copy.to_vec::<Real>()?, vec![5.0, 6.0]);
    Ok(())
}

#[test]
fn test_copy_fields_are_zero_initialised() -> Result<()> {
    let mut field = Field::new("z", ncol_lev(3, 2)?, 3, 0, DataAccess::Copy, DataType::Int)?;
    for ipart in 0..3 {
        field.set_part_extent(ipart, 1)?;
    }
    field.commit()?;
    assert_eq!(field.to_vec::<Int>()?, vec![0; 6]);
    Ok(())
}

#[test]
fn test_read_only_handles_refuse_writes() -> Result<()> {
    let field = Field::from_vec("T", FieldLayout::new(&[3], &["ncol"])?, vec![1.0, 2.0, 3.0])?;
    let handle = field.read_only();
    assert!(handle.is_read_only());
    assert!(matches!(
        handle.data_mut::<Real>(),
        Err(StatsError::FieldProtocol { .. })
    ));
    // The original handle still writes, and the read-only one sees it
    field.data_mut::<Real>()?.as_mut_slice()[0] = 7.0;
    assert_eq!(handle.to_vec::<Real>()?[0], 7.0);
    Ok(())
}

#[test]
fn test_update_scale_and_deep_copies() -> Result<()> {
    let layout = ncol_lev(2, 2)?;
    let x = Field::from_parts("x", layout.clone(), 1, vec![vec![1.0, 2.0], vec![3.0, 4.0]])?;
    let y = Field::from_vec("y", layout, vec![10.0, 10.0, 10.0, 10.0])?;

    // x is split along lev: x = [[1, 3], [2, 4]] in row-major order
    assert_eq!(x.to_vec::<Real>()?, vec![1.0, 3.0, 2.0, 4.0]);

    y.update(&x, 2.0, 0.5)?;
    assert_eq!(y.to_vec::<Real>()?, vec![7.0, 11.0, 9.0, 13.0]);

    y.scale(2.0)?;
    assert_eq!(y.to_vec::<Real>()?, vec![14.0, 22.0, 18.0, 26.0]);

    let snapshot = y.deep_clone()?;
    y.deep_copy(&x)?;
    assert_eq!(y.to_vec::<Real>()?, x.to_vec::<Real>()?);
    assert_eq!(snapshot.to_vec::<Real>()?, vec![14.0, 22.0, 18.0, 26.0]);

    y.deep_copy_value(0.0)?;
    assert_eq!(y.to_vec::<Real>()?, vec![0.0; 4]);
    Ok(())
}

fn two_part_view(name: &str, first: &[Real], second: &[Real]) -> Result<(Field, Vec<SharedBuffer<Real>>)> {
    let layout = FieldLayout::new(&[4], &["ncol"])?;
    let buffers = vec![shared_buffer(first.to_vec()), shared_buffer(second.to_vec())];
    let mut field = Field::new(name, layout, 2, 0, DataAccess::View, DataType::Real)?;
    for (ipart, buffer) in buffers.iter().enumerate() {
        field.set_part_extent(ipart, 2)?;
        field.set_part_data(ipart, buffer.clone())?;
    }
    field.commit()?;
    Ok((field, buffers))
}

fn with_shared_first_part(name: &str, src: &[SharedBuffer<Real>], second: &[Real]) -> Result<Field> {
    let mut field = Field::new(name, FieldLayout::new(&[4], &["ncol"])?, 2, 0, DataAccess::View, DataType::Real)?;
    field.set_part_extent(0, 2)?;
    field.set_part_extent(1, 2)?;
    field.set_part_data(0, src[0].clone())?;
    field.set_part_data(1, shared_buffer(second.to_vec()))?;
    field.commit()?;
    Ok(field)
}

#[test]
fn test_partly_shared_storage_is_copied_in_full() -> Result<()> {
    let (src, buffers) = two_part_view("src", &[1.0, 2.0], &[3.0, 4.0])?;

    let dst = with_shared_first_part("dst", &buffers, &[0.0, 0.0])?;
    dst.deep_copy(&src)?;
    assert_eq!(dst.to_vec::<Real>()?, vec![1.0, 2.0, 3.0, 4.0]);

    let y = with_shared_first_part("y", &buffers, &[10.0, 10.0])?;
    y.update(&src, 1.0, 1.0)?;
    assert_eq!(y.to_vec::<Real>()?, vec![2.0, 4.0, 13.0, 14.0]);

    // Fully shared storage still updates in place
    let (x, _) = two_part_view("x", &[1.0, 2.0], &[3.0, 4.0])?;
    let alias = x.clone();
    alias.update(&x, 1.0, 1.0)?;
    assert_eq!(x.to_vec::<Real>()?, vec![2.0, 4.0, 6.0, 8.0]);
    Ok(())
}

#[test]
fn test_padded_partitions() -> Result<()> {
    let mut field = Field::new("T", ncol_lev(3, 2)?, 2, 0, DataAccess::View, DataType::Real)?
        .with_part_dim_alloc_size(2)?;
    field.set_part_extent(0, 2)?;
    field.set_part_extent(1, 1)?;
    field.set_part_data(0, shared_buffer(vec![0.0, 1.0, 2.0, 3.0]))?;
    // Second partition holds one column but is allocated for two
    field.set_part_data(1, shared_buffer(vec![4.0, 5.0, -1.0, -1.0]))?;
    field.commit()?;
    assert!(field.part_layout(1)?.is_padded());
    assert_eq!(field.to_vec::<Real>()?, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    Ok(())
}
