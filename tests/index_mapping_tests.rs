//! Partition-to-global index mapping and compensated summation

use insitu_stats::{
    errors::Result,
    field::Field,
    layout::FieldLayout,
    statistics::utils::{
        compute_field_dim_index, compute_stat_index, compute_stat_strides, ravel_index,
        unravel_index, KahanSum, PartitionIndexMap,
    },
    Real,
};
use ndarray::{ArrayD, Axis, IxDyn, Slice};
use std::collections::BTreeSet;

const DIMS: [usize; 3] = [4, 3, 5];
const NAMES: [&str; 3] = ["ncol", "lev", "cmp"];

/// Split `extent` into up to three uneven, non-empty pieces
fn splits(extent: usize) -> Vec<Vec<usize>> {
    let mut out = vec![vec![extent]];
    if extent >= 2 {
        out.push(vec![1, extent - 1]);
    }
    if extent >= 3 {
        out.push(vec![extent - 2, 1, 1]);
    }
    out
}

/// Field whose entries hold their own global row-major index
fn indexed_field(rank: usize, part_dim: usize, extents: &[usize]) -> Result<Field> {
    let dims = &DIMS[..rank];
    let layout = FieldLayout::new(dims, &NAMES[..rank])?;
    let global = ArrayD::from_shape_vec(IxDyn(dims), (0..layout.size()).map(|i| i as Real).collect())?;
    let mut parts = Vec::new();
    let mut start = 0;
    for &extent in extents {
        let slab = global.slice_axis(Axis(part_dim), Slice::from(start..start + extent));
        parts.push(slab.iter().copied().collect::<Vec<Real>>());
        start += extent;
    }
    Field::from_parts("idx", layout, part_dim, parts)
}

#[test]
fn test_index_map_is_a_bijection() -> Result<()> {
    for rank in 1..=3 {
        for part_dim in 0..rank {
            for extents in splits(DIMS[part_dim]) {
                let field = indexed_field(rank, part_dim, &extents)?;
                let size = field.layout().size();
                let mut seen = BTreeSet::new();
                for ipart in 0..field.nparts() {
                    let map = PartitionIndexMap::new(&field, ipart, field.layout().dims())?;
                    let part = field.part_data::<Real>(ipart)?;
                    for (local, &value) in part.view_dyn()?.iter().enumerate() {
                        let global = map.global_index(local);
                        assert_eq!(
                            global as Real, value,
                            "rank {rank} part_dim {part_dim} extents {extents:?}"
                        );
                        assert!(seen.insert(global));
                    }
                }
                assert_eq!(seen.len(), size);
                assert_eq!(seen.iter().next_back().copied(), Some(size - 1));

                let expected: Vec<Real> = (0..size).map(|i| i as Real).collect();
                assert_eq!(field.to_vec::<Real>()?, expected);
            }
        }
    }
    Ok(())
}

#[test]
fn test_global_coords_follow_the_offset() -> Result<()> {
    let field = indexed_field(3, 1, &[1, 2])?;
    let map = PartitionIndexMap::new(&field, 1, field.layout().dims())?;
    assert_eq!(map.offset(), 1);
    assert_eq!(map.part_dims(), &[4, 2, 5]);
    // Local entry 5 of partition 1 is (0, 1, 0) locally, (0, 2, 0) globally
    assert_eq!(map.global_coords(5), [0, 2, 0]);
    assert_eq!(map.global_index(5), 10);
    Ok(())
}

#[test]
fn test_stride_helpers() {
    assert_eq!(compute_stat_strides(&[4, 3, 5]), vec![15, 5, 1]);
    assert_eq!(compute_stat_strides(&[7]), vec![1]);
    assert!(compute_stat_strides(&[]).is_empty());

    assert_eq!(unravel_index(23, &[4, 3, 5]), [1, 1, 3]);
    assert_eq!(ravel_index(&[1, 1, 3], &[15, 5, 1]), 23);
    assert_eq!(compute_field_dim_index(23, 0, &[4, 3, 5]), 1);
    assert_eq!(compute_field_dim_index(23, 1, &[4, 3, 5]), 1);
    assert_eq!(compute_field_dim_index(23, 2, &[4, 3, 5]), 3);

    // Entry 1 of a 2x2 partition starting at column 2 of a 4x2 output
    assert_eq!(compute_stat_index(2, 1, 0, &[2, 2], &[2, 1]), 5);
}

#[test]
fn test_compensated_summation() {
    let sum: KahanSum<Real> = [1e16, 1.0, -1e16].into_iter().collect();
    assert_eq!(sum.value(), 1.0);

    let naive: Real = [1e16, 1.0, -1e16].iter().sum();
    assert_eq!(naive, 0.0);

    let mut small = KahanSum::<Real>::new();
    for _ in 0..10 {
        small.add(0.1);
    }
    assert_eq!(small.value(), 1.0);
}
