//! Property tests for the combined concatenation plan.

use bc_columnar::{Array, Block, BlockManager, BlockPlacement};
use bc_concat::{
    AxisIndexers, ConcatAxis, CopyPolicy, OutputAxes, combined_plan, concatenate_managers,
};
use bc_index::Index;
use bc_types::{DType, Promoter, Scalar};
use proptest::prelude::*;

/// An integer manager over `ncols` columns whose blocks are derived from an
/// arbitrary column-to-group assignment, so placements may be scattered.
fn manager_strategy(ncols: usize, seed: i64) -> impl Strategy<Value = BlockManager> {
    (1..4usize, proptest::collection::vec(0..3usize, ncols)).prop_map(move |(nrows, groups)| {
        let mut seen: Vec<usize> = Vec::new();
        for group in &groups {
            if !seen.contains(group) {
                seen.push(*group);
            }
        }
        let blocks: Vec<Block> = seen
            .iter()
            .map(|group| {
                let positions: Vec<usize> = groups
                    .iter()
                    .enumerate()
                    .filter(|(_, g)| *g == group)
                    .map(|(pos, _)| pos)
                    .collect();
                let columns: Vec<Vec<Scalar>> = positions
                    .iter()
                    .map(|pos| {
                        (0..nrows)
                            .map(|row| Scalar::Int64(seed + (*pos as i64) * 100 + row as i64))
                            .collect()
                    })
                    .collect();
                let array = Array::from_columns(DType::Int64, columns).expect("array");
                Block::new(array, BlockPlacement::from_indices(positions)).expect("block")
            })
            .collect();
        BlockManager::new(blocks, Index::positional(ncols), Index::positional(nrows))
            .expect("manager")
    })
}

fn pair_strategy() -> impl Strategy<Value = (usize, BlockManager, BlockManager)> {
    (1..7usize).prop_flat_map(|ncols| {
        (
            Just(ncols),
            manager_strategy(ncols, 1_000),
            manager_strategy(ncols, 2_000),
        )
    })
}

proptest! {
    #[test]
    fn plan_covers_every_column_exactly_once((ncols, left, right) in pair_strategy()) {
        let plan = combined_plan(&[&left, &right]).expect("plan");
        let mut covered = vec![false; ncols];
        for (placement, units) in &plan {
            prop_assert_eq!(units.len(), 2);
            for unit in units {
                prop_assert_eq!(unit.block().values().ncols(), placement.len());
            }
            for pos in placement.iter() {
                prop_assert!(pos < ncols);
                prop_assert!(!covered[pos], "column {} planned twice", pos);
                covered[pos] = true;
            }
        }
        prop_assert!(covered.into_iter().all(|hit| hit));
    }

    #[test]
    fn row_concat_preserves_per_column_values((ncols, left, right) in pair_strategy()) {
        let total_rows = left.rows().len() + right.rows().len();
        let axes = OutputAxes {
            columns: Index::positional(ncols),
            rows: Index::positional(total_rows),
        };
        let out = concatenate_managers(
            &[
                (left.clone(), AxisIndexers::aligned()),
                (right.clone(), AxisIndexers::aligned()),
            ],
            &axes,
            ConcatAxis::Rows,
            CopyPolicy::View,
            &Promoter,
        )
        .expect("concat");

        prop_assert_eq!(out.shape(), (ncols, total_rows));
        for pos in 0..ncols {
            let mut expected = left.column_values(pos).expect("left column");
            expected.extend(right.column_values(pos).expect("right column"));
            prop_assert_eq!(out.column_values(pos).expect("column"), expected);
        }
    }
}
