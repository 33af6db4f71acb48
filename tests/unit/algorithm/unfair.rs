//! Tests for nearest, balanced and dithered unfair assignment

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array2, array};
    use photomosaic::algorithm::unfair::{
        DIFFUSION_KERNEL, UsageBalancer, assign_balanced, assign_dithered, assign_nearest,
        diffuse_quantization_error, rank_transform, visiting_order,
    };
    use photomosaic::io::progress::NoProgress;
    use photomosaic::math::backend::CpuBackend;
    use photomosaic::math::distance::{ChunkPlan, DistanceEngine, Metric};
    use photomosaic::spatial::grid::Grid;

    fn engine(keys: Array2<f32>) -> DistanceEngine {
        let Ok(engine) = DistanceEngine::new(&CpuBackend, Metric::Euclidean, keys, 1 << 20) else {
            panic!("engine construction failed");
        };
        engine
    }

    #[test]
    fn test_rank_transform_orders_and_breaks_ties_by_index() {
        assert_eq!(rank_transform(array![3.0f32, 1.0, 2.0].view()), array![2.0, 0.0, 1.0]);
        assert_eq!(rank_transform(array![1.0f32, 1.0, 0.0].view()), array![1.0, 2.0, 0.0]);
    }

    // Tests nearest assignment agrees between chunked and single-pass plans
    // Verified by dropping the last partial chunk
    #[test]
    fn test_assign_nearest_independent_of_chunking() {
        let keys = array![[0.0f32, 0.0], [1.0, 1.0], [0.0, 1.0]];
        let blocks = array![[0.1f32, 0.1], [0.9, 0.8], [0.1, 0.9], [0.6, 0.6], [0.0, 0.7]];
        let engine = engine(keys);

        let single = assign_nearest(&engine, blocks.view(), ChunkPlan::single_pass(5), &NoProgress);
        let chunked = assign_nearest(
            &engine,
            blocks.view(),
            ChunkPlan { stride: 2, num_rows: 5 },
            &NoProgress,
        );
        assert_eq!(single.as_ref().ok(), Some(&vec![0, 1, 2, 1, 2]));
        assert_eq!(single.ok(), chunked.ok());
    }

    // Tests a large multiplier spreads usage evenly
    // Verified by adding the penalty to the raw distance instead of the rank
    #[test]
    fn test_assign_balanced_with_large_multiplier_is_fair() {
        let keys = array![[0.0f32], [0.5], [1.0]];
        let blocks = Array2::from_elem((10, 1), 0.0f32);
        let engine = engine(keys);
        let order = visiting_order(10, false, None);
        let plan = ChunkPlan { stride: 3, num_rows: 10 };

        let Ok(assignment) = assign_balanced(&engine, blocks.view(), plan, 1e6, &order, &NoProgress) else {
            panic!("balanced assignment failed");
        };
        let mut usage = [0usize; 3];
        for tile in assignment {
            usage[tile] += 1;
        }
        let max = usage.iter().max().copied().unwrap_or(0);
        let min = usage.iter().min().copied().unwrap_or(0);
        assert!(max - min <= 1, "{usage:?}");
    }

    // Tests results are indexed by block even when visited out of order
    #[test]
    fn test_assign_balanced_maps_back_to_blocks() {
        let keys = array![[0.0f32], [1.0]];
        let blocks = array![[0.0f32], [1.0], [0.0], [1.0]];
        let engine = engine(keys);
        let order = [3, 1, 0, 2];
        let result = assign_balanced(&engine, blocks.view(), ChunkPlan::single_pass(4), 0.0, &order, &NoProgress);
        assert_eq!(result.ok(), Some(vec![0, 1, 0, 1]));

        let bad = assign_balanced(&engine, blocks.view(), ChunkPlan::single_pass(4), 0.0, &[0, 1], &NoProgress);
        assert!(bad.is_err());
    }

    #[test]
    fn test_usage_balancer_counts_picks() {
        let mut balancer = UsageBalancer::new(2, 5.0);
        let distances = array![0.0f32, 1.0];
        assert_eq!(balancer.pick(distances.view()), 0);
        // Rank 0 + 1 * 5 loses to rank 1 + 0
        assert_eq!(balancer.pick(distances.view()), 1);
        assert_eq!(balancer.usage(), [1, 1]);
    }

    #[test]
    fn test_visiting_order_is_seeded_permutation() {
        assert_eq!(visiting_order(5, false, Some(1)), [0, 1, 2, 3, 4]);

        let first = visiting_order(50, true, Some(42));
        let second = visiting_order(50, true, Some(42));
        assert_eq!(first, second);
        let mut sorted = first;
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }

    // Tests an interior cell passes on its whole error
    // Verified by dropping the lower-left neighbour
    #[test]
    fn test_diffusion_weights_sum_to_one_in_interior() {
        let total: f32 = DIFFUSION_KERNEL.iter().map(|&(_, _, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-6);

        let grid = Grid { cols: 3, rows: 3 };
        let mut blocks = Array2::<f32>::zeros((9, 1));
        let error = Array1::from_elem(1, 16.0f32);
        diffuse_quantization_error(&mut blocks, grid, 1, 1, error.view());

        assert!((blocks.sum() - 16.0).abs() < 1e-5);
        assert!((blocks[(5, 0)] - 7.0).abs() < 1e-6);
        assert!((blocks[(6, 0)] - 3.0).abs() < 1e-6);
        assert!((blocks[(7, 0)] - 5.0).abs() < 1e-6);
        assert!((blocks[(8, 0)] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_diffusion_skips_out_of_bounds_neighbours() {
        let grid = Grid { cols: 2, rows: 2 };
        let mut blocks = Array2::<f32>::zeros((4, 1));
        let error = Array1::from_elem(1, 16.0f32);
        diffuse_quantization_error(&mut blocks, grid, 1, 1, error.view());
        assert!(blocks.iter().all(|&v| v == 0.0));

        diffuse_quantization_error(&mut blocks, grid, 0, 0, error.view());
        assert!((blocks.sum() - 13.0).abs() < 1e-5);
    }

    // Tests carried error flips the choice for the next block
    #[test]
    fn test_assign_dithered_carries_error() {
        let keys = array![[0.0f32], [1.0]];
        let blocks = Array2::from_elem((3, 1), 0.4f32);
        let engine = engine(keys);
        let grid = Grid { cols: 3, rows: 1 };

        let dithered = assign_dithered(&engine, blocks.view(), grid, 0.0, &NoProgress);
        assert_eq!(dithered.ok(), Some(vec![0, 1, 0]));

        let plain = assign_nearest(&engine, blocks.view(), ChunkPlan::single_pass(3), &NoProgress);
        assert_eq!(plain.ok(), Some(vec![0, 0, 0]));

        let mismatched = assign_dithered(&engine, blocks.view(), Grid { cols: 2, rows: 1 }, 0.0, &NoProgress);
        assert!(mismatched.is_err());
    }
}
