//! Tests for tile normalization, loading and duplication

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};
    use photomosaic::io::progress::NoProgress;
    use photomosaic::spatial::tiles::{
        ResizeMode, Rotation, Tile, TilePool, TileReader, TileSize, dup_to_meet_total,
        duplicated_total, infer_height, prepare_tile, scan_files,
    };

    const RED: Rgb<u8> = Rgb([255, 0, 0]);
    const BLUE: Rgb<u8> = Rgb([0, 0, 255]);

    fn solid(w: u32, h: u32, color: Rgb<u8>) -> RgbImage {
        RgbImage::from_pixel(w, h, color)
    }

    // Top half red, bottom half blue
    fn split_vertical(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |_, y| if y < h / 2 { RED } else { BLUE })
    }

    #[test]
    fn test_tile_pool_rejects_empty_and_mixed_sizes() {
        assert!(TilePool::from_tiles(Vec::new()).is_err());

        let mixed = vec![
            Tile::new(solid(4, 4, RED), "a"),
            Tile::new(solid(4, 5, RED), "b"),
        ];
        assert!(TilePool::from_tiles(mixed).is_err());
    }

    // Tests lookup, selection by instance index and reordering
    // Verified by returning the pool unchanged from reordered
    #[test]
    fn test_tile_pool_select_and_reorder() {
        let tiles = ["a", "b", "c"]
            .iter()
            .map(|label| Tile::new(solid(3, 2, RED), *label))
            .collect();
        let Ok(pool) = TilePool::from_tiles(tiles) else {
            panic!("pool rejected");
        };
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.tile_size(), (3, 2));
        assert_eq!(pool.failed(), 0);

        let picked = pool.select(&[2, 0, 2]).unwrap_or_default();
        let labels: Vec<&str> = picked.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, ["c", "a", "c"]);
        assert!(pool.select(&[3]).is_err());

        let reordered = pool.reordered(&[1, 2, 0]);
        let labels: Vec<&str> = reordered.tiles().iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, ["b", "c", "a"]);
    }

    #[test]
    fn test_rotation_and_size_flags() {
        assert_eq!(Rotation::from_flag(0).ok(), Some(Rotation::Off));
        assert_eq!(Rotation::from_flag(1).ok(), Some(Rotation::CounterClockwise));
        assert_eq!(Rotation::from_flag(-1).ok(), Some(Rotation::Clockwise));
        assert!(Rotation::from_flag(2).is_err());

        let size = TileSize::from_values(&[50]);
        assert_eq!(size.as_ref().map(|s| s.height).ok(), Some(None));
        assert_eq!(
            TileSize::from_values(&[50, 30]).map(|s| s.to_string()).ok(),
            Some("50x30".to_string())
        );
        assert!(TileSize::from_values(&[]).is_err());
        assert!(TileSize::from_values(&[0]).is_err());
        assert!(TileSize::from_values(&[1, 2, 3]).is_err());
    }

    // Tests every resize mode reaches the exact target size
    #[test]
    fn test_prepare_tile_produces_requested_size() {
        let img = solid(37, 23, RED);
        for mode in [ResizeMode::Center, ResizeMode::Stretch, ResizeMode::Fit] {
            let out = prepare_tile(&img, (10, 14), mode, Rotation::Off);
            assert_eq!(out.dimensions(), (10, 14), "{mode:?}");
        }
    }

    // Tests center crop keeps the middle of a wide image
    // Verified by cropping from the left edge
    #[test]
    fn test_prepare_tile_center_crops_middle() {
        // Left and right quarters blue, middle half red
        let img = RgbImage::from_fn(40, 20, |x, _| if (10..30).contains(&x) { RED } else { BLUE });
        let out = prepare_tile(&img, (10, 10), ResizeMode::Center, Rotation::Off);
        assert!(out.pixels().all(|p| p[0] > 200 && p[2] < 50));
    }

    // Tests fit mode pads with black bars
    #[test]
    fn test_prepare_tile_fit_letterboxes() {
        let img = solid(40, 20, Rgb([255, 255, 255]));
        let out = prepare_tile(&img, (10, 10), ResizeMode::Fit, Rotation::Off);
        assert_eq!(*out.get_pixel(5, 0), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(5, 9), Rgb([0, 0, 0]));
        assert!(out.get_pixel(5, 5).0.iter().all(|&c| c > 250));
    }

    // Tests auto rotation direction on a portrait tile with a landscape target
    // Verified by swapping the clockwise and counterclockwise turns
    #[test]
    fn test_prepare_tile_rotates_when_transpose_fits_better() {
        let img = split_vertical(20, 40);

        let ccw = prepare_tile(&img, (40, 20), ResizeMode::Stretch, Rotation::CounterClockwise);
        assert_eq!(*ccw.get_pixel(2, 10), RED);
        assert_eq!(*ccw.get_pixel(37, 10), BLUE);

        let cw = prepare_tile(&img, (40, 20), ResizeMode::Stretch, Rotation::Clockwise);
        assert_eq!(*cw.get_pixel(2, 10), BLUE);
        assert_eq!(*cw.get_pixel(37, 10), RED);

        // Already matching orientation is never rotated
        let landscape = prepare_tile(&split_vertical(40, 20), (40, 20), ResizeMode::Stretch, Rotation::Clockwise);
        assert_eq!(*landscape.get_pixel(20, 1), RED);
    }

    #[test]
    fn test_infer_height_uses_most_common_ratio() {
        let dims = [(100, 50), (200, 100), (30, 30)];
        assert_eq!(infer_height(&dims, 50), Some(25));

        // Tie between 2:1 and 1:1 goes to the wider ratio
        assert_eq!(infer_height(&[(30, 30), (100, 50)], 50), Some(25));
        assert_eq!(infer_height(&[], 50), None);
    }

    // Tests that reading skips undecodable files and counts them
    // Verified by propagating the first decode error
    #[test]
    fn test_tile_reader_skips_and_counts_failures() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir unavailable");
        };
        for name in ["b.png", "a.png", "c.png"] {
            assert!(solid(20, 10, RED).save(dir.path().join(name)).is_ok());
        }
        assert!(std::fs::write(dir.path().join("notes.txt"), "not an image").is_ok());

        let mut reader = TileReader::new(TileSize { width: 10, height: None });
        reader.workers = 2;
        let Ok(pool) = reader.read(dir.path(), &NoProgress) else {
            panic!("reading tiles failed");
        };
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.failed(), 1);
        assert_eq!(pool.tile_size(), (10, 5));
        assert!(pool.tiles()[0].label.ends_with("a.png"));
        assert!(pool.tiles()[2].label.ends_with("c.png"));
    }

    // Tests parallel decoding keeps directory order whatever the worker count
    // Verified by collecting tiles in completion order
    #[test]
    fn test_tile_reader_keeps_order_across_workers() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir unavailable");
        };
        for k in 0..12u8 {
            let tile = solid(8, 8, Rgb([k * 20, 0, 0]));
            assert!(tile.save(dir.path().join(format!("tile_{k:02}.png"))).is_ok());
        }

        for workers in [1, 3, 16] {
            let mut reader = TileReader::new(TileSize { width: 4, height: Some(4) });
            reader.workers = workers;
            let Ok(pool) = reader.read(dir.path(), &NoProgress) else {
                panic!("reading tiles failed with {workers} workers");
            };
            assert_eq!(pool.failed(), 0);
            let reds: Vec<u8> = pool.tiles().iter().map(|t| t.pixels.get_pixel(0, 0)[0]).collect();
            let expected: Vec<u8> = (0..12u8).map(|k| k * 20).collect();
            assert_eq!(reds, expected);
        }
    }

    #[test]
    fn test_scan_files_recursion() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir unavailable");
        };
        let nested = dir.path().join("nested");
        assert!(std::fs::create_dir(&nested).is_ok());
        assert!(std::fs::write(dir.path().join("top.png"), b"x").is_ok());
        assert!(std::fs::write(nested.join("deep.png"), b"x").is_ok());

        assert_eq!(scan_files(dir.path(), false).map(|f| f.len()).ok(), Some(1));
        assert_eq!(scan_files(dir.path(), true).map(|f| f.len()).ok(), Some(2));
        assert!(scan_files(&dir.path().join("missing"), false).is_err());
    }

    // Tests duplication factor rounding, including halves to even
    #[test]
    fn test_duplicated_total() {
        assert_eq!(duplicated_total(5, 2.0), 10);
        assert_eq!(duplicated_total(3, 0.5), 2);
        assert_eq!(duplicated_total(5, 0.5), 2);
        assert_eq!(duplicated_total(7, 1.0), 7);
    }

    // Tests that every tile appears floor or ceil of total/pool times
    // Verified by appending the extra instances from the end of the pool
    #[test]
    fn test_dup_to_meet_total_balances_usage() {
        let (indices, report) = dup_to_meet_total(3, 7);
        assert_eq!(indices, [0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(report.full_copies, 2);
        assert_eq!(report.extra, 1);
        assert_eq!(report.unused, 0);

        for pool in 1..8 {
            for total in 0..30 {
                let (indices, _) = dup_to_meet_total(pool, total);
                assert_eq!(indices.len(), total);
                let mut counts = vec![0usize; pool];
                for i in indices {
                    counts[i] += 1;
                }
                let max = counts.iter().max().copied().unwrap_or(0);
                let min = counts.iter().min().copied().unwrap_or(0);
                assert!(max - min <= 1, "pool={pool} total={total}: {counts:?}");
            }
        }
    }

    #[test]
    fn test_dup_to_meet_total_truncates_small_totals() {
        let (indices, report) = dup_to_meet_total(5, 3);
        assert_eq!(indices, [0, 1, 2]);
        assert_eq!(report.unused, 2);
    }
}
