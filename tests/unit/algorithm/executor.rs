//! Tests for the per-policy mosaic engines

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use photomosaic::algorithm::executor::{
        EngineContext, FairSolver, MaskSource, MosaicEngine, MosaicFair, MosaicFairSalient,
        MosaicUnfair, build_engine,
    };
    use photomosaic::io::configuration::{MosaicConfig, UnfairConfig};
    use photomosaic::io::progress::NoProgress;
    use photomosaic::math::backend::CpuBackend;
    use photomosaic::spatial::composer::BACKGROUND_LABEL;
    use photomosaic::spatial::grid::Grid;
    use photomosaic::spatial::tiles::{Tile, TilePool};

    const COLORS: [(&str, [u8; 3]); 4] = [
        ("red", [255, 0, 0]),
        ("green", [0, 255, 0]),
        ("blue", [0, 0, 255]),
        ("white", [255, 255, 255]),
    ];

    fn pool(count: usize) -> Arc<TilePool> {
        let tiles = COLORS
            .iter()
            .take(count)
            .map(|(label, rgb)| Tile::new(RgbImage::from_pixel(4, 4, Rgb(*rgb)), *label))
            .collect();
        let Ok(pool) = TilePool::from_tiles(tiles) else {
            panic!("pool rejected");
        };
        Arc::new(pool)
    }

    fn context(pool: Arc<TilePool>, config: MosaicConfig, dest_size: (u32, u32)) -> EngineContext {
        EngineContext {
            pool,
            config,
            backend: Arc::new(CpuBackend),
            limit_bytes: 1 << 20,
            dest_size,
        }
    }

    // Quadrants red, green / blue, white
    fn quadrants(size: u32) -> RgbaImage {
        let half = size / 2;
        RgbaImage::from_fn(size, size, |x, y| {
            let index = usize::from(y >= half) * 2 + usize::from(x >= half);
            let [r, g, b] = COLORS[index].1;
            Rgba([r, g, b, 255])
        })
    }

    fn labels(engine: &mut dyn MosaicEngine, dest: &RgbaImage) -> Vec<String> {
        let Ok(mosaic) = engine.process(dest, &NoProgress) else {
            panic!("processing failed");
        };
        mosaic.info.labels().to_vec()
    }

    // Tests fair assignment reproduces a destination made of the tiles
    // Verified by transposing the assignment
    #[test]
    fn test_mosaic_fair_matches_quadrants() {
        let ctx = context(pool(4), MosaicConfig::default(), (8, 8));
        let Ok(mut engine) = MosaicFair::new(&ctx) else {
            panic!("planning failed");
        };
        assert_eq!(engine.grid(), Grid { cols: 2, rows: 2 });
        assert_eq!(labels(&mut engine, &quadrants(8)), ["red", "green", "blue", "white"]);
    }

    #[test]
    fn test_mosaic_fair_greedy_matches_quadrants() {
        let config = MosaicConfig {
            greedy: true,
            ..MosaicConfig::default()
        };
        let ctx = context(pool(4), config, (8, 8));
        let Ok(mut engine) = build_engine(&ctx) else {
            panic!("planning failed");
        };
        assert_eq!(labels(engine.as_mut(), &quadrants(8)), ["red", "green", "blue", "white"]);
    }

    // Tests duplication fills every cell with a balanced instance list
    #[test]
    fn test_mosaic_fair_instances_fill_grid() {
        let config = MosaicConfig {
            dup: 2.0,
            ..MosaicConfig::default()
        };
        let ctx = context(pool(4), config, (8, 8));
        let Ok(engine) = MosaicFair::new(&ctx) else {
            panic!("planning failed");
        };
        assert_eq!(engine.grid(), Grid { cols: 3, rows: 3 });
        assert_eq!(engine.instances().len(), 9);
        let mut usage = [0; 4];
        for &tile in engine.instances() {
            usage[tile] += 1;
        }
        assert_eq!(usage, [3, 2, 2, 2]);
    }

    // Tests unfair engines reuse the nearest tile freely
    #[test]
    fn test_mosaic_unfair_reuses_tiles() {
        let config = MosaicConfig {
            unfair: Some(UnfairConfig {
                max_width: 4,
                ..UnfairConfig::default()
            }),
            ..MosaicConfig::default()
        };
        let ctx = context(pool(2), config, (8, 8));
        let Ok(mut engine) = build_engine(&ctx) else {
            panic!("planning failed");
        };
        assert_eq!(engine.grid(), Grid { cols: 4, rows: 4 });

        let dest = RgbaImage::from_pixel(8, 8, Rgba([250, 10, 10, 255]));
        let labels = labels(engine.as_mut(), &dest);
        assert_eq!(labels.len(), 16);
        assert!(labels.iter().all(|l| l == "red"));
    }

    // Tests conflicting unfair options are resolved at construction
    // Verified by keeping randomization alongside dithering
    #[test]
    fn test_mosaic_unfair_resolves_conflicts() {
        let options = UnfairConfig {
            max_width: 2,
            dither: true,
            randomize: true,
            ..UnfairConfig::default()
        };
        let config = MosaicConfig {
            salient: true,
            unfair: Some(options),
            ..MosaicConfig::default()
        };
        let ctx = context(pool(2), config, (8, 8));
        let Ok(engine) = MosaicUnfair::new(&ctx, options) else {
            panic!("planning failed");
        };
        assert!(engine.options().dither);
        assert!(!engine.options().randomize);
        assert!(engine.mask().is_none());

        let transparent = MosaicConfig {
            transparent: true,
            ..config
        };
        let ctx = context(pool(2), transparent, (8, 8));
        let Ok(engine) = MosaicUnfair::new(&ctx, options) else {
            panic!("planning failed");
        };
        assert!(!engine.options().dither);
        assert_eq!(engine.mask(), Some(&MaskSource::Transparency));
    }

    // Tests transparent regions stay empty in unfair mode
    #[test]
    fn test_mosaic_unfair_transparency_mask() {
        let options = UnfairConfig {
            max_width: 2,
            ..UnfairConfig::default()
        };
        let config = MosaicConfig {
            transparent: true,
            unfair: Some(options),
            ..MosaicConfig::default()
        };
        let ctx = context(pool(2), config, (8, 8));
        let Ok(mut engine) = build_engine(&ctx) else {
            panic!("planning failed");
        };
        let dest = RgbaImage::from_fn(8, 8, |_, y| {
            if y < 4 { Rgba([0, 0, 0, 0]) } else { Rgba([0, 250, 0, 255]) }
        });
        let labels = labels(engine.as_mut(), &dest);
        assert_eq!(labels, [BACKGROUND_LABEL, BACKGROUND_LABEL, "green", "green"]);
    }

    // Tests fair salient mosaics only cover opaque regions
    #[test]
    fn test_mosaic_fair_salient_covers_opaque_cells() {
        let config = MosaicConfig {
            transparent: true,
            ..MosaicConfig::default()
        };
        let ctx = context(pool(2), config, (16, 8));
        let Ok(mut engine) = MosaicFairSalient::new(&ctx) else {
            panic!("planning failed");
        };
        assert_eq!(engine.grid(), Grid { cols: 2, rows: 1 });

        let dest = RgbaImage::from_fn(16, 8, |x, _| {
            if x < 8 { Rgba([255, 0, 0, 255]) } else { Rgba([0, 0, 0, 0]) }
        });
        let Ok(mosaic) = engine.process(&dest, &NoProgress) else {
            panic!("processing failed");
        };
        let info = &mosaic.info;
        assert_ne!(info.label(0, 0), Some(BACKGROUND_LABEL));
        assert!(info.labels().iter().any(|l| l == BACKGROUND_LABEL));
        let filled = info.labels().iter().filter(|l| *l != BACKGROUND_LABEL).count();
        assert_eq!(filled, 2);
        let (width, _) = mosaic.image.dimensions();
        assert_eq!(mosaic.image.get_pixel(width - 1, 0)[3], 0);
    }

    // Tests a destination without salient cells yields an empty transparent mosaic
    // Verified by letting the empty selection reach the distance engine
    #[test]
    fn test_mosaic_fair_salient_flat_destination() {
        let config = MosaicConfig {
            salient: true,
            lower_thresh: 0.5,
            ..MosaicConfig::default()
        };
        let ctx = context(pool(4), config, (40, 40));
        let Ok(mut engine) = MosaicFairSalient::new(&ctx) else {
            panic!("planning failed");
        };
        assert_eq!(engine.grid(), Grid { cols: 2, rows: 2 });

        let dest = RgbaImage::from_pixel(40, 40, Rgba([128, 128, 128, 255]));
        let mosaic = match engine.process(&dest, &NoProgress) {
            Ok(mosaic) => mosaic,
            Err(e) => panic!("processing failed: {e}"),
        };
        assert_eq!(mosaic.info.grid(), Grid { cols: 2, rows: 2 });
        assert!(mosaic.info.labels().iter().all(|l| l == BACKGROUND_LABEL));
        assert_eq!(mosaic.image.dimensions(), (8, 8));
        assert!(mosaic.image.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_mosaic_fair_salient_fully_transparent_destination() {
        let config = MosaicConfig {
            transparent: true,
            ..MosaicConfig::default()
        };
        let ctx = context(pool(2), config, (16, 8));
        let Ok(mut engine) = MosaicFairSalient::new(&ctx) else {
            panic!("planning failed");
        };
        let dest = RgbaImage::from_pixel(16, 8, Rgba([0, 0, 0, 0]));
        let Ok(mosaic) = engine.process(&dest, &NoProgress) else {
            panic!("processing failed");
        };
        assert_eq!(mosaic.info.labels(), [BACKGROUND_LABEL, BACKGROUND_LABEL]);
    }

    #[test]
    fn test_fair_solver_flag() {
        assert_eq!(FairSolver::from_flag(false), FairSolver::Exact);
        assert_eq!(FairSolver::from_flag(true), FairSolver::Greedy);
    }
}
