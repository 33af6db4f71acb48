//! Mosaic engines: one per assignment policy
//!
//! An engine is built once per destination size and then turns any number of
//! destination images (or video frames) into mosaics. Everything that depends
//! only on the tiles and the geometry (grid, block size, tile features, the
//! staged distance kernel) is computed at construction.

use std::sync::Arc;

use image::{RgbaImage, imageops};
use ndarray::{Array2, ArrayView2, Axis};

use crate::algorithm::greedy::solve_lap_greedy;
use crate::algorithm::jonker_volgenant::{LapSolution, solve_lap};
use crate::algorithm::salient::{CellSelection, compute_block_map, select_salient_cells};
use crate::algorithm::unfair::{assign_balanced, assign_dithered, assign_nearest, visiting_order};
use crate::analysis::saliency::{FineGrainedSaliency, SaliencyDetector, transparency_map};
use crate::io::configuration::{
    BALANCED_SCRATCH_FACTOR, LARGE_PROBLEM_CELLS, MosaicConfig, NEAREST_SCRATCH_FACTOR,
    TRANSPARENCY_THRESHOLD, UnfairConfig,
};
use crate::io::error::Result;
use crate::io::image::strip_alpha;
use crate::io::progress::ProgressSink;
use crate::math::backend::NumericBackend;
use crate::math::distance::DistanceEngine;
use crate::spatial::blocks::{BlockGeometry, BlockProjector};
use crate::spatial::composer::{Mosaic, MosaicComposer};
use crate::spatial::grid::{Grid, calc_grid_size, unfair_grid_size};
use crate::spatial::tiles::{RESIZE_FILTER, TilePool, dup_to_meet_total, duplicated_total};

/// Turns destination images into mosaics under one assignment policy
pub trait MosaicEngine: Send {
    /// Grid of the produced mosaics
    ///
    /// Engines that derive their grid per image report the initial estimate.
    fn grid(&self) -> Grid;

    /// Compose the mosaic for `dest`
    ///
    /// # Errors
    ///
    /// Returns an error if distance evaluation or assignment fails
    fn process(&mut self, dest: &RgbaImage, progress: &dyn ProgressSink) -> Result<Mosaic>;
}

/// Immutable inputs shared by every engine of a run
#[derive(Clone, Debug)]
pub struct EngineContext {
    /// Tile pool
    pub pool: Arc<TilePool>,
    /// Pipeline options
    pub config: MosaicConfig,
    /// Device evaluating distances
    pub backend: Arc<dyn NumericBackend>,
    /// Byte ceiling for one distance allocation
    pub limit_bytes: usize,
    /// Destination size the engine is planned for
    pub dest_size: (u32, u32),
}

/// Solver for the fair policies
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FairSolver {
    /// Optimal shortest augmenting path solver
    #[default]
    Exact,
    /// Ascending-cost greedy matching
    Greedy,
}

impl FairSolver {
    /// Solver selected by the `greedy` flag
    pub const fn from_flag(greedy: bool) -> Self {
        if greedy { Self::Greedy } else { Self::Exact }
    }

    /// Match every block to a distinct tile instance
    ///
    /// # Errors
    ///
    /// Returns a solver failure if no complete matching is produced
    pub fn solve(
        self,
        cost: ArrayView2<'_, f32>,
        progress: &dyn ProgressSink,
    ) -> Result<LapSolution> {
        match self {
            Self::Exact => solve_lap(cost, progress),
            Self::Greedy => solve_lap_greedy(cost, progress),
        }
    }
}

fn composer_for(pool: &TilePool) -> MosaicComposer {
    let (w, h) = pool.tile_size();
    MosaicComposer::new(w, h)
}

/// Every tile used an equal number of times (within one) over the whole grid
pub struct MosaicFair {
    pool: Arc<TilePool>,
    instances: Vec<usize>,
    projector: BlockProjector,
    distances: DistanceEngine,
    solver: FairSolver,
}

impl MosaicFair {
    /// Plan grid, duplication and tile features for destinations of `ctx.dest_size`
    ///
    /// # Errors
    ///
    /// Returns an error if the grid cannot be planned or the tiles cannot be staged
    pub fn new(ctx: &EngineContext) -> Result<Self> {
        let pool = Arc::clone(&ctx.pool);
        let (tile_w, tile_h) = pool.tile_size();
        let (dest_w, dest_h) = ctx.dest_size;
        tracing::info!(dup = ctx.config.dup, "duplicating tiles");
        let requested = duplicated_total(pool.len(), ctx.config.dup);
        let grid = calc_grid_size(dest_w, dest_h, requested, tile_w, tile_h)?;
        let (instances, _) = dup_to_meet_total(pool.len(), grid.cells());
        if grid.cells() > LARGE_PROBLEM_CELLS {
            tracing::warn!(cells = grid.cells(), "this may take longer than 5 minutes to compute");
        }

        let geometry = BlockGeometry::compute(dest_w, dest_h, grid, tile_w, tile_h);
        let projector = BlockProjector::new(geometry, ctx.config.colorspace);
        let refs: Vec<_> = pool.tiles().iter().collect();
        let keys = projector.project_tiles(&refs).select(Axis(0), &instances);
        let distances = DistanceEngine::new(
            ctx.backend.as_ref(),
            ctx.config.metric,
            keys,
            ctx.limit_bytes,
        )?;

        Ok(Self {
            pool,
            instances,
            projector,
            distances,
            solver: FairSolver::from_flag(ctx.config.greedy),
        })
    }

    /// Tile index of every instance
    pub fn instances(&self) -> &[usize] {
        &self.instances
    }
}

impl MosaicEngine for MosaicFair {
    fn grid(&self) -> Grid {
        self.projector.geometry().grid
    }

    fn process(&mut self, dest: &RgbaImage, progress: &dyn ProgressSink) -> Result<Mosaic> {
        let blocks = self.projector.project_destination(&strip_alpha(dest));
        let cost = self.distances.full(blocks.view())?;
        let solution = self.solver.solve(cost.view(), progress)?;
        let tile_indices: Vec<usize> = solution
            .assignment
            .iter()
            .filter_map(|&instance| self.instances.get(instance).copied())
            .collect();
        let tiles = self.pool.select(&tile_indices)?;
        let (mosaic, _) = composer_for(&self.pool).compose(self.grid(), &tiles, false, progress)?;
        Ok(mosaic)
    }
}

/// Score map source of masked engines
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MaskSource {
    /// Saliency detector output
    Saliency(FineGrainedSaliency),
    /// Non-transparent pixels of the destination
    Transparency,
}

impl MaskSource {
    fn score_map(&self, dest: &RgbaImage) -> Result<Array2<f32>> {
        match self {
            Self::Saliency(detector) => detector.compute(&strip_alpha(dest)),
            Self::Transparency => Ok(transparency_map(dest)),
        }
    }
}

/// Fair assignment restricted to salient (or opaque) cells
///
/// The block size depends on the saliency of each image, so planning happens
/// on every call.
pub struct MosaicFairSalient {
    ctx: EngineContext,
    mask: MaskSource,
    lower_thresh: f32,
    initial_grid: Grid,
    requested: usize,
}

impl MosaicFairSalient {
    /// Engine for destinations of `ctx.dest_size`
    ///
    /// # Errors
    ///
    /// Returns an error if the initial grid cannot be planned
    pub fn new(ctx: &EngineContext) -> Result<Self> {
        let (tile_w, tile_h) = ctx.pool.tile_size();
        let requested = duplicated_total(ctx.pool.len(), ctx.config.dup);
        let initial_grid = calc_grid_size(ctx.dest_size.0, ctx.dest_size.1, requested, tile_w, tile_h)?;
        let (mask, lower_thresh) = if ctx.config.transparent {
            (MaskSource::Transparency, TRANSPARENCY_THRESHOLD)
        } else {
            (
                MaskSource::Saliency(FineGrainedSaliency::default()),
                ctx.config.lower_thresh,
            )
        };
        Ok(Self {
            ctx: ctx.clone(),
            mask,
            lower_thresh,
            initial_grid,
            requested,
        })
    }
}

impl MosaicEngine for MosaicFairSalient {
    fn grid(&self) -> Grid {
        self.initial_grid
    }

    fn process(&mut self, dest: &RgbaImage, progress: &dyn ProgressSink) -> Result<Mosaic> {
        let map = self.mask.score_map(dest)?;
        let selection = select_salient_cells(&map, self.initial_grid, self.requested, self.lower_thresh)?;
        let pool = &self.ctx.pool;
        if selection.is_empty() {
            tracing::warn!("no salient cells in the destination; the mosaic is left transparent");
            return composer_for(pool).compose_masked(self.initial_grid, &[], &selection, progress);
        }
        let (instances, _) = dup_to_meet_total(pool.len(), selection.len());

        let geometry = selection.geometry();
        let projector = BlockProjector::new(geometry, self.ctx.config.colorspace);
        let refs: Vec<_> = pool.tiles().iter().collect();
        let keys = projector.project_tiles(&refs).select(Axis(0), &instances);
        let distances = DistanceEngine::new(
            self.ctx.backend.as_ref(),
            self.ctx.config.metric,
            keys,
            self.ctx.limit_bytes,
        )?;

        let blocks = projector.project_destination_masked(&strip_alpha(dest), &selection);
        let cost = distances.full(blocks.view())?;
        let solution = FairSolver::from_flag(self.ctx.config.greedy).solve(cost.view(), progress)?;
        let tile_indices: Vec<usize> = solution
            .assignment
            .iter()
            .filter_map(|&instance| instances.get(instance).copied())
            .collect();
        let tiles = pool.select(&tile_indices)?;
        composer_for(pool).compose_masked(selection.grid, &tiles, &selection, progress)
    }
}

/// Tiles reused freely, optionally balanced, dithered or masked
pub struct MosaicUnfair {
    pool: Arc<TilePool>,
    options: UnfairConfig,
    projector: BlockProjector,
    distances: DistanceEngine,
    mask: Option<MaskSource>,
    lower_thresh: f32,
}

impl MosaicUnfair {
    /// Plan grid and tile features for destinations of `ctx.dest_size`
    ///
    /// Conflicting options are resolved with a warning: transparency masking
    /// turns off dithering and saliency, dithering turns off saliency and
    /// randomization.
    ///
    /// # Errors
    ///
    /// Returns an error if the grid cannot be planned or the tiles cannot be staged
    pub fn new(ctx: &EngineContext, options: UnfairConfig) -> Result<Self> {
        let pool = Arc::clone(&ctx.pool);
        let (tile_w, tile_h) = pool.tile_size();
        let (dest_w, dest_h) = ctx.dest_size;
        let grid = unfair_grid_size(dest_w, dest_h, options.max_width, tile_w, tile_h)?;

        let mut options = options;
        let config = &ctx.config;
        let mut lower_thresh = config.lower_thresh;
        let mask = if config.transparent {
            if options.dither {
                tracing::warn!("dithering is not supported when transparency masking is on; dithering will be turned off");
                options.dither = false;
            }
            if config.salient {
                tracing::warn!("saliency is not supported when transparency masking is on; saliency will be turned off");
            }
            lower_thresh = TRANSPARENCY_THRESHOLD;
            Some(MaskSource::Transparency)
        } else if options.dither {
            if config.salient {
                tracing::warn!("saliency is not supported when dithering is on; saliency will be turned off");
            }
            if config.gpu {
                tracing::warn!("dithering is typically slower with the GPU backend");
            }
            if options.randomize {
                tracing::warn!("dithering is not supported when randomization is enabled; randomization will be turned off");
                options.randomize = false;
            }
            None
        } else if config.salient {
            Some(MaskSource::Saliency(FineGrainedSaliency::default()))
        } else {
            None
        };

        let geometry = BlockGeometry::compute(dest_w, dest_h, grid, tile_w, tile_h);
        let projector = BlockProjector::new(geometry, config.colorspace);
        let refs: Vec<_> = pool.tiles().iter().collect();
        let keys = projector.project_tiles(&refs);
        let distances = DistanceEngine::new(ctx.backend.as_ref(), config.metric, keys, ctx.limit_bytes)?;

        Ok(Self {
            pool,
            options,
            projector,
            distances,
            mask,
            lower_thresh,
        })
    }

    /// Options after conflict resolution
    pub const fn options(&self) -> &UnfairConfig {
        &self.options
    }

    /// Active mask, if any
    pub const fn mask(&self) -> Option<&MaskSource> {
        self.mask.as_ref()
    }

    fn assign(&self, blocks: ArrayView2<'_, f32>, progress: &dyn ProgressSink) -> Result<Vec<usize>> {
        let options = &self.options;
        if options.dither {
            return assign_dithered(
                &self.distances,
                blocks,
                self.grid(),
                options.freq_mul,
                progress,
            );
        }
        if options.freq_mul > 0.0 {
            let plan = self.distances.plan(blocks.nrows(), BALANCED_SCRATCH_FACTOR);
            let order = visiting_order(blocks.nrows(), options.randomize, options.seed);
            return assign_balanced(
                &self.distances,
                blocks,
                plan,
                options.freq_mul,
                &order,
                progress,
            );
        }
        let plan = self.distances.plan(blocks.nrows(), NEAREST_SCRATCH_FACTOR);
        assign_nearest(&self.distances, blocks, plan, progress)
    }

    fn masked_selection(&self, mask: &MaskSource, resized: &RgbaImage) -> Result<CellSelection> {
        let map = mask.score_map(resized)?;
        let geometry = self.projector.geometry();
        compute_block_map(&map, geometry.block_width, geometry.block_height, self.lower_thresh)
    }
}

impl MosaicEngine for MosaicUnfair {
    fn grid(&self) -> Grid {
        self.projector.geometry().grid
    }

    fn process(&mut self, dest: &RgbaImage, progress: &dyn ProgressSink) -> Result<Mosaic> {
        let composer = composer_for(&self.pool);
        match &self.mask {
            Some(mask) => {
                let (tw, th) = self.projector.geometry().target_size();
                let resized = imageops::resize(dest, tw, th, RESIZE_FILTER);
                let selection = self.masked_selection(mask, &resized)?;
                let blocks = self
                    .projector
                    .project_destination_masked(&strip_alpha(&resized), &selection);
                let assignment = self.assign(blocks.view(), progress)?;
                let tiles = self.pool.select(&assignment)?;
                composer.compose_masked(self.grid(), &tiles, &selection, progress)
            }
            None => {
                let blocks = self.projector.project_destination(&strip_alpha(dest));
                let assignment = self.assign(blocks.view(), progress)?;
                let tiles = self.pool.select(&assignment)?;
                let (mosaic, _) = composer.compose(self.grid(), &tiles, false, progress)?;
                Ok(mosaic)
            }
        }
    }
}

/// Build the engine matching `ctx.config`
///
/// # Errors
///
/// Returns an error if the engine cannot be planned
pub fn build_engine(ctx: &EngineContext) -> Result<Box<dyn MosaicEngine>> {
    let config = &ctx.config;
    if let Some(options) = config.unfair {
        return Ok(Box::new(MosaicUnfair::new(ctx, options)?));
    }
    if config.salient || config.transparent {
        return Ok(Box::new(MosaicFairSalient::new(ctx)?));
    }
    Ok(Box::new(MosaicFair::new(ctx)?))
}
