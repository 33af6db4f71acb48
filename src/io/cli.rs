//! Command-line interface: sorted collages, photomosaics and photomosaic videos

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;

use crate::algorithm::executor::{EngineContext, build_engine};
use crate::analysis::sorting::{SortMethod, sort_collage};
use crate::io::configuration::{
    DEFAULT_LOWER_THRESH, DEFAULT_MAX_WIDTH, DEFAULT_MEM_LIMIT_MIB, DEFAULT_OUTPUT, DEFAULT_RATIO,
    DEFAULT_TILE_WIDTH, MosaicConfig, UnfairConfig,
};
use crate::io::error::{MosaicError, Result, invalid_parameter};
use crate::io::image::{
    load_destination, save_image, strip_alpha, validate_output_path, write_tile_info,
};
use crate::io::progress::{NoProgress, ProgressReporter, ProgressSink};
use crate::io::video::{FrameRenderer, FrameScheduler, FrameSource, FrameSummary, MosaicFrameRenderer};
use crate::math::backend::select_backend;
use crate::math::colorspace::Colorspace;
use crate::math::distance::Metric;
use crate::spatial::blend::{BlendMode, blend};
use crate::spatial::composer::{Mosaic, MosaicComposer};
use crate::spatial::tiles::{ResizeMode, Rotation, TilePool, TileReader, TileSize};

/// Half the available cores, at least one
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map_or(1, |n| n.get() / 2)
        .max(1)
}

#[derive(Parser, Debug, Clone)]
#[command(name = "photomosaic")]
#[command(
    author,
    version,
    about = "Make sorted collages, photomosaics and photomosaic videos from a folder of tiles"
)]
/// Command-line arguments
// Every switch of the tool is a plain flag
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Directory containing the tile images
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Read tiles from subdirectories as well
    #[arg(long)]
    pub recursive: bool,

    /// Number of worker threads for tile reading and video frames
    #[arg(long, default_value_t = default_workers())]
    pub num_process: usize,

    /// Output image (.png, .jpg or .jpeg)
    #[arg(long, default_value = DEFAULT_OUTPUT)]
    pub out: PathBuf,

    /// Tile width, optionally followed by the tile height
    #[arg(long, num_args = 1..=2, default_values_t = [DEFAULT_TILE_WIDTH])]
    pub size: Vec<u32>,

    /// Only print warnings and errors
    #[arg(long)]
    pub quiet: bool,

    /// Rotate tiles whose transposed ratio fits better: 1 counterclockwise, -1 clockwise
    #[arg(
        long,
        default_value_t = 0,
        allow_negative_numbers = true,
        value_parser = clap::value_parser!(i8).range(-1..=1)
    )]
    pub auto_rotate: i8,

    /// How tiles are brought to the tile ratio
    #[arg(long, value_enum, default_value_t = ResizeMode::Center)]
    pub resize_opt: ResizeMode,

    /// Evaluate distances on the GPU (frames are then processed sequentially)
    #[arg(long)]
    pub gpu: bool,

    /// Approximate memory limit in MiB for distance computation
    #[arg(long, default_value_t = DEFAULT_MEM_LIMIT_MIB)]
    pub mem_limit: usize,

    /// Write the tile ledger to this file
    #[arg(long)]
    pub tile_info_out: Option<PathBuf>,

    /// Aspect ratio of a sorted collage
    #[arg(long, num_args = 2, value_names = ["W", "H"], default_values_t = DEFAULT_RATIO)]
    pub ratio: Vec<u32>,

    /// Sort key of a sorted collage
    #[arg(long, value_enum, default_value_t = SortMethod::BgrSum)]
    pub sort: SortMethod,

    /// Lay out every other row right to left
    #[arg(long)]
    pub rev_row: bool,

    /// Sort in descending order
    #[arg(long)]
    pub rev_sort: bool,

    /// Destination image (or video with `--video`); omit for a sorted collage
    #[arg(long)]
    pub dest_img: Option<PathBuf>,

    /// Colorspace in which blocks and tiles are compared
    #[arg(long, value_enum, default_value_t = Colorspace::Lab)]
    pub colorspace: Colorspace,

    /// Distance between feature vectors
    #[arg(long, value_enum, default_value_t = Metric::Euclidean)]
    pub metric: Metric,

    /// Keep transparent regions of the destination empty
    #[arg(long)]
    pub transparent: bool,

    /// Allow tiles to be used any number of times
    #[arg(long)]
    pub unfair: bool,

    /// Number of tile columns in unfair mode
    #[arg(long, default_value_t = DEFAULT_MAX_WIDTH)]
    pub max_width: usize,

    /// Weight of tile usage fairness in unfair mode; 0 disables balancing
    #[arg(long, default_value_t = 0.0)]
    pub freq_mul: f64,

    /// Diffuse each block's quantization error to its neighbours
    #[arg(long)]
    pub dither: bool,

    /// Visit blocks in reading order while balancing
    #[arg(long)]
    pub deterministic: bool,

    /// Seed for the shuffled visiting order and random sorting
    #[arg(long)]
    pub seed: Option<u64>,

    /// Tile duplication factor in fair mode; may be a fraction
    #[arg(long, default_value_t = 1.0)]
    pub dup: f64,

    /// Use the greedy solver instead of the exact one in fair mode
    #[arg(long)]
    pub greedy: bool,

    /// Only fill salient regions of the destination
    #[arg(long)]
    pub salient: bool,

    /// Saliency threshold between 0.0 (no object) and 1.0 (whole image)
    #[arg(long, default_value_t = DEFAULT_LOWER_THRESH)]
    pub lower_thresh: f32,

    /// Blending of the destination into the mosaic
    #[arg(long, value_enum, default_value_t = BlendMode::Alpha)]
    pub blending: BlendMode,

    /// Blending level between 0.0 (none) and 1.0 (destination only)
    #[arg(long, default_value_t = 0.0)]
    pub blending_level: f32,

    /// Treat the destination as a video (animated GIF or directory of frames)
    #[arg(long)]
    pub video: bool,

    /// Process one frame out of every this many
    #[arg(long, default_value_t = 1)]
    pub skip_frame: usize,
}

impl Cli {
    /// Worker count, at least one
    pub fn workers(&self) -> usize {
        self.num_process.max(1)
    }

    /// Pipeline options selected on the command line
    pub fn mosaic_config(&self) -> MosaicConfig {
        MosaicConfig {
            colorspace: self.colorspace,
            metric: self.metric,
            mem_limit_mib: self.mem_limit,
            dup: self.dup,
            greedy: self.greedy,
            salient: self.salient,
            lower_thresh: self.lower_thresh,
            transparent: self.transparent,
            unfair: self.unfair.then_some(UnfairConfig {
                max_width: self.max_width,
                freq_mul: self.freq_mul,
                randomize: !self.deterministic,
                dither: self.dither,
                seed: self.seed,
            }),
            gpu: self.gpu,
        }
    }

    /// Tile reader selected on the command line
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid size or rotation flag
    pub fn tile_reader(&self) -> Result<TileReader> {
        Ok(TileReader {
            size: TileSize::from_values(&self.size)?,
            resize: self.resize_opt,
            rotation: Rotation::from_flag(self.auto_rotate)?,
            recursive: self.recursive,
            workers: self.workers(),
        })
    }

    fn ratio(&self) -> Result<(u32, u32)> {
        match self.ratio.as_slice() {
            [w, h] if *w > 0 && *h > 0 => Ok((*w, *h)),
            other => Err(invalid_parameter(
                "ratio",
                &format!("{other:?}"),
                &"expected two positive integers",
            )),
        }
    }

    /// Check every option before any file is read
    ///
    /// # Errors
    ///
    /// Returns an invalid parameter error naming the first offending option
    pub fn validate(&self) -> Result<()> {
        validate_output_path(&self.out)?;
        self.mosaic_config().validate()?;
        self.tile_reader()?;
        self.ratio()?;
        if !(0.0..=1.0).contains(&self.blending_level) {
            return Err(invalid_parameter(
                "blending_level",
                &self.blending_level,
                &"must lie between 0.0 and 1.0",
            ));
        }
        if self.skip_frame == 0 {
            return Err(invalid_parameter("skip_frame", &self.skip_frame, &"must be at least 1"));
        }
        if let Some(dest) = &self.dest_img
            && !dest.exists()
        {
            return Err(invalid_parameter(
                "dest_img",
                &dest.display(),
                &"non existent destination image",
            ));
        }
        if self.video && self.salient && !self.unfair {
            return Err(invalid_parameter(
                "salient",
                &true,
                &"photomosaic videos are unsupported with the fair and salient options together",
            ));
        }
        Ok(())
    }
}

/// Runs one invocation of the tool
pub struct MosaicRunner {
    cli: Cli,
    progress: Box<dyn ProgressSink>,
}

impl MosaicRunner {
    /// Runner with terminal progress bars unless `--quiet` is given
    pub fn new(cli: Cli) -> Self {
        let progress: Box<dyn ProgressSink> = if cli.quiet {
            Box::new(NoProgress)
        } else {
            Box::new(ProgressReporter::new())
        };
        Self { cli, progress }
    }

    /// Runner reporting to `progress`
    pub fn with_progress(cli: Cli, progress: Box<dyn ProgressSink>) -> Self {
        Self { cli, progress }
    }

    /// Parsed arguments
    pub const fn cli(&self) -> &Cli {
        &self.cli
    }

    /// Validate the options, read the tiles and produce the requested output
    ///
    /// # Errors
    ///
    /// Returns an error if validation, tile reading, planning, assignment or
    /// saving fails
    pub fn run(&self) -> Result<()> {
        let start = Instant::now();
        self.cli.validate()?;
        let pool = self.cli.tile_reader()?.read(&self.cli.path, self.progress.as_ref())?;
        tracing::info!(tiles = pool.len(), failed = pool.failed(), "tiles ready");

        match &self.cli.dest_img {
            None => self.run_sorted(&pool)?,
            Some(dest) if self.cli.video => {
                self.run_video(pool, dest)?;
            }
            Some(dest) => self.run_image(pool, dest)?,
        }
        tracing::info!(elapsed = ?start.elapsed(), "done");
        Ok(())
    }

    fn save_ledger(&self, mosaic: &Mosaic) -> Result<()> {
        if let Some(path) = &self.cli.tile_info_out {
            write_tile_info(&mosaic.info, path)?;
        }
        Ok(())
    }

    fn run_sorted(&self, pool: &TilePool) -> Result<()> {
        let (grid, order) = sort_collage(
            pool,
            self.cli.ratio()?,
            self.cli.sort,
            self.cli.rev_sort,
            self.cli.seed,
        )?;
        let sorted = pool.reordered(&order);
        let tiles: Vec<_> = sorted.tiles().iter().collect();
        let (tile_w, tile_h) = sorted.tile_size();
        let (mosaic, _) = MosaicComposer::new(tile_w, tile_h).compose(
            grid,
            &tiles,
            self.cli.rev_row,
            self.progress.as_ref(),
        )?;
        save_image(&mosaic.image, &self.cli.out)?;
        self.save_ledger(&mosaic)
    }

    fn run_image(&self, pool: TilePool, dest_path: &Path) -> Result<()> {
        let config = self.cli.mosaic_config();
        let dest = load_destination(dest_path)?;
        if config.transparent && !dest.has_alpha {
            return Err(invalid_parameter(
                "transparent",
                &dest_path.display(),
                &"can only be used for images with a transparent background",
            ));
        }
        if dest.has_alpha && !config.transparent {
            tracing::info!("alpha channel detected; add --transparent to keep transparent regions empty");
        }

        let ctx = EngineContext {
            pool: Arc::new(pool),
            config,
            backend: select_backend(config.gpu)?,
            limit_bytes: config.limit_bytes(1),
            dest_size: dest.pixels.dimensions(),
        };
        let mut engine = build_engine(&ctx)?;
        let mosaic = engine.process(&dest.pixels, self.progress.as_ref())?;
        let image = blend(
            &mosaic.image,
            &strip_alpha(&dest.pixels),
            self.cli.blending,
            self.cli.blending_level,
        );
        save_image(&image, &self.cli.out)?;
        self.save_ledger(&mosaic)
    }

    fn run_video(&self, pool: TilePool, dest_path: &Path) -> Result<FrameSummary> {
        let config = self.cli.mosaic_config();
        let frames = FrameSource::open(dest_path, self.cli.skip_frame)?;
        let workers = self.cli.workers();
        let backend = select_backend(config.gpu)?;
        let sequential = config.gpu;
        let ctx = EngineContext {
            pool: Arc::new(pool),
            config,
            backend,
            limit_bytes: if sequential {
                config.limit_bytes(1)
            } else {
                config.limit_bytes(workers)
            },
            dest_size: frames.frame_size(),
        };

        // Plan once up front so option errors surface before any worker starts
        let grid = build_engine(&ctx)?.grid();
        let (tile_w, tile_h) = ctx.pool.tile_size();
        let (width, height) = grid.collage_size(tile_w, tile_h);
        tracing::info!(width, height, "photomosaic video resolution");

        let scheduler = FrameScheduler {
            workers,
            sequential,
            output: self.cli.out.clone(),
        };
        let (mode, level) = (self.cli.blending, self.cli.blending_level);
        let summary = scheduler.run(
            frames,
            || -> Result<Box<dyn FrameRenderer>> {
                Ok(Box::new(MosaicFrameRenderer::new(build_engine(&ctx)?, mode, level)))
            },
            self.progress.as_ref(),
        )?;
        if summary.completed == 0 {
            return Err(MosaicError::Computation {
                operation: "video",
                reason: format!("none of the {} frames could be rendered", summary.submitted),
            });
        }
        Ok(summary)
    }
}
