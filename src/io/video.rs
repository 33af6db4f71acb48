//! Frame sources and the worker pool that turns every frame into a mosaic
//!
//! Frames are decoded on the calling thread and handed to a fixed set of
//! workers through a bounded job queue carrying `Option<(index, frame)>`.
//! `None` is the shutdown sentinel and is sent once per worker. Each worker
//! builds its own renderer once, saves every finished frame itself and reports
//! the outcome on a completion queue. Outputs may finish in any order.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::mpsc;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, RgbaImage};

use crate::algorithm::executor::MosaicEngine;
use crate::io::configuration::FRAME_QUEUE_DEPTH;
use crate::io::error::{MosaicError, Result, invalid_parameter};
use crate::io::image::{output_path_with_suffix, save_image, strip_alpha};
use crate::io::progress::{NoProgress, ProgressSink};
use crate::spatial::blend::{BlendMode, blend};
use crate::spatial::tiles::scan_files;

type FrameIter = Box<dyn Iterator<Item = Result<RgbaImage>>>;

/// Decoded frames of an animated GIF or a directory of still images
///
/// Only every `skip_frame`-th source frame is yielded, starting with the first.
pub struct FrameSource {
    first: Option<RgbaImage>,
    frame_size: (u32, u32),
    rest: FrameIter,
    skip_frame: usize,
    position: usize,
}

impl FrameSource {
    /// Open `path`: a directory of images (sorted by name) or an animated GIF
    ///
    /// # Errors
    ///
    /// Returns an error if `skip_frame` is zero, the source cannot be read or
    /// holds no frame
    pub fn open(path: &Path, skip_frame: usize) -> Result<Self> {
        if skip_frame == 0 {
            return Err(invalid_parameter("skip_frame", &skip_frame, &"must be at least 1"));
        }

        let mut frames: FrameIter = if path.is_dir() {
            let files = scan_files(path, false)?;
            Box::new(files.into_iter().map(|file| {
                image::open(&file)
                    .map(|img| img.to_rgba8())
                    .map_err(|e| MosaicError::ImageLoad { path: file, source: e })
            }))
        } else {
            let file = File::open(path).map_err(|e| MosaicError::FileSystem {
                path: path.to_path_buf(),
                operation: "open video",
                source: e,
            })?;
            let decoder = GifDecoder::new(BufReader::new(file)).map_err(|e| MosaicError::ImageLoad {
                path: path.to_path_buf(),
                source: e,
            })?;
            let source = path.to_path_buf();
            Box::new(decoder.into_frames().map(move |frame| {
                frame
                    .map(image::Frame::into_buffer)
                    .map_err(|e| MosaicError::ImageLoad {
                        path: source.clone(),
                        source: e,
                    })
            }))
        };

        let first = frames.next().transpose()?.ok_or_else(|| MosaicError::InvalidSourceData {
            reason: format!("unable to read a frame from '{}'", path.display()),
        })?;
        Ok(Self {
            frame_size: first.dimensions(),
            first: Some(first),
            rest: frames,
            skip_frame,
            position: 0,
        })
    }

    /// Size of the first frame, used to plan the engine
    pub const fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }
}

impl Iterator for FrameSource {
    type Item = Result<RgbaImage>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = match self.first.take() {
                Some(first) => Ok(first),
                None => self.rest.next()?,
            };
            let index = self.position;
            self.position += 1;
            if index % self.skip_frame == 0 {
                return Some(frame);
            }
        }
    }
}

/// Turns one frame into one output image
pub trait FrameRenderer {
    /// Render `frame`
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be rendered
    fn render(&mut self, frame: &RgbaImage, progress: &dyn ProgressSink) -> Result<RgbaImage>;
}

/// Mosaic engine followed by optional blending with the source frame
pub struct MosaicFrameRenderer {
    engine: Box<dyn MosaicEngine>,
    mode: BlendMode,
    level: f32,
}

impl MosaicFrameRenderer {
    /// Renderer blending at `level` (0 disables blending)
    pub fn new(engine: Box<dyn MosaicEngine>, mode: BlendMode, level: f32) -> Self {
        Self {
            engine,
            mode,
            level,
        }
    }
}

impl FrameRenderer for MosaicFrameRenderer {
    fn render(&mut self, frame: &RgbaImage, progress: &dyn ProgressSink) -> Result<RgbaImage> {
        let mosaic = self.engine.process(frame, progress)?;
        if self.level > 0.0 {
            Ok(blend(&mosaic.image, &strip_alpha(frame), self.mode, self.level))
        } else {
            Ok(mosaic.image)
        }
    }
}

/// Counts of a finished video run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameSummary {
    /// Frames sent to the workers
    pub submitted: usize,
    /// Frames rendered and saved
    pub completed: usize,
    /// Frames dropped after an error
    pub failed: usize,
}

struct FrameOutcome {
    index: usize,
    result: Result<()>,
}

type Job = Option<(usize, RgbaImage)>;

/// Distributes frames over worker threads
#[derive(Clone, Debug)]
pub struct FrameScheduler {
    /// Number of workers in parallel mode
    pub workers: usize,
    /// Render on the calling thread, one frame at a time
    pub sequential: bool,
    /// Output path; frame `i` is written to `<stem>_<i>.<ext>`
    pub output: PathBuf,
}

impl FrameScheduler {
    /// Frame file for `index`
    pub fn frame_path(&self, index: usize) -> PathBuf {
        output_path_with_suffix(&self.output, &format!("_{index}"))
    }

    fn render_and_save(&self, renderer: &mut dyn FrameRenderer, index: usize, frame: &RgbaImage) -> Result<()> {
        let image = renderer.render(frame, &NoProgress)?;
        save_image(&image, &self.frame_path(index))
    }

    fn record(summary: &mut FrameSummary, outcome: FrameOutcome, progress: &dyn ProgressSink) {
        match outcome.result {
            Ok(()) => summary.completed += 1,
            Err(e) => {
                tracing::error!(frame = outcome.index, error = %e, "frame dropped");
                summary.failed += 1;
            }
        }
        progress.advance(1);
    }

    /// Render every frame of `frames`
    ///
    /// `factory` is called once per worker (once in sequential mode) to build
    /// that worker's renderer. A frame that fails to decode ends the stream; a
    /// frame that fails to render is logged and dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the sequential renderer cannot be built or a worker
    /// thread panics
    pub fn run<I, F>(&self, frames: I, factory: F, progress: &dyn ProgressSink) -> Result<FrameSummary>
    where
        I: Iterator<Item = Result<RgbaImage>>,
        F: Fn() -> Result<Box<dyn FrameRenderer>> + Sync,
    {
        progress.start("Computing frames", 0);
        let summary = if self.sequential || self.workers <= 1 {
            self.run_sequential(frames, &factory, progress)
        } else {
            self.run_parallel(frames, &factory, progress)
        };
        progress.finish();
        let summary = summary?;
        tracing::info!(
            submitted = summary.submitted,
            completed = summary.completed,
            failed = summary.failed,
            "video frames processed"
        );
        Ok(summary)
    }

    fn run_sequential<I, F>(&self, frames: I, factory: &F, progress: &dyn ProgressSink) -> Result<FrameSummary>
    where
        I: Iterator<Item = Result<RgbaImage>>,
        F: Fn() -> Result<Box<dyn FrameRenderer>>,
    {
        let mut renderer = factory()?;
        let mut summary = FrameSummary::default();
        for (index, frame) in frames.enumerate() {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(frame = index, error = %e, "stopping at undecodable frame");
                    break;
                }
            };
            summary.submitted += 1;
            let result = self.render_and_save(renderer.as_mut(), index, &frame);
            Self::record(&mut summary, FrameOutcome { index, result }, progress);
        }
        Ok(summary)
    }

    fn worker<F>(&self, jobs: &Mutex<mpsc::Receiver<Job>>, done: &mpsc::Sender<FrameOutcome>, factory: &F)
    where
        F: Fn() -> Result<Box<dyn FrameRenderer>>,
    {
        let mut renderer = factory();
        if let Err(e) = &renderer {
            tracing::error!(error = %e, "worker could not build its renderer");
        }
        loop {
            let job = match jobs.lock() {
                Ok(receiver) => receiver.recv(),
                Err(_) => break,
            };
            let Ok(Some((index, frame))) = job else {
                break;
            };
            let result = match renderer.as_mut() {
                Ok(renderer) => self.render_and_save(renderer.as_mut(), index, &frame),
                Err(e) => Err(MosaicError::Computation {
                    operation: "frame rendering",
                    reason: format!("renderer unavailable: {e}"),
                }),
            };
            if done.send(FrameOutcome { index, result }).is_err() {
                break;
            }
        }
    }

    fn run_parallel<I, F>(&self, frames: I, factory: &F, progress: &dyn ProgressSink) -> Result<FrameSummary>
    where
        I: Iterator<Item = Result<RgbaImage>>,
        F: Fn() -> Result<Box<dyn FrameRenderer>> + Sync,
    {
        let workers = self.workers.max(1);
        let (job_tx, job_rx) = mpsc::sync_channel::<Job>(workers * FRAME_QUEUE_DEPTH);
        let (done_tx, done_rx) = mpsc::channel::<FrameOutcome>();
        let jobs = Mutex::new(job_rx);
        let mut summary = FrameSummary::default();

        std::thread::scope(|scope| -> Result<()> {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let done = done_tx.clone();
                    let jobs = &jobs;
                    scope.spawn(move || self.worker(jobs, &done, factory))
                })
                .collect();
            drop(done_tx);

            for (index, frame) in frames.enumerate() {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(frame = index, error = %e, "stopping at undecodable frame");
                        break;
                    }
                };
                if job_tx.send(Some((index, frame))).is_err() {
                    break;
                }
                summary.submitted += 1;
                while let Ok(outcome) = done_rx.try_recv() {
                    Self::record(&mut summary, outcome, progress);
                }
            }

            for _ in 0..workers {
                if job_tx.send(None).is_err() {
                    break;
                }
            }
            for outcome in &done_rx {
                Self::record(&mut summary, outcome, progress);
            }

            let mut panicked = 0;
            for handle in handles {
                if handle.join().is_err() {
                    panicked += 1;
                }
            }
            if panicked > 0 {
                return Err(MosaicError::Computation {
                    operation: "frame rendering",
                    reason: format!("{panicked} worker threads panicked"),
                });
            }
            Ok(())
        })?;

        Ok(summary)
    }
}
