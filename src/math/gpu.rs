//! GPU distance kernels on `wgpu` compute shaders
//!
//! Tiles are uploaded once per kernel; each chunk of destination rows is
//! uploaded, evaluated by one dispatch and read back into host memory.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array2, ArrayView2};

use crate::io::error::{Result, backend_error};
use crate::math::backend::{DistanceKernel, NumericBackend, check_dimension};
use crate::math::distance::{ELEMENT_SIZE, Metric};

const WORKGROUP_SIDE: u32 = 8;

const SHADER: &str = r"
struct Params {
  num_rows: u32,
  num_tiles: u32,
  dim: u32,
  metric: u32,
};

@group(0) @binding(0) var<storage, read> tiles: array<f32>;
@group(0) @binding(1) var<storage, read> rows: array<f32>;
@group(0) @binding(2) var<storage, read_write> dist: array<f32>;
@group(0) @binding(3) var<uniform> params: Params;

@compute @workgroup_size(8, 8, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
  let t = gid.x;
  let r = gid.y;
  if (t >= params.num_tiles || r >= params.num_rows) {
    return;
  }
  let a = r * params.dim;
  let b = t * params.dim;
  var acc: f32 = 0.0;
  var aa: f32 = 0.0;
  var bb: f32 = 0.0;
  var ab: f32 = 0.0;
  for (var k: u32 = 0u; k < params.dim; k = k + 1u) {
    let x = rows[a + k];
    let y = tiles[b + k];
    let d = x - y;
    switch params.metric {
      case 0u: { acc = acc + d * d; }
      case 1u: { acc = acc + abs(d); }
      case 2u: { acc = max(acc, abs(d)); }
      default: {
        aa = aa + x * x;
        bb = bb + y * y;
        ab = ab + x * y;
      }
    }
  }
  if (params.metric == 3u) {
    acc = 1.0 - ab / (max(sqrt(aa), 1e-12) * max(sqrt(bb), 1e-12));
  }
  dist[r * params.num_tiles + t] = acc;
}
";

struct GpuContext {
    adapter_name: String,
    device: wgpu::Device,
    queue: wgpu::Queue,
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
    max_binding: u64,
    max_dispatch: u32,
}

/// Backend executing distance kernels on the first high-performance adapter
#[derive(Clone)]
pub struct GpuBackend {
    context: Arc<GpuContext>,
}

impl fmt::Debug for GpuBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuBackend")
            .field("adapter", &self.context.adapter_name)
            .finish_non_exhaustive()
    }
}

const fn metric_code(metric: Metric) -> u32 {
    match metric {
        Metric::Euclidean => 0,
        Metric::Cityblock => 1,
        Metric::Chebyshev => 2,
        Metric::Cosine => 3,
    }
}

fn to_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl GpuBackend {
    /// Acquire an adapter and compile the distance shader
    ///
    /// # Errors
    ///
    /// Returns an error if no adapter or device is available
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| backend_error(&format!("no gpu adapter available: {e:?}")))?;

        let limits = adapter.limits();
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("photomosaic_device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| backend_error(&format!("wgpu request_device failed: {e:?}")))?;

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("photomosaic_distance_layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("photomosaic_distance_shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("photomosaic_distance_pl"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("photomosaic_distance_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        let adapter_name = adapter.get_info().name;
        tracing::info!(adapter = %adapter_name, "GPU backend initialised");

        Ok(Self {
            context: Arc::new(GpuContext {
                adapter_name,
                device,
                queue,
                layout,
                pipeline,
                max_binding: u64::from(limits.max_storage_buffer_binding_size),
                max_dispatch: limits.max_compute_workgroups_per_dimension,
            }),
        })
    }
}

impl NumericBackend for GpuBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn prepare(
        &self,
        metric: Metric,
        tiles: ArrayView2<'_, f32>,
    ) -> Result<Box<dyn DistanceKernel>> {
        let ctx = &self.context;
        let data = tiles.as_standard_layout();
        let bytes = to_bytes(data.as_slice().unwrap_or(&[]));
        if bytes.len() as u64 > ctx.max_binding {
            return Err(backend_error(&format!(
                "tile matrix of {} bytes exceeds the device binding limit of {} bytes",
                bytes.len(),
                ctx.max_binding
            )));
        }
        let tile_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("photomosaic_tiles"),
            size: bytes.len() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        ctx.queue.write_buffer(&tile_buffer, 0, &bytes);

        Ok(Box::new(GpuKernel {
            context: Arc::clone(ctx),
            tile_buffer,
            metric,
            num_tiles: tiles.nrows(),
            dim: tiles.ncols(),
        }))
    }
}

struct GpuKernel {
    context: Arc<GpuContext>,
    tile_buffer: wgpu::Buffer,
    metric: Metric,
    num_tiles: usize,
    dim: usize,
}

impl DistanceKernel for GpuKernel {
    fn num_tiles(&self) -> usize {
        self.num_tiles
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn distances(&self, rows: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        check_dimension(rows.ncols(), self.dim)?;
        let num_rows = rows.nrows();
        if num_rows == 0 {
            return Ok(Array2::zeros((0, self.num_tiles)));
        }

        let ctx = &self.context;
        let groups_x = (self.num_tiles as u32).div_ceil(WORKGROUP_SIDE);
        let groups_y = (num_rows as u32).div_ceil(WORKGROUP_SIDE);
        if groups_x > ctx.max_dispatch || groups_y > ctx.max_dispatch {
            return Err(backend_error(&format!(
                "dispatch of {groups_x}x{groups_y} workgroups exceeds the device limit {}",
                ctx.max_dispatch
            )));
        }

        let data = rows.as_standard_layout();
        let row_bytes = to_bytes(data.as_slice().unwrap_or(&[]));
        let out_size = (num_rows * self.num_tiles * ELEMENT_SIZE) as u64;
        if out_size > ctx.max_binding || row_bytes.len() as u64 > ctx.max_binding {
            return Err(backend_error(&format!(
                "distance chunk of {out_size} bytes exceeds the device binding limit"
            )));
        }

        let row_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("photomosaic_rows"),
            size: row_bytes.len() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        ctx.queue.write_buffer(&row_buffer, 0, &row_bytes);

        let out_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("photomosaic_distances"),
            size: out_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("photomosaic_readback"),
            size: out_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let params: Vec<u8> = [
            num_rows as u32,
            self.num_tiles as u32,
            self.dim as u32,
            metric_code(self.metric),
        ]
        .iter()
        .flat_map(|v| v.to_ne_bytes())
        .collect();
        let param_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("photomosaic_params"),
            size: params.len() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        ctx.queue.write_buffer(&param_buffer, 0, &params);

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("photomosaic_distance_bg"),
            layout: &ctx.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.tile_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: row_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: out_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: param_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("photomosaic_distance_encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("photomosaic_distance_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&ctx.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        encoder.copy_buffer_to_buffer(&out_buffer, 0, &readback, 0, out_size);
        ctx.queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        ctx.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| backend_error(&format!("wgpu poll failed: {e:?}")))?;
        rx.recv()
            .map_err(|e| backend_error(&format!("readback channel closed: {e}")))?
            .map_err(|e| backend_error(&format!("readback map failed: {e:?}")))?;

        let values: Vec<f32> = {
            let mapped = slice.get_mapped_range();
            mapped
                .chunks_exact(ELEMENT_SIZE)
                .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        };
        readback.unmap();

        Array2::from_shape_vec((num_rows, self.num_tiles), values)
            .map_err(|e| backend_error(&format!("readback shape mismatch: {e}")))
    }
}
