// gpu/kernel.rs — The external interleaving kernel: load, compile, dispatch.
//
// The interleaving formula is not part of this crate. It arrives as WGSL
// source read from disk at runtime (default `kernel.wgsl` in the working
// directory) and must honour this binding contract:
//
//   @group(0) @binding(0) var quilt:  texture_2d<u32>;
//   @group(0) @binding(1) var output: texture_storage_2d<rgba8uint, write>;
//   @group(0) @binding(2) var<uniform> args: KernelArgs;
//
//   struct KernelArgs {
//       rows: i32, cols: i32,
//       tilt: f32, pitch: f32, center: f32,
//       view_portion: f32, subp: f32, focus: f32,
//   }
//
//   @compute @workgroup_size({{WG_X}}, {{WG_Y}}, 1)
//   fn kernelMain(@builtin(global_invocation_id) gid: vec3<u32>) { ... }
//
// naga does not accept `override` expressions inside @workgroup_size(), so
// the {{WG_X}} / {{WG_Y}} placeholders are replaced in the source text with
// the device's workgroup size before compilation.
//
// DIAGNOSTICS
// ────────────
// Compiler messages are logged as warnings when they contain anything but
// whitespace; a message alone is not a failure. Failure is decided by the
// validation error scope around module + pipeline creation.

use std::fs;
use std::path::{Path, PathBuf};

use wgpu::util::DeviceExt;

use crate::backend::KernelArgs;
use crate::error::PipelineError;
use crate::gpu::device::GpuDevice;
use crate::gpu::image::{with_error_scope, GpuImage, IMAGE_FORMAT};

/// Entry point looked up in the kernel source.
pub const ENTRY_POINT: &str = "kernelMain";

/// Default kernel source, relative to the working directory.
pub const DEFAULT_KERNEL_PATH: &str = "kernel.wgsl";

/// A compiled interleaving kernel.
///
/// Expensive to create (shader compilation); create once per run.
pub struct GpuKernel {
    pipeline: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
    source_path: PathBuf,
}

impl GpuKernel {
    /// Read the WGSL file at `path` and compile it.
    ///
    /// # Errors
    /// - `Resource` if the file is missing or unreadable.
    /// - `Compute` if compilation or pipeline validation fails.
    pub fn load(gpu: &GpuDevice, path: &Path) -> Result<Self, PipelineError> {
        let source = fs::read_to_string(path)
            .map_err(|e| PipelineError::resource(path, format!("kernel source: {e}")))?;
        let mut kernel = Self::from_source(gpu, &source, &path.display().to_string())?;
        kernel.source_path = path.to_path_buf();
        Ok(kernel)
    }

    /// Compile kernel source held in memory. `label` names it in messages.
    pub fn from_source(gpu: &GpuDevice, source: &str, label: &str) -> Result<Self, PipelineError> {
        let source = specialise(source, gpu);

        let compiled = with_error_scope(gpu, || {
            let shader = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

            let info = pollster::block_on(shader.get_compilation_info());
            for message in diagnostics(info.messages.iter().map(|m| m.message.as_str())) {
                log::warn!("{label}: {message}");
            }

            let bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("kernel BGL"),
                entries: &[
                    // 0: quilt (read-only)
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Texture {
                            multisampled: false,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            sample_type: wgpu::TextureSampleType::Uint,
                        },
                        count: None,
                    },
                    // 1: output (write-only)
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::StorageTexture {
                            access: wgpu::StorageTextureAccess::WriteOnly,
                            format: IMAGE_FORMAT,
                            view_dimension: wgpu::TextureViewDimension::D2,
                        },
                        count: None,
                    },
                    // 2: scalar arguments
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: wgpu::BufferSize::new(
                                std::mem::size_of::<KernelArgs>() as u64,
                            ),
                        },
                        count: None,
                    },
                ],
            });

            let pipeline_layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("kernel pipeline layout"),
                bind_group_layouts: &[&bgl],
                push_constant_ranges: &[],
            });

            let pipeline = gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(ENTRY_POINT),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: ENTRY_POINT,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });

            (pipeline, bgl)
        });

        let (pipeline, bgl) = compiled
            .map_err(|e| PipelineError::Compute(format!("kernel {label} failed to build: {e}")))?;
        Ok(GpuKernel { pipeline, bgl, source_path: PathBuf::from(label) })
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// One dispatch over the output's full 2-D domain. Blocks until the
    /// device has written every output pixel.
    pub fn dispatch(
        &self,
        gpu: &GpuDevice,
        quilt: &GpuImage,
        output: &GpuImage,
        args: &KernelArgs,
    ) -> Result<(), PipelineError> {
        let (wg_x, wg_y) = gpu.dispatch_size(output.width, output.height);

        with_error_scope(gpu, || {
            let args_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("KernelArgs"),
                contents: bytemuck::bytes_of(args),
                usage: wgpu::BufferUsages::UNIFORM,
            });

            let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("kernel BG"),
                layout: &self.bgl,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&quilt.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&output.view),
                    },
                    wgpu::BindGroupEntry { binding: 2, resource: args_buf.as_entire_binding() },
                ],
            });

            let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("kernel dispatch"),
            });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(ENTRY_POINT),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(wg_x, wg_y, 1);
            }
            gpu.queue.submit(std::iter::once(encoder.finish()));
            gpu.device.poll(wgpu::Maintain::Wait);
        })
        .map_err(|e| PipelineError::Compute(format!("kernel dispatch failed: {e}")))
    }
}

/// Substitute the workgroup-size placeholders.
fn specialise(source: &str, gpu: &GpuDevice) -> String {
    source
        .replace("{{WG_X}}", &gpu.workgroup_size.x.to_string())
        .replace("{{WG_Y}}", &gpu.workgroup_size.y.to_string())
}

/// Compiler messages worth showing: non-empty after trimming whitespace.
fn diagnostics<'a>(messages: impl IntoIterator<Item = &'a str>) -> impl Iterator<Item = &'a str> {
    messages.into_iter().filter(|m| !m.trim().is_empty())
}
