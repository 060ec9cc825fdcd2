// gpu/image.rs — RGBA8 images resident on the GPU, and host↔device copies.
//
// RESPONSIBILITIES
// ─────────────────
// 1. `GpuImage`: an `Rgba8Uint` 2D texture. The quilt is bound to the
//    kernel as `texture_2d<u32>`; the output as a write-only storage texture.
//
// 2. `GpuImage::write_region()`: copy a host `RgbaBuffer` into a chosen
//    sub-rectangle of an existing texture. This is how each view lands in its
//    quilt cell without reallocating the quilt.
//
// 3. `GpuImage::readback()`: copy the whole texture back to host memory.
//
//
// ROW ALIGNMENT
// ──────────────
// wgpu's `copy_buffer_to_texture` / `copy_texture_to_buffer` require
// `bytes_per_row` to be a multiple of `COPY_BYTES_PER_ROW_ALIGNMENT` (256).
// A 100-pixel RGBA row is 400 bytes, so rows are padded in a staging buffer:
//
//   host row   (400 B): [px0 px1 ... px99]
//   staging row(512 B): [px0 px1 ... px99 | 112 B padding]
//
// Readback strips the padding again.
//
//
// SYNCHRONISATION
// ────────────────
// Every copy is submitted and then waited on with `device.poll(Wait)`, so
// each call returns only after the device has finished. Validation and
// out-of-memory failures are caught with error scopes and returned as
// `PipelineError::Transfer` instead of reaching wgpu's panicking default
// handler.

use wgpu::util::DeviceExt;

use crate::backend::{DeviceImage, ImageAccess};
use crate::error::PipelineError;
use crate::gpu::device::GpuDevice;
use crate::image::{region_fits, RgbaBuffer, CHANNELS};

/// wgpu's required row alignment for buffer↔texture copies.
const COPY_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// Texel format of every device image.
pub const IMAGE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Uint;

// ---------------------------------------------------------------------------
// GpuImage
// ---------------------------------------------------------------------------

/// An RGBA8 image resident on the GPU.
///
/// Owns its texture; dropping it releases the device memory.
pub struct GpuImage {
    pub texture: wgpu::Texture,
    /// Full-texture view, bound to the kernel.
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl DeviceImage for GpuImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

impl GpuImage {
    /// Allocate a zero-initialised image.
    ///
    /// TextureUsages per access:
    ///   Source:      TEXTURE_BINDING (kernel input), COPY_DST (view
    ///                uploads), COPY_SRC (quilt export).
    ///   Destination: STORAGE_BINDING (kernel output), COPY_SRC (readback).
    pub fn allocate(
        gpu: &GpuDevice,
        width: u32,
        height: u32,
        access: ImageAccess,
    ) -> Result<Self, PipelineError> {
        let max = gpu.max_texture_dimension;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(PipelineError::Transfer(format!(
                "cannot allocate a {width}x{height} image (device limit is {max}x{max})"
            )));
        }

        let usage = match access {
            ImageAccess::Source => {
                wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::COPY_SRC
            }
            ImageAccess::Destination => {
                wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC
            }
        };
        let label = match access {
            ImageAccess::Source => "quilt",
            ImageAccess::Destination => "output",
        };

        let texture = with_error_scope(gpu, || {
            gpu.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: IMAGE_FORMAT,
                usage,
                view_formats: &[],
            })
        })
        .map_err(|e| PipelineError::Transfer(format!("allocating {label} image: {e}")))?;

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(GpuImage { texture, view, width, height })
    }

    /// Upload `pixels` into the sub-rectangle whose top-left corner is
    /// `origin`. Blocks until the copy has completed on the device.
    pub fn write_region(
        &self,
        gpu: &GpuDevice,
        origin: (u32, u32),
        pixels: &RgbaBuffer,
    ) -> Result<(), PipelineError> {
        let (w, h) = (pixels.width(), pixels.height());
        if !region_fits((self.width, self.height), origin, (w, h)) {
            return Err(PipelineError::Transfer(format!(
                "region {w}x{h} at ({}, {}) lies outside the {}x{} image",
                origin.0, origin.1, self.width, self.height
            )));
        }
        if w == 0 || h == 0 {
            return Ok(());
        }

        let staging = pad_rows(pixels);
        let aligned_bytes_per_row = align_to(w * CHANNELS as u32, COPY_ALIGNMENT);

        with_error_scope(gpu, || {
            let staging_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("GpuImage::staging"),
                contents: &staging,
                usage: wgpu::BufferUsages::COPY_SRC,
            });

            let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("GpuImage::write_region"),
            });
            encoder.copy_buffer_to_texture(
                wgpu::ImageCopyBuffer {
                    buffer: &staging_buf,
                    layout: wgpu::ImageDataLayout {
                        offset: 0,
                        bytes_per_row: Some(aligned_bytes_per_row),
                        rows_per_image: Some(h),
                    },
                },
                wgpu::ImageCopyTexture {
                    texture: &self.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d { x: origin.0, y: origin.1, z: 0 },
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::Extent3d { width: w, height: h, depth_or_array_layers: 1 },
            );
            gpu.queue.submit(std::iter::once(encoder.finish()));
            gpu.device.poll(wgpu::Maintain::Wait);
        })
        .map_err(|e| PipelineError::Transfer(format!("upload to ({}, {}): {e}", origin.0, origin.1)))
    }

    /// Read the whole texture back to host memory. Blocks until done.
    pub fn readback(&self, gpu: &GpuDevice) -> Result<RgbaBuffer, PipelineError> {
        let row_bytes = self.width * CHANNELS as u32;
        let aligned_bytes_per_row = align_to(row_bytes, COPY_ALIGNMENT);
        let readback_size = aligned_bytes_per_row as u64 * self.height as u64;

        let readback_buf = with_error_scope(gpu, || {
            let buf = gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("GpuImage::readback"),
                size: readback_size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });

            let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("GpuImage::readback"),
            });
            encoder.copy_texture_to_buffer(
                wgpu::ImageCopyTexture {
                    texture: &self.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::ImageCopyBuffer {
                    buffer: &buf,
                    layout: wgpu::ImageDataLayout {
                        offset: 0,
                        bytes_per_row: Some(aligned_bytes_per_row),
                        rows_per_image: Some(self.height),
                    },
                },
                wgpu::Extent3d { width: self.width, height: self.height, depth_or_array_layers: 1 },
            );
            gpu.queue.submit(std::iter::once(encoder.finish()));
            buf
        })
        .map_err(|e| PipelineError::Transfer(format!("cannot download the image: {e}")))?;

        // map_async is callback-based; poll(Wait) drives it to completion.
        let slice = readback_buf.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            // The receiver outlives this callback; a send error cannot occur.
            let _ = sender.send(result);
        });
        gpu.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| PipelineError::Transfer("readback map callback never fired".into()))?
            .map_err(|e| PipelineError::Transfer(format!("readback map failed: {e}")))?;

        let mapped = slice.get_mapped_range();
        let out = strip_rows(&mapped, self.width, self.height);
        drop(mapped);
        readback_buf.unmap();
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Run `f` inside a validation + out-of-memory error scope and return the
/// first error captured, if any.
pub(crate) fn with_error_scope<T>(
    gpu: &GpuDevice,
    f: impl FnOnce() -> T,
) -> Result<T, wgpu::Error> {
    gpu.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    let validation = pollster::block_on(gpu.device.pop_error_scope());
    let oom = pollster::block_on(gpu.device.pop_error_scope());
    match validation.or(oom) {
        Some(err) => Err(err),
        None => Ok(value),
    }
}

/// Round `value` up to the next multiple of `alignment`.
///
///   align_to(400, 256) = 512
///   align_to(512, 256) = 512
#[inline]
pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

/// Copy packed RGBA rows into a staging vector whose rows are padded to the
/// copy alignment.
fn pad_rows(src: &RgbaBuffer) -> Vec<u8> {
    let row_bytes = src.row_bytes();
    let aligned = align_to(row_bytes as u32, COPY_ALIGNMENT) as usize;
    if aligned == row_bytes {
        return src.as_bytes().to_vec();
    }
    let mut staging = vec![0u8; aligned * src.height() as usize];
    for y in 0..src.height() {
        let dst_start = y as usize * aligned;
        staging[dst_start..dst_start + row_bytes].copy_from_slice(src.row(y));
    }
    staging
}

/// Inverse of [`pad_rows`]: drop the per-row padding of a mapped buffer.
fn strip_rows(padded: &[u8], width: u32, height: u32) -> RgbaBuffer {
    let mut out = RgbaBuffer::new(width, height);
    if width == 0 {
        return out;
    }
    let row_bytes = out.row_bytes();
    let aligned = align_to(row_bytes as u32, COPY_ALIGNMENT) as usize;
    for y in 0..height {
        let src_start = y as usize * aligned;
        out.row_mut(y).copy_from_slice(&padded[src_start..src_start + row_bytes]);
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
