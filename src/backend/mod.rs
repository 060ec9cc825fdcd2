// backend/mod.rs — The device context every pipeline stage is handed.
//
// The pipeline never touches a global device. Each stage receives a
// `&impl ComputeBackend` and does all of its work through it:
//
//   QuiltAssembler    allocate + write_region
//   ComputeDispatcher allocate + dispatch
//   ResultExporter    read_image
//
// Two implementations exist:
//   - `gpu::GpuDevice`: wgpu textures and a WGSL kernel (production).
//   - `host::HostBackend`: plain memory and a Rust closure as the kernel,
//     so the orchestration can be tested on machines without a GPU.
//
// Every method is blocking: when it returns, the data it wrote is visible
// to the next call. A backend may queue work internally, but must not leak
// that asynchrony through this interface.

pub mod host;

use crate::config::CalibrationConfig;
use crate::error::PipelineError;
use crate::image::RgbaBuffer;

/// How a device image will be accessed by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageAccess {
    /// Kernel input, written by host transfers (the quilt).
    Source,
    /// Kernel output, read back by the host (the interleaved image).
    Destination,
}

/// A device-resident RGBA8 image.
pub trait DeviceImage {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    fn size(&self) -> (u32, u32) {
        (self.width(), self.height())
    }
}

/// The scalar kernel arguments, in dispatch order after the two images.
///
/// Field order and types are part of the kernel contract: two integers
/// followed by six floats. The struct is `#[repr(C)]` and `Pod` so the GPU
/// backend can upload it verbatim as a uniform block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct KernelArgs {
    pub rows: i32,
    pub cols: i32,
    pub tilt: f32,
    pub pitch: f32,
    pub center: f32,
    pub view_portion: f32,
    pub subp: f32,
    pub focus: f32,
}

/// `rows` and `cols` are cast to `i32`; `CalibrationConfig::validate`
/// guarantees they fit.
impl From<&CalibrationConfig> for KernelArgs {
    fn from(c: &CalibrationConfig) -> Self {
        KernelArgs {
            rows: c.rows as i32,
            cols: c.cols as i32,
            tilt: c.tilt,
            pitch: c.pitch,
            center: c.center,
            view_portion: c.view_portion,
            subp: c.subp,
            focus: c.focus,
        }
    }
}

/// Image allocation, partial-region transfer, read-back and kernel dispatch.
pub trait ComputeBackend {
    type Image: DeviceImage;
    /// The compiled interleaving kernel.
    type Kernel;

    /// Allocate a zero-initialised RGBA8 image.
    fn allocate(&self, width: u32, height: u32, access: ImageAccess)
        -> Result<Self::Image, PipelineError>;

    /// Copy `pixels` into the sub-rectangle of `image` whose top-left
    /// corner is `origin`. The image is not reallocated.
    ///
    /// Fails with `Transfer` if the rectangle does not fit.
    fn write_region(
        &self,
        image: &Self::Image,
        origin: (u32, u32),
        pixels: &RgbaBuffer,
    ) -> Result<(), PipelineError>;

    /// Copy the whole image back to host memory.
    fn read_image(&self, image: &Self::Image) -> Result<RgbaBuffer, PipelineError>;

    /// Run `kernel` once per pixel of `output`, reading `quilt`.
    fn dispatch(
        &self,
        kernel: &Self::Kernel,
        quilt: &Self::Image,
        output: &Self::Image,
        args: &KernelArgs,
    ) -> Result<(), PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_args_layout_is_eight_words() {
        assert_eq!(std::mem::size_of::<KernelArgs>(), 32);
    }

    #[test]
    fn kernel_args_follow_calibration_order() {
        let cfg = CalibrationConfig {
            width: 10,
            height: 20,
            rows: 9,
            cols: 5,
            tilt: 1.0,
            pitch: 2.0,
            center: 3.0,
            subp: 4.0,
            view_portion: 5.0,
            focus: 6.0,
        };
        let args = KernelArgs::from(&cfg);
        let words: &[u32] = bytemuck::cast_slice(std::slice::from_ref(&args));
        assert_eq!(words[0], 9);
        assert_eq!(words[1], 5);
        let floats: Vec<f32> = words[2..].iter().map(|w| f32::from_bits(*w)).collect();
        // tilt, pitch, center, viewPortion, subp, focus
        assert_eq!(floats, vec![1.0, 2.0, 3.0, 5.0, 4.0, 6.0]);
    }
}
