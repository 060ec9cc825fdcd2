// gpu/mod.rs — wgpu implementation of the compute backend.
//
//   device  adapter selection, device limits, workgroup size
//   image   RGBA8 textures, region uploads, readback
//   kernel  WGSL kernel loading, compilation diagnostics, dispatch
//
// `GpuDevice` is the device context the pipeline stages receive; the impl
// below routes each `ComputeBackend` call to the module that owns it.

pub mod device;
pub mod image;
pub mod kernel;

use crate::backend::{ComputeBackend, ImageAccess, KernelArgs};
use crate::error::PipelineError;
use crate::image::RgbaBuffer;

use self::device::GpuDevice;
use self::image::GpuImage;
use self::kernel::GpuKernel;

impl ComputeBackend for GpuDevice {
    type Image = GpuImage;
    type Kernel = GpuKernel;

    fn allocate(
        &self,
        width: u32,
        height: u32,
        access: ImageAccess,
    ) -> Result<GpuImage, PipelineError> {
        GpuImage::allocate(self, width, height, access)
    }

    fn write_region(
        &self,
        image: &GpuImage,
        origin: (u32, u32),
        pixels: &RgbaBuffer,
    ) -> Result<(), PipelineError> {
        image.write_region(self, origin, pixels)
    }

    fn read_image(&self, image: &GpuImage) -> Result<RgbaBuffer, PipelineError> {
        image.readback(self)
    }

    fn dispatch(
        &self,
        kernel: &GpuKernel,
        quilt: &GpuImage,
        output: &GpuImage,
        args: &KernelArgs,
    ) -> Result<(), PipelineError> {
        kernel.dispatch(self, quilt, output, args)
    }
}
