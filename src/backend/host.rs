// backend/host.rs — In-memory device for running the pipeline without a GPU.
//
// Images live in host RAM behind a `RefCell` so that `write_region` can take
// `&Image` exactly like the GPU backend, where the texture handle is shared
// and the driver owns the memory. The pipeline is single-threaded, so the
// runtime borrow check never contends.
//
// Kernels are ordinary Rust: anything implementing `PixelKernel`, including
// closures of the form `|quilt, x, y, args| -> [u8; 4]`, boxed in a
// `HostKernel`.

use std::cell::RefCell;

use crate::backend::{ComputeBackend, DeviceImage, ImageAccess, KernelArgs};
use crate::error::PipelineError;
use crate::image::RgbaBuffer;

/// Per-pixel interleaving function evaluated by [`HostBackend::dispatch`].
pub trait PixelKernel {
    /// Produce output pixel (x, y) from the quilt.
    fn shade(&self, quilt: &RgbaBuffer, x: u32, y: u32, args: &KernelArgs) -> [u8; 4];
}

impl<F> PixelKernel for F
where
    F: Fn(&RgbaBuffer, u32, u32, &KernelArgs) -> [u8; 4],
{
    fn shade(&self, quilt: &RgbaBuffer, x: u32, y: u32, args: &KernelArgs) -> [u8; 4] {
        self(quilt, x, y, args)
    }
}

/// A boxed [`PixelKernel`], the kernel type of [`HostBackend`].
pub struct HostKernel {
    inner: Box<dyn PixelKernel>,
}

impl HostKernel {
    pub fn new<K: PixelKernel + 'static>(kernel: K) -> Self {
        HostKernel { inner: Box::new(kernel) }
    }

    /// Wrap a closure; its argument types are inferred.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&RgbaBuffer, u32, u32, &KernelArgs) -> [u8; 4] + 'static,
    {
        Self::new(f)
    }
}

/// A host-memory "device image".
pub struct HostImage {
    pixels: RefCell<RgbaBuffer>,
}

impl DeviceImage for HostImage {
    fn width(&self) -> u32 {
        self.pixels.borrow().width()
    }

    fn height(&self) -> u32 {
        self.pixels.borrow().height()
    }
}

/// The host backend. Stateless apart from an optional allocation limit.
#[derive(Debug, Clone, Default)]
pub struct HostBackend {
    max_dimension: Option<u32>,
}

impl HostBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse allocations wider or taller than `max`, mirroring a device's
    /// texture-size limit.
    pub fn with_max_dimension(max: u32) -> Self {
        HostBackend { max_dimension: Some(max) }
    }
}

impl ComputeBackend for HostBackend {
    type Image = HostImage;
    type Kernel = HostKernel;

    fn allocate(
        &self,
        width: u32,
        height: u32,
        _access: ImageAccess,
    ) -> Result<HostImage, PipelineError> {
        if let Some(max) = self.max_dimension {
            if width > max || height > max {
                return Err(PipelineError::Transfer(format!(
                    "image {width}x{height} exceeds the device limit of {max}"
                )));
            }
        }
        Ok(HostImage { pixels: RefCell::new(RgbaBuffer::new(width, height)) })
    }

    fn write_region(
        &self,
        image: &HostImage,
        origin: (u32, u32),
        pixels: &RgbaBuffer,
    ) -> Result<(), PipelineError> {
        let mut dst = image.pixels.borrow_mut();
        if !dst.blit(origin.0, origin.1, pixels) {
            return Err(PipelineError::Transfer(format!(
                "region {}x{} at ({}, {}) lies outside the {}x{} image",
                pixels.width(),
                pixels.height(),
                origin.0,
                origin.1,
                dst.width(),
                dst.height()
            )));
        }
        Ok(())
    }

    fn read_image(&self, image: &HostImage) -> Result<RgbaBuffer, PipelineError> {
        Ok(image.pixels.borrow().clone())
    }

    fn dispatch(
        &self,
        kernel: &HostKernel,
        quilt: &HostImage,
        output: &HostImage,
        args: &KernelArgs,
    ) -> Result<(), PipelineError> {
        if std::ptr::eq(quilt, output) {
            return Err(PipelineError::Compute("quilt and output must be distinct images".into()));
        }
        let src = quilt.pixels.borrow();
        let mut dst = output.pixels.borrow_mut();
        for y in 0..dst.height() {
            for x in 0..dst.width() {
                let px = kernel.inner.shade(&src, x, y, args);
                dst.set_pixel(x, y, px);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> KernelArgs {
        KernelArgs {
            rows: 1,
            cols: 1,
            tilt: 0.0,
            pitch: 0.0,
            center: 0.0,
            view_portion: 1.0,
            subp: 0.0,
            focus: 0.0,
        }
    }

    #[test]
    fn allocate_is_zeroed() {
        let backend = HostBackend::new();
        let img = backend.allocate(3, 2, ImageAccess::Source).unwrap();
        assert_eq!(img.size(), (3, 2));
        assert_eq!(backend.read_image(&img).unwrap(), RgbaBuffer::new(3, 2));
    }

    #[test]
    fn allocate_respects_limit() {
        let backend = HostBackend::with_max_dimension(64);
        assert!(backend.allocate(64, 64, ImageAccess::Source).is_ok());
        let err = backend.allocate(65, 1, ImageAccess::Source).err().unwrap();
        assert!(matches!(err, PipelineError::Transfer(_)));
    }

    #[test]
    fn write_region_out_of_bounds_is_transfer_error() {
        let backend = HostBackend::new();
        let img = backend.allocate(4, 4, ImageAccess::Source).unwrap();
        let view = RgbaBuffer::filled(2, 2, [1, 2, 3, 4]);
        let err = backend.write_region(&img, (3, 3), &view).unwrap_err();
        assert!(matches!(err, PipelineError::Transfer(_)));
    }

    #[test]
    fn dispatch_covers_every_output_pixel() {
        let backend = HostBackend::new();
        let quilt = backend.allocate(2, 2, ImageAccess::Source).unwrap();
        let out = backend.allocate(5, 3, ImageAccess::Destination).unwrap();
        let kernel = HostKernel::from_fn(|_, x, y, _| [x as u8, y as u8, 7, 255]);
        backend.dispatch(&kernel, &quilt, &out, &args()).unwrap();

        let result = backend.read_image(&out).unwrap();
        for y in 0..3 {
            for x in 0..5 {
                assert_eq!(result.pixel(x, y), [x as u8, y as u8, 7, 255]);
            }
        }
    }
}
