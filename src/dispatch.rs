// dispatch.rs — Allocate the output image and run the interleaving kernel.

use crate::backend::{ComputeBackend, DeviceImage, ImageAccess, KernelArgs};
use crate::config::CalibrationConfig;
use crate::error::PipelineError;

/// Runs the kernel once over the display's full resolution.
pub struct ComputeDispatcher<'a, B: ComputeBackend> {
    backend: &'a B,
    kernel: &'a B::Kernel,
}

impl<'a, B: ComputeBackend> ComputeDispatcher<'a, B> {
    pub fn new(backend: &'a B, kernel: &'a B::Kernel) -> Self {
        ComputeDispatcher { backend, kernel }
    }

    /// Allocate a `width`×`height` destination and fill it from `quilt`.
    ///
    /// Returns once every output pixel has been written.
    pub fn run(
        &self,
        quilt: &B::Image,
        calibration: &CalibrationConfig,
    ) -> Result<B::Image, PipelineError> {
        // Keeps rows and cols within the kernel's i32 arguments.
        calibration.validate()?;
        let output = self.backend.allocate(
            calibration.width,
            calibration.height,
            ImageAccess::Destination,
        )?;
        let args = KernelArgs::from(calibration);
        log::info!(
            "interleaving {}x{} quilt into {}x{} output",
            quilt.width(),
            quilt.height(),
            calibration.width,
            calibration.height
        );
        log::debug!("kernel arguments: {args:?}");
        self.backend.dispatch(self.kernel, quilt, &output, &args)?;
        Ok(output)
    }
}
