// export.rs — Device image → PNG on disk.

use std::path::Path;

use crate::backend::{ComputeBackend, DeviceImage};
use crate::error::PipelineError;
use crate::image::save_png;

/// Reads device images back and writes them as 8-bit RGBA PNGs.
pub struct ResultExporter<'a, B: ComputeBackend> {
    backend: &'a B,
}

impl<'a, B: ComputeBackend> ResultExporter<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        ResultExporter { backend }
    }

    /// Read `image` back in one blocking transfer and write it to `path`.
    ///
    /// The file has the device image's dimensions; parent directories are
    /// created as needed.
    pub fn export(&self, image: &B::Image, path: &Path) -> Result<(), PipelineError> {
        log::info!("storing {}x{} image to {}", image.width(), image.height(), path.display());
        let pixels = self.backend.read_image(image)?;
        debug_assert_eq!((pixels.width(), pixels.height()), image.size());
        save_png(&pixels, path)
    }
}
