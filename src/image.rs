// image.rs — Host-side RGBA8 pixel buffer and file codec helpers.
//
// Every image that crosses the device boundary is 8-bit, 4-channel RGBA,
// whatever the source file's native channel layout. Channel expansion happens
// here, at decode time, so nothing downstream ever sees another format.
//
// Memory layout (width = 3):
//
//   byte index:  0 1 2 3  4 5 6 7  8 9 10 11 | 12 ...
//   pixel:       R G B A  R G B A  R G B  A  | row 1 ...
//   row:         |--------- row 0 ---------| |
//
// Rows are tightly packed (stride = 4 * width bytes). The GPU upload path adds
// its own row padding in the staging buffer; host buffers never carry any.

use std::fs;
use std::path::Path;

use image::{ImageError, ImageFormat};

use crate::error::PipelineError;

/// Bytes per pixel for every image handled by the pipeline.
pub const CHANNELS: usize = 4;

/// An owned, tightly packed RGBA8 image in host memory.
#[derive(Clone, PartialEq, Eq)]
pub struct RgbaBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RgbaBuffer {
    /// Zero-initialised (transparent black) buffer.
    pub fn new(width: u32, height: u32) -> Self {
        RgbaBuffer {
            width,
            height,
            data: vec![0u8; width as usize * height as usize * CHANNELS],
        }
    }

    /// Buffer with every pixel set to `rgba`.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * CHANNELS)
            .collect();
        RgbaBuffer { width, height, data }
    }

    /// Wrap raw RGBA bytes. Returns `None` if the length does not match
    /// `width * height * 4`.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != width as usize * height as usize * CHANNELS {
            return None;
        }
        Some(RgbaBuffer { width, height, data })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row length in bytes.
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.width as usize * CHANNELS
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Borrow one row of packed RGBA bytes.
    ///
    /// # Panics
    /// Panics if `y >= height`.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y as usize * self.row_bytes();
        &self.data[start..start + self.row_bytes()]
    }

    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let len = self.row_bytes();
        let start = y as usize * len;
        &mut self.data[start..start + len]
    }

    /// The pixel at column `x`, row `y`.
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for {}x{}",
            self.width,
            self.height
        );
        let i = (y as usize * self.width as usize + x as usize) * CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for {}x{}",
            self.width,
            self.height
        );
        let i = (y as usize * self.width as usize + x as usize) * CHANNELS;
        self.data[i..i + CHANNELS].copy_from_slice(&rgba);
    }

    /// Copy `src` into this buffer with its top-left corner at (x, y).
    ///
    /// Returns `false` (and copies nothing) if the region does not fit.
    pub fn blit(&mut self, x: u32, y: u32, src: &RgbaBuffer) -> bool {
        if !region_fits((self.width, self.height), (x, y), (src.width, src.height)) {
            return false;
        }
        let offset = x as usize * CHANNELS;
        for row in 0..src.height {
            let dst = self.row_mut(y + row);
            dst[offset..offset + src.row_bytes()].copy_from_slice(src.row(row));
        }
        true
    }
}

impl std::fmt::Debug for RgbaBuffer {
    // The pixel vector is usually megabytes; print the shape only.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RgbaBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// True when a `size` rectangle at `origin` lies entirely inside `bounds`.
#[inline]
pub fn region_fits(bounds: (u32, u32), origin: (u32, u32), size: (u32, u32)) -> bool {
    let fits = |o: u32, s: u32, b: u32| o.checked_add(s).is_some_and(|end| end <= b);
    fits(origin.0, size.0, bounds.0) && fits(origin.1, size.1, bounds.1)
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Decode an image file of any supported format into RGBA8.
pub fn load_rgba(path: &Path) -> Result<RgbaBuffer, PipelineError> {
    let img = image::open(path)
        .map_err(|source| PipelineError::Decode { path: path.to_path_buf(), source })?
        .into_rgba8();
    let (width, height) = img.dimensions();
    Ok(RgbaBuffer { width, height, data: img.into_raw() })
}

/// Read only the header of an image file and return its (width, height).
pub fn probe_dimensions(path: &Path) -> Result<(u32, u32), PipelineError> {
    image::image_dimensions(path).map_err(|e| PipelineError::resource(path, e))
}

/// Write `buffer` as an 8-bit RGBA PNG, creating parent directories.
pub fn save_png(buffer: &RgbaBuffer, path: &Path) -> Result<(), PipelineError> {
    let io_err = |source: ImageError| PipelineError::Io { path: path.to_path_buf(), source };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| io_err(ImageError::IoError(e)))?;
        }
    }
    image::save_buffer_with_format(
        path,
        buffer.as_bytes(),
        buffer.width,
        buffer.height,
        image::ColorType::Rgba8,
        ImageFormat::Png,
    )
    .map_err(io_err)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
