// quilt.rs — Assemble the quilt as one device-resident image.
//
// GRID LAYOUT
// ────────────
// View index i (its position in sorted order) maps to cell
//
//   col = i mod cols
//   row = rows - 1 - (i div cols)
//
// and cell (col, row) covers device pixels [col·vw, (col+1)·vw) ×
// [row·vh, (row+1)·vh). Device row 0 is the bottom of the logical grid, so
// for rows = 2, cols = 2:
//
//                 col 0     col 1
//   device row 1  view 0    view 1     ← first logical row
//   device row 0  view 2    view 3
//
// VIEW COUNT
// ───────────
// In the default (lenient) policy the counting matches what display tooling
// has always accepted:
//   - exactly rows·cols - 1 views is not an error; the missing cell stays
//     zero-initialised;
//   - once more than rows·cols views have been consumed, enumeration stops
//     with a warning. The one view past the grid has no cell; its transfer
//     is skipped.
// The strict policy demands exactly rows·cols views and never decodes the
// extras.

use std::path::Path;

use crate::backend::{ComputeBackend, DeviceImage, ImageAccess};
use crate::config::CalibrationConfig;
use crate::error::PipelineError;
use crate::image::load_rgba;
use crate::views::{InputMode, ViewSet};

/// How strictly the number of views is checked against the grid size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AssemblyPolicy {
    /// Accept one missing view; consume one view past the grid before
    /// stopping.
    #[default]
    Lenient,
    /// Require exactly `rows * cols` views; ignore extras undecoded.
    Strict,
}

/// Quilt grid shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuiltGrid {
    pub rows: u32,
    pub cols: u32,
}

impl QuiltGrid {
    pub fn new(rows: u32, cols: u32) -> Self {
        QuiltGrid { rows, cols }
    }

    /// Number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The (col, row) cell of view `index`, or `None` when the index lies
    /// past the last grid row.
    pub fn cell(&self, index: usize) -> Option<(u32, u32)> {
        if self.cols == 0 {
            return None;
        }
        let cols = self.cols as usize;
        let logical_row = index / cols;
        if logical_row >= self.rows as usize {
            return None;
        }
        let col = (index % cols) as u32;
        let row = self.rows - 1 - logical_row as u32;
        Some((col, row))
    }

    /// Top-left device pixel of view `index`'s cell for views of size
    /// `view_size`. Never overflows once `quilt_size` has succeeded for the
    /// same `view_size`.
    pub fn cell_origin(&self, index: usize, view_size: (u32, u32)) -> Option<(u32, u32)> {
        let (col, row) = self.cell(index)?;
        Some((col.checked_mul(view_size.0)?, row.checked_mul(view_size.1)?))
    }

    /// Full quilt size for views of `view_size`.
    ///
    /// # Errors
    /// `Config` if either side does not fit in 32 bits.
    pub fn quilt_size(&self, view_size: (u32, u32)) -> Result<(u32, u32), PipelineError> {
        let side = |view: u32, cells: u32, axis: &str| {
            view.checked_mul(cells).ok_or_else(|| {
                PipelineError::Config(format!(
                    "quilt {axis} overflows: {cells} cells of {view} pixels"
                ))
            })
        };
        Ok((side(view_size.0, self.cols, "width")?, side(view_size.1, self.rows, "height")?))
    }
}

impl From<&CalibrationConfig> for QuiltGrid {
    fn from(c: &CalibrationConfig) -> Self {
        QuiltGrid { rows: c.rows, cols: c.cols }
    }
}

/// Which path built the quilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuiltSource {
    /// Uploaded from one pre-composited file.
    File,
    /// Assembled from per-view files.
    Views,
}

/// What happened during assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyReport {
    pub source: QuiltSource,
    /// Size of one view (equal to the quilt size for `QuiltSource::File`).
    pub view_size: (u32, u32),
    pub quilt_size: (u32, u32),
    /// Views consumed from the directory, including a view past the grid.
    pub loaded: usize,
    /// Grid capacity, `rows * cols`.
    pub expected: usize,
    /// Excess input files were present and ignored.
    pub excess_ignored: bool,
}

/// A fully assembled quilt on the device.
pub struct AssembledQuilt<I> {
    pub image: I,
    pub report: AssemblyReport,
}

/// Builds the quilt on a backend.
pub struct QuiltAssembler<'a, B: ComputeBackend> {
    backend: &'a B,
    grid: QuiltGrid,
    policy: AssemblyPolicy,
}

impl<'a, B: ComputeBackend> QuiltAssembler<'a, B> {
    pub fn new(backend: &'a B, grid: QuiltGrid) -> Self {
        QuiltAssembler { backend, grid, policy: AssemblyPolicy::default() }
    }

    pub fn with_policy(mut self, policy: AssemblyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Assemble from whichever input mode was detected.
    pub fn assemble(&self, input: &InputMode) -> Result<AssembledQuilt<B::Image>, PipelineError> {
        match input {
            InputMode::SingleQuilt(path) => self.upload_quilt_file(path),
            InputMode::Directory(views) => self.assemble_views(views),
        }
    }

    /// Decode one pre-composited quilt and upload it in a single transfer.
    pub fn upload_quilt_file(&self, path: &Path) -> Result<AssembledQuilt<B::Image>, PipelineError> {
        log::info!("loading quilt {}", path.display());
        let pixels = load_rgba(path)?;
        let size = (pixels.width(), pixels.height());

        let image = self.backend.allocate(size.0, size.1, ImageAccess::Source)?;
        self.backend.write_region(&image, (0, 0), &pixels)?;
        drop(pixels);

        Ok(AssembledQuilt {
            image,
            report: AssemblyReport {
                source: QuiltSource::File,
                view_size: size,
                quilt_size: size,
                loaded: 1,
                expected: 1,
                excess_ignored: false,
            },
        })
    }

    /// Upload each view of `views` into its grid cell.
    pub fn assemble_views(&self, views: &ViewSet) -> Result<AssembledQuilt<B::Image>, PipelineError> {
        let view_size = views.probe_resolution()?;
        let quilt_size = self.grid.quilt_size(view_size)?;
        let expected = self.grid.len();
        log::info!(
            "assembling {}x{} quilt from {} files ({}x{} grid of {}x{} views)",
            quilt_size.0,
            quilt_size.1,
            views.len(),
            self.grid.cols,
            self.grid.rows,
            view_size.0,
            view_size.1
        );

        let image = self.backend.allocate(quilt_size.0, quilt_size.1, ImageAccess::Source)?;

        let mut loaded = 0usize;
        let mut excess_ignored = false;
        for (index, file) in views.files().iter().enumerate() {
            if self.policy == AssemblyPolicy::Strict && index >= expected {
                excess_ignored = true;
                break;
            }

            let pixels = load_rgba(file)?;
            match self.grid.cell_origin(index, view_size) {
                Some(origin) => {
                    log::debug!("view {index} {} -> {origin:?}", file.display());
                    self.backend.write_region(&image, origin, &pixels).map_err(|e| match e {
                        PipelineError::Transfer(msg) => PipelineError::Transfer(format!(
                            "cannot upload the image {}: {msg}",
                            file.display()
                        )),
                        other => other,
                    })?;
                }
                None => log::debug!("view {index} {} lies past the grid, not uploaded", file.display()),
            }
            // Host copy released before the next decode.
            drop(pixels);

            loaded += 1;
            if loaded > expected {
                excess_ignored = true;
                break;
            }
        }

        if excess_ignored {
            log::warn!(
                "the number of input files is higher than the expected quilt size; using only the first {expected} files"
            );
        }

        let minimum = match self.policy {
            AssemblyPolicy::Lenient => expected.saturating_sub(1),
            AssemblyPolicy::Strict => expected,
        };
        if loaded < minimum {
            return Err(PipelineError::InsufficientViews { found: loaded, expected });
        }
        if loaded < expected {
            log::warn!("{} of {expected} views supplied; remaining cells left blank", loaded);
        }

        debug_assert_eq!(image.size(), quilt_size);
        Ok(AssembledQuilt {
            image,
            report: AssemblyReport {
                source: QuiltSource::Views,
                view_size,
                quilt_size,
                loaded,
                expected,
                excess_ignored,
            },
        })
    }
}
