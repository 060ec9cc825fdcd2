// config.rs — Display calibration and its sources.
//
// The calibration values are opaque to the pipeline: they are validated for
// shape (grid and output size) and then forwarded verbatim to the kernel.
//
// Two sources are merged, field by field:
//   1. an optional TOML file (`--config display.toml`), and
//   2. explicit command-line flags, which win over the file.
//
// Example file:
//
//   rows = 9
//   cols = 5
//   width = 1536
//   height = 2048
//   tilt = -0.1153
//   pitch = 354.42
//   center = 0.04239
//   subp = 0.000217
//   view_portion = 0.99976
//   focus = 0.0

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::PipelineError;

/// Display calibration: output resolution, quilt grid shape and the scalar
/// constants of the interleaving formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationConfig {
    /// Output (display) width in pixels.
    pub width: u32,
    /// Output (display) height in pixels.
    pub height: u32,
    /// Quilt rows.
    pub rows: u32,
    /// Quilt columns.
    pub cols: u32,
    pub tilt: f32,
    pub pitch: f32,
    pub center: f32,
    pub subp: f32,
    pub view_portion: f32,
    pub focus: f32,
}

impl CalibrationConfig {
    /// Number of views the grid holds (`rows * cols`).
    #[inline]
    pub fn view_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    /// Check the shape invariants: rows, cols, width and height all
    /// positive, and a grid whose cell count fits the kernel's `i32`.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let checks = [
            ("rows", self.rows),
            ("cols", self.cols),
            ("width", self.width),
            ("height", self.height),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(PipelineError::Config(format!("{name} must be at least 1")));
            }
        }
        if i64::from(self.rows) * i64::from(self.cols) > i64::from(i32::MAX) {
            return Err(PipelineError::Config(format!(
                "a {}x{} grid exceeds {} views",
                self.rows,
                self.cols,
                i32::MAX
            )));
        }
        Ok(())
    }
}

/// A partially specified calibration. Every field is optional so that a
/// file and the command line can each supply a subset.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialCalibration {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub rows: Option<u32>,
    pub cols: Option<u32>,
    pub tilt: Option<f32>,
    pub pitch: Option<f32>,
    pub center: Option<f32>,
    pub subp: Option<f32>,
    #[serde(alias = "viewPortion")]
    pub view_portion: Option<f32>,
    pub focus: Option<f32>,
}

impl PartialCalibration {
    /// Parse a TOML calibration file.
    pub fn from_toml_file(path: &Path) -> Result<Self, PipelineError> {
        let text = fs::read_to_string(path).map_err(|e| PipelineError::resource(path, e))?;
        Self::from_toml_str(&text)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Field-wise merge: values present in `overrides` replace ours.
    pub fn merged_with(self, overrides: PartialCalibration) -> Self {
        PartialCalibration {
            width: overrides.width.or(self.width),
            height: overrides.height.or(self.height),
            rows: overrides.rows.or(self.rows),
            cols: overrides.cols.or(self.cols),
            tilt: overrides.tilt.or(self.tilt),
            pitch: overrides.pitch.or(self.pitch),
            center: overrides.center.or(self.center),
            subp: overrides.subp.or(self.subp),
            view_portion: overrides.view_portion.or(self.view_portion),
            focus: overrides.focus.or(self.focus),
        }
    }

    /// Require every field, then validate the result.
    ///
    /// The error names all missing fields at once rather than the first one.
    pub fn resolve(self) -> Result<CalibrationConfig, PipelineError> {
        let mut missing = Vec::new();
        fn take<T>(v: Option<T>, name: &'static str, missing: &mut Vec<&'static str>) -> T
        where
            T: Default,
        {
            v.unwrap_or_else(|| {
                missing.push(name);
                T::default()
            })
        }

        let config = CalibrationConfig {
            width: take(self.width, "width", &mut missing),
            height: take(self.height, "height", &mut missing),
            rows: take(self.rows, "rows", &mut missing),
            cols: take(self.cols, "cols", &mut missing),
            tilt: take(self.tilt, "tilt", &mut missing),
            pitch: take(self.pitch, "pitch", &mut missing),
            center: take(self.center, "center", &mut missing),
            subp: take(self.subp, "subp", &mut missing),
            view_portion: take(self.view_portion, "viewPortion", &mut missing),
            focus: take(self.focus, "focus", &mut missing),
        };
        if !missing.is_empty() {
            return Err(PipelineError::Config(format!(
                "missing calibration values: {}",
                missing.join(", ")
            )));
        }
        config.validate()?;
        Ok(config)
    }
}
