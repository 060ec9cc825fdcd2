// quilt-native: quilt → native lenticular image converter
//
// Assembles a grid of per-view renders into one device-resident quilt and
// runs the display's interleaving kernel over it.

pub mod error;
pub mod image;
pub mod config;
pub mod views;
pub mod backend;
pub mod quilt;
pub mod dispatch;
pub mod export;
pub mod pipeline;

// wgpu backend
pub mod gpu;

pub use backend::{ComputeBackend, DeviceImage, ImageAccess, KernelArgs};
pub use config::{CalibrationConfig, PartialCalibration};
pub use error::PipelineError;
pub use pipeline::{run, Job, RunSummary};
pub use quilt::{AssemblyPolicy, AssemblyReport, QuiltGrid};
