// pipeline.rs — One conversion, start to finish.
//
//   InputMode::detect ─▶ QuiltAssembler ─▶ ComputeDispatcher ─▶ ResultExporter
//
// Each stage completes (its device work waited on) before the next starts.
// Any error aborts the run; no output is written before the quilt has been
// fully assembled and its view count accepted.
//
// OUTPUT LAYOUT
// ──────────────
//   directory input: `output` is a directory; receives quilt.png (unless
//                    disabled) and output.png.
//   file input:      `output` is the result file itself, or a directory
//                    that already exists, in which case output.png goes
//                    inside it.

use std::path::{Path, PathBuf};

use crate::backend::ComputeBackend;
use crate::config::CalibrationConfig;
use crate::dispatch::ComputeDispatcher;
use crate::error::PipelineError;
use crate::export::ResultExporter;
use crate::quilt::{AssemblyPolicy, AssemblyReport, QuiltAssembler, QuiltGrid};
use crate::views::InputMode;

/// File name of the interleaved result in directory output mode.
pub const OUTPUT_FILE_NAME: &str = "output.png";
/// File name of the assembled quilt in directory output mode.
pub const QUILT_FILE_NAME: &str = "quilt.png";

/// Everything one conversion needs.
#[derive(Debug, Clone)]
pub struct Job {
    pub input: PathBuf,
    pub output: PathBuf,
    pub calibration: CalibrationConfig,
    pub policy: AssemblyPolicy,
    /// Write the assembled quilt next to the result (directory input only).
    pub export_quilt: bool,
}

impl Job {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, calibration: CalibrationConfig) -> Self {
        Job {
            input: input.into(),
            output: output.into(),
            calibration,
            policy: AssemblyPolicy::default(),
            export_quilt: true,
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub assembly: AssemblyReport,
    /// The interleaved image file.
    pub output_path: PathBuf,
    /// The exported quilt, when one was written.
    pub quilt_path: Option<PathBuf>,
}

/// Run `job` on `backend` with `kernel`.
pub fn run<B: ComputeBackend>(
    backend: &B,
    kernel: &B::Kernel,
    job: &Job,
) -> Result<RunSummary, PipelineError> {
    job.calibration.validate()?;

    log::info!("loading images and allocating device memory");
    let input = InputMode::detect(&job.input)?;
    let (output_path, quilt_path) = output_paths(&input, &job.output, job.export_quilt);

    let assembled = QuiltAssembler::new(backend, QuiltGrid::from(&job.calibration))
        .with_policy(job.policy)
        .assemble(&input)?;

    let exporter = ResultExporter::new(backend);
    if let Some(path) = &quilt_path {
        exporter.export(&assembled.image, path)?;
    }

    log::info!("processing on device");
    let output = ComputeDispatcher::new(backend, kernel).run(&assembled.image, &job.calibration)?;
    // The quilt is no longer needed; free it before the read-back buffer
    // is allocated.
    drop(assembled.image);

    exporter.export(&output, &output_path)?;

    Ok(RunSummary { assembly: assembled.report, output_path, quilt_path })
}

/// Where the result (and the optional quilt) go for this input mode.
fn output_paths(input: &InputMode, output: &Path, export_quilt: bool) -> (PathBuf, Option<PathBuf>) {
    match input {
        InputMode::Directory(_) => {
            let quilt = export_quilt.then(|| output.join(QUILT_FILE_NAME));
            (output.join(OUTPUT_FILE_NAME), quilt)
        }
        InputMode::SingleQuilt(_) if output.is_dir() => (output.join(OUTPUT_FILE_NAME), None),
        InputMode::SingleQuilt(_) => (output.to_path_buf(), None),
    }
}
