// quilt2native — command-line front-end.
//
// Usage:
//   quilt2native -i views/ -o out/ -rows 9 -cols 5 -width 1536 -height 2048 \
//       -tilt -0.1153 -pitch 354.42 -center 0.04239 -subp 0.000217 \
//       -viewPortion 0.99976 -focus 0
//   quilt2native -i quilt.png -o native.png --config display.toml

use std::error::Error;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use quilt_native::gpu::device::{DeviceProfile, GpuDevice, WorkgroupSize};
use quilt_native::gpu::kernel::{GpuKernel, DEFAULT_KERNEL_PATH};
use quilt_native::{AssemblyPolicy, Job, PartialCalibration, PipelineError};

/// Converts a quilt (one image, or a directory of views) into the native
/// interleaved image of a lenticular display.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Quilt image, or directory of view images (sorted by file name).
    #[arg(short = 'i', long)]
    input: PathBuf,

    /// Output file (quilt input) or directory (view-directory input).
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// TOML file with calibration values; explicit flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// WGSL interleaving kernel.
    #[arg(long, default_value = DEFAULT_KERNEL_PATH)]
    kernel: PathBuf,

    /// Require exactly rows*cols views.
    #[arg(long)]
    strict: bool,

    /// Do not write quilt.png in directory mode.
    #[arg(long)]
    no_quilt: bool,

    /// Request wgpu's baseline device limits instead of the adapter's.
    #[arg(long)]
    portable: bool,

    /// Compute workgroup size as XxY, e.g. 16x8.
    #[arg(long, value_parser = parse_workgroup)]
    workgroup: Option<WorkgroupSize>,

    /// Debug logging.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Quilt rows.
    #[arg(long)]
    rows: Option<u32>,
    /// Quilt columns.
    #[arg(long)]
    cols: Option<u32>,
    /// Output width in pixels.
    #[arg(long)]
    width: Option<u32>,
    /// Output height in pixels.
    #[arg(long)]
    height: Option<u32>,
    #[arg(long, allow_negative_numbers = true)]
    tilt: Option<f32>,
    #[arg(long, allow_negative_numbers = true)]
    pitch: Option<f32>,
    #[arg(long, allow_negative_numbers = true)]
    center: Option<f32>,
    #[arg(long, allow_negative_numbers = true)]
    subp: Option<f32>,
    #[arg(long = "viewPortion", alias = "view-portion", allow_negative_numbers = true)]
    view_portion: Option<f32>,
    #[arg(long, allow_negative_numbers = true)]
    focus: Option<f32>,
}

impl Args {
    fn calibration_overrides(&self) -> PartialCalibration {
        PartialCalibration {
            width: self.width,
            height: self.height,
            rows: self.rows,
            cols: self.cols,
            tilt: self.tilt,
            pitch: self.pitch,
            center: self.center,
            subp: self.subp,
            view_portion: self.view_portion,
            focus: self.focus,
        }
    }
}

/// Long options that are also accepted with a single dash (`-rows 9`).
const SINGLE_DASH_LONG: &[&str] = &[
    "input", "output", "rows", "cols", "width", "height", "tilt", "pitch", "center", "subp",
    "viewPortion", "focus", "config", "kernel", "strict", "portable", "workgroup", "help",
];

/// Rewrite `-rows` as `--rows` for every known long option. Values (including
/// negative numbers) and short flags pass through untouched.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let long = arg
                .to_str()
                .and_then(|s| s.strip_prefix('-'))
                .filter(|rest| !rest.starts_with('-'))
                .and_then(|rest| {
                    let name = rest.split('=').next().unwrap_or(rest);
                    SINGLE_DASH_LONG.contains(&name).then(|| format!("-{}", arg.to_string_lossy()))
                });
            long.map(OsString::from).unwrap_or(arg)
        })
        .collect()
}

/// Parse `16x8` (or `16,8`) into a workgroup size.
fn parse_workgroup(s: &str) -> Result<WorkgroupSize, String> {
    let (x, y) = s
        .split_once(['x', ','])
        .ok_or_else(|| format!("expected XxY, got `{s}`"))?;
    let dim = |v: &str| v.trim().parse::<u32>().map_err(|e| format!("`{v}`: {e}"));
    Ok(WorkgroupSize { x: dim(x)?, y: dim(y)? })
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn try_main(args: Args) -> Result<(), PipelineError> {
    let file = match &args.config {
        Some(path) => PartialCalibration::from_toml_file(path)?,
        None => PartialCalibration::default(),
    };
    let calibration = file.merged_with(args.calibration_overrides()).resolve()?;

    let profile = if args.portable { DeviceProfile::Portable } else { DeviceProfile::Native };
    let mut gpu = GpuDevice::new_with_profile(profile)?;
    if let Some(wg) = args.workgroup {
        gpu.set_workgroup_size(wg.x, wg.y)?;
    }
    log::info!("{gpu}");
    let kernel = GpuKernel::load(&gpu, &args.kernel)?;

    let job = Job {
        input: args.input,
        output: args.output,
        calibration,
        policy: if args.strict { AssemblyPolicy::Strict } else { AssemblyPolicy::Lenient },
        export_quilt: !args.no_quilt,
    };
    let summary = quilt_native::run(&gpu, &kernel, &job)?;

    log::info!(
        "done: {} ({} of {} views)",
        summary.output_path.display(),
        summary.assembly.loaded.min(summary.assembly.expected),
        summary.assembly.expected
    );
    Ok(())
}

fn main() -> ExitCode {
    let argv: Vec<OsString> = std::env::args_os().collect();
    if argv.len() < 2 {
        eprintln!("Use --help");
        return ExitCode::SUCCESS;
    }

    let args = Args::parse_from(normalize_args(argv));
    init_logging(args.verbose);

    match try_main(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            let mut source = err.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
