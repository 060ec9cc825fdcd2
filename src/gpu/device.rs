// gpu/device.rs — wgpu device bring-up.
//
// Responsibilities:
//   - Enumerate adapters on the primary backends and pick the best real GPU.
//   - Request a device whose limits are large enough for full-size quilts.
//   - Provide `WorkgroupSize`, baked into the kernel source at compile time
//     and used to size the dispatch grid.
//
// ADAPTER SELECTION:
// `request_adapter` with power-preference heuristics can hand back a
// software rasterizer (llvmpipe, WARP) even when a real GPU is present. We
// enumerate explicitly and prefer anything that is not DeviceType::Cpu,
// falling back to a software adapter only when nothing else exists.
//
// DEVICE LIMITS:
// Quilts are large: a 9×5 grid of 1536×2048 views is already past wgpu's
// default 8192 texture limit in one direction. The `Native` profile asks for
// the adapter's own limits. `Portable` asks for wgpu's defaults, so a
// conversion that would not run on a baseline device fails here first.

use std::fmt;

/// Which device limits to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceProfile {
    /// The adapter's actual hardware limits.
    Native,
    /// wgpu's default (baseline) limits, regardless of hardware.
    Portable,
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceProfile::Native => write!(f, "Native"),
            DeviceProfile::Portable => write!(f, "Portable (baseline limits)"),
        }
    }
}

/// A workgroup size configuration for 2D compute dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
}

impl WorkgroupSize {
    /// Total invocations per workgroup (x * y).
    pub fn total(&self) -> u32 {
        self.x * self.y
    }

    /// Default workgroup size for the given profile.
    ///
    /// - `Native`: 16×8 = 128 invocations, four 32-wide warps or two
    ///   64-wide wavefronts. The 16-wide x dimension walks along image rows.
    /// - `Portable`: 8×8 = 64, inside every conformant device's limit.
    fn for_profile(profile: DeviceProfile) -> Self {
        match profile {
            DeviceProfile::Native => WorkgroupSize { x: 16, y: 8 },
            DeviceProfile::Portable => WorkgroupSize { x: 8, y: 8 },
        }
    }
}

impl fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{} ({} invocations)", self.x, self.y, self.total())
    }
}

/// Cached adapter information for logging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// The GPU context: device, queue and the limits it was created with.
///
/// This is the explicit device context handed to every pipeline stage; the
/// pipeline holds no other device state.
///
/// # Field drop order
/// Rust drops fields top to bottom. `_instance` is declared last so the
/// `wgpu::Instance` outlives `device` and `queue`; some Vulkan layers crash
/// when the instance goes first.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub profile: DeviceProfile,
    pub adapter_info: AdapterInfo,
    pub workgroup_size: WorkgroupSize,
    /// Largest texture side the device accepts.
    pub max_texture_dimension: u32,
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Create a `GpuDevice` on the best available adapter with
    /// `DeviceProfile::Native` limits.
    ///
    /// # Errors
    /// Returns `Err` if no adapter is found or the device request fails.
    pub fn new() -> Result<Self, GpuError> {
        Self::new_with_profile(DeviceProfile::Native)
    }

    pub fn new_with_profile(profile: DeviceProfile) -> Result<Self, GpuError> {
        pollster::block_on(Self::init_async(profile))
    }

    async fn init_async(profile: DeviceProfile) -> Result<Self, GpuError> {
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
        } else {
            wgpu::InstanceFlags::empty()
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags,
            ..Default::default()
        });

        let all_adapters = instance.enumerate_adapters(wgpu::Backends::PRIMARY);
        if all_adapters.is_empty() {
            return Err(GpuError::NoSuitableAdapter);
        }
        for a in &all_adapters {
            let info = a.get_info();
            log::debug!("adapter: {} ({:?}, {:?})", info.name, info.backend, info.device_type);
        }

        // Tier 1: discrete, then anything that is not a software rasterizer.
        // Tier 2: whatever is left.
        let rank = |a: &wgpu::Adapter| match a.get_info().device_type {
            wgpu::DeviceType::DiscreteGpu => 0,
            wgpu::DeviceType::IntegratedGpu => 1,
            wgpu::DeviceType::VirtualGpu | wgpu::DeviceType::Other => 2,
            wgpu::DeviceType::Cpu => 3,
        };
        let adapter = all_adapters
            .into_iter()
            .min_by_key(rank)
            .ok_or(GpuError::NoSuitableAdapter)?;

        let raw_info = adapter.get_info();
        if raw_info.device_type == wgpu::DeviceType::Cpu {
            log::warn!("only a software adapter is available: {}", raw_info.name);
        }
        let adapter_info = AdapterInfo {
            name: raw_info.name.clone(),
            device_type: raw_info.device_type,
            backend: raw_info.backend,
        };

        let limits = limits_for_profile(profile, adapter.limits());
        let max_texture_dimension = limits.max_texture_dimension_2d;

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("quilt-native"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits,
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(GpuError::DeviceRequest)?;

        Ok(GpuDevice {
            device,
            queue,
            profile,
            adapter_info,
            workgroup_size: WorkgroupSize::for_profile(profile),
            max_texture_dimension,
            _instance: instance,
        })
    }

    /// Override the default workgroup size.
    ///
    /// Returns `Err` if x * y exceeds the device's invocation limit.
    pub fn set_workgroup_size(&mut self, x: u32, y: u32) -> Result<(), GpuError> {
        let total = x.saturating_mul(y);
        let max = self.device.limits().max_compute_invocations_per_workgroup;
        if total == 0 || total > max {
            return Err(GpuError::WorkgroupTooLarge { total, max });
        }
        self.workgroup_size = WorkgroupSize { x, y };
        Ok(())
    }

    /// Number of workgroups needed to cover a `width`×`height` domain.
    ///
    /// Ceiling division: the last workgroup in each direction may hang past
    /// the edge, so kernels must guard against out-of-bounds global IDs:
    /// ```wgsl
    /// if gid.x >= width || gid.y >= height { return; }
    /// ```
    pub fn dispatch_size(&self, width: u32, height: u32) -> (u32, u32) {
        dispatch_size(self.workgroup_size, width, height)
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpuDevice {{ adapter: {}, profile: {}, workgroup: {}, max texture: {} }}",
            self.adapter_info, self.profile, self.workgroup_size, self.max_texture_dimension
        )
    }
}

pub(crate) fn dispatch_size(wg: WorkgroupSize, width: u32, height: u32) -> (u32, u32) {
    (width.div_ceil(wg.x), height.div_ceil(wg.y))
}

// ============================================================
// Limits helpers
// ============================================================

fn limits_for_profile(profile: DeviceProfile, adapter: wgpu::Limits) -> wgpu::Limits {
    match profile {
        DeviceProfile::Native => adapter,
        DeviceProfile::Portable => wgpu::Limits::default(),
    }
}

// ============================================================
// Error type
// ============================================================

/// Errors from GPU device initialization and configuration.
#[derive(Debug)]
pub enum GpuError {
    /// No adapter was found on any primary backend.
    NoSuitableAdapter,
    /// The device request failed (driver issue, unsupported limits, etc.).
    DeviceRequest(wgpu::RequestDeviceError),
    /// Requested workgroup size is zero or exceeds the invocation limit.
    WorkgroupTooLarge { total: u32, max: u32 },
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoSuitableAdapter => write!(
                f,
                "no GPU adapter found (checked Vulkan, Metal, DX12 and WebGPU backends)"
            ),
            GpuError::DeviceRequest(e) => write!(f, "device request failed: {e}"),
            GpuError::WorkgroupTooLarge { total, max } => write!(
                f,
                "workgroup size {total} outside the device range of 1..={max} invocations"
            ),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::DeviceRequest(e) => Some(e),
            _ => None,
        }
    }
}

// ============================================================
// Tests
// ============================================================
