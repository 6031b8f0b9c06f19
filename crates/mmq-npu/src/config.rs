use mmq_core::{Error, Result};

/// Environment variable listing the NPU ordinals present (comma-separated).
pub const VISIBLE_DEVICES_ENV: &str = "MMQ_NPU_VISIBLE_DEVICES";
/// Environment variable overriding the vector-core count per device.
pub const VEC_CORES_ENV: &str = "MMQ_NPU_VEC_CORES";
/// Environment variable overriding device memory capacity, in MiB.
pub const MEMORY_MB_ENV: &str = "MMQ_NPU_MEMORY_MB";
/// Environment variable overriding the tile size, in elements.
pub const TILING_SIZE_ENV: &str = "MMQ_NPU_TILING_SIZE";

/// Vector cores per device when nothing overrides it.
pub const DEFAULT_VEC_CORES: usize = 48;
/// Device memory capacity when nothing overrides it.
pub const DEFAULT_MEMORY_MB: usize = 8192;
/// Maximum elements moved/computed in one step. Power of two so that tile
/// boundaries stay 32-byte aligned for every dtype.
pub const DEFAULT_TILING_SIZE: usize = 512;

/// Runtime configuration for NPU devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpuConfig {
    /// Ordinals that `init` will accept.
    pub visible_devices: Vec<usize>,
    /// Vector cores per device.
    pub vec_cores: usize,
    /// Device memory capacity in bytes.
    pub memory_bytes: usize,
    /// Maximum elements per tile.
    pub tiling_size: usize,
}

impl Default for NpuConfig {
    fn default() -> Self {
        NpuConfig {
            visible_devices: vec![0],
            vec_cores: DEFAULT_VEC_CORES,
            memory_bytes: DEFAULT_MEMORY_MB * 1024 * 1024,
            tiling_size: DEFAULT_TILING_SIZE,
        }
    }
}

impl NpuConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_visible_devices(mut self, devices: Vec<usize>) -> Self {
        self.visible_devices = devices;
        self
    }

    pub fn with_vec_cores(mut self, vec_cores: usize) -> Self {
        self.vec_cores = vec_cores;
        self
    }

    pub fn with_memory_mb(mut self, mb: usize) -> Self {
        self.memory_bytes = mb * 1024 * 1024;
        self
    }

    pub fn with_memory_bytes(mut self, bytes: usize) -> Self {
        self.memory_bytes = bytes;
        self
    }

    pub fn with_tiling_size(mut self, tiling_size: usize) -> Self {
        self.tiling_size = tiling_size;
        self
    }

    /// Whether `ordinal` names a device that is present.
    pub fn is_visible(&self, ordinal: usize) -> bool {
        self.visible_devices.contains(&ordinal)
    }

    /// Check invariants the kernels rely on.
    pub fn validate(&self) -> Result<()> {
        if self.vec_cores == 0 {
            return Err(Error::InvalidArgument(
                "vec_cores must be at least 1".to_string(),
            ));
        }
        if self.tiling_size == 0 || !self.tiling_size.is_power_of_two() {
            return Err(Error::InvalidArgument(format!(
                "tiling_size must be a power of two, got {}",
                self.tiling_size
            )));
        }
        if self.tiling_size < 16 {
            // one tile must hold at least one 32-byte aligned run of 16-bit elements
            return Err(Error::InvalidArgument(format!(
                "tiling_size must be at least 16, got {}",
                self.tiling_size
            )));
        }
        Ok(())
    }

    /// Build a configuration from `MMQ_NPU_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`NpuConfig::from_env`] with an injectable variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = NpuConfig::default();

        if let Some(raw) = lookup(VISIBLE_DEVICES_ENV) {
            config.visible_devices = parse_device_list(&raw)?;
        }
        if let Some(raw) = lookup(VEC_CORES_ENV) {
            config.vec_cores = parse_usize(VEC_CORES_ENV, &raw)?;
        }
        if let Some(raw) = lookup(MEMORY_MB_ENV) {
            config.memory_bytes = parse_usize(MEMORY_MB_ENV, &raw)? * 1024 * 1024;
        }
        if let Some(raw) = lookup(TILING_SIZE_ENV) {
            config.tiling_size = parse_usize(TILING_SIZE_ENV, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_usize(key: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| Error::InvalidArgument(format!("{key}: expected an integer, got {raw:?}")))
}

fn parse_device_list(raw: &str) -> Result<Vec<usize>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| parse_usize(VISIBLE_DEVICES_ENV, part))
        .collect()
}
