//! Host-side runtime settings.
//!
//! The NPU runtime itself is configured through [`mmq_npu::NpuConfig`]; this
//! covers which device mmq targets and optional overrides of the default
//! comparison tolerances.

use mmq_core::{DType, Device, Error, Result, Tolerance};
use mmq_npu::NpuDevice;

/// NPU ordinal to target.
pub const DEVICE_ENV: &str = "MMQ_DEVICE";
/// Overrides the default relative tolerance for every dtype.
pub const RTOL_ENV: &str = "MMQ_RTOL";
/// Overrides the default absolute tolerance for every dtype.
pub const ATOL_ENV: &str = "MMQ_ATOL";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuntimeConfig {
    pub device_ordinal: usize,
    pub rtol: Option<f64>,
    pub atol: Option<f64>,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device_ordinal(mut self, ordinal: usize) -> Self {
        self.device_ordinal = ordinal;
        self
    }

    pub fn with_tolerance(mut self, rtol: f64, atol: f64) -> Self {
        self.rtol = Some(rtol);
        self.atol = Some(atol);
        self
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = RuntimeConfig::new();
        if let Some(raw) = lookup(DEVICE_ENV) {
            config.device_ordinal = raw.trim().parse().map_err(|_| {
                Error::InvalidArgument(format!("{DEVICE_ENV}: expected an ordinal, got {raw:?}"))
            })?;
        }
        config.rtol = lookup(RTOL_ENV).map(|raw| parse_tol(RTOL_ENV, &raw)).transpose()?;
        config.atol = lookup(ATOL_ENV).map(|raw| parse_tol(ATOL_ENV, &raw)).transpose()?;
        Ok(config)
    }

    /// The targeted NPU.
    pub fn device(&self) -> Device {
        Device::Npu(self.device_ordinal)
    }

    /// Comparison tolerance for results computed in `dtype`, with overrides applied.
    pub fn tolerance(&self, dtype: DType) -> Tolerance {
        let base = Tolerance::for_dtype(dtype);
        Tolerance::new(self.rtol.unwrap_or(base.rtol), self.atol.unwrap_or(base.atol))
    }

    /// Install logging and initialize the targeted NPU from the environment.
    pub fn init(&self) -> Result<NpuDevice> {
        crate::logging::init_logging_default();
        mmq_npu::init(self.device_ordinal)
    }
}

fn parse_tol(key: &str, raw: &str) -> Result<f64> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(Error::InvalidArgument(format!(
            "{key}: expected a non-negative number, got {raw:?}"
        ))),
    }
}
