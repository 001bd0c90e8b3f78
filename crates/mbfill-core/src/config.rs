//! Fill configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{FillError, Result};

/// Default ceiling on work items per dispatch (2^30).
pub const DEFAULT_MAX_WORK_PER_DISPATCH: u64 = 1 << 30;

/// Default threads per block for device kernels.
pub const DEFAULT_BLOCK_SIZE: u32 = 256;

/// Default number of indices a host worker claims at a time.
pub const DEFAULT_HOST_MIN_PAR_LEN: usize = 4096;

const ENV_MAX_WORK: &str = "MBFILL_MAX_WORK_PER_DISPATCH";
const ENV_BLOCK_SIZE: &str = "MBFILL_BLOCK_SIZE";
const ENV_HOST_MIN_PAR_LEN: &str = "MBFILL_HOST_MIN_PAR_LEN";

/// Tuning knobs for [`multibuffer_fill`](crate::multibuffer_fill).
///
/// The dispatch ceiling is a property of the target device, not of a single
/// call: build one config per backend and reuse it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillConfig {
    /// Largest number of work items a single dispatch may cover. Clamped
    /// further by the backend's own addressable capacity.
    pub max_work_per_dispatch: u64,

    /// Threads per block for device kernels. Power of two, at most 1024.
    pub block_size: u32,

    /// Minimum indices per rayon task on the host backend.
    pub host_min_par_len: usize,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            max_work_per_dispatch: DEFAULT_MAX_WORK_PER_DISPATCH,
            block_size: DEFAULT_BLOCK_SIZE,
            host_min_par_len: DEFAULT_HOST_MIN_PAR_LEN,
        }
    }
}

impl FillConfig {
    /// Default config with a custom dispatch ceiling.
    pub fn with_max_work_per_dispatch(max_work_per_dispatch: u64) -> Self {
        Self { max_work_per_dispatch, ..Self::default() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_work_per_dispatch == 0 {
            return Err(FillError::InvalidConfig(
                "max_work_per_dispatch must be positive".into(),
            ));
        }
        if !self.block_size.is_power_of_two() || self.block_size > 1024 {
            return Err(FillError::InvalidConfig(format!(
                "block_size must be a power of two no larger than 1024, got {}",
                self.block_size
            )));
        }
        if self.host_min_par_len == 0 {
            return Err(FillError::InvalidConfig(
                "host_min_par_len must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| FillError::InvalidConfig(format!("parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            FillError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Apply `MBFILL_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = lookup(ENV_MAX_WORK) {
            self.max_work_per_dispatch = parse_var(ENV_MAX_WORK, &v)?;
        }
        if let Some(v) = lookup(ENV_BLOCK_SIZE) {
            self.block_size = parse_var(ENV_BLOCK_SIZE, &v)?;
        }
        if let Some(v) = lookup(ENV_HOST_MIN_PAR_LEN) {
            self.host_min_par_len = parse_var(ENV_HOST_MIN_PAR_LEN, &v)?;
        }
        self.validate()?;
        Ok(self)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| FillError::InvalidConfig(format!("{key}={value:?}: {e}")))
}
