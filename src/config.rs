//! Playground configuration.
//!
//! A single optional `config.toml` in the config directory is layered over the
//! stock defaults, deserialized with unknown keys rejected, and validated.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [assets]
//! default_image = ""            # Image shown after init; empty = bundled asset
//!
//! [filters]
//! blur_radius = 5.0             # Gaussian blur radius in pixels (0 < r <= 50)
//! use_double_threshold = false  # Binary threshold: Otsu with a second level
//!
//! [module]
//! memory_limit_mb = 256         # Linear memory cap of the image module (1-4096)
//!
//! [processing]
//! max_threads = 4               # Filter kernel threads (omit for auto = CPU cores)
//! ```
//!
//! Config files are sparse: override just the values you want.

use crate::controller::DefaultImage;
use crate::relay::FilterParams;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Playground configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlaygroundConfig {
    pub assets: AssetsConfig,
    pub filters: FiltersConfig,
    pub module: ModuleConfig,
    pub processing: ProcessingConfig,
}

impl PlaygroundConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let radius = self.filters.blur_radius;
        if !(radius > 0.0 && radius <= MAX_BLUR_RADIUS) {
            return Err(ConfigError::Validation(format!(
                "filters.blur_radius must be in (0, {MAX_BLUR_RADIUS}]"
            )));
        }
        if !(1..=MAX_MEMORY_LIMIT_MB).contains(&self.module.memory_limit_mb) {
            return Err(ConfigError::Validation(format!(
                "module.memory_limit_mb must be 1-{MAX_MEMORY_LIMIT_MB}"
            )));
        }
        if self.processing.max_threads == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_threads must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn filter_params(&self) -> FilterParams {
        FilterParams {
            blur_radius: self.filters.blur_radius,
            use_double_threshold: self.filters.use_double_threshold,
        }
    }

    pub fn memory_limit_bytes(&self) -> usize {
        self.module.memory_limit_mb as usize * 1024 * 1024
    }

    /// Resolve the default image source. Relative paths are taken from
    /// `config_dir`.
    pub fn default_image(&self, config_dir: &Path) -> DefaultImage {
        let path = self.assets.default_image.trim();
        if path.is_empty() {
            DefaultImage::Bundled
        } else {
            DefaultImage::Path(config_dir.join(PathBuf::from(path)))
        }
    }
}

const MAX_BLUR_RADIUS: f64 = 50.0;
const MAX_MEMORY_LIMIT_MB: u32 = 4096;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetsConfig {
    /// Path of the image loaded after init. Empty selects the bundled asset.
    pub default_image: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FiltersConfig {
    pub blur_radius: f64,
    pub use_double_threshold: bool,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        let params = FilterParams::default();
        Self {
            blur_radius: params.blur_radius,
            use_double_threshold: params.use_double_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModuleConfig {
    pub memory_limit_mb: u32,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            memory_limit_mb: 256,
        }
    }
}

/// Parallel filter settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Threads used by the filter kernels. When absent, defaults to the
    /// number of CPU cores. Larger values are clamped down.
    pub max_threads: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_threads.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(PlaygroundConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no `config.toml` exists in the directory.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<PlaygroundConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: PlaygroundConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in the given directory.
pub fn load_config(dir: &Path) -> Result<PlaygroundConfig, ConfigError> {
    resolve_config(stock_defaults_value(), load_raw_config(dir)?)
}

/// Returns a fully-commented stock `config.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Filter Playground Configuration
# ===============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Assets
# ---------------------------------------------------------------------------
[assets]
# Image loaded automatically once the image module is ready.
# Relative paths are resolved against this file's directory.
# Leave empty to use the image bundled into the binary.
default_image = ""

# ---------------------------------------------------------------------------
# Filters
# ---------------------------------------------------------------------------
[filters]
# Gaussian blur radius in pixels. Sigma is radius / 3.
# Must be greater than 0 and at most 50.
blur_radius = 5.0

# Binary threshold: split at two Otsu levels instead of one.
use_double_threshold = false

# ---------------------------------------------------------------------------
# Image module
# ---------------------------------------------------------------------------
[module]
# Upper bound of the module's linear memory, in MiB (1-4096).
# Requests that need more fail with an out-of-memory message.
memory_limit_mb = 256

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Threads used by the filter kernels.
# Omit to use all CPU cores. Values above the core count are clamped.
# max_threads = 4
"##
}
