use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct InteractionConfig {
    /// Pick hit radius as a fraction of the smaller viewport dimension.
    #[serde(default = "InteractionConfig::default_pick_tolerance_fraction")]
    pub pick_tolerance_fraction: f32,
    /// Samples per segment when a curve draft is committed.
    #[serde(default = "InteractionConfig::default_curve_resolution")]
    pub curve_resolution: usize,
}

impl InteractionConfig {
    const fn default_pick_tolerance_fraction() -> f32 {
        0.01
    }

    const fn default_curve_resolution() -> usize {
        24
    }
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            pick_tolerance_fraction: Self::default_pick_tolerance_fraction(),
            curve_resolution: Self::default_curve_resolution(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewConfig {
    #[serde(default = "ViewConfig::default_fov_degrees")]
    pub fov_degrees: f32,
    #[serde(default = "ViewConfig::default_point_size")]
    pub point_size: f32,
}

impl ViewConfig {
    const fn default_fov_degrees() -> f32 {
        30.0
    }

    const fn default_point_size() -> f32 {
        8.0
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            fov_degrees: Self::default_fov_degrees(),
            point_size: Self::default_point_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolConfig {
    #[serde(default)]
    pub interaction: InteractionConfig,
    #[serde(default)]
    pub view: ViewConfig,
}

impl ToolConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                eprintln!("Config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }
}
