//! Cleaning configuration, named presets and the preset store.
//!
//! [`CleanConfig`] is an explicit value handed to the pipeline; nothing in
//! the library keeps global settings. It serializes to TOML or JSON:
//!
//! ```toml
//! gs_mode = true
//!
//! [radius_outlier]
//! enabled = true
//! nb_points = 16
//! radius = 0.02
//!
//! [largest_cluster]
//! enabled = true
//! eps = 1.5
//! min_points = 50
//! ```
//!
//! A [`Preset`] is the sparse, flat form saved under a name in a
//! [`PresetStore`]. Loading a preset only fills parameters the caller left
//! at their default; explicit values always win.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CleanError, CleanResult};

/// Voxel downsample parameters. Breaks the 1:1 mapping when it runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxelConfig {
    pub enabled: bool,
    pub voxel_size: f64,
}

impl Default for VoxelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            voxel_size: 0.0,
        }
    }
}

/// Radius outlier removal parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadiusOutlierConfig {
    pub enabled: bool,
    /// Minimum number of other points required within `radius`.
    pub nb_points: usize,
    pub radius: f64,
}

impl Default for RadiusOutlierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            nb_points: 16,
            radius: 0.02,
        }
    }
}

/// Statistical outlier removal parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticalOutlierConfig {
    pub enabled: bool,
    pub nb_neighbors: usize,
    pub std_ratio: f64,
}

impl Default for StatisticalOutlierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            nb_neighbors: 20,
            std_ratio: 1.5,
        }
    }
}

/// Largest density-cluster selection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LargestClusterConfig {
    pub enabled: bool,
    pub eps: f64,
    pub min_points: usize,
}

impl Default for LargestClusterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            eps: 1.5,
            min_points: 50,
        }
    }
}

/// Axis-aligned crop box, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    pub enabled: bool,
    pub min: [f64; 3],
    pub max: [f64; 3],
}

/// Full configuration of a cleaning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanConfig {
    /// Attribute-preserving mode. Forces voxel downsampling off.
    pub gs_mode: bool,
    pub voxel: VoxelConfig,
    pub radius_outlier: RadiusOutlierConfig,
    pub statistical_outlier: StatisticalOutlierConfig,
    pub largest_cluster: LargestClusterConfig,
    pub crop: CropConfig,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            gs_mode: true,
            voxel: VoxelConfig::default(),
            radius_outlier: RadiusOutlierConfig::default(),
            statistical_outlier: StatisticalOutlierConfig::default(),
            largest_cluster: LargestClusterConfig::default(),
            crop: CropConfig::default(),
        }
    }
}

impl CleanConfig {
    /// Whether any filter is switched on.
    pub fn any_enabled(&self) -> bool {
        self.voxel.enabled
            || self.radius_outlier.enabled
            || self.statistical_outlier.enabled
            || self.largest_cluster.enabled
            || self.crop.enabled
    }

    /// Parse a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> CleanResult<Self> {
        toml::from_str(toml_str).map_err(CleanError::config_parse)
    }

    /// Load a configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> CleanResult<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| CleanError::io_read(path, e))?;
        Self::from_toml(&contents)
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> CleanResult<String> {
        toml::to_string_pretty(self).map_err(CleanError::config_parse)
    }

    /// Save the configuration to a TOML file.
    pub fn save_toml(&self, path: impl AsRef<Path>) -> CleanResult<()> {
        let path = path.as_ref();
        let toml_str = self.to_toml()?;
        std::fs::write(path, toml_str).map_err(|e| CleanError::io_write(path, e))
    }

    /// Parse a configuration from a JSON string.
    pub fn from_json(json_str: &str) -> CleanResult<Self> {
        serde_json::from_str(json_str).map_err(CleanError::config_parse)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> CleanResult<String> {
        serde_json::to_string_pretty(self).map_err(CleanError::config_parse)
    }
}

/// A named parameter set as stored on disk. Absent keys are left out of the JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Preset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dbscan: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_points: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius_outlier: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius_nb: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat_outlier: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat_nb: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat_std: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_z: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_z: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voxel_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gs_mode: Option<bool>,
}

/// Overwrite `slot` with the preset value only if it still holds the default.
fn fill<T: PartialEq + Copy>(slot: &mut T, default: T, preset: Option<T>) {
    if let Some(value) = preset
        && *slot == default
    {
        *slot = value;
    }
}

impl Preset {
    /// Record the parameters of every enabled filter.
    pub fn from_config(config: &CleanConfig) -> Self {
        let defaults = CleanConfig::default();
        let mut preset = Preset::default();

        if config.largest_cluster.enabled {
            preset.dbscan = Some(true);
            preset.eps = Some(config.largest_cluster.eps);
            preset.min_points = Some(config.largest_cluster.min_points);
        }
        if config.radius_outlier.enabled {
            preset.radius_outlier = Some(true);
            preset.radius_nb = Some(config.radius_outlier.nb_points);
            preset.radius = Some(config.radius_outlier.radius);
        }
        if config.statistical_outlier.enabled {
            preset.stat_outlier = Some(true);
            preset.stat_nb = Some(config.statistical_outlier.nb_neighbors);
            preset.stat_std = Some(config.statistical_outlier.std_ratio);
        }
        if config.crop.enabled {
            let (min, max) = (config.crop.min, config.crop.max);
            preset.crop = Some(true);
            preset.min_x = Some(min[0]);
            preset.min_y = Some(min[1]);
            preset.min_z = Some(min[2]);
            preset.max_x = Some(max[0]);
            preset.max_y = Some(max[1]);
            preset.max_z = Some(max[2]);
        }
        if config.voxel.enabled {
            preset.voxel_size = Some(config.voxel.voxel_size);
        }
        if config.gs_mode != defaults.gs_mode {
            preset.gs_mode = Some(config.gs_mode);
        }
        preset
    }

    /// Return `config` with every field still at its default replaced by
    /// the preset's value, where the preset has one.
    pub fn fill_defaults(&self, config: &CleanConfig) -> CleanConfig {
        let d = CleanConfig::default();
        let mut out = config.clone();

        fill(&mut out.gs_mode, d.gs_mode, self.gs_mode);

        fill(&mut out.largest_cluster.enabled, d.largest_cluster.enabled, self.dbscan);
        fill(&mut out.largest_cluster.eps, d.largest_cluster.eps, self.eps);
        fill(
            &mut out.largest_cluster.min_points,
            d.largest_cluster.min_points,
            self.min_points,
        );

        fill(&mut out.radius_outlier.enabled, d.radius_outlier.enabled, self.radius_outlier);
        fill(&mut out.radius_outlier.nb_points, d.radius_outlier.nb_points, self.radius_nb);
        fill(&mut out.radius_outlier.radius, d.radius_outlier.radius, self.radius);

        fill(
            &mut out.statistical_outlier.enabled,
            d.statistical_outlier.enabled,
            self.stat_outlier,
        );
        fill(
            &mut out.statistical_outlier.nb_neighbors,
            d.statistical_outlier.nb_neighbors,
            self.stat_nb,
        );
        fill(
            &mut out.statistical_outlier.std_ratio,
            d.statistical_outlier.std_ratio,
            self.stat_std,
        );

        fill(&mut out.crop.enabled, d.crop.enabled, self.crop);
        let mins = [self.min_x, self.min_y, self.min_z];
        let maxs = [self.max_x, self.max_y, self.max_z];
        for axis in 0..3 {
            fill(&mut out.crop.min[axis], d.crop.min[axis], mins[axis]);
            fill(&mut out.crop.max[axis], d.crop.max[axis], maxs[axis]);
        }

        fill(&mut out.voxel.voxel_size, d.voxel.voxel_size, self.voxel_size);
        fill(
            &mut out.voxel.enabled,
            d.voxel.enabled,
            self.voxel_size.map(|size| size > 0.0),
        );

        out
    }

    /// The keys this preset sets, in their on-disk spelling.
    pub fn entries(&self) -> Vec<(String, serde_json::Value)> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => Vec::new(),
        }
    }
}

/// Named presets persisted as one pretty-printed JSON object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresetStore {
    presets: BTreeMap<String, Preset>,
}

impl PresetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store. A missing file yields an empty store.
    pub fn load(path: impl AsRef<Path>) -> CleanResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents =
            std::fs::read_to_string(path).map_err(|e| CleanError::preset_io(path, e))?;
        serde_json::from_str(&contents).map_err(|e| CleanError::preset_io(path, e))
    }

    /// Write the store as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> CleanResult<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|e| CleanError::preset_io(path, e))?;
        std::fs::write(path, json).map_err(|e| CleanError::preset_io(path, e))
    }

    /// Look up a preset by name.
    pub fn get(&self, name: &str) -> CleanResult<&Preset> {
        self.presets
            .get(name)
            .ok_or_else(|| CleanError::PresetNotFound {
                name: name.to_string(),
            })
    }

    /// Insert or replace a preset, returning the previous one.
    pub fn insert(&mut self, name: impl Into<String>, preset: Preset) -> Option<Preset> {
        self.presets.insert(name.into(), preset)
    }

    pub fn remove(&mut self, name: &str) -> Option<Preset> {
        self.presets.remove(name)
    }

    /// Preset names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Preset)> {
        self.presets.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}
