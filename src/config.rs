use std::path::Path;

use serde::{Serialize, Deserialize};

use crate::error::HalaRendererError;

/// The default maximum number of vertices output by one mesh shader group.
pub const MAX_VERTS: u32 = 128;
/// The default maximum number of primitives output by one mesh shader group.
pub const MAX_PRIMS: u32 = 128;
/// Limit the dispatch group count to 65536 for indexing simplicity.
pub const MAX_GROUP_DISPATCH_COUNT: u32 = 65536;
/// The largest unique vertex count addressable by a 10 bits packed index.
pub const MAX_PACKED_VERTS: u32 = 1024;

fn default_max_verts() -> u32 {
  MAX_VERTS
}

fn default_max_prims() -> u32 {
  MAX_PRIMS
}

fn default_max_dispatch_groups() -> u32 {
  MAX_GROUP_DISPATCH_COUNT
}

fn default_constant_buffer_alignment() -> u64 {
  256
}

fn default_stats_interval_frames() -> u32 {
  30
}

/// The per-group and per-dispatch capacity of the mesh shader pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalaMeshletCapacity {
  #[serde(default = "default_max_verts")]
  pub max_verts: u32,
  #[serde(default = "default_max_prims")]
  pub max_prims: u32,
  #[serde(default = "default_max_dispatch_groups")]
  pub max_dispatch_groups: u32,
}

impl Default for HalaMeshletCapacity {
  fn default() -> Self {
    Self {
      max_verts: MAX_VERTS,
      max_prims: MAX_PRIMS,
      max_dispatch_groups: MAX_GROUP_DISPATCH_COUNT,
    }
  }
}

/// The implementation of the capacity.
impl HalaMeshletCapacity {
  /// Check the capacity constants.
  /// return: The result.
  pub fn validate(&self) -> Result<(), HalaRendererError> {
    if self.max_verts == 0 || self.max_prims == 0 || self.max_dispatch_groups == 0 {
      return Err(HalaRendererError::config(&format!(
        "The capacity {:?} must not contain zero.", self
      )));
    }
    if self.max_verts > MAX_PACKED_VERTS {
      return Err(HalaRendererError::config(&format!(
        "The max vertex count {} exceeds the packed index range {}.", self.max_verts, MAX_PACKED_VERTS
      )));
    }
    Ok(())
  }
}

/// The meshlet renderer configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HalaMeshletRendererConfig {
  /// The asset file of each LOD, LOD 0 first.
  #[serde(default)]
  pub lod_paths: Vec<String>,
  #[serde(default)]
  pub capacity: HalaMeshletCapacity,
  /// The initial instance grid level.
  #[serde(default)]
  pub instance_level: u32,
  #[serde(default = "default_constant_buffer_alignment")]
  pub constant_buffer_alignment: u64,
  #[serde(default = "default_stats_interval_frames")]
  pub stats_interval_frames: u32,
}

impl Default for HalaMeshletRendererConfig {
  fn default() -> Self {
    Self {
      lod_paths: Vec::new(),
      capacity: HalaMeshletCapacity::default(),
      instance_level: 0,
      constant_buffer_alignment: default_constant_buffer_alignment(),
      stats_interval_frames: default_stats_interval_frames(),
    }
  }
}

/// The implementation of the meshlet renderer configuration.
impl HalaMeshletRendererConfig {
  /// Load the configuration from a JSON file.
  /// param path: The path of the JSON file.
  /// return: The configuration.
  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, HalaRendererError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
      .map_err(|err| HalaRendererError::new(
        crate::error::HalaRendererErrorKind::Io,
        &format!("Read config file \"{:?}\" failed.", path),
        Some(Box::new(err)),
      ))?;
    let config = Self::from_json(&content)?;
    log::debug!("Loaded meshlet renderer config \"{:?}\" with {} LODs.", path, config.lod_paths.len());
    Ok(config)
  }

  /// Parse the configuration from a JSON string.
  /// param json: The JSON string.
  /// return: The configuration.
  pub fn from_json(json: &str) -> Result<Self, HalaRendererError> {
    let config: Self = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
  }

  /// Check the configuration.
  /// return: The result.
  pub fn validate(&self) -> Result<(), HalaRendererError> {
    self.capacity.validate()?;
    if !self.constant_buffer_alignment.is_power_of_two() {
      return Err(HalaRendererError::config(&format!(
        "The constant buffer alignment {} is not a power of two.", self.constant_buffer_alignment
      )));
    }
    Ok(())
  }
}
