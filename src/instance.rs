use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};

use crate::device::align_up;
use crate::error::HalaRendererError;

/// The per-instance data read by the mesh shader.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct HalaInstanceData {
  pub world: Mat4,
  pub world_inverse_transpose: Mat4,
}

/// The implementation of the instance data.
impl HalaInstanceData {
  pub fn from_world(world: Mat4) -> Self {
    let normal_matrix = Mat3::from_mat4(world).inverse().transpose();
    Self {
      world,
      world_inverse_transpose: Mat4::from_mat3(normal_matrix),
    }
  }

  pub fn translation(&self) -> Vec3 {
    self.world.w_axis.truncate()
  }
}

/// The number of instances of the grid level, (2L + 1)^3.
pub fn instance_count_for_level(level: u32) -> u64 {
  let width = 2 * level as u64 + 1;
  width * width * width
}

/// Build the instance grid of the level.
/// The grid is a cube of (2L + 1)^3 instances spaced by the model diameter, centered on the origin.
/// x varies fastest, then y, then z.
/// param level: The grid level.
/// param radius: The bounding radius of the model.
/// return: The instances.
pub fn regenerate_instances(level: u32, radius: f32) -> Vec<HalaInstanceData> {
  let width = 2 * level as usize + 1;
  let spacing = 2.0 * radius;
  let extents = spacing * level as f32;
  let count = width * width * width;

  (0..count).map(|i| {
    let x = (i % width) as f32;
    let y = ((i / width) % width) as f32;
    let z = (i / (width * width)) as f32;
    let position = Vec3::new(x, y, z) * spacing - Vec3::splat(extents);
    HalaInstanceData::from_world(Mat4::from_translation(position))
  }).collect()
}

/// The instance grid and its pending upload.
#[derive(Debug, Clone)]
pub struct HalaInstancePlacer {
  level: u32,
  radius: f32,
  instances: Vec<HalaInstanceData>,
  copy_pending: bool,
}

/// The implementation of the instance placer.
impl HalaInstancePlacer {
  /// The largest grid level whose instance count fits an u32.
  pub const MAX_LEVEL: u32 = 812;

  /// Create the placer with a freshly built grid.
  /// param level: The grid level.
  /// param radius: The bounding radius of the model.
  /// return: The placer.
  pub fn new(level: u32, radius: f32) -> Result<Self, HalaRendererError> {
    Self::check_level(level)?;
    Ok(Self {
      level,
      radius,
      instances: regenerate_instances(level, radius),
      copy_pending: true,
    })
  }

  fn check_level(level: u32) -> Result<(), HalaRendererError> {
    if level > Self::MAX_LEVEL {
      return Err(HalaRendererError::config(&format!(
        "The instance level {} exceeds the maximum {}.", level, Self::MAX_LEVEL
      )));
    }
    Ok(())
  }

  /// Rebuild the grid and mark it for upload.
  /// param level: The grid level.
  /// param radius: The bounding radius of the model.
  /// return: The instances.
  pub fn regenerate(&mut self, level: u32, radius: f32) -> Result<&[HalaInstanceData], HalaRendererError> {
    Self::check_level(level)?;
    self.level = level;
    self.radius = radius;
    self.instances = regenerate_instances(level, radius);
    self.copy_pending = true;
    log::debug!("Regenerated {} instances at level {}.", self.instances.len(), level);
    Ok(&self.instances)
  }

  /// Change the grid level, rebuilding only on change.
  /// return: Whether the grid was rebuilt.
  pub fn set_level(&mut self, level: u32) -> Result<bool, HalaRendererError> {
    if level == self.level {
      return Ok(false);
    }
    self.regenerate(level, self.radius)?;
    Ok(true)
  }

  /// Change the spacing radius, rebuilding only on change.
  /// return: Whether the grid was rebuilt.
  pub fn set_radius(&mut self, radius: f32) -> Result<bool, HalaRendererError> {
    if radius == self.radius {
      return Ok(false);
    }
    self.regenerate(self.level, radius)?;
    Ok(true)
  }

  pub fn increase_level(&mut self) -> Result<bool, HalaRendererError> {
    self.set_level(self.level + 1)
  }

  pub fn decrease_level(&mut self) -> Result<bool, HalaRendererError> {
    self.set_level(self.level.saturating_sub(1))
  }

  pub fn level(&self) -> u32 {
    self.level
  }

  pub fn radius(&self) -> f32 {
    self.radius
  }

  pub fn instances(&self) -> &[HalaInstanceData] {
    &self.instances
  }

  pub fn instance_count(&self) -> u32 {
    self.instances.len() as u32
  }

  pub fn as_bytes(&self) -> &[u8] {
    bytemuck::cast_slice(&self.instances)
  }

  /// The buffer size holding every instance, rounded to the alignment.
  pub fn aligned_size(&self, alignment: u64) -> u64 {
    align_up(self.as_bytes().len() as u64, alignment)
  }

  /// Whether the instances changed since the last recorded copy.
  pub fn is_copy_pending(&self) -> bool {
    self.copy_pending
  }

  /// Clear the pending flag once the copy is recorded ahead of any dispatch.
  pub fn acknowledge_copy_enqueued(&mut self) {
    self.copy_pending = false;
  }
}
