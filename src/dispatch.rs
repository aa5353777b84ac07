use crate::config::HalaMeshletCapacity;
use crate::error::HalaRendererError;
use crate::scene::cpu::HalaMeshletAsset;
use crate::scene::{HalaMeshlet, HalaSubset};

/// One mesh shader dispatch over a range of instances and a range of meshlets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HalaDispatchDescriptor {
  pub instance_offset: u32,
  pub instance_count: u32,
  pub meshlet_offset: u32,
  pub meshlet_count: u32,
  pub group_count: u32,
}

/// The implementation of the dispatch descriptor.
impl HalaDispatchDescriptor {
  /// The draw constants, instance count first.
  pub fn draw_constants(&self) -> [u32; 2] {
    [self.instance_count, self.instance_offset]
  }

  /// The meshlet range constants, meshlet count first.
  pub fn meshlet_constants(&self) -> [u32; 2] {
    [self.meshlet_count, self.meshlet_offset]
  }
}

/// The groups needed by one instance of a subset as the exact fraction
/// ((count - 1) * pack_count + 1) / pack_count.
/// Every meshlet but the last takes a whole group, the last one shares a group with
/// up to pack_count - 1 copies of itself from neighboring instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalaGroupsPerInstance {
  numerator: u64,
  pack_count: u64,
}

/// The implementation of the groups per instance.
impl HalaGroupsPerInstance {
  /// param meshlet_count: The meshlet count of the subset, at least 1.
  /// param pack_count: The pack count of the trailing meshlet, at least 1.
  pub fn new(meshlet_count: u32, pack_count: u32) -> Self {
    let pack_count = pack_count.max(1) as u64;
    Self {
      numerator: (meshlet_count.max(1) as u64 - 1) * pack_count + 1,
      pack_count,
    }
  }

  pub fn as_f32(&self) -> f32 {
    (self.numerator as f64 / self.pack_count as f64) as f32
  }

  /// The most instances whose groups fit the limit, floor(max_groups / groups_per_instance).
  pub fn max_instances(&self, max_groups: u32) -> u64 {
    max_groups as u64 * self.pack_count / self.numerator
  }

  /// The groups for the instances, ceil(groups_per_instance * instance_count).
  pub fn group_count(&self, instance_count: u32) -> u64 {
    (instance_count as u64 * self.numerator).div_ceil(self.pack_count)
  }
}

/// Split the instances of every subset into dispatches below the group limit.
#[derive(Debug, Clone, Copy)]
pub struct HalaDispatchBatcher {
  capacity: HalaMeshletCapacity,
}

/// The implementation of the dispatch batcher.
impl HalaDispatchBatcher {
  pub fn new(capacity: HalaMeshletCapacity) -> Self {
    Self { capacity }
  }

  pub fn capacity(&self) -> &HalaMeshletCapacity {
    &self.capacity
  }

  /// Compute the pack count of the trailing meshlet.
  /// param trailing: The last meshlet of the subset.
  /// return: The pack count, at least 1.
  pub fn pack_count(&self, trailing: &HalaMeshlet) -> Result<u32, HalaRendererError> {
    let pack_count = trailing.pack_count(self.capacity.max_verts, self.capacity.max_prims);
    if pack_count == 0 {
      return Err(HalaRendererError::capacity_violation(&format!(
        "The trailing meshlet {:?} does not fit a group of {} vertices and {} primitives.",
        trailing, self.capacity.max_verts, self.capacity.max_prims
      )));
    }
    Ok(pack_count)
  }

  /// Compute the groups one instance of the subset needs.
  /// param subset: The subset, not empty.
  /// param trailing: The last meshlet of the subset.
  /// return: The groups per instance.
  pub fn groups_per_instance(
    &self,
    subset: &HalaSubset,
    trailing: &HalaMeshlet,
  ) -> Result<HalaGroupsPerInstance, HalaRendererError> {
    let pack_count = self.pack_count(trailing)?;
    Ok(HalaGroupsPerInstance::new(subset.count, pack_count))
  }

  /// Compute the most instances one dispatch of the subset may cover.
  /// param subset: The subset, not empty.
  /// param trailing: The last meshlet of the subset.
  /// return: The instance limit, at least 1.
  pub fn max_instances_per_dispatch(
    &self,
    subset: &HalaSubset,
    trailing: &HalaMeshlet,
  ) -> Result<u32, HalaRendererError> {
    let groups_per_instance = self.groups_per_instance(subset, trailing)?;
    let max_instances = groups_per_instance.max_instances(self.capacity.max_dispatch_groups);
    if max_instances == 0 {
      return Err(HalaRendererError::dispatch_overflow(&format!(
        "One instance of the subset [{}, {}) needs {} groups, one dispatch allows {}.",
        subset.offset, subset.end(), groups_per_instance.as_f32(), self.capacity.max_dispatch_groups
      )));
    }
    Ok(max_instances.min(u32::MAX as u64) as u32)
  }

  /// Split the instances into dispatches of the subset.
  /// The dispatches cover [0, instance_count) in order without overlap and none exceeds the group limit.
  /// param subset: The subset.
  /// param trailing: The last meshlet of the subset.
  /// param instance_count: The instance count.
  /// return: The dispatches, empty for an empty subset or no instance.
  pub fn compute_dispatches(
    &self,
    subset: &HalaSubset,
    trailing: &HalaMeshlet,
    instance_count: u32,
  ) -> Result<Vec<HalaDispatchDescriptor>, HalaRendererError> {
    if subset.count == 0 || instance_count == 0 {
      return Ok(Vec::new());
    }

    let groups_per_instance = self.groups_per_instance(subset, trailing)?;
    let max_instances = self.max_instances_per_dispatch(subset, trailing)?;
    let dispatch_count = instance_count.div_ceil(max_instances);

    let mut dispatches = Vec::with_capacity(dispatch_count as usize);
    for i in 0..dispatch_count {
      let instance_offset = max_instances * i;
      let count = std::cmp::min(instance_count - instance_offset, max_instances);
      // Never above the limit since count <= floor(limit / groups_per_instance).
      let group_count = groups_per_instance.group_count(count) as u32;
      dispatches.push(HalaDispatchDescriptor {
        instance_offset,
        instance_count: count,
        meshlet_offset: subset.offset,
        meshlet_count: subset.count,
        group_count,
      });
    }
    Ok(dispatches)
  }

  /// Split the instances into dispatches of one subset of the asset.
  /// param asset: The asset.
  /// param subset_index: The subset index.
  /// param instance_count: The instance count.
  /// return: The dispatches.
  pub fn compute_subset_dispatches(
    &self,
    asset: &HalaMeshletAsset,
    subset_index: usize,
    instance_count: u32,
  ) -> Result<Vec<HalaDispatchDescriptor>, HalaRendererError> {
    let subset = asset.subsets().get(subset_index).ok_or_else(|| HalaRendererError::asset_corrupt(&format!(
      "The asset \"{}\" has no subset {}.", asset.name(), subset_index
    )))?;
    match asset.trailing_meshlet(subset_index) {
      Some(trailing) => self.compute_dispatches(subset, trailing, instance_count),
      None => Ok(Vec::new()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::HalaRendererErrorKind;

  fn batcher() -> HalaDispatchBatcher {
    HalaDispatchBatcher::new(HalaMeshletCapacity::default())
  }

  // Five meshlets, the last one packs twice into a group.
  fn five_meshlets() -> (HalaSubset, HalaMeshlet) {
    (HalaSubset::new(0, 5), HalaMeshlet::new(64, 0, 32, 0))
  }

  #[test]
  fn groups_per_instance_is_fractional() {
    let (subset, trailing) = five_meshlets();
    let gpi = batcher().groups_per_instance(&subset, &trailing).unwrap();
    assert_eq!(gpi.as_f32(), 4.5);
    assert_eq!(batcher().max_instances_per_dispatch(&subset, &trailing).unwrap(), 14563);
  }

  #[test]
  fn single_dispatch_below_the_limit() {
    let (subset, trailing) = five_meshlets();
    let dispatches = batcher().compute_dispatches(&subset, &trailing, 1000).unwrap();
    assert_eq!(dispatches, vec![HalaDispatchDescriptor {
      instance_offset: 0,
      instance_count: 1000,
      meshlet_offset: 0,
      meshlet_count: 5,
      group_count: 4500,
    }]);
  }

  #[test]
  fn splits_above_the_limit() {
    let (subset, trailing) = five_meshlets();
    let dispatches = batcher().compute_dispatches(&subset, &trailing, 20000).unwrap();
    assert_eq!(dispatches.len(), 2);
    assert_eq!((dispatches[0].instance_offset, dispatches[0].instance_count), (0, 14563));
    assert_eq!((dispatches[1].instance_offset, dispatches[1].instance_count), (14563, 5437));
    assert_eq!(dispatches[0].group_count, 65534);
    assert_eq!(dispatches[1].group_count, 24467);
  }

  #[test]
  fn dispatches_partition_the_instances() {
    let capacity = HalaMeshletCapacity { max_dispatch_groups: 1000, ..Default::default() };
    let batcher = HalaDispatchBatcher::new(capacity);
    for (count, vert_count, prim_count) in [(1u32, 3u32, 1u32), (7, 128, 128), (3, 40, 17), (12, 1, 1)] {
      let subset = HalaSubset::new(4, count);
      let trailing = HalaMeshlet::new(vert_count, 0, prim_count, 0);
      for instance_count in [1u32, 2, 99, 1000, 4321] {
        let dispatches = batcher.compute_dispatches(&subset, &trailing, instance_count).unwrap();
        let mut next = 0;
        for dispatch in dispatches.iter() {
          assert_eq!(dispatch.instance_offset, next);
          assert!(dispatch.instance_count > 0);
          assert!(dispatch.group_count <= 1000);
          assert_eq!(dispatch.meshlet_offset, 4);
          next += dispatch.instance_count;
        }
        assert_eq!(next, instance_count);
      }
    }
  }

  #[test]
  fn empty_inputs_dispatch_nothing() {
    let (subset, trailing) = five_meshlets();
    assert!(batcher().compute_dispatches(&subset, &trailing, 0).unwrap().is_empty());
    assert!(batcher().compute_dispatches(&HalaSubset::new(3, 0), &trailing, 10).unwrap().is_empty());
  }

  #[test]
  fn oversized_trailing_meshlet_is_a_capacity_violation() {
    let err = batcher().compute_dispatches(&HalaSubset::new(0, 1), &HalaMeshlet::new(200, 0, 10, 0), 1).unwrap_err();
    assert_eq!(err.kind(), HalaRendererErrorKind::CapacityViolation);
  }

  #[test]
  fn subset_wider_than_a_dispatch_overflows() {
    let capacity = HalaMeshletCapacity { max_dispatch_groups: 8, ..Default::default() };
    let err = HalaDispatchBatcher::new(capacity)
      .compute_dispatches(&HalaSubset::new(0, 10), &HalaMeshlet::new(128, 0, 128, 0), 1)
      .unwrap_err();
    assert_eq!(err.kind(), HalaRendererErrorKind::DispatchOverflow);
  }

  #[test]
  fn packing_only_considers_the_trailing_meshlet() {
    // Earlier meshlets are full, the small trailing one packs 32 times.
    // Every earlier meshlet still takes one group per instance.
    let subset = HalaSubset::new(0, 3);
    let trailing = HalaMeshlet::new(4, 0, 2, 0);
    let dispatches = batcher().compute_dispatches(&subset, &trailing, 64).unwrap();
    assert_eq!(dispatches.len(), 1);
    assert_eq!(dispatches[0].group_count, 2 * 64 + 2);
  }
}
