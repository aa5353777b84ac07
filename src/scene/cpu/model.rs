use crate::error::HalaRendererError;
use crate::scene::HalaBoundingSphere;
use super::mesh::HalaMeshletAsset;

/// The LODs of one model, LOD 0 first.
/// A slot without an asset is None.
#[derive(Debug, Clone, Default)]
pub struct HalaModelLods {
  slots: Vec<Option<HalaMeshletAsset>>,
}

/// The implementation of the model LODs.
impl HalaModelLods {
  pub fn new() -> Self {
    Self { slots: Vec::new() }
  }

  /// Put an asset into the LOD slot, growing the slots when needed.
  /// param lod: The LOD index.
  /// param asset: The asset.
  /// return: The asset previously in the slot.
  pub fn insert(&mut self, lod: usize, asset: HalaMeshletAsset) -> Option<HalaMeshletAsset> {
    if lod >= self.slots.len() {
      self.slots.resize_with(lod + 1, || None);
    }
    self.slots[lod].replace(asset)
  }

  /// Make sure there are at least `count` slots.
  /// param count: The slot count.
  pub fn reserve_slots(&mut self, count: usize) {
    if count > self.slots.len() {
      self.slots.resize_with(count, || None);
    }
  }

  /// Empty the LOD slot.
  /// param lod: The LOD index.
  /// return: The asset in the slot.
  pub fn remove(&mut self, lod: usize) -> Option<HalaMeshletAsset> {
    self.slots.get_mut(lod).and_then(|slot| slot.take())
  }

  pub fn get(&self, lod: usize) -> Option<&HalaMeshletAsset> {
    self.slots.get(lod).and_then(|slot| slot.as_ref())
  }

  /// Get the asset of the LOD.
  /// param lod: The LOD index.
  /// return: The asset or a MissingLod error.
  pub fn get_or_err(&self, lod: usize) -> Result<&HalaMeshletAsset, HalaRendererError> {
    self.get(lod).ok_or_else(|| HalaRendererError::missing_lod(&format!(
      "The LOD {} of {} slots holds no asset.", lod, self.slots.len()
    )))
  }

  /// The number of slots, empty ones included.
  pub fn len(&self) -> usize {
    self.slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.slots.is_empty()
  }

  pub fn loaded_count(&self) -> usize {
    self.slots.iter().filter(|slot| slot.is_some()).count()
  }

  /// Iterate the loaded LODs with their indices.
  pub fn iter(&self) -> impl Iterator<Item = (usize, &HalaMeshletAsset)> {
    self.slots.iter().enumerate().filter_map(|(lod, slot)| slot.as_ref().map(|asset| (lod, asset)))
  }

  /// The sphere holding every loaded LOD.
  pub fn bounding_sphere(&self) -> Option<HalaBoundingSphere> {
    HalaBoundingSphere::merge_all(self.iter().map(|(_, asset)| asset.bounding_sphere()))
  }

  pub fn total_vertex_count(&self) -> u64 {
    self.iter().map(|(_, asset)| asset.vertex_count() as u64).sum()
  }

  pub fn total_primitive_count(&self) -> u64 {
    self.iter().map(|(_, asset)| asset.primitive_count() as u64).sum()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::HalaMeshletCapacity;
  use crate::error::HalaRendererErrorKind;
  use crate::scene::cpu::mesh::tests::quad_strip_desc;

  fn asset(quads: u32) -> HalaMeshletAsset {
    HalaMeshletAsset::new_with_desc(quad_strip_desc(quads), &HalaMeshletCapacity::default()).unwrap()
  }

  #[test]
  fn empty_slots_are_sentinels() {
    let mut lods = HalaModelLods::new();
    lods.insert(2, asset(1));
    assert_eq!(lods.len(), 3);
    assert_eq!(lods.loaded_count(), 1);
    assert!(lods.get(0).is_none());
    assert_eq!(lods.get_or_err(1).unwrap_err().kind(), HalaRendererErrorKind::MissingLod);
    assert!(lods.get(2).is_some());
    assert!(lods.get(7).is_none());
  }

  #[test]
  fn aggregates_over_loaded_lods() {
    let mut lods = HalaModelLods::new();
    lods.insert(0, asset(4));
    lods.insert(1, asset(2));
    assert_eq!(lods.total_vertex_count(), 10 + 6);
    assert_eq!(lods.total_primitive_count(), 8 + 4);
    let sphere = lods.bounding_sphere().unwrap();
    assert!(sphere.radius >= lods.get(0).unwrap().bounding_sphere().radius);
  }

  #[test]
  fn remove_keeps_the_slot() {
    let mut lods = HalaModelLods::new();
    lods.insert(0, asset(1));
    assert!(lods.remove(0).is_some());
    assert_eq!(lods.len(), 1);
    assert_eq!(lods.loaded_count(), 0);
    assert!(lods.bounding_sphere().is_none());
  }
}
