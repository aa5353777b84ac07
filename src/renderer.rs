use std::path::Path;

use crate::config::HalaMeshletRendererConfig;
use crate::device::{
  HalaBufferUsageFlags,
  HalaBufferView,
  HalaDeviceTrait,
  HalaMemoryLocation,
};
use crate::dispatch::HalaDispatchBatcher;
use crate::error::HalaRendererError;
use crate::instance::{HalaInstanceData, HalaInstancePlacer};
use crate::scene::cpu::{HalaMeshletAsset, HalaModelLods};
use crate::scene::gpu::{HalaEpoch, HalaMeshletMesh, HalaRetireQueue};
use crate::scene::loader::HalaMeshletGPUUploader;

/// The root slot of the draw constants: instance count, instance offset.
pub const SLOT_DRAW_PARAMS: u32 = 1;
/// The root slot of the mesh constants: index size, meshlet count, meshlet offset.
pub const SLOT_MESH_PARAMS: u32 = 2;
pub const SLOT_MESHLETS: u32 = 3;
pub const SLOT_UNIQUE_VERTEX_INDICES: u32 = 4;
pub const SLOT_PRIMITIVE_INDICES: u32 = 5;
pub const SLOT_INSTANCES: u32 = 6;
pub const SLOT_MESH_INFO: u32 = 7;
pub const SLOT_CULL_DATA: u32 = 8;
/// The first vertex stream slot, one slot per stream.
pub const SLOT_VERTEX_STREAMS: u32 = 9;

/// The statistics of one recorded frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HalaFrameStatistics {
  pub dispatch_count: u32,
  pub group_count: u64,
  pub instance_count: u32,
  pub primitive_count: u64,
  pub vertex_count: u64,
  pub skipped_subsets: u32,
}

/// The meshlet renderer.
/// It records the instanced mesh shader dispatches of the active LOD into the host's frame.
pub struct HalaMeshletRenderer {

  pub name: String,
  config: HalaMeshletRendererConfig,
  batcher: HalaDispatchBatcher,

  lods: HalaModelLods,
  gpu_lods: Vec<Option<HalaMeshletMesh>>,
  active_lod: usize,

  placer: HalaInstancePlacer,
  instance_buffer: Option<HalaBufferView>,

  retire_queue: HalaRetireQueue,

  // Statistic.
  pub total_frames: u64,
  last_frame: HalaFrameStatistics,

}

/// The Drop implementation of the meshlet renderer.
impl Drop for HalaMeshletRenderer {

  fn drop(&mut self) {
    let live = self.gpu_lods.iter().flatten().count() + self.instance_buffer.iter().count() + self.retire_queue.len();
    if live > 0 {
      log::warn!("The HalaMeshletRenderer \"{}\" is dropped with GPU resources never destroyed.", self.name);
    }
    log::debug!("A HalaMeshletRenderer \"{}\" is dropped.", self.name);
  }

}

/// The implementation of the meshlet renderer.
impl HalaMeshletRenderer {

  /// Create a new meshlet renderer. No LOD is loaded yet.
  /// param name: The name of the renderer.
  /// param config: The configuration.
  /// return: The renderer.
  pub fn new(name: &str, config: HalaMeshletRendererConfig) -> Result<Self, HalaRendererError> {
    config.validate()?;
    let placer = HalaInstancePlacer::new(config.instance_level, 0.0)?;
    let batcher = HalaDispatchBatcher::new(config.capacity);

    log::debug!("A HalaMeshletRenderer \"{}\" is created.", name);
    Ok(Self {
      name: name.to_string(),
      config,
      batcher,
      lods: HalaModelLods::new(),
      gpu_lods: Vec::new(),
      active_lod: 0,
      placer,
      instance_buffer: None,
      retire_queue: HalaRetireQueue::new(),
      total_frames: 0,
      last_frame: HalaFrameStatistics::default(),
    })
  }

  pub fn config(&self) -> &HalaMeshletRendererConfig {
    &self.config
  }

  pub fn lods(&self) -> &HalaModelLods {
    &self.lods
  }

  pub fn gpu_mesh(&self, lod: usize) -> Option<&HalaMeshletMesh> {
    self.gpu_lods.get(lod).and_then(|slot| slot.as_ref())
  }

  pub fn placer(&self) -> &HalaInstancePlacer {
    &self.placer
  }

  pub fn instance_buffer(&self) -> Option<&HalaBufferView> {
    self.instance_buffer.as_ref()
  }

  pub fn active_lod(&self) -> usize {
    self.active_lod
  }

  pub fn last_frame_statistics(&self) -> &HalaFrameStatistics {
    &self.last_frame
  }

  pub fn pending_retire_count(&self) -> usize {
    self.retire_queue.len()
  }

  fn alignment<D: HalaDeviceTrait + ?Sized>(&self, device: &D) -> u64 {
    self.config.constant_buffer_alignment.max(device.constant_buffer_alignment())
  }

  /// Load every LOD named by the configuration.
  /// A LOD which fails to load leaves its slot empty and does not stop the others.
  /// param device: The device.
  /// param epoch: The epoch of the frame being recorded.
  /// return: The failed LODs with their errors.
  pub fn load_configured_lods<D: HalaDeviceTrait + ?Sized>(
    &mut self,
    device: &mut D,
    epoch: HalaEpoch,
  ) -> Vec<(usize, HalaRendererError)> {
    let paths = self.config.lod_paths.clone();
    self.lods.reserve_slots(paths.len());
    let mut failures = Vec::new();
    for (lod, path) in paths.iter().enumerate() {
      if let Err(err) = self.load_lod(device, lod, path, epoch) {
        failures.push((lod, err));
      }
    }
    log::info!(
      "The HalaMeshletRenderer \"{}\" loaded {} of {} LODs.",
      self.name, self.lods.loaded_count(), paths.len()
    );
    failures
  }

  /// Load the LOD from the asset file and upload it.
  /// param device: The device.
  /// param lod: The LOD index.
  /// param path: The asset file.
  /// param epoch: The epoch of the frame being recorded.
  /// return: The result.
  pub fn load_lod<D: HalaDeviceTrait + ?Sized, P: AsRef<Path>>(
    &mut self,
    device: &mut D,
    lod: usize,
    path: P,
    epoch: HalaEpoch,
  ) -> Result<(), HalaRendererError> {
    let path = path.as_ref();
    let asset = HalaMeshletAsset::with_capacity(path, &self.config.capacity).map_err(|err| {
      log::warn!("Load the LOD {} from \"{:?}\" failed: {}", lod, path, err);
      err
    })?;
    self.set_lod_asset(device, lod, asset, epoch)
  }

  /// Upload the asset and put it into the LOD slot.
  /// The previous mesh of the slot is retired at the epoch.
  /// param device: The device.
  /// param lod: The LOD index.
  /// param asset: The asset.
  /// param epoch: The epoch of the frame being recorded.
  /// return: The result, CapacityViolation if a meshlet does not fit the group capacity of the renderer.
  pub fn set_lod_asset<D: HalaDeviceTrait + ?Sized>(
    &mut self,
    device: &mut D,
    lod: usize,
    asset: HalaMeshletAsset,
    epoch: HalaEpoch,
  ) -> Result<(), HalaRendererError> {
    // The asset may have been validated against another capacity.
    let capacity = *self.batcher.capacity();
    if let Some((i, meshlet)) = asset.meshlets().iter().enumerate()
      .find(|(_, meshlet)| !meshlet.fits(capacity.max_verts, capacity.max_prims))
    {
      let err = HalaRendererError::capacity_violation(&format!(
        "The meshlet {} of \"{}\" has {} vertices and {} primitives, a group holds {} and {}.",
        i, asset.name(), meshlet.vert_count, meshlet.prim_count, capacity.max_verts, capacity.max_prims
      ));
      log::warn!("Set the LOD {} of \"{}\" failed: {}", lod, self.name, err);
      return Err(err);
    }

    let alignment = self.alignment(&*device);
    let mesh = HalaMeshletGPUUploader::upload(device, &asset, alignment, &mut self.retire_queue, epoch)?;

    if lod >= self.gpu_lods.len() {
      self.gpu_lods.resize_with(lod + 1, || None);
    }
    if let Some(previous) = self.gpu_lods[lod].replace(mesh) {
      previous.retire(&mut self.retire_queue, epoch);
    }
    self.lods.insert(lod, asset);
    self.refresh_instance_radius()?;
    Ok(())
  }

  /// Empty the LOD slot.
  /// param lod: The LOD index.
  /// param epoch: The epoch of the frame being recorded.
  /// return: The asset which was in the slot.
  pub fn unload_lod(&mut self, lod: usize, epoch: HalaEpoch) -> Result<Option<HalaMeshletAsset>, HalaRendererError> {
    if let Some(mesh) = self.gpu_lods.get_mut(lod).and_then(|slot| slot.take()) {
      mesh.retire(&mut self.retire_queue, epoch);
    }
    let asset = self.lods.remove(lod);
    self.refresh_instance_radius()?;
    Ok(asset)
  }

  fn refresh_instance_radius(&mut self) -> Result<(), HalaRendererError> {
    if let Some(sphere) = self.lods.bounding_sphere() {
      self.placer.set_radius(sphere.radius)?;
    }
    Ok(())
  }

  /// Select the LOD to draw.
  /// param lod: The LOD index.
  /// return: The result, MissingLod if the slot is empty.
  pub fn set_active_lod(&mut self, lod: usize) -> Result<(), HalaRendererError> {
    self.lods.get_or_err(lod)?;
    self.active_lod = lod;
    Ok(())
  }

  /// Change the instance grid level.
  /// return: Whether the grid was rebuilt.
  pub fn set_instance_level(&mut self, level: u32) -> Result<bool, HalaRendererError> {
    self.placer.set_level(level)
  }

  pub fn increase_instance_level(&mut self) -> Result<bool, HalaRendererError> {
    self.placer.increase_level()
  }

  pub fn decrease_instance_level(&mut self) -> Result<bool, HalaRendererError> {
    self.placer.decrease_level()
  }

  /// Make the instance buffer hold the grid and record its copy when it changed.
  /// The copy is recorded ahead of every dispatch of the frame.
  fn update_instance_buffer<D: HalaDeviceTrait + ?Sized>(
    &mut self,
    device: &mut D,
    epoch: HalaEpoch,
  ) -> Result<(), HalaRendererError> {
    let alignment = self.alignment(&*device);
    let required = self.placer.aligned_size(alignment).max(alignment);
    let current = self.instance_buffer.map(|view| view.size).unwrap_or(0);
    if current < required {
      let buffer = device.allocate_buffer(
        required,
        HalaBufferUsageFlags::STORAGE_BUFFER | HalaBufferUsageFlags::TRANSFER_DST,
        HalaMemoryLocation::GpuOnly,
        "instances.buffer")?;
      if let Some(previous) = self.instance_buffer.take() {
        self.retire_queue.retire(previous.buffer, epoch);
      }
      self.instance_buffer = Some(HalaBufferView {
        buffer,
        size: required,
        stride: std::mem::size_of::<HalaInstanceData>() as u32,
        num_elements: 0,
      });
      log::debug!("The instance buffer of \"{}\" grows to {} bytes.", self.name, required);
    }

    let Some(view) = self.instance_buffer.as_mut() else {
      return Ok(());
    };
    view.num_elements = self.placer.instance_count();

    if self.placer.is_copy_pending() {
      // A fresh staging buffer each time, the previous one may still be read by an in-flight copy.
      let bytes = self.placer.as_bytes();
      let staging_buffer = device.allocate_buffer(
        align_up_nonzero(bytes.len() as u64, alignment),
        HalaBufferUsageFlags::TRANSFER_SRC,
        HalaMemoryLocation::CpuToGpu,
        "instances.staging.buffer")?;
      self.retire_queue.retire(staging_buffer, epoch);
      device.write_buffer(staging_buffer, 0, bytes)?;
      device.copy_buffer(staging_buffer, 0, view.buffer, 0, bytes.len() as u64)?;
      self.placer.acknowledge_copy_enqueued();
    }
    Ok(())
  }

  /// Record the frame: the pending instance copy, the bindings and every dispatch of the active LOD.
  /// A subset which cannot be dispatched is logged and skipped.
  /// param device: The device.
  /// param epoch: The epoch of the frame being recorded.
  /// return: The statistics of the frame.
  pub fn record_frame<D: HalaDeviceTrait + ?Sized>(
    &mut self,
    device: &mut D,
    epoch: HalaEpoch,
  ) -> Result<HalaFrameStatistics, HalaRendererError> {
    self.lods.get_or_err(self.active_lod)?;
    // Every buffer of the mesh may be referenced by the frame from here on.
    match self.gpu_lods.get_mut(self.active_lod) {
      Some(Some(mesh)) => mesh.last_used = epoch,
      _ => return Err(HalaRendererError::missing_lod(&format!(
        "The LOD {} of \"{}\" is not uploaded.", self.active_lod, self.name
      ))),
    }

    self.update_instance_buffer(device, epoch)?;

    let asset = self.lods.get_or_err(self.active_lod)?;
    let mesh = self.gpu_mesh(self.active_lod).ok_or_else(|| HalaRendererError::missing_lod(&format!(
      "The LOD {} of \"{}\" is not uploaded.", self.active_lod, self.name
    )))?;
    let instance_count = self.placer.instance_count();

    // Bind the resources.
    for (i, vertex_buffer) in mesh.vertex_buffers.iter().enumerate() {
      device.bind_buffer(vertex_buffer.view.buffer, SLOT_VERTEX_STREAMS + i as u32)?;
    }
    device.bind_buffer(mesh.meshlet_buffer.buffer, SLOT_MESHLETS)?;
    device.bind_buffer(mesh.unique_vertex_index_buffer.buffer, SLOT_UNIQUE_VERTEX_INDICES)?;
    device.bind_buffer(mesh.primitive_index_buffer.buffer, SLOT_PRIMITIVE_INDICES)?;
    device.bind_buffer(mesh.mesh_info_buffer.buffer, SLOT_MESH_INFO)?;
    if let Some(cull_data) = mesh.cull_data_buffer.as_ref() {
      device.bind_buffer(cull_data.buffer, SLOT_CULL_DATA)?;
    }
    if let Some(instances) = self.instance_buffer.as_ref() {
      device.bind_buffer(instances.buffer, SLOT_INSTANCES)?;
    }
    device.push_constants(SLOT_MESH_PARAMS, 0, &[asset.index_size()])?;

    // Dispatch every subset.
    let mut statistics = HalaFrameStatistics {
      instance_count,
      primitive_count: asset.primitive_count() as u64 * instance_count as u64,
      vertex_count: asset.vertex_count() as u64 * instance_count as u64,
      ..Default::default()
    };
    for subset_index in 0..asset.subsets().len() {
      let dispatches = match self.batcher.compute_subset_dispatches(asset, subset_index, instance_count) {
        Ok(dispatches) => dispatches,
        Err(err) => {
          log::error!("Skip the subset {} of \"{}\": {}", subset_index, asset.name(), err);
          statistics.skipped_subsets += 1;
          continue;
        }
      };
      for dispatch in dispatches.iter() {
        device.push_constants(SLOT_DRAW_PARAMS, 0, &dispatch.draw_constants())?;
        device.push_constants(SLOT_MESH_PARAMS, 1, &dispatch.meshlet_constants())?;
        device.dispatch_mesh(dispatch.group_count, 1, 1)?;
        statistics.dispatch_count += 1;
        statistics.group_count += dispatch.group_count as u64;
      }
    }

    // Statistic.
    self.total_frames += 1;
    self.last_frame = statistics;
    let interval = self.config.stats_interval_frames as u64;
    if interval > 0 && self.total_frames % interval == 0 {
      log::info!(
        "Frame {}: {} instances, {} primitives, {} vertices, {} dispatches, {} groups",
        self.total_frames,
        statistics.instance_count,
        statistics.primitive_count,
        statistics.vertex_count,
        statistics.dispatch_count,
        statistics.group_count,
      );
    }

    Ok(statistics)
  }

  /// Free the buffers whose last use has completed on the GPU.
  /// param device: The device.
  /// param completed: The last completed epoch.
  /// return: The number of freed buffers.
  pub fn collect_retired<D: HalaDeviceTrait + ?Sized>(&mut self, device: &mut D, completed: HalaEpoch) -> usize {
    self.retire_queue.collect(device, completed)
  }

  /// Free every GPU resource. The caller must have waited for the device to go idle.
  /// param device: The device.
  pub fn destroy<D: HalaDeviceTrait + ?Sized>(&mut self, device: &mut D) {
    for mesh in self.gpu_lods.drain(..).flatten() {
      let last_used = mesh.last_used;
      mesh.retire(&mut self.retire_queue, last_used);
    }
    if let Some(view) = self.instance_buffer.take() {
      self.retire_queue.retire(view.buffer, HalaEpoch::default());
    }
    let freed = self.retire_queue.drain(device);
    log::debug!("The HalaMeshletRenderer \"{}\" freed {} buffers.", self.name, freed);
  }

}

fn align_up_nonzero(size: u64, alignment: u64) -> u64 {
  crate::device::align_up(size.max(1), alignment)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::HalaMeshletCapacity;
  use crate::device::{HalaDeviceCommand, HalaRecordingDevice};
  use crate::error::HalaRendererErrorKind;
  use crate::scene::cpu::mesh::tests::quad_strip_desc;
  use crate::scene::HalaMeshlet;

  fn asset(quads: u32) -> HalaMeshletAsset {
    HalaMeshletAsset::new_with_desc(quad_strip_desc(quads), &HalaMeshletCapacity::default()).unwrap()
  }

  #[test]
  fn instance_copy_precedes_every_dispatch() {
    let mut device = HalaRecordingDevice::default();
    let mut renderer = HalaMeshletRenderer::new("test", HalaMeshletRendererConfig::default()).unwrap();
    renderer.set_lod_asset(&mut device, 0, asset(3), HalaEpoch(0)).unwrap();
    renderer.set_instance_level(1).unwrap();
    device.clear_commands();

    let statistics = renderer.record_frame(&mut device, HalaEpoch(1)).unwrap();
    assert_eq!(statistics.instance_count, 27);
    assert_eq!(statistics.dispatch_count, 1);

    let copy = device.commands.iter().position(|c| matches!(c, HalaDeviceCommand::Copy { .. })).unwrap();
    let dispatch = device.commands.iter().position(|c| matches!(c, HalaDeviceCommand::DispatchMesh { .. })).unwrap();
    assert!(copy < dispatch);
    assert!(!renderer.placer().is_copy_pending());

    // Nothing changed, no copy in the next frame.
    device.clear_commands();
    renderer.record_frame(&mut device, HalaEpoch(2)).unwrap();
    assert!(!device.commands.iter().any(|c| matches!(c, HalaDeviceCommand::Copy { .. })));

    renderer.destroy(&mut device);
    assert_eq!(device.live_buffer_count(), 0);
  }

  #[test]
  fn missing_lod_records_nothing() {
    let mut device = HalaRecordingDevice::default();
    let mut renderer = HalaMeshletRenderer::new("test", HalaMeshletRendererConfig::default()).unwrap();
    let err = renderer.record_frame(&mut device, HalaEpoch(0)).unwrap_err();
    assert_eq!(err.kind(), HalaRendererErrorKind::MissingLod);
    assert!(device.commands.is_empty());
    assert_eq!(renderer.set_active_lod(2).unwrap_err().kind(), HalaRendererErrorKind::MissingLod);
  }

  #[test]
  fn replaced_lod_is_retired_until_its_epoch_completes() {
    let mut device = HalaRecordingDevice::default();
    let mut renderer = HalaMeshletRenderer::new("test", HalaMeshletRendererConfig::default()).unwrap();
    renderer.set_lod_asset(&mut device, 0, asset(2), HalaEpoch(0)).unwrap();
    renderer.record_frame(&mut device, HalaEpoch(3)).unwrap();
    let old_meshlets = renderer.gpu_mesh(0).unwrap().meshlet_buffer.buffer;

    renderer.set_lod_asset(&mut device, 0, asset(4), HalaEpoch(4)).unwrap();
    renderer.collect_retired(&mut device, HalaEpoch(3));
    assert!(device.is_live(old_meshlets));
    renderer.collect_retired(&mut device, HalaEpoch(4));
    assert!(!device.is_live(old_meshlets));

    renderer.destroy(&mut device);
    assert_eq!(device.live_buffer_count(), 0);
  }

  #[test]
  fn unloaded_lod_cannot_be_drawn() {
    let mut device = HalaRecordingDevice::default();
    let mut renderer = HalaMeshletRenderer::new("test", HalaMeshletRendererConfig::default()).unwrap();
    renderer.set_lod_asset(&mut device, 0, asset(2), HalaEpoch(0)).unwrap();
    renderer.set_lod_asset(&mut device, 1, asset(1), HalaEpoch(0)).unwrap();
    renderer.set_active_lod(1).unwrap();
    assert!(renderer.unload_lod(1, HalaEpoch(1)).unwrap().is_some());
    assert!(renderer.gpu_mesh(1).is_none());
    let err = renderer.record_frame(&mut device, HalaEpoch(1)).unwrap_err();
    assert_eq!(err.kind(), HalaRendererErrorKind::MissingLod);
    renderer.set_active_lod(0).unwrap();
    assert_eq!(renderer.record_frame(&mut device, HalaEpoch(1)).unwrap().dispatch_count, 1);
    renderer.destroy(&mut device);
    assert_eq!(device.live_buffer_count(), 0);
  }

  #[test]
  fn meshlets_above_the_renderer_capacity_are_rejected() {
    // Valid for the default capacity, the first two meshlets hold 4 vertices.
    let mut desc = quad_strip_desc(3);
    desc.meshlets[2] = HalaMeshlet::new(3, 8, 1, 4);
    let asset = HalaMeshletAsset::new_with_desc(desc, &HalaMeshletCapacity::default()).unwrap();

    let config = HalaMeshletRendererConfig {
      capacity: HalaMeshletCapacity { max_verts: 3, ..Default::default() },
      ..Default::default()
    };
    let mut device = HalaRecordingDevice::default();
    let mut renderer = HalaMeshletRenderer::new("test", config).unwrap();
    let err = renderer.set_lod_asset(&mut device, 0, asset, HalaEpoch(0)).unwrap_err();
    assert_eq!(err.kind(), HalaRendererErrorKind::CapacityViolation);
    assert!(device.commands.is_empty());
    assert_eq!(device.live_buffer_count(), 0);
    assert!(renderer.gpu_mesh(0).is_none());
    assert_eq!(renderer.lods().loaded_count(), 0);

    let err = renderer.record_frame(&mut device, HalaEpoch(1)).unwrap_err();
    assert_eq!(err.kind(), HalaRendererErrorKind::MissingLod);
    assert!(device.dispatches().is_empty());
  }

  #[test]
  fn failed_frame_still_marks_the_mesh_used() {
    let mut device = HalaRecordingDevice::default();
    let mut renderer = HalaMeshletRenderer::new("test", HalaMeshletRendererConfig::default()).unwrap();
    renderer.set_lod_asset(&mut device, 0, asset(2), HalaEpoch(0)).unwrap();
    renderer.set_instance_level(1).unwrap();
    renderer.record_frame(&mut device, HalaEpoch(1)).unwrap();
    assert_eq!(renderer.gpu_mesh(0).unwrap().last_used, HalaEpoch(1));

    device.fail_dispatches_after(0);
    let err = renderer.record_frame(&mut device, HalaEpoch(2)).unwrap_err();
    assert_eq!(err.kind(), HalaRendererErrorKind::Device);
    assert_eq!(renderer.gpu_mesh(0).unwrap().last_used, HalaEpoch(2));

    // Unloading at an older epoch keeps the buffers until the failed frame completes.
    let meshlets = renderer.gpu_mesh(0).unwrap().meshlet_buffer.buffer;
    renderer.unload_lod(0, HalaEpoch(1)).unwrap();
    renderer.collect_retired(&mut device, HalaEpoch(1));
    assert!(device.is_live(meshlets));
    renderer.collect_retired(&mut device, HalaEpoch(2));
    assert!(!device.is_live(meshlets));

    renderer.destroy(&mut device);
    assert_eq!(device.live_buffer_count(), 0);
  }

  #[test]
  fn instance_spacing_follows_the_loaded_lods() {
    let mut device = HalaRecordingDevice::default();
    let mut renderer = HalaMeshletRenderer::new("test", HalaMeshletRendererConfig::default()).unwrap();
    renderer.set_lod_asset(&mut device, 0, asset(4), HalaEpoch(0)).unwrap();
    let radius = renderer.lods().bounding_sphere().unwrap().radius;
    assert_eq!(renderer.placer().radius(), radius);
    renderer.destroy(&mut device);
  }
}
