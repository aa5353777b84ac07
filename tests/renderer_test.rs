use std::path::PathBuf;

use anyhow::Result;
use glam::Vec3;

use hala_meshlet_renderer::prelude::*;
use hala_meshlet_renderer::device::HalaDeviceCommand;
use hala_meshlet_renderer::renderer::{SLOT_DRAW_PARAMS, SLOT_MESH_PARAMS};
use hala_meshlet_renderer::scene::{
  HalaBoundingSphere,
  HalaMeshlet,
  HalaPackedTriangle,
  HalaSubset,
  HalaVertexStream,
};

fn init_log() {
  let _ = env_logger::builder().is_test(true).try_init();
}

fn temp_dir(name: &str) -> Result<PathBuf> {
  let dir = std::env::temp_dir().join(format!("hala_meshlet_{}_{}", name, std::process::id()));
  std::fs::create_dir_all(&dir)?;
  Ok(dir)
}

/// Meshlets made of triangle strips, each subset a list of meshlet vertex counts.
fn strip_asset(name: &str, subsets: &[&[u32]]) -> Result<HalaMeshletAsset> {
  let mut positions = Vec::new();
  let mut indices = Vec::new();
  let mut meshlets = Vec::new();
  let mut unique_vertex_indices = Vec::new();
  let mut primitive_indices = Vec::new();
  let mut subset_ranges = Vec::new();

  for vert_counts in subsets {
    subset_ranges.push(HalaSubset::new(meshlets.len() as u32, vert_counts.len() as u32));
    for &vert_count in vert_counts.iter() {
      let base = positions.len() as u32;
      for k in 0..vert_count {
        positions.push(Vec3::new((base + k) as f32 * 0.01, (k % 2) as f32, 0.0));
        unique_vertex_indices.extend_from_slice(&(base + k).to_le_bytes());
      }
      let prim_offset = primitive_indices.len() as u32;
      for k in 0..vert_count - 2 {
        primitive_indices.push(HalaPackedTriangle::encode(k, k + 1, k + 2)?);
        for i in [base + k, base + k + 1, base + k + 2] {
          indices.extend_from_slice(&i.to_le_bytes());
        }
      }
      meshlets.push(HalaMeshlet::new(vert_count, base, vert_count - 2, prim_offset));
    }
  }

  let bounding_sphere = HalaBoundingSphere::from_points(positions.iter().copied()).unwrap_or_default();
  let desc = HalaMeshletAssetDesc {
    name: name.to_string(),
    streams: vec![HalaVertexStream::from_positions(&positions)],
    vertex_count: positions.len() as u32,
    index_size: 4,
    indices,
    meshlets,
    unique_vertex_indices,
    primitive_indices,
    cull_data: Vec::new(),
    subsets: subset_ranges,
    bounding_sphere,
  };
  Ok(HalaMeshletAsset::new_with_desc(desc, &HalaMeshletCapacity::default())?)
}

/// Five meshlets, the last one packs twice into a group: 4.5 groups per instance.
fn five_meshlet_asset(name: &str) -> Result<HalaMeshletAsset> {
  strip_asset(name, &[&[128, 128, 128, 128, 64]])
}

fn draw_constants(device: &HalaRecordingDevice) -> Vec<Vec<u32>> {
  device.commands.iter().filter_map(|command| match command {
    HalaDeviceCommand::PushConstants { slot, values, .. } if *slot == SLOT_DRAW_PARAMS => Some(values.clone()),
    _ => None,
  }).collect()
}

#[test]
fn configured_lods_load_independently() -> Result<()> {
  init_log();
  let dir = temp_dir("configured_lods")?;
  let lod0 = dir.join("lod0.bin");
  let corrupt = dir.join("lod2.bin");
  HalaMeshletWriter::write(&lod0, &five_meshlet_asset("lod0")?)?;
  let mut bytes = HalaMeshletWriter::write_to_bytes(&strip_asset("lod2", &[&[3, 4]])?);
  bytes.truncate(bytes.len() - 6);
  std::fs::write(&corrupt, bytes)?;

  let config = HalaMeshletRendererConfig::from_json(&serde_json::json!({
    "lod_paths": [lod0, dir.join("missing.bin"), corrupt],
    "instance_level": 1,
  }).to_string())?;

  let mut device = HalaRecordingDevice::default();
  let mut renderer = HalaMeshletRenderer::new("configured", config)?;
  let failures = renderer.load_configured_lods(&mut device, HalaEpoch(0));

  assert_eq!(failures.len(), 2);
  assert_eq!(failures[0].0, 1);
  assert_eq!(failures[0].1.kind(), HalaRendererErrorKind::Io);
  assert_eq!(failures[1].0, 2);
  assert_eq!(failures[1].1.kind(), HalaRendererErrorKind::AssetCorrupt);
  assert_eq!(renderer.lods().len(), 3);
  assert_eq!(renderer.lods().loaded_count(), 1);
  assert_eq!(renderer.lods().get(0).map(|asset| asset.name()), Some("lod0"));

  let statistics = renderer.record_frame(&mut device, HalaEpoch(1))?;
  assert_eq!(statistics.instance_count, 27);
  assert_eq!(statistics.dispatch_count, 1);
  // ceil(4.5 * 27)
  assert_eq!(statistics.group_count, 122);

  renderer.destroy(&mut device);
  assert_eq!(device.live_buffer_count(), 0);
  std::fs::remove_dir_all(dir)?;
  Ok(())
}

#[test]
fn large_grids_split_into_dispatches_below_the_limit() -> Result<()> {
  init_log();
  let mut device = HalaRecordingDevice::default();
  let mut renderer = HalaMeshletRenderer::new("split", HalaMeshletRendererConfig::default())?;
  renderer.set_lod_asset(&mut device, 0, five_meshlet_asset("split")?, HalaEpoch(0))?;
  renderer.set_instance_level(13)?;
  device.clear_commands();

  let statistics = renderer.record_frame(&mut device, HalaEpoch(1))?;
  assert_eq!(statistics.instance_count, 19683);
  assert_eq!(device.dispatches(), vec![(65534, 1, 1), (23040, 1, 1)]);
  assert_eq!(draw_constants(&device), vec![vec![14563, 0], vec![5120, 14563]]);

  // The meshlet range of the subset precedes each dispatch.
  let meshlet_ranges = device.commands.iter().filter(|command| matches!(
    command,
    HalaDeviceCommand::PushConstants { slot, offset: 1, values } if *slot == SLOT_MESH_PARAMS && values == &vec![5, 0]
  )).count();
  assert_eq!(meshlet_ranges, 2);

  renderer.destroy(&mut device);
  Ok(())
}

#[test]
fn instance_data_reaches_the_device_before_drawing() -> Result<()> {
  init_log();
  let mut device = HalaRecordingDevice::default();
  let mut renderer = HalaMeshletRenderer::new("instances", HalaMeshletRendererConfig::default())?;
  renderer.set_lod_asset(&mut device, 0, five_meshlet_asset("instances")?, HalaEpoch(0))?;
  renderer.record_frame(&mut device, HalaEpoch(1))?;
  let small_buffer = renderer.instance_buffer().map(|view| view.buffer).ok_or_else(|| anyhow::anyhow!("no instance buffer"))?;

  renderer.set_instance_level(2)?;
  renderer.record_frame(&mut device, HalaEpoch(2))?;
  let view = *renderer.instance_buffer().ok_or_else(|| anyhow::anyhow!("no instance buffer"))?;
  assert_ne!(view.buffer, small_buffer);
  assert_eq!(view.num_elements, 125);

  let data = device.buffer_data(view.buffer).ok_or_else(|| anyhow::anyhow!("instance buffer freed"))?;
  let expected = renderer.placer().as_bytes();
  assert_eq!(&data[..expected.len()], expected);

  // The grown-out buffer survives until the frame which replaced it completes.
  renderer.collect_retired(&mut device, HalaEpoch(1));
  assert!(device.is_live(small_buffer));
  renderer.collect_retired(&mut device, HalaEpoch(2));
  assert!(!device.is_live(small_buffer));
  assert_eq!(renderer.pending_retire_count(), 0);

  renderer.destroy(&mut device);
  assert_eq!(device.live_buffer_count(), 0);
  Ok(())
}

#[test]
fn overflowing_subsets_are_skipped() -> Result<()> {
  init_log();
  let config = HalaMeshletRendererConfig::from_json(r#"{ "capacity": { "max_dispatch_groups": 4 } }"#)?;
  let mut device = HalaRecordingDevice::default();
  let mut renderer = HalaMeshletRenderer::new("skip", config)?;
  let asset = strip_asset("skip", &[&[10], &[128, 128, 128, 128, 64]])?;
  renderer.set_lod_asset(&mut device, 0, asset, HalaEpoch(0))?;
  device.clear_commands();

  let statistics = renderer.record_frame(&mut device, HalaEpoch(1))?;
  assert_eq!(statistics.skipped_subsets, 1);
  assert_eq!(statistics.dispatch_count, 1);
  assert_eq!(device.dispatches(), vec![(1, 1, 1)]);

  renderer.destroy(&mut device);
  Ok(())
}

#[test]
fn written_assets_load_back_identically() -> Result<()> {
  init_log();
  let dir = temp_dir("written_assets")?;
  let path = dir.join("asset.bin");
  let asset = strip_asset("asset", &[&[5, 7], &[3]])?;
  HalaMeshletWriter::write(&path, &asset)?;
  let loaded = HalaMeshletLoader::load(&path, &HalaMeshletCapacity::default())?;

  assert_eq!(loaded.meshlets(), asset.meshlets());
  assert_eq!(loaded.subsets(), asset.subsets());
  assert_eq!(loaded.primitive_indices(), asset.primitive_indices());
  assert_eq!(loaded.get_vertex_index(7), Some(7));
  assert_eq!(loaded.mesh_info(), asset.mesh_info());
  std::fs::remove_dir_all(dir)?;
  Ok(())
}
