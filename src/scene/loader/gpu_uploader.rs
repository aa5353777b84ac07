use crate::{
  device::{
    align_up,
    div_round_up,
    HalaBufferHandle,
    HalaBufferUsageFlags,
    HalaBufferView,
    HalaDeviceTrait,
    HalaMemoryLocation,
  },
  error::HalaRendererError,
  scene::{HalaCullData, HalaMeshInfo, HalaMeshlet, HalaPackedTriangle},
};
use super::super::cpu;
use super::super::gpu;

/// One buffer to be created and filled from the staging buffer.
struct HalaUploadSection<'a> {
  name: String,
  bytes: &'a [u8],
  usage: HalaBufferUsageFlags,
  stride: u32,
  num_elements: u32,
}

/// Upload the meshlet asset to the GPU from the CPU.
pub struct HalaMeshletGPUUploader;

/// The implementation of the meshlet asset uploader.
impl HalaMeshletGPUUploader {
  /// Upload the asset to the GPU through one staging buffer.
  /// The copies are recorded into the current frame; the staging buffer is retired at the epoch.
  /// On failure every buffer created so far is retired at the epoch as well.
  /// param device: The device.
  /// param asset: The asset in the CPU.
  /// param alignment: The buffer size and placement alignment.
  /// param retire_queue: The retire queue.
  /// param epoch: The epoch of the frame being recorded.
  /// return: The mesh in the GPU.
  pub fn upload<D: HalaDeviceTrait + ?Sized>(
    device: &mut D,
    asset: &cpu::HalaMeshletAsset,
    alignment: u64,
    retire_queue: &mut gpu::HalaRetireQueue,
    epoch: gpu::HalaEpoch,
  ) -> Result<gpu::HalaMeshletMesh, HalaRendererError> {
    let alignment = alignment.max(4);
    let name = asset.name();
    let mesh_info = asset.mesh_info();

    // Gather the sections, vertex streams first.
    let mut sections = Vec::with_capacity(asset.streams().len() + 6);
    for (i, stream) in asset.streams().iter().enumerate() {
      sections.push(HalaUploadSection {
        name: format!("{}.vertices_{}.buffer", name, i),
        bytes: &stream.data,
        usage: HalaBufferUsageFlags::STORAGE_BUFFER | HalaBufferUsageFlags::VERTEX_BUFFER,
        stride: stream.stride,
        num_elements: stream.count,
      });
    }
    sections.push(HalaUploadSection {
      name: format!("{}.indices.buffer", name),
      bytes: asset.indices(),
      usage: HalaBufferUsageFlags::STORAGE_BUFFER | HalaBufferUsageFlags::INDEX_BUFFER,
      stride: asset.index_size(),
      num_elements: asset.index_count(),
    });
    sections.push(HalaUploadSection {
      name: format!("{}.meshlets.buffer", name),
      bytes: bytemuck::cast_slice(asset.meshlets()),
      usage: HalaBufferUsageFlags::STORAGE_BUFFER,
      stride: std::mem::size_of::<HalaMeshlet>() as u32,
      num_elements: asset.meshlets().len() as u32,
    });
    sections.push(HalaUploadSection {
      name: format!("{}.unique_vertex_indices.buffer", name),
      bytes: asset.unique_vertex_indices(),
      usage: HalaBufferUsageFlags::STORAGE_BUFFER,
      stride: 0,
      num_elements: div_round_up(asset.unique_vertex_indices().len() as u64, 4) as u32,
    });
    sections.push(HalaUploadSection {
      name: format!("{}.primitive_indices.buffer", name),
      bytes: bytemuck::cast_slice(asset.primitive_indices()),
      usage: HalaBufferUsageFlags::STORAGE_BUFFER,
      stride: std::mem::size_of::<HalaPackedTriangle>() as u32,
      num_elements: asset.primitive_count(),
    });
    sections.push(HalaUploadSection {
      name: format!("{}.mesh_info.buffer", name),
      bytes: bytemuck::bytes_of(&mesh_info),
      usage: HalaBufferUsageFlags::UNIFORM_BUFFER,
      stride: std::mem::size_of::<HalaMeshInfo>() as u32,
      num_elements: 1,
    });
    if let Some(cull_data) = asset.cull_data() {
      sections.push(HalaUploadSection {
        name: format!("{}.cull_data.buffer", name),
        bytes: bytemuck::cast_slice(cull_data),
        usage: HalaBufferUsageFlags::STORAGE_BUFFER,
        stride: std::mem::size_of::<HalaCullData>() as u32,
        num_elements: cull_data.len() as u32,
      });
    }

    let mut allocated = Vec::with_capacity(sections.len() + 1);
    let views = match Self::upload_sections(device, name, &sections, alignment, &mut allocated) {
      Ok(views) => views,
      Err(err) => {
        log::error!("Upload the meshlet asset \"{}\" failed: {}", name, err);
        retire_queue.retire_all(allocated, epoch);
        return Err(err);
      }
    };

    // The staging buffer is always the first allocation.
    retire_queue.retire_all(allocated.into_iter().take(1), epoch);

    let stream_count = asset.streams().len();
    let vertex_buffers = asset.streams().iter().zip(views.iter())
      .map(|(stream, view)| gpu::HalaVertexBuffer { semantic: stream.semantic, view: *view })
      .collect();
    let mesh = gpu::HalaMeshletMesh {
      name: name.to_string(),
      vertex_buffers,
      index_buffer: views[stream_count],
      meshlet_buffer: views[stream_count + 1],
      unique_vertex_index_buffer: views[stream_count + 2],
      primitive_index_buffer: views[stream_count + 3],
      mesh_info_buffer: views[stream_count + 4],
      cull_data_buffer: views.get(stream_count + 5).copied(),
      mesh_info,
      last_used: epoch,
    };
    log::debug!("A HalaMeshletMesh \"{}\" is uploaded with {} buffers.", mesh.name, views.len());
    Ok(mesh)
  }

  /// Create the staging buffer and the section buffers, then record the copies.
  /// param device: The device.
  /// param name: The asset name.
  /// param sections: The sections.
  /// param alignment: The alignment.
  /// param allocated: Every buffer created, the staging buffer first.
  /// return: The views of the section buffers.
  fn upload_sections<D: HalaDeviceTrait + ?Sized>(
    device: &mut D,
    name: &str,
    sections: &[HalaUploadSection],
    alignment: u64,
    allocated: &mut Vec<HalaBufferHandle>,
  ) -> Result<Vec<HalaBufferView>, HalaRendererError> {
    let sizes = sections.iter()
      .map(|section| align_up((section.bytes.len() as u64).max(1), alignment))
      .collect::<Vec<_>>();
    let staging_size: u64 = sizes.iter().sum();

    let staging_buffer = device.allocate_buffer(
      staging_size,
      HalaBufferUsageFlags::TRANSFER_SRC,
      HalaMemoryLocation::CpuToGpu,
      &format!("{}.staging.buffer", name))?;
    allocated.push(staging_buffer);

    let mut views = Vec::with_capacity(sections.len());
    let mut offset = 0u64;
    for (section, size) in sections.iter().zip(sizes.iter()) {
      let buffer = device.allocate_buffer(
        *size,
        section.usage | HalaBufferUsageFlags::TRANSFER_DST,
        HalaMemoryLocation::GpuOnly,
        &section.name)?;
      allocated.push(buffer);

      if !section.bytes.is_empty() {
        device.write_buffer(staging_buffer, offset, section.bytes)?;
        device.copy_buffer(staging_buffer, offset, buffer, 0, section.bytes.len() as u64)?;
      }

      views.push(HalaBufferView {
        buffer,
        size: *size,
        stride: section.stride,
        num_elements: section.num_elements,
      });
      offset += size;
    }

    Ok(views)
  }
}
