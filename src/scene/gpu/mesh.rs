use crate::device::{HalaBufferHandle, HalaBufferView};
use crate::scene::{HalaMeshInfo, HalaVertexSemantic};
use super::retire::{HalaEpoch, HalaRetireQueue};

/// A vertex stream in the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalaVertexBuffer {
  pub semantic: HalaVertexSemantic,
  pub view: HalaBufferView,
}

/// The meshlet mesh of one LOD in the GPU.
#[derive(Debug)]
pub struct HalaMeshletMesh {
  pub name: String,
  pub vertex_buffers: Vec<HalaVertexBuffer>,
  pub index_buffer: HalaBufferView,
  pub meshlet_buffer: HalaBufferView,
  /// A raw view, its element count is the byte size divided by 4 rounded up.
  pub unique_vertex_index_buffer: HalaBufferView,
  pub primitive_index_buffer: HalaBufferView,
  pub cull_data_buffer: Option<HalaBufferView>,
  pub mesh_info_buffer: HalaBufferView,
  pub mesh_info: HalaMeshInfo,
  /// The last epoch whose commands reference the buffers.
  pub last_used: HalaEpoch,
}

/// The implementation of the meshlet mesh in the GPU.
impl HalaMeshletMesh {
  /// Find the stream carrying positions, the one bound to the vertex slot.
  pub fn position_buffer(&self) -> Option<&HalaVertexBuffer> {
    self.vertex_buffers.iter().find(|vb| vb.semantic.has_position())
  }

  /// Iterate every buffer owned by the mesh.
  pub fn buffers(&self) -> impl Iterator<Item = HalaBufferHandle> + '_ {
    self.vertex_buffers.iter().map(|vb| vb.view.buffer)
      .chain([
        self.index_buffer.buffer,
        self.meshlet_buffer.buffer,
        self.unique_vertex_index_buffer.buffer,
        self.primitive_index_buffer.buffer,
        self.mesh_info_buffer.buffer,
      ])
      .chain(self.cull_data_buffer.iter().map(|view| view.buffer))
  }

  /// Hand every buffer to the retire queue.
  /// param retire_queue: The retire queue.
  /// param last_used: The last epoch which may reference the buffers, at least the mesh's own.
  pub fn retire(self, retire_queue: &mut HalaRetireQueue, last_used: HalaEpoch) {
    let epoch = last_used.max(self.last_used);
    retire_queue.retire_all(self.buffers().collect::<Vec<_>>(), epoch);
    log::debug!("A HalaMeshletMesh \"{}\" is retired at epoch {}.", self.name, epoch.0);
  }
}
