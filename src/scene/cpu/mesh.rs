use std::path::Path;

use crate::config::HalaMeshletCapacity;
use crate::error::HalaRendererError;
use crate::scene::{
  HalaBoundingSphere,
  HalaCullData,
  HalaMeshInfo,
  HalaMeshlet,
  HalaPackedTriangle,
  HalaSubset,
  HalaVertexSemantic,
  HalaVertexStream,
};
use crate::scene::loader::HalaMeshletLoader;

/// The unvalidated parts of a meshlet asset.
#[derive(Debug, Clone, Default)]
pub struct HalaMeshletAssetDesc {
  pub name: String,
  pub streams: Vec<HalaVertexStream>,
  pub vertex_count: u32,
  /// The byte width of the index and unique vertex index buffers, 2 or 4.
  pub index_size: u32,
  pub indices: Vec<u8>,
  pub meshlets: Vec<HalaMeshlet>,
  pub unique_vertex_indices: Vec<u8>,
  pub primitive_indices: Vec<HalaPackedTriangle>,
  pub cull_data: Vec<HalaCullData>,
  pub subsets: Vec<HalaSubset>,
  pub bounding_sphere: HalaBoundingSphere,
}

/// The geometry of one LOD split into meshlets.
/// It is immutable once created.
#[derive(Debug, Clone)]
pub struct HalaMeshletAsset {
  desc: HalaMeshletAssetDesc,
}

fn read_index(bytes: &[u8], index_size: u32, index: usize) -> Option<u32> {
  let size = index_size as usize;
  let chunk = bytes.get(index * size..(index + 1) * size)?;
  match size {
    2 => Some(u16::from_le_bytes([chunk[0], chunk[1]]) as u32),
    4 => Some(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])),
    _ => None,
  }
}

/// The implementation of the meshlet asset.
impl HalaMeshletAsset {
  /// Load the asset from the file with the default capacity.
  /// param path: The path of the asset file.
  /// return: The asset.
  pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, HalaRendererError> {
    Self::with_capacity(path, &HalaMeshletCapacity::default())
  }

  /// Load the asset from the file.
  /// param path: The path of the asset file.
  /// param capacity: The per-group capacity every meshlet must fit.
  /// return: The asset.
  pub fn with_capacity<P: AsRef<Path>>(path: P, capacity: &HalaMeshletCapacity) -> Result<Self, HalaRendererError> {
    HalaMeshletLoader::load(path, capacity)
  }

  /// Create the asset from its parts after checking every invariant.
  /// param desc: The parts.
  /// param capacity: The per-group capacity every meshlet must fit.
  /// return: The asset.
  pub fn new_with_desc(desc: HalaMeshletAssetDesc, capacity: &HalaMeshletCapacity) -> Result<Self, HalaRendererError> {
    Self::validate(&desc, capacity)?;
    log::debug!(
      "A HalaMeshletAsset \"{}\" is created with {} meshlets and {} subsets.",
      desc.name, desc.meshlets.len(), desc.subsets.len()
    );
    Ok(Self { desc })
  }

  fn validate(desc: &HalaMeshletAssetDesc, capacity: &HalaMeshletCapacity) -> Result<(), HalaRendererError> {
    let name = &desc.name;
    if desc.index_size != 2 && desc.index_size != 4 {
      return Err(HalaRendererError::asset_corrupt(&format!(
        "The index size {} of \"{}\" is neither 2 nor 4.", desc.index_size, name
      )));
    }

    // Vertex streams.
    for stream in desc.streams.iter() {
      if stream.count != desc.vertex_count {
        return Err(HalaRendererError::asset_corrupt(&format!(
          "The {:?} stream of \"{}\" has {} elements but the mesh has {} vertices.",
          stream.semantic, name, stream.count, desc.vertex_count
        )));
      }
      if stream.stride < stream.semantic.min_stride()
        || stream.data.len() as u64 != stream.stride as u64 * stream.count as u64 {
        return Err(HalaRendererError::asset_corrupt(&format!(
          "The {:?} stream of \"{}\" has an invalid stride {} for {} bytes.",
          stream.semantic, name, stream.stride, stream.data.len()
        )));
      }
    }

    // Index buffers.
    let index_size = desc.index_size as usize;
    for (label, bytes) in [("index", &desc.indices), ("unique vertex index", &desc.unique_vertex_indices)] {
      if bytes.len() % index_size != 0 {
        return Err(HalaRendererError::asset_corrupt(&format!(
          "The {} buffer of \"{}\" has {} bytes which is not a multiple of {}.", label, name, bytes.len(), index_size
        )));
      }
      for i in 0..bytes.len() / index_size {
        let value = read_index(bytes, desc.index_size, i).unwrap_or(u32::MAX);
        if value >= desc.vertex_count {
          return Err(HalaRendererError::asset_corrupt(&format!(
            "The {} {} of \"{}\" references vertex {} of {}.", label, i, name, value, desc.vertex_count
          )));
        }
      }
    }

    // Meshlets.
    let unique_vertex_index_count = (desc.unique_vertex_indices.len() / index_size) as u64;
    let primitive_count = desc.primitive_indices.len() as u64;
    for (i, meshlet) in desc.meshlets.iter().enumerate() {
      if meshlet.vert_count == 0 || meshlet.prim_count == 0 {
        return Err(HalaRendererError::asset_corrupt(&format!(
          "The meshlet {} of \"{}\" is empty.", i, name
        )));
      }
      if !meshlet.fits(capacity.max_verts, capacity.max_prims) {
        return Err(HalaRendererError::capacity_violation(&format!(
          "The meshlet {} of \"{}\" has {} vertices and {} primitives, the group capacity is {} and {}.",
          i, name, meshlet.vert_count, meshlet.prim_count, capacity.max_verts, capacity.max_prims
        )));
      }
      if meshlet.vert_offset as u64 + meshlet.vert_count as u64 > unique_vertex_index_count {
        return Err(HalaRendererError::asset_corrupt(&format!(
          "The meshlet {} of \"{}\" overruns the unique vertex indices.", i, name
        )));
      }
      let prim_end = meshlet.prim_offset as u64 + meshlet.prim_count as u64;
      if prim_end > primitive_count {
        return Err(HalaRendererError::asset_corrupt(&format!(
          "The meshlet {} of \"{}\" overruns the primitive indices.", i, name
        )));
      }
      for prim in desc.primitive_indices[meshlet.prim_offset as usize..prim_end as usize].iter() {
        if !prim.is_canonical() || prim.max_index() >= meshlet.vert_count {
          return Err(HalaRendererError::asset_corrupt(&format!(
            "The meshlet {} of \"{}\" has the triangle {:?} outside its {} local vertices.",
            i, name, prim.decode(), meshlet.vert_count
          )));
        }
      }
    }

    if !desc.cull_data.is_empty() && desc.cull_data.len() != desc.meshlets.len() {
      return Err(HalaRendererError::asset_corrupt(&format!(
        "\"{}\" has {} culling data for {} meshlets.", name, desc.cull_data.len(), desc.meshlets.len()
      )));
    }

    for (i, subset) in desc.subsets.iter().enumerate() {
      if subset.end() > desc.meshlets.len() as u64 {
        return Err(HalaRendererError::asset_corrupt(&format!(
          "The subset {} [{}, {}) of \"{}\" overruns {} meshlets.",
          i, subset.offset, subset.end(), name, desc.meshlets.len()
        )));
      }
    }

    Ok(())
  }

  pub fn desc(&self) -> &HalaMeshletAssetDesc {
    &self.desc
  }

  pub fn name(&self) -> &str {
    &self.desc.name
  }

  pub fn streams(&self) -> &[HalaVertexStream] {
    &self.desc.streams
  }

  /// Find the first stream with the semantic.
  /// param semantic: The semantic.
  /// return: The stream.
  pub fn stream(&self, semantic: HalaVertexSemantic) -> Option<&HalaVertexStream> {
    self.desc.streams.iter().find(|stream| stream.semantic == semantic)
  }

  pub fn vertex_count(&self) -> u32 {
    self.desc.vertex_count
  }

  pub fn index_size(&self) -> u32 {
    self.desc.index_size
  }

  pub fn index_count(&self) -> u32 {
    (self.desc.indices.len() / self.desc.index_size as usize) as u32
  }

  pub fn indices(&self) -> &[u8] {
    &self.desc.indices
  }

  pub fn get_index(&self, index: u32) -> Option<u32> {
    read_index(&self.desc.indices, self.desc.index_size, index as usize)
  }

  pub fn meshlets(&self) -> &[HalaMeshlet] {
    &self.desc.meshlets
  }

  pub fn unique_vertex_indices(&self) -> &[u8] {
    &self.desc.unique_vertex_indices
  }

  pub fn unique_vertex_index_count(&self) -> u32 {
    (self.desc.unique_vertex_indices.len() / self.desc.index_size as usize) as u32
  }

  /// Read a unique vertex index with the asset's index width.
  /// param index: The position in the unique vertex index buffer.
  /// return: The vertex index.
  pub fn get_vertex_index(&self, index: u32) -> Option<u32> {
    read_index(&self.desc.unique_vertex_indices, self.desc.index_size, index as usize)
  }

  pub fn primitive_indices(&self) -> &[HalaPackedTriangle] {
    &self.desc.primitive_indices
  }

  pub fn get_primitive(&self, index: u32) -> Option<[u32; 3]> {
    self.desc.primitive_indices.get(index as usize).map(|prim| prim.decode())
  }

  pub fn primitive_count(&self) -> u32 {
    self.desc.primitive_indices.len() as u32
  }

  /// The culling data, None if the asset has none.
  pub fn cull_data(&self) -> Option<&[HalaCullData]> {
    if self.desc.cull_data.is_empty() {
      None
    } else {
      Some(&self.desc.cull_data)
    }
  }

  pub fn subsets(&self) -> &[HalaSubset] {
    &self.desc.subsets
  }

  pub fn bounding_sphere(&self) -> &HalaBoundingSphere {
    &self.desc.bounding_sphere
  }

  /// Get the last meshlet of the subset.
  /// param subset_index: The subset index.
  /// return: The meshlet, None if the subset is empty or missing.
  pub fn trailing_meshlet(&self, subset_index: usize) -> Option<&HalaMeshlet> {
    let subset = self.desc.subsets.get(subset_index)?;
    if subset.count == 0 {
      return None;
    }
    self.desc.meshlets.get((subset.offset + subset.count - 1) as usize)
  }

  /// Calculate the number of instances of the last meshlet which can be packed into a single group.
  /// param subset_index: The subset index.
  /// param max_verts: The maximum vertex count of a group.
  /// param max_prims: The maximum primitive count of a group.
  /// return: The pack count, 0 if there is no trailing meshlet.
  pub fn get_last_meshlet_pack_count(&self, subset_index: usize, max_verts: u32, max_prims: u32) -> u32 {
    self.trailing_meshlet(subset_index)
      .map(|meshlet| meshlet.pack_count(max_verts, max_prims))
      .unwrap_or(0)
  }

  /// The constant block describing this mesh to the shaders.
  pub fn mesh_info(&self) -> HalaMeshInfo {
    let last = self.desc.meshlets.last().copied().unwrap_or_default();
    HalaMeshInfo {
      index_size: self.desc.index_size,
      meshlet_count: self.desc.meshlets.len() as u32,
      last_meshlet_vert_count: last.vert_count,
      last_meshlet_prim_count: last.prim_count,
    }
  }
}
