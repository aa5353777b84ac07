use std::path::Path;

use crate::config::HalaMeshletCapacity;
use crate::error::{HalaRendererError, HalaRendererErrorKind};
use crate::scene::{
  HalaBoundingSphere,
  HalaCullData,
  HalaMeshlet,
  HalaPackedTriangle,
  HalaSubset,
  HalaVertexSemantic,
  HalaVertexStream,
};
use super::super::cpu::{HalaMeshletAsset, HalaMeshletAssetDesc};

/// The format tag at the start of every meshlet file.
pub const MESHLET_FILE_MAGIC: u32 = u32::from_le_bytes(*b"MSHL");
/// The only supported layout version.
pub const MESHLET_FILE_VERSION: u32 = 1;
/// The header size in bytes.
pub const MESHLET_FILE_HEADER_SIZE: usize = 64;

const STREAM_DESC_SIZE: u64 = 12;
const MESHLET_SIZE: u64 = 16;
const PACKED_TRIANGLE_SIZE: u64 = 4;
const CULL_DATA_SIZE: u64 = 24;
const SUBSET_SIZE: u64 = 8;

/// Counts stored in the file header.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct HalaMeshletFileHeader {
  stream_count: u32,
  vertex_count: u32,
  index_count: u32,
  index_size: u32,
  meshlet_count: u32,
  unique_vertex_index_count: u32,
  primitive_count: u32,
  cull_data_count: u32,
  subset_count: u32,
  bounding_sphere: [f32; 4],
}

/// A bounds checked little-endian cursor.
struct HalaByteReader<'a> {
  bytes: &'a [u8],
  offset: usize,
  name: &'a str,
}

impl<'a> HalaByteReader<'a> {
  fn new(bytes: &'a [u8], name: &'a str) -> Self {
    Self { bytes, offset: 0, name }
  }

  fn remaining(&self) -> usize {
    self.bytes.len() - self.offset
  }

  fn take(&mut self, len: u64, what: &str) -> Result<&'a [u8], HalaRendererError> {
    if len > self.remaining() as u64 {
      return Err(HalaRendererError::asset_corrupt(&format!(
        "The {} section of \"{}\" needs {} bytes at offset {} but only {} remain.",
        what, self.name, len, self.offset, self.remaining()
      )));
    }
    let start = self.offset;
    self.offset += len as usize;
    Ok(&self.bytes[start..self.offset])
  }

  fn read_u32(&mut self, what: &str) -> Result<u32, HalaRendererError> {
    let bytes = self.take(4, what)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
  }

  fn read_f32(&mut self, what: &str) -> Result<f32, HalaRendererError> {
    self.read_u32(what).map(f32::from_bits)
  }

  /// Skip the zero padding up to the next 4 bytes boundary.
  fn align4(&mut self, what: &str) -> Result<(), HalaRendererError> {
    let padding = (4 - self.offset % 4) % 4;
    self.take(padding as u64, what).map(|_| ())
  }
}

fn sized(count: u32, element_size: u64) -> u64 {
  count as u64 * element_size
}

/// The meshlet file loader.
pub struct HalaMeshletLoader;

/// The implementation of the meshlet file loader.
impl HalaMeshletLoader {
  /// Load the meshlet asset from the given path.
  /// param path: The path of the meshlet file.
  /// param capacity: The per-group capacity every meshlet must fit.
  /// return: The loaded asset.
  pub fn load<P: AsRef<Path>>(path: P, capacity: &HalaMeshletCapacity) -> Result<HalaMeshletAsset, HalaRendererError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
      .map_err(|err| HalaRendererError::new(
        HalaRendererErrorKind::Io,
        &format!("Read meshlet file \"{:?}\" failed.", path),
        Some(Box::new(err)),
      ))?;
    let name = path.file_stem().map(|stem| stem.to_string_lossy().to_string()).unwrap_or_default();
    log::debug!("Loading meshlet file \"{:?}\" with {} bytes.", path, bytes.len());
    Self::parse(&bytes, &name, capacity)
  }

  /// Parse the meshlet asset from the file content.
  /// param bytes: The file content.
  /// param name: The asset name.
  /// param capacity: The per-group capacity every meshlet must fit.
  /// return: The parsed asset.
  pub fn parse(bytes: &[u8], name: &str, capacity: &HalaMeshletCapacity) -> Result<HalaMeshletAsset, HalaRendererError> {
    let mut reader = HalaByteReader::new(bytes, name);
    let header = Self::parse_header(&mut reader)?;

    // Vertex stream descriptors.
    let mut stream_descs = Vec::with_capacity(header.stream_count.min(16) as usize);
    if sized(header.stream_count, STREAM_DESC_SIZE) > reader.remaining() as u64 {
      return Err(HalaRendererError::asset_corrupt(&format!(
        "\"{}\" declares {} vertex streams which overrun the file.", name, header.stream_count
      )));
    }
    for _ in 0..header.stream_count {
      let semantic = HalaVertexSemantic::from_u32(reader.read_u32("stream descriptor")?)?;
      let stride = reader.read_u32("stream descriptor")?;
      let count = reader.read_u32("stream descriptor")?;
      stream_descs.push((semantic, stride, count));
    }

    // Raw vertex bytes, one block per stream.
    let mut streams = Vec::with_capacity(stream_descs.len());
    for (semantic, stride, count) in stream_descs {
      reader.align4("vertex")?;
      if stride < semantic.min_stride() {
        return Err(HalaRendererError::asset_corrupt(&format!(
          "The {:?} stream of \"{}\" has the stride {}.", semantic, name, stride
        )));
      }
      let data = reader.take(sized(count, stride as u64), "vertex")?.to_vec();
      streams.push(HalaVertexStream { semantic, stride, count, data });
    }

    if header.index_size != 2 && header.index_size != 4 {
      return Err(HalaRendererError::asset_corrupt(&format!(
        "The index size {} of \"{}\" is neither 2 nor 4.", header.index_size, name
      )));
    }
    let index_size = header.index_size as u64;

    reader.align4("index")?;
    let indices = reader.take(sized(header.index_count, index_size), "index")?.to_vec();

    reader.align4("meshlet")?;
    let meshlet_bytes = reader.take(sized(header.meshlet_count, MESHLET_SIZE), "meshlet")?;
    let meshlets = meshlet_bytes.chunks_exact(MESHLET_SIZE as usize).map(|chunk| {
      let mut values = [0u32; 4];
      for (value, v) in values.iter_mut().zip(chunk.chunks_exact(4)) {
        *value = u32::from_le_bytes([v[0], v[1], v[2], v[3]]);
      }
      HalaMeshlet::new(values[0], values[1], values[2], values[3])
    }).collect::<Vec<_>>();

    reader.align4("unique vertex index")?;
    let unique_vertex_indices = reader.take(
      sized(header.unique_vertex_index_count, index_size), "unique vertex index")?.to_vec();

    reader.align4("primitive index")?;
    let primitive_indices = reader.take(sized(header.primitive_count, PACKED_TRIANGLE_SIZE), "primitive index")?
      .chunks_exact(PACKED_TRIANGLE_SIZE as usize)
      .map(|v| HalaPackedTriangle::from_raw(u32::from_le_bytes([v[0], v[1], v[2], v[3]])))
      .collect::<Vec<_>>();

    reader.align4("culling data")?;
    let mut cull_data = Vec::with_capacity(header.cull_data_count.min(header.meshlet_count) as usize);
    if sized(header.cull_data_count, CULL_DATA_SIZE) > reader.remaining() as u64 {
      return Err(HalaRendererError::asset_corrupt(&format!(
        "\"{}\" declares {} culling data which overrun the file.", name, header.cull_data_count
      )));
    }
    for _ in 0..header.cull_data_count {
      let mut bounding_sphere = [0.0f32; 4];
      for value in bounding_sphere.iter_mut() {
        *value = reader.read_f32("culling data")?;
      }
      let cone = reader.take(4, "culling data")?;
      let apex_offset = reader.read_f32("culling data")?;
      cull_data.push(HalaCullData {
        bounding_sphere,
        normal_cone: [cone[0], cone[1], cone[2], cone[3]],
        apex_offset,
      });
    }

    reader.align4("subset")?;
    let subsets = reader.take(sized(header.subset_count, SUBSET_SIZE), "subset")?
      .chunks_exact(SUBSET_SIZE as usize)
      .map(|v| HalaSubset::new(
        u32::from_le_bytes([v[0], v[1], v[2], v[3]]),
        u32::from_le_bytes([v[4], v[5], v[6], v[7]]),
      ))
      .collect::<Vec<_>>();

    if reader.remaining() > 0 {
      log::warn!("\"{}\" has {} trailing bytes after the subset table.", name, reader.remaining());
    }

    let [cx, cy, cz, radius] = header.bounding_sphere;
    HalaMeshletAsset::new_with_desc(
      HalaMeshletAssetDesc {
        name: name.to_string(),
        streams,
        vertex_count: header.vertex_count,
        index_size: header.index_size,
        indices,
        meshlets,
        unique_vertex_indices,
        primitive_indices,
        cull_data,
        subsets,
        bounding_sphere: HalaBoundingSphere::new([cx, cy, cz], radius),
      },
      capacity,
    )
  }

  fn parse_header(reader: &mut HalaByteReader) -> Result<HalaMeshletFileHeader, HalaRendererError> {
    let magic = reader.read_u32("header")?;
    if magic != MESHLET_FILE_MAGIC {
      return Err(HalaRendererError::unsupported_version(&format!(
        "\"{}\" has the format tag {:#010x}, expected {:#010x}.", reader.name, magic, MESHLET_FILE_MAGIC
      )));
    }
    let version = reader.read_u32("header")?;
    if version != MESHLET_FILE_VERSION {
      return Err(HalaRendererError::unsupported_version(&format!(
        "\"{}\" has the version {}, expected {}.", reader.name, version, MESHLET_FILE_VERSION
      )));
    }

    let mut header = HalaMeshletFileHeader {
      stream_count: reader.read_u32("header")?,
      vertex_count: reader.read_u32("header")?,
      index_count: reader.read_u32("header")?,
      index_size: reader.read_u32("header")?,
      meshlet_count: reader.read_u32("header")?,
      unique_vertex_index_count: reader.read_u32("header")?,
      primitive_count: reader.read_u32("header")?,
      cull_data_count: reader.read_u32("header")?,
      subset_count: reader.read_u32("header")?,
      ..Default::default()
    };
    let _reserved = reader.read_u32("header")?;
    for value in header.bounding_sphere.iter_mut() {
      *value = reader.read_f32("header")?;
    }
    Ok(header)
  }
}

/// The meshlet file writer.
/// It emits the exact layout read by HalaMeshletLoader.
pub struct HalaMeshletWriter;

fn pad4(bytes: &mut Vec<u8>) {
  while bytes.len() % 4 != 0 {
    bytes.push(0);
  }
}

fn push_u32(bytes: &mut Vec<u8>, value: u32) {
  bytes.extend_from_slice(&value.to_le_bytes());
}

fn push_f32(bytes: &mut Vec<u8>, value: f32) {
  bytes.extend_from_slice(&value.to_le_bytes());
}

/// The implementation of the meshlet file writer.
impl HalaMeshletWriter {
  /// Serialize the asset.
  /// param asset: The asset.
  /// return: The file content.
  pub fn write_to_bytes(asset: &HalaMeshletAsset) -> Vec<u8> {
    let desc = asset.desc();
    let mut bytes = Vec::with_capacity(MESHLET_FILE_HEADER_SIZE);

    push_u32(&mut bytes, MESHLET_FILE_MAGIC);
    push_u32(&mut bytes, MESHLET_FILE_VERSION);
    push_u32(&mut bytes, desc.streams.len() as u32);
    push_u32(&mut bytes, desc.vertex_count);
    push_u32(&mut bytes, asset.index_count());
    push_u32(&mut bytes, desc.index_size);
    push_u32(&mut bytes, desc.meshlets.len() as u32);
    push_u32(&mut bytes, asset.unique_vertex_index_count());
    push_u32(&mut bytes, desc.primitive_indices.len() as u32);
    push_u32(&mut bytes, desc.cull_data.len() as u32);
    push_u32(&mut bytes, desc.subsets.len() as u32);
    push_u32(&mut bytes, 0);
    for value in desc.bounding_sphere.center {
      push_f32(&mut bytes, value);
    }
    push_f32(&mut bytes, desc.bounding_sphere.radius);

    for stream in desc.streams.iter() {
      push_u32(&mut bytes, stream.semantic as u32);
      push_u32(&mut bytes, stream.stride);
      push_u32(&mut bytes, stream.count);
    }
    for stream in desc.streams.iter() {
      pad4(&mut bytes);
      bytes.extend_from_slice(&stream.data);
    }

    pad4(&mut bytes);
    bytes.extend_from_slice(&desc.indices);

    pad4(&mut bytes);
    for meshlet in desc.meshlets.iter() {
      push_u32(&mut bytes, meshlet.vert_count);
      push_u32(&mut bytes, meshlet.vert_offset);
      push_u32(&mut bytes, meshlet.prim_count);
      push_u32(&mut bytes, meshlet.prim_offset);
    }

    pad4(&mut bytes);
    bytes.extend_from_slice(&desc.unique_vertex_indices);

    pad4(&mut bytes);
    for prim in desc.primitive_indices.iter() {
      push_u32(&mut bytes, prim.to_raw());
    }

    pad4(&mut bytes);
    for cull in desc.cull_data.iter() {
      for value in cull.bounding_sphere {
        push_f32(&mut bytes, value);
      }
      bytes.extend_from_slice(&cull.normal_cone);
      push_f32(&mut bytes, cull.apex_offset);
    }

    pad4(&mut bytes);
    for subset in desc.subsets.iter() {
      push_u32(&mut bytes, subset.offset);
      push_u32(&mut bytes, subset.count);
    }

    bytes
  }

  /// Write the asset to the given path.
  /// param path: The path of the meshlet file.
  /// param asset: The asset.
  /// return: The result.
  pub fn write<P: AsRef<Path>>(path: P, asset: &HalaMeshletAsset) -> Result<(), HalaRendererError> {
    let path = path.as_ref();
    std::fs::write(path, Self::write_to_bytes(asset))
      .map_err(|err| HalaRendererError::new(
        HalaRendererErrorKind::Io,
        &format!("Write meshlet file \"{:?}\" failed.", path),
        Some(Box::new(err)),
      ))
  }
}
