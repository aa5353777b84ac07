use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use crate::config::MAX_PACKED_VERTS;
use crate::error::HalaRendererError;

/// The meshlet.
/// The offsets index into the unique vertex index and packed primitive arrays shared by the whole mesh.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct HalaMeshlet {
  pub vert_count: u32,
  pub vert_offset: u32,
  pub prim_count: u32,
  pub prim_offset: u32,
}

/// The implementation of the meshlet.
impl HalaMeshlet {
  pub fn new(vert_count: u32, vert_offset: u32, prim_count: u32, prim_offset: u32) -> Self {
    Self { vert_count, vert_offset, prim_count, prim_offset }
  }

  /// Check whether the meshlet fits in one group.
  /// param max_verts: The maximum vertex count of a group.
  /// param max_prims: The maximum primitive count of a group.
  /// return: True if it fits.
  pub fn fits(&self, max_verts: u32, max_prims: u32) -> bool {
    self.vert_count <= max_verts && self.prim_count <= max_prims
  }

  /// Calculate how many copies of this meshlet can share one group.
  /// param max_verts: The maximum vertex count of a group.
  /// param max_prims: The maximum primitive count of a group.
  /// return: The pack count, 0 if the meshlet is empty or does not fit at all.
  pub fn pack_count(&self, max_verts: u32, max_prims: u32) -> u32 {
    if self.vert_count == 0 || self.prim_count == 0 {
      return 0;
    }
    std::cmp::min(max_verts / self.vert_count, max_prims / self.prim_count)
  }
}

/// A triangle made of three 10 bits local vertex indices.
/// Bit layout of the raw u32: [0, 10) i0, [10, 20) i1, [20, 30) i2, [30, 32) zero.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct HalaPackedTriangle(u32);

const PACKED_INDEX_BITS: u32 = 10;
const PACKED_INDEX_MASK: u32 = (1 << PACKED_INDEX_BITS) - 1;

/// The implementation of the packed triangle codec.
impl HalaPackedTriangle {
  /// Pack three local indices.
  /// param i0: The first index.
  /// param i1: The second index.
  /// param i2: The third index.
  /// return: The packed triangle.
  pub fn encode(i0: u32, i1: u32, i2: u32) -> Result<Self, HalaRendererError> {
    if i0 >= MAX_PACKED_VERTS || i1 >= MAX_PACKED_VERTS || i2 >= MAX_PACKED_VERTS {
      return Err(HalaRendererError::capacity_violation(&format!(
        "The triangle ({}, {}, {}) can not be packed into 10 bits indices.", i0, i1, i2
      )));
    }
    Ok(Self(i0 | (i1 << PACKED_INDEX_BITS) | (i2 << (2 * PACKED_INDEX_BITS))))
  }

  /// Unpack the three local indices.
  /// return: The indices.
  pub fn decode(&self) -> [u32; 3] {
    [
      self.0 & PACKED_INDEX_MASK,
      (self.0 >> PACKED_INDEX_BITS) & PACKED_INDEX_MASK,
      (self.0 >> (2 * PACKED_INDEX_BITS)) & PACKED_INDEX_MASK,
    ]
  }

  pub fn from_raw(raw: u32) -> Self {
    Self(raw)
  }

  pub fn to_raw(&self) -> u32 {
    self.0
  }

  /// Whether the two high bits are clear.
  pub fn is_canonical(&self) -> bool {
    self.0 >> (3 * PACKED_INDEX_BITS) == 0
  }

  /// The largest of the three local indices.
  pub fn max_index(&self) -> u32 {
    let [i0, i1, i2] = self.decode();
    i0.max(i1).max(i2)
  }
}

/// The per-meshlet culling data.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct HalaCullData {
  /// xyz = center, w = radius.
  pub bounding_sphere: [f32; 4],
  /// xyz = axis, w = -cos(a + 90), each mapped from [-1, 1] to a unorm8.
  pub normal_cone: [u8; 4],
  /// apex = center - axis * offset.
  pub apex_offset: f32,
}

fn pack_unorm8(value: f32) -> u8 {
  ((value.clamp(-1.0, 1.0) * 0.5 + 0.5) * 255.0).round() as u8
}

fn unpack_unorm8(value: u8) -> f32 {
  value as f32 / 255.0 * 2.0 - 1.0
}

/// The implementation of the culling data.
impl HalaCullData {
  /// Create the culling data.
  /// param center: The bounding sphere center.
  /// param radius: The bounding sphere radius.
  /// param cone_axis: The normal cone axis.
  /// param cone_cutoff: The normal cone cutoff, -cos(a + 90).
  /// param apex_offset: The distance from the center to the cone apex along the axis.
  /// return: The culling data.
  pub fn new(center: Vec3, radius: f32, cone_axis: Vec3, cone_cutoff: f32, apex_offset: f32) -> Self {
    Self {
      bounding_sphere: [center.x, center.y, center.z, radius],
      normal_cone: [
        pack_unorm8(cone_axis.x),
        pack_unorm8(cone_axis.y),
        pack_unorm8(cone_axis.z),
        pack_unorm8(cone_cutoff),
      ],
      apex_offset,
    }
  }

  pub fn center(&self) -> Vec3 {
    Vec4::from_array(self.bounding_sphere).truncate()
  }

  pub fn radius(&self) -> f32 {
    self.bounding_sphere[3]
  }

  pub fn cone_axis(&self) -> Vec3 {
    Vec3::new(
      unpack_unorm8(self.normal_cone[0]),
      unpack_unorm8(self.normal_cone[1]),
      unpack_unorm8(self.normal_cone[2]),
    )
  }

  pub fn cone_cutoff(&self) -> f32 {
    unpack_unorm8(self.normal_cone[3])
  }

  pub fn apex(&self) -> Vec3 {
    self.center() - self.cone_axis() * self.apex_offset
  }
}

/// A contiguous range of meshlets sharing the same draw grouping.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct HalaSubset {
  pub offset: u32,
  pub count: u32,
}

impl HalaSubset {
  pub fn new(offset: u32, count: u32) -> Self {
    Self { offset, count }
  }

  /// The exclusive end of the meshlet range.
  pub fn end(&self) -> u64 {
    self.offset as u64 + self.count as u64
  }
}

/// The per-mesh constant block read by the amplification and mesh stages.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct HalaMeshInfo {
  pub index_size: u32,
  pub meshlet_count: u32,
  pub last_meshlet_vert_count: u32,
  pub last_meshlet_prim_count: u32,
}
