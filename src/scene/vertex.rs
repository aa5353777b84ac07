use glam::Vec3;

use crate::error::HalaRendererError;

/// The semantic of a vertex stream.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HalaVertexSemantic {
  Position = 0,
  Normal = 1,
  TexCoord = 2,
  Tangent = 3,
  Bitangent = 4,
  /// Position and normal interleaved in one stream.
  PositionNormal = 5,
}

/// The implementation of the vertex semantic.
impl HalaVertexSemantic {
  /// Decode the semantic tag stored in the asset file.
  /// param value: The tag.
  /// return: The semantic.
  pub fn from_u32(value: u32) -> Result<Self, HalaRendererError> {
    match value {
      0 => Ok(Self::Position),
      1 => Ok(Self::Normal),
      2 => Ok(Self::TexCoord),
      3 => Ok(Self::Tangent),
      4 => Ok(Self::Bitangent),
      5 => Ok(Self::PositionNormal),
      _ => Err(HalaRendererError::asset_corrupt(&format!("Unknown vertex semantic {}.", value))),
    }
  }

  /// Whether the stream starts with a float3 position.
  pub fn has_position(&self) -> bool {
    matches!(self, Self::Position | Self::PositionNormal)
  }

  /// The smallest stride able to hold the semantic.
  pub fn min_stride(&self) -> u32 {
    match self {
      Self::Position | Self::Normal | Self::Tangent | Self::Bitangent => 12,
      Self::TexCoord => 8,
      Self::PositionNormal => 24,
    }
  }
}

/// One vertex stream with an explicit byte stride.
#[derive(Debug, Clone, PartialEq)]
pub struct HalaVertexStream {
  pub semantic: HalaVertexSemantic,
  pub stride: u32,
  pub count: u32,
  pub data: Vec<u8>,
}

/// The implementation of the vertex stream.
impl HalaVertexStream {
  /// Create a stream from raw bytes.
  /// param semantic: The semantic.
  /// param stride: The byte stride of one element.
  /// param data: The raw bytes, stride * count long.
  /// return: The stream.
  pub fn new(semantic: HalaVertexSemantic, stride: u32, data: Vec<u8>) -> Result<Self, HalaRendererError> {
    if stride < semantic.min_stride() {
      return Err(HalaRendererError::asset_corrupt(&format!(
        "The stride {} of the {:?} stream is smaller than {}.", stride, semantic, semantic.min_stride()
      )));
    }
    if data.len() % stride as usize != 0 {
      return Err(HalaRendererError::asset_corrupt(&format!(
        "The {:?} stream has {} bytes which is not a multiple of the stride {}.", semantic, data.len(), stride
      )));
    }
    let count = (data.len() / stride as usize) as u32;
    Ok(Self { semantic, stride, count, data })
  }

  /// Create a float3 position stream.
  /// param positions: The positions.
  /// return: The stream.
  pub fn from_positions(positions: &[Vec3]) -> Self {
    let data = positions.iter().flat_map(|p| bytemuck::bytes_of(&p.to_array()).to_vec()).collect();
    Self {
      semantic: HalaVertexSemantic::Position,
      stride: 12,
      count: positions.len() as u32,
      data,
    }
  }

  /// Create an interleaved position and normal stream.
  /// param positions: The positions.
  /// param normals: The normals, as many as the positions.
  /// return: The stream.
  pub fn from_positions_normals(positions: &[Vec3], normals: &[Vec3]) -> Result<Self, HalaRendererError> {
    if positions.len() != normals.len() {
      return Err(HalaRendererError::asset_corrupt(&format!(
        "{} positions do not match {} normals.", positions.len(), normals.len()
      )));
    }
    let mut data = Vec::with_capacity(positions.len() * 24);
    for (p, n) in positions.iter().zip(normals.iter()) {
      data.extend_from_slice(bytemuck::bytes_of(&p.to_array()));
      data.extend_from_slice(bytemuck::bytes_of(&n.to_array()));
    }
    Ok(Self {
      semantic: HalaVertexSemantic::PositionNormal,
      stride: 24,
      count: positions.len() as u32,
      data,
    })
  }

  /// Read the position of a vertex.
  /// param index: The vertex index.
  /// return: The position, None if the stream has no position or the index is out of range.
  pub fn get_position(&self, index: u32) -> Option<Vec3> {
    if !self.semantic.has_position() || index >= self.count {
      return None;
    }
    let start = index as usize * self.stride as usize;
    let bytes = self.data.get(start..start + 12)?;
    let mut xyz = [0.0f32; 3];
    for (i, chunk) in bytes.chunks_exact(4).enumerate() {
      xyz[i] = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Some(Vec3::from_array(xyz))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interleaved_stream_reads_positions() {
    let positions = [Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 5.0, 6.0)];
    let normals = [Vec3::Y, Vec3::Z];
    let stream = HalaVertexStream::from_positions_normals(&positions, &normals).unwrap();
    assert_eq!(stream.count, 2);
    assert_eq!(stream.data.len(), 48);
    assert_eq!(stream.get_position(1), Some(positions[1]));
    assert_eq!(stream.get_position(2), None);
  }

  #[test]
  fn rejects_ragged_data() {
    assert!(HalaVertexStream::new(HalaVertexSemantic::Position, 12, vec![0u8; 13]).is_err());
    assert!(HalaVertexStream::new(HalaVertexSemantic::PositionNormal, 12, vec![0u8; 24]).is_err());
  }

  #[test]
  fn unknown_semantic_is_corrupt() {
    assert!(HalaVertexSemantic::from_u32(99).is_err());
    assert_eq!(HalaVertexSemantic::from_u32(5).unwrap(), HalaVertexSemantic::PositionNormal);
  }
}
