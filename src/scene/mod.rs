pub mod loader;
pub mod vertex;
pub mod bounds;
pub mod meshlet;
pub mod cpu;
pub mod gpu;

pub use vertex::{HalaVertexSemantic, HalaVertexStream};
pub use bounds::HalaBoundingSphere;
pub use meshlet::{
  HalaMeshlet,
  HalaPackedTriangle,
  HalaCullData,
  HalaSubset,
  HalaMeshInfo,
};
