pub mod mesh;
pub mod retire;

pub use mesh::{HalaMeshletMesh, HalaVertexBuffer};
pub use retire::{HalaEpoch, HalaRetireQueue};
