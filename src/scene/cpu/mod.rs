pub mod mesh;
pub mod model;

pub use mesh::{HalaMeshletAsset, HalaMeshletAssetDesc};
pub use model::HalaModelLods;
