pub mod meshlet_loader;
pub mod gpu_uploader;

pub use meshlet_loader::{
  HalaMeshletLoader,
  HalaMeshletWriter,
  MESHLET_FILE_MAGIC,
  MESHLET_FILE_VERSION,
};
pub use gpu_uploader::HalaMeshletGPUUploader;
