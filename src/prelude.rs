pub use crate::error::{HalaRendererError, HalaRendererErrorKind};
pub use crate::config::{HalaMeshletCapacity, HalaMeshletRendererConfig};
pub use crate::device::{
  HalaBufferHandle,
  HalaBufferUsageFlags,
  HalaBufferView,
  HalaDeviceTrait,
  HalaMemoryLocation,
  HalaRecordingDevice,
};
pub use crate::scene::cpu::{
  HalaMeshletAsset,
  HalaMeshletAssetDesc,
  HalaModelLods,
};
pub use crate::scene::gpu::{
  HalaEpoch,
  HalaMeshletMesh,
  HalaRetireQueue,
};
pub use crate::scene::loader::{
  HalaMeshletGPUUploader,
  HalaMeshletLoader,
  HalaMeshletWriter,
};
pub use crate::instance::{HalaInstanceData, HalaInstancePlacer};
pub use crate::dispatch::{HalaDispatchBatcher, HalaDispatchDescriptor};
pub use crate::renderer::{HalaFrameStatistics, HalaMeshletRenderer};
