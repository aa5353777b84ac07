pub mod recording;

use bitflags::bitflags;

use crate::error::HalaRendererError;

pub use recording::{HalaDeviceCommand, HalaRecordingDevice};

bitflags! {
  /// The usage of a device buffer.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
  pub struct HalaBufferUsageFlags: u32 {
    const TRANSFER_SRC = 1 << 0;
    const TRANSFER_DST = 1 << 1;
    const UNIFORM_BUFFER = 1 << 2;
    const STORAGE_BUFFER = 1 << 3;
    const VERTEX_BUFFER = 1 << 4;
    const INDEX_BUFFER = 1 << 5;
  }
}

/// Where the memory of a buffer lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HalaMemoryLocation {
  /// Device local, written only through copies.
  GpuOnly,
  /// Host visible, used for staging.
  CpuToGpu,
}

/// An opaque buffer handle given out by the rendering host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HalaBufferHandle(pub u64);

/// A read-only view of a buffer as consumed by the shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalaBufferView {
  pub buffer: HalaBufferHandle,
  /// The allocated size, already aligned.
  pub size: u64,
  /// The element stride, 0 for raw views.
  pub stride: u32,
  pub num_elements: u32,
}

/// The command submission interface of the rendering host.
/// Every recording call lands in the command stream of the current frame, in call order.
pub trait HalaDeviceTrait {
  /// Allocate a buffer.
  /// param size: The size in bytes.
  /// param usage: The usage flags.
  /// param location: The memory location.
  /// param debug_name: The debug name.
  /// return: The buffer handle.
  fn allocate_buffer(
    &mut self,
    size: u64,
    usage: HalaBufferUsageFlags,
    location: HalaMemoryLocation,
    debug_name: &str,
  ) -> Result<HalaBufferHandle, HalaRendererError>;

  /// Write host memory into a CpuToGpu buffer.
  /// param buffer: The buffer.
  /// param offset: The byte offset.
  /// param data: The data.
  /// return: The result.
  fn write_buffer(&mut self, buffer: HalaBufferHandle, offset: u64, data: &[u8]) -> Result<(), HalaRendererError>;

  /// Record a buffer to buffer copy.
  /// param src: The source buffer.
  /// param src_offset: The source byte offset.
  /// param dst: The destination buffer.
  /// param dst_offset: The destination byte offset.
  /// param size: The byte count.
  /// return: The result.
  fn copy_buffer(
    &mut self,
    src: HalaBufferHandle,
    src_offset: u64,
    dst: HalaBufferHandle,
    dst_offset: u64,
    size: u64,
  ) -> Result<(), HalaRendererError>;

  /// Bind a buffer to a root slot.
  fn bind_buffer(&mut self, buffer: HalaBufferHandle, slot: u32) -> Result<(), HalaRendererError>;

  /// Set 32 bits root constants.
  /// param slot: The root slot.
  /// param offset: The first constant in the slot.
  /// param values: The constants.
  /// return: The result.
  fn push_constants(&mut self, slot: u32, offset: u32, values: &[u32]) -> Result<(), HalaRendererError>;

  /// Record a mesh shader dispatch.
  fn dispatch_mesh(&mut self, group_x: u32, group_y: u32, group_z: u32) -> Result<(), HalaRendererError>;

  /// Release a buffer. The caller guarantees no outstanding GPU work references it.
  fn free_buffer(&mut self, buffer: HalaBufferHandle);

  /// The placement alignment of constant and structured buffers.
  fn constant_buffer_alignment(&self) -> u64 {
    256
  }
}

/// Round the size up to the alignment.
/// param size: The size.
/// param alignment: The alignment, a power of two.
/// return: The aligned size.
pub fn align_up(size: u64, alignment: u64) -> u64 {
  if alignment <= 1 {
    return size;
  }
  (size + alignment - 1) & !(alignment - 1)
}

/// An integer version of ceil(value / divisor).
pub fn div_round_up(value: u64, divisor: u64) -> u64 {
  value.div_ceil(divisor)
}
