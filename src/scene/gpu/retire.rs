use crate::device::{HalaBufferHandle, HalaDeviceTrait};

/// The index of a submitted frame. The host reports the last epoch whose GPU work has completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HalaEpoch(pub u64);

/// The implementation of the epoch.
impl HalaEpoch {
  pub fn next(self) -> Self {
    Self(self.0 + 1)
  }
}

/// Buffers waiting for the GPU to finish the work which may still reference them.
#[derive(Debug, Default)]
pub struct HalaRetireQueue {
  pending: Vec<(HalaEpoch, HalaBufferHandle)>,
}

/// The implementation of the retire queue.
impl HalaRetireQueue {
  pub fn new() -> Self {
    Self { pending: Vec::new() }
  }

  /// Hand a buffer over for release.
  /// param buffer: The buffer.
  /// param last_used: The last epoch which may reference the buffer.
  pub fn retire(&mut self, buffer: HalaBufferHandle, last_used: HalaEpoch) {
    self.pending.push((last_used, buffer));
  }

  pub fn retire_all<I: IntoIterator<Item = HalaBufferHandle>>(&mut self, buffers: I, last_used: HalaEpoch) {
    for buffer in buffers {
      self.retire(buffer, last_used);
    }
  }

  /// Free the buffers whose last use has completed.
  /// param device: The device.
  /// param completed: The last completed epoch.
  /// return: The number of freed buffers.
  pub fn collect<D: HalaDeviceTrait + ?Sized>(&mut self, device: &mut D, completed: HalaEpoch) -> usize {
    let before = self.pending.len();
    self.pending.retain(|(last_used, buffer)| {
      if *last_used <= completed {
        device.free_buffer(*buffer);
        false
      } else {
        true
      }
    });
    let freed = before - self.pending.len();
    if freed > 0 {
      log::debug!("Freed {} retired buffers up to epoch {}.", freed, completed.0);
    }
    freed
  }

  /// Free every buffer. The caller must have waited for the device to go idle.
  /// param device: The device.
  /// return: The number of freed buffers.
  pub fn drain<D: HalaDeviceTrait + ?Sized>(&mut self, device: &mut D) -> usize {
    let freed = self.pending.len();
    for (_, buffer) in self.pending.drain(..) {
      device.free_buffer(buffer);
    }
    freed
  }

  pub fn len(&self) -> usize {
    self.pending.len()
  }

  pub fn is_empty(&self) -> bool {
    self.pending.is_empty()
  }
}

impl Drop for HalaRetireQueue {
  fn drop(&mut self) {
    if !self.pending.is_empty() {
      log::warn!("A HalaRetireQueue is dropped with {} buffers never freed.", self.pending.len());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::device::{HalaBufferUsageFlags, HalaMemoryLocation, HalaRecordingDevice};

  fn allocate(device: &mut HalaRecordingDevice, name: &str) -> HalaBufferHandle {
    device.allocate_buffer(16, HalaBufferUsageFlags::STORAGE_BUFFER, HalaMemoryLocation::GpuOnly, name).unwrap()
  }

  #[test]
  fn frees_only_completed_epochs() {
    let mut device = HalaRecordingDevice::default();
    let mut queue = HalaRetireQueue::new();
    let a = allocate(&mut device, "a");
    let b = allocate(&mut device, "b");
    queue.retire(a, HalaEpoch(3));
    queue.retire(b, HalaEpoch(4).next());

    assert_eq!(queue.collect(&mut device, HalaEpoch(2)), 0);
    assert_eq!(queue.collect(&mut device, HalaEpoch(3)), 1);
    assert!(!device.is_live(a));
    assert!(device.is_live(b));
    assert_eq!(queue.collect(&mut device, HalaEpoch(3).next()), 0);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.drain(&mut device), 1);
    assert!(queue.is_empty());
    assert_eq!(device.live_buffer_count(), 0);
  }
}
