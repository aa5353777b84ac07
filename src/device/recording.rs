use std::collections::HashMap;

use crate::error::HalaRendererError;
use super::{
  HalaBufferHandle,
  HalaBufferUsageFlags,
  HalaDeviceTrait,
  HalaMemoryLocation,
};

/// A command captured by the recording device.
#[derive(Debug, Clone, PartialEq)]
pub enum HalaDeviceCommand {
  Allocate {
    buffer: HalaBufferHandle,
    size: u64,
    usage: HalaBufferUsageFlags,
    location: HalaMemoryLocation,
    name: String,
  },
  Write {
    buffer: HalaBufferHandle,
    offset: u64,
    size: u64,
  },
  Copy {
    src: HalaBufferHandle,
    src_offset: u64,
    dst: HalaBufferHandle,
    dst_offset: u64,
    size: u64,
  },
  Bind {
    buffer: HalaBufferHandle,
    slot: u32,
  },
  PushConstants {
    slot: u32,
    offset: u32,
    values: Vec<u32>,
  },
  DispatchMesh {
    group_x: u32,
    group_y: u32,
    group_z: u32,
  },
  Free {
    buffer: HalaBufferHandle,
  },
}

struct HalaRecordedBuffer {
  name: String,
  usage: HalaBufferUsageFlags,
  location: HalaMemoryLocation,
  data: Vec<u8>,
}

/// A device which records every command instead of talking to a GPU.
/// Copies are applied eagerly so the buffer contents can be inspected.
pub struct HalaRecordingDevice {
  buffers: HashMap<HalaBufferHandle, HalaRecordedBuffer>,
  next_handle: u64,
  alignment: u64,
  allocation_budget: Option<usize>,
  dispatch_budget: Option<usize>,
  pub commands: Vec<HalaDeviceCommand>,
}

impl Default for HalaRecordingDevice {
  fn default() -> Self {
    Self::new(256)
  }
}

/// The implementation of the recording device.
impl HalaRecordingDevice {
  /// Create a new recording device.
  /// param alignment: The constant buffer alignment it reports.
  /// return: The device.
  pub fn new(alignment: u64) -> Self {
    log::debug!("A HalaRecordingDevice is created.");
    Self {
      buffers: HashMap::new(),
      next_handle: 1,
      alignment,
      allocation_budget: None,
      dispatch_budget: None,
      commands: Vec::new(),
    }
  }

  /// Make every allocation after the next `count` ones fail.
  pub fn fail_allocations_after(&mut self, count: usize) {
    self.allocation_budget = Some(count);
  }

  /// Make every mesh dispatch after the next `count` ones fail.
  pub fn fail_dispatches_after(&mut self, count: usize) {
    self.dispatch_budget = Some(count);
  }

  pub fn live_buffer_count(&self) -> usize {
    self.buffers.len()
  }

  pub fn is_live(&self, buffer: HalaBufferHandle) -> bool {
    self.buffers.contains_key(&buffer)
  }

  /// Get the contents of a live buffer.
  pub fn buffer_data(&self, buffer: HalaBufferHandle) -> Option<&[u8]> {
    self.buffers.get(&buffer).map(|b| b.data.as_slice())
  }

  pub fn buffer_name(&self, buffer: HalaBufferHandle) -> Option<&str> {
    self.buffers.get(&buffer).map(|b| b.name.as_str())
  }

  pub fn buffer_usage(&self, buffer: HalaBufferHandle) -> Option<HalaBufferUsageFlags> {
    self.buffers.get(&buffer).map(|b| b.usage)
  }

  /// Find the live buffer by its debug name.
  pub fn find_buffer(&self, name: &str) -> Option<HalaBufferHandle> {
    self.buffers.iter().find(|(_, b)| b.name == name).map(|(handle, _)| *handle)
  }

  /// The dispatch commands recorded so far.
  pub fn dispatches(&self) -> Vec<(u32, u32, u32)> {
    self.commands.iter().filter_map(|command| match command {
      HalaDeviceCommand::DispatchMesh { group_x, group_y, group_z } => Some((*group_x, *group_y, *group_z)),
      _ => None,
    }).collect()
  }

  pub fn clear_commands(&mut self) {
    self.commands.clear();
  }

  fn get_live(&self, buffer: HalaBufferHandle) -> Result<&HalaRecordedBuffer, HalaRendererError> {
    self.buffers.get(&buffer).ok_or_else(|| HalaRendererError::device(
      &format!("The buffer {:?} is not alive.", buffer), None
    ))
  }

  fn check_range(buffer: &HalaRecordedBuffer, offset: u64, size: u64) -> Result<(), HalaRendererError> {
    if offset.checked_add(size).map_or(true, |end| end > buffer.data.len() as u64) {
      return Err(HalaRendererError::device(&format!(
        "The range [{}, +{}) is outside the buffer \"{}\" of {} bytes.", offset, size, buffer.name, buffer.data.len()
      ), None));
    }
    Ok(())
  }
}

/// The implementation of the device trait for the recording device.
impl HalaDeviceTrait for HalaRecordingDevice {
  fn allocate_buffer(
    &mut self,
    size: u64,
    usage: HalaBufferUsageFlags,
    location: HalaMemoryLocation,
    debug_name: &str,
  ) -> Result<HalaBufferHandle, HalaRendererError> {
    if let Some(budget) = self.allocation_budget.as_mut() {
      if *budget == 0 {
        return Err(HalaRendererError::device(&format!("Allocate buffer \"{}\" failed.", debug_name), None));
      }
      *budget -= 1;
    }
    let buffer = HalaBufferHandle(self.next_handle);
    self.next_handle += 1;
    self.buffers.insert(buffer, HalaRecordedBuffer {
      name: debug_name.to_string(),
      usage,
      location,
      data: vec![0u8; size as usize],
    });
    self.commands.push(HalaDeviceCommand::Allocate { buffer, size, usage, location, name: debug_name.to_string() });
    Ok(buffer)
  }

  fn write_buffer(&mut self, buffer: HalaBufferHandle, offset: u64, data: &[u8]) -> Result<(), HalaRendererError> {
    let target = self.get_live(buffer)?;
    if target.location != HalaMemoryLocation::CpuToGpu {
      return Err(HalaRendererError::device(&format!(
        "The buffer \"{}\" is not host visible.", target.name
      ), None));
    }
    Self::check_range(target, offset, data.len() as u64)?;
    if let Some(target) = self.buffers.get_mut(&buffer) {
      target.data[offset as usize..offset as usize + data.len()].copy_from_slice(data);
    }
    self.commands.push(HalaDeviceCommand::Write { buffer, offset, size: data.len() as u64 });
    Ok(())
  }

  fn copy_buffer(
    &mut self,
    src: HalaBufferHandle,
    src_offset: u64,
    dst: HalaBufferHandle,
    dst_offset: u64,
    size: u64,
  ) -> Result<(), HalaRendererError> {
    let source = self.get_live(src)?;
    Self::check_range(source, src_offset, size)?;
    let bytes = source.data[src_offset as usize..(src_offset + size) as usize].to_vec();
    let target = self.get_live(dst)?;
    Self::check_range(target, dst_offset, size)?;
    if let Some(target) = self.buffers.get_mut(&dst) {
      target.data[dst_offset as usize..(dst_offset + size) as usize].copy_from_slice(&bytes);
    }
    self.commands.push(HalaDeviceCommand::Copy { src, src_offset, dst, dst_offset, size });
    Ok(())
  }

  fn bind_buffer(&mut self, buffer: HalaBufferHandle, slot: u32) -> Result<(), HalaRendererError> {
    self.get_live(buffer)?;
    self.commands.push(HalaDeviceCommand::Bind { buffer, slot });
    Ok(())
  }

  fn push_constants(&mut self, slot: u32, offset: u32, values: &[u32]) -> Result<(), HalaRendererError> {
    self.commands.push(HalaDeviceCommand::PushConstants { slot, offset, values: values.to_vec() });
    Ok(())
  }

  fn dispatch_mesh(&mut self, group_x: u32, group_y: u32, group_z: u32) -> Result<(), HalaRendererError> {
    if group_x == 0 || group_y == 0 || group_z == 0 {
      return Err(HalaRendererError::device(&format!(
        "The dispatch ({}, {}, {}) is empty.", group_x, group_y, group_z
      ), None));
    }
    if let Some(budget) = self.dispatch_budget.as_mut() {
      if *budget == 0 {
        return Err(HalaRendererError::device(&format!(
          "Dispatch ({}, {}, {}) failed.", group_x, group_y, group_z
        ), None));
      }
      *budget -= 1;
    }
    self.commands.push(HalaDeviceCommand::DispatchMesh { group_x, group_y, group_z });
    Ok(())
  }

  fn free_buffer(&mut self, buffer: HalaBufferHandle) {
    if self.buffers.remove(&buffer).is_none() {
      log::warn!("Free the buffer {:?} which is not alive.", buffer);
    }
    self.commands.push(HalaDeviceCommand::Free { buffer });
  }

  fn constant_buffer_alignment(&self) -> u64 {
    self.alignment
  }
}

impl Drop for HalaRecordingDevice {
  fn drop(&mut self) {
    if !self.buffers.is_empty() {
      log::warn!("The HalaRecordingDevice is dropped with {} live buffers.", self.buffers.len());
    }
    log::debug!("A HalaRecordingDevice is dropped.");
  }
}
