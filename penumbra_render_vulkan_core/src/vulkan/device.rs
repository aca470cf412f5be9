use std::sync::Arc;

use ash::vk;
use thiserror::Error;
use tracing::debug;

use crate::{
    context::InstanceStack,
    vulkan::physical_device::{PhysicalDeviceManager, get_required_device_extensions},
};

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Queue family indices are incomplete")]
    IncompleteQueueFamilies,

    #[error("Failed to create device: {0}")]
    CreateDeviceFailed(String),
}

/// Holds a share of the instance stack, so the instance and surface are
/// destroyed only after the last clone of the device is dropped.
pub struct VulkanDevice {
    pub device: ash::Device,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub graphics_queue_family_index: u32,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    instance_stack: Arc<InstanceStack>,
}

impl VulkanDevice {
    pub fn new(
        instance_stack: Arc<InstanceStack>,
        physical_device: &PhysicalDeviceManager,
    ) -> Result<Self, DeviceError> {
        let instance = &instance_stack.instance.instance;
        let (graphics_index, present_index) = physical_device
            .queue_family_indices
            .resolved()
            .ok_or(DeviceError::IncompleteQueueFamilies)?;

        let queue_priority = [1.0f32];
        let mut queue_infos = vec![
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_index)
                .queue_priorities(&queue_priority),
        ];
        if graphics_index != present_index {
            queue_infos.push(
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(present_index)
                    .queue_priorities(&queue_priority),
            );
        }

        let raw_required_device_extensions: Vec<*const i8> = get_required_device_extensions()
            .iter()
            .map(|s| s.as_ptr())
            .collect();

        let mut features13 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let device_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&raw_required_device_extensions)
            .push_next(&mut features13);

        let device = unsafe {
            instance
                .create_device(physical_device.physical_device, &device_info, None)
                .map_err(|e| DeviceError::CreateDeviceFailed(e.to_string()))?
        };

        let graphics_queue = unsafe { device.get_device_queue(graphics_index, 0) };
        let present_queue = unsafe { device.get_device_queue(present_index, 0) };

        debug!(graphics_index, present_index, "Logical device created");

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            graphics_queue_family_index: graphics_index,
            memory_properties: physical_device.memory_properties,
            instance_stack,
        })
    }

    pub fn instance_stack(&self) -> &Arc<InstanceStack> {
        &self.instance_stack
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
        }
    }
}
