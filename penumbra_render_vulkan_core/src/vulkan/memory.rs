use ash::vk;

use crate::gpu::{GpuError, GpuResult};

pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> GpuResult<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            (type_filter & (1 << i)) != 0
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or(GpuError::FindSuitableMemoryTypeFailed)
}

fn allocate(
    device: &ash::Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    requirements: vk::MemoryRequirements,
    flags: vk::MemoryPropertyFlags,
) -> GpuResult<vk::DeviceMemory> {
    let memory_type_index =
        find_memory_type(memory_properties, requirements.memory_type_bits, flags)?;

    let alloc_info = vk::MemoryAllocateInfo::default()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    unsafe { device.allocate_memory(&alloc_info, None) }.map_err(GpuError::api("vkAllocateMemory"))
}

pub fn create_image_with_memory(
    device: &ash::Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    image_info: &vk::ImageCreateInfo,
    memory_flags: vk::MemoryPropertyFlags,
) -> GpuResult<(vk::Image, vk::DeviceMemory)> {
    let image = unsafe { device.create_image(image_info, None) }
        .map_err(GpuError::api("vkCreateImage"))?;

    let requirements = unsafe { device.get_image_memory_requirements(image) };
    let memory = match allocate(device, memory_properties, requirements, memory_flags) {
        Ok(memory) => memory,
        Err(e) => {
            unsafe { device.destroy_image(image, None) };
            return Err(e);
        }
    };

    if let Err(e) = unsafe { device.bind_image_memory(image, memory, 0) } {
        unsafe {
            device.destroy_image(image, None);
            device.free_memory(memory, None);
        }
        return Err(GpuError::api("vkBindImageMemory")(e));
    }

    Ok((image, memory))
}

pub fn create_buffer_with_memory(
    device: &ash::Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_flags: vk::MemoryPropertyFlags,
) -> GpuResult<(vk::Buffer, vk::DeviceMemory)> {
    let buffer_info = vk::BufferCreateInfo::default()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe { device.create_buffer(&buffer_info, None) }
        .map_err(GpuError::api("vkCreateBuffer"))?;

    let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
    let memory = match allocate(device, memory_properties, requirements, memory_flags) {
        Ok(memory) => memory,
        Err(e) => {
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(e);
        }
    };

    if let Err(e) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
        unsafe {
            device.destroy_buffer(buffer, None);
            device.free_memory(memory, None);
        }
        return Err(GpuError::api("vkBindBufferMemory")(e));
    }

    Ok((buffer, memory))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, flag) in flags.iter().enumerate() {
            properties.memory_types[i].property_flags = *flag;
        }
        properties
    }

    #[test]
    fn picks_first_type_matching_filter_and_flags() {
        let properties = properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        let index = find_memory_type(
            &properties,
            0b110,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .unwrap();
        assert_eq!(index, 1);

        let index = find_memory_type(&properties, 0b100, vk::MemoryPropertyFlags::HOST_VISIBLE)
            .unwrap();
        assert_eq!(index, 2);
    }

    #[test]
    fn missing_type_is_an_error() {
        let properties = properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let result = find_memory_type(&properties, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert!(matches!(
            result,
            Err(GpuError::FindSuitableMemoryTypeFailed)
        ));
    }
}
