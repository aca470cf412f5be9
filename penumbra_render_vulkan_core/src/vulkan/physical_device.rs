use std::ffi::CStr;

use ash::{khr, vk};
use thiserror::Error;
use tracing::{debug, info};

use crate::vulkan::{
    instance::VulkanInstanceManager,
    queue::{QueueFamilyIndices, find_queue_family_indices},
    surface::SurfaceManager,
    swapchain::get_swapchain_support_details,
};

#[derive(Debug, Error)]
pub enum PhysicalDeviceManagerError {
    #[error("Failed to enumerate physical devices: {0}")]
    EnumeratePhysicalDevicesFailed(String),

    #[error("Failed to find a suitable GPU")]
    FindSuitableGpuFailed,
}

pub fn get_required_device_extensions() -> Vec<&'static CStr> {
    let mut extensions = vec![khr::swapchain::NAME];
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        extensions.push(ash::khr::portability_subset::NAME);
    }
    extensions
}

pub struct PhysicalDeviceManager {
    pub physical_device: vk::PhysicalDevice,
    pub queue_family_indices: QueueFamilyIndices,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub device_name: String,
}

impl PhysicalDeviceManager {
    pub fn new(
        instance_manager: &VulkanInstanceManager,
        surface_manager: &SurfaceManager,
    ) -> Result<Self, PhysicalDeviceManagerError> {
        let instance = &instance_manager.instance;
        let physical_devices = unsafe {
            instance.enumerate_physical_devices().map_err(|e| {
                PhysicalDeviceManagerError::EnumeratePhysicalDevicesFailed(e.to_string())
            })?
        };

        let (physical_device, queue_family_indices, properties) = physical_devices
            .into_iter()
            .filter_map(|physical_device| {
                let properties = unsafe { instance.get_physical_device_properties(physical_device) };
                let name = device_name(&properties);

                let queue_family_indices = find_queue_family_indices(
                    instance,
                    &surface_manager.surface_loader,
                    surface_manager.surface,
                    physical_device,
                );
                let suitable = queue_family_indices.is_complete()
                    && properties.api_version >= vk::API_VERSION_1_3
                    && check_device_extension_support(instance, physical_device)
                    && check_required_features(instance, physical_device)
                    && get_swapchain_support_details(
                        &surface_manager.surface_loader,
                        surface_manager.surface,
                        physical_device,
                    )
                    .map(|details| !details.formats.is_empty() && !details.present_modes.is_empty())
                    .unwrap_or(false);

                debug!(device = %name, suitable, "Evaluated physical device");
                suitable.then_some((physical_device, queue_family_indices, properties))
            })
            .max_by_key(|(_, _, properties)| device_type_rank(properties.device_type))
            .ok_or(PhysicalDeviceManagerError::FindSuitableGpuFailed)?;

        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let device_name = device_name(&properties);
        info!(device = %device_name, "Selected physical device");

        Ok(Self {
            physical_device,
            queue_family_indices,
            memory_properties,
            device_name,
        })
    }
}

fn device_name(properties: &vk::PhysicalDeviceProperties) -> String {
    properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| String::from("<unnamed>"))
}

fn device_type_rank(device_type: vk::PhysicalDeviceType) -> u8 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 3,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 1,
        _ => 0,
    }
}

fn check_device_extension_support(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let available_extensions = unsafe {
        instance
            .enumerate_device_extension_properties(device)
            .unwrap_or_default()
    };

    get_required_device_extensions().iter().all(|required| {
        available_extensions
            .iter()
            .any(|ext| ext.extension_name_as_c_str().is_ok_and(|name| name == *required))
    })
}

/// Dynamic rendering and synchronization2 are required by every pass.
fn check_required_features(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
    let mut features = vk::PhysicalDeviceFeatures2::default().push_next(&mut features13);
    unsafe { instance.get_physical_device_features2(device, &mut features) };

    features13.dynamic_rendering == vk::TRUE && features13.synchronization2 == vk::TRUE
}
