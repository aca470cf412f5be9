use std::{slice, sync::Arc};

use ash::{khr::swapchain, vk};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    gpu::{GpuError, GpuResult, Presenter, SwapchainImage},
    vulkan::{device::VulkanDevice, queue::QueueFamilyIndices},
};

#[derive(Debug, Error)]
pub enum SwapchainSupportError {
    #[error("Failed to enumerate swapchain support: {0}")]
    EnumerateSwapchainSupportFailed(String),

    #[error("Failed to enumerate swapchain formats: {0}")]
    EnumerateSwapchainFormatsFailed(String),

    #[error("Failed to enumerate swapchain present modes: {0}")]
    EnumerateSwapchainPresentModesFailed(String),
}

pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

pub fn get_swapchain_support_details(
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    device: vk::PhysicalDevice,
) -> Result<SwapchainSupportDetails, SwapchainSupportError> {
    Ok(unsafe {
        SwapchainSupportDetails {
            capabilities: surface_loader
                .get_physical_device_surface_capabilities(device, surface)
                .map_err(|e| {
                    SwapchainSupportError::EnumerateSwapchainSupportFailed(e.to_string())
                })?,
            formats: surface_loader
                .get_physical_device_surface_formats(device, surface)
                .map_err(|e| {
                    SwapchainSupportError::EnumerateSwapchainFormatsFailed(e.to_string())
                })?,
            present_modes: surface_loader
                .get_physical_device_surface_present_modes(device, surface)
                .map_err(|e| {
                    SwapchainSupportError::EnumerateSwapchainPresentModesFailed(e.to_string())
                })?,
        }
    })
}

#[derive(Debug, Error)]
pub enum SwapchainManagerError {
    #[error("Surface reports no formats")]
    NoSurfaceFormats,

    #[error("Queue family indices are incomplete")]
    IncompleteQueueFamilies,

    #[error("Failed to create swapchain: {0}")]
    CreateSwapchainFailed(String),

    #[error("Failed to get swapchain images: {0}")]
    GetSwapchainImagesFailed(String),
}

pub struct SwapchainManager {
    pub swapchain_loader: swapchain::Device,
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_images: Vec<vk::Image>,
    pub preferred_surface_format: vk::Format,
    pub image_extent: vk::Extent2D,
    present_queue: vk::Queue,
    _device: Arc<VulkanDevice>,
}

impl SwapchainManager {
    pub fn new(
        window_size: vk::Extent2D,
        instance: &ash::Instance,
        surface: vk::SurfaceKHR,
        queue_family_indices: &QueueFamilyIndices,
        support_details: &SwapchainSupportDetails,
        device: &Arc<VulkanDevice>,
    ) -> Result<Self, SwapchainManagerError> {
        let mut min_image_count = support_details.capabilities.min_image_count + 1;
        if support_details.capabilities.max_image_count > 0
            && min_image_count > support_details.capabilities.max_image_count
        {
            min_image_count = support_details.capabilities.max_image_count;
        }

        let surface_format = select_preferred_surface_format(&support_details.formats)
            .ok_or(SwapchainManagerError::NoSurfaceFormats)?;
        let image_extent = determine_swapchain_extent(window_size, &support_details.capabilities);
        let present_mode = select_preferred_present_mode(&support_details.present_modes);

        let (graphics_index, present_index) = queue_family_indices
            .resolved()
            .ok_or(SwapchainManagerError::IncompleteQueueFamilies)?;
        let indices = [graphics_index, present_index];

        // Frames reach the swapchain by blit, never by rendering into it.
        let mut swapchain_create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(image_extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(support_details.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        if graphics_index != present_index {
            swapchain_create_info = swapchain_create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&indices);
        } else {
            swapchain_create_info =
                swapchain_create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE);
        }

        let swapchain_loader = swapchain::Device::new(instance, &device.device);

        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&swapchain_create_info, None)
                .map_err(|e| SwapchainManagerError::CreateSwapchainFailed(e.to_string()))
        }?;

        let swapchain_images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(SwapchainManagerError::GetSwapchainImagesFailed(e.to_string()));
            }
        };

        info!(
            images = swapchain_images.len(),
            width = image_extent.width,
            height = image_extent.height,
            format = ?surface_format.format,
            present_mode = ?present_mode,
            "Swapchain created"
        );

        Ok(Self {
            swapchain_loader,
            swapchain,
            swapchain_images,
            preferred_surface_format: surface_format.format,
            image_extent,
            present_queue: device.present_queue,
            _device: device.clone(),
        })
    }
}

impl Presenter for SwapchainManager {
    fn image_count(&self) -> usize {
        self.swapchain_images.len()
    }

    fn extent(&self) -> vk::Extent2D {
        self.image_extent
    }

    fn format(&self) -> vk::Format {
        self.preferred_surface_format
    }

    fn acquire_next_image(&mut self, fence: vk::Fence) -> GpuResult<SwapchainImage> {
        let (index, suboptimal) = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                vk::Semaphore::null(),
                fence,
            )
        }
        .map_err(GpuError::api("vkAcquireNextImageKHR"))?;

        if suboptimal {
            warn!(index, "Acquired swapchain image is suboptimal");
        }

        Ok(SwapchainImage {
            image: self.swapchain_images[index as usize],
            index,
        })
    }

    fn present(&mut self, image: SwapchainImage, wait_semaphore: vk::Semaphore) -> GpuResult<()> {
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(slice::from_ref(&wait_semaphore))
            .swapchains(slice::from_ref(&self.swapchain))
            .image_indices(slice::from_ref(&image.index));

        let suboptimal = unsafe {
            self.swapchain_loader
                .queue_present(self.present_queue, &present_info)
        }
        .map_err(GpuError::api("vkQueuePresentKHR"))?;

        if suboptimal {
            warn!(index = image.index, "Presented to a suboptimal swapchain");
        }
        Ok(())
    }
}

impl Drop for SwapchainManager {
    fn drop(&mut self) {
        unsafe {
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }
    }
}

fn select_preferred_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Option<&vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
}

fn determine_swapchain_extent(
    window_size: vk::Extent2D,
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let width = window_size.width.clamp(
        capabilities.min_image_extent.width,
        capabilities.max_image_extent.width,
    );
    let height = window_size.height.clamp(
        capabilities.min_image_extent.height,
        capabilities.max_image_extent.height,
    );
    vk::Extent2D { width, height }
}

fn select_preferred_present_mode(
    available_present_modes: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    if available_present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        // FIFO is guaranteed to be available on all platforms
        vk::PresentModeKHR::FIFO
    }
}
