use std::sync::Arc;

use ash::vk;
use thiserror::Error;
use tracing::info;
use winit::window::Window;

use crate::vulkan::{
    device::{DeviceError, VulkanDevice},
    instance::{VulkanInstanceManager, VulkanInstanceManagerError},
    physical_device::{PhysicalDeviceManager, PhysicalDeviceManagerError},
    surface::{SurfaceManager, SurfaceManagerError},
    swapchain::{
        SwapchainManager, SwapchainManagerError, SwapchainSupportError,
        get_swapchain_support_details,
    },
};

#[derive(Debug, Error)]
pub enum GraphicsContextError {
    #[error("Failed to load Vulkan entry: {0}")]
    EntryLoadFailed(String),

    #[error(transparent)]
    Instance(#[from] VulkanInstanceManagerError),

    #[error(transparent)]
    Surface(#[from] SurfaceManagerError),

    #[error(transparent)]
    PhysicalDevice(#[from] PhysicalDeviceManagerError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    SwapchainSupport(#[from] SwapchainSupportError),

    #[error(transparent)]
    Swapchain(#[from] SwapchainManagerError),
}

#[derive(Debug, Clone)]
pub struct GraphicsContextConfig {
    pub app_name: String,
    pub enable_validation: bool,
}

impl Default for GraphicsContextConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("penumbra"),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

/// Fields drop in declaration order: surface first, entry last.
pub struct InstanceStack {
    pub surface: SurfaceManager,
    pub instance: VulkanInstanceManager,
    _entry: ash::Entry,
}

/// The device owns a share of the instance stack. Whoever drops the last
/// device reference (the context, a pass, a drawable) also releases the
/// instance, so `vkDestroyDevice` always runs before `vkDestroyInstance`.
pub struct GraphicsContext {
    device: Arc<VulkanDevice>,
    physical_device: PhysicalDeviceManager,
    instance_stack: Arc<InstanceStack>,
}

impl GraphicsContext {
    pub fn new(window: &Window, config: &GraphicsContextConfig) -> Result<Self, GraphicsContextError> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GraphicsContextError::EntryLoadFailed(e.to_string()))?;

        let instance =
            VulkanInstanceManager::new(&entry, window, &config.app_name, config.enable_validation)?;
        let surface = SurfaceManager::new(&entry, &instance, window)?;
        let physical_device = PhysicalDeviceManager::new(&instance, &surface)?;
        let instance_stack = Arc::new(InstanceStack {
            surface,
            instance,
            _entry: entry,
        });
        let device = Arc::new(VulkanDevice::new(instance_stack.clone(), &physical_device)?);

        info!(device = %physical_device.device_name, "Graphics context ready");

        Ok(Self {
            device,
            physical_device,
            instance_stack,
        })
    }

    pub fn device(&self) -> &Arc<VulkanDevice> {
        &self.device
    }

    pub fn create_swapchain(&self, window: &Window) -> Result<SwapchainManager, GraphicsContextError> {
        let surface = &self.instance_stack.surface;
        let support_details = get_swapchain_support_details(
            &surface.surface_loader,
            surface.surface,
            self.physical_device.physical_device,
        )?;

        let size = window.inner_size();
        let swapchain = SwapchainManager::new(
            vk::Extent2D {
                width: size.width,
                height: size.height,
            },
            &self.instance_stack.instance.instance,
            surface.surface,
            &self.physical_device.queue_family_indices,
            &support_details,
            &self.device,
        )?;
        Ok(swapchain)
    }
}
