pub mod device;
pub mod gpu;
pub mod instance;
pub mod memory;
pub mod physical_device;
pub mod queue;
pub mod surface;
pub mod swapchain;
