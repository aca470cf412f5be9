use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::gpu::{GpuDevice, GpuResult};

pub struct Fence<D: GpuDevice> {
    device: Arc<D>,
    fence: vk::Fence,
}

impl<D: GpuDevice> Fence<D> {
    pub fn new(device: Arc<D>, signaled: bool) -> GpuResult<Self> {
        let fence = device.create_fence(signaled)?;
        debug!(?fence, signaled, "Fence created");
        Ok(Self { device, fence })
    }

    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    pub fn reset(&self) -> GpuResult<()> {
        self.device.reset_fence(self.fence)
    }

    pub fn wait(&self, timeout: u64) -> GpuResult<()> {
        self.device.wait_for_fence(self.fence, timeout)
    }
}

impl<D: GpuDevice> Drop for Fence<D> {
    fn drop(&mut self) {
        self.device.destroy_fence(self.fence);
    }
}

pub struct Semaphore<D: GpuDevice> {
    device: Arc<D>,
    semaphore: vk::Semaphore,
}

impl<D: GpuDevice> Semaphore<D> {
    pub fn new(device: Arc<D>) -> GpuResult<Self> {
        let semaphore = device.create_semaphore()?;
        debug!(?semaphore, "Semaphore created");
        Ok(Self { device, semaphore })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl<D: GpuDevice> Drop for Semaphore<D> {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.semaphore);
    }
}
