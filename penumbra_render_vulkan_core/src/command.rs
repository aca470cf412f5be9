use std::sync::Arc;

use ash::vk;

use crate::gpu::{GpuDevice, GpuResult};

pub struct CommandPool<D: GpuDevice> {
    device: Arc<D>,
    pool: vk::CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,
}

impl<D: GpuDevice> CommandPool<D> {
    pub fn new(device: Arc<D>, command_buffer_count: u32) -> GpuResult<Self> {
        let pool = device.create_command_pool()?;
        let command_buffers = match device.allocate_command_buffers(pool, command_buffer_count) {
            Ok(buffers) => buffers,
            Err(e) => {
                device.destroy_command_pool(pool);
                return Err(e);
            }
        };

        Ok(Self {
            device,
            pool,
            command_buffers,
        })
    }

    pub fn command_buffer(&self, index: usize) -> Option<vk::CommandBuffer> {
        self.command_buffers.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.command_buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.command_buffers.is_empty()
    }
}

impl<D: GpuDevice> Drop for CommandPool<D> {
    fn drop(&mut self) {
        self.device.destroy_command_pool(self.pool);
    }
}
