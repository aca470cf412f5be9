use ash::vk;

#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    pub command_buffer: vk::CommandBuffer,
}
