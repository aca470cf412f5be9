use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("Graphics API call {call} failed: {result}")]
    Api {
        call: &'static str,
        result: vk::Result,
    },

    #[error("Failed to find suitable memory type")]
    FindSuitableMemoryTypeFailed,

    #[error("Buffer write of {len} bytes exceeds buffer size {size}")]
    BufferOverflow { len: usize, size: vk::DeviceSize },
}

impl GpuError {
    pub fn api(call: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Api { call, result }
    }

    pub fn is_out_of_date(&self) -> bool {
        matches!(
            self,
            Self::Api {
                result: vk::Result::ERROR_OUT_OF_DATE_KHR,
                ..
            }
        )
    }
}

pub type GpuResult<T> = Result<T, GpuError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuImage {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

/// A single-mip, single-layer 2D image with a matching view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerDesc {
    pub filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: vk::Filter::NEAREST,
            address_mode: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageAccess {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
}

impl StageAccess {
    pub const fn new(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        Self { stage, access }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: vk::Image,
    pub aspect: vk::ImageAspectFlags,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src: StageAccess,
    pub dst: StageAccess,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    Depth(f32),
}

impl ClearValue {
    pub fn to_vk(self) -> vk::ClearValue {
        match self {
            ClearValue::Color(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            ClearValue::Depth(depth) => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil: 0 },
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttachmentDesc {
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear: ClearValue,
}

impl AttachmentDesc {
    pub fn cleared(view: vk::ImageView, layout: vk::ImageLayout, clear: ClearValue) -> Self {
        Self {
            view,
            layout,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderingDesc {
    pub extent: vk::Extent2D,
    pub color: Option<AttachmentDesc>,
    pub depth: Option<AttachmentDesc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitDesc {
    pub src_image: vk::Image,
    pub src_layout: vk::ImageLayout,
    pub dst_image: vk::Image,
    pub dst_layout: vk::ImageLayout,
    pub extent: vk::Extent2D,
    pub filter: vk::Filter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: vk::Format,
    pub offset: u32,
}

/// Single interleaved vertex stream bound at binding 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: u32,
    pub attributes: &'static [VertexAttribute],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthBias {
    pub constant_factor: f32,
    pub clamp: f32,
    pub slope_factor: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Opaque,
    /// `src.a * src + (1 - src.a) * dst` for color, alpha taken from source.
    Alpha,
}

/// Dynamic-rendering graphics pipeline with dynamic viewport and scissor.
#[derive(Debug, Clone, Copy)]
pub struct GraphicsPipelineDesc<'a> {
    pub layout: vk::PipelineLayout,
    pub vertex_shader: &'a [u32],
    pub fragment_shader: &'a [u32],
    pub vertex_layout: VertexLayout,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_bias: Option<DepthBias>,
    pub depth_compare_op: vk::CompareOp,
    pub blend: BlendMode,
    pub color_formats: &'a [vk::Format],
    pub depth_format: vk::Format,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorWrite {
    UniformBuffer {
        binding: u32,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    },
    CombinedImageSampler {
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    },
}

pub trait GpuDevice {
    fn create_image(&self, desc: &ImageDesc) -> GpuResult<GpuImage>;
    fn destroy_image(&self, image: &GpuImage);
    fn create_sampler(&self, desc: &SamplerDesc) -> GpuResult<vk::Sampler>;
    fn destroy_sampler(&self, sampler: vk::Sampler);

    /// Host-visible, host-coherent buffer.
    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> GpuResult<GpuBuffer>;
    fn write_buffer(&self, buffer: &GpuBuffer, bytes: &[u8]) -> GpuResult<()>;
    fn destroy_buffer(&self, buffer: &GpuBuffer);

    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    ) -> GpuResult<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    fn create_descriptor_pool(
        &self,
        pool_sizes: &[vk::DescriptorPoolSize],
        max_sets: u32,
    ) -> GpuResult<vk::DescriptorPool>;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> GpuResult<vk::DescriptorSet>;
    fn write_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]);

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> GpuResult<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>)
    -> GpuResult<vk::Pipeline>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    fn create_command_pool(&self) -> GpuResult<vk::CommandPool>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> GpuResult<Vec<vk::CommandBuffer>>;
    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> GpuResult<()>;
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> GpuResult<()>;
    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> GpuResult<()>;

    fn cmd_image_barrier(&self, command_buffer: vk::CommandBuffer, barrier: &ImageBarrier);
    fn cmd_begin_rendering(&self, command_buffer: vk::CommandBuffer, desc: &RenderingDesc);
    fn cmd_end_rendering(&self, command_buffer: vk::CommandBuffer);
    fn cmd_set_viewport_and_scissor(&self, command_buffer: vk::CommandBuffer, extent: vk::Extent2D);
    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline);
    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    );
    /// Push constants are always visible to every shader stage.
    fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        offset: u32,
        bytes: &[u8],
    );
    fn cmd_bind_vertex_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer);
    fn cmd_draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32);
    fn cmd_blit_image(&self, command_buffer: vk::CommandBuffer, desc: &BlitDesc);

    fn create_fence(&self, signaled: bool) -> GpuResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    fn reset_fence(&self, fence: vk::Fence) -> GpuResult<()>;
    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> GpuResult<()>;
    fn create_semaphore(&self) -> GpuResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    /// Submits one command buffer to the graphics queue without wait
    /// semaphores. A null `fence` submits without a fence.
    fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        signal_semaphores: &[vk::Semaphore],
        fence: vk::Fence,
    ) -> GpuResult<()>;
    fn wait_idle(&self) -> GpuResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainImage {
    pub image: vk::Image,
    pub index: u32,
}

pub trait Presenter {
    fn image_count(&self) -> usize;
    fn extent(&self) -> vk::Extent2D;
    fn format(&self) -> vk::Format;
    fn acquire_next_image(&mut self, fence: vk::Fence) -> GpuResult<SwapchainImage>;
    fn present(&mut self, image: SwapchainImage, wait_semaphore: vk::Semaphore) -> GpuResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_names_the_call() {
        let error = GpuError::api("vkQueueSubmit")(vk::Result::ERROR_DEVICE_LOST);
        let message = error.to_string();
        assert!(message.contains("vkQueueSubmit"));
        assert!(!error.is_out_of_date());
    }

    #[test]
    fn out_of_date_is_detected() {
        let error = GpuError::api("vkAcquireNextImageKHR")(vk::Result::ERROR_OUT_OF_DATE_KHR);
        assert!(error.is_out_of_date());
    }

    #[test]
    fn cleared_attachment_stores_result() {
        let attachment = AttachmentDesc::cleared(
            vk::ImageView::null(),
            vk::ImageLayout::ATTACHMENT_OPTIMAL,
            ClearValue::Depth(1.0),
        );
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        let raw = attachment.clear.to_vk();
        assert_eq!(unsafe { raw.depth_stencil.depth }, 1.0);
    }
}
