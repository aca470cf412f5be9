use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use ash::vk::{self, Handle};

use crate::gpu::{
    BlendMode, BlitDesc, DepthBias, DescriptorWrite, GpuBuffer, GpuDevice, GpuError, GpuImage,
    GpuResult, GraphicsPipelineDesc, ImageBarrier, ImageDesc, Presenter, RenderingDesc,
    SamplerDesc, SwapchainImage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Image,
    Sampler,
    Buffer,
    DescriptorSetLayout,
    DescriptorPool,
    PipelineLayout,
    Pipeline,
    CommandPool,
    Fence,
    Semaphore,
}

/// Device calls other than creations that tests can make fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCall {
    WriteBuffer,
    BeginCommandBuffer,
    EndCommandBuffer,
    Submit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    Begin(vk::CommandBuffer),
    End(vk::CommandBuffer),
    Reset(vk::CommandBuffer),
    Barrier(ImageBarrier),
    BeginRendering(RenderingDesc),
    EndRendering,
    SetViewportAndScissor(vk::Extent2D),
    BindPipeline(vk::Pipeline),
    BindDescriptorSets {
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: Vec<vk::DescriptorSet>,
    },
    PushConstants {
        layout: vk::PipelineLayout,
        offset: u32,
        bytes: Vec<u8>,
    },
    BindVertexBuffer(vk::Buffer),
    Draw {
        vertex_count: u32,
    },
    Blit(BlitDesc),
    ResetFence(vk::Fence),
    WaitFence(vk::Fence),
    Submit {
        command_buffer: vk::CommandBuffer,
        signal_semaphores: Vec<vk::Semaphore>,
        fence: vk::Fence,
    },
    WaitIdle,
    Acquire {
        index: u32,
        fence: vk::Fence,
    },
    Present {
        index: u32,
        wait_semaphore: vk::Semaphore,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRecord {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub vertex_shader: Vec<u32>,
    pub fragment_shader: Vec<u32>,
    pub vertex_stride: u32,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_bias: Option<DepthBias>,
    pub depth_compare_op: vk::CompareOp,
    pub blend: BlendMode,
    pub color_formats: Vec<vk::Format>,
    pub depth_format: vk::Format,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineLayoutRecord {
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    /// `(stages, offset, size)` per range.
    pub push_constant_ranges: Vec<(vk::ShaderStageFlags, u32, u32)>,
}

#[derive(Default)]
struct TrackerState {
    next_handle: u64,
    live: HashMap<u64, ResourceKind>,
    invalid_destroys: usize,
    fail_next: Vec<ResourceKind>,
    failing_calls: Vec<DeviceCall>,
    commands: Vec<RecordedCommand>,
    buffers: HashMap<u64, Vec<u8>>,
    pipelines: Vec<PipelineRecord>,
    pipeline_layouts: HashMap<u64, PipelineLayoutRecord>,
    set_layout_bindings: HashMap<u64, Vec<(u32, vk::DescriptorType)>>,
    descriptor_writes: HashMap<u64, Vec<DescriptorWrite>>,
}

impl TrackerState {
    fn mint<H: Handle>(&mut self) -> H {
        self.next_handle += 1;
        H::from_raw(self.next_handle)
    }

    fn check_failure(&mut self, kind: ResourceKind) -> GpuResult<()> {
        if let Some(position) = self.fail_next.iter().position(|k| *k == kind) {
            self.fail_next.remove(position);
            return Err(GpuError::Api {
                call: "fake",
                result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            });
        }
        Ok(())
    }

    fn check_call(&mut self, call: DeviceCall) -> GpuResult<()> {
        if let Some(position) = self.failing_calls.iter().position(|c| *c == call) {
            self.failing_calls.remove(position);
            return Err(GpuError::Api {
                call: "fake",
                result: vk::Result::ERROR_DEVICE_LOST,
            });
        }
        Ok(())
    }

    fn create<H: Handle + Copy>(&mut self, kind: ResourceKind) -> GpuResult<H> {
        self.check_failure(kind)?;
        let handle: H = self.mint();
        self.live.insert(handle.as_raw(), kind);
        Ok(handle)
    }

    fn destroy(&mut self, raw: u64, kind: ResourceKind) {
        match self.live.remove(&raw) {
            Some(live_kind) if live_kind == kind => {}
            _ => self.invalid_destroys += 1,
        }
    }
}

#[derive(Default)]
pub struct TrackingDevice {
    state: Mutex<TrackerState>,
}

impl TrackingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, command: RecordedCommand) {
        self.state().commands.push(command);
    }

    pub fn mint<H: Handle>(&self) -> H {
        self.state().mint()
    }

    pub fn fake_command_buffer(&self) -> vk::CommandBuffer {
        self.mint()
    }

    /// Makes the next creation of `kind` fail with an API error.
    pub fn fail_next(&self, kind: ResourceKind) {
        self.state().fail_next.push(kind);
    }

    /// Makes the next `call` fail with `ERROR_DEVICE_LOST`.
    pub fn fail_next_call(&self, call: DeviceCall) {
        self.state().failing_calls.push(call);
    }

    pub fn live_count(&self) -> usize {
        self.state().live.len()
    }

    pub fn live_count_of(&self, kind: ResourceKind) -> usize {
        self.state().live.values().filter(|k| **k == kind).count()
    }

    pub fn live_resources(&self) -> Vec<(u64, ResourceKind)> {
        let mut live: Vec<_> = self.state().live.iter().map(|(r, k)| (*r, *k)).collect();
        live.sort_by_key(|(raw, _)| *raw);
        live
    }

    /// Destroy calls for handles that were never created or already freed.
    pub fn invalid_destroys(&self) -> usize {
        self.state().invalid_destroys
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.state().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state().commands.clear();
    }

    pub fn barriers_for(&self, image: vk::Image) -> Vec<ImageBarrier> {
        self.state()
            .commands
            .iter()
            .filter_map(|command| match command {
                RecordedCommand::Barrier(barrier) if barrier.image == image => Some(*barrier),
                _ => None,
            })
            .collect()
    }

    pub fn buffer_contents(&self, buffer: vk::Buffer) -> Option<Vec<u8>> {
        self.state().buffers.get(&buffer.as_raw()).cloned()
    }

    pub fn pipelines(&self) -> Vec<PipelineRecord> {
        self.state().pipelines.clone()
    }

    pub fn pipeline_layout(&self, layout: vk::PipelineLayout) -> Option<PipelineLayoutRecord> {
        self.state().pipeline_layouts.get(&layout.as_raw()).cloned()
    }

    pub fn set_layout_bindings(
        &self,
        layout: vk::DescriptorSetLayout,
    ) -> Option<Vec<(u32, vk::DescriptorType)>> {
        self.state().set_layout_bindings.get(&layout.as_raw()).cloned()
    }

    pub fn descriptor_writes(&self, set: vk::DescriptorSet) -> Vec<DescriptorWrite> {
        self.state()
            .descriptor_writes
            .get(&set.as_raw())
            .cloned()
            .unwrap_or_default()
    }
}

impl GpuDevice for TrackingDevice {
    fn create_image(&self, _desc: &ImageDesc) -> GpuResult<GpuImage> {
        let mut state = self.state();
        let image = state.create(ResourceKind::Image)?;
        Ok(GpuImage {
            image,
            memory: state.mint(),
            view: state.mint(),
        })
    }

    fn destroy_image(&self, image: &GpuImage) {
        self.state()
            .destroy(image.image.as_raw(), ResourceKind::Image);
    }

    fn create_sampler(&self, _desc: &SamplerDesc) -> GpuResult<vk::Sampler> {
        self.state().create(ResourceKind::Sampler)
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.state().destroy(sampler.as_raw(), ResourceKind::Sampler);
    }

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        _usage: vk::BufferUsageFlags,
    ) -> GpuResult<GpuBuffer> {
        let mut state = self.state();
        let buffer: vk::Buffer = state.create(ResourceKind::Buffer)?;
        state
            .buffers
            .insert(buffer.as_raw(), vec![0; size as usize]);
        Ok(GpuBuffer {
            buffer,
            memory: state.mint(),
            size,
        })
    }

    fn write_buffer(&self, buffer: &GpuBuffer, bytes: &[u8]) -> GpuResult<()> {
        if bytes.len() as vk::DeviceSize > buffer.size {
            return Err(GpuError::BufferOverflow {
                len: bytes.len(),
                size: buffer.size,
            });
        }
        let mut state = self.state();
        state.check_call(DeviceCall::WriteBuffer)?;
        if let Some(contents) = state.buffers.get_mut(&buffer.buffer.as_raw()) {
            contents[..bytes.len()].copy_from_slice(bytes);
        }
        Ok(())
    }

    fn destroy_buffer(&self, buffer: &GpuBuffer) {
        let mut state = self.state();
        state.buffers.remove(&buffer.buffer.as_raw());
        state.destroy(buffer.buffer.as_raw(), ResourceKind::Buffer);
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    ) -> GpuResult<vk::DescriptorSetLayout> {
        let mut state = self.state();
        let layout: vk::DescriptorSetLayout = state.create(ResourceKind::DescriptorSetLayout)?;
        state.set_layout_bindings.insert(
            layout.as_raw(),
            bindings
                .iter()
                .map(|b| (b.binding, b.descriptor_type))
                .collect(),
        );
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.state()
            .destroy(layout.as_raw(), ResourceKind::DescriptorSetLayout);
    }

    fn create_descriptor_pool(
        &self,
        _pool_sizes: &[vk::DescriptorPoolSize],
        _max_sets: u32,
    ) -> GpuResult<vk::DescriptorPool> {
        self.state().create(ResourceKind::DescriptorPool)
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.state()
            .destroy(pool.as_raw(), ResourceKind::DescriptorPool);
    }

    fn allocate_descriptor_set(
        &self,
        _pool: vk::DescriptorPool,
        _layout: vk::DescriptorSetLayout,
    ) -> GpuResult<vk::DescriptorSet> {
        Ok(self.mint())
    }

    fn write_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        self.state()
            .descriptor_writes
            .entry(set.as_raw())
            .or_default()
            .extend_from_slice(writes);
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> GpuResult<vk::PipelineLayout> {
        let mut state = self.state();
        let layout: vk::PipelineLayout = state.create(ResourceKind::PipelineLayout)?;
        state.pipeline_layouts.insert(
            layout.as_raw(),
            PipelineLayoutRecord {
                set_layouts: set_layouts.to_vec(),
                push_constant_ranges: push_constant_ranges
                    .iter()
                    .map(|r| (r.stage_flags, r.offset, r.size))
                    .collect(),
            },
        );
        Ok(layout)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.state()
            .destroy(layout.as_raw(), ResourceKind::PipelineLayout);
    }

    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> GpuResult<vk::Pipeline> {
        let mut state = self.state();
        let pipeline: vk::Pipeline = state.create(ResourceKind::Pipeline)?;
        state.pipelines.push(PipelineRecord {
            pipeline,
            layout: desc.layout,
            vertex_shader: desc.vertex_shader.to_vec(),
            fragment_shader: desc.fragment_shader.to_vec(),
            vertex_stride: desc.vertex_layout.stride,
            cull_mode: desc.cull_mode,
            front_face: desc.front_face,
            depth_bias: desc.depth_bias,
            depth_compare_op: desc.depth_compare_op,
            blend: desc.blend,
            color_formats: desc.color_formats.to_vec(),
            depth_format: desc.depth_format,
        });
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.state()
            .destroy(pipeline.as_raw(), ResourceKind::Pipeline);
    }

    fn create_command_pool(&self) -> GpuResult<vk::CommandPool> {
        self.state().create(ResourceKind::CommandPool)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.state()
            .destroy(pool.as_raw(), ResourceKind::CommandPool);
    }

    fn allocate_command_buffers(
        &self,
        _pool: vk::CommandPool,
        count: u32,
    ) -> GpuResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state();
        Ok((0..count).map(|_| state.mint()).collect())
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> GpuResult<()> {
        self.state().check_call(DeviceCall::BeginCommandBuffer)?;
        self.record(RecordedCommand::Begin(command_buffer));
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> GpuResult<()> {
        self.state().check_call(DeviceCall::EndCommandBuffer)?;
        self.record(RecordedCommand::End(command_buffer));
        Ok(())
    }

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> GpuResult<()> {
        self.record(RecordedCommand::Reset(command_buffer));
        Ok(())
    }

    fn cmd_image_barrier(&self, _command_buffer: vk::CommandBuffer, barrier: &ImageBarrier) {
        self.record(RecordedCommand::Barrier(*barrier));
    }

    fn cmd_begin_rendering(&self, _command_buffer: vk::CommandBuffer, desc: &RenderingDesc) {
        self.record(RecordedCommand::BeginRendering(*desc));
    }

    fn cmd_end_rendering(&self, _command_buffer: vk::CommandBuffer) {
        self.record(RecordedCommand::EndRendering);
    }

    fn cmd_set_viewport_and_scissor(
        &self,
        _command_buffer: vk::CommandBuffer,
        extent: vk::Extent2D,
    ) {
        self.record(RecordedCommand::SetViewportAndScissor(extent));
    }

    fn cmd_bind_pipeline(&self, _command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.record(RecordedCommand::BindPipeline(pipeline));
    }

    fn cmd_bind_descriptor_sets(
        &self,
        _command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        self.record(RecordedCommand::BindDescriptorSets {
            layout,
            first_set,
            sets: sets.to_vec(),
        });
    }

    fn cmd_push_constants(
        &self,
        _command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        offset: u32,
        bytes: &[u8],
    ) {
        self.record(RecordedCommand::PushConstants {
            layout,
            offset,
            bytes: bytes.to_vec(),
        });
    }

    fn cmd_bind_vertex_buffer(&self, _command_buffer: vk::CommandBuffer, buffer: vk::Buffer) {
        self.record(RecordedCommand::BindVertexBuffer(buffer));
    }

    fn cmd_draw(&self, _command_buffer: vk::CommandBuffer, vertex_count: u32) {
        self.record(RecordedCommand::Draw { vertex_count });
    }

    fn cmd_blit_image(&self, _command_buffer: vk::CommandBuffer, desc: &BlitDesc) {
        self.record(RecordedCommand::Blit(*desc));
    }

    fn create_fence(&self, _signaled: bool) -> GpuResult<vk::Fence> {
        self.state().create(ResourceKind::Fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        self.state().destroy(fence.as_raw(), ResourceKind::Fence);
    }

    fn reset_fence(&self, fence: vk::Fence) -> GpuResult<()> {
        self.record(RecordedCommand::ResetFence(fence));
        Ok(())
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout: u64) -> GpuResult<()> {
        self.record(RecordedCommand::WaitFence(fence));
        Ok(())
    }

    fn create_semaphore(&self) -> GpuResult<vk::Semaphore> {
        self.state().create(ResourceKind::Semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state()
            .destroy(semaphore.as_raw(), ResourceKind::Semaphore);
    }

    fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        signal_semaphores: &[vk::Semaphore],
        fence: vk::Fence,
    ) -> GpuResult<()> {
        self.state().check_call(DeviceCall::Submit)?;
        self.record(RecordedCommand::Submit {
            command_buffer,
            signal_semaphores: signal_semaphores.to_vec(),
            fence,
        });
        Ok(())
    }

    fn wait_idle(&self) -> GpuResult<()> {
        self.record(RecordedCommand::WaitIdle);
        Ok(())
    }
}

pub struct FakeSwapchain {
    device: Arc<TrackingDevice>,
    images: Vec<vk::Image>,
    extent: vk::Extent2D,
    format: vk::Format,
    next: usize,
    /// Forces the next acquire to fail with `ERROR_OUT_OF_DATE_KHR`.
    pub out_of_date: bool,
}

impl FakeSwapchain {
    pub fn new(
        device: Arc<TrackingDevice>,
        image_count: usize,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> Self {
        let images = (0..image_count).map(|_| device.mint()).collect();
        Self {
            device,
            images,
            extent,
            format,
            next: 0,
            out_of_date: false,
        }
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }
}

impl Presenter for FakeSwapchain {
    fn image_count(&self) -> usize {
        self.images.len()
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn format(&self) -> vk::Format {
        self.format
    }

    fn acquire_next_image(&mut self, fence: vk::Fence) -> GpuResult<SwapchainImage> {
        if std::mem::take(&mut self.out_of_date) {
            return Err(GpuError::api("vkAcquireNextImageKHR")(
                vk::Result::ERROR_OUT_OF_DATE_KHR,
            ));
        }
        let index = self.next;
        self.next = (self.next + 1) % self.images.len();
        self.device.record(RecordedCommand::Acquire {
            index: index as u32,
            fence,
        });
        Ok(SwapchainImage {
            image: self.images[index],
            index: index as u32,
        })
    }

    fn present(&mut self, image: SwapchainImage, wait_semaphore: vk::Semaphore) -> GpuResult<()> {
        self.device.record(RecordedCommand::Present {
            index: image.index,
            wait_semaphore,
        });
        Ok(())
    }
}
