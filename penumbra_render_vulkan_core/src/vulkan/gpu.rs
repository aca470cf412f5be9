use std::slice;

use ash::vk;

use crate::{
    gpu::{
        BlendMode, BlitDesc, DescriptorWrite, GpuBuffer, GpuDevice, GpuError, GpuImage, GpuResult,
        GraphicsPipelineDesc, ImageBarrier, ImageDesc, RenderingDesc, SamplerDesc,
    },
    vulkan::{
        device::VulkanDevice,
        memory::{create_buffer_with_memory, create_image_with_memory},
    },
};

fn full_rect(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

fn color_subresource_layers() -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .mip_level(0)
        .base_array_layer(0)
        .layer_count(1)
}

fn subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

fn to_rendering_attachment(
    attachment: &crate::gpu::AttachmentDesc,
) -> vk::RenderingAttachmentInfo<'static> {
    vk::RenderingAttachmentInfo::default()
        .image_view(attachment.view)
        .image_layout(attachment.layout)
        .load_op(attachment.load_op)
        .store_op(attachment.store_op)
        .clear_value(attachment.clear.to_vk())
}

impl VulkanDevice {
    fn create_shader_module(&self, code: &[u32]) -> GpuResult<vk::ShaderModule> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(code);
        unsafe { self.device.create_shader_module(&create_info, None) }
            .map_err(GpuError::api("vkCreateShaderModule"))
    }
}

impl GpuDevice for VulkanDevice {
    fn create_image(&self, desc: &ImageDesc) -> GpuResult<GpuImage> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let (image, memory) = create_image_with_memory(
            &self.device,
            &self.memory_properties,
            &image_info,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(desc.format)
            .subresource_range(subresource_range(desc.aspect));

        let view = match unsafe { self.device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe {
                    self.device.destroy_image(image, None);
                    self.device.free_memory(memory, None);
                }
                return Err(GpuError::api("vkCreateImageView")(e));
            }
        };

        Ok(GpuImage {
            image,
            memory,
            view,
        })
    }

    fn destroy_image(&self, image: &GpuImage) {
        unsafe {
            self.device.destroy_image_view(image.view, None);
            self.device.destroy_image(image.image, None);
            self.device.free_memory(image.memory, None);
        }
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> GpuResult<vk::Sampler> {
        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(desc.filter)
            .min_filter(desc.filter)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(desc.address_mode)
            .address_mode_v(desc.address_mode)
            .address_mode_w(desc.address_mode)
            .max_lod(1.0)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE);

        unsafe { self.device.create_sampler(&sampler_info, None) }
            .map_err(GpuError::api("vkCreateSampler"))
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) };
    }

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> GpuResult<GpuBuffer> {
        let (buffer, memory) = create_buffer_with_memory(
            &self.device,
            &self.memory_properties,
            size,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        Ok(GpuBuffer {
            buffer,
            memory,
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

        unsafe {
            let ptr = self
                .device
                .map_memory(
                    buffer.memory,
                    0,
                    bytes.len() as vk::DeviceSize,
                    vk::MemoryMapFlags::empty(),
                )
                .map_err(GpuError::api("vkMapMemory"))?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            self.device.unmap_memory(buffer.memory);
        }
        Ok(())
    }

    fn destroy_buffer(&self, buffer: &GpuBuffer) {
        unsafe {
            self.device.destroy_buffer(buffer.buffer, None);
            self.device.free_memory(buffer.memory, None);
        }
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    ) -> GpuResult<vk::DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        unsafe { self.device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(GpuError::api("vkCreateDescriptorSetLayout"))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) };
    }

    fn create_descriptor_pool(
        &self,
        pool_sizes: &[vk::DescriptorPoolSize],
        max_sets: u32,
    ) -> GpuResult<vk::DescriptorPool> {
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(pool_sizes)
            .max_sets(max_sets);
        unsafe { self.device.create_descriptor_pool(&pool_info, None) }
            .map_err(GpuError::api("vkCreateDescriptorPool"))
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) };
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> GpuResult<vk::DescriptorSet> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(slice::from_ref(&layout));
        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }
            .map_err(GpuError::api("vkAllocateDescriptorSets"))?;
        Ok(sets[0])
    }

    fn write_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        let buffer_infos: Vec<vk::DescriptorBufferInfo> = writes
            .iter()
            .map(|write| match *write {
                DescriptorWrite::UniformBuffer { buffer, range, .. } => {
                    vk::DescriptorBufferInfo::default()
                        .buffer(buffer)
                        .offset(0)
                        .range(range)
                }
                DescriptorWrite::CombinedImageSampler { .. } => vk::DescriptorBufferInfo::default(),
            })
            .collect();

        let image_infos: Vec<vk::DescriptorImageInfo> = writes
            .iter()
            .map(|write| match *write {
                DescriptorWrite::CombinedImageSampler {
                    view,
                    sampler,
                    layout,
                    ..
                } => vk::DescriptorImageInfo::default()
                    .image_view(view)
                    .sampler(sampler)
                    .image_layout(layout),
                DescriptorWrite::UniformBuffer { .. } => vk::DescriptorImageInfo::default(),
            })
            .collect();

        let raw_writes: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .enumerate()
            .map(|(i, write)| match *write {
                DescriptorWrite::UniformBuffer { binding, .. } => vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(slice::from_ref(&buffer_infos[i])),
                DescriptorWrite::CombinedImageSampler { binding, .. } => {
                    vk::WriteDescriptorSet::default()
                        .dst_set(set)
                        .dst_binding(binding)
                        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .image_info(slice::from_ref(&image_infos[i]))
                }
            })
            .collect();

        unsafe { self.device.update_descriptor_sets(&raw_writes, &[]) };
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> GpuResult<vk::PipelineLayout> {
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);
        unsafe { self.device.create_pipeline_layout(&layout_info, None) }
            .map_err(GpuError::api("vkCreatePipelineLayout"))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) };
    }

    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> GpuResult<vk::Pipeline> {
        let vertex_module = self.create_shader_module(desc.vertex_shader)?;
        let fragment_module = match self.create_shader_module(desc.fragment_shader) {
            Ok(module) => module,
            Err(e) => {
                unsafe { self.device.destroy_shader_module(vertex_module, None) };
                return Err(e);
            }
        };

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_module)
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_module)
                .name(c"main"),
        ];

        let binding_description = vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(desc.vertex_layout.stride)
            .input_rate(vk::VertexInputRate::VERTEX);

        let attribute_descriptions: Vec<vk::VertexInputAttributeDescription> = desc
            .vertex_layout
            .attributes
            .iter()
            .map(|attribute| {
                vk::VertexInputAttributeDescription::default()
                    .location(attribute.location)
                    .binding(0)
                    .format(attribute.format)
                    .offset(attribute.offset)
            })
            .collect();

        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(slice::from_ref(&binding_description))
            .vertex_attribute_descriptions(&attribute_descriptions);

        let input_assembly_info = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        let viewport_info = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let mut rasterizer_info = vk::PipelineRasterizationStateCreateInfo::default()
            .line_width(1.0)
            .front_face(desc.front_face)
            .cull_mode(desc.cull_mode)
            .polygon_mode(vk::PolygonMode::FILL);
        if let Some(bias) = desc.depth_bias {
            rasterizer_info = rasterizer_info
                .depth_bias_enable(true)
                .depth_bias_constant_factor(bias.constant_factor)
                .depth_bias_clamp(bias.clamp)
                .depth_bias_slope_factor(bias.slope_factor);
        }

        let multisampler_info = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil_info = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(desc.depth_compare_op);

        let blend_attachment = match desc.blend {
            BlendMode::Opaque => vk::PipelineColorBlendAttachmentState::default()
                .blend_enable(false)
                .color_write_mask(vk::ColorComponentFlags::RGBA),
            BlendMode::Alpha => vk::PipelineColorBlendAttachmentState::default()
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD)
                .color_write_mask(vk::ColorComponentFlags::RGBA),
        };
        let blend_attachments = vec![blend_attachment; desc.color_formats.len()];
        let color_blend_info =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state_info =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(desc.color_formats)
            .depth_attachment_format(desc.depth_format);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly_info)
            .viewport_state(&viewport_info)
            .rasterization_state(&rasterizer_info)
            .multisample_state(&multisampler_info)
            .depth_stencil_state(&depth_stencil_info)
            .color_blend_state(&color_blend_info)
            .dynamic_state(&dynamic_state_info)
            .layout(desc.layout)
            .push_next(&mut rendering_info);

        let result = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };

        unsafe {
            self.device.destroy_shader_module(vertex_module, None);
            self.device.destroy_shader_module(fragment_module, None);
        }

        let pipelines =
            result.map_err(|(_, e)| GpuError::api("vkCreateGraphicsPipelines")(e))?;
        Ok(pipelines[0])
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) };
    }

    fn create_command_pool(&self) -> GpuResult<vk::CommandPool> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(self.graphics_queue_family_index);
        unsafe { self.device.create_command_pool(&pool_info, None) }
            .map_err(GpuError::api("vkCreateCommandPool"))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) };
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> GpuResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .map_err(GpuError::api("vkAllocateCommandBuffers"))
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> GpuResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(command_buffer, &begin_info) }
            .map_err(GpuError::api("vkBeginCommandBuffer"))
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> GpuResult<()> {
        unsafe { self.device.end_command_buffer(command_buffer) }
            .map_err(GpuError::api("vkEndCommandBuffer"))
    }

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> GpuResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
        }
        .map_err(GpuError::api("vkResetCommandBuffer"))
    }

    fn cmd_image_barrier(&self, command_buffer: vk::CommandBuffer, barrier: &ImageBarrier) {
        let image_barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(barrier.src.stage)
            .src_access_mask(barrier.src.access)
            .dst_stage_mask(barrier.dst.stage)
            .dst_access_mask(barrier.dst.access)
            .old_layout(barrier.old_layout)
            .new_layout(barrier.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(barrier.image)
            .subresource_range(subresource_range(barrier.aspect));

        let dependency =
            vk::DependencyInfo::default().image_memory_barriers(slice::from_ref(&image_barrier));

        unsafe { self.device.cmd_pipeline_barrier2(command_buffer, &dependency) };
    }

    fn cmd_begin_rendering(&self, command_buffer: vk::CommandBuffer, desc: &RenderingDesc) {
        let color_attachments: Vec<vk::RenderingAttachmentInfo> =
            desc.color.iter().map(to_rendering_attachment).collect();
        let depth_attachment = desc.depth.as_ref().map(to_rendering_attachment);

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(full_rect(desc.extent))
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth_attachment) = depth_attachment.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth_attachment);
        }

        unsafe { self.device.cmd_begin_rendering(command_buffer, &rendering_info) };
    }

    fn cmd_end_rendering(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_rendering(command_buffer) };
    }

    fn cmd_set_viewport_and_scissor(&self, command_buffer: vk::CommandBuffer, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        unsafe {
            self.device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            self.device
                .cmd_set_scissor(command_buffer, 0, &[full_rect(extent)]);
        }
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline)
        };
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                first_set,
                sets,
                &[],
            )
        };
    }

    fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        offset: u32,
        bytes: &[u8],
    ) {
        unsafe {
            self.device.cmd_push_constants(
                command_buffer,
                layout,
                vk::ShaderStageFlags::ALL,
                offset,
                bytes,
            )
        };
    }

    fn cmd_bind_vertex_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(command_buffer, 0, &[buffer], &[0])
        };
    }

    fn cmd_draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32) {
        unsafe { self.device.cmd_draw(command_buffer, vertex_count, 1, 0, 0) };
    }

    fn cmd_blit_image(&self, command_buffer: vk::CommandBuffer, desc: &BlitDesc) {
        let far_corner = vk::Offset3D {
            x: desc.extent.width as i32,
            y: desc.extent.height as i32,
            z: 1,
        };
        let region = vk::ImageBlit::default()
            .src_subresource(color_subresource_layers())
            .src_offsets([vk::Offset3D::default(), far_corner])
            .dst_subresource(color_subresource_layers())
            .dst_offsets([vk::Offset3D::default(), far_corner]);

        unsafe {
            self.device.cmd_blit_image(
                command_buffer,
                desc.src_image,
                desc.src_layout,
                desc.dst_image,
                desc.dst_layout,
                &[region],
                desc.filter,
            )
        };
    }

    fn create_fence(&self, signaled: bool) -> GpuResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        unsafe {
            self.device
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)
        }
        .map_err(GpuError::api("vkCreateFence"))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn reset_fence(&self, fence: vk::Fence) -> GpuResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }.map_err(GpuError::api("vkResetFences"))
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> GpuResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout) }
            .map_err(GpuError::api("vkWaitForFences"))
    }

    fn create_semaphore(&self) -> GpuResult<vk::Semaphore> {
        unsafe {
            self.device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
        }
        .map_err(GpuError::api("vkCreateSemaphore"))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        signal_semaphores: &[vk::Semaphore],
        fence: vk::Fence,
    ) -> GpuResult<()> {
        let submit_info = vk::SubmitInfo::default()
            .command_buffers(slice::from_ref(&command_buffer))
            .signal_semaphores(signal_semaphores);
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], fence)
        }
        .map_err(GpuError::api("vkQueueSubmit"))
    }

    fn wait_idle(&self) -> GpuResult<()> {
        unsafe { self.device.device_wait_idle() }.map_err(GpuError::api("vkDeviceWaitIdle"))
    }
}
