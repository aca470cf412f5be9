use std::sync::Arc;

use ash::vk;
use thiserror::Error;

use crate::gpu::{GpuDevice, GpuImage, GpuResult, ImageBarrier, ImageDesc, SamplerDesc, StageAccess};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("{name} is in layout {actual:?}, expected {expected:?}")]
    Unexpected {
        name: &'static str,
        expected: vk::ImageLayout,
        actual: vk::ImageLayout,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct RenderTargetDesc {
    pub name: &'static str,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    pub sampler: Option<SamplerDesc>,
}

/// An image, its view and an optional sampler, owned by exactly one pass.
///
/// The layout the image will be in once previously recorded commands have
/// executed is kept alongside it. Every barrier goes through [`transition`] or
/// [`discard_to`], which keep that tag current.
///
/// [`transition`]: RenderTarget::transition
/// [`discard_to`]: RenderTarget::discard_to
pub struct RenderTarget<D: GpuDevice> {
    device: Arc<D>,
    name: &'static str,
    image: GpuImage,
    sampler: Option<vk::Sampler>,
    format: vk::Format,
    extent: vk::Extent2D,
    aspect: vk::ImageAspectFlags,
    layout: vk::ImageLayout,
}

impl<D: GpuDevice> RenderTarget<D> {
    pub fn new(device: Arc<D>, desc: &RenderTargetDesc) -> GpuResult<Self> {
        let image = device.create_image(&ImageDesc {
            format: desc.format,
            extent: desc.extent,
            usage: desc.usage,
            aspect: desc.aspect,
        })?;

        let sampler = match desc.sampler.as_ref().map(|s| device.create_sampler(s)) {
            Some(Ok(sampler)) => Some(sampler),
            Some(Err(e)) => {
                device.destroy_image(&image);
                return Err(e);
            }
            None => None,
        };

        Ok(Self {
            device,
            name: desc.name,
            image,
            sampler,
            format: desc.format,
            extent: desc.extent,
            aspect: desc.aspect,
            layout: vk::ImageLayout::UNDEFINED,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn image(&self) -> vk::Image {
        self.image.image
    }

    pub fn view(&self) -> vk::ImageView {
        self.image.view
    }

    pub fn sampler(&self) -> Option<vk::Sampler> {
        self.sampler
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    pub fn transition(
        &mut self,
        command_buffer: vk::CommandBuffer,
        new_layout: vk::ImageLayout,
        src: StageAccess,
        dst: StageAccess,
    ) {
        self.record_barrier(command_buffer, self.layout, new_layout, src, dst);
    }

    /// Like [`RenderTarget::transition`] but treats the old contents as
    /// undefined, for targets that are cleared right after.
    pub fn discard_to(
        &mut self,
        command_buffer: vk::CommandBuffer,
        new_layout: vk::ImageLayout,
        src: StageAccess,
        dst: StageAccess,
    ) {
        self.record_barrier(
            command_buffer,
            vk::ImageLayout::UNDEFINED,
            new_layout,
            src,
            dst,
        );
    }

    pub fn require_layout(&self, expected: vk::ImageLayout) -> Result<(), LayoutError> {
        if self.layout == expected {
            Ok(())
        } else {
            Err(LayoutError::Unexpected {
                name: self.name,
                expected,
                actual: self.layout,
            })
        }
    }

    fn record_barrier(
        &mut self,
        command_buffer: vk::CommandBuffer,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src: StageAccess,
        dst: StageAccess,
    ) {
        self.device.cmd_image_barrier(
            command_buffer,
            &ImageBarrier {
                image: self.image.image,
                aspect: self.aspect,
                old_layout,
                new_layout,
                src,
                dst,
            },
        );
        self.layout = new_layout;
    }
}

impl<D: GpuDevice> Drop for RenderTarget<D> {
    fn drop(&mut self) {
        if let Some(sampler) = self.sampler.take() {
            self.device.destroy_sampler(sampler);
        }
        self.device.destroy_image(&self.image);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordedCommand, ResourceKind, TrackingDevice};

    const TOP: StageAccess =
        StageAccess::new(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE);
    const FRAGMENT_READ: StageAccess = StageAccess::new(
        vk::PipelineStageFlags2::FRAGMENT_SHADER,
        vk::AccessFlags2::SHADER_READ,
    );

    fn depth_desc(sampler: Option<SamplerDesc>) -> RenderTargetDesc {
        RenderTargetDesc {
            name: "depth",
            format: vk::Format::D32_SFLOAT,
            extent: vk::Extent2D {
                width: 64,
                height: 32,
            },
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            aspect: vk::ImageAspectFlags::DEPTH,
            sampler,
        }
    }

    #[test]
    fn starts_undefined_and_tracks_transitions() {
        let device = Arc::new(TrackingDevice::new());
        let mut target = RenderTarget::new(device.clone(), &depth_desc(None)).unwrap();
        let cmd = device.fake_command_buffer();
        assert_eq!(target.layout(), vk::ImageLayout::UNDEFINED);

        target.discard_to(cmd, vk::ImageLayout::ATTACHMENT_OPTIMAL, TOP, FRAGMENT_READ);
        target.transition(
            cmd,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            TOP,
            FRAGMENT_READ,
        );
        assert_eq!(target.layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

        let barriers = device.barriers_for(target.image());
        assert_eq!(barriers.len(), 2);
        assert_eq!(barriers[0].old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barriers[1].old_layout, vk::ImageLayout::ATTACHMENT_OPTIMAL);
        assert_eq!(barriers[1].aspect, vk::ImageAspectFlags::DEPTH);
        assert!(matches!(
            device.commands().last(),
            Some(RecordedCommand::Barrier(_))
        ));
    }

    #[test]
    fn discard_ignores_tracked_layout() {
        let device = Arc::new(TrackingDevice::new());
        let mut target = RenderTarget::new(device.clone(), &depth_desc(None)).unwrap();
        let cmd = device.fake_command_buffer();

        target.discard_to(cmd, vk::ImageLayout::GENERAL, TOP, TOP);
        target.discard_to(cmd, vk::ImageLayout::ATTACHMENT_OPTIMAL, TOP, TOP);

        let barriers = device.barriers_for(target.image());
        assert!(
            barriers
                .iter()
                .all(|b| b.old_layout == vk::ImageLayout::UNDEFINED)
        );
    }

    #[test]
    fn require_layout_reports_mismatch() {
        let device = Arc::new(TrackingDevice::new());
        let target = RenderTarget::new(device, &depth_desc(None)).unwrap();

        assert!(target.require_layout(vk::ImageLayout::UNDEFINED).is_ok());
        assert_eq!(
            target.require_layout(vk::ImageLayout::GENERAL),
            Err(LayoutError::Unexpected {
                name: "depth",
                expected: vk::ImageLayout::GENERAL,
                actual: vk::ImageLayout::UNDEFINED,
            })
        );
    }

    #[test]
    fn drop_releases_image_and_sampler() {
        let device = Arc::new(TrackingDevice::new());
        let target =
            RenderTarget::new(device.clone(), &depth_desc(Some(SamplerDesc::default()))).unwrap();
        assert!(target.sampler().is_some());
        assert_eq!(device.live_count_of(ResourceKind::Image), 1);
        assert_eq!(device.live_count_of(ResourceKind::Sampler), 1);

        drop(target);
        assert_eq!(device.live_count(), 0);
    }

    #[test]
    fn failed_sampler_does_not_leak_image() {
        let device = Arc::new(TrackingDevice::new());
        device.fail_next(ResourceKind::Sampler);

        let result = RenderTarget::new(device.clone(), &depth_desc(Some(SamplerDesc::default())));
        assert!(result.is_err());
        assert_eq!(device.live_count(), 0);
    }
}
