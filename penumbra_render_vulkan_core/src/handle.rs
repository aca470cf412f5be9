use std::{fmt, sync::Arc};

use ash::vk;

use crate::gpu::{GpuBuffer, GpuDevice, GpuResult};

/// Exclusive owner of one device object, released when dropped.
///
/// Pass constructors hold every intermediate object in an `Owned` so that an
/// early `?` return frees whatever was already created.
pub struct Owned<D: GpuDevice, H: Copy> {
    device: Arc<D>,
    handle: H,
    release: fn(&D, H),
}

impl<D: GpuDevice, H: Copy> Owned<D, H> {
    pub fn new(device: Arc<D>, handle: H, release: fn(&D, H)) -> Self {
        Self {
            device,
            handle,
            release,
        }
    }

    pub fn get(&self) -> H {
        self.handle
    }
}

impl<D: GpuDevice, H: Copy + fmt::Debug> fmt::Debug for Owned<D, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(&self.handle).finish()
    }
}

impl<D: GpuDevice, H: Copy> Drop for Owned<D, H> {
    fn drop(&mut self) {
        (self.release)(&self.device, self.handle);
    }
}

fn release_buffer<D: GpuDevice>(device: &D, buffer: GpuBuffer) {
    device.destroy_buffer(&buffer);
}

pub fn pipeline_layout<D: GpuDevice>(
    device: &Arc<D>,
    set_layouts: &[vk::DescriptorSetLayout],
    push_constant_ranges: &[vk::PushConstantRange],
) -> GpuResult<Owned<D, vk::PipelineLayout>> {
    let layout = device.create_pipeline_layout(set_layouts, push_constant_ranges)?;
    Ok(Owned::new(device.clone(), layout, D::destroy_pipeline_layout))
}

pub fn graphics_pipeline<D: GpuDevice>(
    device: &Arc<D>,
    desc: &crate::gpu::GraphicsPipelineDesc<'_>,
) -> GpuResult<Owned<D, vk::Pipeline>> {
    let pipeline = device.create_graphics_pipeline(desc)?;
    Ok(Owned::new(device.clone(), pipeline, D::destroy_pipeline))
}

pub fn descriptor_set_layout<D: GpuDevice>(
    device: &Arc<D>,
    bindings: &[vk::DescriptorSetLayoutBinding<'_>],
) -> GpuResult<Owned<D, vk::DescriptorSetLayout>> {
    let layout = device.create_descriptor_set_layout(bindings)?;
    Ok(Owned::new(
        device.clone(),
        layout,
        D::destroy_descriptor_set_layout,
    ))
}

pub fn descriptor_pool<D: GpuDevice>(
    device: &Arc<D>,
    pool_sizes: &[vk::DescriptorPoolSize],
    max_sets: u32,
) -> GpuResult<Owned<D, vk::DescriptorPool>> {
    let pool = device.create_descriptor_pool(pool_sizes, max_sets)?;
    Ok(Owned::new(device.clone(), pool, D::destroy_descriptor_pool))
}

pub fn buffer<D: GpuDevice>(
    device: &Arc<D>,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
) -> GpuResult<Owned<D, GpuBuffer>> {
    let buffer = device.create_buffer(size, usage)?;
    Ok(Owned::new(device.clone(), buffer, release_buffer::<D>))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ResourceKind, TrackingDevice};

    fn build_layout_then_fail(device: &Arc<TrackingDevice>) -> GpuResult<()> {
        let _layout = pipeline_layout(device, &[], &[])?;
        let _buffer = buffer(device, 64, vk::BufferUsageFlags::UNIFORM_BUFFER)?;
        let _pool = descriptor_pool(device, &[], 1)?;
        Ok(())
    }

    #[test]
    fn early_return_releases_earlier_objects() {
        let device = Arc::new(TrackingDevice::new());
        device.fail_next(ResourceKind::DescriptorPool);

        assert!(build_layout_then_fail(&device).is_err());
        assert_eq!(device.live_count(), 0);
        assert_eq!(device.invalid_destroys(), 0);
    }

    #[test]
    fn owned_handle_is_released_once() {
        let device = Arc::new(TrackingDevice::new());
        let layout = pipeline_layout(&device, &[], &[]).unwrap();
        assert_eq!(device.live_count_of(ResourceKind::PipelineLayout), 1);
        drop(layout);
        assert_eq!(device.live_count(), 0);
        assert_eq!(device.invalid_destroys(), 0);
    }
}
