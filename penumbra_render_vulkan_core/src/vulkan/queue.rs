use ash::vk;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_queue_family_index: Option<u32>,
    pub present_queue_family_index: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics_queue_family_index.is_some() && self.present_queue_family_index.is_some()
    }

    pub fn resolved(&self) -> Option<(u32, u32)> {
        Some((
            self.graphics_queue_family_index?,
            self.present_queue_family_index?,
        ))
    }
}

pub fn find_queue_family_indices(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
) -> QueueFamilyIndices {
    let queue_families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    select_queue_families(&queue_families, |i| unsafe {
        surface_loader
            .get_physical_device_surface_support(physical_device, i, surface)
            .unwrap_or(false)
    })
}

/// Prefers a single family that can both draw and present.
fn select_queue_families(
    queue_families: &[vk::QueueFamilyProperties],
    supports_present: impl Fn(u32) -> bool,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (i, queue_family) in queue_families.iter().enumerate() {
        let i = i as u32;
        let graphics = queue_family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let present = supports_present(i);

        if graphics && present {
            return QueueFamilyIndices {
                graphics_queue_family_index: Some(i),
                present_queue_family_index: Some(i),
            };
        }
        if graphics && indices.graphics_queue_family_index.is_none() {
            indices.graphics_queue_family_index = Some(i);
        }
        if present && indices.present_queue_family_index.is_none() {
            indices.present_queue_family_index = Some(i);
        }
    }

    indices
}
