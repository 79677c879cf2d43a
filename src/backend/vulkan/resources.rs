// Native resources - buffers, images, samplers and shader modules
//
// Memory comes from gpu-allocator. Host-visible allocations stay mapped for
// their whole lifetime, so mapping a buffer is just handing out the pointer.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::ffi::CString;
use std::ptr::NonNull;

use super::{convert, VulkanBackend};
use crate::backend::MemoryStrategy;
use crate::rhi::types::*;

pub struct VulkanBuffer {
    pub(super) raw: vk::Buffer,
    pub(super) allocation: Option<Allocation>,
    pub(super) size: u64,
}

impl VulkanBuffer {
    pub fn raw(&self) -> vk::Buffer {
        self.raw
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

pub struct VulkanImage {
    pub(super) raw: vk::Image,
    pub(super) view: vk::ImageView,
    pub(super) allocation: Option<Allocation>,
    /// Swapchain images belong to the swapchain, only the view is ours
    pub(super) owned: bool,
    pub(super) format: vk::Format,
}

impl VulkanImage {
    pub fn raw(&self) -> vk::Image {
        self.raw
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }
}

pub struct VulkanShaderModule {
    pub(super) raw: vk::ShaderModule,
    pub(super) entry_point: CString,
}

/// gpu-allocator picks the memory type itself; only the property class
/// chosen by the Device matters here.
fn memory_location(props: MemoryProperties) -> MemoryLocation {
    if !props.is_host_visible() {
        MemoryLocation::GpuOnly
    } else if props.contains(MemoryProperties::HOST_CACHED) {
        MemoryLocation::GpuToCpu
    } else {
        MemoryLocation::CpuToGpu
    }
}

impl VulkanBackend {
    pub(super) fn set_object_name<H: vk::Handle>(&self, handle: H, name: &str) {
        if name.is_empty() {
            return;
        }
        let Ok(name) = CString::new(name) else {
            return;
        };
        let info = vk::DebugUtilsObjectNameInfoEXT::builder()
            .object_type(H::TYPE)
            .object_handle(handle.as_raw())
            .object_name(&name);
        if let Err(e) = unsafe { self.debug_utils.set_debug_utils_object_name(self.device.handle(), &info) } {
            log::debug!("Failed to name {:?}: {:?}", H::TYPE, e);
        }
    }

    fn allocate(&self, name: &str, requirements: vk::MemoryRequirements, memory: MemoryStrategy, linear: bool) -> Result<Allocation> {
        let allocation = self
            .allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: memory_location(memory.properties),
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .with_context(|| format!("Failed to allocate {} bytes for '{}'", requirements.size, name))?;
        Ok(allocation)
    }

    fn free(&self, allocation: Allocation) {
        if let Err(e) = self.allocator.lock().free(allocation) {
            log::error!("Failed to free allocation: {:?}", e);
        }
    }

    // =========================================================================
    // BUFFERS
    // =========================================================================

    pub(super) fn new_buffer(&self, desc: &BufferDesc, memory: MemoryStrategy) -> Result<VulkanBuffer> {
        let create_info = vk::BufferCreateInfo::builder()
            .size(desc.size)
            .usage(convert::buffer_usage(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let raw = unsafe { self.device.create_buffer(&create_info, None) }.context("Failed to create buffer")?;
        let requirements = unsafe { self.device.get_buffer_memory_requirements(raw) };

        let allocation = match self.allocate(&desc.debug_name, requirements, memory, true) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(raw, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { self.device.bind_buffer_memory(raw, allocation.memory(), allocation.offset()) } {
            self.free(allocation);
            unsafe { self.device.destroy_buffer(raw, None) };
            return Err(e).context("Failed to bind buffer memory");
        }

        self.set_object_name(raw, &desc.debug_name);
        Ok(VulkanBuffer {
            raw,
            allocation: Some(allocation),
            size: desc.size,
        })
    }

    pub(super) fn release_buffer(&self, mut buffer: VulkanBuffer) {
        if let Some(allocation) = buffer.allocation.take() {
            self.free(allocation);
        }
        unsafe { self.device.destroy_buffer(buffer.raw, None) };
    }

    pub(super) fn mapped_ptr(&self, buffer: &VulkanBuffer) -> Result<NonNull<u8>> {
        buffer
            .allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .map(|ptr| ptr.cast::<u8>())
            .context("Buffer memory is not host visible")
    }

    // =========================================================================
    // IMAGES
    // =========================================================================

    pub(super) fn new_image(&self, desc: &ImageDesc, memory: MemoryStrategy) -> Result<(VulkanImage, u64)> {
        let (image_type, _) = convert::image_type(desc.image_type);
        let format = convert::format(desc.format);
        let flags = if desc.image_type == ImageType::Cube {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };

        let create_info = vk::ImageCreateInfo::builder()
            .flags(flags)
            .image_type(image_type)
            .format(format)
            .extent(convert::extent3d(desc.extent))
            .mip_levels(desc.mip_levels)
            .array_layers(desc.array_layers)
            .samples(convert::samples(desc.samples))
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(convert::image_usage(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let raw = unsafe { self.device.create_image(&create_info, None) }.context("Failed to create image")?;
        let requirements = unsafe { self.device.get_image_memory_requirements(raw) };

        let allocation = match self.allocate(&desc.debug_name, requirements, memory, false) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(raw, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { self.device.bind_image_memory(raw, allocation.memory(), allocation.offset()) } {
            self.free(allocation);
            unsafe { self.device.destroy_image(raw, None) };
            return Err(e).context("Failed to bind image memory");
        }

        let view = match self.create_view(raw, format, desc) {
            Ok(view) => view,
            Err(e) => {
                self.free(allocation);
                unsafe { self.device.destroy_image(raw, None) };
                return Err(e);
            }
        };

        self.set_object_name(raw, &desc.debug_name);
        let image = VulkanImage {
            raw,
            view,
            allocation: Some(allocation),
            owned: true,
            format,
        };
        Ok((image, requirements.size))
    }

    pub(super) fn create_view(&self, image: vk::Image, format: vk::Format, desc: &ImageDesc) -> Result<vk::ImageView> {
        let (_, mut view_type) = convert::image_type(desc.image_type);
        if view_type == vk::ImageViewType::TYPE_2D && desc.array_layers > 1 {
            view_type = vk::ImageViewType::TYPE_2D_ARRAY;
        }

        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(view_type)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(convert::subresource_range(desc.full_range()));

        unsafe { self.device.create_image_view(&create_info, None) }.context("Failed to create image view")
    }

    pub(super) fn release_image(&self, mut image: VulkanImage) {
        unsafe { self.device.destroy_image_view(image.view, None) };
        if !image.owned {
            return;
        }
        if let Some(allocation) = image.allocation.take() {
            self.free(allocation);
        }
        unsafe { self.device.destroy_image(image.raw, None) };
    }

    // =========================================================================
    // SAMPLERS AND SHADERS
    // =========================================================================

    pub(super) fn new_sampler(&self, desc: &SamplerDesc) -> Result<vk::Sampler> {
        let address = convert::address_mode(desc.address_mode);
        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(convert::filter(desc.mag_filter))
            .min_filter(convert::filter(desc.min_filter))
            .mipmap_mode(convert::mipmap_mode(desc.mipmap_filter))
            .address_mode_u(address)
            .address_mode_v(address)
            .address_mode_w(address)
            .anisotropy_enable(desc.max_anisotropy.is_some())
            .max_anisotropy(
                desc.max_anisotropy
                    .unwrap_or(1.0)
                    .min(self.properties.limits.max_sampler_anisotropy),
            )
            .compare_enable(desc.compare.is_some())
            .compare_op(convert::compare_op(desc.compare.unwrap_or(CompareOp::Always)))
            .min_lod(desc.min_lod)
            .max_lod(desc.max_lod)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK);

        unsafe { self.device.create_sampler(&create_info, None) }.context("Failed to create sampler")
    }

    pub(super) fn new_shader_module(&self, desc: &ShaderModuleDesc) -> Result<VulkanShaderModule> {
        let entry_point = CString::new(desc.entry_point.as_str()).context("Shader entry point contains a NUL byte")?;
        let create_info = vk::ShaderModuleCreateInfo::builder().code(&desc.code);
        let raw = unsafe { self.device.create_shader_module(&create_info, None) }
            .context("Failed to create shader module")?;
        Ok(VulkanShaderModule { raw, entry_point })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_locations_follow_properties() {
        assert_eq!(memory_location(MemoryProperties::DEVICE_LOCAL), MemoryLocation::GpuOnly);
        assert_eq!(
            memory_location(MemoryProperties::DEVICE_LOCAL | MemoryProperties::HOST_VISIBLE),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            memory_location(MemoryProperties::HOST_VISIBLE | MemoryProperties::HOST_CACHED),
            MemoryLocation::GpuToCpu
        );
    }
}
