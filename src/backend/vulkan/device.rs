// Vulkan Device - instance, adapter and logical device
//
// Responsibilities:
// - Instance creation with validation layers and surface extensions
// - Physical device selection (prefer discrete GPU)
// - Logical device + graphics/compute/transfer queues
// - Memory allocator setup

use anyhow::{Context, Result};
use ash::extensions::{ext, khr};
use ash::{vk, Entry};
use parking_lot::Mutex;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};
use std::mem::ManuallyDrop;

use super::{convert, surface, Queue, VulkanBackend};
use crate::backend::AdapterInfo;

/// Core features the renderer relies on
fn required_features() -> vk::PhysicalDeviceFeatures {
    vk::PhysicalDeviceFeatures::builder()
        .fill_mode_non_solid(true)
        .sampler_anisotropy(true)
        .build()
}

struct Candidate {
    physical_device: vk::PhysicalDevice,
    families: [u32; 3],
    mesh_shading: bool,
}

impl VulkanBackend {
    /// Create the Vulkan backend
    ///
    /// # Arguments
    /// * `app_name` - Application name for debugging
    /// * `enable_validation` - Enable Vulkan validation layers (debug only)
    /// * `display` - Display the surfaces will be created for; None for offscreen use
    pub fn new(app_name: &str, enable_validation: bool, display: Option<RawDisplayHandle>) -> Result<Self> {
        log::info!("Creating Vulkan device: {}", app_name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }.context("Failed to load Vulkan library. Is Vulkan installed?")?;

        // Step 2: Create instance
        let instance = Self::create_instance(&entry, app_name, enable_validation, display)?;

        // Step 3: Setup debug messenger if validation enabled
        let debug_utils = ext::DebugUtils::new(&entry, &instance);
        let messenger = if enable_validation {
            Some(Self::setup_debug_messenger(&debug_utils)?)
        } else {
            None
        };

        // Step 4: Pick physical device (GPU)
        let candidate = Self::pick_physical_device(&instance, display.is_some())?;

        // Step 5: Create logical device
        let device = Self::create_logical_device(&instance, &candidate, display.is_some())?;
        let queues = candidate.families.map(|family| Queue {
            raw: unsafe { device.get_device_queue(family, 0) },
            family,
        });

        // Step 6: Cache device properties
        let physical_device = candidate.physical_device;
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();
        log::info!("Selected GPU: {}", name);
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        log::info!(
            "Queue families: graphics {}, compute {}, transfer {}",
            queues[0].family,
            queues[1].family,
            queues[2].family
        );

        let adapter = AdapterInfo {
            name,
            discrete: properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU,
            memory_types: memory_properties.memory_types[..memory_properties.memory_type_count as usize]
                .iter()
                .map(|t| convert::memory_properties(t.property_flags))
                .collect(),
        };

        // Step 7: Create memory allocator
        let allocator = Self::create_allocator(&instance, physical_device, &device)?;

        let surface_loader = khr::Surface::new(&entry, &instance);
        let swapchain_loader = khr::Swapchain::new(&instance, &device);
        let mesh_shader = candidate.mesh_shading.then(|| ext::MeshShader::new(&instance, &device));

        Ok(Self {
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            device,
            physical_device,
            instance,
            entry,
            queues,
            queue_lock: Mutex::new(()),
            surface_loader,
            swapchain_loader,
            mesh_shader,
            debug_utils,
            messenger,
            adapter,
            properties,
        })
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        enable_validation: bool,
        display: Option<RawDisplayHandle>,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = CString::new("my-rhi")?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        // Debug utils is always on, object names are set through it
        let mut extensions: Vec<*const c_char> = vec![ext::DebugUtils::name().as_ptr()];

        // Platform-specific surface extensions
        if let Some(display) = display {
            extensions.push(khr::Surface::name().as_ptr());
            extensions.push(surface::platform_extension(display)?.as_ptr());
        }

        let layer_names = if enable_validation {
            vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }.context("Failed to create Vulkan instance")?;

        Ok(instance)
    }

    fn setup_debug_messenger(debug_utils: &ext::DebugUtils) -> Result<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to create debug messenger")?;

        Ok(messenger)
    }

    fn pick_physical_device(instance: &ash::Instance, presentable: bool) -> Result<Candidate> {
        let devices = unsafe { instance.enumerate_physical_devices() }?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        // Score each device
        let mut best = None;
        let mut best_score = 0;

        for device in devices {
            let props = unsafe { instance.get_physical_device_properties(device) };
            if props.api_version < vk::API_VERSION_1_3 {
                continue;
            }

            let mut vk12 = vk::PhysicalDeviceVulkan12Features::default();
            let mut vk13 = vk::PhysicalDeviceVulkan13Features::default();
            let mut mesh = vk::PhysicalDeviceMeshShaderFeaturesEXT::default();
            let mut features = vk::PhysicalDeviceFeatures2::builder()
                .push_next(&mut vk12)
                .push_next(&mut vk13)
                .push_next(&mut mesh);
            unsafe { instance.get_physical_device_features2(device, &mut features) };
            let core = features.features;

            // Check required features
            if core.fill_mode_non_solid != vk::TRUE
                || core.sampler_anisotropy != vk::TRUE
                || vk12.timeline_semaphore != vk::TRUE
                || vk13.dynamic_rendering != vk::TRUE
                || vk13.synchronization2 != vk::TRUE
            {
                continue;
            }

            let extensions = unsafe { instance.enumerate_device_extension_properties(device) }?;
            let has_extension = |name: &CStr| {
                extensions
                    .iter()
                    .any(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) } == name)
            };
            if presentable && !has_extension(khr::Swapchain::name()) {
                continue;
            }
            let mesh_shading = has_extension(ext::MeshShader::name())
                && mesh.mesh_shader == vk::TRUE
                && mesh.task_shader == vk::TRUE;

            let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };
            let Some(families) = Self::pick_queue_families(&queue_families) else {
                continue;
            };

            // Score device (prefer discrete GPU)
            let score = match props.device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
                _ => 1,
            };

            if score > best_score {
                best_score = score;
                best = Some(Candidate {
                    physical_device: device,
                    families,
                    mesh_shading,
                });
            }
        }

        best.ok_or_else(|| anyhow::anyhow!("No suitable GPU found (Vulkan 1.3 with dynamic rendering required)"))
    }

    /// Graphics, compute and transfer families. Dedicated families win, the
    /// graphics family is the fallback for both.
    fn pick_queue_families(families: &[vk::QueueFamilyProperties]) -> Option<[u32; 3]> {
        let find = |want: vk::QueueFlags, avoid: vk::QueueFlags| {
            families
                .iter()
                .position(|f| f.queue_count > 0 && f.queue_flags.contains(want) && !f.queue_flags.intersects(avoid))
                .map(|i| i as u32)
        };

        let graphics = find(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, vk::QueueFlags::empty())?;
        let compute = find(vk::QueueFlags::COMPUTE, vk::QueueFlags::GRAPHICS).unwrap_or(graphics);
        let transfer = find(vk::QueueFlags::TRANSFER, vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
            .unwrap_or(compute);
        Some([graphics, compute, transfer])
    }

    fn create_logical_device(instance: &ash::Instance, candidate: &Candidate, presentable: bool) -> Result<ash::Device> {
        let mut unique = candidate.families.to_vec();
        unique.sort_unstable();
        unique.dedup();

        let queue_priorities = [1.0];
        let queue_create_infos: Vec<_> = unique
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        // Required device extensions
        let mut extensions = Vec::new();
        if presentable {
            extensions.push(khr::Swapchain::name().as_ptr());
        }
        if candidate.mesh_shading {
            extensions.push(ext::MeshShader::name().as_ptr());
        }

        let features = required_features();
        let mut vk12 = vk::PhysicalDeviceVulkan12Features::builder().timeline_semaphore(true);
        let mut vk13 = vk::PhysicalDeviceVulkan13Features::builder()
            .dynamic_rendering(true)
            .synchronization2(true);
        let mut mesh = vk::PhysicalDeviceMeshShaderFeaturesEXT::builder()
            .task_shader(true)
            .mesh_shader(true);

        let mut create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features)
            .push_next(&mut vk12)
            .push_next(&mut vk13);
        if candidate.mesh_shading {
            create_info = create_info.push_next(&mut mesh);
        }

        let device = unsafe { instance.create_device(candidate.physical_device, &create_info, None) }
            .context("Failed to create logical device")?;

        Ok(device)
    }

    fn create_allocator(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: &ash::Device,
    ) -> Result<gpu_allocator::vulkan::Allocator> {
        let allocator = gpu_allocator::vulkan::Allocator::new(&gpu_allocator::vulkan::AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .context("Failed to create memory allocator")?;

        Ok(allocator)
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        if let Err(e) = unsafe { self.device.device_wait_idle() } {
            log::error!("device_wait_idle failed during teardown: {:?}", e);
        }

        // Allocations must go back before the device does
        unsafe {
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
            if let Some(messenger) = self.messenger.take() {
                self.debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn single_family_serves_every_queue() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)];
        assert_eq!(VulkanBackend::pick_queue_families(&families), Some([0, 0, 0]));
    }

    #[test]
    fn dedicated_families_are_preferred() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::TRANSFER),
        ];
        assert_eq!(VulkanBackend::pick_queue_families(&families), Some([0, 1, 2]));
    }

    #[test]
    fn no_graphics_family_means_no_candidate() {
        let families = [family(vk::QueueFlags::COMPUTE)];
        assert_eq!(VulkanBackend::pick_queue_families(&families), None);
    }
}
