// Swapchain - window presentation
//
// Format and present mode follow the request when the surface supports them,
// otherwise SRGB and FIFO. Image views are wrapped as non-owning images.

use anyhow::{Context, Result};
use ash::vk;

use super::resources::VulkanImage;
use super::{convert, VulkanBackend};
use crate::backend::{AcquireOutcome, NativeSwapChain, PresentOutcome};
use crate::rhi::types::*;

impl VulkanBackend {
    pub(super) fn new_swapchain(
        &self,
        surface: vk::SurfaceKHR,
        desc: &SwapChainDesc,
        old: vk::SwapchainKHR,
    ) -> Result<NativeSwapChain<Self>> {
        // Query surface capabilities
        let surface_caps = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, surface)
        }?;

        // Query supported formats
        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.physical_device, surface)
        }?;

        // Query supported present modes
        let present_modes = unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.physical_device, surface)
        }?;

        // Choose surface format (requested, then SRGB, then whatever comes first)
        let requested = convert::format(desc.format);
        let surface_format = formats
            .iter()
            .find(|f| f.format == requested && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .or_else(|| {
                formats.iter().find(|f| {
                    f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
                })
            })
            .or_else(|| formats.first())
            .context("No suitable surface format")?;

        // FIFO is always supported
        let wanted = convert::present_mode(desc.present_mode);
        let present_mode = present_modes
            .iter()
            .copied()
            .find(|&mode| mode == wanted)
            .unwrap_or(vk::PresentModeKHR::FIFO);
        if present_mode != wanted {
            log::warn!("Present mode {:?} unavailable, falling back to FIFO", desc.present_mode);
        }
        log::info!("Present mode: {:?}", present_mode);

        // Choose extent
        let extent = if surface_caps.current_extent.width != u32::MAX {
            surface_caps.current_extent
        } else {
            vk::Extent2D {
                width: desc
                    .extent
                    .width
                    .clamp(surface_caps.min_image_extent.width, surface_caps.max_image_extent.width),
                height: desc
                    .extent
                    .height
                    .clamp(surface_caps.min_image_extent.height, surface_caps.max_image_extent.height),
            }
        };

        // Requested count within what the surface allows
        let mut image_count = desc.image_count.max(surface_caps.min_image_count);
        if surface_caps.max_image_count > 0 && image_count > surface_caps.max_image_count {
            image_count = surface_caps.max_image_count;
        }

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old);

        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None) }
            .context("Failed to create swapchain")?;

        let raw_images = match unsafe { self.swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e).context("Failed to query swapchain images");
            }
        };

        let format = convert::format_from_vk(surface_format.format);
        let view_desc = ImageDesc {
            format,
            extent: Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            ..Default::default()
        };

        // Create image views
        let mut images = Vec::with_capacity(raw_images.len());
        for raw in raw_images {
            match self.create_view(raw, surface_format.format, &view_desc) {
                Ok(view) => images.push(VulkanImage {
                    raw,
                    view,
                    allocation: None,
                    owned: false,
                    format: surface_format.format,
                }),
                Err(e) => {
                    for image in images {
                        self.release_image(image);
                    }
                    unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
                    return Err(e);
                }
            }
        }

        log::info!("Created swapchain with {} images", images.len());
        Ok(NativeSwapChain {
            raw: swapchain,
            images,
            format,
            extent: Extent2D::new(extent.width, extent.height),
        })
    }

    pub(super) fn acquire(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        timeout: u64,
    ) -> Result<AcquireOutcome> {
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout, semaphore, vk::Fence::null())
        };

        match result {
            Ok((index, false)) => Ok(AcquireOutcome::Acquired(index)),
            Ok((index, true)) => Ok(AcquireOutcome::Suboptimal(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(e).context("vkAcquireNextImageKHR failed"),
        }
    }

    pub(super) fn present_image(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<PresentOutcome> {
        let swapchains = [swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = {
            let _guard = self.queue_lock.lock();
            unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
        };

        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(e).context("vkQueuePresentKHR failed"),
        }
    }
}
