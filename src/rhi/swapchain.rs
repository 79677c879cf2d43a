// SwapChain - window presentation
//
// Owns the presentation surface and up to three images. Images are
// registered in the Device image pool as external resources so command lists
// can address them by handle like any other image.
//
// Out-of-date and suboptimal results never surface as errors: they set the
// resized flag and the owner rebuilds when convenient.

use anyhow::{Context, Result};

use crate::backend::{AcquireOutcome, Backend, NativeSwapChain, PresentOutcome};

use super::barrier::ImageBarrier;
use super::device::Device;
use super::handle::{ImageHandle, SemaphoreHandle};
use super::types::*;

pub const MAX_SWAPCHAIN_IMAGES: u32 = 3;

pub struct SwapChain<B: Backend> {
    raw: B::SwapChain,
    surface: B::Surface,
    images: Vec<ImageHandle>,
    image_index: u32,
    desc: SwapChainDesc,
    format: Format,
    extent: Extent2D,
    resized: bool,
}

impl<B: Backend> SwapChain<B> {
    pub fn new(device: &mut Device<B>, surface: B::Surface, desc: &SwapChainDesc) -> Result<Self> {
        let desc = SwapChainDesc {
            image_count: desc.image_count.clamp(1, MAX_SWAPCHAIN_IMAGES),
            ..*desc
        };
        log::info!(
            "Creating swapchain: {}x{}, {} images, {:?}",
            desc.extent.width,
            desc.extent.height,
            desc.image_count,
            desc.present_mode
        );

        let native = match device.backend().create_swapchain(&surface, &desc, None) {
            Ok(native) => native,
            Err(e) => {
                device.backend().destroy_surface(surface);
                return Err(e).context("Failed to create swapchain");
            }
        };
        let NativeSwapChain { raw, images, format, extent } = native;

        let mut swapchain = Self {
            raw,
            surface,
            images: Vec::new(),
            image_index: 0,
            desc,
            format,
            extent,
            resized: false,
        };
        if let Err(e) = swapchain.register_images(device, images) {
            swapchain.destroy(device);
            return Err(e);
        }
        Ok(swapchain)
    }

    /// Recreate at a new extent. The current chain is handed to the backend
    /// as a reuse hint, then destroyed.
    pub fn rebuild(&mut self, device: &mut Device<B>, extent: Extent2D) -> Result<()> {
        log::info!("Rebuilding swapchain: {}x{}", extent.width, extent.height);
        device.wait_idle()?;

        for image in self.images.drain(..) {
            device.delete_image(image);
        }

        self.desc.extent = extent;
        let native = device
            .backend()
            .create_swapchain(&self.surface, &self.desc, Some(&self.raw))
            .context("Failed to rebuild swapchain")?;
        let NativeSwapChain { raw, images, format, extent } = native;

        let old = std::mem::replace(&mut self.raw, raw);
        device.backend().destroy_swapchain(old);

        self.format = format;
        self.extent = extent;
        self.image_index = 0;
        self.resized = false;
        self.register_images(device, images)
    }

    fn register_images(&mut self, device: &mut Device<B>, images: Vec<B::Image>) -> Result<()> {
        if images.len() > MAX_SWAPCHAIN_IMAGES as usize {
            let count = images.len();
            for image in images {
                device.backend().destroy_image(image);
            }
            anyhow::bail!(
                "backend returned {} swapchain images, at most {} are supported",
                count,
                MAX_SWAPCHAIN_IMAGES
            );
        }

        for (i, raw) in images.into_iter().enumerate() {
            let desc = ImageDesc {
                format: self.format,
                extent: self.extent.into(),
                usage: ImageUsage::COLOR_ATTACHMENT | ImageUsage::TRANSFER_DST,
                debug_name: format!("swapchain image {}", i),
                ..Default::default()
            };
            let handle = device.import_image(raw, desc)?;
            self.images.push(handle);
        }
        log::info!("Swapchain ready with {} images ({:?})", self.images.len(), self.format);
        Ok(())
    }

    /// Acquire the next image, signalling `semaphore` when it is ready.
    /// Returns None when the chain is out of date.
    pub fn acquire_next_image(&mut self, device: &Device<B>, semaphore: SemaphoreHandle) -> Result<Option<u32>> {
        let outcome = device
            .backend()
            .acquire_next_image(&self.raw, &device.semaphore(semaphore).raw, u64::MAX)
            .context("Failed to acquire swapchain image")?;

        match outcome {
            AcquireOutcome::Acquired(index) => {
                self.image_index = index;
                Ok(Some(index))
            }
            AcquireOutcome::Suboptimal(index) => {
                // Still presentable, rebuild at the next opportunity
                self.resized = true;
                self.image_index = index;
                Ok(Some(index))
            }
            AcquireOutcome::OutOfDate => {
                log::warn!("Swapchain out of date on acquire");
                self.resized = true;
                Ok(None)
            }
        }
    }

    /// Present the current image once every semaphore in `waits` is signalled
    pub fn present(&mut self, device: &Device<B>, queue: QueueType, waits: &[SemaphoreHandle]) -> Result<()> {
        let waits: Vec<&B::Semaphore> = waits.iter().map(|&h| &device.semaphore(h).raw).collect();
        let outcome = device
            .backend()
            .present(queue, &self.raw, self.image_index, &waits)
            .context("Failed to present swapchain image")?;

        match outcome {
            PresentOutcome::Presented => {}
            PresentOutcome::Suboptimal => self.resized = true,
            PresentOutcome::OutOfDate => {
                log::warn!("Swapchain out of date on present");
                self.resized = true;
            }
        }
        Ok(())
    }

    /// Move the current image from whatever it held to `layout`. Contents are
    /// discarded.
    pub fn acquire_barrier(&self, layout: ImageLayout) -> ImageBarrier {
        let (dst_stages, dst_access) = match layout {
            ImageLayout::TransferDst => (PipelineStages::TRANSFER, AccessFlags::TRANSFER_WRITE),
            _ => (
                PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                AccessFlags::COLOR_ATTACHMENT_WRITE,
            ),
        };
        ImageBarrier::new(self.image(), SubresourceRange::color())
            .layouts(ImageLayout::Undefined, layout)
            .src(PipelineStages::COLOR_ATTACHMENT_OUTPUT, AccessFlags::empty())
            .dst(dst_stages, dst_access)
    }

    /// Move the current image from `from` to PresentSrc
    pub fn present_barrier(&self, from: ImageLayout) -> ImageBarrier {
        let (src_stages, src_access) = match from {
            ImageLayout::TransferDst => (PipelineStages::TRANSFER, AccessFlags::TRANSFER_WRITE),
            _ => (
                PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                AccessFlags::COLOR_ATTACHMENT_WRITE,
            ),
        };
        ImageBarrier::new(self.image(), SubresourceRange::color())
            .layouts(from, ImageLayout::PresentSrc)
            .src(src_stages, src_access)
            .dst(PipelineStages::BOTTOM_OF_PIPE, AccessFlags::empty())
    }

    /// Image at the most recently acquired index
    pub fn image(&self) -> ImageHandle {
        self.images[self.image_index as usize]
    }

    pub fn images(&self) -> &[ImageHandle] {
        &self.images
    }

    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    pub fn desc(&self) -> &SwapChainDesc {
        &self.desc
    }

    pub fn is_resized(&self) -> bool {
        self.resized
    }

    /// Request a rebuild (e.g. on a window resize event)
    pub fn mark_resized(&mut self) {
        self.resized = true;
    }

    pub fn clear_resized(&mut self) {
        self.resized = false;
    }

    pub fn destroy(mut self, device: &mut Device<B>) {
        if let Err(e) = device.wait_idle() {
            log::error!("wait_idle failed before swapchain teardown: {:?}", e);
        }
        for image in self.images.drain(..) {
            device.delete_image(image);
        }
        device.backend().destroy_swapchain(self.raw);
        device.backend().destroy_surface(self.surface);
        log::info!("Swapchain destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::{HeadlessBackend, HeadlessSurface};
    use crate::rhi::types::PoolCapacities;

    fn desc(image_count: u32) -> SwapChainDesc {
        SwapChainDesc {
            extent: Extent2D::new(640, 480),
            image_count,
            format: Format::B8G8R8A8Srgb,
            present_mode: PresentMode::Fifo,
        }
    }

    #[test]
    fn images_are_registered_as_external() {
        let mut device = Device::new(HeadlessBackend::new(), PoolCapacities::default());
        let swapchain = SwapChain::new(&mut device, HeadlessSurface::new(), &desc(2)).unwrap();
        assert_eq!(swapchain.image_count(), 2);
        for &image in swapchain.images() {
            assert!(device.image(image).is_external());
            assert_eq!(device.image(image).desc().extent.width, 640);
        }
        swapchain.destroy(&mut device);
        assert_eq!(device.pools().live_count(), 0);
    }

    #[test]
    fn image_count_is_clamped() {
        let mut device = Device::new(HeadlessBackend::new(), PoolCapacities::default());
        let swapchain = SwapChain::new(&mut device, HeadlessSurface::new(), &desc(8)).unwrap();
        assert_eq!(swapchain.image_count(), MAX_SWAPCHAIN_IMAGES);
        assert_eq!(swapchain.desc().image_count, MAX_SWAPCHAIN_IMAGES);
        swapchain.destroy(&mut device);
    }

    #[test]
    fn more_than_three_native_images_is_an_error() {
        let mut device = Device::new(HeadlessBackend::new(), PoolCapacities::default());
        let surface = HeadlessSurface::new().with_forced_image_count(4);
        let err = SwapChain::new(&mut device, surface, &desc(3)).err().unwrap();
        assert!(err.to_string().contains("at most 3"));
        assert_eq!(device.pools().live_count(), 0);
    }

    #[test]
    fn out_of_date_sets_resized_and_rebuild_clears_it() {
        let mut device = Device::new(HeadlessBackend::new(), PoolCapacities::default());
        let acquire = device.create_semaphore(SemaphoreKind::Binary, 0).unwrap();
        let mut swapchain = SwapChain::new(&mut device, HeadlessSurface::new(), &desc(2)).unwrap();

        device.backend().invalidate_swapchains();
        assert_eq!(swapchain.acquire_next_image(&device, acquire).unwrap(), None);
        assert!(swapchain.is_resized());

        swapchain.rebuild(&mut device, Extent2D::new(800, 600)).unwrap();
        assert!(!swapchain.is_resized());
        assert_eq!(swapchain.extent(), Extent2D::new(800, 600));
        assert_eq!(swapchain.acquire_next_image(&device, acquire).unwrap(), Some(0));
        swapchain.destroy(&mut device);
    }

    #[test]
    fn suboptimal_acquire_still_returns_an_image() {
        let mut device = Device::new(HeadlessBackend::new(), PoolCapacities::default());
        let acquire = device.create_semaphore(SemaphoreKind::Binary, 0).unwrap();
        let mut swapchain = SwapChain::new(&mut device, HeadlessSurface::new(), &desc(2)).unwrap();

        device.backend().mark_swapchains_suboptimal();
        assert_eq!(swapchain.acquire_next_image(&device, acquire).unwrap(), Some(0));
        assert_eq!(swapchain.image_index(), 0);
        assert!(swapchain.is_resized());

        swapchain.rebuild(&mut device, Extent2D::new(640, 480)).unwrap();
        assert!(!swapchain.is_resized());
        swapchain.destroy(&mut device);
    }

    #[test]
    fn out_of_date_present_sets_resized() {
        let mut device = Device::new(HeadlessBackend::new(), PoolCapacities::default());
        let acquire = device.create_semaphore(SemaphoreKind::Binary, 0).unwrap();
        let mut swapchain = SwapChain::new(&mut device, HeadlessSurface::new(), &desc(2)).unwrap();

        assert_eq!(swapchain.acquire_next_image(&device, acquire).unwrap(), Some(0));
        assert!(!swapchain.is_resized());

        device.backend().invalidate_swapchains();
        swapchain.present(&device, QueueType::Graphics, &[acquire]).unwrap();
        assert!(swapchain.is_resized());
        assert_eq!(device.backend().stats().presents, 0);
        swapchain.destroy(&mut device);
    }

    #[test]
    fn suboptimal_present_counts_and_sets_resized() {
        let mut device = Device::new(HeadlessBackend::new(), PoolCapacities::default());
        let acquire = device.create_semaphore(SemaphoreKind::Binary, 0).unwrap();
        let mut swapchain = SwapChain::new(&mut device, HeadlessSurface::new(), &desc(2)).unwrap();

        swapchain.acquire_next_image(&device, acquire).unwrap();
        assert!(!swapchain.is_resized());

        device.backend().mark_swapchains_suboptimal();
        swapchain.present(&device, QueueType::Graphics, &[acquire]).unwrap();
        assert!(swapchain.is_resized());
        assert_eq!(device.backend().stats().presents, 1);
        swapchain.destroy(&mut device);
    }

    #[test]
    fn barriers_target_the_acquired_image() {
        let mut device = Device::new(HeadlessBackend::new(), PoolCapacities::default());
        let acquire = device.create_semaphore(SemaphoreKind::Binary, 0).unwrap();
        let mut swapchain = SwapChain::new(&mut device, HeadlessSurface::new(), &desc(2)).unwrap();

        swapchain.acquire_next_image(&device, acquire).unwrap();
        let to_clear = swapchain.acquire_barrier(ImageLayout::TransferDst);
        let to_present = swapchain.present_barrier(ImageLayout::TransferDst);
        assert_eq!(to_clear.image, swapchain.image());
        assert_eq!(to_clear.new_layout, ImageLayout::TransferDst);
        assert_eq!(to_present.old_layout, ImageLayout::TransferDst);
        assert_eq!(to_present.new_layout, ImageLayout::PresentSrc);
        assert_eq!(to_present.src_access, AccessFlags::TRANSFER_WRITE);
        swapchain.destroy(&mut device);
    }
}
