// Window surfaces from raw-window-handle

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::ffi::CStr;

use super::VulkanBackend;

/// Instance extension needed to create surfaces on `display`
pub(super) fn platform_extension(display: RawDisplayHandle) -> Result<&'static CStr> {
    match display {
        RawDisplayHandle::Windows(_) => Ok(khr::Win32Surface::name()),
        RawDisplayHandle::Xlib(_) => Ok(khr::XlibSurface::name()),
        RawDisplayHandle::Xcb(_) => Ok(khr::XcbSurface::name()),
        RawDisplayHandle::Wayland(_) => Ok(khr::WaylandSurface::name()),
        other => anyhow::bail!("Unsupported display platform: {:?}", other),
    }
}

impl VulkanBackend {
    /// Create a presentation surface for `window`. The backend must have been
    /// created with the window's display handle.
    pub fn create_surface<W>(&self, window: &W) -> Result<vk::SurfaceKHR>
    where
        W: HasWindowHandle + HasDisplayHandle,
    {
        let display = window.display_handle().context("Window has no display handle")?.as_raw();
        let handle = window.window_handle().context("Window has no window handle")?.as_raw();

        let surface = match (display, handle) {
            (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(h)) => {
                let hinstance = h.hinstance.map_or(0, |i| i.get());
                let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                    .hinstance(hinstance as vk::HINSTANCE)
                    .hwnd(h.hwnd.get() as vk::HWND);
                let loader = khr::Win32Surface::new(&self.entry, &self.instance);
                unsafe { loader.create_win32_surface(&create_info, None) }
            }
            (RawDisplayHandle::Xlib(d), RawWindowHandle::Xlib(w)) => {
                let dpy = d.display.context("Xlib display pointer is null")?;
                let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                    .dpy(dpy.as_ptr() as *mut vk::Display)
                    .window(w.window);
                let loader = khr::XlibSurface::new(&self.entry, &self.instance);
                unsafe { loader.create_xlib_surface(&create_info, None) }
            }
            (RawDisplayHandle::Xcb(d), RawWindowHandle::Xcb(w)) => {
                let connection = d.connection.context("XCB connection pointer is null")?;
                let create_info = vk::XcbSurfaceCreateInfoKHR::builder()
                    .connection(connection.as_ptr())
                    .window(w.window.get());
                let loader = khr::XcbSurface::new(&self.entry, &self.instance);
                unsafe { loader.create_xcb_surface(&create_info, None) }
            }
            (RawDisplayHandle::Wayland(d), RawWindowHandle::Wayland(w)) => {
                let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                    .display(d.display.as_ptr())
                    .surface(w.surface.as_ptr());
                let loader = khr::WaylandSurface::new(&self.entry, &self.instance);
                unsafe { loader.create_wayland_surface(&create_info, None) }
            }
            (display, window) => anyhow::bail!("Unsupported window platform: {:?} / {:?}", display, window),
        }
        .context("Failed to create window surface")?;

        let graphics = self.queues[0].family;
        let supported = unsafe {
            self.surface_loader
                .get_physical_device_surface_support(self.physical_device, graphics, surface)
        }
        .context("Failed to query surface support")?;
        if !supported {
            unsafe { self.surface_loader.destroy_surface(surface, None) };
            anyhow::bail!("Graphics queue family {} cannot present to this surface", graphics);
        }

        log::info!("Window surface created");
        Ok(surface)
    }
}
