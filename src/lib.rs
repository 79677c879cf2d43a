// my-rhi - render hardware interface over Vulkan
//
// rhi:      handles, pools, command lists, sync objects, swapchain
// backend:  native implementations (Vulkan, headless)
// renderer: frame rotation on top of the rhi

pub mod backend;
pub mod config;
pub mod renderer;
pub mod rhi;
pub mod shader;

pub use config::Config;
pub use renderer::{DrawItem, FramePacing, FrameStatus, Renderer, RendererDesc, FRAME_ROTATION};
