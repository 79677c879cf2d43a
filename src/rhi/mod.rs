// RHI - backend-neutral rendering interface
//
// Device owns every resource in fixed-capacity pools and hands out typed
// handles. CommandList records against the Device, SwapChain presents, and
// the sync primitives order work between CPU, GPU and presentation engine.

pub mod barrier;
pub mod command;
pub mod device;
pub mod handle;
pub mod resources;
pub mod swapchain;
pub mod sync;
pub mod types;

pub use barrier::{Barriers, BufferBarrier, ImageBarrier, MemoryBarrier};
pub use command::{
    AttachmentResolve, CommandAllocator, CommandList, CommandListState, RenderingAttachment, RenderingDesc,
    SemaphoreSignal, SemaphoreWait, SubmitInfo,
};
pub use device::{Device, ResourcePools};
pub use handle::*;
pub use resources::*;
pub use swapchain::{SwapChain, MAX_SWAPCHAIN_IMAGES};
pub use types::*;
