// Fences, semaphores and events
//
// Fence: CPU waits on GPU completion. Must be seen signalled before reset.
// Semaphore: GPU-GPU ordering. Binary ones pair one signal with one wait;
// timeline ones carry a monotonic counter the CPU can signal and wait on.
// Event: fine-grained flag settable from either side.

use anyhow::{Context, Result};

use crate::backend::Backend;

use super::device::Device;
use super::handle::{EventHandle, FenceHandle, SemaphoreHandle};
use super::resources::{Event, Fence, Semaphore};
use super::types::SemaphoreKind;

impl<B: Backend> Device<B> {
    // =========================================================================
    // FENCES
    // =========================================================================

    /// Create a fence, optionally already signalled (so the first wait on a
    /// fresh frame slot returns immediately)
    pub fn create_fence(&mut self, signalled: bool) -> Result<FenceHandle> {
        self.pools.fences.ensure_space()?;
        let raw = self.backend().create_fence(signalled).context("Failed to create fence")?;
        self.pools.fences.insert(Fence {
            raw,
            observed_signalled: signalled,
        })
    }

    pub fn delete_fence(&mut self, handle: FenceHandle) {
        let fence = self.pools.fences.remove(handle);
        self.backend().destroy_fence(fence.raw);
    }

    /// Non-blocking query
    pub fn fence_status(&mut self, handle: FenceHandle) -> Result<bool> {
        let signalled = self.backend().fence_status(&self.pools.fences.get(handle).raw)?;
        if signalled {
            self.pools.fences.get_mut(handle).observed_signalled = true;
        }
        Ok(signalled)
    }

    /// Block until the fence is signalled or `timeout_ns` elapses.
    /// Returns false on timeout.
    pub fn wait_for_fence(&mut self, handle: FenceHandle, timeout_ns: u64) -> Result<bool> {
        let signalled = self
            .backend()
            .wait_for_fence(&self.pools.fences.get(handle).raw, timeout_ns)
            .context("Failed to wait for fence")?;
        if signalled {
            self.pools.fences.get_mut(handle).observed_signalled = true;
        }
        Ok(signalled)
    }

    pub fn reset_fence(&mut self, handle: FenceHandle) -> Result<()> {
        let fence = self.pools.fences.get_mut(handle);
        debug_assert!(
            fence.observed_signalled,
            "fence {:?} reset before it was observed signalled",
            handle
        );
        fence.observed_signalled = false;
        self.backend()
            .reset_fence(&self.pools.fences.get(handle).raw)
            .context("Failed to reset fence")
    }

    pub(crate) fn fence(&self, handle: FenceHandle) -> &Fence<B> {
        self.pools.fences.get(handle)
    }

    // =========================================================================
    // SEMAPHORES
    // =========================================================================

    /// `initial_value` only applies to timeline semaphores
    pub fn create_semaphore(&mut self, kind: SemaphoreKind, initial_value: u64) -> Result<SemaphoreHandle> {
        self.pools.semaphores.ensure_space()?;
        let initial_value = match kind {
            SemaphoreKind::Binary => 0,
            SemaphoreKind::Timeline => initial_value,
        };
        let raw = self
            .backend()
            .create_semaphore(kind, initial_value)
            .with_context(|| format!("Failed to create {:?} semaphore", kind))?;
        self.pools.semaphores.insert(Semaphore { raw, kind })
    }

    pub fn delete_semaphore(&mut self, handle: SemaphoreHandle) {
        let semaphore = self.pools.semaphores.remove(handle);
        self.backend().destroy_semaphore(semaphore.raw);
    }

    pub fn semaphore(&self, handle: SemaphoreHandle) -> &Semaphore<B> {
        self.pools.semaphores.get(handle)
    }

    /// Current counter of a timeline semaphore
    pub fn semaphore_value(&self, handle: SemaphoreHandle) -> Result<u64> {
        let semaphore = self.timeline(handle, "semaphore_value");
        self.backend().semaphore_value(&semaphore.raw)
    }

    /// Signal a timeline semaphore from the CPU. `value` must be strictly
    /// greater than the current counter.
    pub fn signal_semaphore(&self, handle: SemaphoreHandle, value: u64) -> Result<()> {
        let semaphore = self.timeline(handle, "signal_semaphore");
        if cfg!(debug_assertions) {
            let current = self.backend().semaphore_value(&semaphore.raw)?;
            debug_assert!(
                value > current,
                "timeline semaphore {:?} must advance ({} -> {})",
                handle,
                current,
                value
            );
        }
        self.backend()
            .signal_semaphore(&semaphore.raw, value)
            .context("Failed to signal timeline semaphore")
    }

    /// Block until the counter reaches `value`. Returns false on timeout.
    pub fn wait_for_semaphore(&self, handle: SemaphoreHandle, value: u64, timeout_ns: u64) -> Result<bool> {
        let semaphore = self.timeline(handle, "wait_for_semaphore");
        self.backend()
            .wait_for_semaphore(&semaphore.raw, value, timeout_ns)
            .context("Failed to wait for timeline semaphore")
    }

    fn timeline(&self, handle: SemaphoreHandle, op: &str) -> &Semaphore<B> {
        let semaphore = self.pools.semaphores.get(handle);
        assert!(
            semaphore.kind == SemaphoreKind::Timeline,
            "{} called on binary semaphore {:?}",
            op,
            handle
        );
        semaphore
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    pub fn create_event(&mut self) -> Result<EventHandle> {
        self.pools.events.ensure_space()?;
        let raw = self.backend().create_event().context("Failed to create event")?;
        self.pools.events.insert(Event { raw })
    }

    pub fn delete_event(&mut self, handle: EventHandle) {
        let event = self.pools.events.remove(handle);
        self.backend().destroy_event(event.raw);
    }

    pub fn set_event(&self, handle: EventHandle) -> Result<()> {
        self.backend().set_event(&self.pools.events.get(handle).raw)
    }

    pub fn reset_event(&self, handle: EventHandle) -> Result<()> {
        self.backend().reset_event(&self.pools.events.get(handle).raw)
    }

    pub fn is_event_set(&self, handle: EventHandle) -> Result<bool> {
        self.backend().event_status(&self.pools.events.get(handle).raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::rhi::types::PoolCapacities;

    fn device() -> Device<HeadlessBackend> {
        Device::new(HeadlessBackend::new(), PoolCapacities::default())
    }

    #[test]
    fn signalled_fence_can_be_reset_immediately() {
        let mut device = device();
        let fence = device.create_fence(true).unwrap();
        assert!(device.fence_status(fence).unwrap());
        device.reset_fence(fence).unwrap();
        assert!(!device.fence_status(fence).unwrap());
    }

    #[test]
    fn unsignalled_fence_wait_times_out() {
        let mut device = device();
        let fence = device.create_fence(false).unwrap();
        assert!(!device.wait_for_fence(fence, 1_000).unwrap());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "reset before it was observed signalled")]
    fn resetting_an_unobserved_fence_panics() {
        let mut device = device();
        let fence = device.create_fence(false).unwrap();
        let _ = device.reset_fence(fence);
    }

    #[test]
    fn timeline_reports_last_signalled_value() {
        let mut device = device();
        let timeline = device.create_semaphore(SemaphoreKind::Timeline, 2).unwrap();
        assert_eq!(device.semaphore_value(timeline).unwrap(), 2);

        for value in [3, 7, 8, 20] {
            device.signal_semaphore(timeline, value).unwrap();
        }
        assert_eq!(device.semaphore_value(timeline).unwrap(), 20);
        assert!(device.wait_for_semaphore(timeline, 8, 0).unwrap());
        assert!(!device.wait_for_semaphore(timeline, 21, 1_000).unwrap());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "must advance (5 -> 4)")]
    fn timeline_rejects_going_backwards() {
        let mut device = device();
        let timeline = device.create_semaphore(SemaphoreKind::Timeline, 0).unwrap();
        device.signal_semaphore(timeline, 5).unwrap();
        let _ = device.signal_semaphore(timeline, 4);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "must advance (5 -> 5)")]
    fn timeline_rejects_repeating_a_value() {
        let mut device = device();
        let timeline = device.create_semaphore(SemaphoreKind::Timeline, 0).unwrap();
        device.signal_semaphore(timeline, 5).unwrap();
        let _ = device.signal_semaphore(timeline, 5);
    }

    #[test]
    #[should_panic(expected = "called on binary semaphore")]
    fn binary_semaphore_has_no_cpu_value() {
        let mut device = device();
        let binary = device.create_semaphore(SemaphoreKind::Binary, 0).unwrap();
        let _ = device.semaphore_value(binary);
    }

    #[test]
    fn events_toggle_from_the_host() {
        let mut device = device();
        let event = device.create_event().unwrap();
        assert!(!device.is_event_set(event).unwrap());
        device.set_event(event).unwrap();
        assert!(device.is_event_set(event).unwrap());
        device.reset_event(event).unwrap();
        assert!(!device.is_event_set(event).unwrap());
        device.delete_event(event);
    }

    #[test]
    fn semaphore_pool_exhaustion_is_an_error() {
        let mut device = Device::new(HeadlessBackend::new(), PoolCapacities::uniform(2));
        device.create_semaphore(SemaphoreKind::Binary, 0).unwrap();
        device.create_semaphore(SemaphoreKind::Binary, 0).unwrap();
        let err = device.create_semaphore(SemaphoreKind::Binary, 0).unwrap_err();
        assert!(err.to_string().contains("semaphore pool exhausted"));
    }
}
