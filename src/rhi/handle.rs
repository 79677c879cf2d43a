// Resource handles and fixed-capacity pools
//
// A handle is a bare slot index typed by resource kind. There is no
// generation counter: a handle is valid between its Create and Delete call
// and nothing checks it afterwards beyond an empty-slot assertion.

use anyhow::Result;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Marker types naming each resource kind
pub mod kind {
    pub enum Buffer {}
    pub enum Image {}
    pub enum Sampler {}
    pub enum ShaderModule {}
    pub enum Pipeline {}
    pub enum DescriptorPool {}
    pub enum DescriptorLayout {}
    pub enum DescriptorGroup {}
    pub enum Fence {}
    pub enum Semaphore {}
    pub enum Event {}
}

pub struct Handle<K> {
    index: u32,
    _kind: PhantomData<fn() -> K>,
}

pub type BufferHandle = Handle<kind::Buffer>;
pub type ImageHandle = Handle<kind::Image>;
pub type SamplerHandle = Handle<kind::Sampler>;
pub type ShaderModuleHandle = Handle<kind::ShaderModule>;
pub type PipelineHandle = Handle<kind::Pipeline>;
pub type DescriptorPoolHandle = Handle<kind::DescriptorPool>;
pub type DescriptorLayoutHandle = Handle<kind::DescriptorLayout>;
pub type DescriptorGroupHandle = Handle<kind::DescriptorGroup>;
pub type FenceHandle = Handle<kind::Fence>;
pub type SemaphoreHandle = Handle<kind::Semaphore>;
pub type EventHandle = Handle<kind::Event>;

impl<K> Handle<K> {
    fn new(index: u32) -> Self {
        Self { index, _kind: PhantomData }
    }

    pub fn index(self) -> u32 {
        self.index
    }
}

// Manual impls: derives would put bounds on the marker type.
impl<K> Clone for Handle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Handle<K> {}

impl<K> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<K> Eq for Handle<K> {}

impl<K> Hash for Handle<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<K> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.index)
    }
}

/// Fixed-capacity slot allocator.
///
/// Freed slots are reused (most recently freed first) before the allocation
/// pointer advances. The slot vector never grows past `capacity`.
pub struct Pool<K, T> {
    label: &'static str,
    slots: Vec<Option<T>>,
    free: Vec<u32>,
    capacity: u32,
    live: usize,
    _kind: PhantomData<fn() -> K>,
}

impl<K, T> Pool<K, T> {
    pub fn with_capacity(label: &'static str, capacity: u32) -> Self {
        Self {
            label,
            slots: Vec::with_capacity(capacity as usize),
            free: Vec::new(),
            capacity,
            live: 0,
            _kind: PhantomData,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty() && self.slots.len() as u32 >= self.capacity
    }

    /// Checked before a native object is constructed so a full pool never
    /// leaks one.
    pub fn ensure_space(&self) -> Result<()> {
        if self.is_full() {
            anyhow::bail!("{} pool exhausted (capacity {})", self.label, self.capacity);
        }
        Ok(())
    }

    pub fn insert(&mut self, value: T) -> Result<Handle<K>> {
        let index = if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Some(value);
            index
        } else {
            self.ensure_space()?;
            self.slots.push(Some(value));
            (self.slots.len() - 1) as u32
        };
        self.live += 1;
        Ok(Handle::new(index))
    }

    pub fn remove(&mut self, handle: Handle<K>) -> T {
        let slot = self.slots.get_mut(handle.index as usize).and_then(Option::take);
        match slot {
            Some(value) => {
                self.free.push(handle.index);
                self.live -= 1;
                value
            }
            None => panic!("{} handle {} is not live", self.label, handle.index),
        }
    }

    pub fn contains(&self, handle: Handle<K>) -> bool {
        matches!(self.slots.get(handle.index as usize), Some(Some(_)))
    }

    pub fn get(&self, handle: Handle<K>) -> &T {
        match self.slots.get(handle.index as usize) {
            Some(Some(value)) => value,
            _ => panic!("{} handle {} is not live", self.label, handle.index),
        }
    }

    pub fn get_mut(&mut self, handle: Handle<K>) -> &mut T {
        let label = self.label;
        match self.slots.get_mut(handle.index as usize) {
            Some(Some(value)) => value,
            _ => panic!("{} handle {} is not live", label, handle.index),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<K>, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (Handle::new(i as u32), v)))
    }

    /// Empties every slot, yielding the live values. Capacity is unchanged.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.free.clear();
        self.live = 0;
        self.slots.drain(..).flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freed_slots_are_reused_before_growing() {
        let mut pool: Pool<kind::Buffer, u32> = Pool::with_capacity("buffer", 4);
        let a = pool.insert(10).unwrap();
        let b = pool.insert(11).unwrap();
        assert_eq!((a.index(), b.index()), (0, 1));

        assert_eq!(pool.remove(a), 10);
        let c = pool.insert(12).unwrap();
        assert_eq!(c.index(), 0);
        assert_eq!(*pool.get(c), 12);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn capacity_is_a_hard_limit() {
        let mut pool: Pool<kind::Fence, ()> = Pool::with_capacity("fence", 3);
        for _ in 0..3 {
            pool.insert(()).unwrap();
        }
        let err = pool.insert(()).unwrap_err();
        assert!(err.to_string().contains("fence pool exhausted"));
        assert!(pool.is_full());
    }

    #[test]
    fn drain_yields_live_values_only() {
        let mut pool: Pool<kind::Image, &str> = Pool::with_capacity("image", 4);
        let a = pool.insert("a").unwrap();
        pool.insert("b").unwrap();
        pool.remove(a);
        let drained: Vec<_> = pool.drain().collect();
        assert_eq!(drained, vec!["b"]);
        assert!(pool.is_empty());
        assert_eq!(pool.capacity(), 4);
    }

    #[test]
    #[should_panic(expected = "is not live")]
    fn removing_twice_is_a_contract_violation() {
        let mut pool: Pool<kind::Event, u8> = Pool::with_capacity("event", 2);
        let h = pool.insert(1).unwrap();
        pool.remove(h);
        pool.remove(h);
    }
}
