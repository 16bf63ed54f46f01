//! Object pool implementation
//!
//! Fixed-capacity slab for context entities (IMPI/IMPU records and the like).
//! Capacity is decided once, at configuration time, and never grows.
//!
//! Free slots are kept in a circular buffer (head/tail), so a released slot
//! goes to the back of the queue and is the last to be handed out again.
//! Every slot carries a generation counter that is bumped on release; a
//! [`PoolHandle`] taken before the release never resolves afterwards, even
//! once the slot has been reused.

use thiserror::Error;

/// Pool error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("{name} pool exhausted (capacity {capacity})")]
    Exhausted { name: String, capacity: usize },
}

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Handle to an allocated pool slot
///
/// Handles are plain values: copying one does not keep the slot alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    index: usize,
    generation: u32,
}

impl PoolHandle {
    /// Slot index inside the pool (0-based)
    pub fn index(&self) -> usize {
        self.index
    }

    /// Generation of the slot at allocation time
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

struct Slot<T> {
    generation: u32,
    item: Option<T>,
}

/// Fixed-capacity object pool
pub struct OgsPool<T> {
    /// Name of the pool (for logging)
    name: String,
    /// Circular buffer head (next slot to hand out)
    head: usize,
    /// Circular buffer tail (where released slots are queued)
    tail: usize,
    /// Total size of the pool
    size: usize,
    /// Number of available slots
    avail: usize,
    /// Free list (circular buffer of slot indices)
    free: Vec<usize>,
    /// Storage
    slots: Vec<Slot<T>>,
}

impl<T> OgsPool<T> {
    /// Create a new pool with the given capacity
    pub fn new(name: &str, size: usize) -> Self {
        let free = (0..size).collect();
        let slots = (0..size)
            .map(|_| Slot {
                generation: 0,
                item: None,
            })
            .collect();

        log::debug!("[{name}] pool created (size={size})");

        OgsPool {
            name: name.to_string(),
            head: 0,
            tail: 0,
            size,
            avail: size,
            free,
            slots,
        }
    }

    /// Store `item` in a free slot
    pub fn alloc(&mut self, item: T) -> PoolResult<PoolHandle> {
        if self.avail == 0 {
            return Err(PoolError::Exhausted {
                name: self.name.clone(),
                capacity: self.size,
            });
        }

        let index = self.free[self.head];
        self.head = (self.head + 1) % self.size;
        self.avail -= 1;

        let slot = &mut self.slots[index];
        slot.item = Some(item);

        Ok(PoolHandle {
            index,
            generation: slot.generation,
        })
    }

    /// Release a slot, returning the item it held
    ///
    /// Returns `None` for a stale or foreign handle; the pool is left
    /// untouched in that case, so double free is harmless.
    pub fn free(&mut self, handle: PoolHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        let item = slot.item.take()?;
        slot.generation = slot.generation.wrapping_add(1);

        self.free[self.tail] = handle.index;
        self.tail = (self.tail + 1) % self.size;
        self.avail += 1;

        Some(item)
    }

    /// Get item by handle
    pub fn find(&self, handle: PoolHandle) -> Option<&T> {
        let slot = self.slots.get(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.item.as_ref()
    }

    /// Get mutable item by handle
    pub fn find_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.item.as_mut()
    }

    /// Get number of available slots
    pub fn available(&self) -> usize {
        self.avail
    }

    /// Get total capacity
    pub fn capacity(&self) -> usize {
        self.size
    }

    /// Get number of allocated objects
    pub fn allocated(&self) -> usize {
        self.size - self.avail
    }

    /// Check if nothing is allocated
    pub fn is_empty(&self) -> bool {
        self.avail == self.size
    }

    /// Check if every slot is allocated
    pub fn is_full(&self) -> bool {
        self.avail == 0
    }

    /// Get pool name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Iterate over allocated items in slot order
    pub fn iter(&self) -> impl Iterator<Item = (PoolHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.item.as_ref().map(|item| {
                (
                    PoolHandle {
                        index,
                        generation: slot.generation,
                    },
                    item,
                )
            })
        })
    }
}
