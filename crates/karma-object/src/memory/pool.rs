//! Pooled object allocator
//!
//! A bump allocator that carves object memory out of one pre-sized arena and
//! falls back to the global heap once the arena is exhausted.
//!
//! Individual allocations are never freed. The arena and every heap-fallback
//! block are released together by [`PooledObjectAllocator::shut_down`].

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;

/// Every object allocation is at least this aligned
pub const MIN_OBJECT_ALIGNMENT: usize = 16;

/// Backing memory of the permanent pool
#[derive(Debug)]
struct Arena {
    base: NonNull<u8>,
    layout: Layout,
}

impl Arena {
    fn capacity(&self) -> usize {
        self.layout.size()
    }

    fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }
}

/// Bump allocator for object instances
///
/// ```text
/// base                      tail               base + capacity
///  │ obj │pad│ obj │ obj │   │    free          │
///  └───────────────────────────────────────────┘
///                                              exceeded_tail ──▶ (may run past the end)
/// ```
///
/// `tail` is the next free offset inside the arena. `exceeded_tail` advances
/// for every permanent request, even those served by the heap, and measures
/// how large the arena would have had to be.
#[derive(Debug, Default)]
pub struct PooledObjectAllocator {
    /// Permanent pool (None until initialized)
    arena: Option<Arena>,

    /// Next free offset inside the arena
    tail: usize,

    /// Offset the arena would have reached if it were unbounded
    exceeded_tail: usize,

    /// Heap-fallback blocks, released at shutdown
    heap_blocks: Vec<(NonNull<u8>, Layout)>,

    /// Number of allocations served by the arena
    arena_allocation_count: usize,

    /// Whether the first overflow has been reported
    overflow_reported: bool,

    /// Overflow notice not yet collected by the owner
    pending_overflow: Option<usize>,
}

/// Offset of the first `align`-aligned address at or after `base + offset`
///
/// `None` when the address space overflows.
#[inline]
fn aligned_offset(base: usize, offset: usize, align: usize) -> Option<usize> {
    let addr = base.checked_add(offset)?.checked_add(align - 1)?;
    Some((addr & !(align - 1)) - base)
}

impl PooledObjectAllocator {
    /// Create an allocator without an arena; every request goes to the heap
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the arena for `element_count` elements of `element_size` bytes
    ///
    /// Returns `false` if the allocator already has an arena.
    pub fn initialize(&mut self, element_size: usize, element_count: usize) -> bool {
        if self.arena.is_some() {
            return false;
        }

        let capacity = element_size.saturating_mul(element_count);
        if capacity == 0 {
            log::debug!("Pooled allocator initialized without an arena");
            return true;
        }

        let layout = match Layout::from_size_align(capacity, MIN_OBJECT_ALIGNMENT) {
            Ok(layout) => layout,
            Err(_) => {
                log::warn!("Pooled allocator arena of {} bytes is not representable", capacity);
                return true;
            }
        };

        let base = unsafe { alloc(layout) };
        let base = match NonNull::new(base) {
            Some(base) => base,
            None => handle_alloc_error(layout),
        };

        log::debug!(
            "Pooled allocator arena: {} elements x {} bytes at {:p}",
            element_count,
            element_size,
            base
        );

        self.arena = Some(Arena { base, layout });
        self.tail = 0;
        self.exceeded_tail = 0;
        true
    }

    /// Whether an arena has been set up
    pub fn is_initialized(&self) -> bool {
        self.arena.is_some()
    }

    /// Allocate raw, uninitialized memory for an object
    ///
    /// The effective alignment is `max(16, alignment)`. With `allow_permanent`
    /// the arena is tried first; otherwise, or when it is full, the block comes
    /// from the heap. The caller zero-fills and constructs the object.
    ///
    /// A request whose end does not fit in the address space never touches
    /// the arena cursors beyond saturating the overflow measure.
    ///
    /// # Panics
    ///
    /// Panics if `size` and `alignment` do not form a valid [`Layout`].
    pub fn allocate_object(
        &mut self,
        size: usize,
        alignment: usize,
        allow_permanent: bool,
    ) -> NonNull<u8> {
        let alignment = match alignment.max(MIN_OBJECT_ALIGNMENT).checked_next_power_of_two() {
            Some(alignment) => alignment,
            None => panic!("Invalid object alignment: {}", alignment),
        };

        if allow_permanent {
            if let Some(arena) = &self.arena {
                let base = arena.base_addr();
                let capacity = arena.capacity();

                self.exceeded_tail = aligned_offset(base, self.exceeded_tail, alignment)
                    .and_then(|start| start.checked_add(size))
                    .unwrap_or(usize::MAX);

                let fit = aligned_offset(base, self.tail, alignment).and_then(|aligned| {
                    let end = aligned.checked_add(size)?;
                    (end <= capacity).then_some((aligned, end))
                });
                if let Some((aligned, end)) = fit {
                    self.tail = end;
                    self.arena_allocation_count += 1;
                    log::trace!(
                        "Arena allocation of {} bytes at offset {} (align {})",
                        size,
                        aligned,
                        alignment
                    );
                    // SAFETY: aligned + size <= capacity, so the offset is in bounds
                    return unsafe { NonNull::new_unchecked(arena.base.as_ptr().add(aligned)) };
                }

                let exceeded = self.exceeded_bytes();
                if !self.overflow_reported {
                    self.overflow_reported = true;
                    log::warn!(
                        "Pooled allocator arena of {} bytes exhausted, falling back to the heap",
                        capacity
                    );
                }
                self.pending_overflow = Some(exceeded);
            }
        }

        self.allocate_from_heap(size, alignment)
    }

    fn allocate_from_heap(&mut self, size: usize, alignment: usize) -> NonNull<u8> {
        let layout = match Layout::from_size_align(size.max(1), alignment) {
            Ok(layout) => layout,
            Err(_) => panic!("Invalid object layout: {} bytes aligned to {}", size, alignment),
        };

        let ptr = unsafe { alloc(layout) };
        let ptr = match NonNull::new(ptr) {
            Some(ptr) => ptr,
            None => handle_alloc_error(layout),
        };

        log::trace!("Heap allocation of {} bytes (align {})", size, alignment);
        self.heap_blocks.push((ptr, layout));
        ptr
    }

    /// Take the latest arena overflow notice, if any
    ///
    /// Returns the number of bytes requested beyond the arena's end at the
    /// time of the most recent overflow.
    pub fn take_overflow_notice(&mut self) -> Option<usize> {
        self.pending_overflow.take()
    }

    /// Arena size in bytes (0 when uninitialized)
    pub fn arena_capacity(&self) -> usize {
        self.arena.as_ref().map_or(0, Arena::capacity)
    }

    /// Bytes consumed from the arena, including alignment padding
    pub fn arena_used(&self) -> usize {
        self.tail
    }

    /// Bytes remaining in the arena
    pub fn arena_remaining(&self) -> usize {
        self.arena_capacity() - self.tail
    }

    /// How far permanent requests have run past the end of the arena
    pub fn exceeded_bytes(&self) -> usize {
        self.exceeded_tail.saturating_sub(self.arena_capacity())
    }

    /// Total size the arena would have needed for all permanent requests
    pub fn requested_permanent_bytes(&self) -> usize {
        self.exceeded_tail
    }

    /// Number of allocations served by the arena
    pub fn arena_allocation_count(&self) -> usize {
        self.arena_allocation_count
    }

    /// Number of allocations served by the heap fallback
    pub fn heap_fallback_count(&self) -> usize {
        self.heap_blocks.len()
    }

    /// Whether `ptr` points into the arena
    pub fn contains(&self, ptr: *const u8) -> bool {
        match &self.arena {
            Some(arena) => {
                let addr = ptr as usize;
                addr >= arena.base_addr() && addr < arena.base_addr() + arena.capacity()
            }
            None => false,
        }
    }

    /// Release the arena and every heap-fallback block
    ///
    /// Objects living in this memory must already have been dropped.
    pub fn shut_down(&mut self) {
        for (ptr, layout) in self.heap_blocks.drain(..) {
            // SAFETY: each block was allocated with exactly this layout
            unsafe { dealloc(ptr.as_ptr(), layout) };
        }

        if let Some(arena) = self.arena.take() {
            if self.exceeded_tail > arena.capacity() {
                log::info!(
                    "Pooled allocator arena was {} bytes, permanent requests needed {}",
                    arena.capacity(),
                    self.exceeded_tail
                );
            }
            // SAFETY: the arena was allocated with this layout in `initialize`
            unsafe { dealloc(arena.base.as_ptr(), arena.layout) };
        }

        self.tail = 0;
        self.exceeded_tail = 0;
        self.arena_allocation_count = 0;
        self.overflow_reported = false;
        self.pending_overflow = None;
    }
}

impl Drop for PooledObjectAllocator {
    fn drop(&mut self) {
        self.shut_down();
    }
}
