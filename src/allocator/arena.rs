use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::cell::Cell;
use std::ptr::NonNull;

use crate::error::{Error, Result};

/// Alignment of the arena's backing block.
///
/// Requests up to this alignment are satisfied by rounding the offset alone,
/// so the first allocation after a reset lands exactly where the first
/// allocation after construction did.
pub const ARENA_BASE_ALIGN: usize = 64;

/// A linear (bump) allocator backing job payloads for one frame.
///
/// The arena manages a fixed-size block and hands out memory by advancing an
/// offset. There is no per-object free: everything is reclaimed at once by
/// [`Arena::reset`]. Each worker owns its own arena, so allocation needs no
/// synchronization. The type is `Send` but not `Sync`; the compiler rejects
/// allocation from two threads at once.
///
/// Values written with [`Arena::alloc`] never have their destructors run, so
/// it only accepts types without drop glue.
pub struct Arena {
    base_ptr: NonNull<u8>,
    layout: Layout,
    capacity: usize,
    offset: Cell<usize>,
}

impl Arena {
    /// Creates an arena with `capacity` bytes of backing memory.
    ///
    /// Aborts through [`handle_alloc_error`] if the system allocator fails.
    pub fn new(capacity: usize) -> Result<Self> {
        // A zero-sized layout cannot be passed to `alloc`.
        let layout = Layout::from_size_align(capacity.max(1), ARENA_BASE_ALIGN).map_err(|_| {
            Error::InvalidConfig(format!("arena capacity {capacity} is too large"))
        })?;

        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc(layout) };
        let Some(base_ptr) = NonNull::new(ptr) else {
            handle_alloc_error(layout);
        };

        Ok(Self {
            base_ptr,
            layout,
            capacity,
            offset: Cell::new(0),
        })
    }

    /// Allocates `size` bytes aligned to `align`.
    ///
    /// Fails with [`Error::ArenaExhausted`] when the aligned block does not fit.
    /// A failed request leaves the offset untouched.
    pub fn allocate(&self, size: usize, align: usize) -> Result<NonNull<u8>> {
        if !align.is_power_of_two() {
            return Err(Error::InvalidAlignment { align });
        }

        let offset = self.offset.get();
        let base = self.base_ptr.as_ptr() as usize;
        let exhausted = || Error::ArenaExhausted {
            requested: size,
            align,
            remaining: self.capacity - offset,
            capacity: self.capacity,
        };

        // Round the absolute address so alignments above ARENA_BASE_ALIGN hold too.
        let current = base.checked_add(offset).ok_or_else(exhausted)?;
        let aligned = current.checked_add(align - 1).ok_or_else(exhausted)? & !(align - 1);
        let start = aligned - base;
        let end = start.checked_add(size).ok_or_else(exhausted)?;

        if end > self.capacity {
            return Err(exhausted());
        }

        self.offset.set(end);
        // SAFETY: start <= end <= capacity, so the pointer stays inside the block.
        Ok(unsafe { NonNull::new_unchecked(self.base_ptr.as_ptr().add(start)) })
    }

    /// Allocates memory for `layout`.
    pub fn alloc_layout(&self, layout: Layout) -> Result<NonNull<u8>> {
        self.allocate(layout.size(), layout.align())
    }

    /// Moves `value` into the arena and returns a pointer to it.
    ///
    /// The pointer stays valid until the next [`Arena::reset`] or until the
    /// arena is dropped.
    ///
    /// Nothing in the arena is ever dropped, so types with drop glue are
    /// rejected at compile time:
    ///
    /// ```compile_fail
    /// let arena = stealframe::Arena::new(256).unwrap();
    /// arena.alloc(String::from("leaked")).unwrap();
    /// ```
    pub fn alloc<T>(&self, value: T) -> Result<NonNull<T>> {
        const {
            assert!(
                !std::mem::needs_drop::<T>(),
                "arena values are never dropped"
            )
        };
        let ptr = self.alloc_layout(Layout::new::<T>())?.cast::<T>();
        // SAFETY: freshly allocated, correctly sized and aligned for T.
        unsafe {
            ptr.as_ptr().write(value);
        }
        Ok(ptr)
    }

    /// Rewinds the offset to zero, reclaiming every allocation at once.
    ///
    /// Every pointer previously returned becomes dangling. Callers must not
    /// dereference arena data (or execute jobs whose payload lives here) after
    /// this call.
    pub fn reset(&mut self) {
        self.offset.set(0);
    }

    /// Bytes handed out so far, including alignment padding.
    pub fn used_bytes(&self) -> usize {
        self.offset.get()
    }

    /// Bytes still available before alignment padding.
    pub fn remaining(&self) -> usize {
        self.capacity - self.offset.get()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if `ptr` points into this arena's backing block.
    pub fn contains<T>(&self, ptr: NonNull<T>) -> bool {
        let base = self.base_ptr.as_ptr() as usize;
        let addr = ptr.as_ptr() as usize;
        addr >= base && addr < base + self.capacity
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: base_ptr was returned by `alloc` with exactly this layout.
        unsafe {
            dealloc(self.base_ptr.as_ptr(), self.layout);
        }
    }
}

// The arena owns its block and can move between threads (e.g. into a worker
// at construction). It is NOT Sync: only the owning thread allocates.
unsafe impl Send for Arena {}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity)
            .field("used", &self.offset.get())
            .finish()
    }
}
