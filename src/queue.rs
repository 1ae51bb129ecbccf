//! Bounded work-stealing deque.
//!
//! Each worker owns one [`JobQueue`]. The owner pushes and pops at the tail
//! (LIFO, cache-warm recent work), any other thread steals from the head
//! (FIFO, older and usually larger work). Capacity is fixed: a full queue
//! rejects the push instead of overwriting live slots.
//!
//! The head/tail protocol follows the Chase-Lev deque as formulated for weak
//! memory models (Lê et al., PPoPP 2013), minus the buffer growth.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{self, AtomicIsize, Ordering};

use crossbeam::utils::CachePadded;

use crate::error::{Error, Result};
use crate::job::Job;

/// Outcome of a steal attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Steal<T = Job> {
    /// The queue looked empty.
    Empty,
    /// The head item was claimed.
    Success(T),
    /// Lost a race on the head; try another victim.
    Retry,
}

impl<T> Steal<T> {
    pub fn is_empty(&self) -> bool {
        matches!(self, Steal::Empty)
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, Steal::Retry)
    }

    pub fn success(self) -> Option<T> {
        match self {
            Steal::Success(item) => Some(item),
            _ => None,
        }
    }
}

/// Fixed-capacity ring of items with an owner end and a thief end.
///
/// Valid entries occupy `[head, tail)` modulo the capacity. Indices are
/// signed so the owner can provisionally move `tail` below `head` while it
/// races thieves for the last item.
pub struct JobQueue<T: Copy = Job> {
    head: CachePadded<AtomicIsize>,
    tail: CachePadded<AtomicIsize>,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
}

// Items cross threads through steal; slot access is arbitrated by head/tail.
unsafe impl<T: Copy + Send> Send for JobQueue<T> {}
unsafe impl<T: Copy + Send> Sync for JobQueue<T> {}

impl<T: Copy> JobQueue<T> {
    /// Creates a queue holding at least `capacity` items.
    ///
    /// The capacity is rounded up to a power of two.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();

        Self {
            head: CachePadded::new(AtomicIsize::new(0)),
            tail: CachePadded::new(AtomicIsize::new(0)),
            slots,
            mask: capacity - 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Approximate number of queued items. Exact when no thread is operating on the queue.
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, index: isize) -> *mut MaybeUninit<T> {
        self.slots[index as usize & self.mask].get()
    }

    /// Pushes an item at the tail.
    ///
    /// Fails with [`Error::QueueOverflow`] when the queue is full; nothing is
    /// written in that case.
    ///
    /// # Safety
    ///
    /// Only the thread owning this queue may call `push` or [`JobQueue::pop_local`],
    /// and never concurrently with each other.
    pub unsafe fn push(&self, item: T) -> Result<()> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if tail.wrapping_sub(head) as usize >= self.capacity() {
            return Err(Error::QueueOverflow {
                capacity: self.capacity(),
            });
        }

        // SAFETY: slot `tail` is outside [head, tail). A thief holding a stale
        // head may still be reading it; its CAS on head will fail and the value
        // it read is discarded, hence the volatile access.
        unsafe {
            ptr::write_volatile(self.slot(tail), MaybeUninit::new(item));
        }

        // Release pairs with the acquire load of tail in `steal`, publishing the slot.
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Pops the most recently pushed item.
    ///
    /// # Safety
    ///
    /// Same contract as [`JobQueue::push`]: owner thread only.
    pub unsafe fn pop_local(&self) -> Option<T> {
        let tail = self.tail.load(Ordering::Relaxed).wrapping_sub(1);
        self.tail.store(tail, Ordering::Relaxed);

        // Orders the tail store before the head load; pairs with the fence in `steal`.
        atomic::fence(Ordering::SeqCst);
        let head = self.head.load(Ordering::Relaxed);

        if head > tail {
            // Empty: undo the reservation.
            self.tail.store(tail.wrapping_add(1), Ordering::Relaxed);
            return None;
        }

        // SAFETY: head <= tail, so slot `tail` holds an item written by push.
        let item = unsafe { ptr::read_volatile(self.slot(tail)).assume_init() };

        if head == tail {
            // Last item: race the thieves for it through head.
            let won = self
                .head
                .compare_exchange(
                    head,
                    head.wrapping_add(1),
                    Ordering::SeqCst,
                    Ordering::Relaxed,
                )
                .is_ok();
            self.tail.store(tail.wrapping_add(1), Ordering::Relaxed);
            return won.then_some(item);
        }

        Some(item)
    }

    /// Attempts to take the oldest item. Callable from any thread.
    ///
    /// One attempt only: a lost race returns [`Steal::Retry`] and the caller
    /// should move on to another queue rather than spin here.
    pub fn steal(&self) -> Steal<T> {
        let head = self.head.load(Ordering::Acquire);

        // Pairs with the fence in `pop_local`.
        atomic::fence(Ordering::SeqCst);
        let tail = self.tail.load(Ordering::Acquire);

        if head >= tail {
            return Steal::Empty;
        }

        // Read before claiming: once head moves past this slot the owner may reuse it.
        // SAFETY: head < tail; a torn read is only possible if the CAS below fails.
        let item = unsafe { ptr::read_volatile(self.slot(head)) };

        if self
            .head
            .compare_exchange(
                head,
                head.wrapping_add(1),
                Ordering::SeqCst,
                Ordering::Relaxed,
            )
            .is_err()
        {
            return Steal::Retry;
        }

        // SAFETY: the CAS succeeded, so the slot was initialized and is now ours.
        Steal::Success(unsafe { item.assume_init() })
    }
}

impl<T: Copy> std::fmt::Debug for JobQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}
