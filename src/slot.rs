//! Holds the item of a [`Node`].
//!
//! A [`Slot`] is a single atomic pointer that only ever moves forward through three
//! states:
//!
//! ```txt
//! VACANT    null               -> no item was ever stored, the slot can be claimed.
//! OCCUPIED  boxed item         -> a producer won the claim, the slot owns the item.
//! CONSUMED  `CONSUMED` address -> a consumer moved the item out.
//! ```
//!
//! A consumed slot stays non-null on purpose: a producer holding a stale view of
//! `tail` must see it as taken, otherwise it could store an item into a node that is
//! no longer part of the chain.
//!
//! [`Node`]: crate::node::Node

use crate::variant::sync::atomic::{AtomicPtr, Ordering};

use std::ptr;

/// Its address marks a consumed slot. A static never shares an address with a heap
/// allocation nor with the dangling pointers used for zero-sized items.
static CONSUMED: u8 = 0;

fn consumed<T>() -> *mut T {
    ptr::addr_of!(CONSUMED).cast_mut().cast::<T>()
}

/// Holds the item of a [`Node`].
///
/// [`Node`]: crate::node::Node
#[derive(Debug)]
pub(crate) struct Slot<T> {
    item: AtomicPtr<T>,
}

impl<T> Slot<T> {
    pub(crate) fn new() -> Self {
        Self {
            item: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Reports whether no item was ever stored in the slot.
    pub(crate) fn is_vacant(&self) -> bool {
        self.item.load(Ordering::SeqCst).is_null()
    }

    /// Tries to store `item` into a vacant slot. Only one caller ever succeeds.
    ///
    /// On success the slot takes ownership of the boxed item; on failure the caller
    /// keeps it.
    pub(crate) fn try_claim(&self, item: *mut T) -> bool {
        debug_assert!(!item.is_null());
        self.item
            .compare_exchange(ptr::null_mut(), item, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Moves the item out of the slot, leaving it consumed.
    ///
    /// # Safety
    ///
    /// The caller must be the only thread allowed to consume this slot, i.e. the thread
    /// that unlinked its node from the head of the queue.
    pub(crate) unsafe fn take(&self) -> Option<T> {
        let item = self.item.swap(consumed(), Ordering::SeqCst);
        if item.is_null() || item == consumed() {
            return None;
        }

        // SAFETY: the item was boxed by a producer and ownership is transferred once,
        // the swap above guarantees no other consumer sees it.
        Some(*unsafe { Box::from_raw(item) })
    }
}

impl<T> Drop for Slot<T> {
    fn drop(&mut self) {
        let item = self.item.load(Ordering::SeqCst);
        if !item.is_null() && item != consumed() {
            // SAFETY: an occupied slot owns its boxed item.
            drop(unsafe { Box::from_raw(item) });
        }
    }
}
