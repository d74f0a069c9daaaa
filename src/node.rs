//! A cell of the queue's chain.
//!
//! Each [`Node`] holds at most one item in its [`Slot`] and a pointer to the next
//! [`Node`] of the [`Queue`]. Both are claimed at most once: `next` is only linked
//! after the slot has been filled, so every node that has a successor holds, or held,
//! an item.
//!
//! Once unlinked from the head of the queue, a node is threaded into the retirement
//! bag through its own `retired` link. `next` is left untouched so a thread still
//! holding a stale pointer to the node reads the same successor it always did.
//!
//! [`Queue`]: crate::queue::Queue

use crate::alloc::try_box;
use crate::error::AllocError;
use crate::slot::Slot;
use crate::variant::sync::atomic::{AtomicPtr, Ordering};

use std::ptr;

#[derive(Debug)]
pub(crate) struct Node<T> {
    /// The item stored in this node, if any.
    pub(crate) slot: Slot<T>,

    /// A pointer to the next [`Node`] of the [`Queue`] if any.
    ///
    /// [`Queue`]: crate::queue::Queue
    pub(crate) next: AtomicPtr<Node<T>>,

    /// Link to the next retired [`Node`] while this one sits in the retirement bag.
    pub(crate) retired: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn new() -> Self {
        Self {
            slot: Slot::new(),
            next: AtomicPtr::new(ptr::null_mut()),
            retired: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Allocates an empty [`Node`] on the heap.
    pub(crate) fn try_alloc() -> Result<*mut Self, AllocError> {
        try_box(Self::new())
            .map(|node| node.as_ptr())
            .map_err(|(_, err)| err)
    }

    /// Releases a [`Node`] allocated with [`Node::try_alloc`], and the item it still owns if any.
    ///
    /// # Safety
    ///
    /// `node` must not be reachable by any other thread.
    pub(crate) unsafe fn dealloc(node: *mut Self) {
        drop(unsafe { Box::from_raw(node) });
    }

    /// Tries to link `next` after this node. Only one caller ever succeeds.
    pub(crate) fn try_link(&self, next: *mut Self) -> bool {
        self.next
            .compare_exchange(ptr::null_mut(), next, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn next(&self) -> *mut Self {
        self.next.load(Ordering::SeqCst)
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn link_is_single_writer() {
        let node = Node::<usize>::try_alloc().unwrap();
        let first = Node::try_alloc().unwrap();
        let second = Node::try_alloc().unwrap();

        unsafe {
            assert!((*node).next().is_null());
            assert!((*node).try_link(first));
            assert!(!(*node).try_link(second));
            assert_eq!((*node).next(), first);

            Node::dealloc(second);
            Node::dealloc(first);
            Node::dealloc(node);
        }
    }
}
