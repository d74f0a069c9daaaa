//! Deferred reclamation of the nodes unlinked from the [`Queue`].
//!
//! A node removed from the head of the queue may still be dereferenced by any thread
//! that loaded a pointer to it before it was unlinked. Such a node goes into a
//! lock-free retirement bag and is only released once no operation that could hold
//! a stale pointer is still running.
//!
//! Every operation that dereferences chain nodes (push, pop, emptiness check) first
//! registers its [`Participation`]. The counter of participants decides when freeing is
//! safe: a thread leaving an operation in isolation swaps the whole bag out and, if the
//! counter then drops to zero, frees what it captured. A thread that loaded a pointer
//! to a node before the node was unlinked is, by construction, still counted when the
//! node gets retired, so it keeps the counter from reaching zero until it leaves.
//! Threads entering after the unlink can't reach the node anymore: the queue moves
//! `tail` past a node before unlinking it, and `next` links only point forward.
//!
//! Under sustained contention the bag keeps growing until some operation completes
//! alone. Dropping the [`Reclaimer`] releases whatever is left.
//!
//! [`Queue`]: crate::queue::Queue

use crate::cache_pad::CachePad;
use crate::node::Node;
use crate::variant::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use std::mem;
use std::ptr;

use tracing::trace;

#[derive(Debug)]
pub(crate) struct Reclaimer<T> {
    /// Head of the retirement bag, threaded through [`Node::retired`].
    bag: CachePad<AtomicPtr<Node<T>>>,

    /// Number of threads currently inside a queue operation.
    active: CachePad<AtomicUsize>,
}

impl<T> Reclaimer<T> {
    pub(crate) fn new() -> Self {
        Self {
            bag: CachePad::new(AtomicPtr::new(ptr::null_mut())),
            active: CachePad::new(AtomicUsize::new(0)),
        }
    }

    /// Registers the calling thread as a participant until the returned guard is dropped
    /// or used to retire a node.
    pub(crate) fn enter(&self) -> Participation<'_, T> {
        let _ = self.active.fetch_add(1, Ordering::SeqCst);
        Participation { reclaimer: self }
    }

    /// Ends a participation, retiring `unlinked` if it is not null.
    fn leave(&self, unlinked: *mut Node<T>) {
        let alone = self.active.load(Ordering::SeqCst) == 1;
        if alone && (!unlinked.is_null() || !self.bag.load(Ordering::SeqCst).is_null()) {
            let captured = self.bag.swap(ptr::null_mut(), Ordering::SeqCst);

            if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
                // No other operation was running when we left: neither the captured
                // nodes nor the unlinked one can be referenced by another thread.
                let mut freed = unsafe { free_list(captured) };
                if !unlinked.is_null() {
                    unsafe { Node::dealloc(unlinked) };
                    freed += 1;
                }
                trace!(freed, "reclaimed retired nodes");
            } else {
                // Another operation started in the meantime and may hold pointers we
                // can't account for; hand everything back to the bag.
                let mut deferred = 0;
                let mut node = captured;
                while !node.is_null() {
                    // Read the link before publishing the node: once back in the bag
                    // another thread may free it.
                    let next = unsafe { (*node).retired.load(Ordering::SeqCst) };
                    unsafe { self.defer(node) };
                    deferred += 1;
                    node = next;
                }
                if !unlinked.is_null() {
                    unsafe { self.defer(unlinked) };
                    deferred += 1;
                }
                trace!(deferred, "reclamation contended, nodes returned to the bag");
            }
            return;
        }

        if !unlinked.is_null() {
            unsafe { self.defer(unlinked) };
        }
        let _ = self.active.fetch_sub(1, Ordering::SeqCst);
    }

    /// Pushes `node` onto the retirement bag.
    ///
    /// # Safety
    ///
    /// `node` must be unreachable from the queue and owned by the caller. It must not be
    /// dereferenced by the caller once pushed.
    unsafe fn defer(&self, node: *mut Node<T>) {
        let mut top = self.bag.load(Ordering::SeqCst);
        loop {
            unsafe { (*node).retired.store(top, Ordering::SeqCst) };
            match self
                .bag
                .compare_exchange(top, node, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return,
                Err(current) => top = current,
            }
        }
    }

    #[cfg(all(test, not(loom)))]
    pub(crate) fn retired(&self) -> usize {
        let mut count = 0;
        let mut node = self.bag.load(Ordering::SeqCst);
        while !node.is_null() {
            count += 1;
            node = unsafe { (*node).retired.load(Ordering::SeqCst) };
        }
        count
    }

    #[cfg(all(test, not(loom)))]
    pub(crate) fn participants(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl<T> Drop for Reclaimer<T> {
    fn drop(&mut self) {
        let bag = self.bag.swap(ptr::null_mut(), Ordering::SeqCst);
        // SAFETY: `&mut self` proves no operation is running.
        let freed = unsafe { free_list(bag) };
        trace!(freed, "released the retirement bag");
    }
}

/// Releases every node of a list threaded through [`Node::retired`]. Returns how many
/// nodes were freed.
///
/// # Safety
///
/// No other thread may reference any node of the list.
unsafe fn free_list<T>(mut node: *mut Node<T>) -> usize {
    let mut freed = 0;
    while !node.is_null() {
        let next = unsafe { (*node).retired.load(Ordering::SeqCst) };
        unsafe { Node::dealloc(node) };
        freed += 1;
        node = next;
    }
    freed
}

/// Keeps the calling thread registered as a participant of the [`Reclaimer`].
///
/// Dropping the guard ends the participation and, when the thread turns out to be
/// alone, flushes the retirement bag.
#[derive(Debug)]
#[must_use]
pub(crate) struct Participation<'a, T> {
    reclaimer: &'a Reclaimer<T>,
}

impl<T> Participation<'_, T> {
    /// Ends the participation and hands an unlinked node over to reclamation.
    ///
    /// # Safety
    ///
    /// `node` must have been unlinked from the head of the queue by the calling thread,
    /// with `tail` already past it, and must not be retired twice.
    pub(crate) unsafe fn retire(self, node: *mut Node<T>) {
        let reclaimer = self.reclaimer;
        mem::forget(self);
        reclaimer.leave(node);
    }
}

impl<T> Drop for Participation<'_, T> {
    fn drop(&mut self) {
        self.reclaimer.leave(ptr::null_mut());
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as StdOrdering};
    use std::sync::Arc;

    struct Counted(Arc<AtomicUsize>);

    impl Drop for Counted {
        fn drop(&mut self) {
            let _ = self.0.fetch_add(1, StdOrdering::SeqCst);
        }
    }

    // A node still owning an item makes its release observable.
    fn node_with(drops: &Arc<AtomicUsize>) -> *mut Node<Counted> {
        let node = Node::try_alloc().unwrap();
        let item = Box::into_raw(Box::new(Counted(drops.clone())));
        assert!(unsafe { (*node).slot.try_claim(item) });
        node
    }

    #[test]
    fn retire_alone_frees_immediately() {
        let drops = Arc::new(AtomicUsize::new(0));
        let reclaimer = Reclaimer::new();

        let participation = reclaimer.enter();
        assert_eq!(reclaimer.participants(), 1);
        unsafe { participation.retire(node_with(&drops)) };

        assert_eq!(drops.load(StdOrdering::SeqCst), 1);
        assert_eq!(reclaimer.retired(), 0);
        assert_eq!(reclaimer.participants(), 0);
    }

    #[test]
    fn retire_under_contention_defers() {
        let drops = Arc::new(AtomicUsize::new(0));
        let reclaimer = Reclaimer::new();

        let first = reclaimer.enter();
        let second = reclaimer.enter();
        unsafe { first.retire(node_with(&drops)) };
        unsafe { second.retire(node_with(&drops)) };

        // `second` left alone and flushed both nodes.
        assert_eq!(drops.load(StdOrdering::SeqCst), 2);
        assert_eq!(reclaimer.retired(), 0);
    }

    #[test]
    fn plain_exit_flushes_the_bag() {
        let drops = Arc::new(AtomicUsize::new(0));
        let reclaimer = Reclaimer::new();

        let reader = reclaimer.enter();
        let popper = reclaimer.enter();
        unsafe { popper.retire(node_with(&drops)) };
        assert_eq!(reclaimer.retired(), 1);
        assert_eq!(drops.load(StdOrdering::SeqCst), 0);

        drop(reader);
        assert_eq!(reclaimer.retired(), 0);
        assert_eq!(drops.load(StdOrdering::SeqCst), 1);
        assert_eq!(reclaimer.participants(), 0);
    }

    #[test]
    fn plain_exit_with_empty_bag_only_leaves() {
        let reclaimer = Reclaimer::<usize>::new();
        let participation = reclaimer.enter();
        drop(participation);
        assert_eq!(reclaimer.participants(), 0);
        assert_eq!(reclaimer.retired(), 0);
    }

    #[test]
    fn drop_releases_what_contention_left_behind() {
        let drops = Arc::new(AtomicUsize::new(0));
        {
            let reclaimer = Reclaimer::new();
            let stuck = reclaimer.enter();
            for _ in 0..3 {
                let participation = reclaimer.enter();
                unsafe { participation.retire(node_with(&drops)) };
            }
            assert_eq!(reclaimer.retired(), 3);
            assert_eq!(drops.load(StdOrdering::SeqCst), 0);

            // Simulates an operation that never observed a quiet moment.
            mem::forget(stuck);
        }
        assert_eq!(drops.load(StdOrdering::SeqCst), 3);
    }
}
