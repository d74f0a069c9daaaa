//! A lock-free multi-producer multi-consumer unbounded queue.

use crate::alloc::try_box;
use crate::cache_pad::CachePad;
use crate::error::{AllocError, TryPushError};
use crate::node::Node;
use crate::reclaim::Reclaimer;
use crate::variant::sync::atomic::{AtomicPtr, Ordering};
use crate::variant::sync::Arc;

use std::alloc::handle_alloc_error;
use std::marker::PhantomData;
use std::ptr;

use tracing::{debug, trace};

/// A lock-free multi-producer multi-consumer unbounded queue.
///
/// Cloning a [`Queue`] returns a new handle to the same queue. The items still in
/// the queue are dropped with the last handle.
#[derive(Debug)]
pub struct Queue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Queue<T> {
    /// Creates a new [`Queue`].
    ///
    /// # Examples
    ///
    /// ```
    /// use lf_fifo::Queue;
    ///
    /// let queue = Queue::<usize>::new();
    /// assert!(queue.is_empty());
    /// ```
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::new()),
        }
    }

    /// Push an item into the [`Queue`].
    ///
    /// Aborts through [`handle_alloc_error`] if memory for the item or for the
    /// queue's next node can't be allocated. Use [`Queue::try_push`] to recover from
    /// that case.
    ///
    /// # Examples
    ///
    /// ```
    /// use lf_fifo::Queue;
    ///
    /// let queue = Queue::<usize>::new();
    ///
    /// queue.push(1);
    /// queue.push(2);
    /// queue.push(3);
    /// ```
    pub fn push(&self, item: T) {
        if let Err(err) = self.inner.try_push(item) {
            handle_alloc_error(err.alloc_error().layout());
        }
    }

    /// Push an item into the [`Queue`], handing it back if memory runs out.
    ///
    /// # Examples
    ///
    /// ```
    /// use lf_fifo::Queue;
    ///
    /// let queue = Queue::<String>::new();
    ///
    /// if let Err(err) = queue.try_push(String::from("item")) {
    ///     let item: String = err.into_inner();
    ///     eprintln!("could not enqueue {}", item);
    /// }
    /// ```
    pub fn try_push(&self, item: T) -> Result<(), TryPushError<T>> {
        self.inner.try_push(item)
    }

    /// Pop an item from the [`Queue`]. Returns none if the [`Queue`] is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use lf_fifo::Queue;
    ///
    /// let queue = Queue::<usize>::new();
    /// for i in 0..8 {
    ///   queue.push(i);
    /// }
    ///
    /// for i in 0..8 {
    ///   assert_eq!(i, queue.pop().unwrap());
    /// }
    ///
    /// assert!(queue.pop().is_none());
    /// ```
    pub fn pop(&self) -> Option<T> {
        self.inner.pop()
    }

    /// Reports whether the [`Queue`] held no item at some point during the call.
    ///
    /// Other threads may push or pop right after, so the answer is only a hint
    /// while the queue is shared.
    ///
    /// # Examples
    ///
    /// ```
    /// use lf_fifo::Queue;
    ///
    /// let queue = Queue::<usize>::new();
    /// assert!(queue.is_empty());
    ///
    /// queue.push(1);
    /// assert!(!queue.is_empty());
    ///
    /// let _ = queue.pop();
    /// assert!(queue.is_empty());
    /// ```
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct Inner<T> {
    /// The oldest node still linked. It holds the front item unless the queue is empty.
    head: CachePad<AtomicPtr<Node<T>>>,

    /// The last node of the chain, or one of its predecessors while an extension is
    /// in progress. Never behind `head`.
    tail: CachePad<AtomicPtr<Node<T>>>,

    reclaimer: Reclaimer<T>,

    _marker: PhantomData<Box<T>>,
}

// Items are moved between threads through the raw pointers of the chain.
unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

impl<T> Inner<T> {
    fn new() -> Self {
        let first_node = match Node::try_alloc() {
            Ok(node) => node,
            Err(err) => handle_alloc_error(err.layout()),
        };

        Self {
            head: CachePad::new(AtomicPtr::new(first_node)),
            tail: CachePad::new(AtomicPtr::new(first_node)),
            reclaimer: Reclaimer::new(),
            _marker: PhantomData,
        }
    }

    fn try_push(&self, item: T) -> Result<(), TryPushError<T>> {
        // Everything that can fail is allocated before the item becomes visible, so a
        // failure can still hand the item back.
        let mut spare = match Node::try_alloc() {
            Ok(node) => node,
            Err(err) => return Err(TryPushError::new(item, err)),
        };
        let item = match try_box(item) {
            Ok(item) => item.as_ptr(),
            Err((item, err)) => {
                unsafe { Node::dealloc(spare) };
                return Err(TryPushError::new(item, err));
            }
        };

        let _participation = self.reclaimer.enter();

        loop {
            let tail = self.tail.load(Ordering::SeqCst);

            // SAFETY: `tail` never points to an unlinked node when loaded, and the
            // participation keeps it allocated afterwards.
            if unsafe { (*tail).slot.try_claim(item) } {
                break;
            }

            // Another producer filled this node first, help it extend the chain
            // before trying again.
            if let Err(err) = self.extend_tail(&mut spare) {
                unsafe { Self::release_spare(spare) };
                // SAFETY: the claim failed, the item was never published.
                let item = unsafe { *Box::from_raw(item) };
                return Err(TryPushError::new(item, err));
            }
        }

        // The item is in the queue. Leave a vacant node behind it for the next push; if
        // that fails here, the next push or pop completes the extension.
        if let Err(err) = self.extend_tail(&mut spare) {
            debug!(error = %err, "could not allocate a spare node, tail extension left to other threads");
        }
        unsafe { Self::release_spare(spare) };

        Ok(())
    }

    /// Extends the chain until `tail` rests on a node whose slot is vacant.
    ///
    /// `spare` is used to extend the chain when needed and is replaced once linked,
    /// so it points to an unpublished node (or is null) when this returns. The caller
    /// must be participating.
    fn extend_tail(&self, spare: &mut *mut Node<T>) -> Result<(), AllocError> {
        let mut tail = self.tail.load(Ordering::SeqCst);

        while !unsafe { (*tail).slot.is_vacant() } {
            if spare.is_null() {
                *spare = Node::try_alloc()?;
            }

            // Only one thread links a node after `tail`, the others just move on.
            if unsafe { (*tail).try_link(*spare) } {
                *spare = ptr::null_mut();
            }

            // Whoever linked the node, move `tail` forward. Failing means another thread
            // already did it.
            let next = unsafe { (*tail).next() };
            let _ = self
                .tail
                .compare_exchange(tail, next, Ordering::SeqCst, Ordering::SeqCst);

            tail = self.tail.load(Ordering::SeqCst);
        }

        Ok(())
    }

    /// # Safety
    ///
    /// `spare` must be null or a node that was never linked into the chain.
    unsafe fn release_spare(spare: *mut Node<T>) {
        if !spare.is_null() {
            unsafe { Node::dealloc(spare) };
        }
    }

    fn pop(&self) -> Option<T> {
        let participation = self.reclaimer.enter();

        loop {
            let head = self.head.load(Ordering::SeqCst);
            let next = unsafe { (*head).next() };

            if next.is_null() {
                if unsafe { (*head).slot.is_vacant() } {
                    return None;
                }

                // A producer stored the front item but hasn't extended the chain yet.
                // Finish the extension for it instead of waiting.
                let mut spare = ptr::null_mut();
                let extended = self.extend_tail(&mut spare);
                unsafe { Self::release_spare(spare) };
                if let Err(err) = extended {
                    debug!(error = %err, "could not allocate a spare node, front item left in place");
                    return None;
                }
                continue;
            }

            // `tail` must never point to an unlinked node, move it past `head` first.
            if self.tail.load(Ordering::SeqCst) == head {
                let _ = self
                    .tail
                    .compare_exchange(head, next, Ordering::SeqCst, Ordering::SeqCst);
            }

            if self
                .head
                .compare_exchange(head, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                // SAFETY: this thread unlinked `head`, it is the only one allowed to
                // consume its slot and to retire it.
                unsafe {
                    let item = (*head).slot.take();
                    debug_assert!(item.is_some(), "a linked node always holds an item");
                    participation.retire(head);
                    return item;
                }
            }
        }
    }

    fn is_empty(&self) -> bool {
        let _participation = self.reclaimer.enter();
        let head = self.head.load(Ordering::SeqCst);
        unsafe { (*head).slot.is_vacant() }
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        let mut drained = 0usize;
        while self.pop().is_some() {
            drained += 1;
        }

        // `pop` only gives up on a head without successor, so the chain is down to
        // that one node. It may still own an item if the last extension could not
        // allocate.
        let head = self.head.load(Ordering::SeqCst);
        debug_assert!(unsafe { (*head).next() }.is_null());
        unsafe { Node::dealloc(head) };

        trace!(drained, "queue dropped");
    }
}
