//! Errors reported by the fallible side of the [`Queue`] API.
//!
//! Contention is never an error: a lost compare-and-swap just drives another
//! iteration of a retry loop. The only failure the queue can observe is the
//! allocator refusing memory for a payload or a node.
//!
//! [`Queue`]: crate::Queue

use std::alloc::Layout;
use std::fmt;

use thiserror::Error;

/// The allocator could not provide memory for a payload or a chain node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("memory allocation of {} bytes failed", .layout.size())]
pub struct AllocError {
    layout: Layout,
}

impl AllocError {
    pub(crate) fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// The layout of the allocation that failed.
    pub fn layout(&self) -> Layout {
        self.layout
    }
}

/// Returned by [`Queue::try_push`] when the item could not be enqueued.
///
/// The item is handed back untouched and can be recovered with
/// [`TryPushError::into_inner`].
///
/// [`Queue::try_push`]: crate::Queue::try_push
#[derive(Error)]
#[error("failed to push an item into the queue: {source}")]
pub struct TryPushError<T> {
    item: T,
    source: AllocError,
}

impl<T> TryPushError<T> {
    pub(crate) fn new(item: T, source: AllocError) -> Self {
        Self { item, source }
    }

    /// Returns the item that was not pushed.
    pub fn into_inner(self) -> T {
        self.item
    }

    /// The allocation failure that prevented the push.
    pub fn alloc_error(&self) -> AllocError {
        self.source
    }
}

// Mirrors `std::sync::mpsc::SendError`: the payload is opaque so callers can
// propagate the error for any `T`.
impl<T> fmt::Debug for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TryPushError")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
