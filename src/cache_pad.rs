//! Keeps the queue's hot atomics on separate cache lines.
//!
//! `head` is written by consumers, `tail` by producers, and the retirement bag and
//! participation counter by every thread leaving an operation. Sharing a line between
//! any two of them would make unrelated threads invalidate each other's caches
//! ([false sharing](https://en.wikipedia.org/wiki/False_sharing)).
//!
//! # Size and alignment
//!
//! Cache lines are assumed to be N bytes long, depending on the architecture:
//!
//! - On x86_64 and aarch64, N = 128 (adjacent-line prefetching on x86_64, 128-byte
//!   lines on Apple silicon).
//! - On all others, N = 64.
//!
//! The size of `CachePad<T>` is the smallest multiple of N bytes large enough to
//! accommodate a value of type `T`.

use std::fmt;
use std::ops::Deref;

/// Pads and aligns a value to the length of a cache line.
#[cfg_attr(any(target_arch = "x86_64", target_arch = "aarch64"), repr(align(128)))]
#[cfg_attr(
    not(any(target_arch = "x86_64", target_arch = "aarch64")),
    repr(align(64))
)]
pub(crate) struct CachePad<T>(T);

impl<T> CachePad<T> {
    pub(crate) fn new(value: T) -> CachePad<T> {
        CachePad(value)
    }
}

impl<T> Deref for CachePad<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: fmt::Debug> fmt::Debug for CachePad<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}
