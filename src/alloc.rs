//! Fallible boxing.
//!
//! `Box::new` aborts the process when the allocator fails. The queue needs to find out
//! before it publishes anything, so payloads and nodes are allocated through
//! [`try_box`], which reports the failure and hands the value back instead.

use crate::error::AllocError;

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};

#[cfg(all(test, not(loom)))]
use std::cell::Cell;

#[cfg(all(test, not(loom)))]
thread_local! {
    static FAIL_AFTER: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Makes [`try_box`] fail on the current thread once `successes` more calls went
/// through. `None` disarms it.
#[cfg(all(test, not(loom)))]
pub(crate) fn fail_after(successes: Option<usize>) {
    FAIL_AFTER.with(|armed| armed.set(successes));
}

#[cfg(all(test, not(loom)))]
fn should_fail() -> bool {
    FAIL_AFTER.with(|armed| match armed.get() {
        Some(0) => true,
        Some(left) => {
            armed.set(Some(left - 1));
            false
        }
        None => false,
    })
}

/// Moves `value` to the heap, returning a pointer that can be released with
/// [`Box::from_raw`].
///
/// On failure the value is returned together with the layout that could not be
/// satisfied.
pub(crate) fn try_box<T>(value: T) -> Result<NonNull<T>, (T, AllocError)> {
    let layout = Layout::new::<T>();

    #[cfg(all(test, not(loom)))]
    if should_fail() {
        return Err((value, AllocError::new(layout)));
    }

    // Zero-sized values never touch the allocator, `Box` uses a dangling pointer for them too.
    if layout.size() == 0 {
        let raw = NonNull::<T>::dangling();
        unsafe { ptr::write(raw.as_ptr(), value) };
        return Ok(raw);
    }

    // SAFETY: `layout` has a non-zero size.
    let raw = unsafe { alloc::alloc(layout) }.cast::<T>();
    match NonNull::new(raw) {
        Some(raw) => {
            // SAFETY: `raw` is freshly allocated for a `T` and properly aligned.
            unsafe { ptr::write(raw.as_ptr(), value) };
            Ok(raw)
        }
        None => Err((value, AllocError::new(layout))),
    }
}
