//! Switch from [`std`] to [`loom`] for [`std::sync`] when using the `--cfg loom` flag.
//!
//! Every atomic the queue dereferences lives behind this module so a loom model sees the
//! whole protocol: chain links, payload slots, the retirement bag and the participation
//! counter.
//!
//! [`loom`]: https://docs.rs/loom/

#[cfg(not(loom))]
pub(crate) mod sync {
    pub(crate) use std::sync::Arc;

    pub(crate) mod atomic {
        pub(crate) use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
    }
}

#[cfg(loom)]
pub(crate) use loom::sync;
