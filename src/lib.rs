#![deny(
    warnings,
    rustdoc::broken_intra_doc_links,
    rustdoc::private_intra_doc_links,
    missing_docs,
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unsafe_op_in_unsafe_fn,
    unused_crate_dependencies,
    unused_extern_crates,
    unused_import_braces,
    unused_lifetimes,
    unused_qualifications,
    unused_results,
    rust_2018_idioms
)]
// Dev-dependencies are only used by benches and integration tests.
#![cfg_attr(test, allow(unused_crate_dependencies))]

//! A lock-free multi-producer multi-consumer unbounded FIFO queue.
//!
//! The queue is a chain of single-item nodes. Producers claim the item slot of the
//! tail node with a compare-and-swap and then make sure a fresh empty node follows
//! it; any thread finding the chain half extended completes the extension itself, so
//! a stalled thread never blocks the others. Consumers advance the head of the chain
//! one node at a time.
//!
//! Nodes removed from the head can't be freed right away since a concurrent operation
//! may still be reading them. They are parked in a lock-free retirement bag which is
//! flushed whenever an operation completes while no other operation is running, and
//! emptied when the queue is dropped.
//!
//! Reclamation activity is reported through [`tracing`] events at the `trace` and
//! `debug` levels.
//!
//! # Examples
//!
//! Single Producer - Single Consumer:
//!
//! ```
//! use lf_fifo::Queue;
//!
//! const COUNT: usize = 1_000;
//! let queue: Queue<usize> = Queue::new();
//!
//! for i in 0..COUNT {
//!     queue.push(i);
//! }
//!
//! for i in 0..COUNT {
//!     assert_eq!(i, queue.pop().unwrap());
//! }
//!
//! assert!(queue.pop().is_none());
//! assert!(queue.is_empty());
//! ```
//!
//! Multi Producer - Multi Consumer:
//!
//! ```
//! use lf_fifo::Queue;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::thread;
//!
//! const COUNT: usize = 1_000;
//! const CONCURRENCY: usize = 4;
//!
//! let queue: Queue<usize> = Queue::new();
//! let items = Arc::new((0..COUNT).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>());
//!
//! let ths: Vec<_> = (0..CONCURRENCY)
//!     .map(|_| {
//!         let q = queue.clone();
//!         let its = items.clone();
//!         thread::spawn(move || {
//!             for _ in 0..COUNT {
//!                 let n = loop {
//!                     if let Some(x) = q.pop() {
//!                         break x;
//!                     } else {
//!                         thread::yield_now();
//!                     }
//!                 };
//!                 its[n].fetch_add(1, Ordering::SeqCst);
//!             }
//!         })
//!     })
//!     .chain((0..CONCURRENCY).map(|_| {
//!         let q = queue.clone();
//!         thread::spawn(move || {
//!             for i in 0..COUNT {
//!                 q.push(i);
//!             }
//!         })
//!     }))
//!     .collect();
//!
//! for th in ths {
//!     th.join().unwrap();
//! }
//!
//! for c in &*items {
//!     assert_eq!(c.load(Ordering::SeqCst), CONCURRENCY);
//! }
//!
//! assert!(queue.pop().is_none());
//! ```
//!
//! Recovering from allocation failures:
//!
//! ```
//! use lf_fifo::Queue;
//!
//! let queue: Queue<Vec<u8>> = Queue::new();
//!
//! match queue.try_push(vec![1, 2, 3]) {
//!     Ok(()) => assert_eq!(queue.pop(), Some(vec![1, 2, 3])),
//!     Err(err) => {
//!         eprintln!("{}", err);
//!         let _item = err.into_inner();
//!     }
//! }
//! ```

mod alloc;
mod error;
mod queue;

pub(crate) mod cache_pad;
pub(crate) mod node;
pub(crate) mod reclaim;
pub(crate) mod slot;
pub(crate) mod variant;

pub use error::{AllocError, TryPushError};
pub use queue::Queue;
