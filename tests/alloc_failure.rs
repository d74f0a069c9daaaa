#![cfg(not(loom))]

//! Makes the allocator refuse memory to check that `try_push` hands items back and
//! that the queue stays consistent and leak-free afterwards.
//!
//! Failures and allocation counts are tracked per thread, so the tests of this
//! binary don't disturb each other when run in parallel.

use lf_fifo::Queue;
use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::ptr;

thread_local! {
    // Number of allocations still allowed before failing, none when disarmed.
    static FAIL_AFTER: Cell<Option<usize>> = const { Cell::new(None) };
    // Size of the allocations to refuse, zero when disarmed.
    static FAIL_SIZE: Cell<usize> = const { Cell::new(0) };
    static LIVE: Cell<isize> = const { Cell::new(0) };
}

struct Failing;

impl Failing {
    fn refuses(layout: Layout) -> bool {
        let by_size = FAIL_SIZE
            .try_with(|size| size.get() == layout.size())
            .unwrap_or(false);
        let by_count = FAIL_AFTER
            .try_with(|armed| match armed.get() {
                Some(0) => true,
                Some(left) => {
                    armed.set(Some(left - 1));
                    false
                }
                None => false,
            })
            .unwrap_or(false);
        by_size || by_count
    }

    fn count(delta: isize) {
        let _ = LIVE.try_with(|live| live.set(live.get() + delta));
    }
}

unsafe impl GlobalAlloc for Failing {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if Self::refuses(layout) {
            return ptr::null_mut();
        }
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            Self::count(1);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        Self::count(-1);
        unsafe { System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static ALLOCATOR: Failing = Failing;

fn live() -> isize {
    LIVE.with(Cell::get)
}

fn fail_after(successes: Option<usize>) {
    FAIL_AFTER.with(|armed| armed.set(successes));
}

fn fail_size(size: usize) {
    FAIL_SIZE.with(|armed| armed.set(size));
}

// Pays for one-time initialization (logging callsites, thread locals) on the
// current thread before anything is measured.
fn warm_up() -> isize {
    let queue: Queue<usize> = Queue::new();
    queue.push(0);
    queue.push(1);
    let _ = queue.pop();
    drop(queue);
    live()
}

// cargo test --package lf-fifo --test alloc_failure -- test_spare_node_failure_hands_the_item_back --exact --nocapture
#[test]
fn test_spare_node_failure_hands_the_item_back() {
    let before = warm_up();
    {
        let queue: Queue<String> = Queue::new();
        queue.push(String::from("kept"));

        let item = String::from("rejected");
        fail_after(Some(0));
        let pushed = queue.try_push(item);
        fail_after(None);

        let err = pushed.unwrap_err();
        assert!(err.alloc_error().layout().size() > 0);
        assert_eq!(err.into_inner(), "rejected");
        assert!(!queue.is_empty());

        assert_eq!(queue.pop().as_deref(), Some("kept"));
        assert!(queue.pop().is_none());
    }
    assert_eq!(live(), before);
}

// cargo test --package lf-fifo --test alloc_failure -- test_payload_failure_hands_the_item_back --exact --nocapture
#[test]
fn test_payload_failure_hands_the_item_back() {
    let before = warm_up();
    {
        let queue: Queue<[u8; 777]> = Queue::new();
        queue.push([1; 777]);

        fail_size(777);
        let pushed = queue.try_push([2; 777]);
        fail_size(0);

        let err = pushed.unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to push an item into the queue: memory allocation of 777 bytes failed"
        );
        assert_eq!(err.alloc_error().layout(), Layout::new::<[u8; 777]>());
        assert_eq!(err.into_inner(), [2; 777]);

        // Only the first item made it in, the spare node of the failed push is gone.
        assert_eq!(queue.pop(), Some([1; 777]));
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }
    assert_eq!(live(), before);
}

// cargo test --package lf-fifo --test alloc_failure -- test_queue_recovers_after_failures --exact --nocapture
#[test]
fn test_queue_recovers_after_failures() {
    let before = warm_up();
    {
        let queue: Queue<Box<usize>> = Queue::new();
        let mut expected = Vec::new();

        for i in 0..64 {
            // The node comes first, the payload second: alternate which one fails.
            if i % 4 == 1 {
                let item = Box::new(i);
                fail_after(Some(i / 4 % 2));
                let pushed = queue.try_push(item);
                fail_after(None);
                assert_eq!(*pushed.unwrap_err().into_inner(), i);
            } else {
                queue.try_push(Box::new(i)).unwrap();
                expected.push(i);
            }

            if i % 8 == 7 {
                assert_eq!(queue.pop().map(|x| *x), Some(expected.remove(0)));
            }
        }

        let rest: Vec<usize> = std::iter::from_fn(|| queue.pop()).map(|x| *x).collect();
        assert_eq!(rest, expected);
    }
    assert_eq!(live(), before);
}
