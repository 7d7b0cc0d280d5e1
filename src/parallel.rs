//! Fan-out of independent work items onto OS threads.
//!
//! Every item is its own failure domain: a panic while handling one item is
//! turned into that item's result and never reaches its siblings. Results
//! are returned only once every item has finished, in input order.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use log::{debug, warn};

const LOST_RESULT: &str = "result lost: the failure handler panicked";

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs `work` for each item. With `max_workers` unset every item gets its
/// own thread; otherwise at most `max_workers` threads pull items in turn.
///
/// Every item yields exactly one result. When `on_panic` itself panics the
/// worker thread carries on with the next item, and the lost result is rebuilt
/// by calling `on_panic` again once all threads have finished.
pub fn run_isolated<T, R, F, P>(
    items: &[T],
    max_workers: Option<usize>,
    work: F,
    on_panic: P,
) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
    P: Fn(&T, String) -> R + Sync,
{
    let workers = max_workers
        .unwrap_or(items.len())
        .clamp(1, items.len().max(1));
    debug!("Scheduling {} item(s) on {workers} thread(s)", items.len());

    let guarded = |item: &T| -> Option<R> {
        panic::catch_unwind(AssertUnwindSafe(|| {
            panic::catch_unwind(AssertUnwindSafe(|| work(item)))
                .unwrap_or_else(|payload| on_panic(item, panic_message(payload.as_ref())))
        }))
        .ok()
    };
    let guarded = &guarded;

    let slots: Vec<Option<R>> = if workers >= items.len() {
        thread::scope(|scope| {
            let handles = items
                .iter()
                .map(|item| scope.spawn(move || guarded(item)))
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| handle.join().ok().flatten())
                .collect()
        })
    } else {
        let next = AtomicUsize::new(0);
        let next = &next;
        let finished = Mutex::new(items.iter().map(|_| None).collect::<Vec<Option<R>>>());
        let finished_ref = &finished;
        thread::scope(|scope| {
            let handles = (0..workers)
                .map(|_| {
                    scope.spawn(move || {
                        loop {
                            let idx = next.fetch_add(1, Ordering::SeqCst);
                            let Some(item) = items.get(idx) else {
                                break;
                            };
                            let result = guarded(item);
                            finished_ref.lock().unwrap_or_else(PoisonError::into_inner)[idx] =
                                result;
                        }
                    })
                })
                .collect::<Vec<_>>();
            for handle in handles {
                if handle.join().is_err() {
                    warn!("A worker thread exited early; its unfinished items are reported failed");
                }
            }
        });
        finished.into_inner().unwrap_or_else(PoisonError::into_inner)
    };

    slots
        .into_iter()
        .zip(items)
        .map(|(slot, item)| slot.unwrap_or_else(|| on_panic(item, LOST_RESULT.to_string())))
        .collect()
}
