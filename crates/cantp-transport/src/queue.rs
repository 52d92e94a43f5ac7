//! Async packet queues
//!
//! Two flavors back the transport interface: a plain FIFO for received
//! packets and a release-time-ordered queue that paces outgoing
//! Consecutive Frames. Both track outstanding items so a producer can
//! `join()` until everything it queued has been processed.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Unbounded async FIFO.
///
/// `get` suspends until an item is available; `task_done` marks one
/// previously fetched item as processed and `join` waits until the
/// outstanding count reaches zero.
#[derive(Debug, Default)]
pub struct PacketsQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Notify,
    unfinished: AtomicUsize,
    all_done: Notify,
}

impl<T> PacketsQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            unfinished: AtomicUsize::new(0),
            all_done: Notify::new(),
        }
    }

    /// Append an item and wake one waiting consumer.
    pub fn put(&self, item: T) {
        self.items.lock().push_back(item);
        self.unfinished.fetch_add(1, AtomicOrdering::SeqCst);
        self.available.notify_one();
    }

    /// Wait for the next item in insertion order.
    pub async fn get(&self) -> T {
        loop {
            // Arm the notification before checking, so a put between the
            // check and the await is not lost.
            let notified = self.available.notified();
            if let Some(item) = self.items.lock().pop_front() {
                return item;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Drop all queued items without processing them.
    pub fn clear(&self) {
        let drained = {
            let mut items = self.items.lock();
            let drained = items.len();
            items.clear();
            drained
        };
        if drained > 0 {
            tracing::warn!(drained, "cleared queue with unprocessed items");
            for _ in 0..drained {
                self.task_done();
            }
        }
    }

    /// Mark one fetched item as processed.
    pub fn task_done(&self) {
        let previous = self
            .unfinished
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |count| {
                count.checked_sub(1)
            });
        match previous {
            Ok(1) => self.all_done.notify_waiters(),
            Ok(_) => {}
            Err(_) => tracing::warn!("task_done called more times than items were fetched"),
        }
    }

    /// Wait until every queued item has been fetched and marked done.
    pub async fn join(&self) {
        loop {
            let notified = self.all_done.notified();
            if self.unfinished.load(AtomicOrdering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct Scheduled<T> {
    release_at: Instant,
    sequence: u64,
    item: T,
}

// Min-heap behavior on a max-heap: earliest release (then lowest
// insertion sequence) compares greatest.
impl<T> Ord for Scheduled<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .release_at
            .cmp(&self.release_at)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl<T> PartialOrd for Scheduled<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Scheduled<T> {
    fn eq(&self, other: &Self) -> bool {
        self.release_at == other.release_at && self.sequence == other.sequence
    }
}

impl<T> Eq for Scheduled<T> {}

/// Queue delivering items in ascending release-time order.
///
/// `get` sleeps until the earliest scheduled release and re-arms when an
/// earlier-scheduled item is inserted meanwhile, so late puts with early
/// deadlines preempt the current wait.
#[derive(Default)]
pub struct TimestampedQueue<T> {
    items: Mutex<BinaryHeap<Scheduled<T>>>,
    rescheduled: Notify,
    next_sequence: AtomicU64,
    unfinished: AtomicUsize,
    all_done: Notify,
}

impl<T> TimestampedQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(BinaryHeap::new()),
            rescheduled: Notify::new(),
            next_sequence: AtomicU64::new(0),
            unfinished: AtomicUsize::new(0),
            all_done: Notify::new(),
        }
    }

    /// Schedule an item for immediate release.
    pub fn put(&self, item: T) {
        self.put_at(item, Instant::now());
    }

    /// Schedule an item for release at `release_at`. Never blocks.
    pub fn put_at(&self, item: T, release_at: Instant) {
        let sequence = self.next_sequence.fetch_add(1, AtomicOrdering::SeqCst);
        self.items.lock().push(Scheduled {
            release_at,
            sequence,
            item,
        });
        self.unfinished.fetch_add(1, AtomicOrdering::SeqCst);
        self.rescheduled.notify_one();
    }

    /// Wait for the earliest-release item whose release time has passed.
    pub async fn get(&self) -> T {
        loop {
            let notified = self.rescheduled.notified();
            let now = Instant::now();
            let next_release = {
                let mut items = self.items.lock();
                if items.peek().map_or(false, |s| s.release_at <= now) {
                    if let Some(scheduled) = items.pop() {
                        return scheduled.item;
                    }
                }
                items.peek().map(|s| s.release_at)
            };
            match next_release {
                Some(release_at) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(release_at.into()) => {}
                        _ = notified => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn clear(&self) {
        let drained = {
            let mut items = self.items.lock();
            let drained = items.len();
            items.clear();
            drained
        };
        if drained > 0 {
            tracing::warn!(drained, "cleared queue with unscheduled items");
            for _ in 0..drained {
                self.task_done();
            }
        }
    }

    pub fn task_done(&self) {
        let previous = self
            .unfinished
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |count| {
                count.checked_sub(1)
            });
        match previous {
            Ok(1) => self.all_done.notify_waiters(),
            Ok(_) => {}
            Err(_) => tracing::warn!("task_done called more times than items were fetched"),
        }
    }

    pub async fn join(&self) {
        loop {
            let notified = self.all_done.notified();
            if self.unfinished.load(AtomicOrdering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}
