//! The download queue: a priority heap of queued series plus a global
//! concurrency gate so the host can enqueue far more series than should
//! ever download at once.
//!
//! Grounded on the queue/worker-pool shape used by usenet-style segmented
//! downloaders: a `BinaryHeap` behind a mutex, workers blocked on a
//! `Notify` until either something is pushed or a permit frees up.

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Notify, Semaphore, SemaphorePermit};

use crate::model::PriorityKey;

struct QueueState<T> {
    heap: BinaryHeap<Entry<T>>,
}

struct Entry<T> {
    key: PriorityKey,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl<T> Eq for Entry<T> {}
impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

/// A bounded-concurrency priority queue of series awaiting download.
///
/// `T` is the task handle the scheduler hands back out once a series is
/// selected to run (see [`crate::task::LoadSeriesTask`]).
pub struct DownloadQueue<T> {
    state: std::sync::Mutex<QueueState<T>>,
    notify: Notify,
    permits: Arc<Semaphore>,
    enqueue_seq: AtomicU64,
}

impl<T> DownloadQueue<T> {
    pub fn new(global_concurrency: usize) -> Self {
        DownloadQueue {
            state: std::sync::Mutex::new(QueueState {
                heap: BinaryHeap::new(),
            }),
            notify: Notify::new(),
            permits: Arc::new(Semaphore::new(global_concurrency)),
            enqueue_seq: AtomicU64::new(0),
        }
    }

    /// The next enqueue sequence number, used to break ties between
    /// otherwise-equal priority keys (FIFO among peers).
    pub fn next_seq(&self) -> u64 {
        self.enqueue_seq.fetch_add(1, Ordering::Relaxed)
    }

    pub fn push(&self, key: PriorityKey, item: T) {
        self.state.lock().unwrap().heap.push(Entry { key, item });
        self.notify.notify_one();
    }

    /// Re-keys the in-flight selection priority of whatever is queued for
    /// `predicate`, e.g. promoting a series the host just asked to jump the
    /// line. Returns `true` if an entry was found and re-keyed.
    pub fn rekey(&self, mut f: impl FnMut(&mut PriorityKey)) -> bool {
        let mut state = self.state.lock().unwrap();
        let mut entries: Vec<_> = std::mem::take(&mut state.heap).into_sorted_vec();
        let mut changed = false;
        for entry in entries.iter_mut() {
            let before = entry.key.clone();
            f(&mut entry.key);
            if entry.key != before {
                changed = true;
            }
        }
        state.heap = entries.into_iter().collect();
        changed
    }

    /// Waits for both a free concurrency permit and a queued item, then
    /// returns both. The permit must be held for the task's entire
    /// lifetime, not released between instances.
    pub async fn next(self: &Arc<Self>) -> (SemaphorePermit<'_>, T) {
        loop {
            let permit = self.permits.acquire().await.expect("semaphore not closed");
            if let Some(item) = self.pop() {
                return (permit, item);
            }
            drop(permit);
            self.notify.notified().await;
        }
    }

    fn pop(&self) -> Option<T> {
        self.state
            .lock()
            .unwrap()
            .heap
            .pop()
            .map(|entry| entry.item)
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Orders a slice of weights by the midpoint-of-largest-gap rule:
/// repeatedly pick the index lying closest to the midpoint of the widest
/// still-unfetched gap between already-picked positions, so a
/// partially-downloaded series always looks evenly sampled rather than
/// front-loaded.
pub fn midpoint_of_largest_gap_order(len: usize) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    if len == 1 {
        return vec![0];
    }

    let mut picked: Vec<usize> = vec![0, len - 1];
    let mut order: Vec<usize> = picked.clone();

    while picked.len() < len {
        picked.sort_unstable();
        let mut best_gap = (0usize, 0usize, 0usize); // (width, start, end)
        for w in picked.windows(2) {
            let (start, end) = (w[0], w[1]);
            let width = end - start;
            if width > best_gap.0 {
                best_gap = (width, start, end);
            }
        }
        let (width, start, end) = best_gap;
        if width <= 1 {
            break;
        }
        let mid = start + width / 2;
        order.push(mid);
        picked.push(mid);
    }

    // Any index the gap search skipped over (shouldn't happen for a
    // correct midpoint sweep, but a defensive fallback keeps this total).
    let mut seen = vec![false; len];
    for &i in &order {
        seen[i] = true;
    }
    for (i, s) in seen.into_iter().enumerate() {
        if !s {
            order.push(i);
        }
    }

    order
}

/// Equivalent to [`midpoint_of_largest_gap_order`], named to make call
/// sites read as "pick the next gap", used by the manager when only the
/// next single index is needed rather than the whole order up front.
pub fn next_largest_gap_midpoint(picked_sorted: &[usize]) -> Option<usize> {
    if picked_sorted.len() < 2 {
        return None;
    }
    let mut best: Option<(usize, usize)> = None;
    for w in picked_sorted.windows(2) {
        let width = w[1] - w[0];
        if width <= 1 {
            continue;
        }
        if best.map(|(b, _)| width > b).unwrap_or(true) {
            best = Some((width, w[0] + width / 2));
        }
    }
    best.map(|(_, mid)| mid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midpoint_order_covers_every_index_exactly_once() {
        let order = midpoint_of_largest_gap_order(8);
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn midpoint_order_starts_with_the_two_ends() {
        let order = midpoint_of_largest_gap_order(10);
        assert_eq!(&order[0..2], &[0, 9]);
    }

    #[test]
    fn single_instance_order_is_trivial() {
        assert_eq!(midpoint_of_largest_gap_order(1), vec![0]);
    }

    #[test]
    fn empty_order_is_empty() {
        assert!(midpoint_of_largest_gap_order(0).is_empty());
    }

    #[tokio::test]
    async fn pushed_items_are_served_in_priority_order() {
        let queue: Arc<DownloadQueue<&'static str>> = Arc::new(DownloadQueue::new(2));
        queue.push(
            PriorityKey {
                is_user_selected: false,
                patient: "p".into(),
                study: "s".into(),
                series: "low".into(),
                weight: 1,
                enqueue_seq: queue.next_seq(),
            },
            "low-priority",
        );
        queue.push(
            PriorityKey {
                is_user_selected: true,
                patient: "p".into(),
                study: "s".into(),
                series: "high".into(),
                weight: 1,
                enqueue_seq: queue.next_seq(),
            },
            "high-priority",
        );

        let (permit, item) = queue.next().await;
        assert_eq!(item, "high-priority");
        drop(permit);
    }

    #[tokio::test]
    async fn equal_priority_peers_are_served_fifo() {
        let queue: Arc<DownloadQueue<&'static str>> = Arc::new(DownloadQueue::new(3));
        let key = |seq: u64| PriorityKey {
            is_user_selected: false,
            patient: "p".into(),
            study: "s".into(),
            series: "same".into(),
            weight: 1,
            enqueue_seq: seq,
        };
        queue.push(key(queue.next_seq()), "first");
        queue.push(key(queue.next_seq()), "second");
        queue.push(key(queue.next_seq()), "third");

        let (permit, item) = queue.next().await;
        assert_eq!(item, "first");
        drop(permit);
        let (permit, item) = queue.next().await;
        assert_eq!(item, "second");
        drop(permit);
        let (permit, item) = queue.next().await;
        assert_eq!(item, "third");
        drop(permit);
    }
}
