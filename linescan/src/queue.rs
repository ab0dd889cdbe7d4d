use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Outcome of a non-blocking pop
#[derive(Debug, PartialEq, Eq)]
pub enum TryPop<T> {
    /// An item, now owned by the caller
    Item(T),
    /// Nothing buffered right now, but the producer may still push
    Empty,
    /// Nothing buffered and the producer has closed the queue; nothing more
    /// will ever arrive
    Closed,
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
    peak_depth: usize,
}

/// Single-producer, multi-consumer handoff buffer.
///
/// The buffer and the `closed` flag sit behind one mutex, so a consumer can
/// only see [`TryPop::Closed`] after every push that preceded `close()`
/// has already been drained.
#[derive(Debug)]
pub struct HandoffQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

impl<T> HandoffQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
                peak_depth: 0,
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an item. Never blocks on capacity.
    pub fn push(&self, item: T) {
        let mut state = self.lock();
        debug_assert!(!state.closed, "push after close");
        state.items.push_back(item);
        state.peak_depth = state.peak_depth.max(state.items.len());
        drop(state);
        self.available.notify_one();
    }

    pub fn try_pop(&self) -> TryPop<T> {
        let mut state = self.lock();
        match state.items.pop_front() {
            Some(item) => TryPop::Item(item),
            None if state.closed => TryPop::Closed,
            None => TryPop::Empty,
        }
    }

    /// Waits for an item. Returns `None` once the queue is closed and drained.
    pub fn pop_blocking(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Marks the end of production. Idempotent.
    pub fn close(&self) {
        let mut state = self.lock();
        if !state.closed {
            state.closed = true;
            trace!("Handoff queue closed with {} items pending", state.items.len());
        }
        drop(state);
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Largest number of items buffered at once
    pub fn peak_depth(&self) -> usize {
        self.lock().peak_depth
    }
}

impl<T> Default for HandoffQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = HandoffQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.try_pop(), TryPop::Item(1));
        assert_eq!(queue.try_pop(), TryPop::Item(2));
        assert_eq!(queue.try_pop(), TryPop::Item(3));
        assert_eq!(queue.try_pop(), TryPop::Empty);
        assert_eq!(queue.peak_depth(), 3);
    }

    #[test]
    fn test_closed_is_reported_only_when_drained() {
        let queue = HandoffQueue::new();
        queue.push("last");
        queue.close();
        assert!(queue.is_closed());
        assert_eq!(queue.try_pop(), TryPop::Item("last"));
        assert_eq!(queue.try_pop(), TryPop::Closed);
        assert_eq!(queue.pop_blocking(), None);
    }

    #[test]
    fn test_close_is_idempotent() {
        let queue: HandoffQueue<u32> = HandoffQueue::new();
        queue.close();
        queue.close();
        assert_eq!(queue.try_pop(), TryPop::Closed);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_close_wakes_blocked_consumers() {
        let queue: HandoffQueue<u32> = HandoffQueue::new();
        thread::scope(|s| {
            let waiters: Vec<_> = (0..4).map(|_| s.spawn(|| queue.pop_blocking())).collect();
            queue.close();
            for waiter in waiters {
                assert_eq!(waiter.join().unwrap(), None);
            }
        });
    }

    #[test]
    fn test_concurrent_spin_consumers_see_every_item() {
        const ITEMS: usize = 50_000;
        let queue = HandoffQueue::new();
        let consumed = AtomicUsize::new(0);
        let sum = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| loop {
                    match queue.try_pop() {
                        TryPop::Item(value) => {
                            consumed.fetch_add(1, Ordering::Relaxed);
                            sum.fetch_add(value, Ordering::Relaxed);
                        }
                        TryPop::Empty => std::hint::spin_loop(),
                        TryPop::Closed => break,
                    }
                });
            }
            for i in 0..ITEMS {
                queue.push(i);
            }
            queue.close();
        });

        assert_eq!(consumed.load(Ordering::Relaxed), ITEMS);
        assert_eq!(sum.load(Ordering::Relaxed), ITEMS * (ITEMS - 1) / 2);
    }

    #[test]
    fn test_concurrent_blocking_consumers_see_every_item() {
        const ITEMS: usize = 20_000;
        let queue = HandoffQueue::new();

        let total: usize = thread::scope(|s| {
            let consumers: Vec<_> = (0..3)
                .map(|_| {
                    s.spawn(|| {
                        let mut count = 0;
                        while queue.pop_blocking().is_some() {
                            count += 1;
                        }
                        count
                    })
                })
                .collect();
            for i in 0..ITEMS {
                queue.push(i);
            }
            queue.close();
            consumers.into_iter().map(|c| c.join().unwrap()).sum()
        });

        assert_eq!(total, ITEMS);
    }
}
