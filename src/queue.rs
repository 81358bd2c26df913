//! A fixed capacity, blocking FIFO queue. This is the only hand-off point between the acceptor
//! threads (producers) and the processor threads (consumers).
//!
//! Bounding the capacity gives the server backpressure: when the processors fall behind, a full
//! queue blocks the acceptors, and new connections wait in the OS accept backlog instead of in
//! process memory.
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard};

/// A raw request read off a connection, waiting to be processed.
///
/// The entry owns its connection: it is moved from the acceptor into the queue and then into
/// exactly one processor, which writes the response and closes it.
#[derive(Debug)]
pub struct QueueEntry<C> {
    /// the client connection the response must be written to
    pub conn: C,
    /// the bytes received from the client
    pub payload: Vec<u8>,
}

impl<C> QueueEntry<C> {
    /// builds a new entry from a connection and the bytes read from it
    pub fn new(conn: C, payload: Vec<u8>) -> Self {
        QueueEntry { conn, payload }
    }
}

/// Returned by [`BoundedQueue::push`] when an item could not be enqueued.
/// The rejected item is handed back so the caller decides what to do with it.
pub struct PushError<T>(pub T);

impl<T> PushError<T> {
    /// gets the item that could not be pushed
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PushError(..)")
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("the queue is shut down or full")
    }
}

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    shutdown: bool,
}

/// A multi-producer, multi-consumer FIFO queue with a fixed `capacity`.
///
/// `push` blocks while the queue is full and `pop` blocks while it is empty. Once [`shutdown`]
/// has been called, pushes fail, but items already in the queue can still be popped. After the
/// last one is gone `pop` returns `None` (end-of-stream).
///
/// [`shutdown`]: BoundedQueue::shutdown
#[derive(Debug)]
pub struct BoundedQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// creates a queue that holds at most `capacity` items. Storage for all of them is allocated
    /// up front so that `push` never allocates.
    ///
    /// # Panics
    /// Panics if `capacity` is zero
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be greater than zero");
        BoundedQueue {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                shutdown: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    // the state is only changed by whole push/pop operations, so a poisoned lock still guards
    // a consistent queue
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// pushes `item` onto the tail of the queue, blocking while the queue is full.
    ///
    /// # Errors
    /// Returns the item inside a [`PushError`] if the queue was shut down, either before the
    /// call or while waiting for room.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        let mut state = self.lock();
        while state.items.len() == self.capacity && !state.shutdown {
            state = self
                .not_full
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
        if state.shutdown {
            return Err(PushError(item));
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// like [`push`](BoundedQueue::push) but fails immediately instead of waiting when the
    /// queue is full
    pub fn try_push(&self, item: T) -> Result<(), PushError<T>> {
        let mut state = self.lock();
        if state.shutdown || state.items.len() == self.capacity {
            return Err(PushError(item));
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// removes the oldest item from the queue, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue has been shut down and drained.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();
        while state.items.is_empty() && !state.shutdown {
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
        let item = state.items.pop_front();
        drop(state);
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// stops the queue from accepting new items and wakes up every thread blocked in `push`
    /// or `pop`. Calling this more than once has no further effect.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.shutdown = true;
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// returns true once [`shutdown`](BoundedQueue::shutdown) has been called
    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    /// the number of items currently in the queue
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// returns true if the queue currently holds no items
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// the maximum number of items the queue can hold
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
