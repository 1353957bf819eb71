use std::{
    collections::VecDeque,
    num::NonZeroUsize,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::{
    error::{Result, TrainErr},
    job::Job,
};

/// Why a consumer stopped receiving jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhaustion {
    /// Nothing arrived within the wait window.
    TimedOut,
    /// An end marker was received or the queue was closed and drained.
    EndOfStream,
}

/// The outcome of a timed pop.
#[derive(Debug)]
pub enum Pop<K> {
    Job(Job<K>),
    Exhausted(Exhaustion),
}

#[derive(Debug)]
enum Item<K> {
    Job(Job<K>),
    End,
}

#[derive(Debug)]
struct QueueState<K> {
    items: VecDeque<Item<K>>,
    closed: bool,
}

#[derive(Debug)]
struct Inner<K> {
    state: Mutex<QueueState<K>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: Option<NonZeroUsize>,
}

/// A FIFO of training jobs shared by any amount of producers and consumers.
///
/// Waiting on either side parks the thread on a condition variable, it never spins.
/// Producers can end a consumer with `push_end`, which behaves like any other item and
/// is taken by exactly one consumer, or end every consumer at once with `close`.
#[derive(Debug)]
pub struct JobQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for JobQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> Default for JobQueue<K> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<K> JobQueue<K> {
    /// Creates a new `JobQueue`.
    ///
    /// # Arguments
    /// * `capacity` - The maximum amount of pending items, `None` for no limit.
    pub fn new(capacity: Option<NonZeroUsize>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    items: VecDeque::new(),
                    closed: false,
                }),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                capacity,
            }),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn bounded(capacity: NonZeroUsize) -> Self {
        Self::new(Some(capacity))
    }

    /// Enqueues a job, blocking while the queue is full.
    ///
    /// # Returns
    /// `QueueClosed` if the queue was closed before the job could be enqueued.
    pub fn push(&self, job: Job<K>) -> Result<()> {
        self.enqueue(Item::Job(job))
    }

    /// Enqueues an end marker, the consumer that takes it terminates.
    ///
    /// # Returns
    /// `QueueClosed` if the queue was closed before the marker could be enqueued.
    pub fn push_end(&self) -> Result<()> {
        self.enqueue(Item::End)
    }

    /// Stops accepting items and wakes every waiting thread.
    ///
    /// Pending jobs are still handed out, once they run out every pop returns
    /// `Exhaustion::EndOfStream` immediately.
    pub fn close(&self) {
        self.inner.state.lock().closed = true;
        self.inner.not_empty.notify_all();
        self.inner.not_full.notify_all();
    }

    /// Takes the next item, waiting at most `timeout` for one to show up.
    pub fn pop_with_timeout(&self, timeout: Duration) -> Pop<K> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.inner.state.lock();

        loop {
            if let Some(item) = state.items.pop_front() {
                return self.hand_out(state, item);
            }

            if state.closed {
                return Pop::Exhausted(Exhaustion::EndOfStream);
            }

            let timed_out = match deadline {
                Some(deadline) => self
                    .inner
                    .not_empty
                    .wait_until(&mut state, deadline)
                    .timed_out(),
                None => {
                    self.inner.not_empty.wait(&mut state);
                    false
                }
            };

            if timed_out {
                return match state.items.pop_front() {
                    Some(item) => self.hand_out(state, item),
                    None if state.closed => Pop::Exhausted(Exhaustion::EndOfStream),
                    None => Pop::Exhausted(Exhaustion::TimedOut),
                };
            }
        }
    }

    /// Amount of pending items, end markers included.
    pub fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    pub fn capacity(&self) -> Option<NonZeroUsize> {
        self.inner.capacity
    }

    fn enqueue(&self, item: Item<K>) -> Result<()> {
        let mut state = self.inner.state.lock();

        while !state.closed && self.is_full(&state) {
            self.inner.not_full.wait(&mut state);
        }

        if state.closed {
            return Err(TrainErr::QueueClosed);
        }

        state.items.push_back(item);
        drop(state);

        self.inner.not_empty.notify_one();
        Ok(())
    }

    fn is_full(&self, state: &QueueState<K>) -> bool {
        self.inner
            .capacity
            .is_some_and(|cap| state.items.len() >= cap.get())
    }

    fn hand_out(&self, state: MutexGuard<'_, QueueState<K>>, item: Item<K>) -> Pop<K> {
        drop(state);
        self.inner.not_full.notify_one();

        match item {
            Item::Job(job) => Pop::Job(job),
            Item::End => Pop::Exhausted(Exhaustion::EndOfStream),
        }
    }
}
