use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// Thread-safe bounded queue: producers block once the depth reaches the
/// capacity, consumers wait on empty. Control jobs (sentinels) bypass the
/// bound so a stop request can never deadlock against a full queue.
pub struct JobQueue<T> {
    inner: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> JobQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Blocking bounded push.
    pub fn push(&self, job: T) {
        let mut queue = self.inner.lock().expect("job queue mutex poisoned");
        while queue.len() >= self.capacity {
            queue = self
                .not_full
                .wait(queue)
                .expect("job queue mutex poisoned");
        }
        queue.push_back(job);
        self.not_empty.notify_all();
    }

    /// Unbounded push for sentinels and barriers.
    pub fn push_control(&self, job: T) {
        let mut queue = self.inner.lock().expect("job queue mutex poisoned");
        queue.push_back(job);
        self.not_empty.notify_all();
    }

    /// Blocking pop.
    pub fn pop(&self) -> T {
        let mut queue = self.inner.lock().expect("job queue mutex poisoned");
        loop {
            if let Some(job) = queue.pop_front() {
                self.not_full.notify_all();
                return job;
            }
            queue = self
                .not_empty
                .wait(queue)
                .expect("job queue mutex poisoned");
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("job queue mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
