//! Worker execution contexts
//!
//! The engine schedules tracks onto worker contexts it does not own: a
//! track is pinned to one worker for its lifetime, scheduling steps are
//! posted as tasks, and the cooperative-yield check asks the worker
//! whether the current step should give the context back.
//!
//! Two implementations are provided: [`ThreadWorkers`], a pool of named
//! threads each draining a channel, and [`SerialWorkers`], an inline
//! queue for single-threaded embedders and deterministic tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam::channel::{Receiver, Sender};

use crate::types::WorkerId;

/// A unit of work posted to a worker context
pub type WorkerTask = Box<dyn FnOnce() + Send + 'static>;

/// Externally-supplied pool of worker execution contexts
pub trait WorkerPool: Send + Sync {
    /// Pick a worker for a new track. `parallel` hints that the track is
    /// CPU-bound (conversion) and should spread across contexts.
    fn assign(&self, parallel: bool) -> WorkerId;

    /// The track pinned to this worker is gone
    fn release(&self, worker: WorkerId);

    /// Queue a task on a worker. `key` identifies the posting track so
    /// its queued tasks can be cancelled later.
    fn post(&self, worker: WorkerId, key: u64, task: WorkerTask);

    /// Drop any tasks queued under `key` that have not started yet
    fn cancel(&self, worker: WorkerId, key: u64);

    /// Whether the task currently running on `worker` should yield and
    /// re-post itself
    fn should_yield(&self, worker: WorkerId) -> bool;
}

struct Job {
    key: u64,
    run: WorkerTask,
}

#[derive(Default)]
struct QueueBook {
    /// Tasks queued per key
    queued: HashMap<u64, u32>,
    /// Tasks to drop on dequeue per key (set by cancel)
    skip: HashMap<u64, u32>,
}

impl QueueBook {
    fn on_post(&mut self, key: u64) {
        *self.queued.entry(key).or_insert(0) += 1;
    }

    fn on_cancel(&mut self, key: u64) {
        if let Some(n) = self.queued.remove(&key) {
            if n > 0 {
                *self.skip.entry(key).or_insert(0) += n;
            }
        }
    }

    /// Returns true when the dequeued job should be dropped
    fn on_dequeue(&mut self, key: u64) -> bool {
        if let Some(n) = self.skip.get_mut(&key) {
            *n -= 1;
            if *n == 0 {
                self.skip.remove(&key);
            }
            return true;
        }
        if let Some(n) = self.queued.get_mut(&key) {
            *n -= 1;
            if *n == 0 {
                self.queued.remove(&key);
            }
        }
        false
    }
}

/// Pool of named worker threads, one task queue each
pub struct ThreadWorkers {
    senders: Vec<Sender<Job>>,
    books: Vec<Arc<Mutex<QueueBook>>>,
    rr: AtomicUsize,
    threads: Vec<thread::JoinHandle<()>>,
}

impl ThreadWorkers {
    /// Spawn `count` worker threads (at least one)
    pub fn new(count: usize) -> std::io::Result<Self> {
        let count = count.max(1);
        let mut senders = Vec::with_capacity(count);
        let mut books = Vec::with_capacity(count);
        let mut threads = Vec::with_capacity(count);

        for i in 0..count {
            let (tx, rx): (Sender<Job>, Receiver<Job>) = crossbeam::channel::unbounded();
            let book = Arc::new(Mutex::new(QueueBook::default()));
            let thread_book = Arc::clone(&book);
            let handle = thread::Builder::new()
                .name(format!("reel-worker-{i}"))
                .spawn(move || {
                    log::debug!("worker {i} started");
                    while let Ok(job) = rx.recv() {
                        let dropped = thread_book.lock().unwrap().on_dequeue(job.key);
                        if !dropped {
                            (job.run)();
                        }
                    }
                    log::debug!("worker {i} stopped");
                })?;
            senders.push(tx);
            books.push(book);
            threads.push(handle);
        }

        Ok(Self {
            senders,
            books,
            rr: AtomicUsize::new(0),
            threads,
        })
    }
}

impl WorkerPool for ThreadWorkers {
    fn assign(&self, _parallel: bool) -> WorkerId {
        self.rr.fetch_add(1, Ordering::Relaxed) % self.senders.len()
    }

    fn release(&self, _worker: WorkerId) {}

    fn post(&self, worker: WorkerId, key: u64, task: WorkerTask) {
        self.books[worker].lock().unwrap().on_post(key);
        // send fails only after shutdown; queued work is dropped then
        let _ = self.senders[worker].send(Job { key, run: task });
    }

    fn cancel(&self, worker: WorkerId, key: u64) {
        self.books[worker].lock().unwrap().on_cancel(key);
    }

    fn should_yield(&self, worker: WorkerId) -> bool {
        !self.senders[worker].is_empty()
    }
}

impl Drop for ThreadWorkers {
    fn drop(&mut self) {
        self.senders.clear();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Inline worker: tasks queue up and run when the owner drains them.
///
/// Single worker context, no threads. Gives embedders (and tests) full
/// control over when scheduling steps run.
#[derive(Default)]
pub struct SerialWorkers {
    queue: Mutex<VecDeque<(u64, WorkerTask)>>,
}

impl SerialWorkers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting
    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Run queued tasks until the queue is empty, including tasks posted
    /// while draining. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.queue.lock().unwrap().pop_front();
            match task {
                Some((_key, task)) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl WorkerPool for SerialWorkers {
    fn assign(&self, _parallel: bool) -> WorkerId {
        0
    }

    fn release(&self, _worker: WorkerId) {}

    fn post(&self, _worker: WorkerId, key: u64, task: WorkerTask) {
        self.queue.lock().unwrap().push_back((key, task));
    }

    fn cancel(&self, _worker: WorkerId, key: u64) {
        self.queue.lock().unwrap().retain(|(k, _)| *k != key);
    }

    fn should_yield(&self, _worker: WorkerId) -> bool {
        false
    }
}
