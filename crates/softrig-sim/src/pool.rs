//! Worker pool for the parallel phases of a sub-step.
//!
//! Jobs are pushed onto a shared crossbeam channel and picked up by named
//! worker threads. Each phase is a [`Phase`]: a counting barrier that the
//! physics thread joins before starting the next phase. A pool without
//! workers runs every job inline.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, unbounded};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Worker count for a `worker_threads` setting; 0 picks one worker per
/// core, keeping a core for the physics thread.
pub fn worker_count(setting: usize) -> usize {
    if setting > 0 {
        setting
    } else {
        num_cpus::get().saturating_sub(1).max(1)
    }
}

/// Outstanding jobs of one phase.
#[derive(Debug, Default)]
struct Counter {
    pending: Mutex<usize>,
    done: Condvar,
}

impl Counter {
    fn add(&self) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn finish(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.done.notify_all();
        }
    }

    fn wait(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        while *pending > 0 {
            pending = self.done.wait(pending).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Counts the job as finished even when it panics.
struct FinishGuard(Arc<Counter>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Barrier of one parallel phase. Dropping it joins.
pub struct Phase<'p> {
    pool: &'p WorkerPool,
    counter: Arc<Counter>,
}

impl Phase<'_> {
    /// Queue `job` in this phase.
    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.counter.add();
        let guard = FinishGuard(Arc::clone(&self.counter));
        let job: Job = Box::new(move || {
            let _guard = guard;
            job();
        });
        match &self.pool.sender {
            Some(sender) => {
                if let Err(e) = sender.send(job) {
                    // every worker is gone; run it here
                    (e.into_inner())();
                }
            }
            None => job(),
        }
    }

    /// Block until every job of this phase has finished.
    pub fn join(self) {}
}

impl Drop for Phase<'_> {
    fn drop(&mut self) {
        self.counter.wait();
    }
}

pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool").field("workers", &self.workers.len()).finish()
    }
}

impl WorkerPool {
    /// Start `threads` workers. With 0 threads, or if no thread could be
    /// spawned, jobs run on the calling thread.
    pub fn new(threads: usize) -> Self {
        if threads == 0 {
            return Self::inline();
        }
        let (sender, receiver) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let receiver: Receiver<Job> = receiver.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("softrig-worker-{i}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        if std::panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            tracing::error!(worker = i, "physics job panicked");
                        }
                    }
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => tracing::warn!(error = %e, worker = i, "failed to spawn physics worker"),
            }
        }
        if workers.is_empty() {
            return Self::inline();
        }
        tracing::debug!(workers = workers.len(), "physics worker pool started");
        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// A pool that runs every job on the caller.
    pub fn inline() -> Self {
        Self {
            sender: None,
            workers: Vec::new(),
        }
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Open a phase. Jobs spawned on it are joined when it is joined or
    /// dropped.
    pub fn phase(&self) -> Phase<'_> {
        Phase {
            pool: self,
            counter: Arc::new(Counter::default()),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
