// src/pipeline/governor.rs - Bounded worker pool
use crossbeam_channel::Receiver;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tracing::{debug, error};

/// Fixed pool of workers pulling from one queue.
///
/// At most `concurrency` items are inside `work` at any time. `run` returns
/// only after the queue is closed and every admitted item has finished.
#[derive(Debug)]
pub struct Governor {
    concurrency: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    completed: AtomicUsize,
}

/// Held while an item is being worked on
struct Admission<'a> {
    governor: &'a Governor,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        self.governor.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.governor.completed.fetch_add(1, Ordering::SeqCst);
    }
}

impl Governor {
    pub fn new(concurrency: usize) -> Self {
        Governor {
            concurrency: concurrency.max(1),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Highest number of items observed in flight at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    fn admit(&self) -> Admission<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Admission { governor: self }
    }

    /// Drain `queue` with the worker pool, blocking until it is closed and empty
    pub fn run<T, F>(&self, queue: Receiver<T>, work: F)
    where
        T: Send,
        F: Fn(T) + Sync,
    {
        thread::scope(|scope| {
            let mut workers = 0;
            for index in 0..self.concurrency {
                let queue = queue.clone();
                let work = &work;
                let spawned = thread::Builder::new()
                    .name(format!("docflow-worker-{}", index))
                    .spawn_scoped(scope, move || self.worker_loop(index, queue, work));
                match spawned {
                    Ok(_) => workers += 1,
                    Err(e) => error!(worker = index, "failed to start worker: {}", e),
                }
            }

            if workers == 0 {
                // Degrade to processing on the calling thread
                self.worker_loop(0, queue, &work);
            }
        });
    }

    fn worker_loop<T, F>(&self, index: usize, queue: Receiver<T>, work: &F)
    where
        F: Fn(T),
    {
        debug!(worker = index, "worker started");
        for item in queue.iter() {
            let _admission = self.admit();
            if catch_unwind(AssertUnwindSafe(|| work(item))).is_err() {
                error!(worker = index, "work item panicked");
            }
        }
        debug!(worker = index, "worker finished");
    }
}
