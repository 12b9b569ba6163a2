//! Background threads for the scale scheduler
//!
//! [`Thread`] wraps a named `JoinHandle`. [`WorkerPool`] runs boxed jobs on
//! a fixed set of named threads fed by a crossbeam channel.
//!
//! # Design Notes
//!
//! - Workers share one receiver, so a job goes to whichever worker is idle.
//! - A panicking job is caught and logged; the worker keeps serving.
//! - Dropping the pool closes the channel, lets the workers finish every
//!   queued job, then joins them.

#[cfg(test)]
mod tests;

use crossbeam::channel::{self, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Error type for threading operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThreadError {
    /// Thread spawn failed
    #[error("Thread spawn failed: {0}")]
    SpawnFailed(String),
    /// Thread join failed
    #[error("Thread join failed: {0}")]
    JoinFailed(String),
    /// The pool no longer accepts jobs
    #[error("Worker pool is shut down")]
    PoolClosed,
}

pub type Result<T> = std::result::Result<T, ThreadError>;

// ============================================================================
// Thread Handle
// ============================================================================

/// Handle to a spawned, named thread
pub struct Thread<T> {
    handle: Option<JoinHandle<T>>,
    name: String,
}

impl<T> Thread<T> {
    /// Spawn a new thread that executes the given function
    ///
    /// # Errors
    /// Returns `ThreadError::SpawnFailed` if thread creation fails
    pub fn spawn<F>(name: &str, f: F) -> Result<Self>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(f)
            .map_err(|e| ThreadError::SpawnFailed(format!("{}: {}", name, e)))?;

        Ok(Self {
            handle: Some(handle),
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the thread to finish and return its result
    ///
    /// # Errors
    /// Returns `ThreadError::JoinFailed` if the thread panicked
    pub fn join(mut self) -> Result<T> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<T> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ThreadError::JoinFailed(format!("{} panicked", self.name))),
            None => Err(ThreadError::JoinFailed(format!("{} already joined", self.name))),
        }
    }
}

// ============================================================================
// Worker Pool
// ============================================================================

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of named worker threads
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<Thread<()>>,
    outstanding: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Start `threads` workers (at least one) named `<name>-<index>`
    pub fn new(name: &str, threads: usize) -> Result<Self> {
        let (sender, receiver) = channel::unbounded::<Job>();
        let outstanding = Arc::new(AtomicUsize::new(0));

        let count = threads.max(1);
        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let receiver = receiver.clone();
            let outstanding = Arc::clone(&outstanding);
            let worker = Thread::spawn(&format!("{}-{}", name, index), move || {
                for job in receiver.iter() {
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        log::error!("Job on {} panicked", thread::current().name().unwrap_or("worker"));
                    }
                    outstanding.fetch_sub(1, Ordering::AcqRel);
                }
            })?;
            workers.push(worker);
        }
        log::debug!("Started {} '{}' workers", count, name);

        Ok(Self {
            sender: Some(sender),
            workers,
            outstanding,
        })
    }

    /// Queue a job for the next idle worker
    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(ThreadError::PoolClosed)?;
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        sender.send(Box::new(job)).map_err(|_| {
            self.outstanding.fetch_sub(1, Ordering::AcqRel);
            ThreadError::PoolClosed
        })
    }

    /// Jobs queued or running
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting jobs, finish the queue and join every worker
    ///
    /// Returns the first join failure.
    pub fn shutdown(&mut self) -> Result<()> {
        self.sender = None;
        let mut first_error = None;
        for mut worker in self.workers.drain(..) {
            match worker.join_inner() {
                Ok(()) => log::trace!("Joined {}", worker.name()),
                Err(err) => {
                    log::warn!("{}", err);
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
