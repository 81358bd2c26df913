//! The two tiers of worker threads that make up the request pipeline.
//!
//! - [`acceptor`] threads accept connections on the shared listener, read one request from each
//! and push it onto the [`BoundedQueue`](crate::BoundedQueue)
//! - [`processor`] threads pop requests from the queue, route them, write the response and close
//! the connection
//!
//! Both tiers run on a [`WorkerPool`] of named OS threads.
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error};

use crate::Result;

pub mod acceptor;
pub mod processor;

/// A fixed set of named OS threads all running the same worker function.
///
/// Unlike a job based thread pool, each thread runs its worker loop until the loop decides to
/// exit (the pipeline uses the shutdown token and the queue for that), and [`join`] waits for
/// every one of them.
///
/// [`join`]: WorkerPool::join
#[derive(Debug)]
pub struct WorkerPool {
    name: &'static str,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// creates an empty pool. Threads will be named `<name>-<index>`
    pub fn new(name: &'static str) -> Self {
        WorkerPool {
            name,
            handles: Vec::new(),
        }
    }

    /// starts `threads` threads, each running `worker` with its index in the pool.
    ///
    /// # Errors
    /// Returns an error if a thread could not be created. Threads started before the failure
    /// stay in the pool so the caller can still stop and [`join`](WorkerPool::join) them
    pub fn spawn_workers<F>(&mut self, threads: usize, worker: F) -> Result<()>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        let worker = Arc::new(worker);
        for _ in 0..threads {
            let index = self.handles.len();
            let worker = Arc::clone(&worker);
            let handle = thread::Builder::new()
                .name(format!("{}-{}", self.name, index))
                .spawn(move || worker(index))?;
            self.handles.push(handle);
        }
        debug!("started {} {} threads", threads, self.name);
        Ok(())
    }

    /// the number of threads in the pool
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// returns true if no threads have been started
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// waits for every thread in the pool to finish
    pub fn join(self) {
        for handle in self.handles {
            let name = handle.thread().name().unwrap_or(self.name).to_string();
            if handle.join().is_err() {
                error!("thread {} panicked", name);
            }
        }
        debug!("all {} threads finished", self.name);
    }
}
