//! Server settings and their defaults.
use std::net::SocketAddr;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::{Result, UstoreError};

/// default address the server listens on
pub const DEFAULT_ADDRESS: &str = "0.0.0.0:8080";
/// default location of the persisted document
pub const DEFAULT_DATA_FILE: &str = "users.json";
/// default number of requests that can wait for a processor
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;
/// default time an acceptor waits for a client to send its request
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(10);
/// default size of the buffer a request is read into
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Settings for a [`UstoreServer`](crate::UstoreServer).
///
/// The defaults size the pools from the machine: one acceptor per available core and half as
/// many processors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// the address to listen on
    pub addr: SocketAddr,
    /// where the shared document is persisted
    pub data_path: PathBuf,
    /// number of acceptor threads
    pub acceptors: usize,
    /// number of processor threads
    pub processors: usize,
    /// capacity of the queue between acceptors and processors
    pub queue_capacity: usize,
    /// how long an acceptor waits for a request on a new connection
    pub recv_timeout: Duration,
    /// the most bytes read from a single request
    pub buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let cores = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        ServerConfig {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            data_path: PathBuf::from(DEFAULT_DATA_FILE),
            acceptors: cores,
            processors: (cores / 2).max(1),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    /// sets the listening address
    pub fn addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// sets where the document is persisted
    pub fn data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }

    /// sets the number of acceptor threads, at least one
    pub fn acceptors(mut self, threads: usize) -> Self {
        self.acceptors = threads.max(1);
        self
    }

    /// sets the number of processor threads, at least one
    pub fn processors(mut self, threads: usize) -> Self {
        self.processors = threads.max(1);
        self
    }

    /// sets the queue capacity, at least one
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// sets the receive timeout for new connections. A zero timeout is not allowed by the OS,
    /// it is raised to one millisecond
    pub fn recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    /// checks the settings that the setters keep in range, for configs built from the public
    /// fields directly
    ///
    /// # Errors
    /// returns [`UstoreError::Config`] naming the first setting that is out of range
    pub fn validate(&self) -> Result<()> {
        let zero = if self.acceptors == 0 {
            "acceptors"
        } else if self.processors == 0 {
            "processors"
        } else if self.queue_capacity == 0 {
            "queue_capacity"
        } else if self.recv_timeout.is_zero() {
            "recv_timeout"
        } else if self.buffer_size == 0 {
            "buffer_size"
        } else {
            return Ok(());
        };
        Err(UstoreError::Config(format!("{} must be greater than zero", zero)))
    }

    /// sets the request buffer size, at least one byte
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }
}
