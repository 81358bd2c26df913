use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::Receiver;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::pool::{acceptor, processor, WorkerPool};
use crate::queue::{BoundedQueue, QueueEntry};
use crate::router::Router;
use crate::shutdown::ShutdownToken;
use crate::store::DocumentStore;
use crate::Result;

// how long to wait for a wake-up connection to the listener during shutdown
const WAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// A TCP server that serves HTTP requests from a [`DocumentStore`].
///
/// Requests flow through two pools of threads: acceptors accept connections and read a single
/// request from each, then hand it through a bounded queue to the processors, which route the
/// request, write the response and close the connection.
///
/// # Example
/// Start a server on an ephemeral port, then stop it again
/// ```rust
/// use ustore::{JsonStore, ServerConfig, UstoreServer};
/// # fn main() -> ustore::Result<()> {
/// let store = JsonStore::open("users.json")?;
/// let config = ServerConfig::default().addr("127.0.0.1:0".parse().unwrap());
/// let handle = UstoreServer::new(store, config).start()?;
/// println!("listening on {}", handle.local_addr());
/// handle.shutdown();
/// # Ok(())
/// # }
/// ```
pub struct UstoreServer<S: DocumentStore> {
    /// the store shared by all processor threads
    store: S,
    config: ServerConfig,
}

impl<S: DocumentStore> UstoreServer<S> {
    /// Create a new `UstoreServer` over the given store and configuration
    pub fn new(store: S, config: ServerConfig) -> Self {
        UstoreServer { store, config }
    }

    /// binds the listener and starts the processor and acceptor threads.
    /// Returns a [`ServerHandle`] used to stop the server again.
    ///
    /// # Errors
    /// returns [`UstoreError::Config`](crate::UstoreError::Config) if the configuration is out
    /// of range, or an error if the listener could not be bound or a thread could not be started.
    /// Any threads that were already running are stopped before returning
    pub fn start(self) -> Result<ServerHandle> {
        let config = self.config;
        config.validate()?;
        let listener = TcpListener::bind(config.addr)?;
        let local_addr = listener.local_addr()?;
        let listener = Arc::new(listener);
        let queue = Arc::new(BoundedQueue::<QueueEntry<TcpStream>>::new(config.queue_capacity));
        let token = ShutdownToken::new();
        let router = Router::new(self.store);

        // processors first, so the queue is drained as soon as acceptors start filling it
        let mut processors = WorkerPool::new("processor");
        let started = {
            let queue = Arc::clone(&queue);
            processors.spawn_workers(config.processors, move |_| processor::run(&queue, &router))
        };
        if let Err(e) = started {
            queue.shutdown();
            processors.join();
            return Err(e);
        }

        let mut acceptors = WorkerPool::new("acceptor");
        let started = {
            let queue = Arc::clone(&queue);
            let token = token.clone();
            let (recv_timeout, buffer_size) = (config.recv_timeout, config.buffer_size);
            acceptors.spawn_workers(config.acceptors, move |_| {
                acceptor::run(&listener, &queue, &token, recv_timeout, buffer_size)
            })
        };

        let handle = ServerHandle {
            local_addr,
            token,
            queue,
            acceptors,
            processors,
        };
        if let Err(e) = started {
            handle.shutdown();
            return Err(e);
        }

        info!(
            "listening on {} with {} acceptors and {} processors",
            local_addr, config.acceptors, config.processors
        );
        Ok(handle)
    }

    /// starts the server and blocks until a message arrives on `trigger`, or every sender of
    /// `trigger` is dropped, then shuts the server down
    ///
    /// # Errors
    /// returns an error if the server could not be started
    pub fn run(self, trigger: &Receiver<()>) -> Result<()> {
        let handle = self.start()?;
        if trigger.recv().is_err() {
            debug!("shutdown trigger disconnected");
        }
        handle.shutdown();
        Ok(())
    }
}

/// A running [`UstoreServer`].
///
/// Dropping the handle without calling [`shutdown`](ServerHandle::shutdown) leaves the
/// server's threads running.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    token: ShutdownToken,
    queue: Arc<BoundedQueue<QueueEntry<TcpStream>>>,
    acceptors: WorkerPool,
    processors: WorkerPool,
}

impl ServerHandle {
    /// the address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// stops the server and waits for all of its threads to finish.
    ///
    /// 1. the shutdown token is cancelled
    /// 2. acceptors blocked in `accept` are woken up, see the token and exit. Once the last one
    /// is gone the listener is closed and new connections are refused
    /// 3. the queue is shut down
    /// 4. processors answer every request still in the queue, then exit
    pub fn shutdown(self) {
        if !self.token.cancel() {
            return;
        }
        info!("shutting down");

        self.wake_acceptors();
        self.acceptors.join();
        debug!("acceptors stopped, {} requests queued", self.queue.len());

        self.queue.shutdown();
        self.processors.join();
        info!("server stopped");
    }

    // `accept` can not be interrupted from another thread, so each acceptor gets one connection
    // to return from it
    fn wake_acceptors(&self) {
        let mut addr = self.local_addr;
        if addr.ip().is_unspecified() {
            match addr {
                SocketAddr::V4(_) => addr.set_ip(Ipv4Addr::LOCALHOST.into()),
                SocketAddr::V6(_) => addr.set_ip(Ipv6Addr::LOCALHOST.into()),
            }
        }
        for _ in 0..self.acceptors.len() {
            if let Err(e) = TcpStream::connect_timeout(&addr, WAKE_TIMEOUT) {
                warn!("could not wake acceptors at {}: {}", addr, e);
                break;
            }
        }
    }
}
