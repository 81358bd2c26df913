//! The processor loop: takes requests off the queue, routes them and answers them.
use std::io::{self, Write};
use std::net::{Shutdown, TcpStream};

use tracing::{debug, warn};

use crate::queue::{BoundedQueue, QueueEntry};
use crate::router::Router;
use crate::store::DocumentStore;

/// A client connection that a single response can be written to.
///
/// `close` consumes the connection, so once a processor has closed it, it can not be written
/// to or closed again.
pub trait Connection: Write + Send + 'static {
    /// closes the connection
    fn close(self) -> io::Result<()>;
}

impl Connection for TcpStream {
    fn close(self) -> io::Result<()> {
        // the socket itself is closed when `self` is dropped
        self.shutdown(Shutdown::Both)
    }
}

/// pops entries from `queue` and serves them until the queue reports end-of-stream
pub fn run<C, S>(queue: &BoundedQueue<QueueEntry<C>>, router: &Router<S>)
where
    C: Connection,
    S: DocumentStore,
{
    while let Some(entry) = queue.pop() {
        serve(entry, router);
    }
    debug!("queue shut down, processor exiting");
}

/// writes the response for a single entry and closes its connection, whatever happens
pub fn serve<C, S>(entry: QueueEntry<C>, router: &Router<S>)
where
    C: Connection,
    S: DocumentStore,
{
    let QueueEntry { mut conn, payload } = entry;
    let response = router.respond(&payload);

    match conn
        .write_all(&response.to_bytes())
        .and_then(|_| conn.flush())
    {
        Ok(()) => debug!("response sent: {}", response.status),
        Err(e) => warn!("failed to send response: {}", e),
    }
    if let Err(e) = conn.close() {
        debug!("error closing connection: {}", e);
    }
}
