//! The acceptor loop: accepts connections and feeds their requests into the queue.
use std::io::{ErrorKind, Read};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::queue::{BoundedQueue, QueueEntry};
use crate::shutdown::ShutdownToken;

/// how long an acceptor pauses after a failed `accept`, so that a lasting failure such as
/// running out of file descriptors does not turn into a busy loop
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// runs the accept loop on `listener` until `token` is cancelled.
///
/// Each accepted connection is read once, with a timeout of `recv_timeout`, into a buffer of
/// `buffer_size` bytes, and the bytes are pushed onto `queue` together with the connection.
/// Connections that time out, send nothing, fail to read or are rejected by the queue are
/// closed here and never reach a processor.
pub fn run(
    listener: &TcpListener,
    queue: &BoundedQueue<QueueEntry<TcpStream>>,
    token: &ShutdownToken,
    recv_timeout: Duration,
    buffer_size: usize,
) {
    while !token.is_cancelled() {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) => {
                if token.is_cancelled() {
                    break;
                }
                error!("accept failed: {}", e);
                thread::sleep(ACCEPT_RETRY_DELAY);
                continue;
            }
        };
        if token.is_cancelled() {
            // woken up for shutdown, the connection is dropped unanswered
            break;
        }
        debug!("new connection from {}", peer);

        let payload = match read_request(&stream, recv_timeout, buffer_size) {
            Some(payload) => payload,
            None => continue,
        };
        if let Err(rejected) = queue.push(QueueEntry::new(stream, payload)) {
            warn!("queue rejected the request from {}: {}", peer, rejected);
        }
    }
    debug!("acceptor exiting");
}

/// reads a single request from `stream`. Returns `None` if the peer closed the connection, the
/// read timed out, or failed.
fn read_request(stream: &TcpStream, recv_timeout: Duration, buffer_size: usize) -> Option<Vec<u8>> {
    if let Err(e) = stream.set_read_timeout(Some(recv_timeout)) {
        warn!("failed to set receive timeout: {}", e);
        return None;
    }
    let mut buf = vec![0u8; buffer_size];
    let mut reader = stream;
    match reader.read(&mut buf) {
        Ok(0) => {
            debug!("client disconnected before sending a request");
            None
        }
        Ok(n) => {
            buf.truncate(n);
            Some(buf)
        }
        Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
            warn!("timed out waiting for a request");
            None
        }
        Err(e) => {
            warn!("receive error: {}", e);
            None
        }
    }
}
