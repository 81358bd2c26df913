#![deny(missing_docs)]
//! A multithreaded user store (ustore) served over a minimal HTTP/1.1 subset, keeping all of its
//! data in a single, durably persisted JSON document.
//!
//! This crate provides the [`UstoreServer`] pipeline itself, as well as a [`ustore-client`]
//! and [`ustore-server`] executable that can be used to interact with it.
//!
//! ## Supported Routes
//! - `GET /users` lists the registered users (requires a bearer token)
//! - `POST /users` adds a `{"name", "email"}` user record (requires a bearer token)
//! - `POST /signup` registers a `{"username", "password"}` account
//! - `POST /login` checks an account's credentials and issues a token
//!
//! See the [`Router`] for the responses of each route.
//!
//! ## Request Pipeline
//! Every connection carries exactly one request and one response. Requests flow through two
//! tiers of threads:
//! - acceptor threads block on the listening socket, read one request from each new connection
//! (bounded by a receive timeout) and push it onto a [`BoundedQueue`]
//! - processor threads pop requests off the queue in FIFO order, route them, write the response
//! and close the connection
//!
//! The queue has a fixed capacity. When the processors fall behind the queue fills up and blocks
//! the acceptors, which leaves new connections waiting in the OS backlog.
//!
//! ## Shutdown
//! [`ServerHandle::shutdown`] cancels the [`ShutdownToken`], wakes and joins the acceptors,
//! shuts the queue down and joins the processors. Requests that are already queued still get a
//! response before the processors exit.
//!
//! ## Shared Document
//! All state lives in one JSON document, held by a [`DocumentStore`]. [`JsonStore`] mirrors it
//! to a file using a write-to-temp-file, sync, then rename sequence, so the file on disk is always
//! either the old or the new document. Readers get immutable snapshots, and read-modify-write
//! cycles go through [`DocumentStore::update`] so that concurrent updates are never lost.
//!
//! [`ustore-server`]: ./ustore-server.rs
//! [`ustore-client`]: ./ustore-client.rs

pub use client::{ClientResponse, UstoreClient};
pub use config::ServerConfig;
pub use error::{Result, UstoreError};
pub use queue::{BoundedQueue, PushError, QueueEntry};
pub use router::Router;
pub use server::{ServerHandle, UstoreServer};
pub use shutdown::ShutdownToken;
pub use store::{Document, DocumentStore, JsonStore, LoadStatus};

pub mod auth;
mod client;
pub mod config;
mod error;
pub mod http;
pub mod pool;
pub mod queue;
mod router;
mod server;
mod shutdown;
pub mod store;
