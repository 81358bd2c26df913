use std::io;
use thiserror::Error;

/// type alias for all operations in this crate that could fail with an [`UstoreError`]
pub type Result<T> = std::result::Result<T, UstoreError>;

/// The Error variants used by the ustore server, store and client.
///
/// Worker threads never let these escape: the acceptor and processor loops turn them into
/// log lines or HTTP responses at the point where they occur.
#[derive(Error, Debug)]
pub enum UstoreError {
    /// variant for errors caused from file or socket IO
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// serde (de)serialization errors
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// a signup was attempted with a username that is already registered
    #[error("username already exists: {0}")]
    UserExists(String),

    /// a login was attempted with an unknown username or a wrong password
    #[error("invalid credentials")]
    InvalidCredentials,

    /// a request carried missing or empty fields
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// the stored document does not have the expected shape
    #[error("malformed document: {0}")]
    Document(String),

    /// a server configuration that can not be run, e.g. zero worker threads
    #[error("invalid configuration: {0}")]
    Config(String),

    /// command line or address parsing errors
    #[error("parsing error: {0}")]
    Parsing(String),

    /// an error message that was returned by the server
    #[error("{0}")]
    StringErr(String),
}
