use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::http;
use crate::{Result, UstoreError};

// how long the client waits for the server's response
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// A response received from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientResponse {
    /// the HTTP status code
    pub status: u16,
    /// the response body
    pub body: String,
}

impl ClientResponse {
    /// returns true for 2xx status codes
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    token: String,
}

/// `UstoreClient` contains the functionality for communicating with a
/// [`UstoreServer`](crate::UstoreServer).
///
/// Every request is sent on its own connection, which the server closes after responding.
/// Once [`login`](UstoreClient::login) succeeds, the token is sent along with every request
/// that follows.
#[derive(Debug, Clone)]
pub struct UstoreClient {
    addr: SocketAddr,
    token: Option<String>,
}

impl UstoreClient {
    /// creates a client for the server at `addr`. No connection is made until a request is sent
    pub fn new(addr: SocketAddr) -> Self {
        UstoreClient { addr, token: None }
    }

    /// sets the bearer token sent with each request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// the bearer token sent with each request, if any
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// fetches the registered users, `GET /users`
    pub fn users(&self) -> Result<ClientResponse> {
        self.send("GET", "/users", None)
    }

    /// adds a user record, `POST /users`
    pub fn add_user(&self, name: &str, email: &str) -> Result<ClientResponse> {
        let body = json!({ "name": name, "email": email }).to_string();
        self.send("POST", "/users", Some(&body))
    }

    /// registers a new account, `POST /signup`
    pub fn signup(&self, username: &str, password: &str) -> Result<ClientResponse> {
        let body = json!({ "username": username, "password": password }).to_string();
        self.send("POST", "/signup", Some(&body))
    }

    /// logs in, `POST /login`, and keeps the returned token for the following requests
    ///
    /// # Errors
    /// returns [`UstoreError::StringErr`] with the server's message if the login was refused
    pub fn login(&mut self, username: &str, password: &str) -> Result<String> {
        let body = json!({ "username": username, "password": password }).to_string();
        let resp = self.send("POST", "/login", Some(&body))?;
        if !resp.is_success() {
            return Err(UstoreError::StringErr(resp.body));
        }
        let LoginBody { token } = serde_json::from_str(&resp.body)?;
        self.token = Some(token.clone());
        Ok(token)
    }

    /// sends a single request and reads the whole response
    pub fn send(&self, method: &str, path: &str, body: Option<&str>) -> Result<ClientResponse> {
        let mut request = format!(
            "{} {} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\n",
            method, path, self.addr
        );
        if let Some(token) = &self.token {
            request.push_str(&format!("Authorization: Bearer {}\r\n", token));
        }
        let body = body.unwrap_or_default();
        if !body.is_empty() {
            request.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        request.push_str("Connection: close\r\n\r\n");
        request.push_str(body);

        let mut stream = TcpStream::connect(self.addr)?;
        stream.set_read_timeout(Some(RESPONSE_TIMEOUT))?;
        stream.write_all(request.as_bytes())?;
        stream.flush()?;

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw)?;
        let (status, body) = http::parse_response(&raw).ok_or_else(|| {
            UstoreError::Parsing(format!("malformed response of {} bytes", raw.len()))
        })?;
        debug!("{} {} -> {}", method, path, status);
        Ok(ClientResponse { status, body })
    }
}
