//! A minimal HTTP/1.1 subset: just enough to parse a single request sent on a fresh connection
//! and to write a single response back before the connection is closed.
//!
//! Lines may end with either `\r\n` or `\n`. There is no keep-alive, every response carries
//! `Connection: close`.
use std::fmt;

// maximum number of headers kept from a request, anything after is ignored
const MAX_HEADERS: usize = 50;

/// A parsed HTTP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// the request method, i.e. `GET`
    pub method: String,
    /// the request target, i.e. `/users`
    pub path: String,
    /// the request headers, in the order they were received
    pub headers: Vec<(String, String)>,
    /// the request body, empty if the request did not have one
    pub body: String,
}

impl Request {
    /// returns the value of the first header named `name`, ignoring ASCII case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// parses the raw bytes of a request. Returns `None` if the bytes are not a well formed
/// request: not UTF-8, no blank line between headers and body, or an incomplete request line.
///
/// Header lines without a colon are skipped. If a `Content-Length` header is present, the body
/// is cut down to that many bytes.
pub fn parse(raw: &[u8]) -> Option<Request> {
    let text = std::str::from_utf8(raw).ok()?;
    let (head, body) = split_head(text)?;

    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?;
    let path = request_line.next()?;
    let version = request_line.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .take(MAX_HEADERS)
        .collect();

    let mut request = Request {
        method: method.to_string(),
        path: path.to_string(),
        headers,
        body: body.to_string(),
    };

    let declared = request
        .header("Content-Length")
        .and_then(|len| len.parse::<usize>().ok());
    if let Some(len) = declared {
        if len < request.body.len() && request.body.is_char_boundary(len) {
            request.body.truncate(len);
        }
    }
    Some(request)
}

// splits a request into its head (request line plus headers) and its body, at the first empty
// line. Returns `None` if there is no empty line.
fn split_head(text: &str) -> Option<(&str, &str)> {
    let bytes = text.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b != b'\n' {
            continue;
        }
        match bytes.get(i + 1) {
            Some(b'\n') => return Some((&text[..i], &text[i + 2..])),
            Some(b'\r') if bytes.get(i + 2) == Some(&b'\n') => {
                return Some((&text[..i], &text[i + 3..]))
            }
            _ => {}
        }
    }
    None
}

/// The response status codes used by the server
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StatusCode {
    /// 200
    Ok,
    /// 201
    Created,
    /// 400
    BadRequest,
    /// 401
    Unauthorized,
    /// 404
    NotFound,
    /// 500
    InternalServerError,
}

impl StatusCode {
    /// the numeric status code
    pub fn code(self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::BadRequest => 400,
            StatusCode::Unauthorized => 401,
            StatusCode::NotFound => 404,
            StatusCode::InternalServerError => 500,
        }
    }

    /// the reason phrase that goes with the code
    pub fn reason(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

/// An HTTP response, ready to be written to a connection with [`Response::to_bytes`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// the response status
    pub status: StatusCode,
    /// value of the `Content-Type` header
    pub content_type: &'static str,
    /// the response body
    pub body: String,
}

impl Response {
    /// a response with an `application/json` body
    pub fn json(status: StatusCode, body: impl Into<String>) -> Self {
        Response {
            status,
            content_type: "application/json",
            body: body.into(),
        }
    }

    /// a response with a `text/plain` body, used for all error responses
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Response {
            status,
            content_type: "text/plain",
            body: body.into(),
        }
    }

    /// the generic response for requests that could not be parsed
    pub fn bad_request() -> Self {
        Response::text(StatusCode::BadRequest, "Bad Request")
    }

    /// encodes the response into its wire format
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status,
            self.content_type,
            self.body.len()
        )
        .into_bytes();
        out.extend_from_slice(self.body.as_bytes());
        out
    }
}

/// parses a response as written by [`Response::to_bytes`], returning its status code and body.
/// Used by the client.
pub fn parse_response(raw: &[u8]) -> Option<(u16, String)> {
    let text = std::str::from_utf8(raw).ok()?;
    let (head, body) = split_head(text)?;
    let status_line = head.lines().next()?;
    let mut parts = status_line.split_whitespace();
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    let code = parts.next()?.parse::<u16>().ok()?;
    Some((code, body.to_string()))
}
