use ustore::http::{self, Response, StatusCode};

#[test]
fn parses_a_crlf_request() {
    let raw = b"POST /signup HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: 13\r\n\r\n{\"a\":\"hello\"}";
    let request = http::parse(raw).unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/signup");
    assert_eq!(request.headers.len(), 3);
    assert_eq!(request.header("host"), Some("localhost"));
    assert_eq!(request.header("CONTENT-TYPE"), Some("application/json"));
    assert_eq!(request.body, "{\"a\":\"hello\"}");
}

#[test]
fn parses_a_bare_lf_request() {
    let raw = b"GET /users HTTP/1.0\nAuthorization: Bearer abc\n\n";
    let request = http::parse(raw).unwrap();
    assert_eq!(request.method, "GET");
    assert_eq!(request.path, "/users");
    assert_eq!(request.header("authorization"), Some("Bearer abc"));
    assert_eq!(request.body, "");
}

#[test]
fn header_values_keep_their_colons() {
    let request = http::parse(b"GET / HTTP/1.1\r\nHost: 127.0.0.1:8080\r\n\r\n").unwrap();
    assert_eq!(request.header("Host"), Some("127.0.0.1:8080"));
}

#[test]
fn lines_without_a_colon_are_skipped() {
    let request = http::parse(b"GET / HTTP/1.1\r\nnot a header\r\nX-One: 1\r\n\r\n").unwrap();
    assert_eq!(request.headers, vec![("X-One".to_string(), "1".to_string())]);
}

#[test]
fn body_is_cut_to_content_length() {
    let request = http::parse(b"POST /users HTTP/1.1\r\nContent-Length: 4\r\n\r\nbodytrailing").unwrap();
    assert_eq!(request.body, "body");
}

#[test]
fn body_without_content_length_is_kept_whole() {
    let request = http::parse(b"POST /users HTTP/1.1\r\n\r\n{\"name\":\"x\"}").unwrap();
    assert_eq!(request.body, "{\"name\":\"x\"}");
}

#[test]
fn malformed_requests_are_rejected() {
    // no blank line after the headers
    assert!(http::parse(b"GET /users HTTP/1.1\r\nHost: x\r\n").is_none());
    // incomplete request line
    assert!(http::parse(b"GET /users\r\n\r\n").is_none());
    // not an HTTP version
    assert!(http::parse(b"GET /users FTP/1.0\r\n\r\n").is_none());
    // not UTF-8
    assert!(http::parse(b"GET /\xff HTTP/1.1\r\n\r\n").is_none());
    assert!(http::parse(b"").is_none());
}

#[test]
fn response_wire_format() {
    let response = Response::json(StatusCode::Created, r#"{"status":"success"}"#);
    let bytes = String::from_utf8(response.to_bytes()).unwrap();
    assert_eq!(
        bytes,
        "HTTP/1.1 201 Created\r\nContent-Type: application/json\r\nContent-Length: 20\r\nConnection: close\r\n\r\n{\"status\":\"success\"}"
    );
}

#[test]
fn error_responses_are_plain_text() {
    let response = Response::text(StatusCode::NotFound, "Not Found");
    let bytes = String::from_utf8(response.to_bytes()).unwrap();
    assert!(bytes.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(bytes.contains("Content-Type: text/plain\r\n"));
    assert!(bytes.ends_with("\r\n\r\nNot Found"));

    assert_eq!(Response::bad_request().status, StatusCode::BadRequest);
    assert_eq!(StatusCode::InternalServerError.to_string(), "500 Internal Server Error");
    assert_eq!(StatusCode::Unauthorized.code(), 401);
}

#[test]
fn parses_a_written_response() {
    let response = Response::text(StatusCode::Unauthorized, "Invalid credentials");
    let (status, body) = http::parse_response(&response.to_bytes()).unwrap();
    assert_eq!(status, 401);
    assert_eq!(body, "Invalid credentials");

    assert!(http::parse_response(b"garbage").is_none());
    assert!(http::parse_response(b"HTTP/1.1 abc OK\r\n\r\n").is_none());
}
