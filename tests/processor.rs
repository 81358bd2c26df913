use std::fs;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tempfile::TempDir;
use ustore::pool::processor::{self, Connection};
use ustore::{BoundedQueue, Document, DocumentStore, JsonStore, QueueEntry, Router};

/// A connection that records what was written to it and how often it was closed
#[derive(Clone, Default)]
struct MockConnection {
    written: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicUsize>,
    fail_writes: bool,
}

impl MockConnection {
    fn failing() -> Self {
        MockConnection {
            fail_writes: true,
            ..MockConnection::default()
        }
    }

    fn response(&self) -> (u16, String) {
        let written = self.written.lock().unwrap();
        ustore::http::parse_response(&written).expect("no response was written")
    }

    fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Write for MockConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"));
        }
        self.written.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connection for MockConnection {
    fn close(self) -> io::Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A store that panics on its next `panics` reads or updates. Updates panic while the inner
/// store's lock is held.
#[derive(Clone)]
struct PanickingStore {
    inner: JsonStore,
    panics: Arc<AtomicUsize>,
}

impl PanickingStore {
    fn new(temp_dir: &TempDir, panics: usize) -> Self {
        PanickingStore {
            inner: JsonStore::open(temp_dir.path().join("users.json")).unwrap(),
            panics: Arc::new(AtomicUsize::new(panics)),
        }
    }

    fn take_panic(&self) -> bool {
        self.panics
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl DocumentStore for PanickingStore {
    fn read(&self) -> Document {
        if self.take_panic() {
            panic!("read failed");
        }
        self.inner.read()
    }

    fn write(&self, doc: Value) -> ustore::Result<()> {
        self.inner.write(doc)
    }

    fn update<F>(&self, f: F) -> ustore::Result<Document>
    where
        F: FnOnce(&mut Value) -> ustore::Result<()>,
    {
        let panics = self.take_panic();
        self.inner.update(|doc| {
            if panics {
                panic!("update failed");
            }
            f(doc)
        })
    }
}

fn router(temp_dir: &TempDir) -> Router<JsonStore> {
    Router::new(JsonStore::open(temp_dir.path().join("users.json")).unwrap())
}

fn request(method: &str, path: &str, token: Option<&str>, body: &str) -> Vec<u8> {
    let mut raw = format!("{} {} HTTP/1.1\r\nHost: localhost\r\n", method, path);
    if let Some(token) = token {
        raw.push_str(&format!("Authorization: Bearer {}\r\n", token));
    }
    raw.push_str(&format!("Content-Length: {}\r\n\r\n{}", body.len(), body));
    raw.into_bytes()
}

fn serve(router: &Router<JsonStore>, payload: Vec<u8>) -> (u16, String) {
    let conn = MockConnection::default();
    processor::serve(QueueEntry::new(conn.clone(), payload), router);
    assert_eq!(conn.close_count(), 1);
    conn.response()
}

fn login(router: &Router<JsonStore>, username: &str, password: &str) -> String {
    let body = json!({ "username": username, "password": password }).to_string();
    let (status, _) = serve(router, request("POST", "/signup", None, &body));
    assert_eq!(status, 201);
    let (status, resp) = serve(router, request("POST", "/login", None, &body));
    assert_eq!(status, 200);
    let resp: Value = serde_json::from_str(&resp).unwrap();
    resp["token"].as_str().unwrap().to_string()
}

#[test]
fn drains_every_queued_request_after_shutdown() {
    const REQUESTS: usize = 20;
    let temp_dir = TempDir::new().unwrap();
    let router = router(&temp_dir);
    let queue = BoundedQueue::new(REQUESTS);

    let conns: Vec<MockConnection> = (0..REQUESTS).map(|_| MockConnection::default()).collect();
    for conn in &conns {
        queue
            .push(QueueEntry::new(conn.clone(), request("GET", "/nowhere", None, "")))
            .unwrap();
    }
    queue.shutdown();

    crossbeam_utils::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|_| processor::run(&queue, &router));
        }
    })
    .unwrap();

    assert!(queue.is_empty());
    for conn in &conns {
        assert_eq!(conn.close_count(), 1);
        assert_eq!(conn.response().0, 404);
    }
}

#[test]
fn connection_is_closed_when_the_write_fails() {
    let temp_dir = TempDir::new().unwrap();
    let router = router(&temp_dir);
    let conn = MockConnection::failing();

    processor::serve(QueueEntry::new(conn.clone(), request("GET", "/", None, "")), &router);
    assert_eq!(conn.close_count(), 1);
    assert!(conn.written.lock().unwrap().is_empty());
}

#[test]
fn garbage_gets_a_bad_request() {
    let temp_dir = TempDir::new().unwrap();
    let router = router(&temp_dir);
    let (status, body) = serve(&router, b"\x00\x01 definitely not http".to_vec());
    assert_eq!(status, 400);
    assert_eq!(body, "Bad Request");
}

#[test]
fn unknown_routes_are_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let router = router(&temp_dir);
    assert_eq!(serve(&router, request("GET", "/missing", None, "")).0, 404);
    assert_eq!(serve(&router, request("DELETE", "/users", None, "")).0, 404);
    assert_eq!(serve(&router, request("GET", "/signup", None, "")).0, 404);
}

#[test]
fn users_require_a_token() {
    let temp_dir = TempDir::new().unwrap();
    let router = router(&temp_dir);
    let before = fs::read(router.store().path()).unwrap();

    let (status, body) = serve(&router, request("GET", "/users", None, ""));
    assert_eq!((status, body.as_str()), (401, "Unauthorized"));
    let body = json!({ "name": "x", "email": "y" }).to_string();
    assert_eq!(serve(&router, request("POST", "/users", None, &body)).0, 401);
    assert_eq!(serve(&router, request("POST", "/users", Some("short"), &body)).0, 401);

    assert_eq!(fs::read(router.store().path()).unwrap(), before);
}

#[test]
fn signup_then_login() {
    let temp_dir = TempDir::new().unwrap();
    let router = router(&temp_dir);
    let body = json!({ "username": "alice", "password": "wonderland" }).to_string();

    let (status, resp) = serve(&router, request("POST", "/signup", None, &body));
    assert_eq!(status, 201);
    assert_eq!(serde_json::from_str::<Value>(&resp).unwrap(), json!({ "status": "success" }));

    let (status, resp) = serve(&router, request("POST", "/signup", None, &body));
    assert_eq!((status, resp.as_str()), (400, "Username already exists"));

    let (status, resp) = serve(&router, request("POST", "/login", None, &body));
    assert_eq!(status, 200);
    let resp: Value = serde_json::from_str(&resp).unwrap();
    assert_eq!(resp["status"], "success");
    assert_eq!(resp["token"].as_str().unwrap().len(), 32);

    let wrong = json!({ "username": "alice", "password": "nope" }).to_string();
    let (status, resp) = serve(&router, request("POST", "/login", None, &wrong));
    assert_eq!((status, resp.as_str()), (401, "Invalid credentials"));
}

#[test]
fn credentials_must_be_json_with_both_fields() {
    let temp_dir = TempDir::new().unwrap();
    let router = router(&temp_dir);

    for path in &["/signup", "/login"] {
        let (status, resp) = serve(&router, request("POST", path, None, "{not json"));
        assert_eq!((status, resp.as_str()), (400, "Invalid JSON"));
        let (status, resp) = serve(&router, request("POST", path, None, r#"{"username":"a"}"#));
        assert_eq!((status, resp.as_str()), (400, "Missing username or password"));
    }

    let empty = json!({ "username": "", "password": "pw" }).to_string();
    let (status, resp) = serve(&router, request("POST", "/signup", None, &empty));
    assert_eq!((status, resp.as_str()), (400, "Signup failed"));
}

#[test]
fn listing_users_hides_password_hashes() {
    let temp_dir = TempDir::new().unwrap();
    let router = router(&temp_dir);
    let token = login(&router, "alice", "wonderland");

    let (status, resp) = serve(&router, request("GET", "/users", Some(&token), ""));
    assert_eq!(status, 200);
    let resp: Value = serde_json::from_str(&resp).unwrap();
    assert_eq!(resp, json!({ "users": [{ "username": "alice" }] }));
}

#[test]
fn add_user_appends_a_record() {
    let temp_dir = TempDir::new().unwrap();
    let router = router(&temp_dir);
    let token = login(&router, "alice", "wonderland");

    let body = json!({ "name": "Bob", "email": "bob@example.com" }).to_string();
    let (status, resp) = serve(&router, request("POST", "/users", Some(&token), &body));
    assert_eq!(status, 201);
    let record: Value = serde_json::from_str(&resp).unwrap();
    assert_eq!(record, json!({ "name": "Bob", "email": "bob@example.com", "id": 2 }));

    let doc = router.store().read();
    assert_eq!(doc.users().unwrap().len(), 2);
    let persisted: Value = serde_json::from_slice(&fs::read(router.store().path()).unwrap()).unwrap();
    assert_eq!(persisted["users"][1], record);
}

#[test]
fn add_user_validates_the_body() {
    let temp_dir = TempDir::new().unwrap();
    let router = router(&temp_dir);
    let token = "t".repeat(32);

    let (status, resp) = serve(&router, request("POST", "/users", Some(&token), ""));
    assert_eq!((status, resp.as_str()), (400, "Missing request body"));
    let (status, resp) = serve(&router, request("POST", "/users", Some(&token), "[1,"));
    assert_eq!((status, resp.as_str()), (400, "Invalid JSON"));
    let (status, resp) = serve(&router, request("POST", "/users", Some(&token), r#"{"name":"x"}"#));
    assert_eq!((status, resp.as_str()), (400, "Missing name or email"));

    assert!(router.store().read().users().unwrap().is_empty());
}

#[test]
fn failed_persist_is_a_server_error() {
    let temp_dir = TempDir::new().unwrap();
    let router = router(&temp_dir);
    fs::create_dir(temp_dir.path().join("users.json.tmp")).unwrap();

    let body = json!({ "username": "alice", "password": "pw" }).to_string();
    let (status, resp) = serve(&router, request("POST", "/signup", None, &body));
    assert_eq!((status, resp.as_str()), (500, "Failed to persist data"));
    assert!(router.store().read().users().unwrap().is_empty());
}

#[test]
fn concurrent_add_user_loses_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let router = router(&temp_dir);
    let token = "t".repeat(32);

    crossbeam_utils::thread::scope(|s| {
        for t in 0..4 {
            let router = &router;
            let token = &token;
            s.spawn(move |_| {
                for i in 0..5 {
                    let body = json!({ "name": format!("{}-{}", t, i), "email": "e" }).to_string();
                    let (status, _) = serve(router, request("POST", "/users", Some(token), &body));
                    assert_eq!(status, 201);
                }
            });
        }
    })
    .unwrap();

    let doc = router.store().read();
    let mut ids: Vec<u64> = doc
        .users()
        .unwrap()
        .iter()
        .map(|user| user["id"].as_u64().unwrap())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=20).collect::<Vec<u64>>());
}

#[test]
fn add_user_keeps_every_posted_field() {
    let temp_dir = TempDir::new().unwrap();
    let router = router(&temp_dir);
    let token = "t".repeat(32);

    let body = json!({ "name": "Bob", "email": "b@x", "phone": "123", "tags": ["a"] }).to_string();
    let (status, resp) = serve(&router, request("POST", "/users", Some(&token), &body));
    assert_eq!(status, 201);
    let expected = json!({ "name": "Bob", "email": "b@x", "phone": "123", "tags": ["a"], "id": 1 });
    assert_eq!(serde_json::from_str::<Value>(&resp).unwrap(), expected);
    assert_eq!(router.store().read()["users"][0], expected);

    // only the presence of the two fields is checked
    let body = json!({ "name": 42, "email": null }).to_string();
    let (status, resp) = serve(&router, request("POST", "/users", Some(&token), &body));
    assert_eq!(status, 201);
    assert_eq!(serde_json::from_str::<Value>(&resp).unwrap()["id"], 2);

    let (status, resp) = serve(&router, request("POST", "/users", Some(&token), "[1, 2]"));
    assert_eq!((status, resp.as_str()), (400, "Missing name or email"));
}

#[test]
fn panicking_handler_gets_a_server_error() {
    let temp_dir = TempDir::new().unwrap();
    let router = Router::new(PanickingStore::new(&temp_dir, usize::MAX));
    let token = "t".repeat(32);

    for payload in vec![
        request("GET", "/users", Some(&token), ""),
        request("POST", "/signup", None, r#"{"username":"a","password":"b"}"#),
        request("POST", "/users", Some(&token), r#"{"name":"a","email":"b"}"#),
    ] {
        let conn = MockConnection::default();
        processor::serve(QueueEntry::new(conn.clone(), payload), &router);
        assert_eq!(conn.close_count(), 1);
        assert_eq!(conn.response(), (500, "Internal Server Error".to_string()));
    }
}

#[test]
fn processor_keeps_serving_after_a_panic_inside_the_store_lock() {
    let temp_dir = TempDir::new().unwrap();
    let router = Router::new(PanickingStore::new(&temp_dir, 1));
    let queue = BoundedQueue::new(4);

    let body = json!({ "username": "alice", "password": "wonderland" }).to_string();
    let first = MockConnection::default();
    let second = MockConnection::default();
    queue
        .push(QueueEntry::new(first.clone(), request("POST", "/signup", None, &body)))
        .unwrap();
    queue
        .push(QueueEntry::new(second.clone(), request("POST", "/signup", None, &body)))
        .unwrap();
    queue.shutdown();

    processor::run(&queue, &router);

    assert_eq!(first.response().0, 500);
    assert_eq!(second.response().0, 201);
    assert_eq!((first.close_count(), second.close_count()), (1, 1));

    let users = router.store().inner.read();
    assert_eq!(users.users().unwrap().len(), 1);
    let persisted: Value =
        serde_json::from_slice(&fs::read(router.store().inner.path()).unwrap()).unwrap();
    assert_eq!(persisted["users"][0]["username"], "alice");
}
