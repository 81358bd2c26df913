use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::auth;
use crate::http::{self, Request, Response, StatusCode};
use crate::store::DocumentStore;
use crate::UstoreError;

/// Body of the `/signup` and `/login` requests
#[derive(Debug, Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse<'a> {
    status: &'a str,
    token: String,
}

/// Turns raw requests into responses. Every route that touches shared state goes through the
/// router's [`DocumentStore`].
///
/// | Method | Path      | Auth |
/// |--------|-----------|------|
/// | GET    | /users    | yes  |
/// | POST   | /users    | yes  |
/// | POST   | /signup   | no   |
/// | POST   | /login    | no   |
///
/// Anything else gets a `404 Not Found`.
#[derive(Debug, Clone)]
pub struct Router<S: DocumentStore> {
    store: S,
}

impl<S: DocumentStore> Router<S> {
    /// Create a new `Router` over the given store
    pub fn new(store: S) -> Self {
        Router { store }
    }

    /// the store requests are served from
    pub fn store(&self) -> &S {
        &self.store
    }

    /// parses `payload` and produces the response for it.
    ///
    /// This always returns a response: unparsable requests get a `400 Bad Request`, and a
    /// handler that panics is turned into a `500 Internal Server Error`.
    pub fn respond(&self, payload: &[u8]) -> Response {
        let request = match http::parse(payload) {
            Some(request) => request,
            None => {
                debug!("could not parse request of {} bytes", payload.len());
                return Response::bad_request();
            }
        };
        debug!("{} {}", request.method, request.path);

        match panic::catch_unwind(AssertUnwindSafe(|| self.handle(&request))) {
            Ok(response) => response,
            Err(_) => {
                error!("handler panicked on {} {}", request.method, request.path);
                Response::text(StatusCode::InternalServerError, "Internal Server Error")
            }
        }
    }

    /// dispatches a parsed request to its handler
    pub fn handle(&self, request: &Request) -> Response {
        match (request.method.as_str(), request.path.as_str()) {
            ("GET", "/users") => self.list_users(request),
            ("POST", "/users") => self.add_user(request),
            ("POST", "/signup") => self.signup(request),
            ("POST", "/login") => self.login(request),
            _ => Response::text(StatusCode::NotFound, "Not Found"),
        }
    }

    fn list_users(&self, request: &Request) -> Response {
        if !auth::verify_token(request.header("Authorization")) {
            return unauthorized();
        }
        let doc = self.store.read();
        // password hashes never leave the server
        let users: Vec<Value> = doc
            .users()
            .into_iter()
            .flatten()
            .map(|user| {
                let mut user = user.clone();
                if let Some(fields) = user.as_object_mut() {
                    fields.remove("password_hash");
                }
                user
            })
            .collect();
        Response::json(StatusCode::Ok, json!({ "users": users }).to_string())
    }

    fn add_user(&self, request: &Request) -> Response {
        if !auth::verify_token(request.header("Authorization")) {
            return unauthorized();
        }
        if request.body.is_empty() {
            return Response::text(StatusCode::BadRequest, "Missing request body");
        }
        // the posted object is stored as it is, with the id added to it
        let mut record = match serde_json::from_str::<Value>(&request.body) {
            Ok(Value::Object(record)) => record,
            Ok(_) => return missing_name_or_email(),
            Err(_) => return invalid_json(),
        };
        if !record.contains_key("name") || !record.contains_key("email") {
            return missing_name_or_email();
        }

        let mut created = Value::Null;
        let result = self.store.update(|doc| {
            let users = auth::users_mut(doc)?;
            record.insert("id".to_string(), json!(users.len() + 1));
            let record = Value::Object(record);
            users.push(record.clone());
            created = record;
            Ok(())
        });

        match result {
            Ok(_) => Response::json(StatusCode::Created, created.to_string()),
            Err(e) => server_error(e),
        }
    }

    fn signup(&self, request: &Request) -> Response {
        let credentials = match credentials(request) {
            Ok(credentials) => credentials,
            Err(response) => return response,
        };
        match auth::signup(&self.store, &credentials.username, &credentials.password) {
            Ok(()) => Response::json(StatusCode::Created, r#"{"status":"success"}"#),
            Err(UstoreError::UserExists(_)) => {
                Response::text(StatusCode::BadRequest, "Username already exists")
            }
            Err(UstoreError::InvalidInput(_)) => {
                Response::text(StatusCode::BadRequest, "Signup failed")
            }
            Err(e) => server_error(e),
        }
    }

    fn login(&self, request: &Request) -> Response {
        let credentials = match credentials(request) {
            Ok(credentials) => credentials,
            Err(response) => return response,
        };
        match auth::login(&self.store, &credentials.username, &credentials.password) {
            Ok(token) => {
                let body = LoginResponse {
                    status: "success",
                    token,
                };
                match serde_json::to_string(&body) {
                    Ok(body) => Response::json(StatusCode::Ok, body),
                    Err(e) => server_error(e.into()),
                }
            }
            Err(_) => Response::text(StatusCode::Unauthorized, "Invalid credentials"),
        }
    }
}

// reads the username and password out of a JSON request body
fn credentials(request: &Request) -> std::result::Result<Credentials, Response> {
    let body: Value = serde_json::from_str(&request.body).map_err(|_| invalid_json())?;
    serde_json::from_value(body)
        .map_err(|_| Response::text(StatusCode::BadRequest, "Missing username or password"))
}

fn unauthorized() -> Response {
    Response::text(StatusCode::Unauthorized, "Unauthorized")
}

fn missing_name_or_email() -> Response {
    Response::text(StatusCode::BadRequest, "Missing name or email")
}

fn invalid_json() -> Response {
    Response::text(StatusCode::BadRequest, "Invalid JSON")
}

fn server_error(e: UstoreError) -> Response {
    error!("request failed: {}", e);
    match e {
        UstoreError::Io(_) | UstoreError::Serde(_) => {
            Response::text(StatusCode::InternalServerError, "Failed to persist data")
        }
        _ => Response::text(StatusCode::InternalServerError, "Internal Server Error"),
    }
}
