//! Account signup, login and bearer token checks.
//!
//! Accounts live in the `users` array of the shared document as
//! `{"username": .., "password_hash": ..}` objects. The password hash is the hex encoded salt
//! followed by the hex encoded SHA-256 digest of `salt ++ password`.
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::store::DocumentStore;
use crate::{Result, UstoreError};

/// number of random salt bytes mixed into every password hash
pub const SALT_LENGTH: usize = 16;

/// length of the hex encoded SHA-256 digest
const HASH_LENGTH: usize = 64;

/// length of the tokens issued by [`login`]
pub const TOKEN_LENGTH: usize = 32;

const BEARER_PREFIX: &str = "Bearer ";

/// An account as it is persisted in the `users` array
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    /// the unique name of the account
    pub username: String,
    /// hex salt followed by the hex SHA-256 of salt and password
    pub password_hash: String,
}

fn digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// hashes `password` with a fresh random salt, returning the string that gets stored
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill(&mut salt);
    format!("{}{}", hex::encode(salt), digest(&salt, password))
}

/// checks `password` against a hash produced by [`hash_password`].
/// A stored hash that is not in the expected format never matches.
pub fn verify_password(password: &str, stored: &str) -> bool {
    if stored.len() != SALT_LENGTH * 2 + HASH_LENGTH || !stored.is_char_boundary(SALT_LENGTH * 2) {
        debug!("invalid stored hash format");
        return false;
    }
    let (salt_hex, hash) = stored.split_at(SALT_LENGTH * 2);
    match hex::decode(salt_hex) {
        Ok(salt) => digest(&salt, password) == hash,
        Err(_) => false,
    }
}

/// generates a random alphanumeric token of [`TOKEN_LENGTH`] characters
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// registers a new account with the given `username` and `password`.
///
/// # Errors
/// - [`UstoreError::InvalidInput`] if the username or password is empty
/// - [`UstoreError::UserExists`] if the username is already taken
/// - any error from persisting the updated document
pub fn signup<S: DocumentStore>(store: &S, username: &str, password: &str) -> Result<()> {
    if username.is_empty() || password.is_empty() {
        return Err(UstoreError::InvalidInput(
            "username and password must not be empty".to_string(),
        ));
    }
    // hashing is done before taking the store's lock
    let account = Account {
        username: username.to_string(),
        password_hash: hash_password(password),
    };

    store.update(|doc| {
        let users = users_mut(doc)?;
        let taken = users
            .iter()
            .any(|user| user.get("username").and_then(Value::as_str) == Some(username));
        if taken {
            return Err(UstoreError::UserExists(username.to_string()));
        }
        users.push(serde_json::to_value(&account)?);
        Ok(())
    })?;
    debug!("signed up user {}", username);
    Ok(())
}

/// checks the credentials of an account and issues a new token for it.
///
/// # Errors
/// [`UstoreError::InvalidCredentials`] if there is no account with a matching password
pub fn login<S: DocumentStore>(store: &S, username: &str, password: &str) -> Result<String> {
    if username.is_empty() || password.is_empty() {
        return Err(UstoreError::InvalidCredentials);
    }
    let doc = store.read();
    let matched = doc
        .users()
        .into_iter()
        .flatten()
        .filter(|user| user.get("username").and_then(Value::as_str) == Some(username))
        .filter_map(|user| user.get("password_hash").and_then(Value::as_str))
        .any(|stored| verify_password(password, stored));

    if matched {
        debug!("login successful for user {}", username);
        Ok(generate_token())
    } else {
        debug!("login failed for user {}", username);
        Err(UstoreError::InvalidCredentials)
    }
}

/// checks the value of an `Authorization` header.
///
/// NOTE: tokens are not recorded anywhere when they are issued, so this only checks their
/// shape: an optional `Bearer ` prefix followed by exactly [`TOKEN_LENGTH`] characters.
pub fn verify_token(header: Option<&str>) -> bool {
    let header = match header {
        Some(header) => header,
        None => {
            debug!("no token provided");
            return false;
        }
    };
    let token = header.strip_prefix(BEARER_PREFIX).unwrap_or(header);
    if token.chars().count() != TOKEN_LENGTH {
        debug!("invalid token length: {}", token.chars().count());
        return false;
    }
    true
}

/// gets the `users` array of the document, creating it if the document does not have one yet
pub(crate) fn users_mut(doc: &mut Value) -> Result<&mut Vec<Value>> {
    let root = doc
        .as_object_mut()
        .ok_or_else(|| UstoreError::Document("the document is not an object".to_string()))?;
    root.entry("users")
        .or_insert_with(|| Value::Array(vec![]))
        .as_array_mut()
        .ok_or_else(|| UstoreError::Document("`users` is not an array".to_string()))
}
