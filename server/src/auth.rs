//! # Basic Auth
//!
//! Optional HTTP basic auth over a file-backed `user → SHA-224(password)`
//! map. When the credential file is absent a default `sanlab` user is
//! seeded (password `sanlab` — change it with the `setpassword` control
//! word before anyone else finds the port). The map is rewritten to disk
//! on shutdown.
//!
//! Static assets and the favicon stay open; everything else requires
//! credentials when auth is enabled.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine;
use parking_lot::Mutex;
use sha2::{Digest, Sha224};

use chainwatch::config::PASSWD_FILE;
use chainwatch::transport::ConfigStore;

/// The default user seeded when no credential file exists.
pub const DEFAULT_USER: &str = "sanlab";

/// The authenticated user, inserted into request extensions so handlers
/// (the `setpassword` path) know who is talking.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

/// The in-memory credential map.
pub struct AuthState {
    users: Mutex<BTreeMap<String, String>>,
}

impl AuthState {
    /// Loads the credential file, seeding the default user when it is
    /// absent or unreadable.
    pub fn load(store: &dyn ConfigStore) -> Self {
        let users = match store.load(PASSWD_FILE) {
            Ok(Some(bytes)) => match serde_json::from_slice::<BTreeMap<String, String>>(&bytes) {
                Ok(users) if !users.is_empty() => users,
                Ok(_) | Err(_) => {
                    tracing::warn!("credential file unusable, seeding default user");
                    seeded()
                }
            },
            Ok(None) => {
                tracing::info!(user = DEFAULT_USER, "no credential file, seeding default user");
                seeded()
            }
            Err(err) => {
                tracing::warn!("cannot read credential file: {err}; seeding default user");
                seeded()
            }
        };
        Self {
            users: Mutex::new(users),
        }
    }

    /// Constant-shape check of one credential pair.
    pub fn verify(&self, user: &str, password: &str) -> bool {
        let expected = digest(password);
        self.users
            .lock()
            .get(user)
            .map(|stored| *stored == expected)
            .unwrap_or(false)
    }

    /// Replaces (or creates) one user's password hash.
    pub fn set_password(&self, user: &str, password: &str) {
        tracing::info!(user, "password updated");
        self.users
            .lock()
            .insert(user.to_string(), digest(password));
    }

    /// Rewrites the credential file. Called on shutdown.
    pub fn save(&self, store: &dyn ConfigStore) {
        let users = self.users.lock().clone();
        match serde_json::to_vec_pretty(&users) {
            Ok(bytes) => {
                if let Err(err) = store.save(PASSWD_FILE, &bytes) {
                    tracing::warn!("cannot persist credentials: {err}");
                }
            }
            Err(err) => tracing::warn!("cannot serialize credentials: {err}"),
        }
    }
}

fn seeded() -> BTreeMap<String, String> {
    let mut users = BTreeMap::new();
    users.insert(DEFAULT_USER.to_string(), digest(DEFAULT_USER));
    users
}

fn digest(password: &str) -> String {
    hex::encode(Sha224::digest(password.as_bytes()))
}

/// axum middleware enforcing basic auth on the command surface.
pub async fn require_auth(
    State(auth): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if path.starts_with("/static/") || path == "/favicon.ico" {
        return next.run(request).await;
    }

    let credentials = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_basic);

    match credentials {
        Some((user, password)) if auth.verify(&user, &password) => {
            request.extensions_mut().insert(AuthUser(user));
            next.run(request).await
        }
        _ => Response::builder()
            .status(StatusCode::UNAUTHORIZED)
            .header(WWW_AUTHENTICATE, r#"Basic realm="Restricted""#)
            .body(Body::from("Not authorized\n"))
            .expect("static response builds"),
    }
}

fn parse_basic(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, password) = text.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}
