//! # External Seams
//!
//! The three interfaces through which the core touches the outside world:
//! [`Transport`] for the actual HTTP exchange, [`Clock`] for wall-clock
//! time, and [`ConfigStore`] for small persisted blobs (watchdog config,
//! credential map, RPC dumps).
//!
//! Production implementations live in the server binary; this module also
//! provides the in-process stand-ins the test suites run against
//! ([`ManualClock`], [`MemoryStore`] — the replay transport has its own
//! module, [`crate::mock`]).

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::Result;

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// One outbound JSON-RPC POST, fully assembled by the caller.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// Full URL, scheme and port included (e.g. `http://10.0.0.1:8545/`).
    pub url: String,
    /// Serialized JSON-RPC envelope.
    pub body: String,
    /// Value for the `User-Agent` header.
    pub user_agent: String,
    /// Hard deadline measured from dispatch.
    pub timeout: Duration,
}

/// What came back. Headers are deliberately absent — the core only ever
/// looks at the status and the body.
#[derive(Debug, Clone)]
pub struct OutboundResponse {
    /// Numeric HTTP status.
    pub status: u16,
    /// Status line as received, for error reporting (`"502 Bad Gateway"`).
    pub status_line: String,
    /// Response body, read to completion.
    pub body: String,
}

impl OutboundResponse {
    /// Whether the exchange ended in HTTP 200.
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Sends one HTTP request and returns the response.
///
/// Implementations must enforce `request.timeout` themselves and report a
/// missed deadline (or a failed dial) as [`crate::Error::Unreachable`].
/// A completed exchange with a non-200 status is returned as a normal
/// [`OutboundResponse`] — classifying it is the caller's job.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &OutboundRequest) -> Result<OutboundResponse>;
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of wall-clock time. Samples and incident IDs are stamped through
/// this, which is what makes stall detection testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real thing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used by the sampler and watchdog
/// tests to replay hours of probe history in microseconds.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Starts the clock at the given instant.
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += chrono::Duration::from_std(by).expect("duration fits");
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ---------------------------------------------------------------------------
// Config store
// ---------------------------------------------------------------------------

/// Read/write named blobs. Blobs are small (a config document, a dumped
/// RPC response body); implementations may rewrite the whole entry on
/// every save.
pub trait ConfigStore: Send + Sync {
    /// Returns the blob, or `None` if it was never written.
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>>;
    /// Writes the blob, replacing any previous content.
    fn save(&self, name: &str, bytes: &[u8]) -> Result<()>;
}

/// In-memory store for tests and mock mode.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all blobs written so far.
    pub fn names(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(name).cloned())
    }

    fn save(&self, name: &str, bytes: &[u8]) -> Result<()> {
        self.entries.lock().insert(name.to_string(), bytes.to_vec());
        Ok(())
    }
}
