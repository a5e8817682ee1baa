use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// An upstream HTTP server reachable at `addr`, routed to by URL-path
/// prefix. Two backends are the same backend iff both fields are equal.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Backend {
    #[serde(rename = "Addr")]
    pub addr: String,

    #[serde(rename = "Path", default)]
    pub path: String,
}

impl Backend {
    pub fn new(addr: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            path: path.into(),
        }
        .normalized()
    }

    /// An empty prefix routes everything.
    pub fn normalized(mut self) -> Self {
        if self.path.is_empty() {
            self.path = "/".to_string();
        }
        self
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.addr, self.path)
    }
}

/// The live backend list: read on every proxied request, written only by
/// the registrar supervisor. Insertion order is dispatch order.
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    backends: Arc<Mutex<Vec<Backend>>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `backend` unless an equal entry is already present. Returns
    /// whether the list changed.
    pub async fn add(&self, backend: Backend) -> bool {
        let mut backends = self.backends.lock().await;
        if backends.contains(&backend) {
            return false;
        }
        backends.push(backend);
        true
    }

    /// Drop every entry equal to `backend`. Returns whether the list
    /// changed.
    pub async fn remove(&self, backend: &Backend) -> bool {
        let mut backends = self.backends.lock().await;
        let before = backends.len();
        backends.retain(|b| b != backend);
        backends.len() != before
    }

    /// Copy of the current list, in dispatch order.
    pub async fn snapshot(&self) -> Vec<Backend> {
        self.backends.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.backends.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.backends.lock().await.is_empty()
    }
}
