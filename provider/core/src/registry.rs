//! Request Lifecycle Registry
//!
//! Tracks the in-flight calls of one client instance so they can be cancelled
//! individually or all at once.
//!
//! # Lifecycle
//!
//! ```text
//!   register() ──► Created ──► InFlight ──┬──► Completed  (guard dropped)
//!                  (entry)    (token in   ├──► Failed     (guard dropped)
//!                             transport)  └──► Cancelled  (cancel / cancel_all)
//! ```
//!
//! Every terminal state removes the entry. Completion and failure are covered
//! by [`RequestGuard`]'s `Drop`, so an early `?` return or a stream dropped
//! half-way through cannot leak an entry.
//!
//! Each entry carries a generation number. A guard only removes the entry it
//! created, so a cancelled guard dropped after its id was registered again
//! leaves the newer request alone.
//!
//! # Thread Safety
//!
//! The map sits behind `Arc<RwLock<>>`; clones of the registry share it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ProviderError;

/// Identifier of one in-flight call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req_{}", self.0.simple())
    }
}

struct Entry {
    generation: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct Entries {
    next_generation: u64,
    map: HashMap<RequestId, Entry>,
}

/// Per-client map of in-flight requests
#[derive(Clone, Default)]
pub struct RequestRegistry {
    inner: Arc<RwLock<Entries>>,
}

impl fmt::Debug for RequestRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRegistry")
            .field("in_flight", &self.len())
            .finish()
    }
}

impl RequestRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new request
    ///
    /// Uses `id` when given, otherwise generates one. The returned guard owns
    /// the cancellation token and removes the entry when dropped.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if `id` is already in flight on this client.
    pub fn register(&self, id: Option<RequestId>) -> Result<RequestGuard, ProviderError> {
        let id = id.unwrap_or_default();
        let token = CancellationToken::new();

        let generation = {
            let mut entries = self.inner.write();
            if entries.map.contains_key(&id) {
                return Err(ProviderError::InvalidRequest(format!(
                    "request {id} is already in flight"
                )));
            }
            let generation = entries.next_generation;
            entries.next_generation += 1;
            entries.map.insert(
                id,
                Entry {
                    generation,
                    token: token.clone(),
                },
            );
            generation
        };

        tracing::debug!(request_id = %id, "Request registered");

        Ok(RequestGuard {
            id,
            generation,
            token,
            registry: self.clone(),
        })
    }

    /// Cancel one request
    ///
    /// Returns `false` if the request already reached a terminal state.
    pub fn cancel(&self, id: &RequestId) -> bool {
        let entry = self.inner.write().map.remove(id);
        match entry {
            Some(entry) => {
                entry.token.cancel();
                tracing::debug!(request_id = %id, "Request cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every registered request and clear the map
    ///
    /// Returns the number of requests cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Entry> = self.inner.write().map.drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.token.cancel();
        }

        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "Cancelled all in-flight requests");
        }
        drained.len()
    }

    /// Whether a request is still in flight
    #[must_use]
    pub fn contains(&self, id: &RequestId) -> bool {
        self.inner.read().map.contains_key(id)
    }

    /// Number of in-flight requests
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().map.len()
    }

    /// Whether nothing is in flight
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().map.is_empty()
    }

    /// Ids of all in-flight requests
    #[must_use]
    pub fn ids(&self) -> Vec<RequestId> {
        self.inner.read().map.keys().copied().collect()
    }

    /// Remove the entry for `id` if it is still the one `generation` created
    fn complete(&self, id: &RequestId, generation: u64) {
        let mut entries = self.inner.write();
        if entries.map.get(id).is_some_and(|e| e.generation == generation) {
            entries.map.remove(id);
            drop(entries);
            tracing::debug!(request_id = %id, "Request settled");
        }
    }
}

/// Ownership of one registry entry
///
/// Dropping the guard settles the request.
pub struct RequestGuard {
    id: RequestId,
    generation: u64,
    token: CancellationToken,
    registry: RequestRegistry,
}

impl RequestGuard {
    /// Id of the guarded request
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Cancellation token to race against I/O
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether the request has been cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl fmt::Debug for RequestGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestGuard")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.registry.complete(&self.id, self.generation);
    }
}
