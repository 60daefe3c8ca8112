//! Process-wide cancellation registry (spec.md §5, §9).
//!
//! A small concurrency-safe map from request id to a [`CancellationToken`]. Composition
//! over inheritance: this has no behavior beyond insert/remove/fire, and callers race
//! their own futures against the token however they need to.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

/// Tracks in-flight requests so a client disconnect or explicit abort can cancel the
/// upstream work backing them.
#[derive(Default)]
pub struct CancellationRegistry {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new token for `request_id`, replacing any prior entry.
    pub fn insert(&self, request_id: impl Into<String>) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.lock().expect("cancellation registry poisoned").insert(request_id.into(), token.clone());
        token
    }

    /// Removes the entry for `request_id`. Called once the request finishes, regardless
    /// of outcome.
    pub fn remove(&self, request_id: &str) {
        self.tokens.lock().expect("cancellation registry poisoned").remove(request_id);
    }

    /// Fires the token for `request_id`, if one is registered. Returns whether a token
    /// was found.
    pub fn fire(&self, request_id: &str) -> bool {
        match self.tokens.lock().expect("cancellation registry poisoned").get(request_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// RAII handle over a registered request id. Axum drops a handler's future without
/// polling it to completion when the underlying connection errors out (client
/// disconnect mid-request), which drops every local variable the future holds,
/// including this guard — so its `Drop` impl is the disconnect-detection path spec.md
/// §5 requires, with no explicit `tokio::select!` against a connection-close
/// notification needed. Call [`disarm`](Self::disarm) on every normal completion path
/// so a request that merely finishes isn't reported as cancelled.
pub struct CancellationGuard {
    registry: Arc<CancellationRegistry>,
    request_id: String,
    armed: bool,
}

impl CancellationGuard {
    pub fn new(registry: Arc<CancellationRegistry>, request_id: impl Into<String>) -> (Self, CancellationToken) {
        let request_id = request_id.into();
        let token = registry.insert(&request_id);
        (Self { registry, request_id, armed: true }, token)
    }

    /// Marks the request as finished normally, so dropping this guard afterwards
    /// neither fires the token nor leaves a stale registry entry.
    pub fn disarm(mut self) {
        self.armed = false;
        self.registry.remove(&self.request_id);
    }
}

impl Drop for CancellationGuard {
    fn drop(&mut self) {
        if self.armed {
            self.registry.fire(&self.request_id);
        }
        self.registry.remove(&self.request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fire_cancels_registered_token() {
        let registry = CancellationRegistry::new();
        let token = registry.insert("req-1");
        assert!(!token.is_cancelled());
        assert!(registry.fire("req-1"));
        assert!(token.is_cancelled());
    }

    #[test]
    fn fire_on_unknown_id_returns_false() {
        let registry = CancellationRegistry::new();
        assert!(!registry.fire("missing"));
    }

    #[test]
    fn remove_drops_entry() {
        let registry = CancellationRegistry::new();
        registry.insert("req-1");
        registry.remove("req-1");
        assert!(!registry.fire("req-1"));
    }

    #[test]
    fn guard_fires_token_on_drop_when_not_disarmed() {
        let registry = Arc::new(CancellationRegistry::new());
        let (guard, token) = CancellationGuard::new(registry.clone(), "req-1");
        assert!(!token.is_cancelled());
        drop(guard);
        assert!(token.is_cancelled());
    }

    #[test]
    fn guard_does_not_fire_token_after_disarm() {
        let registry = Arc::new(CancellationRegistry::new());
        let (guard, token) = CancellationGuard::new(registry.clone(), "req-1");
        guard.disarm();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn guard_removes_registry_entry_on_drop() {
        let registry = Arc::new(CancellationRegistry::new());
        let (guard, _token) = CancellationGuard::new(registry.clone(), "req-1");
        drop(guard);
        assert!(!registry.fire("req-1"));
    }
}
