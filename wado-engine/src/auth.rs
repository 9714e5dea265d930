//! The authentication contract the transport signs requests with.
//!
//! The engine does not perform the OAuth2 authorization-code dance; it only
//! consumes a token-providing capability: get the current bearer token, and
//! force a refresh on the next `get_token` after a 401. Concurrent callers
//! must observe a single in-flight refresh rather than a thundering herd.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

/// A bearer token, refreshable on demand, shared across every in-flight
/// download.
#[async_trait]
pub trait AuthMethod: Send + Sync {
    /// Returns the current token, refreshing it first if a refresh was
    /// requested since the last call.
    async fn get_token(&self) -> Option<String>;

    /// Marks the current token as stale; the next `get_token` call refreshes
    /// it. Safe to call concurrently from multiple failed requests: only one
    /// refresh is actually performed.
    async fn reset_token(&self);
}

/// A refresh operation supplied by the host, typically backed by its OAuth2
/// token store.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self) -> Option<String>;
}

struct State {
    token: Option<String>,
    stale: bool,
}

/// The engine's default [`AuthMethod`]: wraps a host-supplied
/// [`TokenRefresher`] and coalesces concurrent refreshes behind a mutex, so
/// an expiry storm across many parallel jobs triggers exactly one refresh.
pub struct RefreshingAuthMethod<R> {
    refresher: R,
    state: Arc<Mutex<State>>,
}

impl<R: TokenRefresher> RefreshingAuthMethod<R> {
    pub fn new(refresher: R) -> Self {
        RefreshingAuthMethod {
            refresher,
            state: Arc::new(Mutex::new(State {
                token: None,
                stale: true,
            })),
        }
    }
}

#[async_trait]
impl<R: TokenRefresher> AuthMethod for RefreshingAuthMethod<R> {
    async fn get_token(&self) -> Option<String> {
        let mut state = self.state.lock().await;
        if state.stale || state.token.is_none() {
            state.token = self.refresher.refresh().await;
            state.stale = false;
        }
        state.token.clone()
    }

    async fn reset_token(&self) {
        let mut state = self.state.lock().await;
        state.stale = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRefresher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self) -> Option<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Some(format!("token-{n}"))
        }
    }

    #[tokio::test]
    async fn concurrent_resets_coalesce_to_one_refresh() {
        let auth = Arc::new(RefreshingAuthMethod::new(CountingRefresher {
            calls: AtomicUsize::new(0),
        }));

        let first = auth.get_token().await;
        assert_eq!(first.as_deref(), Some("token-1"));

        auth.reset_token().await;
        auth.reset_token().await;
        auth.reset_token().await;

        let second = auth.get_token().await;
        assert_eq!(second.as_deref(), Some("token-2"));
        assert_eq!(auth.refresher.calls.load(Ordering::SeqCst), 2);
    }
}
