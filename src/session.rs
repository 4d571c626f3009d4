//! Authentication collaborator as seen by the stores.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Current authenticated-session status.
///
/// Stores consult it before every refresh and mutation. When it reports
/// unauthenticated, the call is deferred and [`request_authentication`] is
/// invoked so the application can open its sign-in flow; once that flow
/// completes the application calls `on_authenticated` on the store (or the
/// [`StoreProvider`](crate::StoreProvider)).
///
/// [`request_authentication`]: AuthSession::request_authentication
pub trait AuthSession: Send + Sync {
    fn is_authenticated(&self) -> bool;

    /// Start a sign-in flow. The default does nothing.
    fn request_authentication(&self) {}
}

/// In-process session flag.
#[derive(Debug, Default)]
pub struct SessionFlag {
    authenticated: AtomicBool,
    requests: AtomicUsize,
}

impl SessionFlag {
    /// An unauthenticated session.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authenticated() -> Self {
        SessionFlag {
            authenticated: AtomicBool::new(true),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    /// How many times a store asked for a sign-in flow.
    pub fn authentication_requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl AuthSession for SessionFlag {
    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    fn request_authentication(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}
