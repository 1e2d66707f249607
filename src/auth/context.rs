//! Explicit authentication context handed to the subscription manager.
//!
//! Replaces a process-wide session singleton: whoever owns the context drives
//! sign-in and sign-out, and subscribers observe the change through a watch channel.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub principal: Option<String>,
    pub loading: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            principal: None,
            loading: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthContext {
    state: Arc<watch::Sender<AuthState>>,
}

impl Default for AuthContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthContext {
    /// A context that has not resolved its principal yet.
    pub fn new() -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            state: Arc::new(state),
        }
    }

    /// A context already signed in, as used per request at the HTTP boundary.
    pub fn signed_in(principal: impl Into<String>) -> Self {
        let context = Self::new();
        context.sign_in(principal);
        context
    }

    pub fn sign_in(&self, principal: impl Into<String>) {
        let principal = principal.into();
        tracing::info!("Principal {} signed in", principal);
        self.state.send_replace(AuthState {
            principal: Some(principal),
            loading: false,
        });
    }

    pub fn sign_out(&self) {
        tracing::info!("Principal signed out");
        self.state.send_replace(AuthState {
            principal: None,
            loading: false,
        });
    }

    /// The current principal; `None` while loading or signed out.
    pub fn principal(&self) -> Option<String> {
        let state = self.state.borrow();
        if state.loading {
            return None;
        }
        state.principal.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loading_context_has_no_principal() {
        let context = AuthContext::new();
        assert!(context.is_loading());
        assert_eq!(context.principal(), None);
    }

    #[test]
    fn test_sign_in_and_out() {
        let context = AuthContext::new();
        context.sign_in("user-1");
        assert_eq!(context.principal().as_deref(), Some("user-1"));
        assert!(!context.is_loading());

        context.sign_out();
        assert_eq!(context.principal(), None);
        assert!(!context.is_loading());
    }

    #[tokio::test]
    async fn test_watchers_see_changes() {
        let context = AuthContext::signed_in("user-1");
        let mut rx = context.watch();

        context.sign_in("user-2");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().principal.as_deref(), Some("user-2"));
    }
}
