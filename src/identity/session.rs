//! Session bootstrap: turns the provider's auth-state stream into the published
//! application session.
//!
//! For every auth-state change the listener either publishes a signed-out
//! session, or marks the session as loading, resolves the identity's role and
//! publishes the identity merged with that role. A failed role lookup never
//! blocks the session: it is logged and the default role is used instead.
//!
//! Consumers observe the session through `SessionHandle::subscribe`, which hands
//! out read-only `watch` receivers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::principal::{Identity, Role, SessionUser};
use super::profile::ProfileResolver;
use super::provider::AuthProvider;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub user: Option<SessionUser>,
    pub loading: bool,
}

impl SessionState {
    /// State before the first auth event has been processed.
    pub fn initial() -> Self { Self { user: None, loading: true } }

    pub fn signed_out() -> Self { Self { user: None, loading: false } }

    pub fn signed_in(user: SessionUser) -> Self { Self { user: Some(user), loading: false } }

    pub fn role(&self) -> Option<&Role> { self.user.as_ref().map(|u| &u.role) }
}

pub struct SessionBootstrap;

impl SessionBootstrap {
    /// Subscribe to `provider` and start publishing sessions. Must be called from
    /// within a tokio runtime.
    pub fn mount(provider: &dyn AuthProvider, resolver: Arc<dyn ProfileResolver>) -> SessionHandle {
        let auth_rx = provider.subscribe();
        let (tx, rx) = watch::channel(SessionState::initial());
        let task = tokio::spawn(listen(auth_rx, resolver, tx));
        SessionHandle { rx, task }
    }
}

/// Owner of the running listener. Dropping it (or calling `teardown`) stops the
/// listener; receivers keep the last published state.
pub struct SessionHandle {
    rx: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn subscribe(&self) -> watch::Receiver<SessionState> { self.rx.clone() }

    pub fn current(&self) -> SessionState { self.rx.borrow().clone() }

    /// Wait until the latest auth event has been fully resolved.
    pub async fn settled(&self) -> SessionState {
        let mut rx = self.rx.clone();
        if let Ok(s) = rx.wait_for(|s| !s.loading).await {
            return s.clone();
        }
        // Listener gone; the last value is all there will ever be
        let last = rx.borrow().clone();
        last
    }

    /// Wait until the session reflects `uid` (or signed out for `None`) and is
    /// no longer loading. Used right after a sign-in/sign-out call, before the
    /// listener has necessarily seen the event.
    pub async fn settled_for(&self, uid: Option<&str>) -> SessionState {
        let mut rx = self.rx.clone();
        let reached = |s: &SessionState| !s.loading && s.user.as_ref().map(|u| u.uid.as_str()) == uid;
        if let Ok(s) = rx.wait_for(reached).await {
            return s.clone();
        }
        let last = rx.borrow().clone();
        last
    }

    pub fn teardown(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool { !self.task.is_finished() }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn listen(
    mut auth_rx: watch::Receiver<Option<Identity>>,
    resolver: Arc<dyn ProfileResolver>,
    tx: watch::Sender<SessionState>,
) {
    loop {
        let identity = auth_rx.borrow_and_update().clone();
        match identity {
            None => {
                debug!(target: "crmhub::session", "auth state: signed out");
                tx.send_replace(SessionState::signed_out());
            }
            Some(identity) => {
                tx.send_modify(|s| s.loading = true);
                let role = resolve_or_default(resolver.as_ref(), &identity).await;
                // A newer auth event arrived while resolving; it supersedes this one.
                if matches!(auth_rx.has_changed(), Ok(true)) {
                    debug!(target: "crmhub::session", uid = %identity.uid, "dropping stale session resolution");
                } else {
                    debug!(target: "crmhub::session", uid = %identity.uid, role = %role.name, "auth state: signed in");
                    tx.send_replace(SessionState::signed_in(SessionUser::new(identity, role)));
                }
            }
        }
        if auth_rx.changed().await.is_err() {
            debug!(target: "crmhub::session", "auth provider closed; listener exiting");
            break;
        }
    }
}

async fn resolve_or_default(resolver: &dyn ProfileResolver, identity: &Identity) -> Role {
    match resolver.resolve_role(identity).await {
        Ok(role) => role,
        Err(e) => {
            warn!(target: "crmhub::session", uid = %identity.uid, error = %e, "profile fetch failed; using default role");
            Role::default_role()
        }
    }
}
