//! Session registry
//!
//! Maps each [`SessionKey`] to the stop handle of its live session. All
//! mutations run under one mutex so a key can never hold two live sessions
//! and a superseded session is always signalled before it is dropped from
//! the map. The lock is never held across an `.await`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use pt_core::SessionKey;

use crate::stop::StopHandle;

/// Registry of live forwarding sessions
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionKey, StopHandle>>,
    /// Number of entries, published after every mutation
    active: watch::Sender<usize>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            active: watch::Sender::new(0),
        }
    }

    // Entries are only ever inserted or removed whole, so a poisoned map is
    // still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<SessionKey, StopHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, sessions: &HashMap<SessionKey, StopHandle>) {
        self.active.send_replace(sessions.len());
    }

    /// Register `stop` as the live session for `key`.
    ///
    /// A session already registered under `key` is signalled and replaced.
    /// A handle that is already stopped (its tunnel ended before it could be
    /// registered) evicts the previous session but is not stored. Returns
    /// whether a previous session was replaced.
    pub fn register(&self, key: SessionKey, stop: StopHandle) -> bool {
        let mut sessions = self.lock();

        let replaced = match sessions.remove(&key) {
            Some(previous) => {
                if previous.signal() {
                    tracing::info!("Replacing session {}", key);
                }
                true
            }
            None => false,
        };

        if stop.is_stopped() {
            tracing::debug!("Session {} stopped before registration", key);
        } else {
            sessions.insert(key, stop);
        }

        self.publish(&sessions);
        replaced
    }

    /// Stop the session registered under `key`.
    ///
    /// Returns `false` when no session is registered, which is not an error.
    pub fn stop(&self, key: &SessionKey) -> bool {
        let mut sessions = self.lock();

        let Some(stop) = sessions.remove(key) else {
            return false;
        };
        stop.signal();
        tracing::info!("Stopped session {}", key);

        self.publish(&sessions);
        true
    }

    /// Stop the session under `key` only if it is still the one owning `stop`.
    ///
    /// Used by a session tearing itself down, so it can never evict the
    /// session that replaced it.
    pub fn stop_if_current(&self, key: &SessionKey, stop: &StopHandle) -> bool {
        let mut sessions = self.lock();

        match sessions.get(key) {
            Some(current) if current.same_as(stop) => {}
            _ => return false,
        }
        if let Some(current) = sessions.remove(key) {
            current.signal();
        }

        self.publish(&sessions);
        true
    }

    /// Stop every registered session, returning their keys
    pub fn stop_all(&self) -> Vec<SessionKey> {
        let mut sessions = self.lock();

        let keys: Vec<SessionKey> = sessions
            .drain()
            .map(|(key, stop)| {
                stop.signal();
                key
            })
            .collect();

        self.publish(&sessions);
        keys
    }

    /// Whether a live session is registered under `key`
    pub fn contains(&self, key: &SessionKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Keys of all live sessions
    pub fn keys(&self) -> Vec<SessionKey> {
        self.lock().keys().cloned().collect()
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves once no session is registered
    pub async fn wait_idle(&self) {
        let mut active = self.active.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = active.wait_for(|count| *count == 0).await;
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn key(target: &str) -> SessionKey {
        SessionKey::new("test", target)
    }

    #[test]
    fn test_register_new_key() {
        let registry = SessionRegistry::new();
        let stop = StopHandle::new();

        assert!(!registry.register(key("web"), stop.clone()));
        assert!(registry.contains(&key("web")));
        assert_eq!(registry.len(), 1);
        assert!(!stop.is_stopped());
    }

    #[test]
    fn test_replace_tears_down_prior() {
        let registry = SessionRegistry::new();
        let first = StopHandle::new();
        let second = StopHandle::new();

        registry.register(key("web"), first.clone());
        assert!(registry.register(key("web"), second.clone()));

        assert!(first.is_stopped());
        assert!(!second.is_stopped());
        assert_eq!(registry.len(), 1);

        // the survivor is the second handle
        assert!(registry.stop(&key("web")));
        assert!(second.is_stopped());
    }

    #[test]
    fn test_sequential_registers_keep_one_handle() {
        let registry = SessionRegistry::new();
        let handles: Vec<StopHandle> = (0..10).map(|_| StopHandle::new()).collect();

        for handle in &handles {
            registry.register(key("web"), handle.clone());
        }

        assert_eq!(registry.len(), 1);
        let (last, earlier) = handles.split_last().unwrap();
        assert!(!last.is_stopped());
        for handle in earlier {
            assert!(handle.is_stopped());
            // already fired by the registry, so this second signal is a no-op
            assert!(!handle.signal());
        }
    }

    #[test]
    fn test_stop_absent_key_is_noop() {
        let registry = SessionRegistry::new();
        assert!(!registry.stop(&key("ghost")));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_double_stop_signals_once() {
        let registry = SessionRegistry::new();
        let stop = StopHandle::new();
        registry.register(key("web"), stop.clone());

        assert!(registry.stop(&key("web")));
        assert!(!registry.stop(&key("web")));
        assert!(stop.is_stopped());
        assert!(!stop.signal());
    }

    #[test]
    fn test_keys_are_independent() {
        let registry = SessionRegistry::new();
        let web = StopHandle::new();
        let db = StopHandle::new();
        registry.register(key("web"), web.clone());
        registry.register(SessionKey::new("other", "web"), db.clone());

        assert_eq!(registry.len(), 2);
        registry.stop(&key("web"));
        assert!(web.is_stopped());
        assert!(!db.is_stopped());
    }

    #[test]
    fn test_already_stopped_handle_is_not_stored() {
        let registry = SessionRegistry::new();
        let live = StopHandle::new();
        let dead = StopHandle::new();
        dead.signal();

        registry.register(key("web"), live.clone());
        assert!(registry.register(key("web"), dead));
        assert!(live.is_stopped());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stop_if_current_ignores_successor() {
        let registry = SessionRegistry::new();
        let first = StopHandle::new();
        let second = StopHandle::new();
        registry.register(key("web"), first.clone());
        registry.register(key("web"), second.clone());

        assert!(!registry.stop_if_current(&key("web"), &first));
        assert!(registry.contains(&key("web")));
        assert!(!second.is_stopped());

        assert!(registry.stop_if_current(&key("web"), &second));
        assert!(second.is_stopped());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stop_all() {
        let registry = SessionRegistry::new();
        let handles: Vec<StopHandle> = (0..3).map(|_| StopHandle::new()).collect();
        for (i, handle) in handles.iter().enumerate() {
            registry.register(key(&format!("svc-{}", i)), handle.clone());
        }

        let mut stopped = registry.stop_all();
        stopped.sort_by(|a, b| a.target.cmp(&b.target));
        assert_eq!(stopped.len(), 3);
        assert_eq!(stopped[0], key("svc-0"));
        assert!(handles.iter().all(StopHandle::is_stopped));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_wait_idle() {
        let registry = Arc::new(SessionRegistry::new());
        registry.register(key("web"), StopHandle::new());

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.wait_idle().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        registry.stop(&key("web"));
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("registry never became idle")
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_idle_on_empty_registry() {
        let registry = SessionRegistry::new();
        tokio::time::timeout(Duration::from_secs(1), registry.wait_idle())
            .await
            .unwrap();
    }
}
