use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::event::Event;

/// The reserved event name that subscribes a callback to every event.
pub const WILDCARD: &str = "*";

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A subscriber callback. Receives the event and returns a future that the
/// dispatcher drives to completion before the triggering operation returns.
pub type HookFn = Arc<dyn Fn(Arc<Event>) -> HookFuture + Send + Sync>;

/// Ordered lists of subscribers per event name, plus wildcard subscribers.
///
/// Registration is append-only behind a coarse lock, so hooks may still be
/// added while the filesystem is serving. Dispatch launches every matching
/// subscriber concurrently (all started before any is awaited) and waits for
/// all of them before returning, so `<op>:end` subscribers have completed by
/// the time the operation's outcome is observable. Subscribers have no
/// defined ordering among themselves.
pub struct HookRegistry {
    hooks: RwLock<HashMap<String, Vec<HookFn>>>,
    /// Bound on the dispatch join wait. `None` waits indefinitely.
    timeout: Option<Duration>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            hooks: RwLock::new(HashMap::new()),
            timeout: None,
        }
    }

    /// Cap how long `dispatch` waits for subscribers. On expiry the
    /// triggering operation proceeds and stragglers keep running detached.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Append a subscriber for `event`. [`WILDCARD`] subscribes to every
    /// event. No de-duplication is performed.
    pub fn register<F, Fut>(&self, event: &str, hook: F)
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: HookFn = Arc::new(move |ev| Box::pin(hook(ev)));
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.to_owned())
            .or_default()
            .push(hook);
    }

    fn subscribers_for(&self, name: &str) -> Vec<HookFn> {
        let hooks = self.hooks.read().unwrap_or_else(PoisonError::into_inner);
        let mut subs: Vec<HookFn> = hooks.get(name).cloned().unwrap_or_default();
        if name != WILDCARD {
            if let Some(global) = hooks.get(WILDCARD) {
                subs.extend(global.iter().cloned());
            }
        }
        subs
    }

    /// Fan `event` out to every matching subscriber and wait for all of them
    /// to finish. A panic inside one subscriber is logged and does not
    /// disturb the others or the operation being observed. With no
    /// subscribers this returns immediately.
    pub async fn dispatch(&self, event: Event) {
        let name = event.name();
        let subs = self.subscribers_for(&name);
        if subs.is_empty() {
            return;
        }

        debug!(event = %name, subscribers = subs.len(), "dispatching");

        let event = Arc::new(event);
        let mut set = JoinSet::new();
        for hook in subs {
            set.spawn(hook(Arc::clone(&event)));
        }

        match self.timeout {
            None => Self::join_all(&name, &mut set).await,
            Some(limit) => {
                if tokio::time::timeout(limit, Self::join_all(&name, &mut set))
                    .await
                    .is_err()
                {
                    warn!(
                        event = %name,
                        limit_ms = limit.as_millis() as u64,
                        "hook dispatch timed out; detaching stragglers"
                    );
                    set.detach_all();
                }
            }
        }
    }

    async fn join_all(name: &str, set: &mut JoinSet<()>) {
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                warn!(event = %name, error = %e, "hook subscriber failed");
            }
        }
    }
}
