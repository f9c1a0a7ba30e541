//! The root object binding a mirror root path to a hook registry.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::hooks::{Event, HookRegistry};

use super::dir::DirNode;

/// A mirror of a real directory tree.
///
/// Constructed once at startup and alive for the process. The root path is
/// stored at construction and never mutated; hooks are registered through
/// the builder before serving begins (late registration also works — the
/// registry takes a coarse lock for it). Every node reachable from this
/// instance shares the same registry.
pub struct MirrorFs {
    root: PathBuf,
    hooks: Arc<HookRegistry>,
}

impl MirrorFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            hooks: Arc::new(HookRegistry::new()),
        }
    }

    /// Replace the default registry, e.g. to set a dispatch timeout.
    ///
    /// Discards any hooks registered so far, so call this before
    /// [`with_hook`](Self::with_hook).
    #[must_use]
    pub fn with_registry(mut self, hooks: HookRegistry) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Register a subscriber for `event`
    /// ([`WILDCARD`](crate::hooks::WILDCARD) for every event).
    #[must_use]
    pub fn with_hook<F, Fut>(self, event: &str, hook: F) -> Self
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.register(event, hook);
        self
    }

    /// The real directory this mirror reflects.
    pub fn root_path(&self) -> &Path {
        &self.root
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    /// A fresh directory node for the mirror root.
    pub fn root(&self) -> DirNode {
        DirNode::new(self.root.clone(), Arc::clone(&self.hooks))
    }
}
