#![allow(dead_code, missing_docs, clippy::unwrap_used)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use mirror_fs::hooks::{Event, HookRegistry};

/// Records the name of every event it sees, for asserting dispatch behavior.
#[derive(Clone, Default)]
pub struct RecordingHook {
    seen: Arc<Mutex<Vec<String>>>,
}

impl RecordingHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register this recorder on `registry` under `event`.
    pub fn attach(&self, registry: &HookRegistry, event: &str) {
        let seen = Arc::clone(&self.seen);
        registry.register(event, move |ev: Arc<Event>| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().unwrap().push(ev.name());
            }
        });
    }

    /// Every recorded event name, in arrival order.
    pub fn names(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn count_of(&self, name: &str) -> usize {
        self.names().iter().filter(|n| n.as_str() == name).count()
    }
}

pub fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

pub fn make_dir(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::create_dir(&path).unwrap();
    path
}
