//! The hook mechanism: every node operation announces itself here before and
//! after touching the real filesystem, and registered subscribers observe the
//! announcements. Hooks are observers only; they never alter the outcome of
//! the operation they watch.

mod event;
mod registry;

pub use event::{Event, EventData, Phase};
pub use registry::{HookFn, HookRegistry, WILDCARD};
