//! mirror-fs shared library.

/// Path-bound filesystem nodes and the FUSE adapter that serves them.
pub mod fs;
/// Named-event hooks: registration, typed payloads, concurrent dispatch.
pub mod hooks;
