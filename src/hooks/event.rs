use std::ffi::OsString;
use std::path::PathBuf;

/// Which side of an operation an event marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    End,
}

impl Phase {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
        }
    }
}

/// The typed event payload, one variant per observable operation.
///
/// Each variant carries the concrete request-side fields of its operation;
/// outcome-side fields (`entries`, `bytes`, `end_offset`) are `None` on start
/// events and filled in on end events where the operation succeeded.
#[derive(Debug, Clone)]
pub enum EventData {
    /// Directory attribute query.
    DirAttr { path: PathBuf },
    /// Child resolution within a directory.
    Lookup { path: PathBuf, name: OsString },
    /// Full directory listing. `entries` is the entry count on success.
    ReadDirAll {
        path: PathBuf,
        entries: Option<usize>,
    },
    /// Attribute mutation (mode and/or size).
    Setattr {
        path: PathBuf,
        mode: Option<u32>,
        size: Option<u64>,
    },
    /// File creation under a directory.
    Create {
        path: PathBuf,
        name: OsString,
        mode: u32,
    },
    /// Removal of a directory child.
    Remove { path: PathBuf, name: OsString },
    /// Subdirectory creation.
    Mkdir {
        path: PathBuf,
        name: OsString,
        mode: u32,
    },
    /// Move of a child into a destination directory.
    Rename {
        path: PathBuf,
        old_name: OsString,
        new_dir: PathBuf,
        new_name: OsString,
    },
    /// File attribute query.
    FileAttr { path: PathBuf },
    /// Whole-file read. `bytes` is the content length on success.
    ReadAll { path: PathBuf, bytes: Option<usize> },
    /// Offset write. `end_offset` is `offset + written` on success.
    Write {
        path: PathBuf,
        offset: u64,
        len: usize,
        end_offset: Option<u64>,
    },
}

impl EventData {
    /// The operation half of the event name.
    ///
    /// The spellings are load-bearing for subscribers registered against
    /// them: directory attribute queries are lowercase `attr`, file
    /// attribute queries are `Attr`.
    pub const fn op_name(&self) -> &'static str {
        match self {
            Self::DirAttr { .. } => "attr",
            Self::Lookup { .. } => "Lookup",
            Self::ReadDirAll { .. } => "ReadDirAll",
            Self::Setattr { .. } => "Setattr",
            Self::Create { .. } => "Create",
            Self::Remove { .. } => "Remove",
            Self::Mkdir { .. } => "Mkdir",
            Self::Rename { .. } => "Rename",
            Self::FileAttr { .. } => "Attr",
            Self::ReadAll { .. } => "ReadAll",
            Self::Write { .. } => "Write",
        }
    }
}

/// A dispatched event: operation payload, phase, and on the end phase the
/// outcome of the underlying syscall.
#[derive(Debug, Clone)]
pub struct Event {
    pub phase: Phase,
    pub data: EventData,
    /// Display form of the syscall error, if the operation failed.
    /// Always `None` on start events.
    pub error: Option<String>,
}

impl Event {
    pub fn start(data: EventData) -> Self {
        Self {
            phase: Phase::Start,
            data,
            error: None,
        }
    }

    /// An end event carrying the outcome of `result`.
    pub fn end_of<T, E: std::fmt::Display>(data: EventData, result: &Result<T, E>) -> Self {
        Self {
            phase: Phase::End,
            data,
            error: result.as_ref().err().map(ToString::to_string),
        }
    }

    /// The full registry key for this event, e.g. `Lookup:start`.
    pub fn name(&self) -> String {
        format!("{}:{}", self.data.op_name(), self.phase.as_str())
    }
}
