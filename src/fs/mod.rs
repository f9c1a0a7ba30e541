//! The node layer: path-bound directory and file nodes that delegate every
//! operation to the real filesystem, plus the adapter that serves them over
//! FUSE.
//!
//! Nodes are never cached or interned. A fresh node is constructed on every
//! lookup and identity is purely path-based; all state is rediscovered from
//! the real filesystem on every call, trading redundant syscalls for freedom
//! from staleness.

mod attr;
pub mod dir;
pub mod file;
pub mod fuser;
mod mirror;

use std::path::Path;

use thiserror::Error;

pub use attr::{DirEntry, NodeAttr, NodeKind};
pub use dir::DirNode;
pub use file::FileNode;
pub use mirror::MirrorFs;

/// Any stat failure collapses to this, per the mirror's error taxonomy:
/// callers cannot distinguish a missing entry from, say, a permission error.
#[derive(Debug, Error)]
pub enum AttrError {
    #[error("no such entry")]
    NotFound,
}

impl From<AttrError> for i32 {
    fn from(e: AttrError) -> Self {
        match e {
            AttrError::NotFound => libc::ENOENT,
        }
    }
}

#[derive(Debug, Error)]
pub enum SetattrError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SetattrError> for i32 {
    fn from(e: SetattrError) -> Self {
        match e {
            SetattrError::Io(ref io_err) => io_err.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

/// Requested attribute changes for [`DirNode::setattr`] / [`FileNode::setattr`].
///
/// Only mode and size are honored; other fields of the kernel request are
/// ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetattrRequest {
    pub mode: Option<u32>,
    pub size: Option<u64>,
}

/// Either kind of node, as returned from a lookup.
#[derive(Debug, Clone)]
pub enum Node {
    Dir(DirNode),
    File(FileNode),
}

impl Node {
    /// Stat the node's path, whatever its kind.
    pub async fn attr(&self) -> Result<NodeAttr, AttrError> {
        match self {
            Self::Dir(dir) => dir.attr().await,
            Self::File(file) => file.attr().await,
        }
    }

    /// Apply requested attribute changes to the real entry.
    pub async fn setattr(&self, req: SetattrRequest) -> Result<NodeAttr, SetattrError> {
        match self {
            Self::Dir(dir) => dir.setattr(req).await,
            Self::File(file) => file.setattr(req).await,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Dir(dir) => dir.path(),
            Self::File(file) => file.path(),
        }
    }
}
