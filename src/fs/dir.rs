//! The directory node: protocol operations for a mirrored directory.
//!
//! Every operation dispatches a `<name>:start` event, performs the real
//! syscall(s), dispatches `<name>:end` with the observed outcome, and only
//! then returns to the caller.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::hooks::{Event, EventData, HookRegistry};

use super::attr::{DirEntry, NodeAttr, NodeKind};
use super::file::FileNode;
use super::{AttrError, Node, SetattrError, SetattrRequest};

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no such entry")]
    NotFound,

    /// The freshly constructed node's attribute query failed. Propagated
    /// as-is rather than normalized.
    #[error(transparent)]
    Attr(#[from] AttrError),
}

impl From<LookupError> for i32 {
    fn from(e: LookupError) -> Self {
        match e {
            LookupError::NotFound => libc::ENOENT,
            LookupError::Attr(attr_err) => attr_err.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReadDirError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ReadDirError> for i32 {
    fn from(e: ReadDirError) -> Self {
        match e {
            ReadDirError::Io(ref io_err) => io_err.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

#[derive(Debug, Error)]
pub enum CreateError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CreateError> for i32 {
    fn from(e: CreateError) -> Self {
        match e {
            CreateError::Io(ref io_err) => io_err.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

#[derive(Debug, Error)]
pub enum RemoveError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RemoveError> for i32 {
    fn from(e: RemoveError) -> Self {
        match e {
            RemoveError::Io(ref io_err) => io_err.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

#[derive(Debug, Error)]
pub enum MkdirError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MkdirError> for i32 {
    fn from(e: MkdirError) -> Self {
        match e {
            MkdirError::Io(ref io_err) => io_err.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

#[derive(Debug, Error)]
pub enum RenameError {
    #[error("rename target is not a directory node")]
    NotADirectory,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RenameError> for i32 {
    fn from(e: RenameError) -> Self {
        match e {
            RenameError::NotADirectory => libc::ENOTDIR,
            RenameError::Io(ref io_err) => io_err.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

/// A directory node bound to a real path.
///
/// Fresh instances are constructed on every lookup; two lookups of the same
/// path yield two distinct nodes wrapping the same path. Holds no state
/// beyond the path and the shared hook registry.
#[derive(Clone)]
pub struct DirNode {
    path: PathBuf,
    hooks: Arc<HookRegistry>,
}

impl fmt::Debug for DirNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirNode").field("path", &self.path).finish()
    }
}

impl DirNode {
    pub(crate) fn new(path: PathBuf, hooks: Arc<HookRegistry>) -> Self {
        Self { path, hooks }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stat the directory itself. Any stat failure is reported as NotFound.
    pub async fn attr(&self) -> Result<NodeAttr, AttrError> {
        self.hooks
            .dispatch(Event::start(EventData::DirAttr {
                path: self.path.clone(),
            }))
            .await;

        let result = tokio::fs::metadata(&self.path)
            .await
            .map(NodeAttr::from)
            .map_err(|_| AttrError::NotFound);

        self.hooks
            .dispatch(Event::end_of(
                EventData::DirAttr {
                    path: self.path.clone(),
                },
                &result,
            ))
            .await;
        result
    }

    /// Resolve a child by name.
    ///
    /// A directory child becomes a [`DirNode`], anything else a
    /// [`FileNode`]. The new node's attributes are queried immediately and
    /// returned alongside it so callers can populate their reply without
    /// re-statting.
    pub async fn lookup(&self, name: &OsStr) -> Result<(Node, NodeAttr), LookupError> {
        self.hooks
            .dispatch(Event::start(EventData::Lookup {
                path: self.path.clone(),
                name: name.to_owned(),
            }))
            .await;

        let result = self.lookup_inner(name).await;

        self.hooks
            .dispatch(Event::end_of(
                EventData::Lookup {
                    path: self.path.clone(),
                    name: name.to_owned(),
                },
                &result,
            ))
            .await;
        result
    }

    async fn lookup_inner(&self, name: &OsStr) -> Result<(Node, NodeAttr), LookupError> {
        let full_path = self.path.join(name);
        let meta = tokio::fs::metadata(&full_path)
            .await
            .map_err(|_| LookupError::NotFound)?;

        let node = if meta.is_dir() {
            Node::Dir(Self::new(full_path, Arc::clone(&self.hooks)))
        } else {
            Node::File(FileNode::new(full_path, Arc::clone(&self.hooks)))
        };

        let node_attr = node.attr().await?;
        Ok((node, node_attr))
    }

    /// List every child of the directory.
    ///
    /// One entry per real child, tagged directory or file; a metadata
    /// failure on any entry fails the whole listing. Entries are sorted
    /// lexicographically by name for a stable order.
    pub async fn read_dir_all(&self) -> Result<Vec<DirEntry>, ReadDirError> {
        self.hooks
            .dispatch(Event::start(EventData::ReadDirAll {
                path: self.path.clone(),
                entries: None,
            }))
            .await;

        let result = self.read_dir_all_inner().await;

        self.hooks
            .dispatch(Event::end_of(
                EventData::ReadDirAll {
                    path: self.path.clone(),
                    entries: result.as_ref().ok().map(Vec::len),
                },
                &result,
            ))
            .await;
        result
    }

    async fn read_dir_all_inner(&self) -> Result<Vec<DirEntry>, ReadDirError> {
        let mut read_dir = tokio::fs::read_dir(&self.path).await?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            let kind = if file_type.is_dir() {
                NodeKind::Directory
            } else {
                NodeKind::File
            };
            entries.push(DirEntry {
                ino: entry.ino(),
                name: entry.file_name(),
                kind,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Apply requested attribute changes to the real directory.
    ///
    /// Only the permission mode is honored for directories; a requested size
    /// is meaningless here and ignored. Returns the re-statted attributes.
    pub async fn setattr(&self, req: SetattrRequest) -> Result<NodeAttr, SetattrError> {
        self.hooks
            .dispatch(Event::start(EventData::Setattr {
                path: self.path.clone(),
                mode: req.mode,
                size: None,
            }))
            .await;

        let result = self.setattr_inner(req).await;

        self.hooks
            .dispatch(Event::end_of(
                EventData::Setattr {
                    path: self.path.clone(),
                    mode: req.mode,
                    size: None,
                },
                &result,
            ))
            .await;
        result
    }

    async fn setattr_inner(&self, req: SetattrRequest) -> Result<NodeAttr, SetattrError> {
        if let Some(mode) = req.mode {
            use std::os::unix::fs::PermissionsExt as _;
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(mode)).await?;
        }
        Ok(tokio::fs::metadata(&self.path).await.map(NodeAttr::from)?)
    }

    /// Create (and immediately close) a file under this directory, returning
    /// a node for it.
    ///
    /// No open descriptor survives the call; the node itself serves as the
    /// handle, and subsequent writes re-open the file per call.
    pub async fn create(
        &self,
        name: &OsStr,
        flags: i32,
        mode: u32,
    ) -> Result<FileNode, CreateError> {
        self.hooks
            .dispatch(Event::start(EventData::Create {
                path: self.path.clone(),
                name: name.to_owned(),
                mode,
            }))
            .await;

        let result = self.create_inner(name, flags, mode).await;

        self.hooks
            .dispatch(Event::end_of(
                EventData::Create {
                    path: self.path.clone(),
                    name: name.to_owned(),
                    mode,
                },
                &result,
            ))
            .await;
        result
    }

    async fn create_inner(
        &self,
        name: &OsStr,
        flags: i32,
        mode: u32,
    ) -> Result<FileNode, CreateError> {
        let full_path = self.path.join(name);

        // Access mode and creation bits are expressed through the builder;
        // the rest of the request flags pass through untouched.
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(flags & libc::O_TRUNC != 0)
            .custom_flags(flags & !(libc::O_CREAT | libc::O_TRUNC | libc::O_ACCMODE))
            .mode(mode)
            .open(&full_path)
            .await?;
        drop(file);

        Ok(FileNode::new(full_path, Arc::clone(&self.hooks)))
    }

    /// Remove the named child: files are unlinked, subdirectories removed.
    ///
    /// The child name is always joined onto this directory's own path, so
    /// removal is correct under nested directories regardless of the
    /// process's working directory.
    pub async fn remove(&self, name: &OsStr) -> Result<(), RemoveError> {
        self.hooks
            .dispatch(Event::start(EventData::Remove {
                path: self.path.clone(),
                name: name.to_owned(),
            }))
            .await;

        let result = self.remove_inner(name).await;

        self.hooks
            .dispatch(Event::end_of(
                EventData::Remove {
                    path: self.path.clone(),
                    name: name.to_owned(),
                },
                &result,
            ))
            .await;
        result
    }

    async fn remove_inner(&self, name: &OsStr) -> Result<(), RemoveError> {
        let full_path = self.path.join(name);
        let meta = tokio::fs::symlink_metadata(&full_path).await?;
        if meta.is_dir() {
            tokio::fs::remove_dir(&full_path).await?;
        } else {
            tokio::fs::remove_file(&full_path).await?;
        }
        Ok(())
    }

    /// Create a subdirectory with the given permission mode and return a
    /// node for it.
    pub async fn mkdir(&self, name: &OsStr, mode: u32) -> Result<Self, MkdirError> {
        self.hooks
            .dispatch(Event::start(EventData::Mkdir {
                path: self.path.clone(),
                name: name.to_owned(),
                mode,
            }))
            .await;

        let result = self.mkdir_inner(name, mode).await;

        self.hooks
            .dispatch(Event::end_of(
                EventData::Mkdir {
                    path: self.path.clone(),
                    name: name.to_owned(),
                    mode,
                },
                &result,
            ))
            .await;
        result
    }

    async fn mkdir_inner(&self, name: &OsStr, mode: u32) -> Result<Self, MkdirError> {
        let full_path = self.path.join(name);
        let mut builder = tokio::fs::DirBuilder::new();
        builder.mode(mode);
        builder.create(&full_path).await?;
        Ok(Self::new(full_path, Arc::clone(&self.hooks)))
    }

    /// Move `old_name` from this directory into `target` as `new_name`.
    ///
    /// The destination must itself be a directory node; overwrite semantics
    /// for an existing target are whatever the platform rename provides.
    pub async fn rename(
        &self,
        old_name: &OsStr,
        target: &Node,
        new_name: &OsStr,
    ) -> Result<(), RenameError> {
        self.hooks
            .dispatch(Event::start(EventData::Rename {
                path: self.path.clone(),
                old_name: old_name.to_owned(),
                new_dir: target.path().to_path_buf(),
                new_name: new_name.to_owned(),
            }))
            .await;

        let result = self.rename_inner(old_name, target, new_name).await;

        self.hooks
            .dispatch(Event::end_of(
                EventData::Rename {
                    path: self.path.clone(),
                    old_name: old_name.to_owned(),
                    new_dir: target.path().to_path_buf(),
                    new_name: new_name.to_owned(),
                },
                &result,
            ))
            .await;
        result
    }

    async fn rename_inner(
        &self,
        old_name: &OsStr,
        target: &Node,
        new_name: &OsStr,
    ) -> Result<(), RenameError> {
        let Node::Dir(target_dir) = target else {
            return Err(RenameError::NotADirectory);
        };

        let old_path = self.path.join(old_name);
        let new_path = target_dir.path.join(new_name);
        tokio::fs::rename(&old_path, &new_path).await?;
        Ok(())
    }
}
