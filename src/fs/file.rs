//! The file node: attribute query, whole-file read, offset write.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncSeekExt as _, AsyncWriteExt as _};

use crate::hooks::{Event, EventData, HookRegistry};

use super::attr::NodeAttr;
use super::{AttrError, SetattrError, SetattrRequest};

#[derive(Debug, Error)]
pub enum ReadAllError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ReadAllError> for i32 {
    fn from(e: ReadAllError) -> Self {
        match e {
            ReadAllError::Io(ref io_err) => io_err.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<WriteError> for i32 {
    fn from(e: WriteError) -> Self {
        match e {
            WriteError::Io(ref io_err) => io_err.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

/// A file node bound to a real path.
///
/// Like [`DirNode`](super::DirNode), instances are fresh per lookup and hold
/// no state beyond the path; there is no retained open descriptor, and every
/// operation re-stats or re-opens the real file.
#[derive(Clone)]
pub struct FileNode {
    path: PathBuf,
    hooks: Arc<HookRegistry>,
}

impl fmt::Debug for FileNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileNode")
            .field("path", &self.path)
            .finish()
    }
}

impl FileNode {
    pub(crate) fn new(path: PathBuf, hooks: Arc<HookRegistry>) -> Self {
        Self { path, hooks }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stat the file. Any stat failure is reported as NotFound.
    pub async fn attr(&self) -> Result<NodeAttr, AttrError> {
        self.hooks
            .dispatch(Event::start(EventData::FileAttr {
                path: self.path.clone(),
            }))
            .await;

        let result = tokio::fs::metadata(&self.path)
            .await
            .map(NodeAttr::from)
            .map_err(|_| AttrError::NotFound);

        self.hooks
            .dispatch(Event::end_of(
                EventData::FileAttr {
                    path: self.path.clone(),
                },
                &result,
            ))
            .await;
        result
    }

    /// Read the entire file content into memory in one operation.
    ///
    /// Whole-file semantics only; a large file fully materializes. Data
    /// streaming is an explicit non-goal.
    pub async fn read_all(&self) -> Result<Bytes, ReadAllError> {
        self.hooks
            .dispatch(Event::start(EventData::ReadAll {
                path: self.path.clone(),
                bytes: None,
            }))
            .await;

        let result = tokio::fs::read(&self.path)
            .await
            .map(Bytes::from)
            .map_err(ReadAllError::Io);

        self.hooks
            .dispatch(Event::end_of(
                EventData::ReadAll {
                    path: self.path.clone(),
                    bytes: result.as_ref().ok().map(Bytes::len),
                },
                &result,
            ))
            .await;
        result
    }

    /// Write `data` at byte `offset`, preserving the file's current
    /// permission mode.
    ///
    /// Each call is an independent open/seek/write/close cycle; no handle is
    /// retained across calls. Returns the number of bytes written; the end
    /// event additionally carries the resulting absolute end offset
    /// (`offset + written`).
    pub async fn write(&self, offset: u64, data: Bytes, flags: i32) -> Result<u64, WriteError> {
        self.hooks
            .dispatch(Event::start(EventData::Write {
                path: self.path.clone(),
                offset,
                len: data.len(),
                end_offset: None,
            }))
            .await;

        let result = self.write_inner(offset, &data, flags).await;

        self.hooks
            .dispatch(Event::end_of(
                EventData::Write {
                    path: self.path.clone(),
                    offset,
                    len: data.len(),
                    end_offset: result.as_ref().ok().map(|written| offset + written),
                },
                &result,
            ))
            .await;
        result
    }

    async fn write_inner(&self, offset: u64, data: &[u8], flags: i32) -> Result<u64, WriteError> {
        use std::os::unix::fs::MetadataExt as _;

        let meta = tokio::fs::metadata(&self.path).await?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .custom_flags(flags & !libc::O_ACCMODE)
            .mode(meta.mode())
            .open(&self.path)
            .await?;

        file.seek(std::io::SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;

        Ok(data.len() as u64)
    }

    /// Apply requested mode and size changes to the real file, then return
    /// the re-statted attributes.
    pub async fn setattr(&self, req: SetattrRequest) -> Result<NodeAttr, SetattrError> {
        self.hooks
            .dispatch(Event::start(EventData::Setattr {
                path: self.path.clone(),
                mode: req.mode,
                size: req.size,
            }))
            .await;

        let result = self.setattr_inner(req).await;

        self.hooks
            .dispatch(Event::end_of(
                EventData::Setattr {
                    path: self.path.clone(),
                    mode: req.mode,
                    size: req.size,
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

        if let Some(size) = req.size {
            let file = tokio::fs::OpenOptions::new()
                .write(true)
                .open(&self.path)
                .await?;
            file.set_len(size).await?;
        }

        Ok(tokio::fs::metadata(&self.path).await.map(NodeAttr::from)?)
    }
}
