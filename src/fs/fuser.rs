//! Bridges the path-based node layer onto fuser's inode-based protocol.
//!
//! Every callback spawns its work onto the tokio runtime as an independent
//! task and replies from inside the task, so inbound requests for different
//! inodes (or the same inode) run concurrently. The adapter keeps the only
//! piece of serving state: a concurrent table from kernel-visible inode
//! numbers to the node last resolved for them.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use scc::hash_map::Entry;
use tracing::{debug, instrument, warn};

use super::{DirNode, FileNode, MirrorFs, Node, NodeAttr, NodeKind, SetattrRequest};

impl From<NodeAttr> for fuser::FileAttr {
    fn from(attr: NodeAttr) -> Self {
        let kind = match attr.kind {
            NodeKind::Directory => fuser::FileType::Directory,
            NodeKind::File => fuser::FileType::RegularFile,
        };
        Self {
            ino: attr.ino,
            size: attr.size,
            blocks: attr.blocks,
            atime: attr.atime,
            mtime: attr.mtime,
            ctime: attr.ctime,
            // Creation time is not available from unix metadata.
            crtime: UNIX_EPOCH,
            kind,
            perm: attr.perm,
            nlink: attr.nlink,
            uid: attr.uid,
            gid: attr.gid,
            rdev: 0,
            blksize: attr.blksize,
            flags: 0,
        }
    }
}

/// Inode-table entry: the node plus the kernel's lookup refcount.
struct NodeSlot {
    rc: u64,
    node: Node,
}

/// State shared by every in-flight request task.
struct AdapterState {
    /// Keyed by real inode numbers; `FUSE_ROOT_ID` maps to the root node.
    nodes: scc::HashMap<u64, NodeSlot>,
    root_path: PathBuf,
}

impl AdapterState {
    fn node(&self, ino: u64) -> Option<Node> {
        self.nodes.read_sync(&ino, |_, slot| slot.node.clone())
    }

    fn dir(&self, ino: u64) -> Option<DirNode> {
        match self.node(ino) {
            Some(Node::Dir(dir)) => Some(dir),
            _ => None,
        }
    }

    fn file(&self, ino: u64) -> Option<FileNode> {
        match self.node(ino) {
            Some(Node::File(file)) => Some(file),
            _ => None,
        }
    }

    /// Record a kernel-visible node, bumping its lookup refcount. A
    /// re-lookup refreshes the stored node so the binding tracks the latest
    /// resolved path.
    fn remember(&self, ino: u64, node: Node) {
        match self.nodes.entry_sync(ino) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                slot.rc += 1;
                slot.node = node;
            }
            Entry::Vacant(vacant) => {
                vacant.insert_entry(NodeSlot { rc: 1, node });
            }
        }
    }

    fn forget(&self, ino: u64, nlookups: u64) {
        if ino == fuser::FUSE_ROOT_ID {
            return;
        }
        let remaining = self.nodes.update_sync(&ino, |_, slot| {
            slot.rc = slot.rc.saturating_sub(nlookups);
            slot.rc
        });
        if remaining == Some(0) {
            self.nodes.remove_if_sync(&ino, |slot| slot.rc == 0);
        }
    }
}

/// The `fuser::Filesystem` implementation serving a [`MirrorFs`].
pub struct FuserAdapter {
    state: Arc<AdapterState>,
    runtime: tokio::runtime::Handle,
}

impl FuserAdapter {
    /// Kernel cache TTL. The mirror contents can change underneath us at any
    /// time, so replies stay valid only briefly.
    const TTL: Duration = Duration::from_secs(1);

    pub fn new(fs: &MirrorFs, runtime: tokio::runtime::Handle) -> Self {
        let state = AdapterState {
            nodes: scc::HashMap::new(),
            root_path: fs.root_path().to_path_buf(),
        };
        let _ = state.nodes.insert_sync(
            fuser::FUSE_ROOT_ID,
            NodeSlot {
                rc: 1,
                node: Node::Dir(fs.root()),
            },
        );
        Self {
            state: Arc::new(state),
            runtime,
        }
    }
}

/// The kernel addresses the root as `FUSE_ROOT_ID`, so the root's real
/// inode number must never leak into replies for it.
fn rewrite_root_ino(ino: u64, attr: &mut NodeAttr) {
    if ino == fuser::FUSE_ROOT_ID {
        attr.ino = fuser::FUSE_ROOT_ID;
    }
}

impl fuser::Filesystem for FuserAdapter {
    #[instrument(name = "FuserAdapter::lookup", skip(self, _req, reply))]
    fn lookup(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEntry,
    ) {
        let state = Arc::clone(&self.state);
        let name = name.to_owned();
        self.runtime.spawn(async move {
            let Some(dir) = state.dir(parent) else {
                reply.error(libc::ENOENT);
                return;
            };
            match dir.lookup(&name).await {
                Ok((node, attr)) => {
                    state.remember(attr.ino, node);
                    debug!(ino = attr.ino, "replying entry");
                    reply.entry(&Self::TTL, &attr.into(), 0);
                }
                Err(e) => {
                    debug!(error = %e, "replying error");
                    reply.error(e.into());
                }
            }
        });
    }

    #[instrument(name = "FuserAdapter::getattr", skip(self, _req, _fh, reply))]
    fn getattr(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: Option<u64>,
        reply: fuser::ReplyAttr,
    ) {
        let state = Arc::clone(&self.state);
        self.runtime.spawn(async move {
            let Some(node) = state.node(ino) else {
                reply.error(libc::ENOENT);
                return;
            };
            match node.attr().await {
                Ok(mut attr) => {
                    rewrite_root_ino(ino, &mut attr);
                    reply.attr(&Self::TTL, &attr.into());
                }
                Err(e) => {
                    debug!(error = %e, "replying error");
                    reply.error(e.into());
                }
            }
        });
    }

    #[instrument(name = "FuserAdapter::setattr", skip_all, fields(ino = ino))]
    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: fuser::ReplyAttr,
    ) {
        let state = Arc::clone(&self.state);
        self.runtime.spawn(async move {
            let Some(node) = state.node(ino) else {
                reply.error(libc::ENOENT);
                return;
            };
            match node.setattr(SetattrRequest { mode, size }).await {
                Ok(mut attr) => {
                    rewrite_root_ino(ino, &mut attr);
                    reply.attr(&Self::TTL, &attr.into());
                }
                Err(e) => {
                    debug!(error = %e, "replying error");
                    reply.error(e.into());
                }
            }
        });
    }

    #[instrument(name = "FuserAdapter::readdir", skip(self, _req, _fh, reply))]
    fn readdir(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: fuser::ReplyDirectory,
    ) {
        let state = Arc::clone(&self.state);
        self.runtime.spawn(async move {
            let Some(dir) = state.dir(ino) else {
                reply.error(libc::ENOTDIR);
                return;
            };
            let entries = match dir.read_dir_all().await {
                Ok(entries) => entries,
                Err(e) => {
                    debug!(error = %e, "replying error");
                    reply.error(e.into());
                    return;
                }
            };

            for (i, entry) in entries.iter().enumerate().skip(offset.max(0) as usize) {
                let kind = match entry.kind {
                    NodeKind::Directory => fuser::FileType::Directory,
                    NodeKind::File => fuser::FileType::RegularFile,
                };
                if reply.add(entry.ino, (i + 1) as i64, kind, &entry.name) {
                    debug!("reply buffer full, stopping readdir");
                    break;
                }
            }
            reply.ok();
        });
    }

    #[instrument(name = "FuserAdapter::create", skip(self, _req, _umask, reply))]
    fn create(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: fuser::ReplyCreate,
    ) {
        let state = Arc::clone(&self.state);
        let name = name.to_owned();
        self.runtime.spawn(async move {
            let Some(dir) = state.dir(parent) else {
                reply.error(libc::ENOENT);
                return;
            };
            let file = match dir.create(&name, flags, mode).await {
                Ok(file) => file,
                Err(e) => {
                    debug!(error = %e, "replying error");
                    reply.error(e.into());
                    return;
                }
            };
            match file.attr().await {
                Ok(attr) => {
                    state.remember(attr.ino, Node::File(file));
                    // The node doubles as the handle; there is no
                    // descriptor object to hand out.
                    reply.created(&Self::TTL, &attr.into(), 0, 0, 0);
                }
                Err(e) => {
                    debug!(error = %e, "replying error");
                    reply.error(e.into());
                }
            }
        });
    }

    #[instrument(name = "FuserAdapter::mkdir", skip(self, _req, _umask, reply))]
    fn mkdir(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: fuser::ReplyEntry,
    ) {
        let state = Arc::clone(&self.state);
        let name = name.to_owned();
        self.runtime.spawn(async move {
            let Some(dir) = state.dir(parent) else {
                reply.error(libc::ENOENT);
                return;
            };
            let subdir = match dir.mkdir(&name, mode).await {
                Ok(subdir) => subdir,
                Err(e) => {
                    debug!(error = %e, "replying error");
                    reply.error(e.into());
                    return;
                }
            };
            match subdir.attr().await {
                Ok(attr) => {
                    state.remember(attr.ino, Node::Dir(subdir));
                    reply.entry(&Self::TTL, &attr.into(), 0);
                }
                Err(e) => {
                    debug!(error = %e, "replying error");
                    reply.error(e.into());
                }
            }
        });
    }

    #[instrument(name = "FuserAdapter::unlink", skip(self, _req, reply))]
    fn unlink(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEmpty,
    ) {
        let state = Arc::clone(&self.state);
        let name = name.to_owned();
        self.runtime.spawn(async move {
            let Some(dir) = state.dir(parent) else {
                reply.error(libc::ENOENT);
                return;
            };
            match dir.remove(&name).await {
                Ok(()) => reply.ok(),
                Err(e) => {
                    debug!(error = %e, "replying error");
                    reply.error(e.into());
                }
            }
        });
    }

    #[instrument(name = "FuserAdapter::rmdir", skip(self, _req, reply))]
    fn rmdir(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEmpty,
    ) {
        let state = Arc::clone(&self.state);
        let name = name.to_owned();
        self.runtime.spawn(async move {
            let Some(dir) = state.dir(parent) else {
                reply.error(libc::ENOENT);
                return;
            };
            match dir.remove(&name).await {
                Ok(()) => reply.ok(),
                Err(e) => {
                    debug!(error = %e, "replying error");
                    reply.error(e.into());
                }
            }
        });
    }

    #[instrument(name = "FuserAdapter::rename", skip(self, _req, _flags, reply))]
    fn rename(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: fuser::ReplyEmpty,
    ) {
        let state = Arc::clone(&self.state);
        let name = name.to_owned();
        let newname = newname.to_owned();
        self.runtime.spawn(async move {
            let Some(dir) = state.dir(parent) else {
                reply.error(libc::ENOENT);
                return;
            };
            let Some(target) = state.node(newparent) else {
                reply.error(libc::ENOENT);
                return;
            };
            match dir.rename(&name, &target, &newname).await {
                Ok(()) => reply.ok(),
                Err(e) => {
                    debug!(error = %e, "replying error");
                    reply.error(e.into());
                }
            }
        });
    }

    #[instrument(
        name = "FuserAdapter::read",
        skip(self, _req, _fh, _flags, _lock_owner, reply)
    )]
    fn read(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyData,
    ) {
        let state = Arc::clone(&self.state);
        self.runtime.spawn(async move {
            let Some(file) = state.file(ino) else {
                reply.error(libc::ENOENT);
                return;
            };
            // Whole-file read semantics, windowed down to the kernel's
            // requested range.
            match file.read_all().await {
                Ok(data) => {
                    let start = (offset.max(0) as usize).min(data.len());
                    let end = start.saturating_add(size as usize).min(data.len());
                    reply.data(&data[start..end]);
                }
                Err(e) => {
                    debug!(error = %e, "replying error");
                    reply.error(e.into());
                }
            }
        });
    }

    #[instrument(
        name = "FuserAdapter::write",
        skip(self, _req, _fh, data, _write_flags, _lock_owner, reply)
    )]
    fn write(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyWrite,
    ) {
        let state = Arc::clone(&self.state);
        let data = Bytes::copy_from_slice(data);
        self.runtime.spawn(async move {
            let Some(file) = state.file(ino) else {
                reply.error(libc::ENOENT);
                return;
            };
            match file.write(offset.max(0) as u64, data, flags).await {
                Ok(written) => reply.written(written as u32),
                Err(e) => {
                    debug!(error = %e, "replying error");
                    reply.error(e.into());
                }
            }
        });
    }

    #[instrument(name = "FuserAdapter::forget", skip(self, _req))]
    fn forget(&mut self, _req: &fuser::Request<'_>, ino: u64, nlookup: u64) {
        self.state.forget(ino, nlookup);
    }

    #[instrument(name = "FuserAdapter::statfs", skip(self, _req, _ino, reply))]
    fn statfs(&mut self, _req: &fuser::Request<'_>, _ino: u64, reply: fuser::ReplyStatfs) {
        match nix::sys::statvfs::statvfs(self.state.root_path.as_path()) {
            Ok(stat) => reply.statfs(
                stat.blocks() as u64,
                stat.blocks_free() as u64,
                stat.blocks_available() as u64,
                stat.files() as u64,
                stat.files_free() as u64,
                stat.block_size() as u32,
                stat.name_max() as u32,
                stat.fragment_size() as u32,
            ),
            Err(e) => {
                warn!(error = %e, "statvfs failed");
                reply.error(e as i32);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_attr_converts_to_fuser_attr() {
        let attr = NodeAttr {
            ino: 42,
            kind: NodeKind::File,
            size: 128,
            blocks: 1,
            perm: 0o644,
            nlink: 1,
            uid: 1000,
            gid: 1000,
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
            blksize: 4096,
        };
        let fuser_attr: fuser::FileAttr = attr.into();
        assert_eq!(fuser_attr.ino, 42);
        assert_eq!(fuser_attr.size, 128);
        assert_eq!(fuser_attr.kind, fuser::FileType::RegularFile);
        assert_eq!(fuser_attr.perm, 0o644);

        let mut dir_attr = NodeAttr {
            kind: NodeKind::Directory,
            ..attr
        };
        rewrite_root_ino(fuser::FUSE_ROOT_ID, &mut dir_attr);
        assert_eq!(dir_attr.ino, fuser::FUSE_ROOT_ID);
        let fuser_attr: fuser::FileAttr = dir_attr.into();
        assert_eq!(fuser_attr.kind, fuser::FileType::Directory);
    }
}
