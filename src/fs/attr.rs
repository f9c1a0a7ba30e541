use std::ffi::OsString;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// What a node is, as far as the mirror is concerned.
///
/// Anything that is not a directory (symlinks, sockets, devices, pipes) is
/// classified as a plain file; the mirror does not give them distinct
/// handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// Stat results for a node, in transport-neutral form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttr {
    pub ino: u64,
    pub kind: NodeKind,
    pub size: u64,
    pub blocks: u64,
    /// Permission bits only (mode with the file-type bits masked off).
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub blksize: u32,
}

impl From<std::fs::Metadata> for NodeAttr {
    fn from(meta: std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt as _;

        // nsecs from MetadataExt is always in [0, 999_999_999].
        fn to_systime(secs: i64, nsecs: i64) -> SystemTime {
            if secs >= 0 {
                UNIX_EPOCH + Duration::new(secs.unsigned_abs(), nsecs as u32)
            } else {
                UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
                    + Duration::from_nanos(nsecs.unsigned_abs())
            }
        }

        let kind = if meta.is_dir() {
            NodeKind::Directory
        } else {
            NodeKind::File
        };

        Self {
            ino: meta.ino(),
            kind,
            size: meta.len(),
            blocks: meta.blocks(),
            perm: (meta.mode() & 0o7777) as u16,
            nlink: meta.nlink() as u32,
            uid: meta.uid(),
            gid: meta.gid(),
            atime: to_systime(meta.atime(), meta.atime_nsec()),
            mtime: to_systime(meta.mtime(), meta.mtime_nsec()),
            ctime: to_systime(meta.ctime(), meta.ctime_nsec()),
            blksize: meta.blksize() as u32,
        }
    }
}

/// A single entry from a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u64,
    pub name: OsString,
    pub kind: NodeKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_conversion_classifies_and_masks_mode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file_path = dir.path().join("f");
        std::fs::write(&file_path, b"abc").expect("write");

        let dir_attr = NodeAttr::from(std::fs::metadata(dir.path()).expect("stat dir"));
        assert_eq!(dir_attr.kind, NodeKind::Directory);

        let file_attr = NodeAttr::from(std::fs::metadata(&file_path).expect("stat file"));
        assert_eq!(file_attr.kind, NodeKind::File);
        assert_eq!(file_attr.size, 3);
        // File-type bits must not leak into perm.
        assert_eq!(u32::from(file_attr.perm) & 0o170_000, 0);
    }
}
