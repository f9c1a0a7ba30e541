//! Preflight checks that FUSE is usable before attempting a mount.

use thiserror::Error;

/// Errors that can occur when verifying FUSE availability.
#[derive(Debug, Error)]
pub enum FuseCheckError {
    #[cfg(target_os = "linux")]
    #[error(
        "/dev/fuse is missing. The fuse kernel module is not loaded \
         (try `modprobe fuse`) or this environment has no FUSE support."
    )]
    DeviceMissing,

    #[cfg(target_os = "linux")]
    #[error("no fusermount helper found on PATH. Install the `fuse3` (or `fuse`) package.")]
    HelperMissing,

    #[cfg(target_os = "macos")]
    #[error(
        "macFUSE is not installed. mirror-fs requires macFUSE to mount filesystems.\n\
         Install it from: https://macfuse.github.io/"
    )]
    NotInstalled,
}

/// Verify that FUSE is installed and usable on the current platform.
#[cfg(target_os = "linux")]
pub fn ensure_fuse() -> Result<(), FuseCheckError> {
    if !std::path::Path::new("/dev/fuse").exists() {
        return Err(FuseCheckError::DeviceMissing);
    }

    let path = std::env::var_os("PATH").unwrap_or_default();
    let has_helper = std::env::split_paths(&path)
        .any(|dir| dir.join("fusermount3").is_file() || dir.join("fusermount").is_file());
    if !has_helper {
        return Err(FuseCheckError::HelperMissing);
    }

    Ok(())
}

/// Verify that FUSE is installed and usable on the current platform.
#[cfg(target_os = "macos")]
pub fn ensure_fuse() -> Result<(), FuseCheckError> {
    let installed = std::path::Path::new("/Library/Filesystems/macfuse.fs").is_dir()
        || std::path::Path::new("/Library/Filesystems/osxfuse.fs").is_dir();
    if installed {
        Ok(())
    } else {
        Err(FuseCheckError::NotInstalled)
    }
}

/// On other platforms this is a no-op.
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn ensure_fuse() -> Result<(), FuseCheckError> {
    Ok(())
}
