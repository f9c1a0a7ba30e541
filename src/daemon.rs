//! Mount lifecycle: spawn the FUSE session, wait for a shutdown signal, and
//! make sure the mount point is actually released on the way out.

use std::path::{Path, PathBuf};

use tokio::select;
use tracing::{debug, info};

use mirror_fs::fs::MirrorFs;

mod managed_fuse {
    //! fuser will not force-unmount the filesystem when the
    //! `BackgroundSession` is dropped, only attempt a regular unmount — but a
    //! lingering mount point is worse than an abrupt one, so we retry an
    //! aggressive unmount on the way out.
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use nix::errno::Errno;
    use tracing::{debug, error};

    use fuser::BackgroundSession;
    use mirror_fs::fs::fuser::FuserAdapter;
    use mirror_fs::fs::MirrorFs;

    pub struct FuseSessionScope {
        _session: BackgroundSession,
    }

    impl FuseSessionScope {
        fn spawn(
            fs: &MirrorFs,
            mount_point: &Path,
            handle: tokio::runtime::Handle,
        ) -> Result<Self, std::io::Error> {
            let adapter = FuserAdapter::new(fs, handle);
            let mount_opts = [
                fuser::MountOption::FSName("mirror-fs".to_owned()),
                fuser::MountOption::NoDev,
                fuser::MountOption::AutoUnmount,
                fuser::MountOption::DefaultPermissions,
            ];
            Ok(Self {
                _session: fuser::spawn_mount2(adapter, mount_point, &mount_opts)?,
            })
        }
    }

    pub struct ManagedFuse {
        mount_point: PathBuf,
    }

    impl ManagedFuse {
        pub fn new(mount_point: &Path) -> Self {
            Self {
                mount_point: mount_point.to_path_buf(),
            }
        }

        pub fn spawn(
            &self,
            fs: &MirrorFs,
            handle: tokio::runtime::Handle,
        ) -> Result<FuseSessionScope, std::io::Error> {
            FuseSessionScope::spawn(fs, &self.mount_point, handle)
        }
    }

    impl Drop for ManagedFuse {
        fn drop(&mut self) {
            const UMOUNT_ATTEMPT_COUNT: usize = 10;
            const UMOUNT_ATTEMPT_DELAY: Duration = Duration::from_millis(10);

            debug!(mount_point = ?self.mount_point, "confirming unmount of FUSE filesystem");

            for attempt in 1..=UMOUNT_ATTEMPT_COUNT {
                let result = {
                    #[cfg(target_os = "macos")]
                    {
                        nix::mount::unmount(&self.mount_point, nix::mount::MntFlags::MNT_FORCE)
                    }

                    #[cfg(target_os = "linux")]
                    {
                        nix::mount::umount2(&self.mount_point, nix::mount::MntFlags::MNT_DETACH)
                    }
                };

                match result {
                    Ok(()) => {
                        debug!("unmounted FUSE filesystem on attempt {attempt}");
                        break;
                    }
                    Err(Errno::EBUSY) => {
                        debug!("FUSE filesystem still busy on attempt {attempt}, retrying");
                        std::thread::sleep(UMOUNT_ATTEMPT_DELAY);
                    }
                    Err(Errno::EINVAL | Errno::ENOENT) => {
                        debug!("FUSE filesystem already unmounted (attempt {attempt})");
                        break;
                    }
                    Err(e) => {
                        error!("failed to unmount FUSE filesystem on attempt {attempt}: {e}");
                        break;
                    }
                }
            }
        }
    }
}

/// Prepares the mount point directory.
///
/// - If the directory exists and is non-empty, returns an error.
/// - If the directory does not exist, creates it (including parents).
/// - If the directory exists and is empty, does nothing.
async fn prepare_mount_point(mount_point: &Path) -> Result<(), std::io::Error> {
    match tokio::fs::read_dir(mount_point).await {
        Ok(mut entries) => {
            if entries.next_entry().await?.is_some() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!(
                        "Mount point '{}' already exists and is not empty.",
                        mount_point.display()
                    ),
                ));
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tokio::fs::create_dir_all(mount_point).await?;
            info!(path = %mount_point.display(), "created mount point directory");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn wait_for_exit() -> Result<(), std::io::Error> {
    use tokio::signal;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let mut sighup = signal::unix::signal(signal::unix::SignalKind::hangup())?;
    select! {
        _ = signal::ctrl_c() => {
            debug!("received Ctrl+C, shutting down");
        },
        _ = sigterm.recv() => {
            debug!("received SIGTERM, shutting down");
        },
        _ = sighup.recv() => {
            debug!("received SIGHUP, shutting down");
        },
    }
    Ok(())
}

/// Mount the mirror and serve until a shutdown signal arrives.
pub async fn run(
    fs: MirrorFs,
    mount_point: PathBuf,
    handle: tokio::runtime::Handle,
) -> Result<(), std::io::Error> {
    prepare_mount_point(&mount_point).await?;

    info!(
        mirror = %fs.root_path().display(),
        mount = %mount_point.display(),
        "mounting mirror filesystem"
    );

    let fuse = managed_fuse::ManagedFuse::new(&mount_point);
    {
        let _session = fuse.spawn(&fs, handle)?;
        info!("mirror-fs is running. Press Ctrl+C to stop.");

        wait_for_exit().await?;
    }
    Ok(())
}

pub fn spawn(fs: MirrorFs, mount_point: PathBuf) -> Result<(), std::io::Error> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let handle = runtime.handle().clone();
    runtime.block_on(run(fs, mount_point, handle))
}
