//! Mirror a real directory tree as a mountable filesystem with operation
//! hooks.

use std::path::PathBuf;

use clap::Parser;
use tracing::{debug, error};

mod daemon;
mod fuse_check;
mod trc;

use mirror_fs::fs::MirrorFs;
use mirror_fs::hooks::WILDCARD;

#[derive(Parser)]
#[command(
    version,
    about = "Mirror a directory tree as a mountable filesystem with operation hooks."
)]
struct Args {
    /// Where to mount the mirror.
    mount_path: PathBuf,

    /// The real directory tree to mirror.
    #[arg(short, long, default_value = "/")]
    mirror: PathBuf,

    /// Log filter, e.g. `debug` or `mirror_fs=trace`. Falls back to the
    /// MIRROR_FS_LOG environment variable, then `info`.
    #[arg(short, long)]
    log_level: Option<String>,
}

fn main() {
    let args = Args::parse();

    // Errors use eprintln since tracing isn't initialized yet.
    if let Err(e) = trc::Trc::new(args.log_level.as_deref()).and_then(trc::Trc::init) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = fuse_check::ensure_fuse() {
        error!("{e}");
        std::process::exit(1);
    }

    let fs = MirrorFs::new(args.mirror).with_hook(WILDCARD, |event| async move {
        debug!(event = %event.name(), payload = ?event, "hook");
    });

    if let Err(e) = daemon::spawn(fs, args.mount_path) {
        error!("Failed to serve the filesystem: {e}");
        std::process::exit(1);
    }
}
