//! Stopping a supervised downloader and everything it spawned.
//!
//! On Unix the child leads its own process group (set at spawn), so signals
//! are sent to the whole group and reach helpers such as ffmpeg.

use std::time::Duration;
use tokio::process::Child;

#[cfg(unix)]
fn signal_group(pgid: Option<u32>, sig: libc::c_int) {
    let Some(pgid) = pgid else {
        return;
    };
    // Negative pid addresses the process group; ESRCH just means it is gone.
    let r = unsafe { libc::kill(-(pgid as libc::pid_t), sig) };
    if r != 0 {
        tracing::trace!(pgid, sig, "signal process group: {}", std::io::Error::last_os_error());
    }
}

/// Kill immediately and reap the child.
pub(super) async fn kill(child: &mut Child, pgid: Option<u32>) {
    #[cfg(unix)]
    signal_group(pgid, libc::SIGKILL);
    #[cfg(not(unix))]
    let _ = pgid;
    if let Err(e) = child.kill().await {
        tracing::debug!("kill downloader: {}", e);
    }
}

/// SIGTERM, wait up to `grace`, then SIGKILL. Always reaps the child.
pub(super) async fn terminate(child: &mut Child, pgid: Option<u32>, grace: Duration) {
    #[cfg(unix)]
    {
        signal_group(pgid, libc::SIGTERM);
        if let Ok(Ok(_)) = tokio::time::timeout(grace, child.wait()).await {
            // Leader exited; sweep any group members that ignored SIGTERM.
            // The kernel keeps the pgid reserved while any member lives, so it
            // can only name a foreign group if every member is already gone
            // and the number was handed to a new group leader in between. In
            // the usual empty-group case this is ESRCH.
            signal_group(pgid, libc::SIGKILL);
            return;
        }
        tracing::debug!(?pgid, "downloader ignored SIGTERM for {:?}, killing", grace);
    }
    #[cfg(not(unix))]
    let _ = grace;
    kill(child, pgid).await;
}
