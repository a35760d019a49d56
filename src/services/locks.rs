//! Per-service convergence locks.
//!
//! At most one in-flight convergence per service name, across concurrent
//! runs. The token is an exclusively-created lock file under
//! `build/.locks/` holding the owner's pid; dropping the guard releases
//! it. A held lock surfaces as a per-service apply failure in the
//! competing run. A lock whose owner process is gone (crashed run) is
//! reclaimed on the next acquire.

use std::io::Write;
use std::path::{Path, PathBuf};

const LOCK_DIR: &str = ".locks";

pub struct ServiceLock {
    path: PathBuf,
}

impl Drop for ServiceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Try to take the convergence lock for `service`. `Ok(None)` means another
/// live run currently holds it.
pub fn acquire(build_root: &Path, service: &str) -> anyhow::Result<Option<ServiceLock>> {
    let dir = build_root.join(LOCK_DIR);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{service}.lock"));
    for attempt in 0..2 {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut f) => {
                let _ = writeln!(f, "{}", std::process::id());
                return Ok(Some(ServiceLock { path }));
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if attempt == 0 && is_stale(&path) {
                    let _ = std::fs::remove_file(&path);
                    continue;
                }
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(None)
}

/// A lock is stale when its recorded owner process no longer exists. An
/// unreadable pid counts as stale (truncated write from a crashed run).
fn is_stale(path: &Path) -> bool {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return false;
    };
    let Ok(pid) = raw.trim().parse::<u32>() else {
        return true;
    };
    if pid == std::process::id() {
        return false;
    }
    !pid_alive(pid)
}

#[cfg(target_os = "linux")]
fn pid_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn pid_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_acquire_is_refused_until_drop() {
        let tmp = TempDir::new().expect("tempdir");
        let first = acquire(tmp.path(), "jellyfin").expect("acquire").expect("free");
        assert!(acquire(tmp.path(), "jellyfin").expect("acquire").is_none());
        drop(first);
        assert!(acquire(tmp.path(), "jellyfin").expect("acquire").is_some());
    }

    #[test]
    fn locks_are_per_service() {
        let tmp = TempDir::new().expect("tempdir");
        let _a = acquire(tmp.path(), "jellyfin").expect("acquire").expect("free");
        assert!(acquire(tmp.path(), "gitea").expect("acquire").is_some());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn stale_lock_from_dead_process_is_reclaimed() {
        let tmp = TempDir::new().expect("tempdir");
        let dir = tmp.path().join(LOCK_DIR);
        std::fs::create_dir_all(&dir).expect("mkdir");
        // pid far above any kernel pid_max, so the owner cannot exist.
        std::fs::write(dir.join("jellyfin.lock"), "999999999\n").expect("write lock");
        assert!(acquire(tmp.path(), "jellyfin").expect("acquire").is_some());
    }

    #[test]
    fn corrupt_lock_file_is_reclaimed() {
        let tmp = TempDir::new().expect("tempdir");
        let dir = tmp.path().join(LOCK_DIR);
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join("jellyfin.lock"), "not-a-pid\n").expect("write lock");
        assert!(acquire(tmp.path(), "jellyfin").expect("acquire").is_some());
    }
}
