use std::collections::HashMap;
use std::ffi::CString;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::PlatformError;

/// Spawns `exe` as its own process-group leader so a SIGTERM aimed at the
/// Supervisor's group doesn't also take the backend down with it -- the
/// same `setpgid(0, 0)`-before-exec technique the teacher uses
/// (`components/launcher/src/sys/unix/service.rs`'s `before_exec(owned_pgid)`)
/// to keep a spawned service out of the launcher's own process group.
pub fn spawn_detached(
    exe: &Path,
    args: &[String],
    env: &HashMap<String, String>,
) -> Result<u32, PlatformError> {
    let mut command = Command::new(exe);
    command.args(args);
    command.env_clear();
    for (key, value) in env {
        command.env(key, value);
    }

    unsafe {
        command.pre_exec(|| {
            if libc::setpgid(0, 0) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = command.spawn().map_err(PlatformError::Spawn)?;
    Ok(child.id())
}

pub fn home_dir_for_user(user: &str) -> Option<PathBuf> {
    let cname = CString::new(user).ok()?;
    unsafe {
        let passwd = libc::getpwnam(cname.as_ptr());
        if passwd.is_null() {
            return None;
        }
        let dir_ptr = (*passwd).pw_dir;
        if dir_ptr.is_null() {
            return None;
        }
        let dir = std::ffi::CStr::from_ptr(dir_ptr).to_string_lossy().into_owned();
        Some(PathBuf::from(dir))
    }
}
