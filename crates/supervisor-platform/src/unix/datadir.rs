use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::PlatformError;

const GLOBAL_DATA_DIR: &str = "/var/lib/launch-supervisor";

/// Resolves the global data directory, creating it if needed.
///
/// `migrate_user_data_dir` gates a compatibility-only step: when set, and
/// the global directory is freshly created (empty), scan local home
/// directories under `/home` for a pre-existing per-user install (the
/// layout a desktop-era install left behind) and symlink its contents in,
/// rather than starting the backend with no data at all. This walk touches
/// every local account's home directory, so it must never run unless the
/// caller passed the flag explicitly.
pub fn resolve(migrate_user_data_dir: bool) -> Result<PathBuf, PlatformError> {
    let dir = PathBuf::from(GLOBAL_DATA_DIR);
    let pre_existing = dir.exists();

    ensure_world_writable_dir(&dir)?;

    if migrate_user_data_dir && !pre_existing {
        migrate_from_user_homes(&dir)?;
    }

    Ok(dir)
}

/// Creates `dir` (and its ancestors) with permissive access for all local
/// users: the unprivileged backend and frontend both need to write under
/// the data directory, so it must not come out owner-only because of the
/// Supervisor's own umask.
pub(crate) fn ensure_world_writable_dir(dir: &Path) -> Result<(), PlatformError> {
    let previous_umask = unsafe { libc::umask(0) };
    let result = fs::create_dir_all(dir)
        .and_then(|()| fs::set_permissions(dir, fs::Permissions::from_mode(0o777)));
    unsafe {
        libc::umask(previous_umask);
    }
    result.map_err(|e| PlatformError::DataDir(format!("creating {}: {e}", dir.display())))
}

fn migrate_from_user_homes(global_dir: &std::path::Path) -> Result<(), PlatformError> {
    let home_root = PathBuf::from("/home");
    let entries = match fs::read_dir(&home_root) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };

    for entry in entries.flatten() {
        let candidate = entry.path().join(".launch-supervisor");
        if candidate.is_dir() {
            if let Err(e) = copy_dir_contents(&candidate, global_dir) {
                log::warn!(
                    "skipping data-dir migration from {}: {e}",
                    candidate.display()
                );
            }
            return Ok(());
        }
    }
    Ok(())
}

fn copy_dir_contents(from: &std::path::Path, to: &std::path::Path) -> std::io::Result<()> {
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            fs::create_dir_all(&dest)?;
            copy_dir_contents(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), dest)?;
        }
    }
    Ok(())
}
