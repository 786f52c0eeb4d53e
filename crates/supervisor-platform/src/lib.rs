//! Platform abstraction layer.
//!
//! Every OS-specific primitive the Supervisor needs -- creating and opening
//! the Exchange region, enumerating and terminating processes, resolving the
//! data directory, registering with the host service manager, and spawning
//! the backend -- is gathered behind the [`Platform`] trait. The Control
//! Loop, Reaper and Exchange-consuming code in the `supervisor` crate never
//! match on `cfg(windows)`/`cfg(unix)` themselves; they take `&dyn Platform`
//! (or a generic `P: Platform`) and stay portable. This replaces the
//! teacher's per-file `#[cfg(windows)] #[path = "windows.rs"] mod imp;`
//! pattern (`components/core/src/os/process/mod.rs`) with a trait object so
//! tests can supply a fake implementation instead of running against a real
//! OS.

mod error;
mod process;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

pub use error::PlatformError;
pub use process::ProcessInfo;
use supervisor_protocol::Exchange;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A live, mapped Exchange region. Dropping it detaches the mapping; if this
/// handle was the one that created the region (as opposed to merely
/// attaching to an existing one), dropping it also removes the backing
/// object.
pub trait Region {
    fn exchange(&self) -> &Exchange;
}

/// Everything the Control Loop needs from the host operating system.
pub trait Platform {
    /// PID of the current process.
    fn current_pid(&self) -> u32;

    /// PID of the current process's parent.
    fn parent_pid(&self) -> u32;

    /// Enumerate live processes. Processes that can't be inspected (gone,
    /// access denied) are silently skipped; only an enumeration-wide
    /// failure is returned as `Err`.
    fn enumerate_processes(&self) -> Result<Vec<ProcessInfo>, PlatformError>;

    /// Send an unconditional terminate signal to `pid`. Returns `Ok(())`
    /// even if the process had already exited by the time the signal was
    /// sent (that's a successful kill from the Reaper's point of view).
    fn terminate_process(&self, pid: u32) -> Result<(), PlatformError>;

    /// Reap any of our own children that have exited, without blocking.
    fn reap_children(&self);

    /// Create the Exchange region, replacing any stale region of the same
    /// name. The caller owns the returned region and is responsible for
    /// removing it on shutdown.
    fn create_region(&self, name: &str) -> Result<Box<dyn Region>, PlatformError>;

    /// Attach to an existing Exchange region read-write, without creating
    /// or owning it. Polls `size == expected && cycles advanced` until
    /// `liveness_deadline_ms` elapses; returns `PlatformError::NotReady` on
    /// timeout rather than handing back a region that may still be mid
    /// initialization.
    fn open_region(
        &self,
        name: &str,
        liveness_deadline_ms: u64,
    ) -> Result<Box<dyn Region>, PlatformError>;

    /// Resolve (creating if necessary) the global data directory.
    /// `migrate_user_data_dir` gates the (compatibility-only) behavior of
    /// walking local user accounts looking for a pre-existing per-user
    /// install to symlink into the global location; callers should only
    /// set this from an explicit CLI flag, never by default.
    fn resolve_data_dir(&self, migrate_user_data_dir: bool) -> Result<PathBuf, PlatformError>;

    /// Spawn `exe` with `args` and `env`, detached, without waiting for it.
    /// Returns the child PID as soon as it is known.
    fn spawn_detached(
        &self,
        exe: &Path,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<u32, PlatformError>;

    /// Resolve the home directory for `user`, used to set the spawned
    /// backend's `HOME` environment variable.
    fn home_dir_for_user(&self, user: &str) -> Option<PathBuf>;

    /// Register the Supervisor with the host service manager.
    fn install_service(&self, descriptor: &ServiceDescriptor) -> Result<(), PlatformError>;

    /// Unregister the Supervisor from the host service manager.
    fn remove_service(&self) -> Result<(), PlatformError>;

    /// Ask the host service manager to start the Supervisor.
    fn start_service(&self) -> Result<(), PlatformError>;

    /// Install a handler that sets an internal flag (observable through
    /// `terminate_requested`) on a requested-stop or system-shutdown event.
    /// Must not do anything beyond flipping that flag: per the concurrency
    /// model, the handler runs out-of-band from the Control Loop and must
    /// not touch the Exchange or any other mutable state directly.
    fn install_signal_handler(&self);

    /// Has a stop or shutdown event arrived since the last check?
    fn terminate_requested(&self) -> bool;

    /// Does the Supervisor's own executable still exist on disk? Used for
    /// the self-liveness check that lets an installer delete the running
    /// executable and have the old Supervisor retire gracefully.
    fn own_executable_exists(&self) -> bool;
}

/// What gets written into the host service manager's registration record.
pub struct ServiceDescriptor {
    pub executable_path: PathBuf,
    pub build_tag: String,
    pub run_as_user: String,
}

#[cfg(unix)]
pub use unix::UnixPlatform as CurrentPlatform;
#[cfg(windows)]
pub use windows::WindowsPlatform as CurrentPlatform;

/// Creates `path` (and its ancestors) with permissive access for all local
/// users. A data directory the unprivileged backend and frontend both need
/// to write under must not come out owner-only just because the
/// Supervisor's umask happened to be restrictive.
#[cfg(unix)]
pub fn ensure_world_writable_dir(path: &Path) -> Result<(), PlatformError> {
    unix::datadir::ensure_world_writable_dir(path)
}

#[cfg(windows)]
pub fn ensure_world_writable_dir(path: &Path) -> Result<(), PlatformError> {
    windows::ensure_world_writable_dir(path)
}
