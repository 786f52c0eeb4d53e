use std::thread;
use std::time::Duration;

use supervisor_platform::Platform;
use supervisor_protocol::is_backend_family;

#[derive(Debug, thiserror::Error)]
pub enum ReaperError {
    #[error("{remaining} backend process(es) still alive after {retries} retries")]
    Timeout { remaining: usize, retries: u32 },
}

/// Signals every backend-family process not in `exclude`, then re-checks
/// who's still alive. `exclude` must always carry the Supervisor's own PID,
/// its parent's PID, and the PID that requested the kill -- the Supervisor
/// must never terminate any of those.
pub fn kill_named(platform: &dyn Platform, exclude: &[u32]) -> usize {
    let targets = match platform.enumerate_processes() {
        Ok(procs) => procs
            .into_iter()
            .filter(|p| is_backend_family(&p.exe_name))
            .filter(|p| !exclude.contains(&p.pid))
            .map(|p| p.pid)
            .collect::<Vec<_>>(),
        Err(e) => {
            log::warn!("process enumeration failed during kill pass: {e}");
            return usize::MAX;
        }
    };

    for pid in &targets {
        if let Err(e) = platform.terminate_process(*pid) {
            log::warn!("failed to terminate pid {pid}: {e}");
        }
    }

    match platform.enumerate_processes() {
        Ok(procs) => procs.iter().filter(|p| targets.contains(&p.pid)).count(),
        Err(_) => targets.len(),
    }
}

/// Repeats [`kill_named`] up to `retries` times, reaping the Supervisor's
/// own children between attempts and sleeping `wait` per iteration, until
/// no excluded-aside backend process remains.
pub fn kill_named_until_empty(
    platform: &dyn Platform,
    exclude: &[u32],
    retries: u32,
    wait: Duration,
) -> Result<(), ReaperError> {
    let mut remaining = usize::MAX;
    for _ in 0..retries {
        remaining = kill_named(platform, exclude);
        platform.reap_children();
        if remaining == 0 {
            return Ok(());
        }
        thread::sleep(wait);
    }
    Err(ReaperError::Timeout { remaining, retries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use supervisor_platform::{PlatformError, ProcessInfo, Region, ServiceDescriptor};

    struct FakePlatform {
        processes: RefCell<Vec<ProcessInfo>>,
        terminated: RefCell<Vec<u32>>,
    }

    impl FakePlatform {
        fn new(processes: Vec<ProcessInfo>) -> Self {
            FakePlatform {
                processes: RefCell::new(processes),
                terminated: RefCell::new(Vec::new()),
            }
        }
    }

    impl Platform for FakePlatform {
        fn current_pid(&self) -> u32 {
            1
        }
        fn parent_pid(&self) -> u32 {
            0
        }
        fn enumerate_processes(&self) -> Result<Vec<ProcessInfo>, PlatformError> {
            Ok(self.processes.borrow().clone())
        }
        fn terminate_process(&self, pid: u32) -> Result<(), PlatformError> {
            self.terminated.borrow_mut().push(pid);
            self.processes.borrow_mut().retain(|p| p.pid != pid);
            Ok(())
        }
        fn reap_children(&self) {}
        fn create_region(&self, _name: &str) -> Result<Box<dyn Region>, PlatformError> {
            unimplemented!()
        }
        fn open_region(
            &self,
            _name: &str,
            _liveness_deadline_ms: u64,
        ) -> Result<Box<dyn Region>, PlatformError> {
            unimplemented!()
        }
        fn resolve_data_dir(&self, _migrate: bool) -> Result<PathBuf, PlatformError> {
            unimplemented!()
        }
        fn spawn_detached(
            &self,
            _exe: &Path,
            _args: &[String],
            _env: &HashMap<String, String>,
        ) -> Result<u32, PlatformError> {
            unimplemented!()
        }
        fn home_dir_for_user(&self, _user: &str) -> Option<PathBuf> {
            None
        }
        fn install_service(&self, _descriptor: &ServiceDescriptor) -> Result<(), PlatformError> {
            unimplemented!()
        }
        fn remove_service(&self) -> Result<(), PlatformError> {
            unimplemented!()
        }
        fn start_service(&self) -> Result<(), PlatformError> {
            unimplemented!()
        }
        fn install_signal_handler(&self) {}
        fn terminate_requested(&self) -> bool {
            false
        }
        fn own_executable_exists(&self) -> bool {
            true
        }
    }

    fn backend(pid: u32, ppid: u32) -> ProcessInfo {
        ProcessInfo {
            pid,
            ppid,
            uid: 1000,
            exe_name: "backend-worker".to_string(),
        }
    }

    #[test]
    fn kills_backend_family_except_excluded() {
        let platform = FakePlatform::new(vec![
            backend(10, 1),
            backend(11, 1),
            ProcessInfo {
                pid: 12,
                ppid: 1,
                uid: 0,
                exe_name: "unrelated".to_string(),
            },
        ]);

        let remaining = kill_named(&platform, &[11]);

        assert_eq!(remaining, 0);
        assert_eq!(*platform.terminated.borrow(), vec![10]);
    }

    #[test]
    fn never_signals_self_parent_or_source_pid() {
        let platform = FakePlatform::new(vec![backend(1, 1), backend(0, 1), backend(99, 1)]);
        let exclude = [1, 0, 99];

        let remaining = kill_named(&platform, &exclude);

        assert_eq!(remaining, 3);
        assert!(platform.terminated.borrow().is_empty());
    }

    #[test]
    fn until_empty_converges_within_one_retry_when_targets_die_immediately() {
        let platform = FakePlatform::new(vec![backend(20, 1)]);
        let result = kill_named_until_empty(&platform, &[1], 3, Duration::from_millis(1));
        assert!(result.is_ok());
    }

    #[test]
    fn until_empty_times_out_if_a_process_never_dies() {
        struct StubbornPlatform(FakePlatform);
        impl Platform for StubbornPlatform {
            fn current_pid(&self) -> u32 {
                self.0.current_pid()
            }
            fn parent_pid(&self) -> u32 {
                self.0.parent_pid()
            }
            fn enumerate_processes(&self) -> Result<Vec<ProcessInfo>, PlatformError> {
                self.0.enumerate_processes()
            }
            fn terminate_process(&self, _pid: u32) -> Result<(), PlatformError> {
                // Refuses to die.
                Ok(())
            }
            fn reap_children(&self) {}
            fn create_region(&self, _name: &str) -> Result<Box<dyn Region>, PlatformError> {
                unimplemented!()
            }
            fn open_region(&self, _name: &str) -> Result<Box<dyn Region>, PlatformError> {
                unimplemented!()
            }
            fn resolve_data_dir(&self, _migrate: bool) -> Result<PathBuf, PlatformError> {
                unimplemented!()
            }
            fn spawn_detached(
                &self,
                _exe: &Path,
                _args: &[String],
                _env: &HashMap<String, String>,
            ) -> Result<u32, PlatformError> {
                unimplemented!()
            }
            fn home_dir_for_user(&self, _user: &str) -> Option<PathBuf> {
                None
            }
            fn install_service(&self, _d: &ServiceDescriptor) -> Result<(), PlatformError> {
                unimplemented!()
            }
            fn remove_service(&self) -> Result<(), PlatformError> {
                unimplemented!()
            }
            fn start_service(&self) -> Result<(), PlatformError> {
                unimplemented!()
            }
            fn install_signal_handler(&self) {}
            fn terminate_requested(&self) -> bool {
                false
            }
            fn own_executable_exists(&self) -> bool {
                true
            }
        }

        let platform = StubbornPlatform(FakePlatform::new(vec![backend(30, 1)]));
        let result = kill_named_until_empty(&platform, &[1], 2, Duration::from_millis(1));
        assert!(matches!(result, Err(ReaperError::Timeout { remaining: 1, retries: 2 })));
    }
}
