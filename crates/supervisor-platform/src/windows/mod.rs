//! Windows backend. Mirrors `unix` module-for-module but talks to the Win32
//! API via `winapi` instead of `libc`: `CreateFileMappingW`/`MapViewOfFile`
//! for the Exchange region, `CreateToolhelp32Snapshot` for enumeration, the
//! Service Control Manager for install/remove/start, and
//! `SetConsoleCtrlHandler` for the out-of-band stop signal. Grounded in
//! `examples/original_source/launch/shlaunchWin/shlaunch/shlaunch.c`, which
//! this module reimplements behind the same [`crate::Platform`] trait the
//! Unix backend implements rather than as a parallel `#[cfg(windows)]`
//! branch threaded through business logic.

mod region;
mod service;
mod signals;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use winapi::um::handleapi::CloseHandle;
use winapi::um::processthreadsapi::{GetCurrentProcessId, OpenProcess};
use winapi::um::tlhelp32::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
    TH32CS_SNAPPROCESS,
};
use winapi::um::winnt::PROCESS_TERMINATE;

use crate::{PlatformError, ProcessInfo, Region, ServiceDescriptor};

pub struct WindowsPlatform;

impl WindowsPlatform {
    pub fn new() -> Self {
        WindowsPlatform
    }
}

impl Default for WindowsPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::Platform for WindowsPlatform {
    fn current_pid(&self) -> u32 {
        unsafe { GetCurrentProcessId() }
    }

    fn parent_pid(&self) -> u32 {
        // No cheap direct API; find ourselves in a toolhelp snapshot.
        let my_pid = self.current_pid();
        self.enumerate_processes()
            .ok()
            .and_then(|procs| procs.into_iter().find(|p| p.pid == my_pid))
            .map(|p| p.ppid)
            .unwrap_or(0)
    }

    fn enumerate_processes(&self) -> Result<Vec<ProcessInfo>, PlatformError> {
        unsafe {
            let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0);
            if snapshot.is_null() || snapshot == winapi::um::handleapi::INVALID_HANDLE_VALUE {
                return Err(PlatformError::Enumerate(std::io::Error::last_os_error()));
            }

            let mut entry: PROCESSENTRY32W = std::mem::zeroed();
            entry.dwSize = std::mem::size_of::<PROCESSENTRY32W>() as u32;

            let mut processes = Vec::new();
            if Process32FirstW(snapshot, &mut entry) != 0 {
                loop {
                    processes.push(ProcessInfo {
                        pid: entry.th32ProcessID,
                        ppid: entry.th32ParentProcessID,
                        uid: 0,
                        exe_name: wide_to_string(&entry.szExeFile),
                    });
                    if Process32NextW(snapshot, &mut entry) == 0 {
                        break;
                    }
                }
            }
            CloseHandle(snapshot);
            Ok(processes)
        }
    }

    fn terminate_process(&self, pid: u32) -> Result<(), PlatformError> {
        unsafe {
            let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
            if handle.is_null() {
                // Already gone counts as success, same as the Unix ESRCH case.
                return Ok(());
            }
            let ok = winapi::um::processthreadsapi::TerminateProcess(handle, 1);
            CloseHandle(handle);
            if ok == 0 {
                Err(PlatformError::Terminate {
                    pid,
                    source: std::io::Error::last_os_error(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn reap_children(&self) {
        // Windows has no zombie-process concept; a terminated child's
        // handle is simply closed once we stop waiting on it.
    }

    fn create_region(&self, name: &str) -> Result<Box<dyn Region>, PlatformError> {
        region::create(name)
    }

    fn open_region(
        &self,
        name: &str,
        liveness_deadline_ms: u64,
    ) -> Result<Box<dyn Region>, PlatformError> {
        region::open(name, liveness_deadline_ms)
    }

    fn resolve_data_dir(&self, migrate_user_data_dir: bool) -> Result<PathBuf, PlatformError> {
        let program_data = std::env::var("ProgramData")
            .or_else(|_| std::env::var("SystemDrive").map(|d| format!("{d}\\ProgramData")))
            .map_err(|_| {
                PlatformError::DataDir("neither ProgramData nor SystemDrive is set".into())
            })?;
        let dir = PathBuf::from(program_data).join("LaunchSupervisor");
        let pre_existing = dir.exists();

        crate::ensure_world_writable_dir(&dir)?;

        if migrate_user_data_dir && !pre_existing {
            log::info!("user data-dir migration requested but not implemented on Windows");
        }

        Ok(dir)
    }

    fn spawn_detached(
        &self,
        exe: &Path,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<u32, PlatformError> {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

        let mut command = std::process::Command::new(exe);
        command.args(args);
        command.env_clear();
        for (key, value) in env {
            command.env(key, value);
        }
        command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);

        let child = command.spawn().map_err(PlatformError::Spawn)?;
        Ok(child.id())
    }

    fn home_dir_for_user(&self, user: &str) -> Option<PathBuf> {
        let users_root = std::env::var("SystemDrive")
            .map(|d| format!("{d}\\Users"))
            .unwrap_or_else(|_| "C:\\Users".to_string());
        let candidate = PathBuf::from(users_root).join(user);
        if candidate.is_dir() {
            Some(candidate)
        } else {
            None
        }
    }

    fn install_service(&self, descriptor: &ServiceDescriptor) -> Result<(), PlatformError> {
        service::install(descriptor)
    }

    fn remove_service(&self) -> Result<(), PlatformError> {
        service::remove()
    }

    fn start_service(&self) -> Result<(), PlatformError> {
        service::start()
    }

    fn install_signal_handler(&self) {
        signals::install()
    }

    fn terminate_requested(&self) -> bool {
        signals::terminate_requested()
    }

    fn own_executable_exists(&self) -> bool {
        std::env::current_exe()
            .map(|p| p.exists())
            .unwrap_or(false)
    }
}

fn wide_to_string(wide: &[u16]) -> String {
    let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..len])
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Same policy as the Exchange region's SDDL: authenticated users and local
/// system get full control, anonymous/guest logons get nothing.
const DATA_DIR_SDDL: &str = "D:(A;OICI;GA;;;AU)(A;OICI;GA;;;SY)";

/// Creates `path` (and its ancestors) and grants authenticated users and
/// local system full control over it, so an unprivileged backend or
/// frontend process can write under it.
pub(crate) fn ensure_world_writable_dir(path: &Path) -> Result<(), PlatformError> {
    std::fs::create_dir_all(path)
        .map_err(|e| PlatformError::DataDir(format!("creating {}: {e}", path.display())))?;
    apply_permissive_acl(path)
}

fn apply_permissive_acl(path: &Path) -> Result<(), PlatformError> {
    use winapi::um::accctrl::SE_FILE_OBJECT;
    use winapi::um::aclapi::SetNamedSecurityInfoW;
    use winapi::um::securitybaseapi::{
        ConvertStringSecurityDescriptorToSecurityDescriptorW, GetSecurityDescriptorDacl,
    };
    use winapi::um::winnt::{DACL_SECURITY_INFORMATION, PACL, SECURITY_DESCRIPTOR};

    let wide_path = wide(&path.to_string_lossy());
    let wide_sddl = wide(DATA_DIR_SDDL);

    let mut descriptor: *mut SECURITY_DESCRIPTOR = std::ptr::null_mut();
    let ok = unsafe {
        ConvertStringSecurityDescriptorToSecurityDescriptorW(
            wide_sddl.as_ptr(),
            1,
            &mut descriptor as *mut _ as *mut _,
            std::ptr::null_mut(),
        )
    };
    if ok == 0 {
        return Err(PlatformError::DataDir(format!(
            "building security descriptor for {}: {}",
            path.display(),
            std::io::Error::last_os_error()
        )));
    }

    let mut dacl: PACL = std::ptr::null_mut();
    let mut dacl_present = 0;
    let mut dacl_defaulted = 0;
    unsafe {
        GetSecurityDescriptorDacl(
            descriptor as *mut _,
            &mut dacl_present,
            &mut dacl,
            &mut dacl_defaulted,
        );
    }

    let status = unsafe {
        SetNamedSecurityInfoW(
            wide_path.as_ptr() as *mut _,
            SE_FILE_OBJECT,
            DACL_SECURITY_INFORMATION,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            dacl,
            std::ptr::null_mut(),
        )
    };
    if status != 0 {
        return Err(PlatformError::DataDir(format!(
            "applying permissive ACL to {}: OS error {status}",
            path.display()
        )));
    }

    Ok(())
}
