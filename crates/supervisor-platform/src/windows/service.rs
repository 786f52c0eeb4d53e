use std::io;
use std::ptr;

use winapi::um::winsvc::{
    CloseServiceHandle, CreateServiceW, DeleteService, OpenSCManagerW, OpenServiceW, StartServiceW,
    SC_MANAGER_ALL_ACCESS, SERVICE_ALL_ACCESS, SERVICE_AUTO_START, SERVICE_ERROR_NORMAL,
    SERVICE_WIN32_OWN_PROCESS,
};

use crate::{PlatformError, ServiceDescriptor};

const SERVICE_NAME: &str = "LaunchSupervisor";

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

pub fn install(descriptor: &ServiceDescriptor) -> Result<(), PlatformError> {
    unsafe {
        let scm = OpenSCManagerW(ptr::null(), ptr::null(), SC_MANAGER_ALL_ACCESS);
        if scm.is_null() {
            return Err(PlatformError::Service(format!(
                "OpenSCManagerW failed: {}",
                io::Error::last_os_error()
            )));
        }

        let name = wide(SERVICE_NAME);
        let display_name = wide(&format!("Launch Supervisor ({})", descriptor.build_tag));
        let bin_path = wide(&format!(
            "\"{}\" {}",
            descriptor.executable_path.display(),
            descriptor.build_tag
        ));

        let service = CreateServiceW(
            scm,
            name.as_ptr(),
            display_name.as_ptr(),
            SERVICE_ALL_ACCESS,
            SERVICE_WIN32_OWN_PROCESS,
            SERVICE_AUTO_START,
            SERVICE_ERROR_NORMAL,
            bin_path.as_ptr(),
            ptr::null(),
            ptr::null_mut(),
            ptr::null(),
            ptr::null(),
            ptr::null(),
        );

        let result = if service.is_null() {
            Err(PlatformError::Service(format!(
                "CreateServiceW failed: {}",
                io::Error::last_os_error()
            )))
        } else {
            CloseServiceHandle(service);
            Ok(())
        };

        CloseServiceHandle(scm);
        result
    }
}

pub fn remove() -> Result<(), PlatformError> {
    unsafe {
        let scm = OpenSCManagerW(ptr::null(), ptr::null(), SC_MANAGER_ALL_ACCESS);
        if scm.is_null() {
            return Err(PlatformError::Service(format!(
                "OpenSCManagerW failed: {}",
                io::Error::last_os_error()
            )));
        }

        let name = wide(SERVICE_NAME);
        let service = OpenServiceW(scm, name.as_ptr(), SERVICE_ALL_ACCESS);
        let result = if service.is_null() {
            // Already gone; nothing to remove.
            Ok(())
        } else {
            let ok = DeleteService(service);
            CloseServiceHandle(service);
            if ok == 0 {
                Err(PlatformError::Service(format!(
                    "DeleteService failed: {}",
                    io::Error::last_os_error()
                )))
            } else {
                Ok(())
            }
        };

        CloseServiceHandle(scm);
        result
    }
}

pub fn start() -> Result<(), PlatformError> {
    unsafe {
        let scm = OpenSCManagerW(ptr::null(), ptr::null(), SC_MANAGER_ALL_ACCESS);
        if scm.is_null() {
            return Err(PlatformError::Service(format!(
                "OpenSCManagerW failed: {}",
                io::Error::last_os_error()
            )));
        }

        let name = wide(SERVICE_NAME);
        let service = OpenServiceW(scm, name.as_ptr(), SERVICE_ALL_ACCESS);
        let result = if service.is_null() {
            Err(PlatformError::Service(
                "service is not installed".to_string(),
            ))
        } else {
            let ok = StartServiceW(service, 0, ptr::null_mut());
            CloseServiceHandle(service);
            if ok == 0 {
                Err(PlatformError::Service(format!(
                    "StartServiceW failed: {}",
                    io::Error::last_os_error()
                )))
            } else {
                Ok(())
            }
        };

        CloseServiceHandle(scm);
        result
    }
}
