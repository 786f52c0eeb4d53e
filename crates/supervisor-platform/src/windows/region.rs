use std::io;
use std::ptr;
use std::thread;
use std::time::{Duration, Instant};

use winapi::shared::minwindef::DWORD;
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::memoryapi::{MapViewOfFile, UnmapViewOfFile, FILE_MAP_ALL_ACCESS};
use winapi::um::winbase::CreateFileMappingW;
use winapi::um::winnt::PAGE_READWRITE;

use supervisor_protocol::Exchange;

use crate::{PlatformError, Region};

/// Security descriptor string granting full control to authenticated users
/// and local system while denying anonymous/guest access -- the same
/// policy shlaunch.c applies to its named mapping so that an unprivileged
/// frontend client can still read and write the Exchange, but an anonymous
/// network logon cannot.
const SDDL: &str = "D:(A;;GA;;;AU)(A;;GA;;;SY)";

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

pub struct MappedRegion {
    view: *mut Exchange,
    mapping: winapi::shared::ntdef::HANDLE,
}

unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}

impl Region for MappedRegion {
    fn exchange(&self) -> &Exchange {
        unsafe { &*self.view }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        unsafe {
            UnmapViewOfFile(self.view as *mut _);
            CloseHandle(self.mapping);
        }
    }
}

fn security_attributes(sddl: &str) -> winapi::um::minwinbase::SECURITY_ATTRIBUTES {
    use winapi::um::securitybaseapi::ConvertStringSecurityDescriptorToSecurityDescriptorW;
    use winapi::um::winnt::SECURITY_DESCRIPTOR;

    let mut descriptor: *mut SECURITY_DESCRIPTOR = ptr::null_mut();
    let wide_sddl = wide(sddl);
    unsafe {
        ConvertStringSecurityDescriptorToSecurityDescriptorW(
            wide_sddl.as_ptr(),
            1,
            &mut descriptor as *mut _ as *mut _,
            ptr::null_mut(),
        );
    }

    winapi::um::minwinbase::SECURITY_ATTRIBUTES {
        nLength: std::mem::size_of::<winapi::um::minwinbase::SECURITY_ATTRIBUTES>() as DWORD,
        lpSecurityDescriptor: descriptor as *mut _,
        bInheritHandle: 0,
    }
}

pub fn create(name: &str) -> Result<Box<dyn Region>, PlatformError> {
    let len = std::mem::size_of::<Exchange>() as u64;
    let mut sa = security_attributes(SDDL);
    let wide_name = wide(name);

    let mapping = unsafe {
        CreateFileMappingW(
            INVALID_HANDLE_VALUE,
            &mut sa,
            PAGE_READWRITE,
            (len >> 32) as DWORD,
            (len & 0xffff_ffff) as DWORD,
            wide_name.as_ptr(),
        )
    };
    if mapping.is_null() {
        return Err(PlatformError::CreateRegion {
            name: name.to_string(),
            source: io::Error::last_os_error(),
        });
    }

    map_view(mapping, name, true)
}

/// How often `open` re-checks liveness while waiting out the deadline.
const LIVENESS_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub fn open(name: &str, liveness_deadline_ms: u64) -> Result<Box<dyn Region>, PlatformError> {
    use winapi::um::memoryapi::OpenFileMappingW;

    let wide_name = wide(name);
    let mapping = unsafe { OpenFileMappingW(FILE_MAP_ALL_ACCESS, 0, wide_name.as_ptr()) };
    if mapping.is_null() {
        return Err(PlatformError::OpenRegion {
            name: name.to_string(),
            source: io::Error::last_os_error(),
        });
    }

    let region = map_view(mapping, name, false)?;
    wait_until_live(region.exchange(), name, liveness_deadline_ms)?;
    Ok(region)
}

/// Polls `size == expected && cycles advanced` until `deadline_ms`
/// elapses. A client must never observe a region as live while the
/// Supervisor is still mid-initialization.
fn wait_until_live(exchange: &Exchange, name: &str, deadline_ms: u64) -> Result<(), PlatformError> {
    let deadline = Instant::now() + Duration::from_millis(deadline_ms);
    loop {
        if exchange.is_live() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(PlatformError::NotReady {
                name: name.to_string(),
            });
        }
        thread::sleep(LIVENESS_POLL_INTERVAL);
    }
}

fn map_view(
    mapping: winapi::shared::ntdef::HANDLE,
    name: &str,
    zero_on_init: bool,
) -> Result<Box<dyn Region>, PlatformError> {
    let view = unsafe {
        MapViewOfFile(
            mapping,
            FILE_MAP_ALL_ACCESS,
            0,
            0,
            std::mem::size_of::<Exchange>(),
        )
    };
    if view.is_null() {
        unsafe {
            CloseHandle(mapping);
        }
        return Err(PlatformError::CreateRegion {
            name: name.to_string(),
            source: io::Error::last_os_error(),
        });
    }

    let exchange_ptr = view as *mut Exchange;
    if zero_on_init {
        unsafe {
            Exchange::zero(exchange_ptr);
        }
    }

    Ok(Box::new(MappedRegion {
        view: exchange_ptr,
        mapping,
    }))
}
