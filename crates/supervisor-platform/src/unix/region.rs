use std::ffi::CString;
use std::io;
use std::ptr;
use std::thread;
use std::time::{Duration, Instant};

use supervisor_protocol::Exchange;

use crate::{PlatformError, Region};

/// A mapped Exchange region backed by a POSIX shared-memory object
/// (`shm_open`/`mmap`). `owns_object` tracks whether this handle created the
/// object (and should `shm_unlink` it on drop) or merely attached to one a
/// Supervisor instance already owns.
pub struct ShmRegion {
    ptr: *mut Exchange,
    len: usize,
    name: CString,
    owns_object: bool,
}

// The Exchange fields are all atomics; sharing `*mut Exchange` across
// threads through this handle is as safe as sharing `&Exchange` would be.
unsafe impl Send for ShmRegion {}
unsafe impl Sync for ShmRegion {}

impl Region for ShmRegion {
    fn exchange(&self) -> &Exchange {
        unsafe { &*self.ptr }
    }
}

impl Drop for ShmRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
        if self.owns_object {
            unsafe {
                libc::shm_unlink(self.name.as_ptr());
            }
        }
    }
}

/// How often `open` re-checks liveness while waiting out the deadline.
const LIVENESS_POLL_INTERVAL: Duration = Duration::from_millis(10);

fn to_cstring(name: &str) -> CString {
    CString::new(name.as_bytes()).expect("region name must not contain NUL bytes")
}

pub fn create(name: &str) -> Result<Box<dyn Region>, PlatformError> {
    let cname = to_cstring(name);
    let len = std::mem::size_of::<Exchange>();

    // Clear out any stale object left behind by a prior crash before
    // creating our own, matching the teacher's "replace, don't inherit
    // uncertain state" instinct for IPC resources.
    unsafe {
        libc::shm_unlink(cname.as_ptr());
    }

    // Read+write for all local users, deny guests/anonymous: the region
    // must be usable by an unprivileged frontend, not just the Supervisor
    // itself. A restrictive process umask would otherwise strip the
    // group/other bits back off 0666, so clear it for the call.
    let previous_umask = unsafe { libc::umask(0) };
    let fd = unsafe {
        libc::shm_open(
            cname.as_ptr(),
            libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
            0o666,
        )
    };
    unsafe {
        libc::umask(previous_umask);
    }
    if fd < 0 {
        return Err(PlatformError::CreateRegion {
            name: name.to_string(),
            source: io::Error::last_os_error(),
        });
    }

    let map = map_and_init(fd, len, name, true);
    unsafe {
        libc::close(fd);
    }
    map
}

pub fn open(name: &str, liveness_deadline_ms: u64) -> Result<Box<dyn Region>, PlatformError> {
    let cname = to_cstring(name);
    let len = std::mem::size_of::<Exchange>();

    let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDWR, 0o666) };
    if fd < 0 {
        return Err(PlatformError::OpenRegion {
            name: name.to_string(),
            source: io::Error::last_os_error(),
        });
    }

    let result = attach(fd, len, name, false);
    unsafe {
        libc::close(fd);
    }
    let region = result?;

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

fn map_and_init(
    fd: libc::c_int,
    len: usize,
    name: &str,
    owns_object: bool,
) -> Result<Box<dyn Region>, PlatformError> {
    if unsafe { libc::ftruncate(fd, len as libc::off_t) } != 0 {
        return Err(PlatformError::CreateRegion {
            name: name.to_string(),
            source: io::Error::last_os_error(),
        });
    }

    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(PlatformError::CreateRegion {
            name: name.to_string(),
            source: io::Error::last_os_error(),
        });
    }

    let exchange_ptr = ptr as *mut Exchange;
    unsafe {
        Exchange::zero(exchange_ptr);
    }

    Ok(Box::new(ShmRegion {
        ptr: exchange_ptr,
        len,
        name: to_cstring(name),
        owns_object,
    }))
}

fn attach(
    fd: libc::c_int,
    len: usize,
    name: &str,
    owns_object: bool,
) -> Result<Box<dyn Region>, PlatformError> {
    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(PlatformError::OpenRegion {
            name: name.to_string(),
            source: io::Error::last_os_error(),
        });
    }

    Ok(Box::new(ShmRegion {
        ptr: ptr as *mut Exchange,
        len,
        name: to_cstring(name),
        owns_object,
    }))
}
