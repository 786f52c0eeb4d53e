use std::sync::atomic::{AtomicBool, Ordering};

use winapi::shared::minwindef::{BOOL, DWORD, TRUE};
use winapi::um::wincon::{SetConsoleCtrlHandler, CTRL_CLOSE_EVENT, CTRL_C_EVENT, CTRL_SHUTDOWN_EVENT};

static TERMINATE_REQUESTED: AtomicBool = AtomicBool::new(false);

unsafe extern "system" fn handler(ctrl_type: DWORD) -> BOOL {
    match ctrl_type {
        CTRL_C_EVENT | CTRL_CLOSE_EVENT | CTRL_SHUTDOWN_EVENT => {
            TERMINATE_REQUESTED.store(true, Ordering::Relaxed);
            TRUE
        }
        _ => 0,
    }
}

pub fn install() {
    unsafe {
        SetConsoleCtrlHandler(Some(handler), TRUE);
    }
}

pub fn terminate_requested() -> bool {
    TERMINATE_REQUESTED.load(Ordering::Relaxed)
}
