use std::sync::atomic::{AtomicBool, Ordering};

static TERMINATE_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_terminate(_sig: libc::c_int) {
    // Signal-safe: only a relaxed store to a static flag, nothing else.
    // The Control Loop observes it on its own schedule and does the actual
    // shutdown work outside of signal context.
    TERMINATE_REQUESTED.store(true, Ordering::Relaxed);
}

pub fn install() {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handle_terminate as usize;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = 0;

        libc::sigaction(libc::SIGTERM, &action, std::ptr::null_mut());
        libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut());
        libc::sigaction(libc::SIGHUP, &action, std::ptr::null_mut());
    }
}

pub fn terminate_requested() -> bool {
    TERMINATE_REQUESTED.load(Ordering::Relaxed)
}
