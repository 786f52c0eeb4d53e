//! The on-the-wire layout of the Exchange: the single shared-memory
//! structure through which the Launch Supervisor and its frontend clients
//! rendezvous.
//!
//! This crate has no knowledge of *how* the backing region is created or
//! mapped (that's `supervisor-platform`); it only defines the struct layout,
//! the handful of compile-time constants clients need to find the region,
//! and the atomic read/modify/write helpers that make the concurrent fields
//! safe to touch from multiple processes at once.
//!
//! Field layout is grounded in the original `struct Exchange` this project's
//! control surface is compatible with in spirit (size/cycles/processId/
//! status/launchProcessId/launch/shutdown/build/dataDir, in that order).
//! Unlike the original's `#pragma pack(push, 1)` layout, this struct uses
//! natural (`repr(C)`) alignment: atomic instructions require aligned
//! operands on every platform we target, and packing the struct would make
//! the atomic fields unaligned UB. Clients on the wire only ever need the
//! field values, never the raw byte offsets, so this is not observable
//! outside this crate.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

/// Name of the Exchange shared-memory object on Unix-like platforms.
/// Arbitrary high-entropy token, chosen once and never to collide with
/// another product's shared memory.
pub const EXCHANGE_NAME_UNIX: &str = "/sv-launch-exchange-fed45fe4e41b7695";

/// Name of the Exchange file mapping on Windows.
pub const EXCHANGE_NAME_WINDOWS: &str = "Global\\sv-launch-exchange-fed45fe4e41b7695";

/// Low 16 bits of `launch`: any non-zero value means "launch requested".
pub const LAUNCH_MASK: i32 = 0x0000_ffff;

/// Bit 16 of `launch`: kill any running backend-family processes first.
pub const LAUNCH_FLAG_KILL_FIRST: i32 = 0x0001_0000;

/// Length in bytes of the NUL-padded build-tag field.
pub const BUILD_TAG_LEN: usize = 8;

/// Length in bytes of the UTF-8 data-directory field. Sized generously
/// above typical `MAX_PATH`/`PATH_MAX` so a real install path always fits.
pub const DATA_DIR_LEN: usize = 1024;

/// Executable basenames (case-insensitive) the Reaper is allowed to
/// terminate. This is the "backend family."
pub const BACKEND_FAMILY: &[&str] = &["backend-worker", "backend-worker-debug"];

/// Returns true if `name` case-insensitively matches a backend-family
/// executable name.
pub fn is_backend_family(name: &str) -> bool {
    BACKEND_FAMILY
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(name))
}

/// The exchange region poll cadence used both by the Control Loop and by
/// clients waiting for readiness.
pub const POLL_PERIOD_MS: u64 = 100;

/// How long a client will wait for `open()` to observe a live Exchange.
pub const LIVENESS_DEADLINE_MS: u64 = 5_000;

/// A decoded `launch` control word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchWord {
    /// Low 16 bits. Any non-zero value means "launch requested"; the exact
    /// value carries no further meaning to the Supervisor, it is an opaque
    /// client-chosen code.
    pub code: u16,
    /// Bit 16: terminate any running backend-family processes before
    /// launching.
    pub kill_first: bool,
}

impl LaunchWord {
    pub fn decode(word: i32) -> Self {
        LaunchWord {
            code: (word & LAUNCH_MASK) as u16,
            kill_first: word & LAUNCH_FLAG_KILL_FIRST != 0,
        }
    }

    pub fn encode(code: u16, kill_first: bool) -> i32 {
        let mut word = code as i32 & LAUNCH_MASK;
        if kill_first {
            word |= LAUNCH_FLAG_KILL_FIRST;
        }
        word
    }

    pub fn wants_launch(&self) -> bool {
        self.code != 0
    }
}

/// The shared-memory control surface. `size`, `process_id`, `build` and
/// `data_dir` are single-writer-per-field: only the Supervisor ever writes
/// them, during `Exchange::init`. `launch`, `status`, `shutdown` and
/// `launch_process_id` are read-modify-written by multiple untrusted
/// processes and are the only atomic fields.
#[repr(C)]
pub struct Exchange {
    /// Byte size of this structure. Zero (or any value other than
    /// `Exchange::EXPECTED_SIZE`) until the Supervisor finishes
    /// initialization; this is the first half of the readiness check.
    size: AtomicU32,
    /// Heartbeat, incremented once per Control Loop iteration. An ordinary
    /// (non-atomic in intent, but stored atomically here purely to make
    /// cross-process reads well-defined under Rust's memory model) counter:
    /// clients only ever use it as a liveness hint, never for
    /// synchronization.
    cycles: AtomicU32,
    /// PID of the current Supervisor process.
    process_id: AtomicU32,
    /// 0 = no backend known launched; non-zero = last launch word
    /// acknowledged.
    status: AtomicI32,
    /// PID of the client that wrote the most recent launch command.
    launch_process_id: AtomicI32,
    /// Control word. See `LaunchWord`.
    launch: AtomicI32,
    /// 0 while the Supervisor runs; set to 1 on stop, cleared to 0 by a
    /// backend once it has observed the shutdown request.
    shutdown: AtomicI32,
    /// NUL-padded build tag.
    build: [std::sync::atomic::AtomicU8; BUILD_TAG_LEN],
    /// NUL-padded, UTF-8 encoded data directory path.
    data_dir: [std::sync::atomic::AtomicU8; DATA_DIR_LEN],
}

impl Exchange {
    /// Expected value of `size` once initialization completes. Because the
    /// `build`/`data_dir` arrays are `AtomicU8`, this is identical to
    /// `size_of::<Exchange>()`; atomics of a given width have the same size
    /// and alignment as the plain integer type they wrap.
    pub const EXPECTED_SIZE: u32 = std::mem::size_of::<Exchange>() as u32;

    /// Zero out every field. Used by the region owner immediately after
    /// mapping a freshly created region, before publishing `size`.
    ///
    /// # Safety
    /// The caller must hold exclusive access to the region (i.e. this must
    /// run before any other process can have attached to it).
    pub unsafe fn zero(ptr: *mut Exchange) {
        std::ptr::write_bytes(ptr as *mut u8, 0, std::mem::size_of::<Exchange>());
    }

    /// Supervisor-only: publish identity fields and finally `size`, which
    /// acts as the release fence clients poll on. Must be called exactly
    /// once, right after `zero`.
    pub fn init(&self, process_id: u32, build_tag: &str, data_dir: &str) {
        self.process_id.store(process_id, Ordering::Relaxed);
        write_fixed_str(&self.build, build_tag);
        write_fixed_str(&self.data_dir, data_dir);
        // Release: every plain write above must be visible to any process
        // that subsequently observes `size == EXPECTED_SIZE`.
        self.size.store(Self::EXPECTED_SIZE, Ordering::Release);
    }

    /// First half of the readiness check: has the Supervisor finished
    /// initializing this region?
    pub fn is_sized(&self) -> bool {
        self.size.load(Ordering::Acquire) == Self::EXPECTED_SIZE
    }

    /// Second half of the readiness check: has the Supervisor advanced the
    /// heartbeat at least once since the region was sized?
    pub fn is_live(&self) -> bool {
        self.is_sized() && self.cycles.load(Ordering::Relaxed) > 0
    }

    pub fn process_id(&self) -> u32 {
        self.process_id.load(Ordering::Relaxed)
    }

    pub fn cycles(&self) -> u32 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn increment_cycles(&self) -> u32 {
        self.cycles.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn build_tag(&self) -> String {
        read_fixed_str(&self.build)
    }

    pub fn data_dir(&self) -> String {
        read_fixed_str(&self.data_dir)
    }

    /// Atomically read and clear the launch word. This is the Control
    /// Loop's consumption point: whoever calls this "owns" the command for
    /// this cycle.
    pub fn take_launch(&self) -> LaunchWord {
        LaunchWord::decode(self.launch.swap(0, Ordering::AcqRel))
    }

    /// Peek at the launch word without consuming it. Used by clients
    /// polling to see whether their command was picked up yet.
    pub fn peek_launch(&self) -> i32 {
        self.launch.load(Ordering::Acquire)
    }

    /// Client-side: write a new launch command, racing with any other
    /// client. Last write wins; there is intentionally no queue.
    pub fn request_launch(&self, code: u16, kill_first: bool, requester_pid: u32) {
        self.launch_process_id
            .store(requester_pid as i32, Ordering::Release);
        self.launch
            .store(LaunchWord::encode(code, kill_first), Ordering::Release);
    }

    pub fn launch_process_id(&self) -> i32 {
        self.launch_process_id.load(Ordering::Acquire)
    }

    /// Clear only the "kill first" bit, leaving any newer launch code that
    /// may have raced in since `take_launch` intact.
    pub fn clear_kill_flag(&self) {
        self.launch
            .fetch_and(!LAUNCH_FLAG_KILL_FIRST, Ordering::AcqRel);
    }

    /// Clear only the low 16 launch-code bits.
    pub fn clear_launch_code(&self) {
        self.launch.fetch_and(!LAUNCH_MASK, Ordering::AcqRel);
    }

    pub fn set_status(&self, value: i32) {
        self.status.store(value, Ordering::Release);
    }

    pub fn status(&self) -> i32 {
        self.status.load(Ordering::Acquire)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire) != 0
    }

    /// Supervisor-only: announce shutdown to all attached backends.
    pub fn request_shutdown(&self) {
        self.shutdown.store(1, Ordering::Release);
    }

    /// Backend-only: acknowledge the shutdown request.
    pub fn acknowledge_shutdown(&self) {
        self.shutdown.store(0, Ordering::Release);
    }
}

fn write_fixed_str(field: &[std::sync::atomic::AtomicU8], value: &str) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(field.len() - 1);
    for (slot, byte) in field.iter().zip(bytes[..len].iter()) {
        slot.store(*byte, Ordering::Relaxed);
    }
    for slot in &field[len..] {
        slot.store(0, Ordering::Relaxed);
    }
}

fn read_fixed_str(field: &[std::sync::atomic::AtomicU8]) -> String {
    let mut bytes = Vec::with_capacity(field.len());
    for slot in field {
        let b = slot.load(Ordering::Relaxed);
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_word_round_trips_code_and_flag() {
        let word = LaunchWord::encode(0x2a, true);
        let decoded = LaunchWord::decode(word);
        assert_eq!(decoded.code, 0x2a);
        assert!(decoded.kill_first);
        assert!(decoded.wants_launch());
    }

    #[test]
    fn launch_word_zero_code_is_not_a_launch() {
        let decoded = LaunchWord::decode(LaunchWord::encode(0, true));
        assert!(!decoded.wants_launch());
        assert!(decoded.kill_first);
    }

    #[test]
    fn backend_family_matches_are_case_insensitive() {
        assert!(is_backend_family("Backend-Worker"));
        assert!(is_backend_family("BACKEND-WORKER-DEBUG"));
        assert!(!is_backend_family("notepad"));
    }

    #[test]
    fn fixed_str_round_trips_through_exchange() {
        let mut boxed = Box::new(unsafe { std::mem::zeroed::<Exchange>() });
        unsafe { Exchange::zero(boxed.as_mut() as *mut Exchange) };
        boxed.init(4242, "abcdefgh", "/var/lib/launch-supervisor");
        assert!(boxed.is_sized());
        assert_eq!(boxed.process_id(), 4242);
        assert_eq!(boxed.build_tag(), "abcdefgh");
        assert_eq!(boxed.data_dir(), "/var/lib/launch-supervisor");
    }

    #[test]
    fn take_launch_consumes_and_resets_to_zero() {
        let mut boxed = Box::new(unsafe { std::mem::zeroed::<Exchange>() });
        unsafe { Exchange::zero(boxed.as_mut() as *mut Exchange) };
        boxed.request_launch(7, true, 999);
        let decoded = boxed.take_launch();
        assert_eq!(decoded.code, 7);
        assert!(decoded.kill_first);
        assert_eq!(boxed.peek_launch(), 0);
        assert_eq!(boxed.launch_process_id(), 999);
    }

    #[test]
    fn clear_kill_flag_preserves_a_racing_newer_code() {
        let mut boxed = Box::new(unsafe { std::mem::zeroed::<Exchange>() });
        unsafe { Exchange::zero(boxed.as_mut() as *mut Exchange) };
        boxed.request_launch(1, true, 1);
        // Simulate a second client racing in a new code after the kill
        // flag was observed but before it was cleared.
        boxed.launch.fetch_or(LaunchWord::encode(2, false), Ordering::AcqRel);
        boxed.clear_kill_flag();
        let remaining = LaunchWord::decode(boxed.peek_launch());
        assert!(!remaining.kill_first);
        assert_eq!(remaining.code & 2, 2);
    }
}
