use std::path::PathBuf;
use std::time::{Duration, Instant};

use supervisor_platform::Platform;
use supervisor_protocol::{is_backend_family, Exchange, LaunchWord, EXCHANGE_NAME_UNIX, POLL_PERIOD_MS};

use crate::error::SupervisorError;
use crate::logger::RotatingLogger;
use crate::reaper;
use crate::{config, launcher};

/// How many kill-and-wait cycles the startup and kill-first passes are
/// allowed before giving up and logging (never fatal, per the Reaper's
/// failure semantics).
const KILL_RETRIES: u32 = 10;
const KILL_WAIT: Duration = Duration::from_millis(200);

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_secs(2);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// A synthetic launch code the Control Loop writes to itself on startup
/// when configuration says the backend should autostart. Any non-zero low
/// 16 bits means "launch"; the exact value carries no meaning beyond that.
const AUTOSTART_LAUNCH_CODE: u16 = 1;

pub struct RunContext {
    pub build_tag: String,
    pub data_dir: PathBuf,
    pub run_as_user: String,
    pub no_autostart: bool,
}

/// One-line, human-readable summary of the Exchange state used to decide
/// whether a new line is worth logging. Deliberately excludes `cycles`:
/// the heartbeat changes every iteration and would make every snapshot
/// look "different".
#[derive(Debug, Clone, PartialEq, Eq)]
struct Snapshot {
    process_id: u32,
    status: i32,
    launch: i32,
    launch_process_id: i32,
    shutdown: i32,
    build: String,
}

impl Snapshot {
    fn capture(exchange: &Exchange) -> Self {
        Snapshot {
            process_id: exchange.process_id(),
            status: exchange.status(),
            launch: exchange.peek_launch(),
            launch_process_id: exchange.launch_process_id(),
            shutdown: exchange.is_shutting_down() as i32,
            build: exchange.build_tag(),
        }
    }
}

/// Runs the Starting -> Running -> Stopping -> Stopped state machine.
/// Returns the process exit code on a clean shutdown; platform-level
/// failures that can't be recovered surface as `Err`.
pub fn run(
    platform: &dyn Platform,
    ctx: RunContext,
    logger: &RotatingLogger,
) -> Result<i32, SupervisorError> {
    platform.install_signal_handler();

    // Starting: claim the Exchange, write identity fields, reap any
    // already-running backend-family siblings before this instance takes
    // over.
    let region = platform.create_region(EXCHANGE_NAME_UNIX)?;
    let exchange = region.exchange();

    let pid = platform.current_pid();
    let parent_pid = platform.parent_pid();
    exchange.init(pid, &ctx.build_tag, &ctx.data_dir.to_string_lossy());

    logger.info(&format!(
        "supervisor starting: pid={pid} build={}",
        ctx.build_tag
    ));

    if let Err(e) = reaper::kill_named_until_empty(platform, &[pid, parent_pid], KILL_RETRIES, KILL_WAIT) {
        logger.error(&format!("startup kill pass did not fully converge: {e}"));
    }

    let startup_config = config::load(&ctx.data_dir);
    if !ctx.no_autostart && startup_config.autostart && startup_config.backend {
        exchange.request_launch(AUTOSTART_LAUNCH_CODE, false, pid as i32);
    }

    let mut last_snapshot: Option<Snapshot> = None;

    // Running.
    loop {
        exchange.increment_cycles();

        let snapshot = Snapshot::capture(exchange);
        if last_snapshot.as_ref() != Some(&snapshot) {
            logger.info(&format!("{snapshot:?}"));
            last_snapshot = Some(snapshot);
        }

        if !platform.own_executable_exists() {
            logger.info("own executable no longer present on disk, retiring");
            if let Err(e) = platform.remove_service() {
                logger.error(&format!("could not remove service descriptor: {e}"));
            }
            break;
        }

        if platform.terminate_requested() {
            logger.info("terminate requested, entering shutdown");
            break;
        }

        let launch_word = exchange.take_launch();
        let source_pid = exchange.launch_process_id();
        let mut exclude = vec![pid, parent_pid];
        if source_pid > 0 {
            exclude.push(source_pid as u32);
        }

        handle_launch_word(platform, &exchange, &ctx, launch_word, &exclude, logger);

        std::thread::sleep(Duration::from_millis(POLL_PERIOD_MS));
        platform.reap_children();
    }

    // Stopping.
    exchange.request_shutdown();
    let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
    loop {
        let still_running = match platform.enumerate_processes() {
            Ok(procs) => procs.iter().any(|p| is_backend_family(&p.exe_name)),
            Err(_) => false,
        };
        if !still_running || Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(SHUTDOWN_POLL_INTERVAL);
    }

    logger.info("stopped");
    Ok(0)
}

fn handle_launch_word(
    platform: &dyn Platform,
    exchange: &Exchange,
    ctx: &RunContext,
    launch_word: LaunchWord,
    exclude: &[u32],
    logger: &RotatingLogger,
) {
    if launch_word.kill_first {
        if let Err(e) = reaper::kill_named_until_empty(platform, exclude, KILL_RETRIES, KILL_WAIT) {
            logger.error(&format!("kill-first pass did not fully converge: {e}"));
        }
    }

    if launch_word.wants_launch() {
        let config = config::load(&ctx.data_dir);
        if config.backend {
            match launcher::launch_backend(platform, &ctx.data_dir, &ctx.build_tag, &ctx.run_as_user) {
                Ok(child_pid) => {
                    logger.info(&format!("launched backend, pid={child_pid}"));
                    exchange.set_status(1);
                }
                Err(e) => {
                    logger.error(&format!("backend launch failed: {e}"));
                    exchange.set_status(0);
                }
            }
        } else {
            logger.info("launch requested but backend is disabled in config");
            exchange.set_status(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use supervisor_platform::{PlatformError, ProcessInfo, Region, ServiceDescriptor};
    use supervisor_protocol::Exchange as ExchangeType;

    struct InProcessRegion {
        exchange: Box<ExchangeType>,
    }

    impl Region for InProcessRegion {
        fn exchange(&self) -> &ExchangeType {
            &self.exchange
        }
    }

    struct FakePlatform {
        processes: RefCell<Vec<ProcessInfo>>,
        own_exe_exists: AtomicBool,
        terminate: AtomicBool,
        spawned: RefCell<Vec<PathBuf>>,
    }

    impl FakePlatform {
        fn new() -> Self {
            FakePlatform {
                processes: RefCell::new(Vec::new()),
                own_exe_exists: AtomicBool::new(true),
                terminate: AtomicBool::new(false),
                spawned: RefCell::new(Vec::new()),
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
            self.processes.borrow_mut().retain(|p| p.pid != pid);
            Ok(())
        }
        fn reap_children(&self) {}
        fn create_region(&self, _name: &str) -> Result<Box<dyn Region>, PlatformError> {
            let boxed: Box<ExchangeType> = unsafe {
                let layout = std::alloc::Layout::new::<ExchangeType>();
                let ptr = std::alloc::alloc(layout) as *mut ExchangeType;
                ExchangeType::zero(ptr);
                Box::from_raw(ptr)
            };
            Ok(Box::new(InProcessRegion { exchange: boxed }))
        }
        fn open_region(
            &self,
            name: &str,
            _liveness_deadline_ms: u64,
        ) -> Result<Box<dyn Region>, PlatformError> {
            self.create_region(name)
        }
        fn resolve_data_dir(&self, _migrate: bool) -> Result<PathBuf, PlatformError> {
            unimplemented!()
        }
        fn spawn_detached(
            &self,
            exe: &Path,
            _args: &[String],
            _env: &HashMap<String, String>,
        ) -> Result<u32, PlatformError> {
            self.spawned.borrow_mut().push(exe.to_path_buf());
            Ok(4242)
        }
        fn home_dir_for_user(&self, _user: &str) -> Option<PathBuf> {
            None
        }
        fn install_service(&self, _descriptor: &ServiceDescriptor) -> Result<(), PlatformError> {
            unimplemented!()
        }
        fn remove_service(&self) -> Result<(), PlatformError> {
            Ok(())
        }
        fn start_service(&self) -> Result<(), PlatformError> {
            unimplemented!()
        }
        fn install_signal_handler(&self) {}
        fn terminate_requested(&self) -> bool {
            self.terminate.load(Ordering::Relaxed)
        }
        fn own_executable_exists(&self) -> bool {
            self.own_exe_exists.load(Ordering::Relaxed)
        }
    }

    #[test]
    fn retires_immediately_when_own_executable_is_gone() {
        let platform = FakePlatform::new();
        platform.own_exe_exists.store(false, Ordering::Relaxed);

        let dir = tempfile::tempdir().unwrap();
        let logger = RotatingLogger::new(dir.path(), "launch-supervisor", 1);
        let ctx = RunContext {
            build_tag: "lsup0001".to_string(),
            data_dir: dir.path().to_path_buf(),
            run_as_user: "nobody".to_string(),
            no_autostart: true,
        };

        let exit_code = run(&platform, ctx, &logger).unwrap();
        assert_eq!(exit_code, 0);
    }

    #[test]
    fn terminate_request_leads_to_clean_shutdown() {
        let platform = FakePlatform::new();
        platform.terminate.store(true, Ordering::Relaxed);

        let dir = tempfile::tempdir().unwrap();
        let logger = RotatingLogger::new(dir.path(), "launch-supervisor", 1);
        let ctx = RunContext {
            build_tag: "lsup0001".to_string(),
            data_dir: dir.path().to_path_buf(),
            run_as_user: "nobody".to_string(),
            no_autostart: true,
        };

        let exit_code = run(&platform, ctx, &logger).unwrap();
        assert_eq!(exit_code, 0);
    }
}
