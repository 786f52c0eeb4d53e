mod cli;
mod config;
mod control_loop;
mod error;
mod launcher;
mod logger;
mod reaper;

use std::time::Duration;

use clap::Parser;
use supervisor_platform::{CurrentPlatform, Platform, ServiceDescriptor};
use supervisor_protocol::{EXCHANGE_NAME_UNIX, LIVENESS_DEADLINE_MS};

use cli::{Cli, Command};
use error::SupervisorError;
use logger::RotatingLogger;

/// Compiled-in build tag. Callers must pass this exact value as the
/// activation/run build tag; a mismatch means an old client is talking to a
/// new service binary that may disagree about the Exchange layout.
const BUILD_TAG: &str = "lsup0001";

const ACTIVATE_KILL_RETRIES: u32 = 20;
const ACTIVATE_KILL_WAIT: Duration = Duration::from_millis(500);

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let platform = CurrentPlatform::new();

    match dispatch(&cli, &platform) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            log::error!("{e}");
            eprintln!("launch-supervisor: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

fn dispatch(cli: &Cli, platform: &dyn Platform) -> Result<i32, SupervisorError> {
    match &cli.command {
        Some(Command::Install) => install(platform),
        Some(Command::Remove) => remove(platform),
        Some(Command::Start { .. }) => start(platform),
        Some(Command::Shutdown) => shutdown(platform),
        Some(Command::Activate {
            build_tag,
            no_kill_pid,
            local_data_dir,
            uid: _,
            username,
            migrate_user_data_dir,
        }) => activate(
            platform,
            build_tag,
            *no_kill_pid,
            local_data_dir,
            username,
            *migrate_user_data_dir,
        ),
        None => run_foreground(cli, platform),
    }
}

/// Bare invocation (service-host mode, falling back to running in the
/// foreground since this repository wires no native service dispatcher
/// loop) and `<build-tag>` alone both land here.
fn run_foreground(cli: &Cli, platform: &dyn Platform) -> Result<i32, SupervisorError> {
    let build_tag = match &cli.build_tag {
        Some(given) if given == BUILD_TAG => given.clone(),
        Some(given) => {
            return Err(SupervisorError::BuildMismatch {
                expected: BUILD_TAG.to_string(),
                got: given.clone(),
            })
        }
        None => BUILD_TAG.to_string(),
    };

    let data_dir = platform
        .resolve_data_dir(false)
        .map_err(|e| SupervisorError::DataDir(e.to_string()))?;
    let logger = RotatingLogger::new(&data_dir, "launch-supervisor", platform.current_pid());

    let ctx = control_loop::RunContext {
        build_tag,
        data_dir,
        run_as_user: current_username(),
        no_autostart: cli.no_autostart,
    };

    control_loop::run(platform, ctx, &logger)
}

fn install(platform: &dyn Platform) -> Result<i32, SupervisorError> {
    platform
        .install_service(&descriptor_for_self(BUILD_TAG, &current_username())?)
        .map_err(|e| SupervisorError::Activate(e.to_string()))?;
    Ok(0)
}

fn remove(platform: &dyn Platform) -> Result<i32, SupervisorError> {
    platform
        .remove_service()
        .map_err(|e| SupervisorError::Activate(e.to_string()))?;
    Ok(0)
}

fn start(platform: &dyn Platform) -> Result<i32, SupervisorError> {
    platform
        .start_service()
        .map_err(|e| SupervisorError::Activate(e.to_string()))?;
    Ok(0)
}

/// Translates a CLI-issued stop request into the same internal event a
/// platform service-control callback would raise: find the running
/// Supervisor's PID through the Exchange and signal it.
fn shutdown(platform: &dyn Platform) -> Result<i32, SupervisorError> {
    let region = platform
        .open_region(EXCHANGE_NAME_UNIX, LIVENESS_DEADLINE_MS)
        .map_err(|e| SupervisorError::Activate(e.to_string()))?;
    let pid = region.exchange().process_id();
    platform
        .terminate_process(pid)
        .map_err(|e| SupervisorError::Activate(e.to_string()))?;
    Ok(0)
}

fn activate(
    platform: &dyn Platform,
    build_tag: &str,
    no_kill_pid: u32,
    local_data_dir: &std::path::Path,
    username: &str,
    migrate_user_data_dir: bool,
) -> Result<i32, SupervisorError> {
    if build_tag != BUILD_TAG {
        return Err(SupervisorError::BuildMismatch {
            expected: BUILD_TAG.to_string(),
            got: build_tag.to_string(),
        });
    }

    let pid = platform.current_pid();
    let parent_pid = platform.parent_pid();
    reaper::kill_named_until_empty(
        platform,
        &[pid, parent_pid, no_kill_pid],
        ACTIVATE_KILL_RETRIES,
        ACTIVATE_KILL_WAIT,
    )
    .map_err(|e| SupervisorError::Activate(e.to_string()))?;

    // Honors the explicit migration flag even though this activation also
    // has a caller-supplied local data directory: the global data dir and
    // the per-invocation one are independent concerns.
    platform
        .resolve_data_dir(migrate_user_data_dir)
        .map_err(|e| SupervisorError::DataDir(e.to_string()))?;
    supervisor_platform::ensure_world_writable_dir(local_data_dir)
        .map_err(|e| SupervisorError::DataDir(format!("{}: {e}", local_data_dir.display())))?;

    // Replace any stale Exchange left behind by a previous install.
    let _region = platform
        .create_region(EXCHANGE_NAME_UNIX)
        .map_err(SupervisorError::from)?;

    platform
        .install_service(&descriptor_for_self(build_tag, username)?)
        .map_err(|e| SupervisorError::Activate(e.to_string()))?;

    Ok(0)
}

fn descriptor_for_self(build_tag: &str, username: &str) -> Result<ServiceDescriptor, SupervisorError> {
    Ok(ServiceDescriptor {
        executable_path: std::env::current_exe()
            .map_err(|e| SupervisorError::Activate(format!("resolving own executable path: {e}")))?,
        build_tag: build_tag.to_string(),
        run_as_user: username.to_string(),
    })
}

fn current_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "root".to_string())
}
