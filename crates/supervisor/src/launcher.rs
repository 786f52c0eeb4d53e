use std::collections::HashMap;
use std::path::{Path, PathBuf};

use supervisor_platform::{Platform, PlatformError};
use supervisor_protocol::BACKEND_FAMILY;

/// Opaque identification tags carried in the backend's argv so it shows up
/// recognizably in process listings. They carry no other meaning.
const ARG_BACKEND_FLAG: &str = "--backEnd";

/// Spawns the backend worker detached, never waiting on it. Success means
/// only that the spawn call itself succeeded; the Supervisor never tracks
/// the child's PID afterwards, so a later crash of the backend is only
/// noticed the next time a client asks for a fresh launch.
pub fn launch_backend(
    platform: &dyn Platform,
    data_dir: &Path,
    build_tag: &str,
    run_as_user: &str,
) -> Result<u32, PlatformError> {
    let exe = backend_executable_path();
    let args = vec![
        ARG_BACKEND_FLAG.to_string(),
        data_dir.to_string_lossy().into_owned(),
        build_tag.to_string(),
        "supervised".to_string(),
    ];

    let mut env: HashMap<String, String> = std::env::vars().collect();
    if let Some(home) = platform.home_dir_for_user(run_as_user) {
        env.insert("HOME".to_string(), home.to_string_lossy().into_owned());
    }

    platform.spawn_detached(&exe, &args, &env)
}

fn backend_executable_path() -> PathBuf {
    let dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(BACKEND_FAMILY[0])
}
