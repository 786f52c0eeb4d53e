use std::fs;
use std::io;
use std::process::Command;

use crate::{PlatformError, ServiceDescriptor};

const UNIT_PATH: &str = "/etc/systemd/system/launch-supervisor.service";
const UNIT_NAME: &str = "launch-supervisor.service";

fn unit_contents(descriptor: &ServiceDescriptor) -> String {
    format!(
        "[Unit]\n\
         Description=Launch Supervisor ({build_tag})\n\
         After=network.target\n\
         \n\
         [Service]\n\
         Type=simple\n\
         ExecStart={exe} {build_tag}\n\
         User={user}\n\
         Restart=on-failure\n\
         RestartSec=1\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        build_tag = descriptor.build_tag,
        exe = descriptor.executable_path.display(),
        user = descriptor.run_as_user,
    )
}

pub fn install(descriptor: &ServiceDescriptor) -> Result<(), PlatformError> {
    fs::write(UNIT_PATH, unit_contents(descriptor))
        .map_err(|e| PlatformError::Service(format!("writing {UNIT_PATH}: {e}")))?;

    run_systemctl(&["daemon-reload"])?;
    run_systemctl(&["enable", UNIT_NAME])
}

pub fn remove() -> Result<(), PlatformError> {
    let _ = run_systemctl(&["disable", UNIT_NAME]);
    match fs::remove_file(UNIT_PATH) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(PlatformError::Service(format!("removing {UNIT_PATH}: {e}"))),
    }
    run_systemctl(&["daemon-reload"])
}

pub fn start() -> Result<(), PlatformError> {
    run_systemctl(&["start", UNIT_NAME])
}

fn run_systemctl(args: &[&str]) -> Result<(), PlatformError> {
    let output = Command::new("systemctl")
        .args(args)
        .output()
        .map_err(|e| PlatformError::Service(format!("invoking systemctl {args:?}: {e}")))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(PlatformError::Service(format!(
            "systemctl {args:?} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )))
    }
}
