use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Launch Supervisor command line.
///
/// Two forms run the Control Loop directly: a bare invocation (service-host
/// mode, falls back to running in the foreground on platforms without a
/// native service dispatcher) and `<build-tag>` alone (explicit foreground
/// run). Everything else is a one-shot operation against the host service
/// manager.
#[derive(Parser, Debug)]
#[command(name = "launch-supervisor", version, disable_help_subcommand = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Build tag identifying this binary; must match the compiled-in tag.
    pub build_tag: Option<String>,

    /// Disable the autostart-at-boot configuration override for this run.
    #[arg(long)]
    pub no_autostart: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register with the host service manager.
    Install,
    /// Unregister from the host service manager.
    Remove,
    /// Ask the host service manager to start the Supervisor.
    Start {
        #[arg(long)]
        no_autostart: bool,
    },
    /// Request a graceful stop of the running Supervisor.
    Shutdown,
    /// Install-time activation: write the service descriptor, kill any
    /// remaining backend-family processes, and prepare the data directory.
    Activate {
        build_tag: String,
        no_kill_pid: u32,
        local_data_dir: PathBuf,
        uid: u32,
        username: String,
        /// Gates the compatibility-only walk of local user accounts
        /// looking for a pre-existing per-user data directory to migrate.
        #[arg(long)]
        migrate_user_data_dir: bool,
    },
}
