use supervisor_platform::PlatformError;

/// Top-level error taxonomy. Every variant maps to exactly one process exit
/// code via [`SupervisorError::exit_code`]; `main` is the single place that
/// translates an error into `process::exit`, mirroring the teacher's
/// `components/sup/src/main.rs::main` dispatch instead of scattering
/// `process::exit` calls through the call stack.
///
/// The two build flavors this repository is descended from used colliding
/// exit codes 4-7 for different meanings. The mapping below is the unified
/// resolution; see the exit-code table in DESIGN.md for the rationale.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("{0}")]
    Args(String),

    #[error("build tag mismatch: expected {expected}, got {got}")]
    BuildMismatch { expected: String, got: String },

    #[error("shared-memory setup failed: {0}")]
    SharedMemory(#[from] PlatformError),

    #[error("activation failed: {0}")]
    Activate(String),

    #[error("could not resolve the data directory: {0}")]
    DataDir(String),

    #[error("could not drop privileges to the configured user: {0}")]
    Privilege(String),
}

impl SupervisorError {
    pub fn exit_code(&self) -> i32 {
        match self {
            SupervisorError::Args(_) => 4,
            SupervisorError::BuildMismatch { .. } => 5,
            SupervisorError::SharedMemory(_) => 2,
            SupervisorError::Activate(_) => 3,
            SupervisorError::DataDir(_) => 7,
            SupervisorError::Privilege(_) => 6,
        }
    }
}
