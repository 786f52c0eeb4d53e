use std::io;

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("cannot create shared-memory region {name}: {source}")]
    CreateRegion { name: String, source: io::Error },

    #[error("shared-memory region {name} did not become ready within the liveness deadline")]
    NotReady { name: String },

    #[error("cannot attach to shared-memory region {name}: {source}")]
    OpenRegion { name: String, source: io::Error },

    #[error("process enumeration failed: {0}")]
    Enumerate(io::Error),

    #[error("cannot terminate process {pid}: {source}")]
    Terminate { pid: u32, source: io::Error },

    #[error("cannot resolve data directory: {0}")]
    DataDir(String),

    #[error("cannot spawn backend process: {0}")]
    Spawn(io::Error),

    #[error("service host operation failed: {0}")]
    Service(String),
}
