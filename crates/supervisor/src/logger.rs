use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Size cap before a log file is rotated to a single `.1` backup.
const ROTATE_AT_BYTES: u64 = 1024 * 1024;

enum Level {
    Info,
    Error,
}

impl Level {
    fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Error => "ERROR",
        }
    }
}

/// Append-only, open-append-close log. Distinct from the ambient `log`
/// facade used for this process's own stderr diagnostics: this is the
/// durable on-disk record a backend and frontend clients rely on existing
/// even if the Supervisor's own console output is never captured.
pub struct RotatingLogger {
    path: PathBuf,
    pid: u32,
}

impl RotatingLogger {
    /// Resolves `<data_dir>/logs/<name>.log`, falling back to a file in the
    /// system temp directory when the data directory isn't writable. The
    /// fallback is chosen once at construction; a logger never flips
    /// between targets mid-run.
    pub fn new(data_dir: &Path, name: &str, pid: u32) -> Self {
        let primary_dir = data_dir.join("logs");
        let path = if fs::create_dir_all(&primary_dir).is_ok() {
            primary_dir.join(format!("{name}.log"))
        } else {
            std::env::temp_dir().join(format!("{name}.log"))
        };
        RotatingLogger { path, pid }
    }

    pub fn info(&self, message: &str) {
        self.write(Level::Info, message);
    }

    pub fn error(&self, message: &str) {
        self.write(Level::Error, message);
    }

    fn write(&self, level: Level, message: &str) {
        rotate_if_oversized(&self.path);

        let line = format!(
            "{} - {} - {} - {}\n",
            timestamp(),
            level.as_str(),
            self.pid,
            message
        );

        // Open-append-close every time: never hold the file open, so the
        // log survives an external rotation or deletion between writes.
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(line.as_bytes()));

        if let Err(e) = result {
            log::debug!("dropped log line, could not write {}: {e}", self.path.display());
        }
    }
}

fn rotate_if_oversized(path: &Path) {
    let Ok(metadata) = fs::metadata(path) else {
        return;
    };
    if metadata.len() < ROTATE_AT_BYTES {
        return;
    }

    let backup = path.with_extension("log.1");
    let _ = fs::rename(path, backup);
}

fn timestamp() -> String {
    let now = chrono::Local::now();
    format!(
        "{},{:03}",
        now.format("%Y-%m-%d %H:%M:%S"),
        now.timestamp_subsec_millis()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn writes_go_to_the_data_dir_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let logger = RotatingLogger::new(dir.path(), "launch-supervisor", 42);
        logger.info("started");

        let path = dir.path().join("logs").join("launch-supervisor.log");
        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert!(contents.contains("INFO"));
        assert!(contents.contains("42"));
        assert!(contents.contains("started"));
    }

    #[test]
    fn rotates_when_oversized() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("logs").join("launch-supervisor.log");
        fs::create_dir_all(log_path.parent().unwrap()).unwrap();
        fs::write(&log_path, vec![b'a'; (ROTATE_AT_BYTES + 1) as usize]).unwrap();

        let logger = RotatingLogger::new(dir.path(), "launch-supervisor", 7);
        logger.info("after rotation");

        let backup = log_path.with_extension("log.1");
        assert!(backup.exists());
        assert!(fs::metadata(&backup).unwrap().len() >= ROTATE_AT_BYTES);

        let mut contents = String::new();
        File::open(&log_path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("after rotation"));
    }

    #[test]
    fn falls_back_to_temp_dir_when_data_dir_is_unwritable() {
        // Point the data dir at a path that can't be created (its parent is
        // a file, not a directory).
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        File::create(&blocker).unwrap();
        let unwritable = blocker.join("data");

        let logger = RotatingLogger::new(&unwritable, "launch-supervisor", 1);
        assert_eq!(
            logger.path,
            std::env::temp_dir().join("launch-supervisor.log")
        );
    }
}
