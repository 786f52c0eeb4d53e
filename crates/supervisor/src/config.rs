use std::fs;
use std::path::Path;

const CONFIG_FILE_NAME: &str = "launch-supervisor.conf";

/// The two booleans the Control Loop cares about. Missing file, unreadable
/// file, or missing keys all silently fall back to these defaults -- per
/// the teacher's `ManagerConfig` habit of never treating optional system
/// state as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub autostart: bool,
    pub backend: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            autostart: false,
            backend: true,
        }
    }
}

/// Loads `<data_dir>/launch-supervisor.conf`. Called fresh before every
/// launch decision so edits take effect without restarting the Supervisor.
pub fn load(data_dir: &Path) -> Config {
    let path = data_dir.join(CONFIG_FILE_NAME);
    let contents = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) => {
            log::debug!("config file {} not read: {e}", path.display());
            return Config::default();
        }
    };

    let mut config = Config::default();
    for line in contents.lines() {
        let line = line.trim();
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let is_true = value.trim().eq_ignore_ascii_case("TRUE");
        match key.trim() {
            "autostart" => config.autostart = is_true,
            "backend" => config.backend = is_true,
            _ => {}
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(dir.path());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn parses_recognized_keys_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "autostart=true\nbackend=FALSE\nunknown=TRUE\n",
        )
        .unwrap();

        let config = load(dir.path());
        assert!(config.autostart);
        assert!(!config.backend);
    }

    #[test]
    fn malformed_lines_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "this is not a key value line\nautostart=TRUE\n",
        )
        .unwrap();

        let config = load(dir.path());
        assert!(config.autostart);
        assert!(config.backend);
    }
}
