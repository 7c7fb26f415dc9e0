//! Default paths for the per-project state file
//!
//! Each project directory owns exactly one environment, recorded in
//! `.ephemera.toml` next to the project's `tasks/` directory.

use std::path::{Path, PathBuf};

/// Environment variable for overriding the state file path
pub const EPHEMERA_CONFIG_ENV: &str = "EPHEMERA_CONFIG";

/// State file name within the project directory
pub const CONFIG_FILENAME: &str = ".ephemera.toml";

/// Get the default state file path.
///
/// Order of precedence:
/// 1. `$EPHEMERA_CONFIG` environment variable (if set and non-empty)
/// 2. `./.ephemera.toml` in the current working directory
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(EPHEMERA_CONFIG_ENV)
        && !path.is_empty()
    {
        return PathBuf::from(path);
    }

    config_path_without_env()
}

/// The state file in the current directory, ignoring `EPHEMERA_CONFIG`.
pub fn config_path_without_env() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(CONFIG_FILENAME)
}

/// The project directory that owns a state file: its parent directory,
/// made absolute against the current directory when relative.
pub fn project_dir_for(config_path: &Path) -> PathBuf {
    let parent = match config_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let absolute = if parent.is_absolute() {
        parent
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(parent),
            Err(_) => parent,
        }
    };

    absolute.canonicalize().unwrap_or(absolute)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_in_current_dir() {
        let path = config_path_without_env();
        assert!(path.ends_with(CONFIG_FILENAME));
        assert!(path.is_absolute());
    }

    #[test]
    fn project_dir_is_parent_of_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(CONFIG_FILENAME);

        let project = project_dir_for(&file);
        assert_eq!(project, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn bare_file_name_resolves_to_cwd() {
        let project = project_dir_for(Path::new(CONFIG_FILENAME));
        assert!(project.is_absolute());
        assert_eq!(
            project,
            std::env::current_dir().unwrap().canonicalize().unwrap()
        );
    }
}
