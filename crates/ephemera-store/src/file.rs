//! TOML file store

use ephemera_config::{EnvironmentRecord, load_record, render_record};
use ephemera_util::project_dir_for;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::{ConfigStore, StoreResult};

/// Store backed by a single TOML file
#[derive(Debug, Clone)]
pub struct TomlFileStore {
    path: PathBuf,
}

impl TomlFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The project directory owning this state file
    pub fn project_dir(&self) -> PathBuf {
        project_dir_for(&self.path)
    }

    /// The state file's path, absolute
    pub fn absolute_path(&self) -> PathBuf {
        match self.path.file_name() {
            Some(name) => self.project_dir().join(name),
            None => self.path.clone(),
        }
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }
}

impl ConfigStore for TomlFileStore {
    fn load(&self) -> StoreResult<EnvironmentRecord> {
        let mut record = if self.path.exists() {
            load_record(&self.path)?
        } else {
            debug!(path = %self.path.display(), "No state file yet, using defaults");
            EnvironmentRecord::default()
        };

        if record.project_path.is_none() {
            record.project_path = Some(self.project_dir());
        }

        Ok(record)
    }

    fn save(&self, record: &EnvironmentRecord) -> StoreResult<()> {
        let mut record = record.clone();
        if record.project_path.is_none() {
            record.project_path = Some(self.project_dir());
        }
        let content = render_record(&record)?;

        // Readers never observe a half-written file. The temp file is
        // removed on drop if any step fails.
        let mut temp = NamedTempFile::new_in(self.dir())?;
        temp.write_all(content.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| e.error)?;

        debug!(path = %self.path.display(), status = %record.status, "State saved");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreError;
    use chrono::{Local, TimeZone};
    use ephemera_config::{ConfigError, EnvironmentStatus};
    use ephemera_util::JobId;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlFileStore::new(dir.path().join(".ephemera.toml"));

        let record = store.load().unwrap();
        assert_eq!(record.status, EnvironmentStatus::Unset);
        assert_eq!(
            record.project_path,
            Some(dir.path().canonicalize().unwrap())
        );
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".ephemera.toml");
        let store = TomlFileStore::new(&path);

        let mut record = store.load().unwrap();
        record.name = "saved".into();
        record
            .set_active(Local.with_ymd_and_hms(2025, 12, 25, 14, 0, 0).unwrap())
            .unwrap();
        record.set_scheduled_job(JobId::new("5"));
        store.save(&record).unwrap();

        assert_eq!(store.load().unwrap(), record);

        // No temp files left behind
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn save_overwrites_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".ephemera.toml");
        std::fs::write(&path, "config_version = 1\nname = \"old\"\nforce = true\n").unwrap();
        let store = TomlFileStore::new(&path);

        let mut record = store.load().unwrap();
        assert!(record.force);
        record.force = false;
        store.save(&record).unwrap();

        assert!(!store.load().unwrap().force);
        assert_eq!(store.load().unwrap().name, "old");
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".ephemera.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();

        let result = TomlFileStore::new(&path).load();
        assert!(matches!(
            result,
            Err(StoreError::Config(ConfigError::ParseError(_)))
        ));
    }

    #[test]
    fn failed_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".ephemera.toml");
        // The rename cannot replace a directory
        std::fs::create_dir(&path).unwrap();
        let store = TomlFileStore::new(&path);

        assert!(matches!(
            store.save(&EnvironmentRecord::default()),
            Err(StoreError::Io(_))
        ));

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from(".ephemera.toml")]);
    }

    #[test]
    fn absolute_path_of_relative_store() {
        let store = TomlFileStore::new("staging.toml");
        let absolute = store.absolute_path();
        assert!(absolute.is_absolute());
        assert!(absolute.ends_with("staging.toml"));
    }

    #[test]
    fn save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlFileStore::new(dir.path().join("gone").join(".ephemera.toml"));
        assert!(matches!(
            store.save(&EnvironmentRecord::default()),
            Err(StoreError::Io(_))
        ));
    }
}
