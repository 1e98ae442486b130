use fs2::FileExt;
use nodedeck_engine::BackendFailure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub run_on_startup: BTreeMap<String, bool>,
}

/// JSON settings file in the nodes home. Updates happen under an exclusive
/// file lock and land by renaming a staging file over the target, so
/// concurrent manager instances cannot shred each other's writes and a
/// crashed write never leaves torn JSON.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(home: &Path) -> Self {
        Self {
            path: home.join("settings.json"),
        }
    }

    pub fn load(&self) -> Result<Settings, BackendFailure> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        let raw = fs::read_to_string(&self.path)
            .map_err(|err| BackendFailure::Failed(format!("failed to read settings: {err}")))?;
        if raw.trim().is_empty() {
            return Ok(Settings::default());
        }
        serde_json::from_str(&raw)
            .map_err(|err| BackendFailure::Failed(format!("failed to parse settings: {err}")))
    }

    pub fn run_on_startup(&self, name: &str) -> bool {
        self.load()
            .map(|settings| settings.run_on_startup.get(name).copied().unwrap_or(false))
            .unwrap_or(false)
    }

    pub fn set_run_on_startup(&self, name: &str, enabled: bool) -> Result<(), BackendFailure> {
        self.update(|settings| {
            settings.run_on_startup.insert(name.to_string(), enabled);
        })
    }

    pub fn remove(&self, name: &str) -> Result<(), BackendFailure> {
        self.update(|settings| {
            settings.run_on_startup.remove(name);
        })
    }

    fn update(&self, mutate: impl FnOnce(&mut Settings)) -> Result<(), BackendFailure> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                BackendFailure::Failed(format!("failed to create nodes home: {err}"))
            })?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|err| BackendFailure::Failed(format!("failed to open settings: {err}")))?;
        file.lock_exclusive()
            .map_err(|err| BackendFailure::Failed(format!("failed to lock settings: {err}")))?;

        let mut raw = String::new();
        file.read_to_string(&mut raw)
            .map_err(|err| BackendFailure::Failed(format!("failed to read settings: {err}")))?;
        let mut settings: Settings = if raw.trim().is_empty() {
            Settings::default()
        } else {
            serde_json::from_str(&raw)
                .map_err(|err| BackendFailure::Failed(format!("failed to parse settings: {err}")))?
        };

        mutate(&mut settings);

        let serialized = serde_json::to_string_pretty(&settings)
            .map_err(|err| BackendFailure::Failed(format!("failed to serialize settings: {err}")))?;

        // Write next to the target and rename over it while still holding the
        // lock, so a crash mid-write never leaves a torn settings file.
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serialized.as_bytes())
            .map_err(|err| BackendFailure::Failed(format!("failed to write settings: {err}")))?;
        fs::rename(&staging, &self.path)
            .map_err(|err| BackendFailure::Failed(format!("failed to replace settings: {err}")))?;

        let _ = fs2::FileExt::unlock(&file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_reads_as_defaults() {
        let home = TempDir::new().expect("tempdir");
        let store = SettingsStore::new(home.path());
        assert!(!store.run_on_startup("alpha"));
    }

    #[test]
    fn set_and_remove_round_trip() {
        let home = TempDir::new().expect("tempdir");
        let store = SettingsStore::new(home.path());

        store.set_run_on_startup("alpha", true).expect("set");
        assert!(store.run_on_startup("alpha"));
        assert!(!store.run_on_startup("beta"));

        store.remove("alpha").expect("remove");
        assert!(!store.run_on_startup("alpha"));
    }

    #[test]
    fn updates_replace_the_file_whole_and_clean_up_staging() {
        let home = TempDir::new().expect("tempdir");
        let store = SettingsStore::new(home.path());

        store.set_run_on_startup("alpha", true).expect("set alpha");
        store.set_run_on_startup("beta", false).expect("set beta");

        assert!(!home.path().join("settings.json.tmp").exists());
        let settings = store.load().expect("load");
        assert_eq!(settings.run_on_startup.get("alpha"), Some(&true));
        assert_eq!(settings.run_on_startup.get("beta"), Some(&false));
    }

    #[test]
    fn rewrites_shrink_the_file_cleanly() {
        let home = TempDir::new().expect("tempdir");
        let store = SettingsStore::new(home.path());

        store
            .set_run_on_startup("a-very-long-node-name", true)
            .expect("set long");
        store.remove("a-very-long-node-name").expect("remove");
        store.set_run_on_startup("b", false).expect("set short");

        // File must still be valid JSON after shrinking rewrites.
        let settings = store.load().expect("load");
        assert_eq!(settings.run_on_startup.get("b"), Some(&false));
    }
}
