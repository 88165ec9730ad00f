// MIT License - Copyright (c) 2026 Peter Wright

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::state::StateRecord;

/// Durable storage for the `(currentState, targetState)` record.
///
/// One JSON file per installation, read once at startup and overwritten on
/// every committed transition. The store is deliberately forgiving on read:
/// a missing or corrupt record means "no prior state" and the system starts
/// disarmed. Write failures are reported to the caller, which keeps
/// operating on in-memory state; the next successful write self-heals.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted record, or the disarmed default if none exists.
    pub fn load(&self) -> StateRecord {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no persisted alarm state at {}, starting disarmed", self.path.display());
                return StateRecord::default();
            }
            Err(e) => {
                warn!("failed to read alarm state from {}: {e}", self.path.display());
                return StateRecord::default();
            }
        };

        match serde_json::from_str(&text) {
            Ok(record) => {
                debug!("restored alarm state: {record:?}");
                record
            }
            Err(e) => {
                warn!(
                    "corrupt alarm state record at {}: {e}; starting disarmed",
                    self.path.display()
                );
                StateRecord::default()
            }
        }
    }

    /// Overwrite the record atomically (temp file + rename), so a crash
    /// mid-write never leaves a torn record behind.
    pub fn save(&self, record: &StateRecord) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(record)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AlarmState, TargetState};

    #[test]
    fn missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        assert_eq!(store.load(), StateRecord::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let record = StateRecord {
            current: AlarmState::ArmedAway,
            target: TargetState::ArmedAway,
        };
        store.save(&record).unwrap();
        assert_eq!(store.load(), record);
    }

    #[test]
    fn save_creates_missing_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested/deeper/state.json"));
        store.save(&StateRecord::default()).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn corrupt_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = StateStore::new(&path);
        assert_eq!(store.load(), StateRecord::default());
    }

    #[test]
    fn save_overwrites_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        store
            .save(&StateRecord {
                current: AlarmState::ArmedHome,
                target: TargetState::ArmedHome,
            })
            .unwrap();
        store.save(&StateRecord::default()).unwrap();
        assert_eq!(store.load(), StateRecord::default());
        // No stray temp file left behind
        assert!(!dir.path().join("state.tmp").exists());
    }
}
