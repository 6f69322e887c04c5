use crate::alerting::alerts::{AlertStore, WatchRecord};
use crate::error::NotifierError;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Everything that survives a restart.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub last_update: i64,
    #[serde(default)]
    pub alerts: Vec<WatchRecord>,
}

impl Snapshot {
    pub fn capture(store: &AlertStore, last_update: i64) -> Self {
        Self {
            last_update,
            alerts: store.to_records(),
        }
    }

    pub fn into_parts(self) -> (AlertStore, i64) {
        (AlertStore::from_records(self.alerts), self.last_update)
    }
}

/// Never fails: a missing or unreadable file yields an empty snapshot.
pub fn load(path: &Path) -> Snapshot {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No snapshot at {}, starting empty", path.display());
            return Snapshot::default();
        }
        Err(e) => {
            warn!("Could not read snapshot {}: {}", path.display(), e);
            return Snapshot::default();
        }
    };

    match serde_json::from_slice::<Snapshot>(&bytes) {
        Ok(snapshot) => {
            info!(
                "Loaded {} watch sets from {} (last update {})",
                snapshot.alerts.len(),
                path.display(),
                snapshot.last_update
            );
            snapshot
        }
        Err(e) => {
            warn!("Discarding corrupt snapshot {}: {}", path.display(), e);
            Snapshot::default()
        }
    }
}

/// Writes to a sibling temp file and renames it over `path`.
pub fn save(path: &Path, snapshot: &Snapshot) -> Result<(), NotifierError> {
    let json = serde_json::to_vec_pretty(snapshot)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
