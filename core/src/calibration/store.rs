//! Calibration table keyed by analyzer configuration, persisted as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::prelude::{ProcessingError, ProcessingResult};
use crate::sensor::hardware::SiganSettings;
use crate::telemetry::log::LogManager;

/// Analyzer configuration a calibration applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalibrationKey {
    pub frequency_hz: f64,
    pub sample_rate_hz: f64,
    pub gain_db: Option<f64>,
    pub attenuation_db: Option<f64>,
    pub reference_level_dbm: Option<f64>,
    pub preamp_enable: Option<bool>,
}

impl CalibrationKey {
    pub fn from_settings(settings: &SiganSettings) -> Self {
        Self {
            frequency_hz: settings.frequency_hz,
            sample_rate_hz: settings.sample_rate_hz,
            gain_db: settings.gain_db,
            attenuation_db: settings.attenuation_db,
            reference_level_dbm: settings.reference_level_dbm,
            preamp_enable: settings.preamp_enable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalibrationRecord {
    pub gain_db: f64,
    pub noise_figure_db: f64,
    #[serde(default)]
    pub enbw_hz: Option<f64>,
    pub temperature_c: f64,
    pub datetime: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CalibrationEntry {
    key: CalibrationKey,
    record: CalibrationRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalibrationTable {
    #[serde(default)]
    last_calibration_time: Option<DateTime<Utc>>,
    #[serde(default)]
    entries: Vec<CalibrationEntry>,
}

impl CalibrationTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get(&self, key: &CalibrationKey) -> Option<&CalibrationRecord> {
        self.entries
            .iter()
            .find(|entry| &entry.key == key)
            .map(|entry| &entry.record)
    }

    fn upsert(&mut self, key: CalibrationKey, record: CalibrationRecord) {
        let latest = match self.last_calibration_time {
            Some(previous) if previous >= record.datetime => previous,
            _ => record.datetime,
        };
        self.last_calibration_time = Some(latest);
        match self.entries.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => entry.record = record,
            None => self.entries.push(CalibrationEntry { key, record }),
        }
    }
}

/// Lookup and persistence of calibration records. Implementations are shared
/// across actions, so `persist` takes `&self`.
pub trait CalibrationStore {
    fn lookup(&self, key: &CalibrationKey) -> Option<CalibrationRecord>;
    fn persist(&self, key: CalibrationKey, record: CalibrationRecord) -> ProcessingResult<()>;
    fn last_calibration_time(&self) -> Option<DateTime<Utc>>;
}

/// Store backed by a JSON file, or held purely in memory.
pub struct JsonCalibrationStore {
    path: Option<PathBuf>,
    table: RwLock<CalibrationTable>,
    logger: LogManager,
}

impl JsonCalibrationStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            table: RwLock::new(CalibrationTable::default()),
            logger: LogManager::new("calibration_store"),
        }
    }

    /// Loads `path`. A missing file starts an empty table that is created on
    /// the first persist.
    pub fn load(path: impl AsRef<Path>) -> ProcessingResult<Self> {
        let path = path.as_ref().to_path_buf();
        let logger = LogManager::new("calibration_store");
        let table = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|err| {
                ProcessingError::CalibrationStore(format!("failed to read {:?}: {}", path, err))
            })?;
            serde_json::from_str(&contents).map_err(|err| {
                ProcessingError::CalibrationStore(format!("failed to parse {:?}: {}", path, err))
            })?
        } else {
            logger.warn(&format!(
                "calibration file {:?} not found, starting with an empty table",
                path
            ));
            CalibrationTable::default()
        };
        logger.record(&format!("loaded {} calibration record(s)", table.len()));
        Ok(Self {
            path: Some(path),
            table: RwLock::new(table),
            logger,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn snapshot(&self) -> ProcessingResult<CalibrationTable> {
        self.table
            .read()
            .map(|table| table.clone())
            .map_err(|_| ProcessingError::CalibrationStore("calibration table lock poisoned".into()))
    }

    fn write_file(path: &Path, table: &CalibrationTable) -> ProcessingResult<()> {
        let contents = serde_json::to_string_pretty(table)
            .map_err(|err| ProcessingError::CalibrationStore(err.to_string()))?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, contents).map_err(|err| {
            ProcessingError::CalibrationStore(format!("failed to write {:?}: {}", staging, err))
        })?;
        fs::rename(&staging, path).map_err(|err| {
            ProcessingError::CalibrationStore(format!(
                "failed to replace {:?} with {:?}: {}",
                path, staging, err
            ))
        })
    }
}

impl CalibrationStore for JsonCalibrationStore {
    fn lookup(&self, key: &CalibrationKey) -> Option<CalibrationRecord> {
        self.table
            .read()
            .ok()
            .and_then(|table| table.get(key).cloned())
    }

    fn persist(&self, key: CalibrationKey, record: CalibrationRecord) -> ProcessingResult<()> {
        let mut guard = self
            .table
            .write()
            .map_err(|_| ProcessingError::CalibrationStore("calibration table lock poisoned".into()))?;
        let mut updated = guard.clone();
        updated.upsert(key, record);
        if let Some(path) = &self.path {
            Self::write_file(path, &updated)?;
        }
        *guard = updated;
        self.logger.debug("calibration table updated");
        Ok(())
    }

    fn last_calibration_time(&self) -> Option<DateTime<Utc>> {
        self.table
            .read()
            .ok()
            .and_then(|table| table.last_calibration_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    fn key(frequency_hz: f64) -> CalibrationKey {
        CalibrationKey {
            frequency_hz,
            sample_rate_hz: 14e6,
            gain_db: None,
            attenuation_db: Some(0.0),
            reference_level_dbm: Some(-25.0),
            preamp_enable: Some(true),
        }
    }

    fn record(gain_db: f64, hour: u32) -> CalibrationRecord {
        CalibrationRecord {
            gain_db,
            noise_figure_db: 4.5,
            enbw_hz: Some(11.6e6),
            temperature_c: 21.0,
            datetime: Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn persist_then_reload_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sensor_calibration.json");
        let store = JsonCalibrationStore::load(&path).unwrap();
        assert!(store.lookup(&key(3.55e9)).is_none());

        store.persist(key(3.55e9), record(30.0, 1)).unwrap();
        store.persist(key(3.55e9), record(31.0, 2)).unwrap();
        store.persist(key(3.56e9), record(29.0, 0)).unwrap();

        let reloaded = JsonCalibrationStore::load(&path).unwrap();
        assert_eq!(reloaded.snapshot().unwrap().len(), 2);
        assert_eq!(reloaded.lookup(&key(3.55e9)).unwrap().gain_db, 31.0);
        assert_eq!(
            reloaded.last_calibration_time(),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 2, 0, 0).unwrap())
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{ not json").unwrap();
        assert!(matches!(
            JsonCalibrationStore::load(file.path()),
            Err(ProcessingError::CalibrationStore(_))
        ));
    }

    #[test]
    fn in_memory_store_keys_on_every_setting() {
        let store = JsonCalibrationStore::in_memory();
        store.persist(key(1e9), record(20.0, 3)).unwrap();
        let mut other = key(1e9);
        other.preamp_enable = Some(false);
        assert!(store.lookup(&other).is_none());
        assert_eq!(store.lookup(&key(1e9)).unwrap().noise_figure_db, 4.5);
        assert!(store.path().is_none());
    }
}
