//! Process liveness heartbeat
//!
//! External health probes judge this process by a small status file the
//! scheduler rewrites every tick. This is deliberately separate from the
//! trade ledger: a quiet market leaves the ledger untouched for hours, so
//! ledger modification time is not a liveness signal. The heartbeat is.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Contents of the heartbeat file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    pub updated_at: DateTime<Utc>,
    pub tick: u64,
    pub instruments: usize,
}

/// Writes the liveness artifact once per tick
pub struct Heartbeat {
    path: PathBuf,
}

impl Heartbeat {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Rewrite the heartbeat file. Written to a temp file and renamed so
    /// an external probe never observes a torn record.
    pub fn beat(&self, tick: u64, instruments: usize, now: DateTime<Utc>) -> Result<()> {
        let record = HeartbeatRecord {
            updated_at: now,
            tick,
            instruments,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec(&record)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_beat_writes_readable_record() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("heartbeat.json");
        let heartbeat = Heartbeat::new(&path);
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap();

        heartbeat.beat(3, 2, now).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let record: HeartbeatRecord = serde_json::from_str(&contents).unwrap();
        assert_eq!(record.tick, 3);
        assert_eq!(record.instruments, 2);
        assert_eq!(record.updated_at, now);
    }

    #[test]
    fn test_beat_overwrites_previous_record() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("heartbeat.json");
        let heartbeat = Heartbeat::new(&path);
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap();

        heartbeat.beat(1, 2, now).unwrap();
        heartbeat.beat(2, 2, now + chrono::Duration::seconds(60)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let record: HeartbeatRecord = serde_json::from_str(&contents).unwrap();
        assert_eq!(record.tick, 2);
        // No leftover temp file
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_beat_creates_parent_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("status").join("heartbeat.json");
        let heartbeat = Heartbeat::new(&path);
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap();
        heartbeat.beat(1, 1, now).unwrap();
        assert!(path.exists());
    }
}
