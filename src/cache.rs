use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use tracing::debug;
use uuid::Uuid;

use crate::models::DashboardSummary;

/// One JSON file per user under the cache directory. The store itself is
/// freshness-agnostic; TTL decisions belong to the consumer. An unparseable
/// file reads as a miss.
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn slot_path(&self, user_id: Uuid) -> PathBuf {
        self.dir.join(format!("{user_id}.json"))
    }

    pub fn read(&self, user_id: Uuid) -> Option<DashboardSummary> {
        let path = self.slot_path(user_id);
        let bytes = fs::read(&path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(summary) => Some(summary),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "discarding corrupt cache slot");
                None
            }
        }
    }

    pub fn write(&self, user_id: Uuid, summary: &DashboardSummary) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.slot_path(user_id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(summary)?;
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn clear(&self, user_id: Uuid) -> anyhow::Result<()> {
        let path = self.slot_path(user_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
