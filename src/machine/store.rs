//! Machine records persisted as one JSON file per machine

use super::MachineRecord;
use crate::error::{G5kError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

/// Directory-backed machine store
#[derive(Debug, Clone)]
pub struct MachineStore {
    base_path: PathBuf,
}

impl MachineStore {
    /// Open (and create if needed) a store rooted at `base_path`
    pub fn new(base_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", name))
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        Ok(fs::try_exists(self.record_path(name)).await?)
    }

    /// Write a record, replacing any previous one with the same name
    pub async fn save(&self, record: &MachineRecord) -> Result<()> {
        let data = serde_json::to_vec_pretty(record)?;
        fs::write(self.record_path(&record.name), data).await?;
        Ok(())
    }

    pub async fn load(&self, name: &str) -> Result<MachineRecord> {
        let path = self.record_path(name);
        if !fs::try_exists(&path).await? {
            return Err(G5kError::MachineNotFound(name.to_string()));
        }

        let data = fs::read(&path).await?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Load every record; unreadable records are skipped with a warning
    pub async fn load_all(&self) -> Result<Vec<MachineRecord>> {
        let mut records = Vec::new();
        let mut dir = fs::read_dir(&self.base_path).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let parsed = match fs::read(&path).await {
                Ok(data) => serde_json::from_slice::<MachineRecord>(&data).map_err(G5kError::from),
                Err(e) => Err(e.into()),
            };

            match parsed {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping machine record {}: {}", path.display(), e),
            }
        }

        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    pub async fn remove(&self, name: &str) -> Result<()> {
        let path = self.record_path(name);
        if !fs::try_exists(&path).await? {
            return Err(G5kError::MachineNotFound(name.to_string()));
        }

        fs::remove_file(path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::DriverConfig;
    use chrono::Utc;
    use tempfile::tempdir;

    fn record(name: &str, job_id: u64) -> MachineRecord {
        MachineRecord {
            name: name.to_string(),
            hostname: format!("{}.lille.grid5000.fr", name),
            driver: DriverConfig {
                site: "lille".to_string(),
                job_id,
                username: "alice".to_string(),
                image: "debian11-x64-min".to_string(),
                walltime: "1:00:00".to_string(),
            },
            ssh_key_path: PathBuf::from("/tmp/id_rsa"),
            engine_opts: vec!["debug=true".to_string()],
            engine_labels: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp = tempdir().unwrap();
        let store = MachineStore::new(temp.path().join("machines")).unwrap();

        store.save(&record("lille-0", 42)).await.unwrap();
        assert!(store.exists("lille-0").await.unwrap());

        let loaded = store.load("lille-0").await.unwrap();
        assert_eq!(loaded.driver.job_id, 42);
        assert_eq!(loaded.engine_opts, vec!["debug=true".to_string()]);
    }

    #[tokio::test]
    async fn test_load_all_skips_garbage() {
        let temp = tempdir().unwrap();
        let store = MachineStore::new(temp.path().to_path_buf()).unwrap();

        store.save(&record("lille-1", 1)).await.unwrap();
        store.save(&record("lille-0", 1)).await.unwrap();
        std::fs::write(temp.path().join("broken.json"), "{").unwrap();
        std::fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let records = store.load_all().await.unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["lille-0", "lille-1"]);
    }

    #[tokio::test]
    async fn test_remove() {
        let temp = tempdir().unwrap();
        let store = MachineStore::new(temp.path().to_path_buf()).unwrap();

        store.save(&record("lille-0", 1)).await.unwrap();
        store.remove("lille-0").await.unwrap();

        assert!(!store.exists("lille-0").await.unwrap());
        assert!(matches!(
            store.remove("lille-0").await,
            Err(G5kError::MachineNotFound(_))
        ));
    }
}
