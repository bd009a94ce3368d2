use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use salvo_core::async_trait;
use tokio::fs;

use crate::error::{TusError, TusResult};
use crate::store::{RecordStore, UploadRecord};

/// Record store keeping one JSON document per upload id. Writes go through a
/// sibling `.tmp` file and a rename, so a record is always either the old or
/// the new version on disk.
#[derive(Clone, Debug)]
pub struct DiskRecordStore {
    root: PathBuf,
}

impl DiskRecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    fn tmp_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.json.tmp"))
    }

    async fn ensure_root(&self) -> TusResult<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn read_record(&self, id: &str) -> TusResult<Option<UploadRecord>> {
        let bytes = match fs::read(self.record_path(id)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let record = serde_json::from_slice::<UploadRecord>(&bytes)
            .map_err(|err| TusError::Internal(format!("invalid record json for {id}: {err}")))?;
        Ok(Some(record))
    }

    async fn write_record_atomic(&self, record: &UploadRecord) -> TusResult<()> {
        let tmp = self.tmp_path(&record.id);
        let json = serde_json::to_vec(record)
            .map_err(|err| TusError::Internal(format!("serialize record json: {err}")))?;
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, self.record_path(&record.id)).await?;
        Ok(())
    }
}

impl Default for DiskRecordStore {
    fn default() -> Self {
        Self::new("./tus-data/records")
    }
}

#[async_trait]
impl RecordStore for DiskRecordStore {
    async fn get(&self, id: &str) -> TusResult<Option<UploadRecord>> {
        self.ensure_root().await?;
        self.read_record(id).await
    }

    async fn create(&self, record: &UploadRecord) -> TusResult<()> {
        self.ensure_root().await?;
        if fs::metadata(self.record_path(&record.id)).await.is_ok() {
            return Err(TusError::AlreadyExists(record.id.clone()));
        }
        self.write_record_atomic(record).await
    }

    async fn update(&self, record: &UploadRecord) -> TusResult<()> {
        self.ensure_root().await?;
        if fs::metadata(self.record_path(&record.id)).await.is_err() {
            return Err(TusError::NotFound);
        }
        self.write_record_atomic(record).await
    }

    async fn delete(&self, id: &str) -> TusResult<()> {
        match fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> TusResult<Vec<UploadRecord>> {
        self.ensure_root().await?;
        let mut expired = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            match serde_json::from_slice::<UploadRecord>(&bytes) {
                Ok(record) if record.is_expired(now) => expired.push(record),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable record");
                }
            }
        }
        Ok(expired)
    }
}
