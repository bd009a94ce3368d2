mod disk;

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
pub use disk::DiskRecordStore;
use salvo_core::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TusResult;
use crate::metadata::MediaMetadata;

/// One active or completed upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadRecord {
    /// 128-bit identifier in hex, assigned by the naming hook.
    pub id: String,

    /// Declared total size. Absent while the length is deferred and for
    /// concatenation finals.
    pub upload_length: Option<u64>,

    /// Bytes durably stored, always equal to the `.part` size.
    pub upload_offset: u64,

    /// The client has not declared a total size yet. Cleared, never set, by
    /// a later PATCH.
    pub length_deferred: bool,

    /// Member of a future concatenation final. Completed members stay in
    /// working storage instead of moving to long-term storage.
    pub concat_partial: bool,

    /// For a concatenation final: member ids in assembly order.
    pub concat_member_ids: Option<Vec<String>>,

    /// Parsed `Upload-Metadata`. Absent for concatenation members.
    pub metadata: Option<MediaMetadata>,

    pub complete: bool,

    /// Long-term path, set at finalization.
    pub lts_path: Option<PathBuf>,

    pub time_created: DateTime<Utc>,
    pub time_updated: DateTime<Utc>,
    pub time_expires: DateTime<Utc>,
}

impl UploadRecord {
    pub fn new(
        id: impl Into<String>,
        upload_length: Option<u64>,
        length_deferred: bool,
        concat_partial: bool,
        metadata: Option<MediaMetadata>,
        expire_minutes: i64,
    ) -> Self {
        let now = Utc::now();
        UploadRecord {
            id: id.into(),
            upload_length,
            upload_offset: 0,
            length_deferred,
            concat_partial,
            concat_member_ids: None,
            metadata,
            complete: false,
            lts_path: None,
            time_created: now,
            time_updated: now,
            time_expires: now + Duration::minutes(expire_minutes),
        }
    }

    /// Marks the record as modified. Expiry is never extended by activity.
    pub fn touch(&mut self) {
        self.time_updated = Utc::now();
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.time_expires < now
    }
}

/// Durable map from upload id to [`UploadRecord`]. Single writer per id is
/// guaranteed by the engine's per-id locks; implementations only need atomic
/// whole-record replacement.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    async fn get(&self, id: &str) -> TusResult<Option<UploadRecord>>;

    /// Fails if the id is already present.
    async fn create(&self, record: &UploadRecord) -> TusResult<()>;

    /// Replaces the record with the same id. Fails if it is absent.
    async fn update(&self, record: &UploadRecord) -> TusResult<()>;

    /// Idempotent.
    async fn delete(&self, id: &str) -> TusResult<()>;

    /// Every record with `time_expires` strictly before `now`.
    async fn find_expired(&self, now: DateTime<Utc>) -> TusResult<Vec<UploadRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_stamps_expiry_from_creation() {
        let record = UploadRecord::new("abc", Some(10), false, false, None, 30);
        assert_eq!(record.upload_offset, 0);
        assert!(!record.complete);
        assert_eq!(
            record.time_expires - record.time_created,
            Duration::minutes(30)
        );
        assert!(!record.is_expired(Utc::now()));
        assert!(record.is_expired(Utc::now() + Duration::minutes(31)));
    }

    #[test]
    fn touch_moves_updated_not_expires() {
        let mut record = UploadRecord::new("abc", None, true, false, None, 5);
        let expires = record.time_expires;
        record.touch();
        assert_eq!(record.time_expires, expires);
        assert!(record.time_updated >= record.time_created);
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut record = UploadRecord::new(
            "0123456789abcdef0123456789abcdef",
            Some(42),
            false,
            false,
            Some(MediaMetadata {
                filename: "a.png".into(),
                filetype: "image/png".into(),
                extra: vec![],
            }),
            60,
        );
        record.concat_member_ids = Some(vec!["m1".into(), "m2".into()]);
        record.lts_path = Some("/media/image/a.png".into());

        let json = serde_json::to_string(&record).unwrap();
        let back: UploadRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, record.id);
        assert_eq!(back.upload_length, Some(42));
        assert_eq!(back.concat_member_ids, record.concat_member_ids);
        assert_eq!(back.lts_path, record.lts_path);
        assert_eq!(back.time_expires, record.time_expires);
    }
}
