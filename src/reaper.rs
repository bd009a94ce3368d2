use chrono::{DateTime, Utc};

use crate::Tus;
use crate::hooks;

/// Removes every record whose expiry lies in the past, together with its
/// working directory. Long-term files are never touched. Best effort: a
/// record that cannot be removed now is picked up by the next sweep.
pub(crate) async fn reap(tus: &Tus, now: DateTime<Utc>) {
    let expired = match tus.store.find_expired(now).await {
        Ok(records) => records,
        Err(err) => {
            tracing::warn!(error = %err, "expiration query failed");
            return;
        }
    };

    for record in expired {
        hooks::fire(&tus.hooks.pre_expire, &record.id).await;
        if let Err(err) = tus.layout.remove_workspace(&record.id).await {
            tracing::warn!(id = %record.id, error = %err, "could not remove expired workspace");
            continue;
        }
        if let Err(err) = tus.store.delete(&record.id).await {
            tracing::warn!(id = %record.id, error = %err, "could not delete expired record");
            continue;
        }
        hooks::fire(&tus.hooks.post_expire, &record.id).await;
        tracing::info!(id = %record.id, expired_at = %record.time_expires, "reaped expired upload");
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use chrono::Duration;
    use tokio::fs;

    use super::*;
    use crate::config::TusConfig;
    use crate::store::{DiskRecordStore, RecordStore, UploadRecord};

    const OLD: &str = "00000000000000000000000000000001";
    const LIVE: &str = "00000000000000000000000000000002";

    fn engine_in(tmp: &Path) -> Tus {
        let mut config = TusConfig::default();
        config.work_dir = tmp.join("work");
        config.media_dir = tmp.join("media");
        Tus::new()
            .with_config(config)
            .with_store(DiskRecordStore::new(tmp.join("records")))
    }

    #[tokio::test]
    async fn removes_exactly_the_expired_records() {
        let tmp = tempfile::tempdir().unwrap();
        let tus = engine_in(tmp.path());

        let mut old = UploadRecord::new(OLD, Some(10), false, false, None, 60);
        old.time_expires = Utc::now() - Duration::minutes(1);
        tus.layout.create_workspace(OLD).await.unwrap();
        tus.store.create(&old).await.unwrap();

        let live = UploadRecord::new(LIVE, Some(10), false, false, None, 60);
        tus.layout.create_workspace(LIVE).await.unwrap();
        tus.store.create(&live).await.unwrap();

        reap(&tus, Utc::now()).await;

        assert!(tus.store.get(OLD).await.unwrap().is_none());
        assert!(fs::metadata(tus.layout.upload_dir(OLD)).await.is_err());

        assert!(tus.store.get(LIVE).await.unwrap().is_some());
        assert_eq!(tus.layout.part_size(LIVE).await, Some(0));
    }

    #[tokio::test]
    async fn reap_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let tus = engine_in(tmp.path());

        let mut old = UploadRecord::new(OLD, Some(10), false, false, None, 60);
        old.time_expires = Utc::now() - Duration::minutes(1);
        tus.store.create(&old).await.unwrap();

        reap(&tus, Utc::now()).await;
        reap(&tus, Utc::now()).await;
        assert!(tus.store.get(OLD).await.unwrap().is_none());
    }
}
