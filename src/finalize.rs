use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;

use crate::Tus;
use crate::error::{TusError, TusResult};
use crate::hooks;
use crate::metadata::MediaMetadata;
use crate::store::UploadRecord;

/// Runs when an upload's offset reaches its declared length.
///
/// Concatenation members are only marked complete; their bytes stay in
/// working storage until a final references them. Everything else passes the
/// media type gate, moves into long-term storage and notifies the embedder.
pub(crate) async fn finalize(tus: &Tus, record: &mut UploadRecord) -> TusResult<()> {
    if record.concat_partial {
        record.complete = true;
        record.touch();
        tus.store.update(record).await?;
        tracing::info!(id = %record.id, "partial upload complete, awaiting concatenation");
        return Ok(());
    }

    let part = tus.layout.part_path(&record.id);
    let declared = record
        .metadata
        .as_ref()
        .map(|m| m.filetype.as_str())
        .unwrap_or("");
    let mime = tus.mimes.detect(&part, declared).await;
    if !tus.mimes.is_supported(&mime) {
        tracing::warn!(id = %record.id, mime = %mime, "finished upload failed the media type gate");
        tus.layout.remove_workspace(&record.id).await?;
        tus.store.delete(&record.id).await?;
        return Err(TusError::UnsupportedMediaType);
    }

    let filename = record
        .metadata
        .as_ref()
        .map(|m| m.filename.as_str())
        .unwrap_or(&record.id);
    let dest = tus.layout.lts_destination(&record.id, filename, &mime).await?;

    hooks::fire(&tus.hooks.pre_complete, &record.id).await;
    move_into_place(&part, &dest).await?;
    hooks::fire(&tus.hooks.post_complete, &record.id).await;

    record.complete = true;
    record.lts_path = Some(dest.clone());
    if let Some(length) = record.upload_length {
        record.upload_offset = length;
    }
    record.touch();
    tus.store.update(record).await?;
    tracing::info!(id = %record.id, path = %dest.display(), "upload finalized");

    run_on_complete(tus, dest, record.metadata.clone()).await;
    crate::reaper::reap(tus, Utc::now()).await;
    Ok(())
}

pub(crate) async fn run_on_complete(
    tus: &Tus,
    lts_path: PathBuf,
    metadata: Option<MediaMetadata>,
) {
    if let Some(hook) = &tus.hooks.on_upload_complete
        && let Err(err) = hook(lts_path, metadata).await
    {
        tracing::warn!(error = %err, "on-upload-complete hook failed");
    }
}

/// `rename` does not cross filesystems; long-term storage may be a different
/// mount than working storage.
async fn move_into_place(from: &Path, to: &Path) -> TusResult<()> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::debug!(error = %err, "rename failed, copying instead");
            fs::copy(from, to).await?;
            fs::remove_file(from).await?;
            Ok(())
        }
    }
}
