use std::path::PathBuf;

use chrono::Utc;
use salvo_core::Request;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{ProtocolError, TusError, TusResult};
use crate::handlers::{base_url, header_str};
use crate::metadata::{MediaMetadata, parse_required_metadata};
use crate::store::UploadRecord;
use crate::{H_UPLOAD_METADATA, Tus, finalize, hooks, reaper};

pub(crate) struct FinalOutcome {
    pub id: String,
    /// At least one member had not finished when the final was created. The
    /// final record exists but nothing was assembled.
    pub unfinished: bool,
}

/// Handles a create request carrying `Upload-Concat: final; <url> <url> ...`.
/// The final never holds bytes of its own; its content is the members'
/// `.part` files appended in header order.
pub(crate) async fn create_final(
    tus: &Tus,
    req: &mut Request,
    concat_header: &str,
) -> TusResult<FinalOutcome> {
    let url_prefix = format!("{}/", base_url(req, &tus.config.base_path));
    let member_list = concat_header.strip_prefix("final;").unwrap_or_default();
    let member_ids = member_ids_from_header(member_list, &url_prefix);
    if member_ids.is_empty() {
        return Err(ProtocolError::InvalidConcat.into());
    }

    let mut members = Vec::with_capacity(member_ids.len());
    for id in &member_ids {
        let record = tus.store.get(id).await?.ok_or(TusError::NotFound)?;
        members.push(record);
    }

    let metadata = parse_required_metadata(header_str(req, H_UPLOAD_METADATA), &tus.mimes)?;

    let final_id = (tus.hooks.naming)(req, Some(metadata.clone())).await?;
    let _guard = tus.locker.write_lock(&final_id).await?;

    let mut record = UploadRecord::new(
        final_id.clone(),
        None,
        false,
        false,
        Some(metadata.clone()),
        tus.config.expire_minutes,
    );
    record.concat_member_ids = Some(member_ids.clone());
    tus.store.create(&record).await?;

    if members.iter().any(|m| !m.complete) {
        tracing::warn!(id = %final_id, "concatenation requested before every member finished");
        return Ok(FinalOutcome {
            id: final_id,
            unfinished: true,
        });
    }

    hooks::fire(&tus.hooks.pre_complete, &final_id).await;
    let dest = assemble(tus, &final_id, &member_ids, &metadata).await?;
    record.complete = true;
    record.lts_path = Some(dest.clone());
    record.touch();
    tus.store.update(&record).await?;
    hooks::fire(&tus.hooks.post_complete, &final_id).await;
    tracing::info!(
        id = %final_id,
        members = member_ids.len(),
        path = %dest.display(),
        "assembled concatenated upload"
    );

    finalize::run_on_complete(tus, dest, record.metadata.clone()).await;
    reaper::reap(tus, Utc::now()).await;

    Ok(FinalOutcome {
        id: final_id,
        unfinished: false,
    })
}

/// Members arrive as upload URLs; what identifies them is the id behind this
/// server's own prefix. Order is preserved.
fn member_ids_from_header(member_list: &str, url_prefix: &str) -> Vec<String> {
    member_list
        .split_whitespace()
        .map(|entry| {
            entry
                .strip_prefix(url_prefix)
                .unwrap_or(entry)
                .trim_end_matches('/')
                .to_string()
        })
        .filter(|id| !id.is_empty())
        .collect()
}

/// Members were sniff-gated when they completed, so the destination comes
/// from the declared type. Bytes are appended exactly in member order with
/// no separators.
async fn assemble(
    tus: &Tus,
    final_id: &str,
    member_ids: &[String],
    metadata: &MediaMetadata,
) -> TusResult<PathBuf> {
    let dest = tus
        .layout
        .lts_destination(final_id, &metadata.filename, &metadata.filetype)
        .await?;

    let mut out = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&dest)
        .await?;
    for id in member_ids {
        let part = tus.layout.part_path(id);
        let mut src = fs::File::open(&part).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                TusError::NotFound
            } else {
                TusError::from(err)
            }
        })?;
        tokio::io::copy(&mut src, &mut out).await?;
    }
    out.flush().await?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_ids_strip_this_servers_prefix() {
        let ids = member_ids_from_header(
            " http://host/uploads/aaa http://host/uploads/bbb/ ",
            "http://host/uploads/",
        );
        assert_eq!(ids, vec!["aaa".to_string(), "bbb".to_string()]);
    }

    #[test]
    fn member_order_is_preserved() {
        let ids = member_ids_from_header(
            "http://host/uploads/zzz http://host/uploads/aaa",
            "http://host/uploads/",
        );
        assert_eq!(ids, vec!["zzz".to_string(), "aaa".to_string()]);
    }

    #[test]
    fn foreign_entries_pass_through_untouched() {
        let ids = member_ids_from_header("bare-id", "http://host/uploads/");
        assert_eq!(ids, vec!["bare-id".to_string()]);
    }

    #[test]
    fn empty_member_list_yields_nothing() {
        assert!(member_ids_from_header("", "http://host/uploads/").is_empty());
        assert!(member_ids_from_header("   ", "http://host/uploads/").is_empty());
    }
}
