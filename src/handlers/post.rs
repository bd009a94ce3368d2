use futures_util::TryStreamExt;
use salvo_core::http::StatusCode;
use salvo_core::{Depot, Request, Response, handler};

use crate::checksum::ChecksumClaim;
use crate::error::{ProtocolError, TusError, TusResult};
use crate::handlers::{
    apply_common_headers, base_url, check_method_override, header_str, insert_header, state,
};
use crate::ingest::{BodyStream, IngestLimits};
use crate::metadata::parse_required_metadata;
use crate::store::UploadRecord;
use crate::utils::{is_well_formed_id, parse_u64};
use crate::{
    CT_OFFSET_OCTET_STREAM, H_CONTENT_LENGTH, H_CONTENT_TYPE, H_TUS_EXTENSION, H_UPLOAD_CHECKSUM,
    H_UPLOAD_CONCAT, H_UPLOAD_DEFER_LENGTH, H_UPLOAD_LENGTH, H_UPLOAD_METADATA, H_UPLOAD_OFFSET,
    concat, finalize, ingest,
};

/// POST on the base path: creates an upload, optionally streams a first body
/// (creation-with-upload), and hands `final;` concatenation requests off to
/// the assembler.
#[handler]
pub(crate) async fn create(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> TusResult<()> {
    check_method_override(req)?;
    let tus = state(depot)?;
    apply_common_headers(res);

    let defer_raw = header_str(req, H_UPLOAD_DEFER_LENGTH).map(ToOwned::to_owned);
    let concat_raw = header_str(req, H_UPLOAD_CONCAT).map(ToOwned::to_owned);
    let length_raw = header_str(req, H_UPLOAD_LENGTH).map(ToOwned::to_owned);
    let content_type = header_str(req, H_CONTENT_TYPE).map(ToOwned::to_owned);
    let metadata_raw = header_str(req, H_UPLOAD_METADATA).map(ToOwned::to_owned);
    let checksum_raw = header_str(req, H_UPLOAD_CHECKSUM).map(ToOwned::to_owned);
    let content_length = header_str(req, H_CONTENT_LENGTH).and_then(|v| v.parse::<u64>().ok());

    let length_deferred = match defer_raw.as_deref() {
        None => false,
        Some("1") => true,
        Some(_) => return Err(ProtocolError::InvalidDeferLength.into()),
    };

    let mut concat_partial = false;
    if let Some(concat_header) = concat_raw.as_deref() {
        if concat_header == "partial" {
            concat_partial = true;
        } else if concat_header.starts_with("final;") {
            let concat_header = concat_header.to_owned();
            let outcome = concat::create_final(&tus, req, &concat_header).await?;
            let location = format!("{}/{}", base_url(req, &tus.config.base_path), outcome.id);
            insert_header(res, "location", &location)?;
            if outcome.unfinished {
                insert_header(res, H_TUS_EXTENSION, "concatenation-unfinished")?;
            }
            res.status_code(StatusCode::CREATED);
            return Ok(());
        } else {
            return Err(ProtocolError::InvalidConcat.into());
        }
    }

    if length_raw.is_some() == defer_raw.is_some() {
        return Err(ProtocolError::InvalidLength.into());
    }
    let upload_length = match length_raw.as_deref() {
        Some(raw) => Some(parse_u64(Some(raw), H_UPLOAD_LENGTH)?),
        None => None,
    };
    if let Some(length) = upload_length
        && length > tus.config.max_file_size
    {
        return Err(TusError::PayloadTooLarge);
    }

    let body_declared = match content_type.as_deref() {
        Some(value) if value == CT_OFFSET_OCTET_STREAM => true,
        Some(_) => return Err(ProtocolError::InvalidContentType.into()),
        None => false,
    };

    let checksum = match checksum_raw.as_deref() {
        Some(raw) => Some(ChecksumClaim::parse(raw)?),
        None => None,
    };

    let metadata = if concat_partial {
        None
    } else {
        Some(parse_required_metadata(metadata_raw.as_deref(), &tus.mimes)?)
    };

    let id = (tus.hooks.naming)(req, metadata.clone()).await?;
    if !is_well_formed_id(&id) {
        return Err(TusError::Internal(format!(
            "naming hook produced a malformed id '{id}'"
        )));
    }
    let _guard = tus.locker.write_lock(&id).await?;

    let mut record = UploadRecord::new(
        id.clone(),
        upload_length,
        length_deferred,
        concat_partial,
        metadata,
        tus.config.expire_minutes,
    );
    tus.layout.create_workspace(&id).await?;
    if let Err(err) = tus.store.create(&record).await {
        let _ = tus.layout.remove_workspace(&id).await;
        return Err(err);
    }

    let mut offset = 0;
    let with_upload = body_declared
        && content_length.is_some_and(|n| n > 0)
        && upload_length.is_some()
        && !length_deferred;
    if with_upload {
        let body: BodyStream = Box::pin(
            http_body_util::BodyDataStream::new(req.take_body()).map_err(Into::into),
        );
        offset = ingest::ingest_body(
            &tus.layout,
            &id,
            body,
            checksum.as_ref(),
            IngestLimits {
                current_offset: 0,
                upload_length,
                max_file_size: tus.config.max_file_size,
            },
        )
        .await?;
    }

    record.upload_offset = offset;
    if upload_length == Some(offset) && !length_deferred {
        finalize::finalize(&tus, &mut record).await?;
    } else if offset != 0 {
        record.touch();
        tus.store.update(&record).await?;
    }

    let location = format!("{}/{}", base_url(req, &tus.config.base_path), id);
    insert_header(res, "location", &location)?;
    insert_header(res, H_UPLOAD_OFFSET, offset.to_string())?;
    res.status_code(StatusCode::CREATED);
    tracing::info!(id = %id, offset, partial = concat_partial, "created upload");
    Ok(())
}
