use futures_util::TryStreamExt;
use salvo_core::http::StatusCode;
use salvo_core::{Depot, Request, Response, handler};

use crate::checksum::ChecksumClaim;
use crate::error::{ProtocolError, TusError, TusResult};
use crate::handlers::{
    apply_common_headers, check_method_override, header_str, insert_header, state, upload_id,
};
use crate::ingest::{BodyStream, IngestLimits};
use crate::utils::parse_u64;
use crate::{
    CT_OFFSET_OCTET_STREAM, H_CONTENT_TYPE, H_UPLOAD_CHECKSUM, H_UPLOAD_EXPIRES, H_UPLOAD_LENGTH,
    H_UPLOAD_OFFSET, finalize, ingest,
};

const EXPIRES_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// PATCH on an upload: appends the request body at the declared offset. The
/// `.part` size on disk is the sole consistency anchor; a stale offset never
/// mutates anything.
#[handler]
pub(crate) async fn append(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> TusResult<()> {
    check_method_override(req)?;
    let tus = state(depot)?;
    apply_common_headers(res);

    let id = upload_id(req)?;

    match header_str(req, H_CONTENT_TYPE) {
        Some(value) if value == CT_OFFSET_OCTET_STREAM => {}
        _ => return Err(TusError::UnsupportedMediaType),
    }

    let client_offset = parse_u64(header_str(req, H_UPLOAD_OFFSET), H_UPLOAD_OFFSET)?;
    let length_raw = header_str(req, H_UPLOAD_LENGTH).map(ToOwned::to_owned);
    let checksum_raw = header_str(req, H_UPLOAD_CHECKSUM).map(ToOwned::to_owned);

    let _guard = tus.locker.write_lock(&id).await?;

    let mut record = tus.store.get(&id).await?.ok_or(TusError::NotFound)?;
    let current = tus.layout.part_size(&id).await.ok_or(TusError::NotFound)?;
    if current != client_offset {
        return Err(TusError::OffsetMismatch {
            expected: current,
            got: client_offset,
        });
    }

    if let Some(raw) = length_raw.as_deref() {
        let length = parse_u64(Some(raw), H_UPLOAD_LENGTH)?;
        if length > tus.config.max_file_size {
            return Err(TusError::PayloadTooLarge);
        }
        // a positive length resolves a deferral, once
        if record.length_deferred && length > 0 {
            if length < current {
                return Err(ProtocolError::InvalidLength.into());
            }
            record.upload_length = Some(length);
            record.length_deferred = false;
            record.touch();
            tus.store.update(&record).await?;
        }
    }

    let checksum = match checksum_raw.as_deref() {
        Some(raw) => Some(ChecksumClaim::parse(raw)?),
        None => None,
    };

    let body: BodyStream = Box::pin(
        http_body_util::BodyDataStream::new(req.take_body()).map_err(Into::into),
    );
    let offset = ingest::ingest_body(
        &tus.layout,
        &id,
        body,
        checksum.as_ref(),
        IngestLimits {
            current_offset: current,
            upload_length: record.upload_length,
            max_file_size: tus.config.max_file_size,
        },
    )
    .await?;

    record.upload_offset = offset;
    if record.upload_length == Some(offset) && !record.length_deferred {
        finalize::finalize(&tus, &mut record).await?;
    } else {
        record.touch();
        tus.store.update(&record).await?;
    }

    insert_header(res, H_UPLOAD_OFFSET, offset.to_string())?;
    insert_header(
        res,
        H_UPLOAD_EXPIRES,
        record.time_expires.format(EXPIRES_FORMAT).to_string(),
    )?;
    res.status_code(StatusCode::NO_CONTENT);
    Ok(())
}
