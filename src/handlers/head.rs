use salvo_core::http::StatusCode;
use salvo_core::{Depot, Request, Response, handler};

use crate::error::{TusError, TusResult};
use crate::handlers::{
    apply_common_headers, check_method_override, insert_header, state, upload_id,
};
use crate::{H_UPLOAD_DEFER_LENGTH, H_UPLOAD_LENGTH, H_UPLOAD_OFFSET};

/// HEAD on an upload: reports live progress straight from the `.part` size.
/// Reads without locking, and must never be cached.
#[handler]
pub(crate) async fn upload_info(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> TusResult<()> {
    check_method_override(req)?;
    let tus = state(depot)?;
    apply_common_headers(res);

    let id = upload_id(req)?;
    let record = tus.store.get(&id).await?.ok_or(TusError::NotFound)?;
    let offset = tus.layout.part_size(&id).await.ok_or(TusError::NotFound)?;

    insert_header(res, H_UPLOAD_OFFSET, offset.to_string())?;
    insert_header(res, "cache-control", "no-store")?;
    if record.length_deferred {
        insert_header(res, H_UPLOAD_DEFER_LENGTH, "1")?;
    } else if let Some(length) = record.upload_length {
        insert_header(res, H_UPLOAD_LENGTH, length.to_string())?;
    }
    res.status_code(StatusCode::NO_CONTENT);
    Ok(())
}
