use salvo_core::http::StatusCode;
use salvo_core::{Depot, Request, Response, handler};

use crate::checksum::SUPPORTED_ALGORITHMS;
use crate::error::TusResult;
use crate::handlers::{apply_common_headers, check_method_override, insert_header, state};
use crate::{
    H_CONTENT_LENGTH, H_TUS_CHECKSUM_ALGORITHM, H_TUS_EXTENSION, H_TUS_MAX_SIZE, H_TUS_VERSION,
    TUS_EXTENSIONS, TUS_VERSION,
};

/// OPTIONS on the base path: the capability surface clients feature-detect
/// against.
#[handler]
pub(crate) async fn server_options(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> TusResult<()> {
    check_method_override(req)?;
    let tus = state(depot)?;
    apply_common_headers(res);

    insert_header(res, H_TUS_VERSION, TUS_VERSION)?;
    insert_header(res, H_TUS_MAX_SIZE, tus.config.max_file_size.to_string())?;
    insert_header(res, H_TUS_EXTENSION, TUS_EXTENSIONS)?;
    insert_header(res, H_TUS_CHECKSUM_ALGORITHM, SUPPORTED_ALGORITHMS)?;
    insert_header(res, H_CONTENT_LENGTH, tus.config.max_req_size.to_string())?;
    res.status_code(StatusCode::NO_CONTENT);
    Ok(())
}
