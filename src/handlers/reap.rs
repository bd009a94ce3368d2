use chrono::Utc;
use salvo_core::http::StatusCode;
use salvo_core::{Depot, Request, Response, handler};

use crate::error::TusResult;
use crate::handlers::{apply_common_headers, check_method_override, state};
use crate::reaper;

/// GET on the base path: sweeps expired uploads. Meant to be hit by a
/// scheduled job; the engine also sweeps after each finalization.
#[handler]
pub(crate) async fn reap_expired(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> TusResult<()> {
    check_method_override(req)?;
    let tus = state(depot)?;
    apply_common_headers(res);

    reaper::reap(&tus, Utc::now()).await;
    res.status_code(StatusCode::NO_CONTENT);
    Ok(())
}
