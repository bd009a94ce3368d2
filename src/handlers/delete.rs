use salvo_core::http::StatusCode;
use salvo_core::{Depot, Request, Response, handler};

use crate::error::{TusError, TusResult};
use crate::handlers::{apply_common_headers, check_method_override, state, upload_id};
use crate::hooks;

/// DELETE on an upload: removes the record and the working directory. A
/// missing record is a 404, making repeat deletes observable.
#[handler]
pub(crate) async fn terminate(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> TusResult<()> {
    check_method_override(req)?;
    let tus = state(depot)?;
    apply_common_headers(res);

    let id = upload_id(req)?;
    let _guard = tus.locker.write_lock(&id).await?;
    tus.store.get(&id).await?.ok_or(TusError::NotFound)?;

    hooks::fire(&tus.hooks.pre_terminate, &id).await;
    tus.layout.remove_workspace(&id).await?;
    tus.store.delete(&id).await?;
    hooks::fire(&tus.hooks.post_terminate, &id).await;
    tracing::info!(id = %id, "terminated upload");

    res.status_code(StatusCode::NO_CONTENT);
    Ok(())
}
