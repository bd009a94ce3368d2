use salvo_core::fs::NamedFile;
use salvo_core::{Depot, Request, Response, handler};
use tokio::fs;

use crate::error::{TusError, TusResult};
use crate::handlers::{apply_common_headers, check_method_override, state, upload_id};

/// GET on an upload: streams back whatever exists, preferring the long-term
/// copy over the in-flight `.part`. The content type comes from sniffing the
/// stored bytes, not from what the client declared.
#[handler]
pub(crate) async fn download(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> TusResult<()> {
    check_method_override(req)?;
    let tus = state(depot)?;
    apply_common_headers(res);

    let id = upload_id(req)?;
    let _guard = tus.locker.read_lock(&id).await?;
    let record = tus.store.get(&id).await?.ok_or(TusError::NotFound)?;

    let mut path = None;
    if let Some(lts) = &record.lts_path
        && fs::metadata(lts).await.is_ok()
    {
        path = Some(lts.clone());
    }
    if path.is_none() {
        let part = tus.layout.part_path(&id);
        if fs::metadata(&part).await.is_ok() {
            path = Some(part);
        }
    }
    let Some(path) = path else {
        return Err(TusError::NotFound);
    };

    let content_type = tus
        .mimes
        .sniff(&path)
        .await
        .and_then(|m| m.parse::<mime::Mime>().ok())
        .unwrap_or(mime::APPLICATION_OCTET_STREAM);
    NamedFile::builder(path)
        .content_type(content_type)
        .send(req.headers(), res)
        .await;
    Ok(())
}
