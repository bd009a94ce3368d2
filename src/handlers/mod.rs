mod delete;
mod get;
mod head;
mod options;
mod patch;
mod post;
mod reap;

use std::sync::Arc;

pub(crate) use delete::terminate;
pub(crate) use get::download;
pub(crate) use head::upload_info;
pub(crate) use options::server_options;
pub(crate) use patch::append;
pub(crate) use post::create;
pub(crate) use reap::reap_expired;
use salvo_core::http::{HeaderValue, Method, header};
use salvo_core::{Depot, Request, Response};

use crate::error::{ProtocolError, TusError, TusResult};
use crate::utils::{is_well_formed_id, normalize_path};
use crate::{H_METHOD_OVERRIDE, H_TUS_RESUMABLE, TUS_VERSION, Tus};

pub(crate) fn state(depot: &Depot) -> TusResult<Arc<Tus>> {
    depot
        .obtain::<Arc<Tus>>()
        .map(|state| state.clone())
        .map_err(|_| TusError::Internal("tus state missing from depot".into()))
}

pub(crate) fn apply_common_headers(res: &mut Response) {
    res.headers
        .insert(H_TUS_RESUMABLE, HeaderValue::from_static(TUS_VERSION));
}

pub(crate) fn header_str<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

pub(crate) fn insert_header(
    res: &mut Response,
    name: &'static str,
    value: impl AsRef<str>,
) -> TusResult<()> {
    let value = HeaderValue::from_str(value.as_ref())
        .map_err(|_| TusError::Internal(format!("invalid value for header {name}")))?;
    res.headers.insert(name, value);
    Ok(())
}

/// The method the request asks to be dispatched as. A valid
/// `X-HTTP-Method-Override` replaces the wire method before routing; an
/// invalid one leaves routing untouched and the reached handler rejects it.
pub(crate) fn effective_method(req: &Request) -> Method {
    match method_override(req) {
        Some(Ok(method)) => method,
        _ => req.method().clone(),
    }
}

fn method_override(req: &Request) -> Option<Result<Method, ProtocolError>> {
    let raw = req.headers().get(H_METHOD_OVERRIDE)?;
    let Ok(name) = raw.to_str() else {
        return Some(Err(ProtocolError::InvalidMethodOverride));
    };
    let method = match name {
        "GET" => Method::GET,
        "POST" => Method::POST,
        "DELETE" => Method::DELETE,
        "PATCH" => Method::PATCH,
        "OPTIONS" => Method::OPTIONS,
        "HEAD" => Method::HEAD,
        _ => return Some(Err(ProtocolError::InvalidMethodOverride)),
    };
    Some(Ok(method))
}

pub(crate) fn check_method_override(req: &Request) -> Result<(), ProtocolError> {
    match method_override(req) {
        Some(Err(err)) => Err(err),
        _ => Ok(()),
    }
}

pub(crate) fn upload_id(req: &Request) -> TusResult<String> {
    let id = req
        .param::<String>("id")
        .ok_or(ProtocolError::InvalidUploadId)?;
    if !is_well_formed_id(&id) {
        return Err(ProtocolError::InvalidUploadId.into());
    }
    Ok(id.to_ascii_lowercase())
}

/// Absolute URL of the upload endpoint as the client reached it, proxy
/// headers taken into account.
pub(crate) fn base_url(req: &Request, base_path: &str) -> String {
    let headers = req.headers();
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or("http");
    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get(header::HOST))
        .and_then(|v| v.to_str().ok())
        .map(|h| h.trim().to_string())
        .or_else(|| req.uri().authority().map(|a| a.to_string()))
        .unwrap_or_else(|| "localhost".to_string());
    let path = normalize_path(base_path);
    let path = if path == "/" { "" } else { path.as_str() };
    format!("{proto}://{host}{path}")
}
