use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use salvo_core::Request;
use uuid::Uuid;

use crate::error::TusResult;
use crate::metadata::MediaMetadata;

/// Assigns the id of a new upload. The returned value must be 128 bits in
/// hex (32 hex characters), since it names the working directory and appears
/// in every upload URL.
pub type NamingFunction = Arc<
    dyn Fn(
            &Request,
            Option<MediaMetadata>,
        ) -> Pin<Box<dyn Future<Output = TusResult<String>> + Send>>
        + Send
        + Sync,
>;

/// Runs after a finished upload reached long-term storage. Failures are
/// logged and swallowed; the upload stays finalized.
pub type OnUploadComplete = Arc<
    dyn Fn(
            PathBuf,
            Option<MediaMetadata>,
        ) -> Pin<Box<dyn Future<Output = TusResult<()>> + Send>>
        + Send
        + Sync,
>;

/// Fire-and-forget lifecycle notification carrying the upload id.
pub type UploadEvent =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Everything the embedder can observe or influence. All hooks except
/// `naming` default to doing nothing.
#[derive(Clone)]
pub struct TusHooks {
    pub naming: NamingFunction,
    pub on_upload_complete: Option<OnUploadComplete>,
    pub pre_complete: Option<UploadEvent>,
    pub post_complete: Option<UploadEvent>,
    pub pre_expire: Option<UploadEvent>,
    pub post_expire: Option<UploadEvent>,
    pub pre_terminate: Option<UploadEvent>,
    pub post_terminate: Option<UploadEvent>,
}

impl Default for TusHooks {
    fn default() -> Self {
        TusHooks {
            naming: Arc::new(|_req, _metadata| {
                Box::pin(async { Ok(Uuid::new_v4().simple().to_string()) })
            }),
            on_upload_complete: None,
            pre_complete: None,
            post_complete: None,
            pre_expire: None,
            post_expire: None,
            pre_terminate: None,
            post_terminate: None,
        }
    }
}

pub(crate) async fn fire(hook: &Option<UploadEvent>, id: &str) {
    if let Some(hook) = hook {
        hook(id.to_string()).await;
    }
}
