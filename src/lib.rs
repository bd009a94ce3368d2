//! Resumable upload engine for media ingestion services, speaking
//! [tus](https://tus.io/) 1.0.0.
//!
//! The engine owns the full upload lifecycle: create, resume, verify,
//! concatenate, expire, terminate, and finally sort each finished binary
//! into long-term storage. It is built to be embedded — the image-domain
//! side of an ingestion service (databases, EXIF, ML pipelines) stays
//! outside and talks to the engine through two hooks: a naming function
//! that assigns upload ids, and an on-complete callback invoked once a
//! binary has reached long-term storage.
//!
//! # Supported protocol extensions
//!
//! `creation`, `creation-with-upload`, `creation-defer-length`, `checksum`,
//! `concatenation`, `expiration`, `termination`.
//!
//! # Example
//!
//! ```ignore
//! use pixvault::{Tus, TusConfig};
//! use salvo_core::prelude::*;
//!
//! let mut config = TusConfig::default();
//! config.work_dir = "/srv/uploads/work".into();
//! config.media_dir = "/srv/uploads/media".into();
//!
//! let tus = Tus::new()
//!     .with_config(config)
//!     .with_on_upload_complete(|path, metadata| async move {
//!         println!("stored {path:?} ({metadata:?})");
//!         Ok(())
//!     });
//!
//! let router = Router::new().push(tus.into_router());
//! let acceptor = TcpListener::new("0.0.0.0:8000").bind().await;
//! Server::new(acceptor).serve(router).await;
//! ```
//!
//! # Endpoints
//!
//! The router created by `into_router()` serves, under the configured base
//! path:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | OPTIONS | `/` | Protocol capabilities |
//! | POST | `/` | Create an upload (plain, with-upload, partial, or final) |
//! | GET | `/` | Sweep expired uploads |
//! | HEAD | `/{id}` | Upload progress |
//! | PATCH | `/{id}` | Append a body chunk |
//! | GET | `/{id}` | Stream the stored bytes back |
//! | DELETE | `/{id}` | Terminate an upload |
//!
//! `X-HTTP-Method-Override` rewrites the effective verb before dispatch for
//! clients that cannot emit PATCH or DELETE.
//!
//! # Storage model
//!
//! Each upload owns a working directory `<work>/<id>/` holding the `.part`
//! accumulator and a transient `.stream` scratch per request body. Upload
//! records persist through a [`RecordStore`]; the default keeps one JSON
//! document per upload under `./tus-data/records`. Finished binaries are
//! content-sniffed, gated against an audio/video/image allow-list, and moved
//! to `<media>/[<group>/]<name>.<ext>` with a configurable collision policy.

use std::sync::Arc;

use salvo_core::http::Method;
use salvo_core::{Depot, Request, Router, handler};

mod concat;
mod finalize;
mod handlers;
mod ingest;
mod reaper;

pub mod checksum;
pub mod config;
pub mod error;
pub mod hooks;
pub mod layout;
pub mod lockers;
pub mod metadata;
pub mod mime;
pub mod store;
pub mod utils;

pub use crate::config::{MatchPolicy, TusConfig};
pub use crate::error::{ProtocolError, TusError, TusResult};
pub use crate::hooks::TusHooks;
pub use crate::layout::FileLayout;
pub use crate::lockers::{Locker, MemoryLocker};
pub use crate::metadata::MediaMetadata;
pub use crate::mime::MimeClassifier;
pub use crate::store::{DiskRecordStore, RecordStore, UploadRecord};

pub const TUS_VERSION: &str = "1.0.0";

pub const H_TUS_RESUMABLE: &str = "tus-resumable";
pub const H_TUS_VERSION: &str = "tus-version";
pub const H_TUS_EXTENSION: &str = "tus-extension";
pub const H_TUS_MAX_SIZE: &str = "tus-max-size";
pub const H_TUS_CHECKSUM_ALGORITHM: &str = "tus-checksum-algorithm";

pub const H_UPLOAD_LENGTH: &str = "upload-length";
pub const H_UPLOAD_OFFSET: &str = "upload-offset";
pub const H_UPLOAD_METADATA: &str = "upload-metadata";
pub const H_UPLOAD_CONCAT: &str = "upload-concat";
pub const H_UPLOAD_DEFER_LENGTH: &str = "upload-defer-length";
pub const H_UPLOAD_EXPIRES: &str = "upload-expires";
pub const H_UPLOAD_CHECKSUM: &str = "upload-checksum";

pub const H_METHOD_OVERRIDE: &str = "x-http-method-override";
pub const H_CONTENT_TYPE: &str = "content-type";
pub const H_CONTENT_LENGTH: &str = "content-length";
pub const CT_OFFSET_OCTET_STREAM: &str = "application/offset+octet-stream";

/// Comma list advertised in `Tus-Extension`.
pub const TUS_EXTENSIONS: &str =
    "creation,creation-with-upload,creation-defer-length,checksum,concatenation,expiration,termination";

#[derive(Clone)]
struct TusStateHoop {
    state: Arc<Tus>,
}

#[handler]
impl TusStateHoop {
    async fn handle(&self, depot: &mut Depot) {
        depot.inject(self.state.clone());
    }
}

/// The upload engine. Build one, configure it, then mount
/// [`into_router`](Tus::into_router) into your application.
#[derive(Clone)]
pub struct Tus {
    pub(crate) config: TusConfig,
    pub(crate) layout: FileLayout,
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) locker: Arc<dyn Locker>,
    pub(crate) mimes: MimeClassifier,
    pub(crate) hooks: TusHooks,
}

impl Default for Tus {
    fn default() -> Self {
        Self::new()
    }
}

impl Tus {
    pub fn new() -> Self {
        let config = TusConfig::default();
        Tus {
            layout: FileLayout::new(&config),
            store: Arc::new(DiskRecordStore::default()),
            locker: Arc::new(MemoryLocker::new()),
            mimes: MimeClassifier::new(),
            hooks: TusHooks::default(),
            config,
        }
    }

    /// Replaces the whole configuration. Note the default record store keeps
    /// its own root; pass [`with_store`](Tus::with_store) to move it.
    pub fn with_config(mut self, config: TusConfig) -> Self {
        self.layout = FileLayout::new(&config);
        self.config = config;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.base_path = path.into();
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn expire_minutes(mut self, minutes: i64) -> Self {
        self.config.expire_minutes = minutes;
        self
    }

    pub fn with_store(mut self, store: impl RecordStore) -> Self {
        self.store = Arc::new(store);
        self
    }

    pub fn with_locker(mut self, locker: impl Locker) -> Self {
        self.locker = Arc::new(locker);
        self
    }
}

// Hooks
impl Tus {
    /// Assigns upload ids. The returned id must be 32 hex characters.
    pub fn with_naming_function<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(&Request, Option<MediaMetadata>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TusResult<String>> + Send + 'static,
    {
        self.hooks.naming = Arc::new(move |req, metadata| Box::pin(f(req, metadata)));
        self
    }

    /// Runs after a finished upload reached long-term storage. Errors are
    /// logged and swallowed.
    pub fn with_on_upload_complete<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(std::path::PathBuf, Option<MediaMetadata>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TusResult<()>> + Send + 'static,
    {
        self.hooks.on_upload_complete = Some(Arc::new(move |path, metadata| {
            Box::pin(f(path, metadata))
        }));
        self
    }

    pub fn with_pre_complete<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.pre_complete = Some(Arc::new(move |id| Box::pin(f(id))));
        self
    }

    pub fn with_post_complete<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.post_complete = Some(Arc::new(move |id| Box::pin(f(id))));
        self
    }

    pub fn with_pre_expire<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.pre_expire = Some(Arc::new(move |id| Box::pin(f(id))));
        self
    }

    pub fn with_post_expire<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.post_expire = Some(Arc::new(move |id| Box::pin(f(id))));
        self
    }

    pub fn with_pre_terminate<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.pre_terminate = Some(Arc::new(move |id| Box::pin(f(id))));
        self
    }

    pub fn with_post_terminate<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.post_terminate = Some(Arc::new(move |id| Box::pin(f(id))));
        self
    }
}

impl Tus {
    /// Builds the protocol router. Verb matching goes through the effective
    /// method so `X-HTTP-Method-Override` is honored before dispatch.
    ///
    /// # Panics
    ///
    /// Panics when the configuration fails [`TusConfig::validate`]. A broken
    /// configuration must stop the service at mount time, not corrupt
    /// uploads later.
    pub fn into_router(self) -> Router {
        if let Err(err) = self.config.validate() {
            panic!("refusing to serve uploads: {err}");
        }
        let base_path = utils::normalize_path(&self.config.base_path);
        let state = Arc::new(self);

        Router::with_path(base_path)
            .hoop(TusStateHoop { state })
            .push(
                Router::new()
                    .filter_fn(|req, _| handlers::effective_method(req) == Method::OPTIONS)
                    .goal(handlers::server_options),
            )
            .push(
                Router::new()
                    .filter_fn(|req, _| handlers::effective_method(req) == Method::POST)
                    .goal(handlers::create),
            )
            .push(
                Router::new()
                    .filter_fn(|req, _| handlers::effective_method(req) == Method::GET)
                    .goal(handlers::reap_expired),
            )
            .push(
                Router::with_path("{id}")
                    .filter_fn(|req, _| handlers::effective_method(req) == Method::HEAD)
                    .goal(handlers::upload_info),
            )
            .push(
                Router::with_path("{id}")
                    .filter_fn(|req, _| handlers::effective_method(req) == Method::PATCH)
                    .goal(handlers::append),
            )
            .push(
                Router::with_path("{id}")
                    .filter_fn(|req, _| handlers::effective_method(req) == Method::GET)
                    .goal(handlers::download),
            )
            .push(
                Router::with_path("{id}")
                    .filter_fn(|req, _| handlers::effective_method(req) == Method::DELETE)
                    .goal(handlers::terminate),
            )
    }
}
