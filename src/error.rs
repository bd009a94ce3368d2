use salvo_core::http::StatusCode;
use salvo_core::{Depot, Request, Response, Writer, async_trait};

pub type TusResult<T> = Result<T, TusError>;

/// tus "Checksum Mismatch". Not a registered status code, but the one the
/// checksum extension specifies.
pub const STATUS_CHECKSUM_MISMATCH: u16 = 460;

/// Header and request-format violations detected before any state changes.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid Upload-Defer-Length header, value must be 1")]
    InvalidDeferLength,
    #[error("invalid Upload-Concat header, value must be 'partial' or 'final; <url list>'")]
    InvalidConcat,
    #[error("exactly one of Upload-Length and Upload-Defer-Length must be present")]
    InvalidLength,
    #[error("invalid Content-Type header, expected application/offset+octet-stream")]
    InvalidContentType,
    #[error("missing header: {0}")]
    MissingHeader(&'static str),
    #[error("invalid integer header: {0}")]
    InvalidInt(&'static str),
    #[error(
        "invalid Upload-Metadata header, expected comma-separated '<key> <base64 value>' pairs \
         with unique, space-free keys"
    )]
    InvalidMetadata,
    #[error("missing '{0}' attribute in Upload-Metadata")]
    MissingMetadataField(&'static str),
    #[error("missing or invalid upload id")]
    InvalidUploadId,
    #[error("invalid X-HTTP-Method-Override header")]
    InvalidMethodOverride,
}

#[derive(Debug, thiserror::Error)]
pub enum TusError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("upload not found")]
    NotFound,

    #[error("offset mismatch: upload is at {expected}, request said {got}")]
    OffsetMismatch { expected: u64, got: u64 },

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("unsupported media type")]
    UnsupportedMediaType,

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("upload {0} already exists")]
    AlreadyExists(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal: {0}")]
    Internal(String),
}

impl TusError {
    pub fn status(&self) -> StatusCode {
        match self {
            TusError::Protocol(_) => StatusCode::BAD_REQUEST,
            TusError::NotFound => StatusCode::NOT_FOUND,
            TusError::OffsetMismatch { .. } => StatusCode::CONFLICT,
            TusError::AlreadyExists(_) => StatusCode::CONFLICT,
            TusError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            TusError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            TusError::ChecksumMismatch => StatusCode::from_u16(STATUS_CHECKSUM_MISMATCH)
                .unwrap_or(StatusCode::BAD_REQUEST),
            TusError::Io(_) | TusError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[async_trait]
impl Writer for TusError {
    async fn write(self, _req: &mut Request, _depot: &mut Depot, res: &mut Response) {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "upload request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "rejecting upload request");
        }
        res.status_code(status);
        if status == StatusCode::BAD_REQUEST {
            res.render(self.to_string());
        }
    }
}
