use std::path::Path;

use tokio::fs;
use tokio::io::AsyncReadExt;

/// Media types this server will keep. Anything sniffing outside these three
/// groups is removed at completion time.
const AUDIO_TYPES: &[&str] = &[
    "audio/aac",
    "audio/ogg",
    "audio/oga",
    "audio/mpeg",
    "audio/webm",
    "audio/wave",
    "audio/wav",
];

const VIDEO_TYPES: &[&str] = &[
    "video/mp4",
    "video/mpeg",
    "video/ogg",
    "video/ogv",
    "video/jpeg",
    "video/x-msvideo",
    "video/webm",
    "video/x-matroska",
];

const IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/pjpeg",
    "image/png",
    "image/apng",
    "image/avif",
    "image/gif",
    "image/webp",
    "image/svg+xml",
];

const SNIFF_LEN: usize = 8192;

/// Sniffs finished binaries and answers whether a media type is one this
/// server accepts.
#[derive(Clone, Copy, Debug, Default)]
pub struct MimeClassifier;

impl MimeClassifier {
    pub fn new() -> Self {
        MimeClassifier
    }

    pub fn is_supported(&self, mime: &str) -> bool {
        AUDIO_TYPES.contains(&mime) || VIDEO_TYPES.contains(&mime) || IMAGE_TYPES.contains(&mime)
    }

    /// Determines a file's media type from its leading bytes. Returns `None`
    /// when the content matches no known signature.
    pub async fn sniff(&self, path: &Path) -> Option<String> {
        let mut file = fs::File::open(path).await.ok()?;
        let mut buf = vec![0u8; SNIFF_LEN];
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..]).await.ok()?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        let head = &buf[..filled];
        if head.is_empty() {
            return None;
        }

        if let Some(kind) = infer::get(head) {
            return Some(kind.mime_type().to_string());
        }

        // SVG is text and carries no magic bytes.
        if let Ok(text) = std::str::from_utf8(head) {
            let text = text.trim_start_matches('\u{feff}').trim_start();
            if text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg")) {
                return Some("image/svg+xml".to_string());
            }
        }

        None
    }

    /// The media type used for the completion gate and the long-term path.
    /// A successful sniff is authoritative; content with no recognizable
    /// signature falls back to the declared type.
    pub async fn detect(&self, path: &Path, declared: &str) -> String {
        match self.sniff(path).await {
            Some(mime) => mime,
            None => declared.to_string(),
        }
    }
}
