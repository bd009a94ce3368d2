use std::collections::HashSet;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, TusError, TusResult};
use crate::mime::MimeClassifier;

// tus clients commonly send unpadded base64 values.
const B64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// The typed shape of `Upload-Metadata` for media uploads: a required
/// `filename` and `filetype`, plus any other keys in the order they were
/// received.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub filename: String,
    pub filetype: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<(String, String)>,
}

impl MediaMetadata {
    /// Parses an `Upload-Metadata` header value.
    ///
    /// The value MUST consist of one or more comma-separated key-value pairs.
    /// The key and value MUST be separated by a space; the key MUST NOT
    /// contain spaces or commas and MUST NOT be empty; all keys MUST be
    /// unique; the value is base64-encoded UTF-8.
    pub fn parse(raw: &str) -> Result<MediaMetadata, ProtocolError> {
        let pairs = parse_pairs(raw)?;

        let mut filename = None;
        let mut filetype = None;
        let mut extra = Vec::new();
        for (key, value) in pairs {
            match key.as_str() {
                "filename" => filename = Some(value),
                "filetype" => filetype = Some(value),
                _ => extra.push((key, value)),
            }
        }

        let filename = filename.ok_or(ProtocolError::MissingMetadataField("filename"))?;
        let filetype = filetype.ok_or(ProtocolError::MissingMetadataField("filetype"))?;
        Ok(MediaMetadata {
            filename,
            filetype,
            extra,
        })
    }
}

fn parse_pairs(raw: &str) -> Result<Vec<(String, String)>, ProtocolError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ProtocolError::InvalidMetadata);
    }

    let mut pairs = Vec::new();
    let mut seen = HashSet::new();

    for item in raw.split(',') {
        let item = item.trim();
        if item.is_empty() {
            return Err(ProtocolError::InvalidMetadata);
        }

        let (key, encoded) = match item.split_once(' ') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (item, ""),
        };

        if key.is_empty() || key.contains(' ') || key.contains(',') {
            return Err(ProtocolError::InvalidMetadata);
        }
        if !seen.insert(key.to_string()) {
            return Err(ProtocolError::InvalidMetadata);
        }

        let decoded = B64
            .decode(encoded)
            .map_err(|_| ProtocolError::InvalidMetadata)?;
        let value = String::from_utf8(decoded).map_err(|_| ProtocolError::InvalidMetadata)?;

        pairs.push((key.to_string(), value));
    }

    Ok(pairs)
}

/// Parses the metadata a non-partial create must carry and gates the declared
/// type against the allow-list. The declared type is re-checked by sniffing
/// the finished binary at completion time.
pub(crate) fn parse_required_metadata(
    raw: Option<&str>,
    mimes: &MimeClassifier,
) -> TusResult<MediaMetadata> {
    let raw = raw.ok_or(ProtocolError::MissingHeader(crate::H_UPLOAD_METADATA))?;
    let metadata = MediaMetadata::parse(raw)?;
    if !mimes.is_supported(&metadata.filetype) {
        return Err(TusError::UnsupportedMediaType);
    }
    Ok(metadata)
}
