use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{TusError, TusResult};

/// What to do when a finished upload's long-term path is already taken.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MatchPolicy {
    /// Append a random base36 suffix to the basename until the path is free.
    #[default]
    Rename,
    /// Remove the existing file and take its place.
    Replace,
}

impl MatchPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchPolicy::Rename => "RENAME",
            MatchPolicy::Replace => "REPLACE",
        }
    }
}

impl FromStr for MatchPolicy {
    type Err = TusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RENAME" => Ok(MatchPolicy::Rename),
            "REPLACE" => Ok(MatchPolicy::Replace),
            other => Err(TusError::Internal(format!(
                "match policy must be RENAME or REPLACE, got '{other}'"
            ))),
        }
    }
}

/// Engine settings. Everything here is immutable once the router is built.
#[derive(Clone, Debug)]
pub struct TusConfig {
    /// The route to accept requests.
    pub base_path: String,

    /// Minutes before an unfinished upload expires. Activity does not renew it.
    pub expire_minutes: i64,

    /// Prepended to the `.part` and `.stream` file names inside a working
    /// directory.
    pub upload_prefix: String,

    /// Working storage, one directory per upload id.
    pub work_dir: PathBuf,

    /// Long-term storage for finished uploads.
    pub media_dir: PathBuf,

    /// Sort long-term files into a subdirectory per top-level mime group
    /// (`image/`, `video/`, ...).
    pub sort_policy: bool,

    /// Long-term name collision handling.
    pub match_policy: MatchPolicy,

    /// Max declared or accumulated upload size in bytes.
    pub max_file_size: u64,

    /// Max request body size in bytes, advertised on OPTIONS.
    pub max_req_size: u64,
}

impl Default for TusConfig {
    fn default() -> Self {
        TusConfig {
            base_path: "/uploads".to_string(),
            expire_minutes: 60,
            upload_prefix: "tus-".to_string(),
            work_dir: "./tus-data/work".into(),
            media_dir: "./tus-data/media".into(),
            sort_policy: true,
            match_policy: MatchPolicy::Rename,
            max_file_size: 2 * 1024 * 1024 * 1024,
            max_req_size: 64 * 1024 * 1024,
        }
    }
}

impl TusConfig {
    /// Startup sanity checks. Runs when the router is built; a value that
    /// fails here never serves a request.
    pub fn validate(&self) -> TusResult<()> {
        if self.expire_minutes <= 0 {
            return Err(TusError::Internal(
                "expire_minutes must be greater than 0".into(),
            ));
        }
        if self.max_file_size == 0 || self.max_req_size == 0 {
            return Err(TusError::Internal(
                "max_file_size and max_req_size must be greater than 0".into(),
            ));
        }
        if !self.base_path.starts_with('/') {
            return Err(TusError::Internal("base_path must start with '/'".into()));
        }
        Ok(())
    }
}
