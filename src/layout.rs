use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use uuid::Uuid;

use crate::config::{MatchPolicy, TusConfig};
use crate::error::{TusError, TusResult};

const SUFFIX_LEN: usize = 10;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Builds every path the engine touches: the per-upload working directory
/// with its `.part` accumulator and `.stream` scratch, and the long-term
/// destination of a finished upload.
#[derive(Clone, Debug)]
pub struct FileLayout {
    work_dir: PathBuf,
    media_dir: PathBuf,
    upload_prefix: String,
    sort_policy: bool,
    match_policy: MatchPolicy,
}

impl FileLayout {
    pub fn new(config: &TusConfig) -> Self {
        FileLayout {
            work_dir: config.work_dir.clone(),
            media_dir: config.media_dir.clone(),
            upload_prefix: config.upload_prefix.clone(),
            sort_policy: config.sort_policy,
            match_policy: config.match_policy,
        }
    }

    pub fn upload_dir(&self, id: &str) -> PathBuf {
        self.work_dir.join(id)
    }

    /// The accumulator holding every durably stored byte of an upload. Its
    /// size is the upload's offset.
    pub fn part_path(&self, id: &str) -> PathBuf {
        self.upload_dir(id)
            .join(format!("{}{}.part", self.upload_prefix, id))
    }

    /// Scratch buffer a single request body is streamed into before it is
    /// verified and appended to the `.part`.
    pub fn stream_path(&self, id: &str) -> PathBuf {
        self.upload_dir(id)
            .join(format!("{}{}.stream", self.upload_prefix, id))
    }

    /// Creates the working directory and an empty `.part`. The directory
    /// must not already exist.
    pub async fn create_workspace(&self, id: &str) -> TusResult<()> {
        fs::create_dir_all(&self.work_dir).await?;
        let dir = self.upload_dir(id);
        fs::create_dir(&dir).await.map_err(|err| {
            if err.kind() == io::ErrorKind::AlreadyExists {
                TusError::AlreadyExists(id.to_string())
            } else {
                TusError::from(err)
            }
        })?;
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.part_path(id))
            .await?;
        tracing::debug!(id, dir = %dir.display(), "created upload workspace");
        Ok(())
    }

    /// Recursively removes the working directory. Missing directories are
    /// fine.
    pub async fn remove_workspace(&self, id: &str) -> TusResult<()> {
        let dir = self.upload_dir(id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::debug!(id, dir = %dir.display(), "removed upload workspace");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Byte length of the `.part`, or `None` once it no longer exists.
    pub async fn part_size(&self, id: &str) -> Option<u64> {
        fs::metadata(self.part_path(id)).await.ok().map(|m| m.len())
    }

    /// Resolves the long-term destination for a finished upload: basename
    /// from the requested filename minus its extension, extension from the
    /// media type, an optional mime-group subdirectory, and the collision
    /// policy applied to the result.
    pub async fn lts_destination(
        &self,
        id: &str,
        filename: &str,
        mime: &str,
    ) -> TusResult<PathBuf> {
        let (group, extension) = mime
            .split_once('/')
            .filter(|(g, e)| !g.is_empty() && !e.is_empty())
            .ok_or_else(|| TusError::Internal(format!("malformed media type '{mime}'")))?;

        fs::create_dir_all(&self.media_dir).await?;
        let mut target_dir = self.media_dir.clone();
        if self.sort_policy {
            let sorted = self.media_dir.join(group);
            match fs::create_dir_all(&sorted).await {
                Ok(()) => target_dir = sorted,
                Err(err) => {
                    // keep the upload, just unsorted
                    tracing::warn!(group, error = %err, "cannot create sort directory");
                }
            }
        }

        let stem = file_stem(filename).unwrap_or_else(|| id.to_string());
        let candidate = target_dir.join(format!("{stem}.{extension}"));
        if !path_exists(&candidate).await {
            return Ok(candidate);
        }

        match self.match_policy {
            MatchPolicy::Replace => {
                fs::remove_file(&candidate).await?;
                Ok(candidate)
            }
            MatchPolicy::Rename => {
                loop {
                    let renamed =
                        target_dir.join(format!("{stem}-{}.{extension}", random_suffix()));
                    if !path_exists(&renamed).await {
                        return Ok(renamed);
                    }
                }
            }
        }
    }
}

async fn path_exists(path: &Path) -> bool {
    fs::metadata(path).await.is_ok()
}

/// The requested filename reduced to a safe basename without its extension.
/// Path components and dot-names are not trusted.
fn file_stem(filename: &str) -> Option<String> {
    let trimmed = filename.trim();
    if trimmed.is_empty() {
        return None;
    }
    let name = Path::new(trimmed).file_name()?.to_string_lossy().to_string();
    if name == "." || name == ".." {
        return None;
    }
    let stem = Path::new(&name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or(name);
    if stem.is_empty() {
        return None;
    }
    Some(stem)
}

fn random_suffix() -> String {
    Uuid::new_v4()
        .as_bytes()
        .iter()
        .take(SUFFIX_LEN)
        .map(|b| BASE36[(b % 36) as usize] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout_in(dir: &Path, sort: bool, policy: MatchPolicy) -> FileLayout {
        let mut config = TusConfig::default();
        config.work_dir = dir.join("work");
        config.media_dir = dir.join("media");
        config.sort_policy = sort;
        config.match_policy = policy;
        FileLayout::new(&config)
    }

    #[test]
    fn paths_are_deterministic() {
        let config = TusConfig {
            work_dir: "/srv/work".into(),
            upload_prefix: "tus-".into(),
            ..TusConfig::default()
        };
        let layout = FileLayout::new(&config);
        let id = "0123456789abcdef0123456789abcdef";
        assert_eq!(
            layout.part_path(id),
            PathBuf::from(format!("/srv/work/{id}/tus-{id}.part"))
        );
        assert_eq!(
            layout.stream_path(id),
            PathBuf::from(format!("/srv/work/{id}/tus-{id}.stream"))
        );
    }

    #[test]
    fn file_stem_strips_extension_and_path_parts() {
        assert_eq!(file_stem("photo.jpeg"), Some("photo".to_string()));
        assert_eq!(file_stem("archive.tar.gz"), Some("archive.tar".to_string()));
        assert_eq!(file_stem("/tmp/../etc/passwd"), Some("passwd".to_string()));
        assert_eq!(file_stem("noext"), Some("noext".to_string()));
        assert_eq!(file_stem(""), None);
        assert_eq!(file_stem(".."), None);
    }

    #[test]
    fn random_suffix_is_ten_base36_chars() {
        let s = random_suffix();
        assert_eq!(s.len(), 10);
        assert!(s.bytes().all(|b| BASE36.contains(&b)));
        assert_ne!(random_suffix(), random_suffix());
    }

    #[tokio::test]
    async fn workspace_lifecycle() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = layout_in(tmp.path(), true, MatchPolicy::Rename);
        let id = "0123456789abcdef0123456789abcdef";

        layout.create_workspace(id).await.unwrap();
        assert_eq!(layout.part_size(id).await, Some(0));

        // double create is refused
        assert!(matches!(
            layout.create_workspace(id).await,
            Err(TusError::AlreadyExists(_))
        ));

        layout.remove_workspace(id).await.unwrap();
        assert_eq!(layout.part_size(id).await, None);
        // removal is idempotent
        layout.remove_workspace(id).await.unwrap();
    }

    #[tokio::test]
    async fn sorted_destination_uses_the_mime_group() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = layout_in(tmp.path(), true, MatchPolicy::Rename);
        let dest = layout
            .lts_destination("id0", "holiday.raw", "image/png")
            .await
            .unwrap();
        assert_eq!(dest, tmp.path().join("media/image/holiday.png"));

        let layout = layout_in(tmp.path(), false, MatchPolicy::Rename);
        let dest = layout
            .lts_destination("id0", "holiday.raw", "image/png")
            .await
            .unwrap();
        assert_eq!(dest, tmp.path().join("media/holiday.png"));
    }

    #[tokio::test]
    async fn rename_policy_appends_a_suffix_on_collision() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = layout_in(tmp.path(), false, MatchPolicy::Rename);

        fs::create_dir_all(tmp.path().join("media")).await.unwrap();
        fs::write(tmp.path().join("media/holiday.png"), b"old")
            .await
            .unwrap();

        let dest = layout
            .lts_destination("id0", "holiday.png", "image/png")
            .await
            .unwrap();
        assert_ne!(dest, tmp.path().join("media/holiday.png"));
        let name = dest.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("holiday-"));
        assert!(name.ends_with(".png"));
        // the original survives
        assert!(fs::metadata(tmp.path().join("media/holiday.png")).await.is_ok());
    }

    #[tokio::test]
    async fn replace_policy_removes_the_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = layout_in(tmp.path(), false, MatchPolicy::Replace);

        fs::create_dir_all(tmp.path().join("media")).await.unwrap();
        fs::write(tmp.path().join("media/holiday.png"), b"old")
            .await
            .unwrap();

        let dest = layout
            .lts_destination("id0", "holiday.png", "image/png")
            .await
            .unwrap();
        assert_eq!(dest, tmp.path().join("media/holiday.png"));
        assert!(fs::metadata(&dest).await.is_err());
    }

    #[tokio::test]
    async fn unusable_filename_falls_back_to_the_id() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = layout_in(tmp.path(), false, MatchPolicy::Rename);
        let dest = layout
            .lts_destination("abc123", "..", "image/png")
            .await
            .unwrap();
        assert_eq!(dest, tmp.path().join("media/abc123.png"));
    }

    #[tokio::test]
    async fn malformed_mime_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = layout_in(tmp.path(), false, MatchPolicy::Rename);
        assert!(layout.lts_destination("id0", "a.png", "png").await.is_err());
        assert!(layout.lts_destination("id0", "a.png", "image/").await.is_err());
    }
}
