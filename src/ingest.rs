use std::path::Path;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use salvo_core::BoxedError;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::checksum::ChecksumClaim;
use crate::error::{TusError, TusResult};
use crate::layout::FileLayout;

pub(crate) type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxedError>> + Send>>;

const APPEND_CHUNK: usize = 4096;

pub(crate) struct IngestLimits {
    /// Current `.part` size.
    pub current_offset: u64,
    /// Declared total size, when known.
    pub upload_length: Option<u64>,
    pub max_file_size: u64,
}

/// Streams a request body into the upload's `.stream` scratch, verifies the
/// claimed checksum over the scratch alone, then appends the scratch to the
/// `.part`. Returns the new `.part` size.
///
/// The `.part` is only ever touched after the scratch has been fully
/// verified; every failure path removes the scratch and leaves the `.part`
/// as it was. A client disconnect is not a failure: the bytes that arrived
/// are kept, unless a checksum was claimed, in which case they cannot be
/// verified and are dropped.
pub(crate) async fn ingest_body(
    layout: &FileLayout,
    id: &str,
    mut body: BodyStream,
    checksum: Option<&ChecksumClaim>,
    limits: IngestLimits,
) -> TusResult<u64> {
    let scratch = layout.stream_path(id);
    let part = layout.part_path(id);

    let cap = limits
        .upload_length
        .map_or(limits.max_file_size, |l| l.min(limits.max_file_size));
    let remaining = cap.saturating_sub(limits.current_offset);

    let mut scratch_file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&scratch)
        .await?;

    let mut received: u64 = 0;
    let mut disconnected = false;
    while let Some(item) = body.next().await {
        match item {
            Ok(chunk) => {
                if received + chunk.len() as u64 > remaining {
                    drop(scratch_file);
                    discard(&scratch).await;
                    return Err(TusError::PayloadTooLarge);
                }
                if let Err(err) = scratch_file.write_all(&chunk).await {
                    drop(scratch_file);
                    discard(&scratch).await;
                    return Err(err.into());
                }
                received += chunk.len() as u64;
            }
            Err(err) => {
                tracing::warn!(id, error = %err, "client disconnected mid-body");
                disconnected = true;
                break;
            }
        }
    }
    if let Err(err) = scratch_file.flush().await {
        drop(scratch_file);
        discard(&scratch).await;
        return Err(err.into());
    }
    drop(scratch_file);

    if let Some(claim) = checksum {
        if disconnected {
            // an unverifiable partial body is worthless
            discard(&scratch).await;
            return Ok(limits.current_offset);
        }
        match claim.verify_file(&scratch).await {
            Ok(true) => {}
            Ok(false) => {
                discard(&scratch).await;
                return Err(TusError::ChecksumMismatch);
            }
            Err(err) => {
                discard(&scratch).await;
                return Err(err);
            }
        }
    }

    if let Err(err) = append_scratch(&scratch, &part).await {
        discard(&scratch).await;
        return Err(err);
    }
    discard(&scratch).await;

    let size = fs::metadata(&part).await?.len();
    tracing::debug!(id, received, offset = size, "appended request body");
    Ok(size)
}

async fn append_scratch(scratch: &Path, part: &Path) -> TusResult<()> {
    let mut src = fs::File::open(scratch).await?;
    let mut dst = fs::OpenOptions::new().append(true).open(part).await?;
    let mut buf = vec![0u8; APPEND_CHUNK];
    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        dst.write_all(&buf[..n]).await?;
    }
    dst.flush().await?;
    Ok(())
}

async fn discard(path: &Path) {
    if let Err(err) = fs::remove_file(path).await
        && err.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %err, "could not remove scratch file");
    }
}

#[cfg(test)]
mod tests {
    use futures_util::stream;

    use super::*;
    use crate::checksum::ChecksumClaim;
    use crate::config::TusConfig;

    const ID: &str = "0123456789abcdef0123456789abcdef";
    // sha1("hello")
    const SHA1_HELLO: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";

    async fn workspace(tmp: &Path) -> FileLayout {
        let mut config = TusConfig::default();
        config.work_dir = tmp.join("work");
        config.media_dir = tmp.join("media");
        let layout = FileLayout::new(&config);
        layout.create_workspace(ID).await.unwrap();
        layout
    }

    fn body_of(chunks: Vec<Result<Bytes, BoxedError>>) -> BodyStream {
        Box::pin(stream::iter(chunks))
    }

    fn limits(current: u64, length: Option<u64>) -> IngestLimits {
        IngestLimits {
            current_offset: current,
            upload_length: length,
            max_file_size: 1024,
        }
    }

    fn disconnect() -> Result<Bytes, BoxedError> {
        Err(Box::new(std::io::Error::other("peer reset")))
    }

    #[tokio::test]
    async fn appends_chunks_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = workspace(tmp.path()).await;

        let body = body_of(vec![Ok(Bytes::from("hel")), Ok(Bytes::from("lo"))]);
        let offset = ingest_body(&layout, ID, body, None, limits(0, Some(10)))
            .await
            .unwrap();
        assert_eq!(offset, 5);

        let body = body_of(vec![Ok(Bytes::from("world"))]);
        let offset = ingest_body(&layout, ID, body, None, limits(5, Some(10)))
            .await
            .unwrap();
        assert_eq!(offset, 10);

        let content = fs::read(layout.part_path(ID)).await.unwrap();
        assert_eq!(content, b"helloworld");
        assert!(fs::metadata(layout.stream_path(ID)).await.is_err());
    }

    #[tokio::test]
    async fn checksum_match_appends() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = workspace(tmp.path()).await;

        let claim = ChecksumClaim::parse(&format!("sha1 {SHA1_HELLO}")).unwrap();
        let body = body_of(vec![Ok(Bytes::from("hello"))]);
        let offset = ingest_body(&layout, ID, body, Some(&claim), limits(0, Some(5)))
            .await
            .unwrap();
        assert_eq!(offset, 5);
    }

    #[tokio::test]
    async fn checksum_mismatch_leaves_part_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = workspace(tmp.path()).await;

        let claim = ChecksumClaim::parse(&format!("sha1 {}", "0".repeat(40))).unwrap();
        let body = body_of(vec![Ok(Bytes::from("hello"))]);
        let err = ingest_body(&layout, ID, body, Some(&claim), limits(0, Some(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, TusError::ChecksumMismatch));
        assert_eq!(layout.part_size(ID).await, Some(0));
        assert!(fs::metadata(layout.stream_path(ID)).await.is_err());
    }

    #[tokio::test]
    async fn disconnect_without_checksum_keeps_received_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = workspace(tmp.path()).await;

        let body = body_of(vec![Ok(Bytes::from("par")), disconnect()]);
        let offset = ingest_body(&layout, ID, body, None, limits(0, Some(10)))
            .await
            .unwrap();
        assert_eq!(offset, 3);
        let content = fs::read(layout.part_path(ID)).await.unwrap();
        assert_eq!(content, b"par");
    }

    #[tokio::test]
    async fn disconnect_with_checksum_discards_the_scratch() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = workspace(tmp.path()).await;

        let claim = ChecksumClaim::parse(&format!("sha1 {SHA1_HELLO}")).unwrap();
        let body = body_of(vec![Ok(Bytes::from("par")), disconnect()]);
        let offset = ingest_body(&layout, ID, body, Some(&claim), limits(0, Some(10)))
            .await
            .unwrap();
        assert_eq!(offset, 0);
        assert_eq!(layout.part_size(ID).await, Some(0));
        assert!(fs::metadata(layout.stream_path(ID)).await.is_err());
    }

    #[tokio::test]
    async fn body_over_the_declared_length_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = workspace(tmp.path()).await;

        let body = body_of(vec![Ok(Bytes::from("too many bytes"))]);
        let err = ingest_body(&layout, ID, body, None, limits(0, Some(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, TusError::PayloadTooLarge));
        assert_eq!(layout.part_size(ID).await, Some(0));
        assert!(fs::metadata(layout.stream_path(ID)).await.is_err());
    }

    #[tokio::test]
    async fn deferred_length_is_bounded_by_max_file_size() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = workspace(tmp.path()).await;

        let body = body_of(vec![Ok(Bytes::from(vec![0u8; 2048]))]);
        let err = ingest_body(&layout, ID, body, None, limits(0, None))
            .await
            .unwrap_err();
        assert!(matches!(err, TusError::PayloadTooLarge));
    }
}
