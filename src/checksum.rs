use std::path::Path;

use digest::DynDigest;
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::error::{TusError, TusResult};

/// Comma list advertised in `Tus-Checksum-Algorithm`.
pub const SUPPORTED_ALGORITHMS: &str =
    "md5,sha1,sha224,sha256,sha384,sha512,sha3_224,sha3_256,sha3_384,sha3_512";

const DIGEST_CHUNK: usize = 8192;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Sha3_224,
    Sha3_256,
    Sha3_384,
    Sha3_512,
}

impl ChecksumAlgorithm {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "md5" => Some(Self::Md5),
            "sha1" => Some(Self::Sha1),
            "sha224" => Some(Self::Sha224),
            "sha256" => Some(Self::Sha256),
            "sha384" => Some(Self::Sha384),
            "sha512" => Some(Self::Sha512),
            "sha3_224" => Some(Self::Sha3_224),
            "sha3_256" => Some(Self::Sha3_256),
            "sha3_384" => Some(Self::Sha3_384),
            "sha3_512" => Some(Self::Sha3_512),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
            Self::Sha3_224 => "sha3_224",
            Self::Sha3_256 => "sha3_256",
            Self::Sha3_384 => "sha3_384",
            Self::Sha3_512 => "sha3_512",
        }
    }

    /// Canonical hex digest length.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha1 => 40,
            Self::Sha224 | Self::Sha3_224 => 56,
            Self::Sha256 | Self::Sha3_256 => 64,
            Self::Sha384 | Self::Sha3_384 => 96,
            Self::Sha512 | Self::Sha3_512 => 128,
        }
    }

    fn hasher(&self) -> Box<dyn DynDigest + Send> {
        match self {
            Self::Md5 => Box::new(md5::Md5::default()),
            Self::Sha1 => Box::new(sha1::Sha1::default()),
            Self::Sha224 => Box::new(sha2::Sha224::default()),
            Self::Sha256 => Box::new(sha2::Sha256::default()),
            Self::Sha384 => Box::new(sha2::Sha384::default()),
            Self::Sha512 => Box::new(sha2::Sha512::default()),
            Self::Sha3_224 => Box::new(sha3::Sha3_224::default()),
            Self::Sha3_256 => Box::new(sha3::Sha3_256::default()),
            Self::Sha3_384 => Box::new(sha3::Sha3_384::default()),
            Self::Sha3_512 => Box::new(sha3::Sha3_512::default()),
        }
    }
}

/// A parsed `Upload-Checksum` header: algorithm plus expected hex digest.
/// Applies to the request body only, never to previously stored bytes.
#[derive(Clone, Debug)]
pub struct ChecksumClaim {
    pub algorithm: ChecksumAlgorithm,
    expected: String,
}

impl ChecksumClaim {
    /// Any malformation of the header is a checksum failure, not a generic
    /// bad request: empty value, more or less than one space, an unknown
    /// algorithm, or a digest with the wrong length or charset.
    pub fn parse(raw: &str) -> TusResult<ChecksumClaim> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TusError::ChecksumMismatch);
        }
        let (name, digest) = raw.split_once(' ').ok_or(TusError::ChecksumMismatch)?;
        if digest.contains(' ') {
            return Err(TusError::ChecksumMismatch);
        }
        let algorithm =
            ChecksumAlgorithm::from_name(name).ok_or(TusError::ChecksumMismatch)?;
        if digest.len() != algorithm.hex_len()
            || !digest.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(TusError::ChecksumMismatch);
        }
        Ok(ChecksumClaim {
            algorithm,
            expected: digest.to_ascii_lowercase(),
        })
    }

    /// Streams `path` through the claimed digest and compares hex values
    /// case-insensitively.
    pub async fn verify_file(&self, path: &Path) -> TusResult<bool> {
        let mut file = fs::File::open(path).await?;
        let mut hasher = self.algorithm.hasher();
        let mut buf = vec![0u8; DIGEST_CHUNK];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let computed = hex::encode(hasher.finalize());
        tracing::debug!(
            algorithm = self.algorithm.name(),
            %computed,
            expected = %self.expected,
            "verified body checksum"
        );
        Ok(computed == self.expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // sha1("hello")
    const SHA1_HELLO: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";

    #[test]
    fn parses_a_well_formed_claim() {
        let claim = ChecksumClaim::parse(&format!("sha1 {SHA1_HELLO}")).unwrap();
        assert_eq!(claim.algorithm, ChecksumAlgorithm::Sha1);
    }

    #[test]
    fn rejects_malformed_claims() {
        let cases = vec![
            String::new(),
            "   ".to_string(),
            "sha1".to_string(),
            format!("sha1  {SHA1_HELLO}"),
            format!("sha1 {SHA1_HELLO} extra"),
            format!("whirlpool {SHA1_HELLO}"),
            "sha1 abc".to_string(),
            "sha1 zzf4c61ddcc5e8a2dabede0f3b482cd9aea9434d".to_string(),
            // right digest, wrong algorithm for its length
            format!("sha256 {SHA1_HELLO}"),
        ];
        for raw in cases {
            let err = ChecksumClaim::parse(&raw).unwrap_err();
            assert!(matches!(err, TusError::ChecksumMismatch), "raw: {raw:?}");
        }
    }

    #[test]
    fn every_advertised_algorithm_parses() {
        for name in SUPPORTED_ALGORITHMS.split(',') {
            let algorithm = ChecksumAlgorithm::from_name(name).unwrap();
            assert_eq!(algorithm.name(), name);
            let digest = "a".repeat(algorithm.hex_len());
            assert!(ChecksumClaim::parse(&format!("{name} {digest}")).is_ok());
        }
    }

    #[tokio::test]
    async fn verifies_a_file_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body");
        fs::write(&path, "hello").await.unwrap();

        let claim = ChecksumClaim::parse(&format!("sha1 {SHA1_HELLO}")).unwrap();
        assert!(claim.verify_file(&path).await.unwrap());

        let claim = ChecksumClaim::parse(&format!("sha1 {}", "0".repeat(40))).unwrap();
        assert!(!claim.verify_file(&path).await.unwrap());
    }

    #[tokio::test]
    async fn digest_comparison_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body");
        fs::write(&path, "hello").await.unwrap();

        let upper = SHA1_HELLO.to_ascii_uppercase();
        let claim = ChecksumClaim::parse(&format!("sha1 {upper}")).unwrap();
        assert!(claim.verify_file(&path).await.unwrap());
    }

    #[tokio::test]
    async fn md5_and_sha3_digests_match_known_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body");
        fs::write(&path, "hello").await.unwrap();

        // md5("hello")
        let claim = ChecksumClaim::parse("md5 5d41402abc4b2a76b9719d911017c592").unwrap();
        assert!(claim.verify_file(&path).await.unwrap());

        // sha3_256("hello")
        let claim = ChecksumClaim::parse(
            "sha3_256 3338be694f50c5f338814986cdf0686453a888b84f424d792af4b9202398f392",
        )
        .unwrap();
        assert!(claim.verify_file(&path).await.unwrap());
    }
}
