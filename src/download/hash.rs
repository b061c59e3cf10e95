//! Checksum verification of the assembled output.
//!
//! # Supported Algorithms
//!
//! | Name      | Hex length |
//! |-----------|------------|
//! | `MD5`     | 32         |
//! | `SHA-1`   | 40         |
//! | `SHA-224` | 56         |
//! | `SHA-256` | 64         |
//! | `SHA-384` | 96         |
//! | `SHA-512` | 128        |
//!
//! Names are matched case-insensitively, with or without the dash. When no
//! name is given, the algorithm is detected from the length of the expected
//! digest.
//!
//! # Examples
//!
//! ```rust
//! use splitlink::download::hash::{detect_hash_type, HashAlgorithm};
//!
//! assert_eq!("sha256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
//! assert_eq!("SHA-1".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha1);
//! assert_eq!(
//!     detect_hash_type("d41d8cd98f00b204e9800998ecf8427e"),
//!     Some(HashAlgorithm::Md5)
//! );
//! assert_eq!(detect_hash_type("not a digest"), None);
//! ```

use crate::error::{Error, Result};

use digest::DynDigest;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Every supported algorithm.
    pub const ALL: [HashAlgorithm; 6] = [
        HashAlgorithm::Md5,
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha224,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha512,
    ];

    /// Canonical name, e.g. `SHA-256`.
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "MD5",
            HashAlgorithm::Sha1 => "SHA-1",
            HashAlgorithm::Sha224 => "SHA-224",
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha384 => "SHA-384",
            HashAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Length of a digest in hex characters.
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Md5 => 32,
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Sha224 => 56,
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha384 => 96,
            HashAlgorithm::Sha512 => 128,
        }
    }

    /// A fresh hasher for this algorithm.
    pub fn hasher(&self) -> Box<dyn DynDigest + Send> {
        match self {
            HashAlgorithm::Md5 => Box::new(md5::Md5::default()),
            HashAlgorithm::Sha1 => Box::new(sha1::Sha1::default()),
            HashAlgorithm::Sha224 => Box::new(sha2::Sha224::default()),
            HashAlgorithm::Sha256 => Box::new(sha2::Sha256::default()),
            HashAlgorithm::Sha384 => Box::new(sha2::Sha384::default()),
            HashAlgorithm::Sha512 => Box::new(sha2::Sha512::default()),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_'))
            .collect::<String>()
            .to_ascii_lowercase();
        HashAlgorithm::ALL
            .into_iter()
            .find(|algorithm| algorithm.name().replace('-', "").eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| Error::Validation(format!("unknown checksum algorithm `{}`", s)))
    }
}

/// Detect the algorithm of a hex digest from its length.
///
/// Returns `None` if `hash` is not hex or has no matching length.
pub fn detect_hash_type(hash: &str) -> Option<HashAlgorithm> {
    let hash = hash.trim();
    if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    HashAlgorithm::ALL
        .into_iter()
        .find(|algorithm| algorithm.hex_len() == hash.len())
}

/// An expected digest, with the algorithm it was computed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    /// Expected digest in hex.
    pub expected: String,
    /// Algorithm name; detected from `expected` when absent.
    pub algorithm: Option<String>,
}

impl Checksum {
    /// A checksum whose algorithm is detected from the digest length.
    pub fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            algorithm: None,
        }
    }

    /// A checksum computed with the named algorithm.
    pub fn with_algorithm(expected: impl Into<String>, algorithm: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            algorithm: Some(algorithm.into()),
        }
    }

    /// Resolves the algorithm.
    ///
    /// Fails with [`Error::Validation`] for unknown names and for digests
    /// whose length matches no algorithm.
    pub fn resolve(&self) -> Result<HashAlgorithm> {
        match &self.algorithm {
            Some(name) => name.parse(),
            None => detect_hash_type(&self.expected).ok_or_else(|| {
                Error::Validation(format!(
                    "cannot detect the algorithm of checksum `{}`",
                    self.expected
                ))
            }),
        }
    }

    /// Returns `true` if `computed` matches, ignoring case.
    pub fn matches(&self, computed: &str) -> bool {
        self.expected.trim().eq_ignore_ascii_case(computed.trim())
    }
}

/// Computes the lowercase hex digest of a file.
pub async fn digest_file(path: &Path, algorithm: HashAlgorithm) -> Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = algorithm.hasher();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Verify the digest of a local file against an expected checksum.
///
/// Returns the computed digest and whether it matches.
pub async fn verify_hash(path: &Path, checksum: &Checksum) -> Result<(HashAlgorithm, String, bool)> {
    let algorithm = checksum.resolve()?;
    let computed = digest_file(path, algorithm).await?;
    let matches = checksum.matches(&computed);
    Ok((algorithm, computed, matches))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";
    const HELLO_SHA1: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";
    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_parse_algorithm_names() {
        assert_eq!("MD5".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Md5);
        assert_eq!("sha-1".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha1);
        assert_eq!("SHA224".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha224);
        assert_eq!("sha_512".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha512);
        assert!(matches!(
            "crc32".parse::<HashAlgorithm>(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_detect_hash_type() {
        assert_eq!(detect_hash_type(HELLO_MD5), Some(HashAlgorithm::Md5));
        assert_eq!(detect_hash_type(HELLO_SHA1), Some(HashAlgorithm::Sha1));
        assert_eq!(detect_hash_type(HELLO_SHA256), Some(HashAlgorithm::Sha256));
        assert_eq!(detect_hash_type(&"a".repeat(128)), Some(HashAlgorithm::Sha512));

        // Too short for MD5
        assert_eq!(detect_hash_type(&HELLO_MD5[..30]), None);
        // Contains non-hex characters
        assert_eq!(detect_hash_type(&HELLO_MD5.replace('5', "g")), None);
    }

    #[test]
    fn test_checksum_resolve() {
        assert_eq!(Checksum::new(HELLO_SHA1).resolve().unwrap(), HashAlgorithm::Sha1);
        assert_eq!(
            Checksum::with_algorithm(HELLO_MD5, "md5").resolve().unwrap(),
            HashAlgorithm::Md5
        );
        assert!(matches!(
            Checksum::new("xyz").resolve(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_match_ignores_case() {
        let checksum = Checksum::new(HELLO_MD5.to_uppercase());
        assert!(checksum.matches(HELLO_MD5));
        assert!(!checksum.matches(HELLO_SHA1));
    }

    #[tokio::test]
    async fn test_digest_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello").unwrap();

        assert_eq!(digest_file(&path, HashAlgorithm::Md5).await.unwrap(), HELLO_MD5);
        assert_eq!(digest_file(&path, HashAlgorithm::Sha1).await.unwrap(), HELLO_SHA1);
        assert_eq!(digest_file(&path, HashAlgorithm::Sha256).await.unwrap(), HELLO_SHA256);
    }

    #[tokio::test]
    async fn test_verify_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello").unwrap();

        let (algorithm, computed, matches) =
            verify_hash(&path, &Checksum::new(HELLO_SHA256.to_uppercase())).await.unwrap();
        assert_eq!(algorithm, HashAlgorithm::Sha256);
        assert_eq!(computed, HELLO_SHA256);
        assert!(matches);

        let (_, _, matches) = verify_hash(&path, &Checksum::new(HELLO_MD5.replace('5', "6")))
            .await
            .unwrap();
        assert!(!matches);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let result = verify_hash(Path::new("does/not/exist"), &Checksum::new(HELLO_MD5)).await;
        assert!(matches!(result, Err(Error::IOError { .. })));
    }
}
