use digest::Digest;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::Sha256;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tokio::io::AsyncReadExt;

const READ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Invalid {algorithm} digest {value:?}: {reason}")]
    InvalidDigest {
        algorithm: DigestAlgorithm,
        value: String,
        reason: String,
    },

    #[error("Verification failed: expected {expected}, got {actual}")]
    VerificationFailed {
        expected: ContentDigest,
        actual: ContentDigest,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    Sha256,
}

impl DigestAlgorithm {
    pub fn output_len(self) -> usize {
        match self {
            DigestAlgorithm::Md5 => 16,
            DigestAlgorithm::Sha1 => 20,
            DigestAlgorithm::Sha256 => 32,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "md5",
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Content digest of an attachment, tagged with the algorithm that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContentDigest {
    algorithm: DigestAlgorithm,
    bytes: Vec<u8>,
}

impl ContentDigest {
    pub fn from_hex(algorithm: DigestAlgorithm, value: &str) -> Result<Self, VerificationError> {
        let bytes = hex::decode(value.trim()).map_err(|e| VerificationError::InvalidDigest {
            algorithm,
            value: value.to_string(),
            reason: e.to_string(),
        })?;

        if bytes.len() != algorithm.output_len() {
            return Err(VerificationError::InvalidDigest {
                algorithm,
                value: value.to_string(),
                reason: format!(
                    "expected {} bytes, got {}",
                    algorithm.output_len(),
                    bytes.len()
                ),
            });
        }

        Ok(Self { algorithm, bytes })
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Digest of an in-memory buffer.
    pub fn of(algorithm: DigestAlgorithm, data: impl AsRef<[u8]>) -> Self {
        let mut hasher = ContentDigestHasher::new(algorithm);
        hasher.update(data);
        hasher.finalize()
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

enum HasherState {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
}

pub struct ContentDigestHasher {
    algorithm: DigestAlgorithm,
    state: HasherState,
}

impl ContentDigestHasher {
    #[inline]
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        let state = match algorithm {
            DigestAlgorithm::Md5 => HasherState::Md5(Md5::new()),
            DigestAlgorithm::Sha1 => HasherState::Sha1(Sha1::new()),
            DigestAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
        };
        Self { algorithm, state }
    }

    #[inline]
    pub fn update(&mut self, data: impl AsRef<[u8]>) {
        match &mut self.state {
            HasherState::Md5(digest) => Digest::update(digest, data.as_ref()),
            HasherState::Sha1(digest) => Digest::update(digest, data.as_ref()),
            HasherState::Sha256(digest) => Digest::update(digest, data.as_ref()),
        };
    }

    pub fn finalize(self) -> ContentDigest {
        let bytes = match self.state {
            HasherState::Md5(digest) => digest.finalize().to_vec(),
            HasherState::Sha1(digest) => digest.finalize().to_vec(),
            HasherState::Sha256(digest) => digest.finalize().to_vec(),
        };
        ContentDigest {
            algorithm: self.algorithm,
            bytes,
        }
    }

    pub fn verify(self, expected: &ContentDigest) -> Result<(), VerificationError> {
        let actual = self.finalize();
        if &actual == expected {
            Ok(())
        } else {
            Err(VerificationError::VerificationFailed {
                expected: expected.clone(),
                actual,
            })
        }
    }
}

/// Streams the file at `path` through `algorithm`.
///
/// Returns `Ok(None)` when the file does not exist, so callers can tell a free
/// location apart from a genuine I/O failure.
pub async fn hash_file(
    path: &Path,
    algorithm: DigestAlgorithm,
) -> std::io::Result<Option<ContentDigest>> {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut reader = tokio::io::BufReader::new(file);
    let mut hasher = ContentDigestHasher::new(algorithm);
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Some(hasher.finalize()))
}
