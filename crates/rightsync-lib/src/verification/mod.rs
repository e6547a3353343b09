mod content_digest_hasher;

pub use content_digest_hasher::{
    ContentDigest, ContentDigestHasher, DigestAlgorithm, VerificationError, hash_file,
};
