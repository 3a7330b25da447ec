//! Digest computation for artifact verification.

use std::io;
use std::path::Path;

use sha2::{Digest, Sha256, Sha512};

use crate::formula::DigestAlgorithm;

/// Hash arbitrary bytes, returning the lowercase hex digest.
pub fn hash_bytes(algorithm: DigestAlgorithm, bytes: &[u8]) -> String {
  match algorithm {
    DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
    DigestAlgorithm::Sha512 => hex::encode(Sha512::digest(bytes)),
  }
}

/// Hash the contents of a file.
pub async fn hash_file(algorithm: DigestAlgorithm, path: &Path) -> Result<String, io::Error> {
  let bytes = tokio::fs::read(path).await?;
  Ok(hash_bytes(algorithm, &bytes))
}
