//! Test utilities for keg-lib.
//!
//! Builders for formulas with real, verifiable artifacts and an in-memory
//! transport so engine tests never touch the network.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;

use crate::fetch::{Transport, TransportError};
use crate::formula::{DigestAlgorithm, Formula, IntegrityDigest, Invocation, SuccessPredicate, TestSpec};
use crate::util::hash::hash_bytes;

/// Returns an invocation running `script` through `/bin/sh -c`.
pub fn sh(script: &str) -> Invocation {
  Invocation::new("/bin/sh", ["-c", script])
}

/// Build a deterministic `.tar.gz` from `(path, contents)` pairs.
pub fn tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
  let encoder = GzEncoder::new(Vec::new(), Compression::default());
  let mut builder = tar::Builder::new(encoder);
  for (path, contents) in entries {
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder.append_data(&mut header, path, *contents).unwrap();
  }
  let mut encoder = builder.into_inner().unwrap();
  encoder.flush().unwrap();
  encoder.finish().unwrap()
}

/// The source archive served for formula `name`.
pub fn artifact(name: &str) -> Vec<u8> {
  let readme = format!("{}\n", name);
  tarball(&[(&format!("{}-1.0.0/README", name), readme.as_bytes())])
}

pub fn artifact_url(name: &str) -> String {
  format!("https://example.com/{}/archive/v1.0.0.tar.gz", name)
}

/// A valid formula at version 1.0.0 whose digest matches [`artifact`].
pub fn formula(name: &str, deps: &[&str]) -> Formula {
  let digest = hash_bytes(DigestAlgorithm::Sha256, &artifact(name));
  Formula {
    name: name.to_string(),
    desc: format!("{} for tests", name),
    homepage: None,
    url: artifact_url(name),
    version: "1.0.0".to_string(),
    digest: IntegrityDigest {
      algorithm: DigestAlgorithm::Sha256,
      hex: digest,
    },
    license: "MIT".to_string(),
    head: None,
    dependencies: deps.iter().map(|d| d.to_string()).collect(),
    install: vec![sh("mkdir -p ${prefix}/bin && cp README ${prefix}/")],
    test: TestSpec {
      invocation: sh("test -f ${prefix}/README"),
      expect: SuccessPredicate::default(),
    },
  }
}

/// Serves fixed bytes per URL and can fail a URL a set number of times first.
#[derive(Default)]
pub struct MemoryTransport {
  artifacts: HashMap<String, Vec<u8>>,
  failures: Mutex<HashMap<String, u32>>,
  calls: AtomicUsize,
}

impl MemoryTransport {
  pub fn new() -> Self {
    Self::default()
  }

  /// Serve the default artifact for every formula.
  pub fn serving(formulas: &[&Formula]) -> Self {
    let mut transport = Self::new();
    for formula in formulas {
      transport = transport.with(&formula.url, artifact(&formula.name));
    }
    transport
  }

  pub fn with(mut self, url: &str, bytes: Vec<u8>) -> Self {
    self.artifacts.insert(url.to_string(), bytes);
    self
  }

  /// Fail the next `times` requests for `url` with a transient network error.
  pub fn failing(self, url: &str, times: u32) -> Self {
    self.failures.lock().unwrap().insert(url.to_string(), times);
    self
  }

  /// Number of `get` calls made so far.
  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Transport for MemoryTransport {
  async fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    {
      let mut failures = self.failures.lock().unwrap();
      if let Some(remaining) = failures.get_mut(url)
        && *remaining > 0
      {
        *remaining -= 1;
        return Err(TransportError::Network("connection reset".to_string()));
      }
    }
    self
      .artifacts
      .get(url)
      .cloned()
      .ok_or(TransportError::Status { status: 404 })
  }
}
