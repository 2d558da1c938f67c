use num_enum::{FromPrimitive, IntoPrimitive};
use sha2::{Digest, Sha256, Sha512};

use crate::errors::{unsupported_err, Result};
use crate::normalize_lines::canonicalize_into;

/// Available hash algorithms.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-hash-algorithms>
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
#[non_exhaustive]
pub enum HashAlgorithm {
    Sha256 = 8,
    Sha512 = 10,

    #[num_enum(catch_all)]
    Other(u8),
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        Self::Sha256
    }
}

impl HashAlgorithm {
    /// The size of the produced digest in bytes.
    pub fn digest_size(self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha512 => 64,
            HashAlgorithm::Other(_) => 0,
        }
    }

    pub fn new_hasher(self) -> Result<Hasher> {
        match self {
            HashAlgorithm::Sha256 => Ok(Hasher::Sha256(Sha256::new())),
            HashAlgorithm::Sha512 => Ok(Hasher::Sha512(Sha512::new())),
            HashAlgorithm::Other(code) => {
                unsupported_err!("hash algorithm {}", code)
            }
        }
    }
}

/// Incremental digest over one of the supported algorithms.
#[derive(Debug, Clone)]
pub enum Hasher {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
        }
    }
}

/// A running signature hash.
///
/// For text-type signatures the digest is computed over the CRLF-canonical
/// form of the data, independent of how the stream is chunked.
pub struct RunningHash {
    hasher: Option<Hasher>,
    canonicalize: bool,
    skip_lf: bool,
}

impl RunningHash {
    pub fn new(alg: HashAlgorithm, canonicalize: bool) -> Result<Self> {
        Ok(Self {
            hasher: Some(alg.new_hasher()?),
            canonicalize,
            skip_lf: false,
        })
    }

    pub fn update(&mut self, chunk: &[u8]) {
        let Some(hasher) = self.hasher.as_mut() else {
            return;
        };
        if self.canonicalize {
            let mut normalized = Vec::with_capacity(chunk.len() * 2);
            canonicalize_into(chunk, &mut self.skip_lf, &mut normalized);
            hasher.update(&normalized);
        } else {
            hasher.update(chunk);
        }
    }

    /// Ingests the signature trailer and produces the digest. The hash state
    /// is consumed; later calls return `None`.
    pub fn finish(&mut self, trailer: &[u8]) -> Option<Vec<u8>> {
        let mut hasher = self.hasher.take()?;
        hasher.update(trailer);
        Some(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn text_hash_is_chunking_independent() {
        let mut whole = RunningHash::new(HashAlgorithm::Sha256, true).unwrap();
        whole.update(b"one\r\ntwo\nthree\r");
        let expected = whole.finish(b"trailer").unwrap();

        let mut split = RunningHash::new(HashAlgorithm::Sha256, true).unwrap();
        for b in b"one\r\ntwo\nthree\r" {
            split.update(&[*b]);
        }
        assert_eq!(split.finish(b"trailer").unwrap(), expected);
    }

    #[test]
    fn text_hash_normalizes_line_endings() {
        let mut lf = RunningHash::new(HashAlgorithm::Sha256, true).unwrap();
        lf.update(b"one\ntwo\n");
        let mut crlf = RunningHash::new(HashAlgorithm::Sha256, true).unwrap();
        crlf.update(b"one\r\ntwo\r\n");
        assert_eq!(lf.finish(b"").unwrap(), crlf.finish(b"").unwrap());
    }

    #[test]
    fn finish_consumes_the_state() {
        let mut hash = RunningHash::new(HashAlgorithm::Sha512, false).unwrap();
        hash.update(b"data");
        assert!(hash.finish(b"").is_some());
        assert!(hash.finish(b"").is_none());
    }
}
