//! In-memory verifier and signer keys.
//!
//! Key generation/management and key ring storage are out of scope; this
//! module only carries the identities the verification pipeline resolves
//! signature issuers against.

use std::fmt;
use std::io::{self, Read, Write};

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};

use crate::errors::{bail, Result};

/// Eight byte key identifier, the tail of the key fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyId([u8; 8]);

impl KeyId {
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    pub(crate) fn from_reader(r: &mut impl Read) -> io::Result<Self> {
        let mut bytes = [0u8; 8];
        r.read_exact(&mut bytes)?;
        Ok(Self(bytes))
    }

    pub(crate) fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_all(&self.0)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// An Ed25519 key with an optional signing half.
#[derive(Clone, derive_more::Debug)]
pub struct Key {
    key_id: KeyId,
    #[debug("..")]
    public: VerifyingKey,
    #[debug("secret? {}", secret.is_some())]
    secret: Option<SigningKey>,
}

impl Key {
    /// Generate a fresh signing-capable key.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let secret = SigningKey::generate(rng);
        let public = secret.verifying_key();
        Self {
            key_id: key_id_for(&public),
            public,
            secret: Some(secret),
        }
    }

    /// Build a verify-only key from raw public key bytes.
    pub fn from_public_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let public = VerifyingKey::from_bytes(bytes)?;
        Ok(Self {
            key_id: key_id_for(&public),
            public,
            secret: None,
        })
    }

    /// The same key with the signing half dropped.
    pub fn public_only(&self) -> Self {
        Self {
            key_id: self.key_id,
            public: self.public,
            secret: None,
        }
    }

    pub fn key_id(&self) -> KeyId {
        self.key_id
    }

    /// The raw public key bytes, as accepted by
    /// [`from_public_bytes`](Self::from_public_bytes).
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    pub fn fingerprint(&self) -> [u8; 32] {
        fingerprint_for(&self.public)
    }

    pub fn can_sign(&self) -> bool {
        self.secret.is_some()
    }

    pub(crate) fn sign_digest(&self, digest: &[u8]) -> Result<[u8; 64]> {
        let Some(secret) = self.secret.as_ref() else {
            bail!("key {} cannot sign", self.key_id);
        };
        Ok(secret.sign(digest).to_bytes())
    }

    pub(crate) fn verify_digest(&self, digest: &[u8], sig: &[u8; 64]) -> bool {
        let signature = ed25519_dalek::Signature::from_bytes(sig);
        self.public.verify(digest, &signature).is_ok()
    }
}

fn fingerprint_for(public: &VerifyingKey) -> [u8; 32] {
    Sha256::digest(public.as_bytes()).into()
}

fn key_id_for(public: &VerifyingKey) -> KeyId {
    let fp = fingerprint_for(public);
    let mut id = [0u8; 8];
    id.copy_from_slice(&fp[24..]);
    KeyId::from_bytes(id)
}

/// An ordered set of keys used to resolve signature issuers.
///
/// Read-only once populated; safe to share across many verification
/// sessions running in parallel.
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    keys: Vec<Key>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_keys(keys: impl IntoIterator<Item = Key>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, key: Key) {
        self.keys.push(key);
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key_by_id(&self, id: &KeyId) -> Option<&Key> {
        self.keys.iter().find(|k| k.key_id() == *id)
    }

    /// The first key that carries a signing half.
    pub(crate) fn first_signer(&self) -> Option<&Key> {
        self.keys.iter().find(|k| k.can_sign())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn key_id_is_stable() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let key = Key::generate(&mut rng);
        assert_eq!(key.key_id(), key.public_only().key_id());

        let fp = key.fingerprint();
        assert_eq!(key.key_id().as_bytes(), &fp[24..]);
        assert_eq!(key.key_id().to_string(), hex::encode(&fp[24..]));
    }

    #[test]
    fn sign_verify_digest() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let key = Key::generate(&mut rng);
        let sig = key.sign_digest(b"digest bytes").unwrap();
        assert!(key.verify_digest(b"digest bytes", &sig));
        assert!(!key.verify_digest(b"other digest", &sig));
        assert!(key.public_only().sign_digest(b"digest bytes").is_err());
    }

    #[test]
    fn from_public_bytes_roundtrip() {
        let mut rng = ChaCha8Rng::seed_from_u64(10);
        let key = Key::generate(&mut rng);
        let rebuilt = Key::from_public_bytes(&key.public_bytes()).unwrap();
        assert_eq!(rebuilt.key_id(), key.key_id());
        assert!(!rebuilt.can_sign());
    }

    #[test]
    fn ring_lookup() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let a = Key::generate(&mut rng);
        let b = Key::generate(&mut rng);
        let mut ring = KeyRing::from_keys([a.public_only()]);
        ring.insert(b.clone());
        assert_eq!(ring.key_by_id(&a.key_id()).unwrap().key_id(), a.key_id());
        assert!(ring.key_by_id(&b.key_id()).is_some());
        assert_eq!(ring.first_signer().unwrap().key_id(), b.key_id());
    }
}
