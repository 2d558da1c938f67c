use std::io::{self, BufRead, Read, Write};

use byteorder::{BigEndian, ReadBytesExt};
use chrono::Utc;
use log::debug;
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::crypto::hash::{HashAlgorithm, RunningHash};
use crate::errors::{Error, Result};
use crate::keyring::{Key, KeyId};
use crate::packet::{PacketBodyReader, PacketHeader, Tag};

/// Public key algorithm code for EdDSA (legacy encoding).
pub const PUBKEY_ALGO_EDDSA: u8 = 22;

const VERSION: u8 = 4;
const SIG_LEN: usize = 64;

/// Data signature types.
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum SignatureType {
    /// Signature of a binary document.
    Binary = 0x00,
    /// Signature of a canonical text document, calculated over the text
    /// with its line endings converted to `<CR><LF>`.
    Text = 0x01,

    #[num_enum(catch_all)]
    Other(u8),
}

/// A named signature annotation; critical notations must be understood by
/// the verifier for the signature to be acceptable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notation {
    pub critical: bool,
    pub name: String,
    pub value: String,
}

/// A data signature packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    typ: SignatureType,
    hash_alg: HashAlgorithm,
    created_at: i64,
    /// Seconds after `created_at` until the signature expires, 0 for never.
    expires_after: u32,
    issuer: KeyId,
    notations: Vec<Notation>,
    sig: [u8; SIG_LEN],
}

impl Signature {
    pub fn typ(&self) -> SignatureType {
        self.typ
    }

    pub fn hash_alg(&self) -> HashAlgorithm {
        self.hash_alg
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn expires_after(&self) -> u32 {
        self.expires_after
    }

    pub fn issuer(&self) -> KeyId {
        self.issuer
    }

    pub fn notations(&self) -> &[Notation] {
        &self.notations
    }

    pub(crate) fn sig_bytes(&self) -> &[u8; SIG_LEN] {
        &self.sig
    }

    /// True if any critical notation name is outside the verifier's known
    /// set. Such a signature must not verify successfully.
    pub(crate) fn has_unknown_critical_notation(&self, known: &[&str]) -> bool {
        self.notations
            .iter()
            .any(|n| n.critical && !known.contains(&n.name.as_str()))
    }

    /// A running hash set up for this signature's algorithm and type.
    pub(crate) fn running_hash(&self) -> Result<RunningHash> {
        RunningHash::new(self.hash_alg, self.typ == SignatureType::Text)
    }

    /// The serialized fields covered by the signature digest. Identical on
    /// the signing and verifying side, and appended to the data hash as the
    /// trailer.
    pub(crate) fn hashed_fields(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32);
        out.push(VERSION);
        out.push(u8::from(self.typ));
        out.push(u8::from(self.hash_alg));
        out.push(PUBKEY_ALGO_EDDSA);
        out.extend_from_slice(&(self.created_at as u32).to_be_bytes());
        out.extend_from_slice(&self.expires_after.to_be_bytes());
        out.extend_from_slice(self.issuer.as_bytes());
        debug_assert!(self.notations.len() <= u8::MAX as usize);
        out.push(self.notations.len() as u8);
        for notation in &self.notations {
            out.push(u8::from(notation.critical));
            let name = notation.name.as_bytes();
            let value = notation.value.as_bytes();
            out.extend_from_slice(&(name.len() as u16).to_be_bytes());
            out.extend_from_slice(&(value.len() as u16).to_be_bytes());
            out.extend_from_slice(name);
            out.extend_from_slice(value);
        }
        out
    }

    /// Checks this signature over a finished data digest.
    pub(crate) fn verify_digest(&self, key: &Key, digest: &[u8]) -> bool {
        key.verify_digest(digest, &self.sig)
    }

    pub fn from_reader(r: &mut impl Read) -> io::Result<Self> {
        let version = r.read_u8()?;
        if version != VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported signature version {version}"),
            ));
        }
        let typ = SignatureType::from(r.read_u8()?);
        let hash_alg = HashAlgorithm::from(r.read_u8()?);
        let pubkey_alg = r.read_u8()?;
        if pubkey_alg != PUBKEY_ALGO_EDDSA {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported public key algorithm {pubkey_alg}"),
            ));
        }
        let created_at = i64::from(r.read_u32::<BigEndian>()?);
        let expires_after = r.read_u32::<BigEndian>()?;
        let issuer = KeyId::from_reader(r)?;
        let notation_count = r.read_u8()?;
        let mut notations = Vec::with_capacity(notation_count as usize);
        for _ in 0..notation_count {
            let critical = r.read_u8()? != 0;
            let name_len = r.read_u16::<BigEndian>()? as usize;
            let value_len = r.read_u16::<BigEndian>()? as usize;
            let mut name = vec![0u8; name_len];
            r.read_exact(&mut name)?;
            let mut value = vec![0u8; value_len];
            r.read_exact(&mut value)?;
            let name = String::from_utf8(name).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, "notation name is not utf8")
            })?;
            let value = String::from_utf8(value).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, "notation value is not utf8")
            })?;
            notations.push(Notation {
                critical,
                name,
                value,
            });
        }
        let mut sig = [0u8; SIG_LEN];
        r.read_exact(&mut sig)?;
        Ok(Self {
            typ,
            hash_alg,
            created_at,
            expires_after,
            issuer,
            notations,
            sig,
        })
    }

    /// Serializes the packet body.
    pub fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_all(&self.hashed_fields())?;
        w.write_all(&self.sig)
    }

    pub fn byte_len(&self) -> usize {
        self.hashed_fields().len() + SIG_LEN
    }

    /// Serializes the full packet, header included.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.byte_len() + 6);
        PacketHeader::new(Tag::Signature, self.byte_len()).write_to(&mut out)?;
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Parses a stream of signature packets, as found in a detached
    /// signature message.
    pub fn from_bytes_many(mut source: impl BufRead) -> Result<Vec<Self>> {
        let mut signatures = Vec::new();
        loop {
            if source.fill_buf()?.is_empty() {
                break;
            }
            let header = PacketHeader::from_reader(&mut source).map_err(format_error)?;
            if header.tag() != Tag::Signature {
                return Err(Error::Format {
                    message: format!("unexpected tag in signature message: {:?}", header.tag()),
                });
            }
            let mut body = PacketBodyReader::new(header, source);
            let signature = Signature::from_reader(&mut body).map_err(format_error)?;
            if !body.is_empty() {
                return Err(Error::Format {
                    message: "trailing bytes in signature packet".into(),
                });
            }
            source = body.into_inner();
            signatures.push(signature);
        }
        debug!("parsed {} signature packet(s)", signatures.len());
        Ok(signatures)
    }
}

fn format_error(err: io::Error) -> Error {
    Error::Format {
        message: err.to_string(),
    }
}

/// The signing half of [`Signature`]: everything the signer chooses up
/// front, before the data is hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureConfig {
    pub typ: SignatureType,
    pub hash_alg: HashAlgorithm,
    pub created_at: i64,
    pub expires_after: u32,
    pub notations: Vec<Notation>,
}

impl SignatureConfig {
    pub fn binary() -> Self {
        Self::new(SignatureType::Binary)
    }

    pub fn text() -> Self {
        Self::new(SignatureType::Text)
    }

    pub fn new(typ: SignatureType) -> Self {
        Self {
            typ,
            hash_alg: HashAlgorithm::default(),
            created_at: Utc::now().timestamp(),
            expires_after: 0,
            notations: Vec::new(),
        }
    }

    /// A running hash set up for this configuration.
    pub(crate) fn running_hash(&self) -> Result<RunningHash> {
        RunningHash::new(self.hash_alg, self.typ == SignatureType::Text)
    }

    /// Produces the signature from a running hash that consumed the data.
    pub(crate) fn sign(self, key: &Key, mut hash: RunningHash) -> Result<Signature> {
        let mut signature = Signature {
            typ: self.typ,
            hash_alg: self.hash_alg,
            created_at: self.created_at,
            expires_after: self.expires_after,
            issuer: key.key_id(),
            notations: self.notations,
            sig: [0u8; SIG_LEN],
        };
        let trailer = signature.hashed_fields();
        let digest = hash
            .finish(&trailer)
            .ok_or_else(|| Error::Message {
                message: "hash state already consumed".into(),
            })?;
        signature.sig = key.sign_digest(&digest)?;
        Ok(signature)
    }

    /// Signs `data` in one pass. The canonicalization for text-type
    /// signatures happens inside the running hash.
    pub fn sign_data(self, key: &Key, mut data: impl Read) -> Result<Signature> {
        let mut hash = self.running_hash()?;
        let mut buf = [0u8; 4096];
        loop {
            let read = data.read(&mut buf)?;
            if read == 0 {
                break;
            }
            hash.update(&buf[..read]);
        }
        self.sign(key, hash)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn test_key() -> Key {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        Key::generate(&mut rng)
    }

    #[test]
    fn packet_roundtrip() {
        let key = test_key();
        let mut config = SignatureConfig::binary();
        config.notations.push(Notation {
            critical: true,
            name: "context@pgp-stream".into(),
            value: "test".into(),
        });
        let signature = config.sign_data(&key, &b"signed data"[..]).unwrap();

        let mut out = Vec::new();
        signature.write_to(&mut out).unwrap();
        assert_eq!(out.len(), signature.byte_len());

        let parsed = Signature::from_reader(&mut &out[..]).unwrap();
        assert_eq!(parsed, signature);
    }

    #[test]
    fn sign_and_verify_digest() {
        let key = test_key();
        let signature = SignatureConfig::binary()
            .sign_data(&key, &b"hello"[..])
            .unwrap();

        let mut hash = signature.running_hash().unwrap();
        hash.update(b"hello");
        let digest = hash.finish(&signature.hashed_fields()).unwrap();
        assert!(signature.verify_digest(&key, &digest));

        let mut hash = signature.running_hash().unwrap();
        hash.update(b"tampered");
        let digest = hash.finish(&signature.hashed_fields()).unwrap();
        assert!(!signature.verify_digest(&key, &digest));
    }

    #[test]
    fn text_signature_is_line_ending_agnostic() {
        let key = test_key();
        let signature = SignatureConfig::text()
            .sign_data(&key, &b"line one\nline two\n"[..])
            .unwrap();

        let mut hash = signature.running_hash().unwrap();
        hash.update(b"line one\r\nline two\r\n");
        let digest = hash.finish(&signature.hashed_fields()).unwrap();
        assert!(signature.verify_digest(&key, &digest));
    }

    #[test]
    fn unknown_critical_notation_detection() {
        let key = test_key();
        let mut config = SignatureConfig::binary();
        config.notations.push(Notation {
            critical: true,
            name: "mystery@example.org".into(),
            value: "?".into(),
        });
        let signature = config.sign_data(&key, &b"data"[..]).unwrap();
        assert!(signature.has_unknown_critical_notation(&[]));
        assert!(!signature.has_unknown_critical_notation(&["mystery@example.org"]));
    }

    #[test]
    fn from_bytes_many_parses_a_signature_stream() {
        let key = test_key();
        let a = SignatureConfig::binary().sign_data(&key, &b"a"[..]).unwrap();
        let b = SignatureConfig::text().sign_data(&key, &b"b"[..]).unwrap();
        let mut stream = a.to_bytes().unwrap();
        stream.extend_from_slice(&b.to_bytes().unwrap());

        let parsed = Signature::from_bytes_many(&stream[..]).unwrap();
        assert_eq!(parsed, vec![a, b]);
    }
}
