use std::io::{self, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::crypto::hash::HashAlgorithm;
use crate::keyring::KeyId;
use crate::packet::signature::{SignatureType, PUBKEY_ALGO_EDDSA};

const VERSION: u8 = 3;

/// Announces an upcoming signature ahead of the literal data, so a verifier
/// can hash the body in a single pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnePassSignature {
    typ: SignatureType,
    hash_alg: HashAlgorithm,
    issuer: KeyId,
    last: bool,
}

impl OnePassSignature {
    pub fn new(typ: SignatureType, hash_alg: HashAlgorithm, issuer: KeyId, last: bool) -> Self {
        Self {
            typ,
            hash_alg,
            issuer,
            last,
        }
    }

    pub fn typ(&self) -> SignatureType {
        self.typ
    }

    pub fn hash_alg(&self) -> HashAlgorithm {
        self.hash_alg
    }

    pub fn issuer(&self) -> KeyId {
        self.issuer
    }

    pub fn is_last(&self) -> bool {
        self.last
    }

    pub fn from_reader(r: &mut impl Read) -> io::Result<Self> {
        let version = r.read_u8()?;
        if version != VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported one pass signature version {version}"),
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
        let issuer = KeyId::from_reader(r)?;
        let last = r.read_u8()? != 0;
        Ok(Self {
            typ,
            hash_alg,
            issuer,
            last,
        })
    }

    pub fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_u8(VERSION)?;
        w.write_u8(u8::from(self.typ))?;
        w.write_u8(u8::from(self.hash_alg))?;
        w.write_u8(PUBKEY_ALGO_EDDSA)?;
        self.issuer.write_to(w)?;
        w.write_u8(u8::from(self.last))
    }

    pub fn byte_len(&self) -> usize {
        1 + 1 + 1 + 1 + 8 + 1
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn roundtrip() {
        let ops = OnePassSignature::new(
            SignatureType::Text,
            HashAlgorithm::Sha512,
            KeyId::from_bytes([1, 2, 3, 4, 5, 6, 7, 8]),
            true,
        );
        let mut out = Vec::new();
        ops.write_to(&mut out).unwrap();
        assert_eq!(out.len(), ops.byte_len());
        assert_eq!(OnePassSignature::from_reader(&mut &out[..]).unwrap(), ops);
    }
}
