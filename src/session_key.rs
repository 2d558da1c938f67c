//! Session keys: raw symmetric keys used to encrypt and decrypt message
//! content directly, bypassing per-recipient asymmetric key exchange.

use std::io::{BufRead, Read};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use byteorder::ReadBytesExt;
use log::warn;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{unsupported_err, Error, Result};
use crate::keyring::KeyRing;
use crate::message::{
    classify_stream_error, compress_packets, write_literal, write_signed, CheckReader,
    PlainMessage, SignedMessageReader,
};
use crate::packet::{PacketBodyReader, PacketHeader, SignatureConfig, SignatureType, Tag};
use crate::verify::{SigningContext, VerificationContext, VerifiedDataResult, VerifyingReader};

/// Identifier for triple-DES.
pub const THREE_DES: &str = "3des";
/// Legacy alias for [`THREE_DES`].
pub const TRIPLE_DES: &str = "tripledes";
/// Identifier for CAST5.
pub const CAST5: &str = "cast5";
/// Identifier for AES with a 128 bit key.
pub const AES_128: &str = "aes128";
/// Identifier for AES with a 192 bit key.
pub const AES_192: &str = "aes192";
/// Identifier for AES with a 256 bit key.
pub const AES_256: &str = "aes256";

/// Fixed bidirectional table between algorithm identifiers and cipher codes.
const SYM_KEY_ALGOS: &[(&str, SymmetricKeyAlgorithm)] = &[
    (THREE_DES, SymmetricKeyAlgorithm::TripleDES),
    (TRIPLE_DES, SymmetricKeyAlgorithm::TripleDES),
    (CAST5, SymmetricKeyAlgorithm::CAST5),
    (AES_128, SymmetricKeyAlgorithm::AES128),
    (AES_192, SymmetricKeyAlgorithm::AES192),
    (AES_256, SymmetricKeyAlgorithm::AES256),
];

fn cipher_for_algo(algo: &str) -> Option<SymmetricKeyAlgorithm> {
    SYM_KEY_ALGOS
        .iter()
        .find(|(name, _)| *name == algo)
        .map(|(_, cipher)| *cipher)
}

/// Reverse lookup from a cipher code to its identifier.
///
/// Code zero maps to the implicit (empty) identifier. A nonzero code that is
/// not in the table maps to the strongest supported algorithm; that leniency
/// can mask an engine version mismatch, so it is surfaced in the log.
fn algo_for_cipher(cipher: SymmetricKeyAlgorithm) -> &'static str {
    if cipher == SymmetricKeyAlgorithm::Plaintext {
        return "";
    }
    for &(name, candidate) in SYM_KEY_ALGOS {
        if candidate == cipher {
            return name;
        }
    }
    warn!(
        "unrecognized cipher code {}, assuming {}",
        u8::from(cipher),
        AES_256
    );
    AES_256
}

/// Generates a cryptographically secure random token of `size` bytes.
pub fn random_token(size: usize) -> Vec<u8> {
    let mut token = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut token);
    token
}

/// The decrypted payload of an asymmetric key-exchange packet, as handed
/// over by the key exchange machinery.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub enum PlainSessionKey {
    /// Pre-v6 exchanges always name their cipher.
    V3_4 {
        cipher: SymmetricKeyAlgorithm,
        #[debug("..")]
        key: Vec<u8>,
    },
    /// v6 exchanges carry no cipher code; the algorithm is implicit in the
    /// message body.
    V6 {
        #[debug("..")]
        key: Vec<u8>,
    },
}

/// A decrypted session key.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct SessionKey {
    /// The raw binary session key.
    #[debug("..")]
    key: Zeroizing<Vec<u8>>,
    /// The symmetric algorithm identifier; empty in implicit (v6) mode.
    algo: String,
    v6: bool,
}

impl SessionKey {
    /// Builds a session key directly from caller supplied bytes. An empty
    /// `algo` selects implicit (v6) mode.
    pub fn from_token(token: &[u8], algo: &str) -> Self {
        Self {
            key: Zeroizing::new(token.to_vec()),
            algo: algo.to_string(),
            v6: algo.is_empty(),
        }
    }

    /// Generates a random key of the correct length for the given
    /// algorithm identifier.
    pub fn generate_algo(algo: &str) -> Result<Self> {
        let Some(cipher) = cipher_for_algo(algo) else {
            unsupported_err!("unknown symmetric key generation algorithm: {algo}");
        };
        Ok(Self {
            key: Zeroizing::new(random_token(cipher.key_size())),
            algo: algo.to_string(),
            v6: false,
        })
    }

    /// Generates a random key for the default cipher (AES-256).
    pub fn generate() -> Result<Self> {
        Self::generate_algo(AES_256)
    }

    /// Reconstructs a session key from a decrypted key-exchange result.
    ///
    /// Pre-v6 exchanges must name a known cipher; v6 exchanges run in
    /// implicit mode. Both end in a key size check.
    pub fn from_decrypted(plain: PlainSessionKey) -> Result<Self> {
        let sk = match plain {
            PlainSessionKey::V3_4 { cipher, key } => {
                let known = SYM_KEY_ALGOS.iter().any(|(_, c)| *c == cipher);
                if !known {
                    unsupported_err!("unsupported cipher function: {:?}", cipher);
                }
                Self {
                    key: Zeroizing::new(key),
                    algo: algo_for_cipher(cipher).to_string(),
                    v6: false,
                }
            }
            PlainSessionKey::V6 { key } => Self {
                key: Zeroizing::new(key),
                algo: String::new(),
                v6: true,
            },
        };
        sk.check_size()?;
        Ok(sk)
    }

    /// The algorithm identifier; empty in implicit mode.
    pub fn algo(&self) -> &str {
        &self.algo
    }

    /// True for implicit (v6) mode keys.
    pub fn is_implicit(&self) -> bool {
        self.v6
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// The session key as a base64 encoded string.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.key.as_slice())
    }

    /// The cipher code for this key; zero in implicit mode.
    pub fn cipher(&self) -> Result<SymmetricKeyAlgorithm> {
        if self.v6 {
            return Ok(SymmetricKeyAlgorithm::Plaintext);
        }
        cipher_for_algo(&self.algo)
            .ok_or_else(|| Error::Unsupported {
                message: format!("unsupported cipher function: {}", self.algo),
            })
    }

    /// Validates the key length against the declared algorithm: an exact
    /// match is required, no truncation, no padding. Implicit mode only
    /// requires a non-empty key.
    pub fn check_size(&self) -> Result<()> {
        if self.v6 {
            if self.key.is_empty() {
                return Err(Error::InvalidKeyLength);
            }
            return Ok(());
        }
        let Some(cipher) = cipher_for_algo(&self.algo) else {
            unsupported_err!("unknown symmetric key algorithm: {}", self.algo);
        };
        if cipher.key_size() != self.key.len() {
            return Err(Error::InvalidKeyLength);
        }
        Ok(())
    }

    /// The cipher used for message bodies. Implicit mode keys belong to
    /// AEAD message bodies, which are not supported here.
    fn content_cipher(&self) -> Result<SymmetricKeyAlgorithm> {
        if self.v6 {
            unsupported_err!("implicit (v6) session keys require an AEAD message body");
        }
        self.cipher()
    }

    /// Encrypts a plaintext message with this session key.
    pub fn encrypt(&self, message: &PlainMessage) -> Result<Vec<u8>> {
        self.encrypt_with(message, None, false, None)
    }

    /// Encrypts a message and embeds a signature made with the first
    /// signing key of `sign_keyring`.
    pub fn encrypt_and_sign(&self, message: &PlainMessage, sign_keyring: &KeyRing) -> Result<Vec<u8>> {
        self.encrypt_with(message, Some(sign_keyring), false, None)
    }

    /// Like [`encrypt_and_sign`](Self::encrypt_and_sign), with a signing
    /// context embedded as a critical notation.
    pub fn encrypt_and_sign_with_context(
        &self,
        message: &PlainMessage,
        sign_keyring: &KeyRing,
        context: &SigningContext,
    ) -> Result<Vec<u8>> {
        self.encrypt_with(message, Some(sign_keyring), false, Some(context))
    }

    /// Encrypts a message with a compression filter inserted ahead of
    /// encryption.
    pub fn encrypt_with_compression(&self, message: &PlainMessage) -> Result<Vec<u8>> {
        self.encrypt_with(message, None, true, None)
    }

    fn encrypt_with(
        &self,
        message: &PlainMessage,
        sign_keyring: Option<&KeyRing>,
        compress: bool,
        context: Option<&SigningContext>,
    ) -> Result<Vec<u8>> {
        let cipher = self.content_cipher()?;
        self.check_size()?;

        let mut inner = Vec::with_capacity(message.data().len() + 128);
        match sign_keyring {
            Some(keyring) => {
                let Some(signer) = keyring.first_signer() else {
                    return Err(Error::Message {
                        message: "no signing key in key ring".into(),
                    });
                };
                let typ = if message.metadata().is_utf8 {
                    SignatureType::Text
                } else {
                    SignatureType::Binary
                };
                let mut config = SignatureConfig::new(typ);
                if let Some(context) = context {
                    config.notations.push(context.notation());
                }
                write_signed(&mut inner, message, signer, config)?;
            }
            None => write_literal(&mut inner, message)?,
        }

        if compress {
            inner = compress_packets(&inner)?;
        }

        let body_len = 1 + cipher.encrypted_protected_len(inner.len());
        let mut out = Vec::with_capacity(body_len + 6);
        PacketHeader::new(Tag::SymEncryptedProtectedData, body_len).write_to(&mut out)?;
        out.push(0x01); // SEIPD version

        let mut rng = rand::thread_rng();
        let mut encryptor = cipher.stream_encryptor(&mut rng, &self.key, &inner[..])?;
        encryptor.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Decrypts a data packet encrypted with this session key. Embedded
    /// signatures are not verified.
    pub fn decrypt(&self, data: &[u8]) -> Result<PlainMessage> {
        let mut reader = self.decrypting_reader(data, None, 0, None)?;
        let mut out = Vec::new();
        reader.read_to_end(&mut out).map_err(classify_stream_error)?;
        let metadata = reader.metadata().unwrap_or_default();
        Ok(PlainMessage::from_parts(out, metadata))
    }

    /// Decrypts a data packet and verifies embedded signatures against
    /// `verify_keyring`, applying the usual resolution policy. A
    /// `verify_time` of zero disables time checks.
    ///
    /// The decrypted plaintext is returned even when the signature outcome
    /// is a failure; only non-signature problems produce an error.
    pub fn decrypt_and_verify(
        &self,
        data: &[u8],
        verify_keyring: &KeyRing,
        verify_time: i64,
    ) -> Result<VerifiedDataResult> {
        self.decrypt_and_verify_inner(data, verify_keyring, verify_time, None)
    }

    /// Like [`decrypt_and_verify`](Self::decrypt_and_verify), additionally
    /// requiring the given verification context on the embedded signature.
    pub fn decrypt_and_verify_with_context(
        &self,
        data: &[u8],
        verify_keyring: &KeyRing,
        verify_time: i64,
        context: &VerificationContext,
    ) -> Result<VerifiedDataResult> {
        self.decrypt_and_verify_inner(data, verify_keyring, verify_time, Some(context.clone()))
    }

    fn decrypt_and_verify_inner(
        &self,
        data: &[u8],
        verify_keyring: &KeyRing,
        verify_time: i64,
        context: Option<VerificationContext>,
    ) -> Result<VerifiedDataResult> {
        let mut reader = self.decrypting_reader(data, Some(verify_keyring), verify_time, context)?;
        let mut out = Vec::new();
        reader.read_to_end(&mut out).map_err(classify_stream_error)?;
        let metadata = reader.metadata().unwrap_or_default();
        let result = reader.verify_signature()?;
        Ok(VerifiedDataResult {
            result,
            data: out,
            metadata,
        })
    }

    /// Builds the streaming decryption pipeline: packet framing, the CFB
    /// decryptor, the integrity checking reader and the verification
    /// reader, in that order.
    fn decrypting_reader<'a>(
        &self,
        data: &'a [u8],
        verify_keyring: Option<&'a KeyRing>,
        verify_time: i64,
        context: Option<VerificationContext>,
    ) -> Result<VerifyingReader<'a>> {
        let cipher = self.content_cipher()?;
        self.check_size()?;

        let mut source: &[u8] = data;
        let header = PacketHeader::from_reader(&mut source).map_err(|e| Error::Format {
            message: e.to_string(),
        })?;
        if header.tag() != Tag::SymEncryptedProtectedData {
            return Err(Error::Format {
                message: format!("unexpected tag: {:?}", header.tag()),
            });
        }
        let mut body = PacketBodyReader::new(header, source);
        let version = body.read_u8().map_err(classify_stream_error)?;
        if version != 1 {
            unsupported_err!("symmetrically encrypted protected data version {version}");
        }

        let decryptor = cipher.stream_decryptor(&self.key, body)?;
        let check = CheckReader::new(decryptor);
        let message = SignedMessageReader::new(Box::new(check) as Box<dyn BufRead + 'a>)
            .map_err(classify_stream_error)?;

        VerifyingReader::from_message_reader(
            message,
            verify_keyring,
            context,
            verify_time == 0,
            verify_time,
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn registry_forward_lookup() {
        assert_eq!(
            cipher_for_algo(THREE_DES),
            Some(SymmetricKeyAlgorithm::TripleDES)
        );
        assert_eq!(
            cipher_for_algo(TRIPLE_DES),
            Some(SymmetricKeyAlgorithm::TripleDES)
        );
        assert_eq!(cipher_for_algo(CAST5), Some(SymmetricKeyAlgorithm::CAST5));
        assert_eq!(cipher_for_algo(AES_128), Some(SymmetricKeyAlgorithm::AES128));
        assert_eq!(cipher_for_algo(AES_192), Some(SymmetricKeyAlgorithm::AES192));
        assert_eq!(cipher_for_algo(AES_256), Some(SymmetricKeyAlgorithm::AES256));
        assert_eq!(cipher_for_algo("rc4"), None);
    }

    #[test]
    fn registry_reverse_lookup() {
        assert_eq!(algo_for_cipher(SymmetricKeyAlgorithm::AES192), AES_192);
        assert_eq!(algo_for_cipher(SymmetricKeyAlgorithm::TripleDES), THREE_DES);
        assert_eq!(algo_for_cipher(SymmetricKeyAlgorithm::Plaintext), "");
        // declared leniency: unknown nonzero codes map to the strongest
        // supported algorithm
        assert_eq!(algo_for_cipher(SymmetricKeyAlgorithm::Other(42)), AES_256);
    }

    #[test]
    fn generated_keys_have_the_algorithm_size() {
        for (algo, size) in [
            (THREE_DES, 24),
            (TRIPLE_DES, 24),
            (CAST5, 16),
            (AES_128, 16),
            (AES_192, 24),
            (AES_256, 32),
        ] {
            let sk = SessionKey::generate_algo(algo).unwrap();
            assert_eq!(sk.key().len(), size, "{algo}");
            sk.check_size().unwrap();
        }
        assert!(SessionKey::generate_algo("des").is_err());
    }

    #[test]
    fn check_size_requires_an_exact_match() {
        for delta in [-1i64, 1] {
            let size = (32 + delta) as usize;
            let sk = SessionKey::from_token(&vec![0u8; size], AES_256);
            assert!(matches!(
                sk.check_size(),
                Err(Error::InvalidKeyLength)
            ));
        }
        SessionKey::from_token(&[0u8; 32], AES_256).check_size().unwrap();
    }

    #[test]
    fn implicit_mode_requires_non_empty() {
        let sk = SessionKey::from_token(&[], "");
        assert!(sk.is_implicit());
        assert!(matches!(sk.check_size(), Err(Error::InvalidKeyLength)));
        SessionKey::from_token(&[1, 2, 3], "").check_size().unwrap();
    }

    #[test]
    fn from_decrypted_pre_v6_requires_a_known_cipher() {
        let err = SessionKey::from_decrypted(PlainSessionKey::V3_4 {
            cipher: SymmetricKeyAlgorithm::Other(42),
            key: vec![0u8; 32],
        })
        .unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));

        let sk = SessionKey::from_decrypted(PlainSessionKey::V3_4 {
            cipher: SymmetricKeyAlgorithm::AES256,
            key: vec![0u8; 32],
        })
        .unwrap();
        assert_eq!(sk.algo(), AES_256);
        assert!(!sk.is_implicit());
    }

    #[test]
    fn from_decrypted_v6_is_implicit() {
        let sk = SessionKey::from_decrypted(PlainSessionKey::V6 {
            key: vec![7u8; 32],
        })
        .unwrap();
        assert!(sk.is_implicit());
        assert_eq!(sk.algo(), "");

        assert!(SessionKey::from_decrypted(PlainSessionKey::V6 { key: vec![] }).is_err());
    }

    #[test]
    fn implicit_keys_cannot_drive_seipd_v1() {
        let sk = SessionKey::from_token(&[1u8; 32], "");
        let err = sk.encrypt(&PlainMessage::new(b"data".to_vec())).unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
    }

    #[test]
    fn base64_key_export() {
        let sk = SessionKey::from_token(&[0u8; 6], AES_256);
        assert_eq!(sk.to_base64(), "AAAAAAAA");
    }
}
