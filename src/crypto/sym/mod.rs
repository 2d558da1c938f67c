use num_enum::{FromPrimitive, IntoPrimitive};
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

mod decryptor;
mod encryptor;

pub use self::decryptor::{MdcError, StreamDecryptor};
pub use self::encryptor::StreamEncryptor;

use crate::errors::Result;

/// Available symmetric key algorithms.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-symmetric-key-algorithms>
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
#[non_exhaustive]
pub enum SymmetricKeyAlgorithm {
    /// Plaintext or unencrypted data
    Plaintext = 0,
    /// Triple-DES
    TripleDES = 2,
    /// CAST5
    CAST5 = 3,
    /// AES with 128-bit key
    AES128 = 7,
    /// AES with 192-bit key
    AES192 = 8,
    /// AES with 256-bit key
    AES256 = 9,

    #[num_enum(catch_all)]
    Other(u8),
}

impl SymmetricKeyAlgorithm {
    /// The size of a single block in bytes.
    pub const fn block_size(self) -> usize {
        match self {
            SymmetricKeyAlgorithm::TripleDES => 8,
            SymmetricKeyAlgorithm::CAST5 => 8,
            SymmetricKeyAlgorithm::AES128 => 16,
            SymmetricKeyAlgorithm::AES192 => 16,
            SymmetricKeyAlgorithm::AES256 => 16,
            SymmetricKeyAlgorithm::Plaintext | SymmetricKeyAlgorithm::Other(_) => 0,
        }
    }

    /// The key size in bytes.
    pub const fn key_size(self) -> usize {
        match self {
            SymmetricKeyAlgorithm::TripleDES => 24,
            SymmetricKeyAlgorithm::CAST5 => 16,
            SymmetricKeyAlgorithm::AES128 => 16,
            SymmetricKeyAlgorithm::AES192 => 24,
            SymmetricKeyAlgorithm::AES256 => 32,
            SymmetricKeyAlgorithm::Plaintext | SymmetricKeyAlgorithm::Other(_) => 0,
        }
    }

    /// The length of the integrity protected ciphertext for a plaintext of
    /// `plaintext_len` bytes.
    pub fn encrypted_protected_len(self, plaintext_len: usize) -> usize {
        // One block of random prefix, 2 bytes quick check, and the MDC
        // (1 byte tag + 1 byte length + SHA1 digest).
        self.block_size() + 2 + plaintext_len + 22
    }

    /// Generate a new session key of the right size for this algorithm.
    pub fn new_session_key<R: Rng + CryptoRng>(self, mut rng: R) -> Zeroizing<Vec<u8>> {
        let mut session_key = Zeroizing::new(vec![0u8; self.key_size()]);
        rng.fill_bytes(&mut session_key);
        session_key
    }

    /// Integrity protected encryption stream.
    pub fn stream_encryptor<R, I>(self, rng: R, key: &[u8], plaintext: I) -> Result<StreamEncryptor<I>>
    where
        R: Rng + CryptoRng,
        I: std::io::Read,
    {
        StreamEncryptor::new(rng, self, key, plaintext)
    }

    /// Integrity protected decryption stream.
    pub fn stream_decryptor<R>(self, key: &[u8], ciphertext: R) -> Result<StreamDecryptor<R>>
    where
        R: std::io::BufRead,
    {
        StreamDecryptor::new(self, key, ciphertext)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::io::Read;

    use rand::{RngCore, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn stream_roundtrip_all_algorithms() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        for alg in [
            SymmetricKeyAlgorithm::TripleDES,
            SymmetricKeyAlgorithm::CAST5,
            SymmetricKeyAlgorithm::AES128,
            SymmetricKeyAlgorithm::AES192,
            SymmetricKeyAlgorithm::AES256,
        ] {
            for size in [0usize, 1, 15, 16, 17, 1000, 8192] {
                let mut data = vec![0u8; size];
                rng.fill_bytes(&mut data);
                let key = alg.new_session_key(&mut rng);

                let mut encryptor = alg.stream_encryptor(&mut rng, &key, &data[..]).unwrap();
                let mut ciphertext = Vec::new();
                encryptor.read_to_end(&mut ciphertext).unwrap();
                assert_eq!(ciphertext.len(), alg.encrypted_protected_len(size));

                let mut decryptor = alg.stream_decryptor(&key, &ciphertext[..]).unwrap();
                let mut plaintext = Vec::new();
                decryptor.read_to_end(&mut plaintext).unwrap();
                assert_eq!(plaintext, data, "{alg:?} size {size}");
            }
        }
    }

    #[test]
    fn tampered_ciphertext_fails_the_mdc() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let alg = SymmetricKeyAlgorithm::AES256;
        let key = alg.new_session_key(&mut rng);

        let mut encryptor = alg.stream_encryptor(&mut rng, &key, &b"hello mdc"[..]).unwrap();
        let mut ciphertext = Vec::new();
        encryptor.read_to_end(&mut ciphertext).unwrap();

        let mid = ciphertext.len() / 2;
        ciphertext[mid] ^= 0x42;

        let mut decryptor = alg.stream_decryptor(&key, &ciphertext[..]).unwrap();
        let mut plaintext = Vec::new();
        let err = decryptor.read_to_end(&mut plaintext).unwrap_err();
        assert!(err.get_ref().is_some_and(|e| e.is::<MdcError>()));
    }

    #[test]
    fn truncated_ciphertext_is_not_silent_eof() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let alg = SymmetricKeyAlgorithm::AES256;
        let key = alg.new_session_key(&mut rng);

        let mut encryptor = alg.stream_encryptor(&mut rng, &key, &b"hello"[..]).unwrap();
        let mut ciphertext = Vec::new();
        encryptor.read_to_end(&mut ciphertext).unwrap();
        ciphertext.truncate(ciphertext.len() - 4);

        let mut decryptor = alg.stream_decryptor(&key, &ciphertext[..]).unwrap();
        let mut plaintext = Vec::new();
        let err = decryptor.read_to_end(&mut plaintext).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}
