use std::fmt;
use std::io::{self, BufRead, Read};

use aes::{Aes128, Aes192, Aes256};
use bytes::{Buf, BytesMut};
use cast5::Cast5;
use cfb_mode::cipher::KeyIvInit;
use cfb_mode::BufDecryptor;
use cipher::{BlockCipher, BlockDecrypt, BlockEncryptMut, BlockSizeUser};
use des::TdesEde3;
use log::debug;
use sha1::{Digest, Sha1};

use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{bail, unsupported_err, Result};
use crate::util::{fill_buffer, fill_buffer_bytes};

const MDC_LEN: usize = 22;
const BUFFER_SIZE: usize = 1024 * 8;

/// Carried inside `std::io::Error` when the trailing modification detection
/// code does not match the decrypted stream.
#[derive(Debug)]
pub struct MdcError;

impl fmt::Display for MdcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "modification detection code mismatch")
    }
}

impl std::error::Error for MdcError {}

/// Pull based decryption stream for integrity protected data.
///
/// The trailing modification detection code is withheld from consumers and
/// validated once the ciphertext is exhausted.
#[allow(clippy::large_enum_variant)]
pub enum StreamDecryptor<R>
where
    R: BufRead,
{
    TripleDes(StreamDecryptorInner<TdesEde3, R>),
    Cast5(StreamDecryptorInner<Cast5, R>),
    Aes128(StreamDecryptorInner<Aes128, R>),
    Aes192(StreamDecryptorInner<Aes192, R>),
    Aes256(StreamDecryptorInner<Aes256, R>),
}

impl<R> StreamDecryptor<R>
where
    R: BufRead,
{
    pub fn new(alg: SymmetricKeyAlgorithm, key: &[u8], ciphertext: R) -> Result<Self> {
        match alg {
            SymmetricKeyAlgorithm::Plaintext => {
                bail!("'Plaintext' is not a legal cipher for encrypted data")
            }
            SymmetricKeyAlgorithm::TripleDES => Ok(StreamDecryptor::TripleDes(
                StreamDecryptorInner::new(ciphertext, key)?,
            )),
            SymmetricKeyAlgorithm::CAST5 => Ok(StreamDecryptor::Cast5(
                StreamDecryptorInner::new(ciphertext, key)?,
            )),
            SymmetricKeyAlgorithm::AES128 => Ok(StreamDecryptor::Aes128(
                StreamDecryptorInner::new(ciphertext, key)?,
            )),
            SymmetricKeyAlgorithm::AES192 => Ok(StreamDecryptor::Aes192(
                StreamDecryptorInner::new(ciphertext, key)?,
            )),
            SymmetricKeyAlgorithm::AES256 => Ok(StreamDecryptor::Aes256(
                StreamDecryptorInner::new(ciphertext, key)?,
            )),
            SymmetricKeyAlgorithm::Other(code) => {
                unsupported_err!("SymmetricKeyAlgorithm {} is unsupported", code)
            }
        }
    }

    /// Drives the stream to its end and validates the modification
    /// detection code. Idempotent once the stream is exhausted.
    pub fn finish(&mut self) -> io::Result<()> {
        match self {
            Self::TripleDes(i) => i.finish(),
            Self::Cast5(i) => i.finish(),
            Self::Aes128(i) => i.finish(),
            Self::Aes192(i) => i.finish(),
            Self::Aes256(i) => i.finish(),
        }
    }
}

impl<R> BufRead for StreamDecryptor<R>
where
    R: BufRead,
{
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            Self::TripleDes(i) => i.fill_buf(),
            Self::Cast5(i) => i.fill_buf(),
            Self::Aes128(i) => i.fill_buf(),
            Self::Aes192(i) => i.fill_buf(),
            Self::Aes256(i) => i.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            Self::TripleDes(i) => i.consume(amt),
            Self::Cast5(i) => i.consume(amt),
            Self::Aes128(i) => i.consume(amt),
            Self::Aes192(i) => i.consume(amt),
            Self::Aes256(i) => i.consume(amt),
        }
    }
}

impl<R> Read for StreamDecryptor<R>
where
    R: BufRead,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::TripleDes(i) => i.read(buf),
            Self::Cast5(i) => i.read(buf),
            Self::Aes128(i) => i.read(buf),
            Self::Aes192(i) => i.read(buf),
            Self::Aes256(i) => i.read(buf),
        }
    }
}

pub enum StreamDecryptorInner<M, R>
where
    M: BlockDecrypt + BlockEncryptMut + BlockCipher,
    BufDecryptor<M>: KeyIvInit,
    R: BufRead,
{
    Prefix {
        decryptor: BufDecryptor<M>,
        // checksum over decrypted data
        hasher: Sha1,
        prefix: BytesMut,
        source: R,
    },
    Data {
        /// How much data has been decrypted and hashed and is available
        /// in the `buffer`, without the MDC.
        data_available: usize,
        decryptor: BufDecryptor<M>,
        hasher: Sha1,
        buffer: BytesMut,
        source: R,
    },
    Done {
        buffer: BytesMut,
        source: R,
    },
    Error,
}

impl<M, R> StreamDecryptorInner<M, R>
where
    M: BlockDecrypt + BlockEncryptMut + BlockCipher,
    BufDecryptor<M>: KeyIvInit,
    R: BufRead,
{
    fn new(source: R, key: &[u8]) -> Result<Self> {
        debug!("protected decrypt stream");

        let bs = <M as BlockSizeUser>::block_size();

        // IV is all zeroes
        let iv_vec = vec![0u8; bs];
        let decryptor = BufDecryptor::<M>::new_from_slices(key, &iv_vec)?;

        Ok(Self::Prefix {
            decryptor,
            hasher: Sha1::default(),
            prefix: BytesMut::zeroed(bs + 2),
            source,
        })
    }

    fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    fn finish(&mut self) -> io::Result<()> {
        let mut sink = [0u8; BUFFER_SIZE];
        while self.read(&mut sink)? > 0 {}
        if !self.is_done() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "missing modification detection code",
            ));
        }
        Ok(())
    }

    fn fill_inner(&mut self) -> io::Result<()> {
        loop {
            let (needs_replacing, should_return) = match self {
                Self::Prefix { .. } => (true, false),
                Self::Data {
                    data_available,
                    decryptor,
                    hasher,
                    buffer,
                    source,
                } => {
                    // keep at least a full MDC length in the buffer so the
                    // trailer is processed at the end, never served
                    if buffer.remaining() > MDC_LEN {
                        (false, true)
                    } else {
                        let current_len = buffer.remaining();
                        let to_read = BUFFER_SIZE - current_len;
                        let read = fill_buffer_bytes(source, buffer, BUFFER_SIZE)?;
                        let is_last_read = read < to_read;
                        decryptor.decrypt(&mut buffer[current_len..]);

                        if is_last_read {
                            (true, true)
                        } else {
                            let start = *data_available;
                            debug_assert!(buffer.len() >= MDC_LEN);
                            let end = buffer.len() - MDC_LEN;
                            if start < end {
                                hasher.update(&buffer[start..end]);
                                *data_available += end - start;
                            }

                            (false, true)
                        }
                    }
                }
                Self::Done { .. } => (false, true),
                Self::Error => panic!("StreamDecryptor errored"),
            };

            if needs_replacing {
                match std::mem::replace(self, Self::Error) {
                    Self::Prefix {
                        mut decryptor,
                        mut hasher,
                        mut prefix,
                        mut source,
                    } => {
                        let bs = <M as BlockSizeUser>::block_size();

                        let read = fill_buffer(&mut source, &mut prefix, Some(bs + 2))?;
                        if read < bs + 2 {
                            return Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "missing quick check",
                            ));
                        }

                        decryptor.decrypt(&mut prefix);
                        hasher.update(&prefix);

                        // The "quick check" bytes are deliberately not
                        // inspected, see the Security Considerations in
                        // <https://www.rfc-editor.org/rfc/rfc9580.html#name-risks-of-a-quick-check-orac>

                        *self = Self::Data {
                            data_available: 0,
                            decryptor,
                            hasher,
                            buffer: BytesMut::with_capacity(BUFFER_SIZE),
                            source,
                        };
                        // continue to data
                    }
                    Self::Data {
                        mut hasher,
                        mut buffer,
                        source,
                        ..
                    } => {
                        // last read
                        if buffer.remaining() < MDC_LEN {
                            return Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "missing modification detection code",
                            ));
                        }

                        // grab the MDC from the end:
                        // 1 byte packet tag, 1 byte length, 20 bytes SHA1
                        let mdc = buffer.split_off(buffer.len() - MDC_LEN);

                        hasher.update(&buffer);
                        hasher.update(&mdc[..2]);

                        let sha1: [u8; 20] = hasher.finalize().into();

                        if mdc[0] != 0xD3 || mdc[1] != 0x14 || mdc[2..] != sha1[..] {
                            return Err(io::Error::new(io::ErrorKind::InvalidData, MdcError));
                        }

                        *self = Self::Done { buffer, source };
                    }
                    Self::Done { .. } => unreachable!("not changed"),
                    Self::Error => panic!("StreamDecryptor errored"),
                }
            }

            if should_return {
                return Ok(());
            }
        }
    }
}

impl<M, R> BufRead for StreamDecryptorInner<M, R>
where
    M: BlockDecrypt + BlockEncryptMut + BlockCipher,
    BufDecryptor<M>: KeyIvInit,
    R: BufRead,
{
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.fill_inner()?;
        match self {
            Self::Prefix { .. } => unreachable!("invalid state"),
            Self::Data {
                buffer,
                data_available,
                ..
            } => Ok(&buffer[..*data_available]),
            Self::Done { buffer, .. } => Ok(&buffer[..]),
            Self::Error => panic!("StreamDecryptor errored"),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            Self::Prefix { .. } => unreachable!("invalid state"),
            Self::Data {
                buffer,
                data_available,
                ..
            } => {
                buffer.advance(amt);
                *data_available -= amt;
            }
            Self::Done { buffer, .. } => {
                buffer.advance(amt);
            }
            Self::Error => panic!("StreamDecryptor errored"),
        }
    }
}

impl<M, R> Read for StreamDecryptorInner<M, R>
where
    M: BlockDecrypt + BlockEncryptMut + BlockCipher,
    BufDecryptor<M>: KeyIvInit,
    R: BufRead,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.fill_inner()?;
        match self {
            Self::Prefix { .. } => unreachable!("invalid state"),
            Self::Data {
                buffer,
                data_available,
                ..
            } => {
                let to_write = (*data_available).min(buf.len());
                buffer.copy_to_slice(&mut buf[..to_write]);
                *data_available -= to_write;
                Ok(to_write)
            }
            Self::Done { buffer, .. } => {
                let to_write = buffer.remaining().min(buf.len());
                buffer.copy_to_slice(&mut buf[..to_write]);
                Ok(to_write)
            }
            Self::Error => panic!("StreamDecryptor errored"),
        }
    }
}
