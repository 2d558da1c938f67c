use aes::{Aes128, Aes192, Aes256};
use bytes::{Buf, Bytes, BytesMut};
use cast5::Cast5;
use cfb_mode::cipher::KeyIvInit;
use cfb_mode::BufEncryptor;
use cipher::{BlockCipher, BlockDecrypt, BlockEncryptMut, BlockSizeUser};
use des::TdesEde3;
use log::debug;
use rand::{CryptoRng, Rng};
use sha1::{Digest, Sha1};

use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{bail, unsupported_err, Result};
use crate::util::fill_buffer;

/// Pull based encryption stream producing the OpenPGP CFB layout:
/// random prefix, quick check, ciphertext and the trailing encrypted
/// modification detection code.
pub enum StreamEncryptor<R>
where
    R: std::io::Read,
{
    TripleDes(StreamEncryptorInner<TdesEde3, R>),
    Cast5(StreamEncryptorInner<Cast5, R>),
    Aes128(StreamEncryptorInner<Aes128, R>),
    Aes192(StreamEncryptorInner<Aes192, R>),
    Aes256(StreamEncryptorInner<Aes256, R>),
}

impl<R: std::io::Read> StreamEncryptor<R> {
    pub fn new<B: Rng + CryptoRng>(
        rng: B,
        alg: SymmetricKeyAlgorithm,
        key: &[u8],
        plaintext: R,
    ) -> Result<Self> {
        match alg {
            SymmetricKeyAlgorithm::Plaintext => {
                bail!("'Plaintext' is not a legal cipher for encrypted data")
            }
            SymmetricKeyAlgorithm::TripleDES => Ok(StreamEncryptor::TripleDes(
                StreamEncryptorInner::new(rng, plaintext, key)?,
            )),
            SymmetricKeyAlgorithm::CAST5 => Ok(StreamEncryptor::Cast5(
                StreamEncryptorInner::new(rng, plaintext, key)?,
            )),
            SymmetricKeyAlgorithm::AES128 => Ok(StreamEncryptor::Aes128(
                StreamEncryptorInner::new(rng, plaintext, key)?,
            )),
            SymmetricKeyAlgorithm::AES192 => Ok(StreamEncryptor::Aes192(
                StreamEncryptorInner::new(rng, plaintext, key)?,
            )),
            SymmetricKeyAlgorithm::AES256 => Ok(StreamEncryptor::Aes256(
                StreamEncryptorInner::new(rng, plaintext, key)?,
            )),
            SymmetricKeyAlgorithm::Other(code) => {
                unsupported_err!("SymmetricKeyAlgorithm {} is unsupported", code)
            }
        }
    }
}

impl<R> std::io::Read for StreamEncryptor<R>
where
    R: std::io::Read,
{
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::TripleDes(ref mut i) => i.read(buf),
            Self::Cast5(ref mut i) => i.read(buf),
            Self::Aes128(ref mut i) => i.read(buf),
            Self::Aes192(ref mut i) => i.read(buf),
            Self::Aes256(ref mut i) => i.read(buf),
        }
    }
}

pub enum StreamEncryptorInner<M, R>
where
    M: BlockDecrypt + BlockEncryptMut + BlockCipher,
    BufEncryptor<M>: KeyIvInit,
    R: std::io::Read,
{
    Prefix {
        // Regular sha1 is fine for the MDC, collisions are not a concern.
        hasher: Sha1,
        encryptor: BufEncryptor<M>,
        prefix: Bytes,
        source: R,
    },
    Data {
        hasher: Sha1,
        encryptor: BufEncryptor<M>,
        buffer: BytesMut,
        /// set to `None` once the source is fully read
        source: Option<R>,
    },
    Mdc {
        mdc: Bytes,
    },
    Done,
    Error,
}

impl<M, R> StreamEncryptorInner<M, R>
where
    M: BlockDecrypt + BlockEncryptMut + BlockCipher,
    BufEncryptor<M>: KeyIvInit,
    R: std::io::Read,
{
    fn new<RAND>(mut rng: RAND, source: R, key: &[u8]) -> Result<Self>
    where
        RAND: Rng + CryptoRng,
    {
        debug!("protected encrypt stream");

        let bs = <M as BlockSizeUser>::block_size();
        let mut prefix = vec![0u8; bs + 2];

        // prefix
        rng.fill_bytes(&mut prefix[..bs]);

        // add quick check
        prefix[bs] = prefix[bs - 2];
        prefix[bs + 1] = prefix[bs - 1];

        // checksum over unencrypted data
        let mut hasher = Sha1::default();

        // IV is all zeroes
        let iv_vec = vec![0u8; bs];

        let mut encryptor = BufEncryptor::<M>::new_from_slices(key, &iv_vec)?;

        // pre ingest prefix and encrypt it
        hasher.update(&prefix);
        encryptor.encrypt(&mut prefix);

        Ok(Self::Prefix {
            hasher,
            encryptor,
            prefix: prefix.into(),
            source,
        })
    }

    fn buffer_size() -> usize {
        <M as BlockSizeUser>::block_size() * 64
    }
}

impl<M, R> std::io::Read for StreamEncryptorInner<M, R>
where
    M: BlockDecrypt + BlockEncryptMut + BlockCipher,
    BufEncryptor<M>: KeyIvInit,
    R: std::io::Read,
{
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        // Empty sources transition straight through `Data` without producing
        // bytes, so loop instead of surfacing a spurious `Ok(0)`.
        loop {
            match std::mem::replace(self, Self::Error) {
                Self::Prefix {
                    mut hasher,
                    mut encryptor,
                    mut prefix,
                    mut source,
                } => {
                    let to_write = buf.len().min(prefix.remaining());
                    prefix.copy_to_slice(&mut buf[..to_write]);

                    if prefix.has_remaining() {
                        *self = Self::Prefix {
                            hasher,
                            encryptor,
                            prefix,
                            source,
                        };
                    } else {
                        // prefix written, transition to data
                        let mut buffer = BytesMut::zeroed(Self::buffer_size());

                        let read = fill_buffer(&mut source, &mut buffer, None)?;
                        let source = if read < buffer.len() {
                            buffer.truncate(read);
                            None
                        } else {
                            Some(source)
                        };

                        hasher.update(&buffer);
                        encryptor.encrypt(&mut buffer);

                        *self = Self::Data {
                            hasher,
                            encryptor,
                            buffer,
                            source,
                        };
                    }

                    if to_write > 0 {
                        return Ok(to_write);
                    }
                }
                Self::Data {
                    mut hasher,
                    mut encryptor,
                    mut buffer,
                    source,
                } => {
                    let to_write = buf.len().min(buffer.remaining());
                    buffer.copy_to_slice(&mut buf[..to_write]);

                    if buffer.has_remaining() {
                        *self = Self::Data {
                            hasher,
                            encryptor,
                            buffer,
                            source,
                        };
                    } else {
                        // needs filling
                        let (mdc, source) = if let Some(mut source) = source {
                            buffer.resize(Self::buffer_size(), 0);
                            let read = fill_buffer(&mut source, &mut buffer, None)?;
                            let source = if read < buffer.len() {
                                buffer.truncate(read);
                                None
                            } else {
                                Some(source)
                            };
                            if buffer.is_empty() {
                                // nothing left
                                (true, source)
                            } else {
                                hasher.update(&buffer);
                                encryptor.encrypt(&mut buffer);
                                (false, source)
                            }
                        } else {
                            (true, source)
                        };

                        if mdc {
                            // source is fully read, move on to the MDC
                            let mdc_header = [0xD3, 0x14];
                            hasher.update(mdc_header);

                            let mut mdc = BytesMut::zeroed(22);
                            mdc[..2].copy_from_slice(&mdc_header);

                            let checksum = &hasher.finalize()[..20];
                            mdc[2..22].copy_from_slice(checksum);

                            encryptor.encrypt(&mut mdc[..]);
                            *self = Self::Mdc { mdc: mdc.freeze() };
                        } else {
                            *self = Self::Data {
                                hasher,
                                encryptor,
                                buffer,
                                source,
                            };
                        };
                    }

                    if to_write > 0 {
                        return Ok(to_write);
                    }
                }
                Self::Mdc { mut mdc } => {
                    let to_write = buf.len().min(mdc.remaining());
                    mdc.copy_to_slice(&mut buf[..to_write]);

                    if mdc.has_remaining() {
                        *self = Self::Mdc { mdc };
                    } else {
                        *self = Self::Done;
                    }

                    return Ok(to_write);
                }
                Self::Done => {
                    *self = Self::Done;
                    return Ok(0);
                }
                Self::Error => {
                    panic!("StreamEncryptor errored");
                }
            }
        }
    }
}
