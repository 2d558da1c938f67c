use std::io::{self, BufRead, BufReader, Read};

use byteorder::ReadBytesExt;
use flate2::bufread::DeflateDecoder;
use log::debug;

use crate::packet::{
    CompressionAlgorithm, LiteralDataHeader, OnePassSignature, PacketBodyReader, PacketHeader,
    Signature, Tag,
};

/// The packet source of an inline message, transparently inflating a
/// compressed container.
enum InnerSource<R: BufRead> {
    Raw(R),
    Zip(BufReader<DeflateDecoder<PacketBodyReader<R>>>),
}

impl<R: BufRead> BufRead for InnerSource<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            Self::Raw(r) => r.fill_buf(),
            Self::Zip(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            Self::Raw(r) => r.consume(amt),
            Self::Zip(r) => r.consume(amt),
        }
    }
}

impl<R: BufRead> Read for InnerSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Raw(r) => r.read(buf),
            Self::Zip(r) => r.read(buf),
        }
    }
}

/// Streams the literal bytes of an inline message.
///
/// The packet layout is parsed eagerly up to the literal body: an optional
/// compressed container, any number of one-pass signature headers, then the
/// literal data. Trailing signature packets are collected when the literal
/// body has been fully read.
pub struct SignedMessageReader<R: BufRead> {
    one_pass: Vec<OnePassSignature>,
    literal: LiteralDataHeader,
    state: State<R>,
}

enum State<R: BufRead> {
    Body {
        source: PacketBodyReader<InnerSource<R>>,
    },
    Done {
        signatures: Vec<Signature>,
    },
    Error,
}

impl<R: BufRead> SignedMessageReader<R> {
    pub fn new(mut source: R) -> io::Result<Self> {
        let first = PacketHeader::from_reader(&mut source)?;

        let mut src;
        let mut header;
        if first.tag() == Tag::CompressedData {
            let mut body = PacketBodyReader::new(first, source);
            let algo = CompressionAlgorithm::from(body.read_u8()?);
            debug!("compressed message: {algo:?}");
            match algo {
                CompressionAlgorithm::Zip => {
                    src = InnerSource::Zip(BufReader::new(DeflateDecoder::new(body)));
                }
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("unsupported compression algorithm {algo:?}"),
                    ));
                }
            }
            header = PacketHeader::from_reader(&mut src)?;
        } else {
            src = InnerSource::Raw(source);
            header = first;
        }

        let mut one_pass = Vec::new();
        while header.tag() == Tag::OnePassSignature {
            let mut body = PacketBodyReader::new(header, src);
            let ops = OnePassSignature::from_reader(&mut body)?;
            if !body.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "trailing bytes in one pass signature packet",
                ));
            }
            debug!("one pass signature from {}", ops.issuer());
            one_pass.push(ops);
            src = body.into_inner();
            header = PacketHeader::from_reader(&mut src)?;
        }

        if header.tag() != Tag::LiteralData {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected tag: {:?}", header.tag()),
            ));
        }
        let mut body = PacketBodyReader::new(header, src);
        let literal = LiteralDataHeader::from_reader(&mut body)?;

        Ok(Self {
            one_pass,
            literal,
            state: State::Body { source: body },
        })
    }

    pub fn one_pass(&self) -> &[OnePassSignature] {
        &self.one_pass
    }

    pub fn literal_header(&self) -> &LiteralDataHeader {
        &self.literal
    }

    /// The trailing signature packets; available once the literal body has
    /// been read to its end.
    pub fn signatures(&self) -> Option<&[Signature]> {
        match &self.state {
            State::Done { signatures } => Some(signatures),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done { .. })
    }

    fn read_trailing(
        mut src: InnerSource<R>,
        expected: usize,
    ) -> io::Result<Vec<Signature>> {
        let mut signatures = Vec::new();
        loop {
            if src.fill_buf()?.is_empty() {
                break;
            }
            let header = PacketHeader::from_reader(&mut src)?;
            if header.tag() != Tag::Signature {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unexpected trailing tag: {:?}", header.tag()),
                ));
            }
            let mut body = PacketBodyReader::new(header, src);
            let signature = Signature::from_reader(&mut body)?;
            if !body.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "trailing bytes in signature packet",
                ));
            }
            src = body.into_inner();
            signatures.push(signature);
        }
        if signatures.len() < expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "missing trailing signature packet",
            ));
        }
        debug!("collected {} trailing signature(s)", signatures.len());
        Ok(signatures)
    }
}

impl<R: BufRead> Read for SignedMessageReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match &mut self.state {
                State::Body { source } => {
                    let read = source.read(buf)?;
                    if read > 0 || buf.is_empty() {
                        return Ok(read);
                    }
                }
                State::Done { .. } => return Ok(0),
                State::Error => {
                    return Err(io::Error::new(
                        io::ErrorKind::Other,
                        "message reader errored",
                    ));
                }
            }

            // literal body exhausted; collect the trailing packets
            let State::Body { source } = std::mem::replace(&mut self.state, State::Error) else {
                unreachable!("checked above");
            };
            let src = source.into_inner();
            let signatures = Self::read_trailing(src, self.one_pass.len())?;
            self.state = State::Done { signatures };
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::keyring::Key;
    use crate::message::{sign_inline, write_literal, PlainMessage};
    use crate::packet::SignatureConfig;

    #[test]
    fn plain_literal_message() {
        let msg = PlainMessage::new_text("hello literal").with_filename("hello.txt");
        let mut bytes = Vec::new();
        write_literal(&mut bytes, &msg).unwrap();

        let mut reader = SignedMessageReader::new(&bytes[..]).unwrap();
        assert!(reader.one_pass().is_empty());
        assert_eq!(reader.literal_header().file_name(), "hello.txt");

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello literal");
        assert_eq!(reader.signatures().unwrap(), &[]);
    }

    #[test]
    fn one_pass_signed_message() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let key = Key::generate(&mut rng);
        let msg = PlainMessage::new(b"signed body".to_vec());
        let bytes = sign_inline(&msg, &key, SignatureConfig::binary()).unwrap();

        let mut reader = SignedMessageReader::new(&bytes[..]).unwrap();
        assert_eq!(reader.one_pass().len(), 1);
        assert!(reader.signatures().is_none());

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"signed body");

        let signatures = reader.signatures().unwrap();
        assert_eq!(signatures.len(), 1);
        assert_eq!(signatures[0].issuer(), key.key_id());
    }

    #[test]
    fn missing_trailing_signature_is_an_error() {
        let mut rng = ChaCha8Rng::seed_from_u64(22);
        let key = Key::generate(&mut rng);
        let msg = PlainMessage::new(b"signed body".to_vec());
        let bytes = sign_inline(&msg, &key, SignatureConfig::binary()).unwrap();

        // learn the trailing signature packet length, then serve a message
        // with the packet chopped off entirely
        let mut reader = SignedMessageReader::new(&bytes[..]).unwrap();
        std::io::copy(&mut reader, &mut std::io::sink()).unwrap();
        let sig_len = reader.signatures().unwrap()[0].to_bytes().unwrap().len();

        let short = &bytes[..bytes.len() - sig_len];
        let mut reader = SignedMessageReader::new(short).unwrap();
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
