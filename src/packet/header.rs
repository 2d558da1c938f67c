use std::io::{self, BufRead, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_enum::{FromPrimitive, IntoPrimitive};

/// Packet tags understood by this crate.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-packet-types>
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Tag {
    Signature = 2,
    OnePassSignature = 4,
    CompressedData = 8,
    LiteralData = 11,
    SymEncryptedProtectedData = 18,

    #[num_enum(catch_all)]
    Other(u8),
}

/// A parsed packet header: tag plus fixed body length.
///
/// Only new style framing with definite lengths is produced and consumed;
/// partial body lengths are rejected.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct PacketHeader {
    tag: Tag,
    len: usize,
}

impl PacketHeader {
    pub fn new(tag: Tag, len: usize) -> Self {
        Self { tag, len }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn body_len(&self) -> usize {
        self.len
    }

    pub fn from_reader(r: &mut impl Read) -> io::Result<Self> {
        let first = r.read_u8()?;
        if first & 0xC0 != 0xC0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "unsupported packet framing",
            ));
        }
        let tag = Tag::from(first & 0x3F);
        let olen = r.read_u8()?;
        let len = match olen {
            0..=191 => olen as usize,
            192..=223 => {
                let second = r.read_u8()?;
                ((olen as usize - 192) << 8) + 192 + second as usize
            }
            224..=254 => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "partial body lengths are not supported",
                ));
            }
            255 => r.read_u32::<BigEndian>()? as usize,
        };
        Ok(Self { tag, len })
    }

    pub fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_u8(0xC0 | u8::from(self.tag))?;
        write_packet_len(self.len, w)
    }
}

pub(crate) fn write_packet_len(len: usize, w: &mut impl Write) -> io::Result<()> {
    if len < 192 {
        w.write_u8(len as u8)?;
    } else if len < 8384 {
        w.write_u8((((len - 192) >> 8) + 192) as u8)?;
        w.write_u8(((len - 192) & 0xFF) as u8)?;
    } else {
        w.write_u8(255)?;
        w.write_u32::<BigEndian>(len as u32)?;
    }
    Ok(())
}

/// Reads exactly one packet body. Reports a truncated body as an error,
/// never as silent end of stream.
#[derive(Debug)]
pub struct PacketBodyReader<R> {
    header: PacketHeader,
    remaining: usize,
    source: R,
}

impl<R: BufRead> PacketBodyReader<R> {
    pub fn new(header: PacketHeader, source: R) -> Self {
        Self {
            header,
            remaining: header.body_len(),
            source,
        }
    }

    pub fn header(&self) -> PacketHeader {
        self.header
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    pub fn into_inner(self) -> R {
        self.source
    }
}

impl<R: BufRead> BufRead for PacketBodyReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.remaining == 0 {
            return Ok(&[]);
        }
        let buf = self.source.fill_buf()?;
        if buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "packet body ended early",
            ));
        }
        let n = buf.len().min(self.remaining);
        Ok(&buf[..n])
    }

    fn consume(&mut self, amt: usize) {
        debug_assert!(amt <= self.remaining);
        self.remaining -= amt;
        self.source.consume(amt);
    }
}

impl<R: BufRead> Read for PacketBodyReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = {
            let avail = self.fill_buf()?;
            let n = avail.len().min(buf.len());
            buf[..n].copy_from_slice(&avail[..n]);
            n
        };
        self.consume(n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn roundtrip(tag: Tag, len: usize) {
        let mut out = Vec::new();
        PacketHeader::new(tag, len).write_to(&mut out).unwrap();
        let parsed = PacketHeader::from_reader(&mut &out[..]).unwrap();
        assert_eq!(parsed.tag(), tag);
        assert_eq!(parsed.body_len(), len);
    }

    #[test]
    fn header_roundtrip() {
        for len in [0, 1, 191, 192, 8383, 8384, 70000] {
            roundtrip(Tag::LiteralData, len);
            roundtrip(Tag::Signature, len);
        }
    }

    #[test]
    fn two_octet_length_encoding() {
        let mut out = Vec::new();
        write_packet_len(1173, &mut out).unwrap();
        assert_eq!(out, vec![0xc3, 0xd5]);
    }

    #[test]
    fn truncated_body_is_an_error() {
        let header = PacketHeader::new(Tag::LiteralData, 10);
        let mut reader = PacketBodyReader::new(header, &b"short"[..]);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
