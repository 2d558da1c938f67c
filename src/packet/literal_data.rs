use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_enum::{FromPrimitive, IntoPrimitive};

/// The data mode carried in a literal data packet.
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DataMode {
    Binary = b'b',
    Text = b't',
    Utf8 = b'u',

    #[num_enum(catch_all)]
    Other(u8),
}

/// Header of a literal data packet: mode, file name and modification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralDataHeader {
    mode: DataMode,
    file_name: String,
    mtime: u32,
}

impl Default for LiteralDataHeader {
    fn default() -> Self {
        Self {
            mode: DataMode::Binary,
            file_name: String::new(),
            mtime: 0,
        }
    }
}

impl LiteralDataHeader {
    pub fn new(mode: DataMode, file_name: impl Into<String>, mtime: u32) -> Self {
        Self {
            mode,
            file_name: file_name.into(),
            mtime,
        }
    }

    pub fn mode(&self) -> DataMode {
        self.mode
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mtime(&self) -> u32 {
        self.mtime
    }

    pub fn is_utf8(&self) -> bool {
        matches!(self.mode, DataMode::Utf8 | DataMode::Text)
    }

    pub fn from_reader(r: &mut impl Read) -> io::Result<Self> {
        let mode = DataMode::from(r.read_u8()?);
        let name_len = r.read_u8()? as usize;
        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name)?;
        let file_name = String::from_utf8(name)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "file name is not utf8"))?;
        let mtime = r.read_u32::<BigEndian>()?;
        Ok(Self {
            mode,
            file_name,
            mtime,
        })
    }

    pub fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_u8(u8::from(self.mode))?;
        let name = self.file_name.as_bytes();
        debug_assert!(name.len() <= u8::MAX as usize);
        w.write_u8(name.len() as u8)?;
        w.write_all(name)?;
        w.write_u32::<BigEndian>(self.mtime)
    }

    pub fn byte_len(&self) -> usize {
        1 + 1 + self.file_name.len() + 4
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = LiteralDataHeader::new(DataMode::Utf8, "notes.txt", 1_700_000_000);
        let mut out = Vec::new();
        header.write_to(&mut out).unwrap();
        assert_eq!(out.len(), header.byte_len());
        assert_eq!(LiteralDataHeader::from_reader(&mut &out[..]).unwrap(), header);
    }
}
