mod builder;
mod check_reader;
mod reader;

pub use self::builder::sign_inline;
pub(crate) use self::builder::{compress_packets, write_literal, write_signed};
pub use self::check_reader::CheckReader;
pub(crate) use self::check_reader::classify_stream_error;
pub use self::reader::SignedMessageReader;

use crate::packet::{DataMode, LiteralDataHeader};

/// Selects the inbound framing of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Peek at the stream and detect armor.
    #[default]
    Auto,
    /// ASCII armored input.
    Armor,
    /// Raw binary packets.
    Binary,
}

/// Literal data metadata carried through decryption and verification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    pub filename: String,
    pub mod_time: u32,
    pub is_utf8: bool,
}

impl From<&LiteralDataHeader> for Metadata {
    fn from(header: &LiteralDataHeader) -> Self {
        Self {
            filename: header.file_name().to_string(),
            mod_time: header.mtime(),
            is_utf8: header.is_utf8(),
        }
    }
}

/// A plaintext message together with its literal metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainMessage {
    data: Vec<u8>,
    metadata: Metadata,
}

impl PlainMessage {
    /// A binary message.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            metadata: Metadata::default(),
        }
    }

    /// A UTF-8 text message.
    pub fn new_text(text: impl Into<String>) -> Self {
        Self {
            data: text.into().into_bytes(),
            metadata: Metadata {
                is_utf8: true,
                ..Default::default()
            },
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.metadata.filename = filename.into();
        self
    }

    pub fn with_mod_time(mut self, mod_time: u32) -> Self {
        self.metadata.mod_time = mod_time;
        self
    }

    pub(crate) fn from_parts(data: Vec<u8>, metadata: Metadata) -> Self {
        Self { data, metadata }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub(crate) fn literal_header(&self) -> LiteralDataHeader {
        let mode = if self.metadata.is_utf8 {
            DataMode::Utf8
        } else {
            DataMode::Binary
        };
        LiteralDataHeader::new(mode, self.metadata.filename.clone(), self.metadata.mod_time)
    }
}
