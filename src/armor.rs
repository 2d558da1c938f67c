//! ASCII armor encoding and decoding for messages and signatures.

use std::io::BufRead;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::debug;

use crate::errors::{Error, Result};

const LINE_LENGTH: usize = 64;

/// Armor block types understood by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Message,
    Signature,
}

impl BlockType {
    fn label(self) -> &'static str {
        match self {
            BlockType::Message => "PGP MESSAGE",
            BlockType::Signature => "PGP SIGNATURE",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "PGP MESSAGE" => Some(BlockType::Message),
            "PGP SIGNATURE" => Some(BlockType::Signature),
            _ => None,
        }
    }
}

/// Encodes `data` into an armored block.
pub fn encode(typ: BlockType, data: &[u8]) -> String {
    let mut out = String::new();
    out.push_str("-----BEGIN ");
    out.push_str(typ.label());
    out.push_str("-----\n\n");

    let encoded = STANDARD.encode(data);
    for chunk in encoded.as_bytes().chunks(LINE_LENGTH) {
        out.push_str(std::str::from_utf8(chunk).expect("base64 is ascii"));
        out.push('\n');
    }

    out.push('=');
    out.push_str(&STANDARD.encode(crc24_bytes(data)));
    out.push('\n');

    out.push_str("-----END ");
    out.push_str(typ.label());
    out.push_str("-----\n");
    out
}

/// Decodes a single armored block.
///
/// Armor headers (`Key: Value` lines) are tolerated and discarded. When a
/// checksum line is present it is validated.
pub fn decode(input: &[u8]) -> Result<(BlockType, Vec<u8>)> {
    let text = std::str::from_utf8(input).map_err(|_| Error::InvalidArmorWrappers)?;
    let mut lines = text.lines();

    let typ = loop {
        let line = lines.next().ok_or(Error::InvalidArmorWrappers)?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let label = line
            .strip_prefix("-----BEGIN ")
            .and_then(|rest| rest.strip_suffix("-----"))
            .ok_or(Error::InvalidArmorWrappers)?;
        break BlockType::from_label(label).ok_or(Error::InvalidArmorWrappers)?;
    };

    let mut base64_data = String::new();
    let mut checksum = None;
    let mut in_headers = true;
    let mut closed = false;
    for line in lines {
        let line = line.trim();
        if in_headers {
            if line.is_empty() {
                in_headers = false;
                continue;
            }
            if line.contains(": ") {
                // armor header, ignored
                continue;
            }
            in_headers = false;
        }
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("-----END ") {
            let label = rest.strip_suffix("-----").ok_or(Error::InvalidArmorWrappers)?;
            if BlockType::from_label(label) != Some(typ) {
                return Err(Error::InvalidArmorWrappers);
            }
            closed = true;
            break;
        }
        if let Some(sum) = line.strip_prefix('=') {
            checksum = Some(sum.to_string());
            continue;
        }
        base64_data.push_str(line);
    }
    if !closed {
        return Err(Error::InvalidArmorWrappers);
    }

    let data = STANDARD.decode(base64_data.as_bytes())?;

    if let Some(sum) = checksum {
        let expected = STANDARD.decode(sum.as_bytes())?;
        if expected != crc24_bytes(&data) {
            return Err(Error::InvalidChecksum);
        }
    }

    debug!("dearmored {} byte(s) of {:?}", data.len(), typ);
    Ok((typ, data))
}

fn crc24_bytes(data: &[u8]) -> [u8; 3] {
    let crc = crc24::hash_raw(data);
    [(crc >> 16) as u8, (crc >> 8) as u8, crc as u8]
}

/// Peeks at a buffered source and reports whether it looks armored.
pub(crate) fn starts_armored(source: &mut impl BufRead) -> std::io::Result<bool> {
    let buf = source.fill_buf()?;
    let trimmed = buf
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|start| &buf[start..])
        .unwrap_or(&[]);
    Ok(trimmed.starts_with(b"-----BEGIN "))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn roundtrip() {
        let data = b"some binary \x00\x01\x02 payload".to_vec();
        let armored = encode(BlockType::Message, &data);
        let (typ, decoded) = decode(armored.as_bytes()).unwrap();
        assert_eq!(typ, BlockType::Message);
        assert_eq!(decoded, data);
    }

    #[test]
    fn decode_with_headers() {
        let armored = "-----BEGIN PGP SIGNATURE-----\nVersion: test\n\naGVsbG8=\n-----END PGP SIGNATURE-----\n";
        let (typ, decoded) = decode(armored.as_bytes()).unwrap();
        assert_eq!(typ, BlockType::Signature);
        assert_eq!(decoded, b"hello");
    }

    #[test]
    fn bad_checksum_is_rejected() {
        let armored = encode(BlockType::Message, b"payload");
        let corrupted: String = armored
            .lines()
            .map(|l| if l.starts_with('=') { "=AAAA" } else { l })
            .collect::<Vec<_>>()
            .join("\n");
        assert!(matches!(
            decode(corrupted.as_bytes()),
            Err(Error::InvalidChecksum)
        ));
    }

    #[test]
    fn mismatched_wrappers_are_rejected() {
        let armored = "-----BEGIN PGP MESSAGE-----\n\naGVsbG8=\n-----END PGP SIGNATURE-----\n";
        assert!(matches!(
            decode(armored.as_bytes()),
            Err(Error::InvalidArmorWrappers)
        ));
    }

    #[test]
    fn armor_detection() {
        let mut armored = &b"-----BEGIN PGP MESSAGE-----"[..];
        assert!(starts_armored(&mut armored).unwrap());
        let mut binary = &b"\xc2\x0abinary"[..];
        assert!(!starts_armored(&mut binary).unwrap());
    }
}
