//! Cleartext signature framework: human readable signed text followed by an
//! armored detached signature section.
//!
//! Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-cleartext-signature-framewo>

use nom::branch::alt;
use nom::bytes::complete::{tag, take_until1};
use nom::character::complete::{line_ending, not_line_ending};
use nom::combinator::{complete, map_res, opt};
use nom::multi::many0;
use nom::sequence::terminated;
use nom::IResult;

use crate::armor::{self, BlockType};
use crate::errors::{Error, Result};
use crate::keyring::Key;
use crate::packet::SignatureConfig;

const HEADER_LINE: &str = "-----BEGIN PGP SIGNED MESSAGE-----";

/// A parsed cleartext signed message: the recovered text and the raw bytes
/// of its detached signature section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleartextMessage {
    text: String,
    signature: Vec<u8>,
}

impl CleartextMessage {
    /// Parses the dual-section container. The recovered text has its dash
    /// escaping undone and carries no trailing line terminator; the framing
    /// appends exactly one terminator that is not part of the content.
    pub fn parse(input: &[u8]) -> Result<Self> {
        let (rest, body) = parse_container(input).map_err(|_| Error::Format {
            message: "not a cleartext signed message".into(),
        })?;

        let (typ, signature) = armor::decode(rest)?;
        if typ != BlockType::Signature {
            return Err(Error::Format {
                message: "cleartext message without signature section".into(),
            });
        }

        Ok(Self {
            text: dash_unescape(&body),
            signature,
        })
    }

    /// The recovered signed text.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// The decoded detached signature packets covering [`text`](Self::text).
    pub fn signature_data(&self) -> &[u8] {
        &self.signature
    }

    /// Signs `text` and produces the armored cleartext container. The
    /// signature is a text-type signature, so verification is stable across
    /// line ending conventions.
    pub fn sign(text: &str, key: &Key) -> Result<String> {
        let signature = SignatureConfig::text().sign_data(key, text.as_bytes())?;

        let mut out = String::with_capacity(text.len() + 256);
        out.push_str(HEADER_LINE);
        out.push_str("\nHash: SHA256\n\n");
        out.push_str(&dash_escape(text));
        out.push('\n');
        out.push_str(&armor::encode(BlockType::Signature, &signature.to_bytes()?));
        Ok(out)
    }
}

/// Consumes the header line, the armor headers and the cleartext body.
/// Returns the body and leaves the signature section in the remainder.
fn parse_container(i: &[u8]) -> IResult<&[u8], String> {
    let (i, _) = tag(HEADER_LINE)(i)?;
    let (i, _) = line_ending(i)?;
    let (i, _) = many0(complete(header_line))(i)?;
    let (i, _) = opt(line_ending)(i)?;
    cleartext_body(i)
}

/// A single `Key: Value` armor header line, `Hash` being the only one that
/// is produced.
fn header_line(i: &[u8]) -> IResult<&[u8], ()> {
    let (i, _) = alt((tag("Hash: "), tag("Charset: ")))(i)?;
    let (i, _) = terminated(not_line_ending, line_ending)(i)?;
    Ok((i, ()))
}

fn cleartext_body(i: &[u8]) -> IResult<&[u8], String> {
    let (i, body) = map_res(
        alt((
            complete(take_until1("\r\n-----")),
            complete(take_until1("\n-----")),
        )),
        |b: &[u8]| std::str::from_utf8(b).map(str::to_owned),
    )(i)?;
    let (i, _) = line_ending(i)?;
    Ok((i, body))
}

/// Dash escape the given text.
///
/// This implementation is agnostic between `\n` and `\r\n` line endings.
fn dash_escape(text: &str) -> String {
    let mut out = String::new();
    for line in text.split_inclusive('\n') {
        if line.starts_with('-') {
            out += "- ";
        }
        out.push_str(line);
    }
    out
}

/// Undo dash escaping of `text`.
fn dash_unescape(text: &str) -> String {
    let mut out = String::new();
    for line in text.split_inclusive('\n') {
        if let Some(stripped) = line.strip_prefix("- ") {
            out += stripped;
        } else {
            out += line;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn test_cleartext_body() {
        assert_eq!(
            cleartext_body(b"-- hello\n--world\n-----bla").unwrap(),
            (&b"-----bla"[..], "-- hello\n--world".to_string())
        );

        assert_eq!(
            cleartext_body(b"-- hello\r\n--world\r\n-----bla").unwrap(),
            (&b"-----bla"[..], "-- hello\r\n--world".to_string())
        );
    }

    #[test]
    fn test_dash_escape() {
        let input = "From the grocery store we need:

- tofu
- vegetables
- noodles

";
        let expected = "From the grocery store we need:

- - tofu
- - vegetables
- - noodles

";

        assert_eq!(dash_escape(input), expected);
        assert_eq!(dash_unescape(expected), input);
    }

    #[test]
    fn sign_parse_roundtrip() {
        let mut rng = ChaCha8Rng::seed_from_u64(31);
        let key = Key::generate(&mut rng);

        let text = "You are scrupulously honest, frank, and straightforward.\nTherefore you have few friends.";
        let armored = CleartextMessage::sign(text, &key).unwrap();

        let msg = CleartextMessage::parse(armored.as_bytes()).unwrap();
        assert_eq!(msg.text(), text);
        assert!(!msg.signature_data().is_empty());
    }

    #[test]
    fn dash_prefixed_lines_survive() {
        let mut rng = ChaCha8Rng::seed_from_u64(32);
        let key = Key::generate(&mut rng);

        let text = "- tofu\n- vegetables\n- noodles";
        let armored = CleartextMessage::sign(text, &key).unwrap();
        assert!(armored.contains("- - tofu"));

        let msg = CleartextMessage::parse(armored.as_bytes()).unwrap();
        assert_eq!(msg.text(), text);
    }

    #[test]
    fn malformed_container_is_a_format_error() {
        let err = CleartextMessage::parse(b"not a cleartext message").unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }
}
