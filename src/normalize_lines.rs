//! Line ending canonicalization.
//!
//! Text-type signatures are computed over text with its line endings
//! converted to `<CR><LF>`, so both hashing and the plaintext exposed for a
//! text-type detached verification pass through this filter.

use std::io::{self, Read};

use bytes::{Buf, BytesMut};

use crate::util::fill_buffer;

const BUFFER_SIZE: usize = 1024 * 4;

/// Converts a chunk to `\r\n` line endings, carrying the "last byte was CR"
/// state across chunk boundaries so `\r\n` pairs split between reads are not
/// doubled.
pub(crate) fn canonicalize_into(chunk: &[u8], skip_lf: &mut bool, out: &mut Vec<u8>) {
    for &b in chunk {
        match b {
            b'\r' => {
                out.extend_from_slice(b"\r\n");
                *skip_lf = true;
            }
            b'\n' => {
                if *skip_lf {
                    *skip_lf = false;
                } else {
                    out.extend_from_slice(b"\r\n");
                }
            }
            _ => {
                *skip_lf = false;
                out.push(b);
            }
        }
    }
}

/// Wraps a reader and normalizes all line endings (`\n`, `\r`, `\r\n`) in
/// the produced byte stream to `\r\n`.
pub struct NormalizedReader<R> {
    source: R,
    out: BytesMut,
    skip_lf: bool,
    done: bool,
}

impl<R: Read> NormalizedReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            out: BytesMut::new(),
            skip_lf: false,
            done: false,
        }
    }

    /// Reads the next raw chunk and queues its normalized form.
    fn fill(&mut self) -> io::Result<()> {
        let mut raw = [0u8; BUFFER_SIZE];
        let read = fill_buffer(&mut self.source, &mut raw, None)?;
        if read == 0 {
            self.done = true;
            return Ok(());
        }
        let mut normalized = Vec::with_capacity(read * 2);
        canonicalize_into(&raw[..read], &mut self.skip_lf, &mut normalized);
        self.out.extend_from_slice(&normalized);
        Ok(())
    }
}

impl<R: Read> Read for NormalizedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.out.is_empty() && !self.done {
            self.fill()?;
        }
        let to_write = self.out.remaining().min(buf.len());
        self.out.copy_to_slice(&mut buf[..to_write]);
        Ok(to_write)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn normalize(input: &str) -> String {
        let mut reader = NormalizedReader::new(input.as_bytes());
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn normalized_crlf() {
        let input = "This is a string \n with \r some \n\r\n random newlines\r\r\n\n";
        assert_eq!(
            normalize(input),
            "This is a string \r\n with \r\n some \r\n\r\n random newlines\r\n\r\n\r\n"
        );
    }

    #[test]
    fn already_canonical() {
        assert_eq!(normalize("a\r\nb\r\n"), "a\r\nb\r\n");
    }

    #[test]
    fn split_crlf_across_chunks() {
        // One byte at a time forces the \r and \n of a pair into
        // separate chunks.
        let mut skip_lf = false;
        let mut out = Vec::new();
        for b in b"a\r\nb" {
            canonicalize_into(&[*b], &mut skip_lf, &mut out);
        }
        assert_eq!(out, b"a\r\nb");
    }
}
