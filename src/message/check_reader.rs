use std::io::{self, BufRead, Read};

use log::debug;

use crate::crypto::sym::{MdcError, StreamDecryptor};
use crate::errors::Error;

/// Wraps the decrypted packet stream and finalizes the integrity check.
///
/// Reads are forwarded to the decryptor. On clean end of stream the
/// modification detection code is finalized exactly once; a failure there
/// surfaces in place of end-of-stream, so an early-stopping consumer is
/// never told the stream was authenticated. Any other mid-stream failure is
/// reclassified as a structural parsing problem, distinct from ordinary I/O
/// errors.
pub struct CheckReader<R: BufRead> {
    decrypted: StreamDecryptor<R>,
    finalized: bool,
}

impl<R: BufRead> CheckReader<R> {
    pub fn new(decrypted: StreamDecryptor<R>) -> Self {
        Self {
            decrypted,
            finalized: false,
        }
    }
}

impl<R: BufRead> BufRead for CheckReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        let at_end = self.decrypted.fill_buf().map_err(reclassify)?.is_empty();
        if at_end && !self.finalized {
            self.decrypted.finish().map_err(reclassify)?;
            self.finalized = true;
            debug!("decryption integrity check finalized");
        }
        self.decrypted.fill_buf().map_err(reclassify)
    }

    fn consume(&mut self, amt: usize) {
        self.decrypted.consume(amt);
    }
}

impl<R: BufRead> Read for CheckReader<R> {
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

fn is_mdc(err: &io::Error) -> bool {
    err.get_ref().is_some_and(|inner| inner.is::<MdcError>())
}

/// Keeps the integrity failure identifiable while every other error out of
/// the decrypted stream turns structural.
fn reclassify(err: io::Error) -> io::Error {
    if is_mdc(&err) {
        err
    } else {
        io::Error::new(io::ErrorKind::InvalidData, StructuralParse(err))
    }
}

#[derive(Debug)]
struct StructuralParse(io::Error);

impl std::fmt::Display for StructuralParse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "structural parsing error: {}", self.0)
    }
}

impl std::error::Error for StructuralParse {}

/// Maps a read failure from a decrypting stream onto the error taxonomy:
/// an integrity failure becomes [`Error::Mdc`], everything else a
/// structural parsing error.
pub(crate) fn classify_stream_error(err: io::Error) -> Error {
    if is_mdc(&err) {
        Error::Mdc
    } else {
        Error::Structural { source: err }
    }
}
