use std::io::{self, Read};

/// Fills `buf` from `source`, reading until the buffer (or `max` bytes of
/// it) is full or the source is exhausted. Returns the number of bytes read.
pub(crate) fn fill_buffer<R: Read>(
    source: &mut R,
    buf: &mut [u8],
    max: Option<usize>,
) -> io::Result<usize> {
    let limit = max.unwrap_or(buf.len()).min(buf.len());
    let mut offset = 0;
    while offset < limit {
        match source.read(&mut buf[offset..limit]) {
            Ok(0) => break,
            Ok(read) => offset += read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(offset)
}

/// Grows `buffer` towards `size` bytes with data from `source`, keeping its
/// current content in place. Returns the number of new bytes read.
pub(crate) fn fill_buffer_bytes<R: Read>(
    source: &mut R,
    buffer: &mut bytes::BytesMut,
    size: usize,
) -> io::Result<usize> {
    let current = buffer.len();
    if current >= size {
        return Ok(0);
    }
    buffer.resize(size, 0);
    let read = fill_buffer(source, &mut buffer[current..], None)?;
    buffer.truncate(current + read);
    Ok(read)
}
