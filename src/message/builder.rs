use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::Compression;
use log::debug;

use crate::errors::Result;
use crate::keyring::Key;
use crate::message::PlainMessage;
use crate::packet::{
    CompressionAlgorithm, OnePassSignature, PacketHeader, SignatureConfig, Tag,
};

/// Writes a literal data packet for the message.
pub(crate) fn write_literal(out: &mut Vec<u8>, message: &PlainMessage) -> Result<()> {
    let header = message.literal_header();
    let len = header.byte_len() + message.data().len();
    PacketHeader::new(Tag::LiteralData, len).write_to(out)?;
    header.write_to(out)?;
    out.write_all(message.data())?;
    Ok(())
}

/// Writes a one-pass signed message: one-pass header, literal data, then the
/// signature computed over the message body.
pub(crate) fn write_signed(
    out: &mut Vec<u8>,
    message: &PlainMessage,
    signer: &Key,
    config: SignatureConfig,
) -> Result<()> {
    let ops = OnePassSignature::new(config.typ, config.hash_alg, signer.key_id(), true);
    PacketHeader::new(Tag::OnePassSignature, ops.byte_len()).write_to(out)?;
    ops.write_to(out)?;

    write_literal(out, message)?;

    let mut hash = config.running_hash()?;
    hash.update(message.data());
    let signature = config.sign(signer, hash)?;
    out.extend_from_slice(&signature.to_bytes()?);
    Ok(())
}

/// Wraps already serialized packets into a compressed data packet.
pub(crate) fn compress_packets(packets: &[u8]) -> Result<Vec<u8>> {
    debug!("compressing {} packet byte(s)", packets.len());
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(packets)?;
    let compressed = encoder.finish()?;

    let mut out = Vec::with_capacity(compressed.len() + 8);
    PacketHeader::new(Tag::CompressedData, compressed.len() + 1).write_to(&mut out)?;
    out.push(u8::from(CompressionAlgorithm::Zip));
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Builds an inline signed message (unencrypted one-pass layout). The
/// canonicalization for text-type signatures happens inside the running
/// hash; the literal body keeps the original bytes.
pub fn sign_inline(
    message: &PlainMessage,
    signer: &Key,
    config: SignatureConfig,
) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(message.data().len() + 128);
    write_signed(&mut out, message, signer, config)?;
    Ok(out)
}
