mod header;
mod literal_data;
mod one_pass_signature;
mod signature;

pub use self::header::{PacketBodyReader, PacketHeader, Tag};
pub use self::literal_data::{DataMode, LiteralDataHeader};
pub use self::one_pass_signature::OnePassSignature;
pub use self::signature::{
    Notation, Signature, SignatureConfig, SignatureType, PUBKEY_ALGO_EDDSA,
};

use num_enum::{FromPrimitive, IntoPrimitive};

/// Available compression algorithms.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-compression-algorithms>
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum CompressionAlgorithm {
    Uncompressed = 0,
    /// DEFLATE
    Zip = 1,
    Zlib = 2,

    #[num_enum(catch_all)]
    Other(u8),
}
