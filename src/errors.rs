use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error types.
///
/// Signature problems (no verifier, failed check, expired, missing context)
/// are never represented here. They are returned as part of a
/// [`VerifyResult`](crate::verify::VerifyResult); only non-signature
/// failures surface as `Error`.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// No verification key ring was configured on the session.
    #[snafu(display("no verification key ring provided"))]
    MissingKeyRing,
    #[snafu(display("invalid armor wrappers"))]
    InvalidArmorWrappers,
    #[snafu(display("invalid crc24 checksum"))]
    InvalidChecksum,
    #[snafu(transparent)]
    Base64Decode { source: base64::DecodeError },
    /// Malformed armor, cleartext container or message structure.
    #[snafu(display("malformed input: {message}"))]
    Format { message: String },
    /// Algorithms and packet versions we do not support.
    #[snafu(display("unsupported: {message}"))]
    Unsupported { message: String },
    /// Session key length does not match its declared algorithm.
    #[snafu(display("invalid session key length"))]
    InvalidKeyLength,
    #[snafu(display("cfb: invalid key iv length"))]
    CfbInvalidKeyIvLength,
    /// The decryption integrity check (modification detection code) failed.
    #[snafu(display("modification detection code mismatch"))]
    Mdc,
    /// The decrypted packet stream is malformed. Distinct from ordinary I/O
    /// failures and from end-of-stream.
    #[snafu(display("malformed packet stream"))]
    Structural { source: std::io::Error },
    #[snafu(transparent)]
    Io { source: std::io::Error },
    #[snafu(transparent)]
    SignatureBytes { source: ed25519_dalek::SignatureError },
    #[snafu(display("{message}"))]
    Message { message: String },
}

impl From<cipher::InvalidLength> for Error {
    fn from(_: cipher::InvalidLength) -> Error {
        Error::CfbInvalidKeyIvLength
    }
}

impl From<String> for Error {
    fn from(message: String) -> Error {
        Error::Message { message }
    }
}

/// Maps read failures from a plain (non-decrypting) message stream onto the
/// error taxonomy: parse-shaped kinds become format errors, everything else
/// stays an I/O failure.
pub(crate) fn map_stream_error(err: std::io::Error) -> Error {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::InvalidData | ErrorKind::InvalidInput | ErrorKind::UnexpectedEof => {
            Error::Format {
                message: err.to_string(),
            }
        }
        _ => Error::Io { source: err },
    }
}

#[macro_export]
macro_rules! bail {
    ($e:expr) => {
        return Err($crate::errors::Error::Message { message: $e.to_string() })
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::Message { message: format!($fmt, $($arg)+) })
    };
}

#[macro_export]
macro_rules! format_err {
    ($e:expr) => {
        $crate::errors::Error::Message { message: $e.to_string() }
    };
    ($fmt:expr, $($arg:tt)+) => {
        $crate::errors::Error::Message { message: format!($fmt, $($arg)+) }
    };
}

#[macro_export]
macro_rules! unsupported_err {
    ($e:expr) => {
        return Err($crate::errors::Error::Unsupported { message: $e.to_string() })
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::Unsupported { message: format!($fmt, $($arg)+) })
    };
}

#[macro_export(local_inner_macros)]
macro_rules! ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            bail!($e);
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)+) => {
        if !($cond) {
            bail!($fmt, $($arg)+);
        }
    };
}

#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr, $($arg:tt)+) => ({
        match (&($left), &($right)) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    bail!(r#"assertion failed: `(left == right)`
  left: `{:?}`,
 right: `{:?}`: {}"#, left_val, right_val,
                           format_args!($($arg)+))
                }
            }
        }
    });
}

pub use crate::{bail, ensure, ensure_eq, format_err, unsupported_err};
