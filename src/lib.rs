//! Streaming OpenPGP signature verification and session-key encryption.
//!
//! Two coupled capabilities make up this crate:
//!
//! - verifying digital signatures over a byte stream without buffering the
//!   plaintext, deferring the trust decision until the stream is fully
//!   consumed ([`Verifier`] / [`VerifyingReader`]);
//! - symmetric encryption and decryption directly against a raw
//!   [`SessionKey`], including embedded-signature verification and
//!   integrity finalization of the decrypted stream.
//!
//! Inline signed, detached signature and cleartext armored message shapes
//! all funnel into the same verification machinery, and signature-shaped
//! failures are always reported as a [`VerifyResult`] value, never as an
//! error.

#![forbid(unsafe_code)]

pub mod armor;
pub mod cleartext;
pub mod crypto;
pub mod errors;
pub mod keyring;
pub mod message;
pub mod normalize_lines;
pub mod packet;
pub mod session_key;
mod util;
pub mod verify;

pub use crate::cleartext::CleartextMessage;
pub use crate::crypto::sym::SymmetricKeyAlgorithm;
pub use crate::errors::{Error, Result};
pub use crate::keyring::{Key, KeyId, KeyRing};
pub use crate::message::{sign_inline, Encoding, Metadata, PlainMessage};
pub use crate::packet::{Notation, SignatureConfig, SignatureType};
pub use crate::session_key::{PlainSessionKey, SessionKey};
pub use crate::verify::{
    SigningContext, VerificationContext, VerifiedDataResult, VerifiedSignature, Verification,
    Verifier, VerifyCleartextResult, VerifyResult, VerifyingReader, CONTEXT_NOTATION_NAME,
};
