use crate::keyring::KeyId;
use crate::message::Metadata;
use crate::packet::SignatureType;

/// Outcome of a verification attempt.
///
/// These are values, never errors: a signature-shaped problem is always
/// reported through a [`VerifyResult`], while I/O and format failures
/// surface as [`Error`](crate::errors::Error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Verification {
    /// The signature verified against the key ring.
    Valid,
    /// The message carries no signature.
    NotSigned,
    /// No key in the ring matches the signature issuer.
    NoVerifier,
    /// The cryptographic check failed.
    Failed,
    /// The signature was created after the verification time.
    NotYetValid,
    /// The signature expired before the verification time.
    Expired,
    /// The required verification context notation is absent or carries a
    /// different value.
    MissingContext,
    /// The body reader has not reached end of stream; no trust decision has
    /// been made yet.
    Incomplete,
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid)
    }
}

/// A resolved signature candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSignature {
    pub issuer: KeyId,
    pub typ: SignatureType,
    pub created_at: i64,
    pub verification: Verification,
}

/// The outcome of one verification attempt: the primary verdict plus every
/// resolved candidate for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyResult {
    signatures: Vec<VerifiedSignature>,
    exhausted: bool,
}

impl VerifyResult {
    pub(crate) fn incomplete() -> Self {
        Self {
            signatures: Vec::new(),
            exhausted: false,
        }
    }

    pub(crate) fn resolved(signatures: Vec<VerifiedSignature>) -> Self {
        Self {
            signatures,
            exhausted: true,
        }
    }

    /// The primary outcome: `Valid` as soon as one candidate verified,
    /// otherwise the first candidate's outcome.
    pub fn verification(&self) -> Verification {
        if !self.exhausted {
            return Verification::Incomplete;
        }
        if self.signatures.is_empty() {
            return Verification::NotSigned;
        }
        if self.signatures.iter().any(|s| s.verification.is_valid()) {
            return Verification::Valid;
        }
        self.signatures[0].verification
    }

    pub fn is_valid(&self) -> bool {
        self.verification().is_valid()
    }

    /// The issuer of the first candidate that verified.
    pub fn signed_by(&self) -> Option<KeyId> {
        self.signatures
            .iter()
            .find(|s| s.verification.is_valid())
            .map(|s| s.issuer)
    }

    /// All resolved candidates, in message order.
    pub fn signatures(&self) -> &[VerifiedSignature] {
        &self.signatures
    }
}

/// A [`VerifyResult`] together with the message plaintext and metadata.
///
/// The plaintext is populated even when the signature outcome is a failure,
/// so callers can distinguish "could not read" from "read but untrusted".
#[derive(Debug, Clone)]
pub struct VerifiedDataResult {
    pub result: VerifyResult,
    pub data: Vec<u8>,
    pub metadata: Metadata,
}

/// A [`VerifyResult`] together with the recovered cleartext.
#[derive(Debug, Clone)]
pub struct VerifyCleartextResult {
    pub result: VerifyResult,
    pub cleartext: String,
}
