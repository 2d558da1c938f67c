use std::io::{self, BufRead, Read};

use log::debug;

use crate::crypto::hash::RunningHash;
use crate::errors::{map_stream_error, Error, Result};
use crate::keyring::{KeyId, KeyRing};
use crate::message::{Metadata, SignedMessageReader};
use crate::normalize_lines::NormalizedReader;
use crate::packet::{Signature, SignatureType};
use crate::verify::result::{VerifiedSignature, Verification, VerifyResult};
use crate::verify::{VerificationContext, CONTEXT_NOTATION_NAME};

/// A signature candidate while the stream is being read: the announced
/// metadata, its running hash, and (eventually) the signature packet.
struct Candidate {
    issuer: KeyId,
    typ: SignatureType,
    hash: RunningHash,
    signature: Option<Signature>,
    unknown_critical: bool,
}

enum Source<'a> {
    Inline(SignedMessageReader<Box<dyn BufRead + 'a>>),
    Detached(Box<dyn Read + 'a>),
}

/// Exposes the plaintext of a message as a reader while carrying the
/// unresolved signature state.
///
/// Reading only advances plaintext production and the running hashes; the
/// trust decision is deferred to [`VerifyingReader::verify_signature`],
/// which is meaningful only once the stream has been read to its end.
pub struct VerifyingReader<'a> {
    source: Source<'a>,
    candidates: Vec<Candidate>,
    keyring: Option<&'a KeyRing>,
    /// Frozen at construction from the session clock; never re-sampled.
    verification_time: i64,
    disable_time_checks: bool,
    context: Option<VerificationContext>,
    eof: bool,
    result: Option<VerifyResult>,
}

impl<'a> VerifyingReader<'a> {
    /// Inline path: parses the message layout and defers the signatures to
    /// the end of the stream.
    pub(crate) fn new_inline(
        source: Box<dyn BufRead + 'a>,
        keyring: Option<&'a KeyRing>,
        context: Option<VerificationContext>,
        disable_time_checks: bool,
        verification_time: i64,
    ) -> Result<Self> {
        let reader = SignedMessageReader::new(source).map_err(map_stream_error)?;
        Self::from_message_reader(
            reader,
            keyring,
            context,
            disable_time_checks,
            verification_time,
        )
    }

    /// Shared inline constructor, also used by the session key decryption
    /// path which parses the message stream itself.
    pub(crate) fn from_message_reader(
        reader: SignedMessageReader<Box<dyn BufRead + 'a>>,
        keyring: Option<&'a KeyRing>,
        context: Option<VerificationContext>,
        disable_time_checks: bool,
        verification_time: i64,
    ) -> Result<Self> {
        let mut candidates = Vec::with_capacity(reader.one_pass().len());
        for ops in reader.one_pass() {
            candidates.push(Candidate {
                issuer: ops.issuer(),
                typ: ops.typ(),
                hash: RunningHash::new(ops.hash_alg(), ops.typ() == SignatureType::Text)?,
                signature: None,
                unknown_critical: false,
            });
        }
        debug!(
            "inline verify reader: {} candidate(s), time {}",
            candidates.len(),
            verification_time
        );
        Ok(Self {
            source: Source::Inline(reader),
            candidates,
            keyring,
            verification_time,
            disable_time_checks,
            context,
            eof: false,
            result: None,
        })
    }

    /// Detached path, shared by direct verification and by the session key
    /// decrypt-and-verify machinery.
    ///
    /// When the resolved signature type is text, the exposed reader passes
    /// through the line ending canonicalization filter, because text-type
    /// signatures are computed over canonicalized text, not raw bytes.
    pub(crate) fn new_detached(
        data: Box<dyn Read + 'a>,
        signatures: Vec<Signature>,
        keyring: Option<&'a KeyRing>,
        context: Option<VerificationContext>,
        disable_time_checks: bool,
        verification_time: i64,
    ) -> Result<Self> {
        if signatures.is_empty() {
            return Err(Error::Format {
                message: "no signature packets in detached signature".into(),
            });
        }
        let text = signatures[0].typ() == SignatureType::Text;
        let source: Box<dyn Read + 'a> = if text {
            Box::new(NormalizedReader::new(data))
        } else {
            data
        };

        let known = known_notations(context.as_ref());
        let mut candidates = Vec::with_capacity(signatures.len());
        for signature in signatures {
            candidates.push(Candidate {
                issuer: signature.issuer(),
                typ: signature.typ(),
                // the exposed stream is already canonical for text
                hash: RunningHash::new(signature.hash_alg(), false)?,
                unknown_critical: signature.has_unknown_critical_notation(&known),
                signature: Some(signature),
            });
        }
        debug!(
            "detached verify reader: {} candidate(s), text: {text}, time {}",
            candidates.len(),
            verification_time
        );
        Ok(Self {
            source: Source::Detached(source),
            candidates,
            keyring,
            verification_time,
            disable_time_checks,
            context,
            eof: false,
            result: None,
        })
    }

    /// Literal metadata, for inline messages.
    pub fn metadata(&self) -> Option<Metadata> {
        match &self.source {
            Source::Inline(reader) => Some(Metadata::from(reader.literal_header())),
            Source::Detached(_) => None,
        }
    }

    /// Resolves the signature candidates into a [`VerifyResult`].
    ///
    /// Must be called after the reader returned end of stream; before that
    /// it reports [`Verification::Incomplete`] without touching any state.
    /// Once resolved, the result is cached and repeat calls never re-run
    /// cryptographic work.
    pub fn verify_signature(&mut self) -> Result<VerifyResult> {
        if let Some(result) = &self.result {
            return Ok(result.clone());
        }
        if !self.eof {
            debug!("verify_signature before end of stream");
            return Ok(VerifyResult::incomplete());
        }

        let keyring = self.keyring;
        let context = self.context.clone();
        let disable_time_checks = self.disable_time_checks;
        let verification_time = self.verification_time;

        let mut resolved = Vec::with_capacity(self.candidates.len());
        for candidate in &mut self.candidates {
            resolved.push(resolve(
                candidate,
                keyring,
                context.as_ref(),
                disable_time_checks,
                verification_time,
            ));
        }
        let result = VerifyResult::resolved(resolved);
        self.result = Some(result.clone());
        Ok(result)
    }

    fn on_eof(&mut self) {
        self.eof = true;
        if let Source::Inline(reader) = &self.source {
            let Some(signatures) = reader.signatures() else {
                return;
            };
            let known = known_notations(self.context.as_ref());
            // pair trailing signatures with their candidates, by issuer
            // first, then in order
            let signatures: Vec<Signature> = signatures.to_vec();
            for signature in signatures {
                let slot = self
                    .candidates
                    .iter()
                    .position(|c| c.signature.is_none() && c.issuer == signature.issuer())
                    .or_else(|| self.candidates.iter().position(|c| c.signature.is_none()));
                if let Some(index) = slot {
                    let candidate = &mut self.candidates[index];
                    candidate.unknown_critical = signature.has_unknown_critical_notation(&known);
                    candidate.signature = Some(signature);
                }
            }
        }
    }
}

fn known_notations(context: Option<&VerificationContext>) -> Vec<&'static str> {
    // when a context is configured the engine treats its notation name as
    // known, so an unknown-but-critical notation of that name does not
    // reject the message outright; matching happens at finalization
    match context {
        Some(_) => vec![CONTEXT_NOTATION_NAME],
        None => Vec::new(),
    }
}

fn resolve(
    candidate: &mut Candidate,
    keyring: Option<&KeyRing>,
    context: Option<&VerificationContext>,
    disable_time_checks: bool,
    verification_time: i64,
) -> VerifiedSignature {
    let (created_at, verification) = match &candidate.signature {
        None => (0, Verification::Failed),
        Some(signature) => {
            let verification = 'v: {
                let Some(key) = keyring.and_then(|kr| kr.key_by_id(&candidate.issuer)) else {
                    break 'v Verification::NoVerifier;
                };
                if !disable_time_checks {
                    if signature.created_at() > verification_time {
                        break 'v Verification::NotYetValid;
                    }
                    let expiry = signature.expires_after();
                    if expiry != 0 && signature.created_at() + i64::from(expiry) < verification_time
                    {
                        break 'v Verification::Expired;
                    }
                }
                if let Some(context) = context {
                    let matched = signature.notations().iter().any(|n| {
                        n.critical && n.name == CONTEXT_NOTATION_NAME && n.value == context.value
                    });
                    if !matched {
                        break 'v Verification::MissingContext;
                    }
                }
                if candidate.unknown_critical {
                    break 'v Verification::Failed;
                }
                let trailer = signature.hashed_fields();
                let Some(digest) = candidate.hash.finish(&trailer) else {
                    break 'v Verification::Failed;
                };
                if signature.verify_digest(key, &digest) {
                    Verification::Valid
                } else {
                    Verification::Failed
                }
            };
            (signature.created_at(), verification)
        }
    };
    VerifiedSignature {
        issuer: candidate.issuer,
        typ: candidate.typ,
        created_at,
        verification,
    }
}

impl Read for VerifyingReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = match &mut self.source {
            Source::Inline(reader) => reader.read(buf)?,
            Source::Detached(reader) => reader.read(buf)?,
        };
        if read == 0 {
            if !buf.is_empty() && !self.eof {
                self.on_eof();
            }
            return Ok(0);
        }
        for candidate in &mut self.candidates {
            candidate.hash.update(&buf[..read]);
        }
        Ok(read)
    }
}
