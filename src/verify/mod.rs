//! Verification sessions and streaming verification readers.

mod reader;
mod result;

pub use self::reader::VerifyingReader;
pub use self::result::{
    VerifiedDataResult, VerifiedSignature, Verification, VerifyCleartextResult, VerifyResult,
};

use std::io::{self, BufRead, BufReader, Cursor, Read};
use std::sync::Arc;

use chrono::Utc;
use log::debug;

use crate::armor;
use crate::cleartext::CleartextMessage;
use crate::errors::{map_stream_error, Error, Result};
use crate::keyring::KeyRing;
use crate::message::Encoding;
use crate::packet::{Notation, Signature};

/// Name of the critical notation that binds a signature to a verification
/// context.
pub const CONTEXT_NOTATION_NAME: &str = "context@pgp-stream";

/// Clock injected into verification sessions, returning unix seconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// A required verification context.
///
/// When configured on a session, a signature only verifies if it carries a
/// critical context notation with this value; an otherwise valid signature
/// without it is downgraded to [`Verification::MissingContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationContext {
    pub value: String,
}

impl VerificationContext {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// The signing-side counterpart of [`VerificationContext`]: embedded as a
/// notation on produced signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningContext {
    pub value: String,
    pub critical: bool,
}

impl SigningContext {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            critical: true,
        }
    }

    pub(crate) fn notation(&self) -> Notation {
        Notation {
            critical: self.critical,
            name: CONTEXT_NOTATION_NAME.into(),
            value: self.value.clone(),
        }
    }
}

/// A verification session.
///
/// Holds the shared key ring, the optional verification context, the
/// time-check toggle and the clock. Immutable after construction; one
/// session can hand out many [`VerifyingReader`]s. The verification
/// timestamp of each reader is sampled from the clock exactly once, when
/// the reader is constructed.
#[derive(Clone)]
pub struct Verifier {
    keyring: Option<Arc<KeyRing>>,
    context: Option<VerificationContext>,
    disable_time_checks: bool,
    clock: Clock,
}

impl Default for Verifier {
    fn default() -> Self {
        Self {
            keyring: None,
            context: None,
            disable_time_checks: false,
            clock: Arc::new(|| Utc::now().timestamp()),
        }
    }
}

impl Verifier {
    pub fn new(keyring: impl Into<Arc<KeyRing>>) -> Self {
        Self {
            keyring: Some(keyring.into()),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: VerificationContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn disable_time_checks(mut self) -> Self {
        self.disable_time_checks = true;
        self
    }

    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Fails with the configuration error when no key ring is set.
    pub fn validate(&self) -> Result<()> {
        if self.keyring.is_none() {
            return Err(Error::MissingKeyRing);
        }
        Ok(())
    }

    fn keyring(&self) -> Result<&KeyRing> {
        self.keyring.as_deref().ok_or(Error::MissingKeyRing)
    }

    /// Wraps an inline signed message with a verification reader.
    ///
    /// Once all data has been read, the signature can be verified with
    /// [`VerifyingReader::verify_signature`].
    pub fn verifying_reader<'a>(
        &'a self,
        message: impl Read + 'a,
        encoding: Encoding,
    ) -> Result<VerifyingReader<'a>> {
        self.validate()?;
        let source = unarmor(Box::new(BufReader::new(message)), encoding)?;
        VerifyingReader::new_inline(
            source,
            Some(self.keyring()?),
            self.context.clone(),
            self.disable_time_checks,
            (self.clock)(),
        )
    }

    /// Wraps a data stream with a verification reader for a detached
    /// signature message.
    pub fn verifying_detached_reader<'a>(
        &'a self,
        data: impl Read + 'a,
        signature: impl Read + 'a,
        encoding: Encoding,
    ) -> Result<VerifyingReader<'a>> {
        self.validate()?;
        let mut sig_source = unarmor(Box::new(BufReader::new(signature)), encoding)?;
        let signatures = Signature::from_bytes_many(&mut sig_source)?;
        VerifyingReader::new_detached(
            Box::new(BufReader::new(data)),
            signatures,
            Some(self.keyring()?),
            self.context.clone(),
            self.disable_time_checks,
            (self.clock)(),
        )
    }

    /// Verifies a detached signature over `data`, driving the reader to
    /// exhaustion. An error is only returned when it is not a signature
    /// problem.
    pub fn verify_detached(
        &self,
        data: &[u8],
        signature: &[u8],
        encoding: Encoding,
    ) -> Result<VerifyResult> {
        let mut reader = self.verifying_detached_reader(data, signature, encoding)?;
        io::copy(&mut reader, &mut io::sink()).map_err(map_stream_error)?;
        reader.verify_signature()
    }

    /// Verifies an inline signed message and returns the plaintext next to
    /// the signature outcome.
    pub fn verify_inline(&self, message: &[u8], encoding: Encoding) -> Result<VerifiedDataResult> {
        let mut reader = self.verifying_reader(message, encoding)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).map_err(map_stream_error)?;
        let metadata = reader.metadata().unwrap_or_default();
        let result = reader.verify_signature()?;
        Ok(VerifiedDataResult {
            result,
            data,
            metadata,
        })
    }

    /// Verifies a cleartext armored message: parses the dual-section
    /// container and reduces it to a detached verification over the
    /// recovered text.
    pub fn verify_cleartext(&self, message: &[u8]) -> Result<VerifyCleartextResult> {
        self.validate()?;
        let cleartext = CleartextMessage::parse(message)?;
        debug!("cleartext message with {} byte(s)", cleartext.text().len());
        let result = self.verify_detached(
            cleartext.text().as_bytes(),
            cleartext.signature_data(),
            Encoding::Binary,
        )?;
        Ok(VerifyCleartextResult {
            result,
            cleartext: cleartext.into_text(),
        })
    }
}

/// Strips the armor layer from a message source when the encoding asks for
/// it (or auto-detection finds it).
fn unarmor<'a>(
    mut source: Box<dyn BufRead + 'a>,
    encoding: Encoding,
) -> Result<Box<dyn BufRead + 'a>> {
    let armored = match encoding {
        Encoding::Armor => true,
        Encoding::Binary => false,
        Encoding::Auto => armor::starts_armored(&mut source)?,
    };
    if !armored {
        return Ok(source);
    }
    let mut bytes = Vec::new();
    source.read_to_end(&mut bytes)?;
    let (_, data) = armor::decode(&bytes)?;
    Ok(Box::new(Cursor::new(data)))
}
