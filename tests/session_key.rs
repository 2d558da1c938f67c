use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use testresult::TestResult;

use pgp_stream::session_key::{AES_128, AES_192, AES_256, CAST5, THREE_DES, TRIPLE_DES};
use pgp_stream::{
    Error, Key, KeyRing, PlainMessage, SessionKey, SigningContext, Verification,
    VerificationContext,
};

#[test]
fn encrypt_decrypt_roundtrip() -> TestResult {
    let _ = pretty_env_logger::try_init();

    let sk = SessionKey::from_token(&[0u8; 32], AES_256);
    let message = PlainMessage::new_text("hello")
        .with_filename("greeting.txt")
        .with_mod_time(1_700_000_000);

    let encrypted = sk.encrypt(&message)?;
    let decrypted = sk.decrypt(&encrypted)?;

    assert_eq!(decrypted.data(), b"hello");
    assert_eq!(decrypted.metadata().filename, "greeting.txt");
    assert_eq!(decrypted.metadata().mod_time, 1_700_000_000);
    assert!(decrypted.metadata().is_utf8);
    Ok(())
}

#[test]
fn roundtrip_all_algorithms() -> TestResult {
    for algo in [THREE_DES, TRIPLE_DES, CAST5, AES_128, AES_192, AES_256] {
        let sk = SessionKey::generate_algo(algo)?;
        let message = PlainMessage::new(b"algorithm roundtrip".to_vec());
        let decrypted = sk.decrypt(&sk.encrypt(&message)?)?;
        assert_eq!(decrypted.data(), message.data(), "{algo}");
    }
    Ok(())
}

#[test]
fn tampered_ciphertext_is_a_hard_error() -> TestResult {
    let sk = SessionKey::from_token(&[0u8; 32], AES_256);
    let mut encrypted = sk.encrypt(&PlainMessage::new_text("hello"))?;

    // flip one byte of the encrypted body
    let mid = encrypted.len() / 2;
    encrypted[mid] ^= 0x01;

    let err = sk.decrypt(&encrypted).unwrap_err();
    assert!(
        matches!(err, Error::Mdc | Error::Structural { .. }),
        "unexpected error: {err:?}"
    );
    Ok(())
}

#[test]
fn truncated_ciphertext_is_distinguishable_from_mdc_mismatch() -> TestResult {
    let sk = SessionKey::generate()?;
    let encrypted = sk.encrypt(&PlainMessage::new_text("hello"))?;

    // cut into the MDC trailer: the stream ends early
    let truncated = &encrypted[..encrypted.len() - 8];
    let err = sk.decrypt(truncated).unwrap_err();
    assert!(
        matches!(err, Error::Structural { .. }),
        "unexpected error: {err:?}"
    );

    // flip a byte instead: the stream parses but fails its integrity check
    let mut tampered = encrypted.clone();
    let index = tampered.len() - 4;
    tampered[index] ^= 0xFF;
    let err = sk.decrypt(&tampered).unwrap_err();
    assert!(matches!(err, Error::Mdc), "unexpected error: {err:?}");
    Ok(())
}

#[test]
fn wrong_key_fails_decryption() -> TestResult {
    let sk = SessionKey::generate()?;
    let other = SessionKey::generate()?;
    let encrypted = sk.encrypt(&PlainMessage::new_text("secret"))?;
    assert!(other.decrypt(&encrypted).is_err());
    Ok(())
}

#[test]
fn encrypt_and_sign_verifies_on_decrypt() -> TestResult {
    let mut rng = ChaCha8Rng::seed_from_u64(101);
    let signer = Key::generate(&mut rng);
    let sign_ring = KeyRing::from_keys([signer.clone()]);
    let verify_ring = KeyRing::from_keys([signer.public_only()]);

    let sk = SessionKey::generate()?;
    let message = PlainMessage::new(b"signed and encrypted".to_vec());
    let encrypted = sk.encrypt_and_sign(&message, &sign_ring)?;

    let verified = sk.decrypt_and_verify(&encrypted, &verify_ring, 0)?;
    assert_eq!(verified.data, b"signed and encrypted");
    assert_eq!(verified.result.verification(), Verification::Valid);
    assert_eq!(verified.result.signed_by(), Some(signer.key_id()));
    Ok(())
}

#[test]
fn absent_signer_key_returns_plaintext_and_no_verifier() -> TestResult {
    let mut rng = ChaCha8Rng::seed_from_u64(102);
    let signer = Key::generate(&mut rng);
    let stranger = Key::generate(&mut rng);
    let sign_ring = KeyRing::from_keys([signer]);
    let verify_ring = KeyRing::from_keys([stranger.public_only()]);

    let sk = SessionKey::generate()?;
    let encrypted = sk.encrypt_and_sign(&PlainMessage::new_text("still readable"), &sign_ring)?;

    let verified = sk.decrypt_and_verify(&encrypted, &verify_ring, 0)?;
    assert_eq!(verified.data, b"still readable");
    assert_eq!(verified.result.verification(), Verification::NoVerifier);
    Ok(())
}

#[test]
fn unsigned_message_reports_not_signed() -> TestResult {
    let mut rng = ChaCha8Rng::seed_from_u64(103);
    let verify_ring = KeyRing::from_keys([Key::generate(&mut rng).public_only()]);

    let sk = SessionKey::generate()?;
    let encrypted = sk.encrypt(&PlainMessage::new_text("plain"))?;

    let verified = sk.decrypt_and_verify(&encrypted, &verify_ring, 0)?;
    assert_eq!(verified.data, b"plain");
    assert_eq!(verified.result.verification(), Verification::NotSigned);
    Ok(())
}

#[test]
fn signing_context_roundtrip() -> TestResult {
    let mut rng = ChaCha8Rng::seed_from_u64(104);
    let signer = Key::generate(&mut rng);
    let sign_ring = KeyRing::from_keys([signer.clone()]);
    let verify_ring = KeyRing::from_keys([signer.public_only()]);

    let sk = SessionKey::generate()?;
    let message = PlainMessage::new_text("contextual");
    let encrypted = sk.encrypt_and_sign_with_context(
        &message,
        &sign_ring,
        &SigningContext::new("billing"),
    )?;

    let verified = sk.decrypt_and_verify_with_context(
        &encrypted,
        &verify_ring,
        0,
        &VerificationContext::new("billing"),
    )?;
    assert_eq!(verified.result.verification(), Verification::Valid);

    // a different expected context downgrades the otherwise valid signature
    let mismatched = sk.decrypt_and_verify_with_context(
        &encrypted,
        &verify_ring,
        0,
        &VerificationContext::new("shipping"),
    )?;
    assert_eq!(mismatched.data, b"contextual");
    assert_eq!(
        mismatched.result.verification(),
        Verification::MissingContext
    );
    Ok(())
}

#[test]
fn context_is_required_when_configured() -> TestResult {
    let mut rng = ChaCha8Rng::seed_from_u64(105);
    let signer = Key::generate(&mut rng);
    let sign_ring = KeyRing::from_keys([signer.clone()]);
    let verify_ring = KeyRing::from_keys([signer.public_only()]);

    let sk = SessionKey::generate()?;
    // signed without any context
    let encrypted = sk.encrypt_and_sign(&PlainMessage::new_text("no context"), &sign_ring)?;

    let verified = sk.decrypt_and_verify_with_context(
        &encrypted,
        &verify_ring,
        0,
        &VerificationContext::new("billing"),
    )?;
    assert_eq!(
        verified.result.verification(),
        Verification::MissingContext
    );
    Ok(())
}

#[test]
fn compression_roundtrip() -> TestResult {
    let sk = SessionKey::generate()?;
    let body = "compressible ".repeat(512);
    let message = PlainMessage::new_text(body.clone());

    let compressed = sk.encrypt_with_compression(&message)?;
    let plain = sk.encrypt(&message)?;
    assert!(compressed.len() < plain.len());

    let decrypted = sk.decrypt(&compressed)?;
    assert_eq!(decrypted.data(), body.as_bytes());
    Ok(())
}

proptest! {
    #[test]
    fn roundtrip_property(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let sk = SessionKey::from_token(&[7u8; 32], AES_256);
        let message = PlainMessage::new(data.clone());
        let decrypted = sk.decrypt(&sk.encrypt(&message).unwrap()).unwrap();
        prop_assert_eq!(decrypted.data(), &data[..]);
    }
}
