use super::*;
use crate::testing::fixtures;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};

fn test_key() -> ReceiverKey {
    ReceiverKey::from_pem(fixtures::TEST_KEY_PEM).unwrap()
}

fn hex(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

#[test]
fn test_material_rejects_bad_lengths() {
    let err = CryptoMaterial::new(&[0u8; 15], &[0u8; 16]).unwrap_err();
    assert!(matches!(
        err,
        CryptoError::InvalidKeyLength {
            expected: 16,
            actual: 15
        }
    ));

    let err = CryptoMaterial::new(&[0u8; 16], &[0u8; 8]).unwrap_err();
    assert!(matches!(
        err,
        CryptoError::InvalidIvLength {
            expected: 16,
            actual: 8
        }
    ));
}

#[test]
fn test_material_debug_hides_key() {
    let material = CryptoMaterial::new(&[0x42u8; 16], &[0u8; 16]).unwrap();
    let debug = format!("{material:?}");
    assert!(debug.contains("redacted"));
    assert!(!debug.contains("66"));
}

#[test]
fn test_cbc_decrypt_vector() {
    let key: Vec<u8> = (0u8..16).collect();
    let iv: Vec<u8> = (16u8..32).collect();
    let material = CryptoMaterial::new(&key, &iv).unwrap();
    let cipher = PayloadCipher::new(&material);

    let plaintext: Vec<u8> = (100u8..140).collect();
    let decrypted = cipher.decrypt(&hex(fixtures::CIPHERTEXT_HEX));

    assert_eq!(decrypted, plaintext);
}

#[test]
fn test_cbc_each_payload_restarts_at_iv() {
    let key: Vec<u8> = (0u8..16).collect();
    let iv: Vec<u8> = (16u8..32).collect();
    let cipher = PayloadCipher::new(&CryptoMaterial::new(&key, &iv).unwrap());
    let ciphertext = hex(fixtures::CIPHERTEXT_HEX);

    let first = cipher.decrypt(&ciphertext);
    let second = cipher.decrypt(&ciphertext);
    assert_eq!(first, second);
}

#[test]
fn test_cbc_short_payload_passes_through() {
    let cipher = PayloadCipher::new(&CryptoMaterial::new(&[1u8; 16], &[2u8; 16]).unwrap());
    let payload = [9u8; 15];
    assert_eq!(cipher.decrypt(&payload), payload.to_vec());
    assert!(cipher.decrypt(&[]).is_empty());
}

#[test]
fn test_unwrap_fixture_key() {
    let key = test_key();
    let wrapped = STANDARD_NO_PAD.decode(fixtures::RSA_AES_KEY).unwrap();

    let aes_key = key.unwrap_key(&wrapped).unwrap();
    assert_eq!(aes_key, (0u8..16).collect::<Vec<_>>());
}

#[test]
fn test_unwrap_garbage_fails() {
    let key = test_key();
    let result = key.unwrap_key(&[0x55u8; rsa_sizes::MODULUS_BYTES]);
    assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
}

#[test]
fn test_sign_challenge_matches_vector() {
    let key = test_key();

    let mut message = (0u8..16).collect::<Vec<_>>();
    message.extend_from_slice(&[127, 0, 0, 1]);
    message.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    message.resize(38, 0);

    let signature = key.sign_challenge(&message).unwrap();
    assert_eq!(signature.len(), rsa_sizes::MODULUS_BYTES);
    assert_eq!(STANDARD.encode(signature), fixtures::APPLE_RESPONSE);
}

#[test]
fn test_from_pem_rejects_garbage() {
    let result = ReceiverKey::from_pem("-----BEGIN NOTHING-----\n-----END NOTHING-----\n");
    assert!(matches!(result, Err(CryptoError::InvalidPrivateKey(_))));
}

#[test]
fn test_key_debug_is_redacted() {
    let key = test_key();
    assert_eq!(key.size(), rsa_sizes::MODULUS_BYTES);
    let debug = format!("{key:?}");
    assert!(debug.contains("2048"));
    assert!(!debug.contains("BEGIN"));
}
