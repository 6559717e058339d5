use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vaultlink::{accept_any, decode, encode, generate_key, Envelope, Remedy, VaultlinkError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Payment {
    amount: u64,
    memo: String,
}

fn is_payment(value: &Value) -> bool {
    value["amount"].is_u64() && value["memo"].is_string()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_roundtrip(amount in any::<u64>(), memo in ".{0,64}") {
        let key = generate_key().unwrap();
        let payment = Payment { amount, memo };
        let envelope = encode(&payment, &key).unwrap();
        prop_assert_eq!(decode(&envelope, &key, is_payment).unwrap(), payment);
    }

    #[test]
    fn prop_nonces_never_repeat(memo in ".{0,32}") {
        let key = generate_key().unwrap();
        let a = encode(&memo, &key).unwrap();
        let b = encode(&memo, &key).unwrap();
        prop_assert_ne!(a.nonce, b.nonce);
        prop_assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn prop_wrong_key_is_decryption_failure(amount in any::<u64>()) {
        let k1 = generate_key().unwrap();
        let k2 = generate_key().unwrap();
        let envelope = encode(&Payment { amount, memo: String::new() }, &k1).unwrap();
        prop_assert!(matches!(
            decode(&envelope, &k2, is_payment),
            Err(VaultlinkError::DecryptionFailed)
        ));
    }
}

#[test]
fn test_flipped_ciphertext_byte_never_decrypts() {
    let key = generate_key().unwrap();
    let envelope = encode(&Payment { amount: 42, memo: "rent".into() }, &key).unwrap();

    for position in 0..envelope.ciphertext.len() {
        let mut tampered = envelope.clone();
        tampered.ciphertext[position] ^= 0x80;
        let result = decode(&tampered, &key, accept_any);
        assert!(
            matches!(result, Err(VaultlinkError::DecryptionFailed)),
            "byte {position} flipped but decode did not fail authentication"
        );
    }
}

#[test]
fn test_flipped_nonce_byte_never_decrypts() {
    let key = generate_key().unwrap();
    let mut envelope = encode(&"secret", &key).unwrap();
    envelope.nonce[0] ^= 0x01;
    let envelope: Envelope<String> = Envelope::new(envelope.ciphertext, envelope.nonce);
    assert!(matches!(
        decode(&envelope, &key, accept_any),
        Err(VaultlinkError::DecryptionFailed)
    ));
}

#[test]
fn test_validator_rejection_is_invalid_payload() {
    let key = generate_key().unwrap();
    let envelope = encode(&serde_json::json!({ "amount": "lots" }), &key).unwrap();
    let result: Result<Payment, _> = decode(
        &Envelope::new(envelope.ciphertext, envelope.nonce),
        &key,
        is_payment,
    );
    let err = result.unwrap_err();
    assert!(matches!(err, VaultlinkError::InvalidDecryptedPayload));
    assert_eq!(err.remedy(), Remedy::TreatAsCorrupted);
}

#[test]
fn test_envelope_survives_storage_as_json() {
    let key = generate_key().unwrap();
    let envelope = encode(&Payment { amount: 7, memo: "x".into() }, &key).unwrap();

    let stored = serde_json::to_string(&envelope).unwrap();
    let loaded: Envelope<Payment> = serde_json::from_str(&stored).unwrap();
    assert_eq!(decode(&loaded, &key, is_payment).unwrap().amount, 7);
}
