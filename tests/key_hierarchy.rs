use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vaultlink::{accept_any, KeyHierarchy, Remedy, VaultConfig, VaultlinkError, VisibilityGroup};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Amount {
    amount: u64,
}

fn is_amount(value: &Value) -> bool {
    value.get("amount").is_some_and(Value::is_u64)
}

fn fast_config() -> VaultConfig {
    VaultConfig {
        argon2_memory_kib: 1024,
        argon2_iterations: 1,
        argon2_parallelism: 1,
        pbkdf2_iterations: 1_000,
    }
}

fn pw(text: &str) -> SecretString {
    SecretString::from(text.to_string())
}

#[test]
fn test_open_with_creation_password_succeeds() {
    let mut vault = KeyHierarchy::new(fast_config()).unwrap();
    for password in ["a", "correct-horse", "пароль", "with spaces and 123"] {
        let group = vault.create_group("owner", "G", &pw(password), None).unwrap();
        vault.close_group(&group);
        assert!(vault.open_group(&group, &pw(password)).unwrap());
        assert!(vault.is_open(&group));
    }
}

#[test]
fn test_open_with_other_password_fails() {
    let mut vault = KeyHierarchy::new(fast_config()).unwrap();
    let group = vault.create_group("owner", "G", &pw("correct-horse"), None).unwrap();
    vault.close_group(&group);

    for wrong in ["", "correct-hors", "correct-horse ", "Correct-horse"] {
        assert!(!vault.open_group(&group, &pw(wrong)).unwrap());
        assert!(!vault.is_open(&group));
    }
}

#[test]
fn test_closed_group_cannot_encrypt() {
    let mut vault = KeyHierarchy::new(fast_config()).unwrap();
    let group = vault.create_group("owner", "G", &pw("pw"), None).unwrap();
    assert!(vault.close_group(&group));

    let err = vault.encrypt_for_group(&Amount { amount: 1 }, &group).unwrap_err();
    assert!(matches!(err, VaultlinkError::GroupNotOpen));
    assert_eq!(err.remedy(), Remedy::WaitForKey);
}

#[test]
fn test_group_record_round_trips_through_storage() {
    let mut vault = KeyHierarchy::new(fast_config()).unwrap();
    let group = vault
        .create_group("owner", "Travel", &pw("pw"), Some("trip planning"))
        .unwrap();
    let sealed = vault.encrypt_for_group(&Amount { amount: 9 }, &group).unwrap();

    let persisted = serde_json::to_string(&group).unwrap();
    drop(vault);

    // A new process only has the persisted record and the password.
    let loaded: VisibilityGroup = serde_json::from_str(&persisted).unwrap();
    let mut vault = KeyHierarchy::new(fast_config()).unwrap();
    assert!(matches!(
        vault.decrypt_for_group(&sealed, &loaded, is_amount),
        Err(VaultlinkError::GroupNotOpen)
    ));
    assert!(vault.open_group(&loaded, &pw("pw")).unwrap());
    assert_eq!(
        vault.decrypt_for_group(&sealed, &loaded, is_amount).unwrap(),
        Amount { amount: 9 }
    );
}

#[test]
fn test_other_group_key_cannot_decrypt() {
    let mut vault = KeyHierarchy::new(fast_config()).unwrap();
    let a = vault.create_group("owner", "A", &pw("same"), None).unwrap();
    let b = vault.create_group("owner", "B", &pw("same"), None).unwrap();

    let sealed = vault.encrypt_for_group(&Amount { amount: 1 }, &a).unwrap();
    assert!(matches!(
        vault.decrypt_for_group(&sealed, &b, accept_any),
        Err(VaultlinkError::DecryptionFailed)
    ));
}

#[test]
fn test_finance_scenario() {
    let mut vault = KeyHierarchy::new(fast_config()).unwrap();
    let finance = vault
        .create_group("owner", "Finance", &pw("correct-horse"), None)
        .unwrap();

    let sealed = vault.encrypt_for_group(&Amount { amount: 42 }, &finance).unwrap();
    vault.close_group(&finance);

    assert!(vault.open_group(&finance, &pw("correct-horse")).unwrap());
    assert_eq!(
        vault.decrypt_for_group(&sealed, &finance, is_amount).unwrap(),
        Amount { amount: 42 }
    );

    assert!(!vault.open_group(&finance, &pw("wrong-password")).unwrap());
    assert!(matches!(
        vault.decrypt_for_group(&sealed, &finance, is_amount),
        Err(VaultlinkError::GroupNotOpen)
    ));
}
