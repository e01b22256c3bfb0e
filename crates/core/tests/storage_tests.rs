// ═══════════════════════════════════════════════════════════════════
// Storage Tests — encryption, snapshot format, StorageManager
// ═══════════════════════════════════════════════════════════════════

use chrono::NaiveDate;
use portfolio_tracker_core::errors::CoreError;
use portfolio_tracker_core::models::dataset::Dataset;
use portfolio_tracker_core::models::transaction::{Transaction, TransactionKind};
use portfolio_tracker_core::storage::encryption::{
    decrypt, derive_key, encrypt, random_bytes, KdfParams,
};
use portfolio_tracker_core::storage::format::{SnapshotHeader, CURRENT_VERSION, HEADER_SIZE, MAGIC};
use portfolio_tracker_core::storage::manager::StorageManager;

fn sample_dataset() -> Dataset {
    let mut dataset = Dataset::new();
    dataset.currencies.set_rate("EUR", 1.08).unwrap();
    let id = dataset.allocate_portfolio_id();
    dataset.portfolios.push(portfolio_tracker_core::models::portfolio::Portfolio {
        id,
        name: "Broker".into(),
        currency: "USD".into(),
        institution_id: None,
        selected: true,
    });
    dataset.insert_transaction(Transaction::cash(
        id,
        TransactionKind::Deposit,
        1000.0,
        "USD",
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap(),
    ));
    dataset
}

// ═══════════════════════════════════════════════════════════════════
// KDF & cipher primitives
// ═══════════════════════════════════════════════════════════════════

mod primitives {
    use super::*;

    fn fast_params() -> KdfParams {
        KdfParams {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn derive_key_is_deterministic_per_salt() {
        let salt = [7u8; 16];
        let a = derive_key("password", &salt, &fast_params()).unwrap();
        let b = derive_key("password", &salt, &fast_params()).unwrap();
        assert_eq!(a, b);
        let other_salt = [8u8; 16];
        let c = derive_key("password", &other_salt, &fast_params()).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn different_passwords_give_different_keys() {
        let salt = [7u8; 16];
        let a = derive_key("password", &salt, &fast_params()).unwrap();
        let b = derive_key("Password", &salt, &fast_params()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = [42u8; 32];
        let nonce = [1u8; 12];
        let ciphertext = encrypt(b"ledger bytes", &key, &nonce).unwrap();
        assert_ne!(&ciphertext[..], b"ledger bytes");
        let plaintext = decrypt(&ciphertext, &key, &nonce).unwrap();
        assert_eq!(plaintext, b"ledger bytes");
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let key = [42u8; 32];
        let nonce = [1u8; 12];
        let mut ciphertext = encrypt(b"ledger bytes", &key, &nonce).unwrap();
        ciphertext[0] ^= 0xFF;
        assert!(matches!(
            decrypt(&ciphertext, &key, &nonce).unwrap_err(),
            CoreError::Decryption
        ));
    }

    #[test]
    fn random_bytes_differ_between_calls() {
        let a: [u8; 16] = random_bytes().unwrap();
        let b: [u8; 16] = random_bytes().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn kdf_bounds_are_enforced() {
        assert!(KdfParams::default().validate().is_ok());
        let too_much_memory = KdfParams {
            memory_cost: 2_000_000,
            ..KdfParams::default()
        };
        assert!(too_much_memory.validate().is_err());
        let zero_iterations = KdfParams {
            time_cost: 0,
            ..KdfParams::default()
        };
        assert!(zero_iterations.validate().is_err());
        let too_parallel = KdfParams {
            parallelism: 64,
            ..KdfParams::default()
        };
        assert!(too_parallel.validate().is_err());
    }
}

// ═══════════════════════════════════════════════════════════════════
// Snapshot format
// ═══════════════════════════════════════════════════════════════════

mod snapshot_format {
    use super::*;

    fn sample_header() -> SnapshotHeader {
        SnapshotHeader {
            version: CURRENT_VERSION,
            kdf_params: KdfParams::default(),
            salt: [3u8; 16],
            nonce: [4u8; 12],
            ciphertext_len: 5,
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let bytes = sample_header().encode(b"12345");
        assert_eq!(&bytes[..4], MAGIC);
        assert_eq!(bytes.len(), HEADER_SIZE + 5);

        let (header, ciphertext) = SnapshotHeader::decode(&bytes).unwrap();
        assert_eq!(header.version, CURRENT_VERSION);
        assert_eq!(header.kdf_params, KdfParams::default());
        assert_eq!(header.salt, [3u8; 16]);
        assert_eq!(header.nonce, [4u8; 12]);
        assert_eq!(ciphertext, b"12345");
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut bytes = sample_header().encode(b"12345");
        bytes[0] = b'X';
        assert!(matches!(
            SnapshotHeader::decode(&bytes).unwrap_err(),
            CoreError::InvalidFileFormat(_)
        ));
    }

    #[test]
    fn future_version_is_rejected() {
        let mut header = sample_header();
        header.version = CURRENT_VERSION + 1;
        let bytes = header.encode(b"12345");
        assert!(matches!(
            SnapshotHeader::decode(&bytes).unwrap_err(),
            CoreError::UnsupportedVersion(_)
        ));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let bytes = sample_header().encode(b"12345");
        assert!(SnapshotHeader::decode(&bytes[..10]).is_err());
        assert!(SnapshotHeader::decode(&bytes[..bytes.len() - 2]).is_err());
        assert!(SnapshotHeader::decode(&[]).is_err());
    }

    #[test]
    fn hostile_kdf_params_are_rejected_before_derivation() {
        let mut header = sample_header();
        header.kdf_params.memory_cost = u32::MAX;
        let bytes = header.encode(b"12345");
        assert!(matches!(
            SnapshotHeader::decode(&bytes).unwrap_err(),
            CoreError::InvalidFileFormat(_)
        ));
    }
}

// ═══════════════════════════════════════════════════════════════════
// StorageManager
// ═══════════════════════════════════════════════════════════════════

mod manager {
    use super::*;

    #[test]
    fn byte_round_trip_preserves_the_dataset() {
        let dataset = sample_dataset();
        let bytes = StorageManager::save_to_bytes(&dataset, "hunter2").unwrap();
        let loaded = StorageManager::load_from_bytes(&bytes, "hunter2").unwrap();

        assert_eq!(loaded.portfolios.len(), 1);
        assert_eq!(loaded.portfolios[0].name, "Broker");
        assert_eq!(loaded.transactions.len(), 1);
        assert_eq!(loaded.transactions[0].quantity, 1000.0);
        assert!(loaded.currencies.contains("EUR"));
        // Id sequences survive so future allocations don't collide.
        let mut loaded = loaded;
        assert_eq!(loaded.allocate_portfolio_id(), 1);
    }

    #[test]
    fn wrong_password_fails_cleanly() {
        let bytes = StorageManager::save_to_bytes(&sample_dataset(), "correct").unwrap();
        assert!(matches!(
            StorageManager::load_from_bytes(&bytes, "wrong").unwrap_err(),
            CoreError::Decryption
        ));
    }

    #[test]
    fn every_save_uses_a_fresh_salt_and_nonce() {
        let dataset = sample_dataset();
        let a = StorageManager::save_to_bytes(&dataset, "pw").unwrap();
        let b = StorageManager::save_to_bytes(&dataset, "pw").unwrap();
        assert_ne!(a, b);
        // Both still decrypt to the same content.
        assert!(StorageManager::load_from_bytes(&a, "pw").is_ok());
        assert!(StorageManager::load_from_bytes(&b, "pw").is_ok());
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.pftk");
        let path = path.to_str().unwrap();

        StorageManager::save_to_file(&sample_dataset(), path, "pw").unwrap();
        let loaded = StorageManager::load_from_file(path, "pw").unwrap();
        assert_eq!(loaded.portfolios[0].name, "Broker");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = StorageManager::load_from_file("/nonexistent/snapshot.pftk", "pw").unwrap_err();
        assert!(matches!(err, CoreError::FileIO(_)));
    }
}
