use crate::errors::CoreError;
use crate::models::dataset::Dataset;

use super::encryption::{self, KdfParams};
use super::format::{SnapshotHeader, CURRENT_VERSION};

/// High-level storage operations: save/load the dataset to/from encrypted
/// bytes or files.
///
/// The byte form is the portable unit — the same snapshot opens on any
/// platform, including wasm where there is no filesystem.
pub struct StorageManager;

impl StorageManager {
    /// Encrypt and serialize the dataset to raw bytes.
    ///
    /// Flow: Dataset → bincode → AES-256-GCM(Argon2id(password)) → PFTK bytes.
    /// Salt and nonce are freshly generated on every save.
    pub fn save_to_bytes(dataset: &Dataset, password: &str) -> Result<Vec<u8>, CoreError> {
        let plaintext = bincode::serialize(dataset)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize dataset: {e}")))?;

        let salt = encryption::random_bytes()?;
        let nonce = encryption::random_bytes()?;
        let kdf_params = KdfParams::default();
        let key = encryption::derive_key(password, &salt, &kdf_params)?;
        let ciphertext = encryption::encrypt(&plaintext, &key, &nonce)?;

        let header = SnapshotHeader {
            version: CURRENT_VERSION,
            kdf_params,
            salt,
            nonce,
            ciphertext_len: ciphertext.len() as u64,
        };
        Ok(header.encode(&ciphertext))
    }

    /// Decrypt and deserialize a dataset from raw bytes.
    ///
    /// Flow: PFTK bytes → parse header → Argon2id(password, stored salt and
    /// params) → AES-256-GCM decrypt → bincode → Dataset.
    pub fn load_from_bytes(data: &[u8], password: &str) -> Result<Dataset, CoreError> {
        let (header, ciphertext) = SnapshotHeader::decode(data)?;
        let key = encryption::derive_key(password, &header.salt, &header.kdf_params)?;
        let plaintext = encryption::decrypt(ciphertext, &key, &header.nonce)?;
        bincode::deserialize(&plaintext)
            .map_err(|e| CoreError::Deserialization(format!("Failed to deserialize dataset: {e}")))
    }

    /// Save the dataset to an encrypted file on disk (native only).
    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_to_file(dataset: &Dataset, path: &str, password: &str) -> Result<(), CoreError> {
        let bytes = Self::save_to_bytes(dataset, password)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Load a dataset from an encrypted file on disk (native only).
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from_file(path: &str, password: &str) -> Result<Dataset, CoreError> {
        let bytes = std::fs::read(path)?;
        Self::load_from_bytes(&bytes, password)
    }
}
