use crate::errors::CoreError;
use super::encryption::{KdfParams, NONCE_LEN, SALT_LEN};

/// Magic bytes identifying a PFTK (portfolio tracker) snapshot file.
pub const MAGIC: &[u8; 4] = b"PFTK";

/// Current file format version.
pub const CURRENT_VERSION: u16 = 1;

/// Fixed header size in bytes:
/// magic(4) + version(2) + kdf_params(12) + salt(16) + nonce(12) + ciphertext_len(8)
pub const HEADER_SIZE: usize = 4 + 2 + 12 + SALT_LEN + NONCE_LEN + 8;

/// Header of an encrypted snapshot file.
///
/// Layout, all integers little-endian:
/// ```text
/// [PFTK: 4B] [version: 2B] [memory_cost: 4B] [time_cost: 4B]
/// [parallelism: 4B] [salt: 16B] [nonce: 12B] [ciphertext_len: 8B]
/// [ciphertext: variable, AES-GCM tag appended]
/// ```
#[derive(Debug)]
pub struct SnapshotHeader {
    pub version: u16,
    pub kdf_params: KdfParams,
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext_len: u64,
}

impl SnapshotHeader {
    /// Assemble a complete file: header followed by ciphertext.
    #[must_use]
    pub fn encode(&self, ciphertext: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.kdf_params.memory_cost.to_le_bytes());
        buf.extend_from_slice(&self.kdf_params.time_cost.to_le_bytes());
        buf.extend_from_slice(&self.kdf_params.parallelism.to_le_bytes());
        buf.extend_from_slice(&self.salt);
        buf.extend_from_slice(&self.nonce);
        buf.extend_from_slice(&(ciphertext.len() as u64).to_le_bytes());
        buf.extend_from_slice(ciphertext);
        buf
    }

    /// Parse the header from raw file bytes, returning it together with
    /// the ciphertext slice. Validates magic, version, KDF bounds, and
    /// that the file is not truncated.
    pub fn decode(data: &[u8]) -> Result<(Self, &[u8]), CoreError> {
        if data.len() < HEADER_SIZE {
            return Err(CoreError::InvalidFileFormat(
                "File too small to be a valid PFTK snapshot".into(),
            ));
        }
        let mut reader = Reader::new(data);

        if reader.take(4)? != MAGIC {
            return Err(CoreError::InvalidFileFormat(
                "Invalid magic bytes — not a PFTK snapshot".into(),
            ));
        }

        let version = reader.read_u16()?;
        if version == 0 || version > CURRENT_VERSION {
            return Err(CoreError::UnsupportedVersion(version));
        }

        let kdf_params = KdfParams {
            memory_cost: reader.read_u32()?,
            time_cost: reader.read_u32()?,
            parallelism: reader.read_u32()?,
        };
        kdf_params.validate()?;

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(reader.take(SALT_LEN)?);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(reader.take(NONCE_LEN)?);

        let ciphertext_len = reader.read_u64()?;
        let ciphertext = reader.remaining();
        if (ciphertext.len() as u64) < ciphertext_len {
            return Err(CoreError::InvalidFileFormat(format!(
                "File truncated: expected {ciphertext_len} bytes of ciphertext, got {}",
                ciphertext.len()
            )));
        }

        let header = Self {
            version,
            kdf_params,
            salt,
            nonce,
            ciphertext_len,
        };
        Ok((header, &ciphertext[..ciphertext_len as usize]))
    }
}

/// Bounds-checked cursor over the raw file bytes.
struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CoreError> {
        let end = self.offset + len;
        if end > self.data.len() {
            return Err(CoreError::InvalidFileFormat(
                "Unexpected end of header".into(),
            ));
        }
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16, CoreError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, CoreError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&mut self) -> Result<u64, CoreError> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    fn remaining(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }
}
