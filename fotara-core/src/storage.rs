//! At-rest encryption and the on-disk layout of generated files.
use aes::{
    Aes256,
    cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7},
};
use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use rand::{RngCore, rngs::OsRng};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::info;
use zeroize::Zeroizing;

use crate::{
    config::{Config, ConfigError},
    invoice::timestamp::local_offset,
};

const IV_LEN: usize = 16;

type Encryptor = cbc::Encryptor<Aes256>;
type Decryptor = cbc::Decryptor<Aes256>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("output directory '{path}' does not exist")]
    MissingDirectory { path: PathBuf },

    #[error("encrypted text is not valid base64")]
    Encoding,

    #[error("encrypted text is too short")]
    Truncated,

    #[error("decryption failed (wrong key or corrupted data)")]
    Decryption,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Symmetric encryption of text written to disk.
pub trait AtRestCipher {
    fn encrypt(&self, plain: &str) -> Result<String, StorageError>;
    fn decrypt(&self, encrypted: &str) -> Result<Zeroizing<String>, StorageError>;
}

/// AES-256-CBC with PKCS#7 padding. Output is `base64(iv || ciphertext)` with a fresh IV per
/// message.
#[derive(Clone)]
pub struct AesCbcCipher {
    key: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for AesCbcCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AesCbcCipher(..)")
    }
}

impl AesCbcCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }

    /// Uses the key configured through `FOTARA_STORAGE_KEY`.
    pub fn from_config(config: &Config) -> Result<Self, StorageError> {
        Ok(Self::new(*config.storage_key()?))
    }
}

impl AtRestCipher for AesCbcCipher {
    fn encrypt(&self, plain: &str) -> Result<String, StorageError> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);
        let ciphertext = Encryptor::new(self.key.as_ref().into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plain.as_bytes());

        let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        Ok(Base64::encode_string(&out))
    }

    fn decrypt(&self, encrypted: &str) -> Result<Zeroizing<String>, StorageError> {
        let compact: String = encrypted.chars().filter(|c| !c.is_whitespace()).collect();
        let raw = Base64::decode_vec(&compact).map_err(|_| StorageError::Encoding)?;
        if raw.len() <= IV_LEN {
            return Err(StorageError::Truncated);
        }
        let (iv, ciphertext) = raw.split_at(IV_LEN);
        let iv: [u8; IV_LEN] = iv.try_into().map_err(|_| StorageError::Truncated)?;
        let plain = Decryptor::new(self.key.as_ref().into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| StorageError::Decryption)?;
        let plain = Zeroizing::new(plain);
        String::from_utf8(plain.to_vec())
            .map(Zeroizing::new)
            .map_err(|_| StorageError::Decryption)
    }
}

/// Names and writes every file the CLI and the onboarding workflow produce.
///
/// # Examples
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use fotara_core::storage::OutputLayout;
///
/// let layout = OutputLayout::new("/tmp/out");
/// let files = layout.key_material("Acme Trading Co.", Utc.with_ymd_and_hms(2024, 3, 1, 7, 0, 0).unwrap());
/// assert!(files.csr.ends_with("Acme_Trading_Co__20240301_100000.csr"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

/// The three files of one key generation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterialFiles {
    pub csr: PathBuf,
    pub private_key: PathBuf,
    pub public_key: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_exists(&self) -> Result<(), StorageError> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(StorageError::MissingDirectory {
                path: self.root.clone(),
            })
        }
    }

    /// `<CN>_<yyyyMMdd_HHmmss>.{csr,key,pub}`, with the CN reduced to `[A-Za-z0-9_-]`.
    pub fn key_material(&self, common_name: &str, at: DateTime<Utc>) -> KeyMaterialFiles {
        let stamp = at.with_timezone(&local_offset()).format("%Y%m%d_%H%M%S");
        let base = format!("{}_{stamp}", sanitize(common_name));
        KeyMaterialFiles {
            csr: self.root.join(format!("{base}.csr")),
            private_key: self.root.join(format!("{base}.key")),
            public_key: self.root.join(format!("{base}.pub")),
        }
    }

    pub fn production_certificate(&self) -> PathBuf {
        self.root.join("production_csid.cert")
    }

    pub fn production_response(&self) -> PathBuf {
        self.root.join("production_response.json")
    }

    pub fn test_invoice(&self, taxpayer: &str, device: &str, index: usize) -> PathBuf {
        self.root
            .join(format!("einvoice_test_{taxpayer}_{device}_{index}.xml"))
    }

    pub fn write_plain(&self, path: &Path, contents: &str) -> Result<(), StorageError> {
        fs::write(path, contents).map_err(|source| StorageError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "wrote file");
        Ok(())
    }

    pub fn write_encrypted(
        &self,
        cipher: &impl AtRestCipher,
        path: &Path,
        contents: &str,
    ) -> Result<(), StorageError> {
        let encrypted = cipher.encrypt(contents)?;
        self.write_plain(path, &encrypted)
    }
}

pub fn read_encrypted(
    cipher: &impl AtRestCipher,
    path: &Path,
) -> Result<Zeroizing<String>, StorageError> {
    let raw = fs::read_to_string(path).map_err(|source| StorageError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    cipher.decrypt(&raw)
}

fn sanitize(common_name: &str) -> String {
    let cleaned: String = common_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "CSR".to_string()
    } else {
        cleaned
    }
}
