//! Key pairs, PKCS#8 export/import and raw signing.
use crate::certificate::{armored_sections, strip_whitespace};
use base64ct::{Base64, Encoding};
use const_oid::ObjectIdentifier;
use der::pem::LineEnding;
use k256::ecdsa::{DerSignature, SigningKey as EcSigningKey, VerifyingKey as EcVerifyingKey};
use pkcs8::{
    DecodePrivateKey, EncodePrivateKey, EncryptedPrivateKeyInfo, PrivateKeyInfo, SecretDocument,
    pkcs5::pbes2,
    spki::{DecodePublicKey, EncodePublicKey, SubjectPublicKeyInfoRef},
};
use rand::{RngCore, rngs::OsRng};
use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs1v15,
    signature::{SignatureEncoding, Signer, Verifier},
};
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;
use zeroize::Zeroizing;

pub const MIN_RSA_BITS: usize = 1024;
pub const DEFAULT_RSA_BITS: usize = 2048;
pub const PBKDF2_ITERATIONS: u32 = 100_000;

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("password must not be blank when exporting an encrypted private key")]
    BlankPassword,

    #[error("RSA key size {bits} is below the {MIN_RSA_BITS}-bit minimum")]
    KeySize { bits: usize },

    #[error("key generation failed: {message}")]
    Generation { message: String },

    #[error("PKCS#8 error: {0}")]
    Pkcs8(#[from] pkcs8::Error),

    #[error("public key encoding failed: {0}")]
    PublicKey(#[from] pkcs8::spki::Error),

    #[error("DER error: {0}")]
    Der(#[from] der::Error),

    #[error("private key is encrypted; a password is required")]
    PasswordRequired,

    #[error("failed to decrypt private key (wrong password or corrupt data)")]
    Decryption,

    #[error("invalid key encoding: {message}")]
    Encoding { message: String },

    #[error("signing failed: {message}")]
    Signing { message: String },

    #[error("signature verification failed")]
    Verification,
}

/// Algorithm used for a freshly generated key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa { bits: usize },
    Secp256k1,
}

impl Default for KeyAlgorithm {
    fn default() -> Self {
        KeyAlgorithm::Rsa {
            bits: DEFAULT_RSA_BITS,
        }
    }
}

/// How the private key leaves the generator.
#[derive(Clone)]
pub enum KeyExport {
    /// Unencrypted PKCS#8; the caller is expected to protect it at rest.
    Plain,
    /// PBES2 (PBKDF2-HMAC-SHA256 + AES-256-CBC) `EncryptedPrivateKeyInfo`.
    Encrypted { password: Zeroizing<String> },
}

impl std::fmt::Debug for KeyExport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyExport::Plain => f.write_str("Plain"),
            KeyExport::Encrypted { .. } => f.write_str("Encrypted { .. }"),
        }
    }
}

impl KeyExport {
    pub fn encrypted(password: impl Into<String>) -> Self {
        KeyExport::Encrypted {
            password: Zeroizing::new(password.into()),
        }
    }
}

/// A signing key of one of the supported algorithms.
#[derive(Clone)]
pub enum PrivateKey {
    Rsa(RsaPrivateKey),
    Secp256k1(EcSigningKey),
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateKey({})", self.algorithm_name())
    }
}

impl PrivateKey {
    pub fn generate(algorithm: KeyAlgorithm) -> Result<Self, KeyError> {
        match algorithm {
            KeyAlgorithm::Rsa { bits } => {
                if bits < MIN_RSA_BITS {
                    return Err(KeyError::KeySize { bits });
                }
                let key = RsaPrivateKey::new(&mut OsRng, bits).map_err(|e| {
                    KeyError::Generation {
                        message: e.to_string(),
                    }
                })?;
                Ok(PrivateKey::Rsa(key))
            }
            KeyAlgorithm::Secp256k1 => Ok(PrivateKey::Secp256k1(EcSigningKey::random(&mut OsRng))),
        }
    }

    pub fn algorithm_name(&self) -> &'static str {
        match self {
            PrivateKey::Rsa(_) => "RSA",
            PrivateKey::Secp256k1(_) => "EC",
        }
    }

    /// Parses an unencrypted PKCS#8 `PrivateKeyInfo`, dispatching on its algorithm identifier.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, KeyError> {
        let info = PrivateKeyInfo::try_from(der)?;
        if info.algorithm.oid == EC_PUBLIC_KEY {
            return Ok(PrivateKey::Secp256k1(EcSigningKey::from_pkcs8_der(der)?));
        }
        if info.algorithm.oid != RSA_ENCRYPTION {
            warn!(oid = %info.algorithm.oid, "unknown private key algorithm, assuming RSA");
        }
        Ok(PrivateKey::Rsa(RsaPrivateKey::from_pkcs8_der(der)?))
    }

    /// Reads a key from PEM or bare base64 text.
    ///
    /// Accepts `PRIVATE KEY`, `ENCRYPTED PRIVATE KEY` (needs `password`) and SEC1
    /// `EC PRIVATE KEY` blocks.
    pub fn from_text(text: &str, password: Option<&str>) -> Result<Self, KeyError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(KeyError::Encoding {
                message: "no key material found".into(),
            });
        }

        let (label, der) = match armored_sections(text).first().copied() {
            Some(section) => {
                let (label, der) =
                    der::pem::decode_vec(section.as_bytes()).map_err(der::Error::from)?;
                (Some(label), Zeroizing::new(der))
            }
            None => {
                let der = Base64::decode_vec(&strip_whitespace(text)).map_err(|e| {
                    KeyError::Encoding {
                        message: e.to_string(),
                    }
                })?;
                (None, Zeroizing::new(der))
            }
        };

        match label {
            Some("EC PRIVATE KEY") => {
                let secret = k256::SecretKey::from_sec1_der(&der).map_err(|e| {
                    KeyError::Encoding {
                        message: e.to_string(),
                    }
                })?;
                Ok(PrivateKey::Secp256k1(EcSigningKey::from(secret)))
            }
            Some("ENCRYPTED PRIVATE KEY") => {
                let password = password.ok_or(KeyError::PasswordRequired)?;
                let plain = decrypt_private_key(&der, password)?;
                Self::from_pkcs8_der(plain.as_bytes())
            }
            _ => match Self::from_pkcs8_der(&der) {
                Ok(key) => Ok(key),
                Err(plain_err) => {
                    if EncryptedPrivateKeyInfo::try_from(der.as_slice()).is_err() {
                        return Err(plain_err);
                    }
                    let password = password.ok_or(KeyError::PasswordRequired)?;
                    let plain = decrypt_private_key(&der, password)?;
                    Self::from_pkcs8_der(plain.as_bytes())
                }
            },
        }
    }

    pub fn to_pkcs8_der(&self) -> Result<SecretDocument, KeyError> {
        let doc = match self {
            PrivateKey::Rsa(key) => key.to_pkcs8_der()?,
            PrivateKey::Secp256k1(key) => key.to_pkcs8_der()?,
        };
        Ok(doc)
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            PrivateKey::Rsa(key) => PublicKey::Rsa(RsaPublicKey::from(key)),
            PrivateKey::Secp256k1(key) => PublicKey::Secp256k1(EcVerifyingKey::from(key)),
        }
    }

    /// Exports the private key as PEM according to `export`.
    pub fn export_pem(&self, export: &KeyExport) -> Result<Zeroizing<String>, KeyError> {
        let der = self.to_pkcs8_der()?;
        match export {
            KeyExport::Plain => Ok(der.to_pem("PRIVATE KEY", LineEnding::LF)?),
            KeyExport::Encrypted { password } => {
                let encrypted = encrypt_private_key(der.as_bytes(), password)?;
                Ok(encrypted.to_pem("ENCRYPTED PRIVATE KEY", LineEnding::LF)?)
            }
        }
    }

    /// Signs `message` with SHA-256 and the algorithm matching the key.
    ///
    /// EC signatures are DER encoded; RSA signatures are PKCS#1 v1.5.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, KeyError> {
        match self {
            PrivateKey::Rsa(key) => {
                let signer = pkcs1v15::SigningKey::<Sha256>::new(key.clone());
                let signature: pkcs1v15::Signature =
                    signer.try_sign(message).map_err(|e| KeyError::Signing {
                        message: e.to_string(),
                    })?;
                Ok(signature.to_vec())
            }
            PrivateKey::Secp256k1(key) => {
                let signature: DerSignature =
                    key.try_sign(message).map_err(|e| KeyError::Signing {
                        message: e.to_string(),
                    })?;
                Ok(signature.as_bytes().to_vec())
            }
        }
    }
}

/// Public half of a [`PrivateKey`], also recovered from certificates.
#[derive(Debug, Clone)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    Secp256k1(EcVerifyingKey),
}

impl PublicKey {
    pub fn from_spki_der(der: &[u8]) -> Result<Self, KeyError> {
        let spki = SubjectPublicKeyInfoRef::try_from(der)?;
        if spki.algorithm.oid == EC_PUBLIC_KEY {
            return Ok(PublicKey::Secp256k1(EcVerifyingKey::from_public_key_der(der)?));
        }
        Ok(PublicKey::Rsa(RsaPublicKey::from_public_key_der(der)?))
    }

    pub fn to_spki_der(&self) -> Result<Vec<u8>, KeyError> {
        let doc = match self {
            PublicKey::Rsa(key) => key.to_public_key_der()?,
            PublicKey::Secp256k1(key) => key.to_public_key_der()?,
        };
        Ok(doc.into_vec())
    }

    /// `-----BEGIN PUBLIC KEY-----` with 64 character lines.
    pub fn to_pem(&self) -> Result<String, KeyError> {
        let pem = match self {
            PublicKey::Rsa(key) => key.to_public_key_pem(LineEnding::LF)?,
            PublicKey::Secp256k1(key) => key.to_public_key_pem(LineEnding::LF)?,
        };
        Ok(pem)
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), KeyError> {
        match self {
            PublicKey::Rsa(key) => {
                let verifier = pkcs1v15::VerifyingKey::<Sha256>::new(key.clone());
                let signature = pkcs1v15::Signature::try_from(signature)
                    .map_err(|_| KeyError::Verification)?;
                verifier
                    .verify(message, &signature)
                    .map_err(|_| KeyError::Verification)
            }
            PublicKey::Secp256k1(key) => {
                let signature =
                    DerSignature::try_from(signature).map_err(|_| KeyError::Verification)?;
                key.verify(message, &signature)
                    .map_err(|_| KeyError::Verification)
            }
        }
    }
}

/// Wraps a PKCS#8 `PrivateKeyInfo` into a PBES2 `EncryptedPrivateKeyInfo`.
///
/// PBKDF2-HMAC-SHA256 with 100 000 iterations and a random 16 byte salt derives the 256-bit
/// AES-CBC key; the IV is another random 16 bytes.
pub fn encrypt_private_key(pkcs8_der: &[u8], password: &str) -> Result<SecretDocument, KeyError> {
    if password.trim().is_empty() {
        return Err(KeyError::BlankPassword);
    }
    let mut salt = [0u8; 16];
    let mut iv = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut iv);

    let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(PBKDF2_ITERATIONS, &salt, &iv)
        .map_err(|e| KeyError::Encoding {
            message: e.to_string(),
        })?;
    let info = PrivateKeyInfo::try_from(pkcs8_der)?;
    Ok(info.encrypt_with_params(params, password.as_bytes())?)
}

/// Reverses [`encrypt_private_key`], returning the plain `PrivateKeyInfo` DER.
pub fn decrypt_private_key(encrypted_der: &[u8], password: &str) -> Result<SecretDocument, KeyError> {
    let info = EncryptedPrivateKeyInfo::try_from(encrypted_der)?;
    info.decrypt(password.as_bytes())
        .map_err(|_| KeyError::Decryption)
}
