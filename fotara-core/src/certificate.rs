//! Signing certificate handling: decoding, identity fields and digests.
use crate::keys::{KeyError, PublicKey};
use base64ct::{Base64, Encoding};
use der::{Decode, Encode};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use x509_cert::Certificate;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("no certificate found in input")]
    Empty,

    #[error("none of the {count} certificate block(s) could be decoded: {last}")]
    Undecodable { count: usize, last: String },

    #[error("failed to encode certificate field {context}: {source}")]
    Encode {
        context: &'static str,
        #[source]
        source: der::Error,
    },

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// A decoded X.509 certificate together with its DER as unwrapped base64.
///
/// The text is what goes into `ds:X509Certificate` and what the certificate digest is taken
/// over.
#[derive(Debug, Clone)]
pub struct SigningCertificate {
    text: String,
    cert: Certificate,
}

impl SigningCertificate {
    /// Accepts a single PEM, a PEM chain (first decodable block wins) or bare base64 DER.
    pub fn parse(input: &str) -> Result<Self, CertificateError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(CertificateError::Empty);
        }

        let sections = armored_sections(input);
        if sections.is_empty() {
            let der = Base64::decode_vec(&strip_whitespace(input)).map_err(|e| {
                CertificateError::Undecodable {
                    count: 1,
                    last: e.to_string(),
                }
            })?;
            return Self::from_der(&der);
        }

        let count = sections.len();
        let mut last = String::new();
        for section in sections {
            let (label, der) = match der::pem::decode_vec(section.as_bytes()) {
                Ok(decoded) => decoded,
                Err(e) => {
                    last = e.to_string();
                    continue;
                }
            };
            if label != "CERTIFICATE" {
                last = format!("skipped block labelled {label:?}");
                continue;
            }
            match Certificate::from_der(&der) {
                Ok(cert) => {
                    return Ok(Self {
                        text: Base64::encode_string(&der),
                        cert,
                    });
                }
                Err(e) => last = e.to_string(),
            }
        }
        Err(CertificateError::Undecodable { count, last })
    }

    pub fn from_der(der: &[u8]) -> Result<Self, CertificateError> {
        let cert = Certificate::from_der(der).map_err(|e| CertificateError::Undecodable {
            count: 1,
            last: e.to_string(),
        })?;
        Ok(Self {
            text: Base64::encode_string(der),
            cert,
        })
    }

    /// Base64 DER without armor or line breaks.
    pub fn base64_text(&self) -> &str {
        &self.text
    }

    pub fn certificate(&self) -> &Certificate {
        &self.cert
    }

    /// Issuer in `CN=..., O=...` form.
    pub fn issuer_name(&self) -> String {
        self.cert
            .tbs_certificate
            .issuer
            .to_string()
            .split(',')
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Serial number as an unsigned decimal string.
    pub fn serial_decimal(&self) -> String {
        serial_bytes_to_decimal_string(self.cert.tbs_certificate.serial_number.as_bytes())
    }

    /// `base64(hex(SHA-256(text)))` over the certificate's base64 text.
    pub fn digest(&self) -> String {
        let digest = hex_hash_to_base64(&Sha256::digest(self.text.as_bytes()));
        debug!(%digest, "certificate digest");
        digest
    }

    /// DER SubjectPublicKeyInfo of the certified key.
    pub fn public_key_der(&self) -> Result<Vec<u8>, CertificateError> {
        self.cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|source| CertificateError::Encode {
                context: "subject public key info",
                source,
            })
    }

    pub fn public_key(&self) -> Result<PublicKey, CertificateError> {
        Ok(PublicKey::from_spki_der(&self.public_key_der()?)?)
    }

    /// Raw bytes of the issuer's signature over this certificate.
    pub fn signature_bytes(&self) -> &[u8] {
        self.cert.signature.raw_bytes()
    }
}

/// Lower-case hex of `hash`, then base64 of that ASCII.
pub fn hex_hash_to_base64(hash: &[u8]) -> String {
    let hex_hash: String = hash.iter().map(|byte| format!("{byte:02x}")).collect();
    Base64::encode_string(hex_hash.as_bytes())
}

/// Slices `input` into `-----BEGIN` to `-----END ...-----` sections for the PEM decoder.
///
/// Text between sections is dropped.
pub(crate) fn armored_sections(input: &str) -> Vec<&str> {
    const BEGIN: &str = "-----BEGIN ";
    const END: &str = "-----END ";
    const DASHES: &str = "-----";

    let mut sections = Vec::new();
    let mut rest = input;
    while let Some(start) = rest.find(END) {
        let after = start + END.len();
        let Some(close) = rest[after..].find(DASHES) else {
            break;
        };
        let end = after + close + DASHES.len();
        if let Some(begin) = rest[..start].rfind(BEGIN) {
            sections.push(&rest[begin..end]);
        }
        rest = &rest[end..];
    }
    sections
}

pub(crate) fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn serial_bytes_to_decimal_string(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "0".to_string();
    }

    let mut digits: Vec<u8> = vec![0];
    for &byte in bytes {
        let mut carry = byte as u32;
        for digit in digits.iter_mut() {
            let value = (*digit as u32) * 256 + carry;
            *digit = (value % 10) as u8;
            carry = value / 10;
        }
        while carry > 0 {
            digits.push((carry % 10) as u8);
            carry /= 10;
        }
    }

    while digits.len() > 1 && matches!(digits.last(), Some(0)) {
        digits.pop();
    }

    digits.iter().rev().map(|d| (b'0' + *d) as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_bytes_to_decimal_handles_large_values() {
        assert_eq!(serial_bytes_to_decimal_string(&[]), "0");
        assert_eq!(serial_bytes_to_decimal_string(&[0x01, 0x00]), "256");
        assert_eq!(
            serial_bytes_to_decimal_string(&[0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]),
            "18446744073709551616"
        );
    }

    #[test]
    fn hex_then_base64_encoding() {
        // sha256("") in hex, then base64
        let digest = Sha256::digest(b"");
        assert_eq!(
            hex_hash_to_base64(&digest),
            "ZTNiMGM0NDI5OGZjMWMxNDlhZmJmNGM4OTk2ZmI5MjQyN2FlNDFlNDY0OWI5MzRjYTQ5NTk5MWI3ODUyYjg1NQ=="
        );
    }

    #[test]
    fn sections_start_at_their_begin_line() {
        let text = "bag attributes\n-----BEGIN A-----\nQUJD\n-----END A-----\n\
                    junk\n-----BEGIN B-----\nREVG\n-----END B-----\n";
        assert_eq!(
            armored_sections(text),
            vec![
                "-----BEGIN A-----\nQUJD\n-----END A-----",
                "-----BEGIN B-----\nREVG\n-----END B-----",
            ]
        );
        assert!(armored_sections("QUJDREVG").is_empty());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            SigningCertificate::parse(""),
            Err(CertificateError::Empty)
        ));
        assert!(matches!(
            SigningCertificate::parse("-----BEGIN CERTIFICATE-----\nQUJD\n-----END CERTIFICATE-----"),
            Err(CertificateError::Undecodable { count: 1, .. })
        ));
    }
}
