use base64ct::{Base64, Encoding};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::{
    certificate::{CertificateError, SigningCertificate, hex_hash_to_base64},
    invoice::{
        canonical::{CanonicalizationError, InvoiceCanonicalizer},
        qr::{EncodedQr, InvoiceQrData, QrCodeError, QrPayload},
        slots::{SignatureSlots, Slot, SlotError},
        timestamp::{Clock, SystemClock, format_local},
        xml::{
            self, XmlError,
            constants::{ECDSA_SHA256_URI, INVOICE_UUID, RSA_SHA256_URI},
        },
    },
    keys::{KeyError, PrivateKey},
};

#[derive(Debug, Error)]
pub enum SigningError {
    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),

    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error(transparent)]
    Certificate(#[from] CertificateError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Qr(#[from] QrCodeError),

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("invoice hash '{hash}' is not valid base64")]
    InvoiceHash { hash: String },

    #[error("invoice has no cbc:UUID")]
    MissingUuid,
}

/// Output of one successful signing run.
#[derive(Debug, Clone)]
pub struct SignedInvoice {
    invoice_hash: String,
    signature: String,
    qr_code: String,
    signed_xml: String,
    uuid: String,
    signature_fallback: bool,
}

impl SignedInvoice {
    /// Base64 SHA-256 of the canonical invoice.
    pub fn invoice_hash(&self) -> &str {
        &self.invoice_hash
    }

    /// Base64 signature over the invoice hash bytes.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn qr_code(&self) -> &str {
        &self.qr_code
    }

    pub fn signed_xml(&self) -> &str {
        &self.signed_xml
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Whether the QR signature field was filled from text instead of decoded base64.
    pub fn signature_fallback(&self) -> bool {
        self.signature_fallback
    }
}

/// Embeds a XAdES signature and QR code into UBL invoices.
///
/// # Examples
/// ```rust,no_run
/// use fotara_core::invoice::sign::InvoiceSigner;
/// use fotara_core::{certificate::SigningCertificate, keys::PrivateKey};
///
/// let key = PrivateKey::from_text(&std::fs::read_to_string("key.pem")?, None)?;
/// let cert = SigningCertificate::parse(&std::fs::read_to_string("cert.pem")?)?;
/// let signed = InvoiceSigner::new(key, cert).sign(&std::fs::read_to_string("invoice.xml")?)?;
/// println!("{}", signed.qr_code());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct InvoiceSigner {
    key: PrivateKey,
    certificate: SigningCertificate,
    clock: Arc<dyn Clock>,
    canonicalizer: InvoiceCanonicalizer,
}

impl std::fmt::Debug for InvoiceSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvoiceSigner")
            .field("key", &self.key)
            .field("issuer", &self.certificate.issuer_name())
            .finish_non_exhaustive()
    }
}

impl InvoiceSigner {
    pub fn new(key: PrivateKey, certificate: SigningCertificate) -> Self {
        Self {
            key,
            certificate,
            clock: Arc::new(SystemClock),
            canonicalizer: InvoiceCanonicalizer,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn certificate(&self) -> &SigningCertificate {
        &self.certificate
    }

    /// Signs `xml`. Any failure aborts the whole run; no partially signed document is returned.
    #[instrument(skip_all)]
    pub fn sign(&self, xml: &str) -> Result<SignedInvoice, SigningError> {
        let (doc, invoice_hash) = self.canonicalizer.prepare_and_digest(xml)?;
        let slots = SignatureSlots::new(&doc)?;

        let signing_time = format_local(self.clock.now());
        slots.set(Slot::SigningTime, &signing_time)?;
        slots.set(Slot::CertificateDigest, &self.certificate.digest())?;
        slots.set(Slot::IssuerName, &self.certificate.issuer_name())?;
        slots.set(Slot::SerialNumber, &self.certificate.serial_decimal())?;

        let signed_properties = xml::serialize_subtree(&slots.node(Slot::SignedProperties)?);
        let signed_properties_digest =
            hex_hash_to_base64(&Sha256::digest(signed_properties.as_bytes()));
        debug!(%signed_properties_digest, "signed properties digest");

        let hash_bytes = Base64::decode_vec(&invoice_hash).map_err(|_| {
            SigningError::InvoiceHash {
                hash: invoice_hash.clone(),
            }
        })?;
        let signature = Base64::encode_string(&self.key.sign(&hash_bytes)?);

        slots.set_attribute(Slot::SignatureMethod, "Algorithm", self.signature_method())?;
        slots.set(Slot::SignatureValue, &signature)?;
        slots.set(Slot::Certificate, self.certificate.base64_text())?;
        slots.set(Slot::SignedPropertiesDigest, &signed_properties_digest)?;
        slots.set(Slot::InvoiceDigest, &invoice_hash)?;

        let qr = qr_payload(&slots, &self.certificate, &invoice_hash, &signature)?.encode();
        slots.set(Slot::Qr, &qr.payload)?;

        let uuid = slots.text(INVOICE_UUID)?.ok_or(SigningError::MissingUuid)?;
        drop(slots);

        info!(%uuid, %invoice_hash, "invoice signed");
        Ok(SignedInvoice {
            invoice_hash,
            signature,
            qr_code: qr.payload,
            signed_xml: doc.to_string(),
            uuid,
            signature_fallback: qr.signature_fallback,
        })
    }

    fn signature_method(&self) -> &'static str {
        match self.key {
            PrivateKey::Rsa(_) => RSA_SHA256_URI,
            PrivateKey::Secp256k1(_) => ECDSA_SHA256_URI,
        }
    }
}

/// Rebuilds the QR payload of an already signed invoice from its embedded hash, signature and
/// certificate.
pub fn regenerate_qr(signed_xml: &str) -> Result<EncodedQr, SigningError> {
    let doc = xml::parse_document(signed_xml)?;
    let slots = SignatureSlots::new(&doc)?;
    let invoice_hash = slots.require(Slot::InvoiceDigest)?;
    let signature = slots.require(Slot::SignatureValue)?;
    let certificate = SigningCertificate::parse(&slots.require(Slot::Certificate)?)?;
    Ok(qr_payload(&slots, &certificate, &invoice_hash, &signature)?.encode())
}

fn qr_payload(
    slots: &SignatureSlots<'_>,
    certificate: &SigningCertificate,
    invoice_hash: &str,
    signature: &str,
) -> Result<QrPayload, SigningError> {
    Ok(QrPayload {
        data: InvoiceQrData::from_context(slots.context())?,
        invoice_hash: invoice_hash.to_string(),
        signature: signature.to_string(),
        public_key: certificate.public_key_der()?,
        certificate_signature: certificate.signature_bytes().to_vec(),
    })
}
