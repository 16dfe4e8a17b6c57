//! Named locations inside a prepared invoice.
use libxml::{
    tree::{Document, Node},
    xpath,
};
use std::marker::PhantomData;
use thiserror::Error;
use tracing::debug;

use crate::invoice::xml::{self, XmlError, constants};

#[derive(Debug, Error)]
pub enum SlotError {
    #[error("{slot} not found in document ({path})")]
    Missing { slot: Slot, path: &'static str },

    #[error(transparent)]
    Xml(#[from] XmlError),
}

/// Logical fields of the embedded XAdES signature and the QR reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    SigningTime,
    CertificateDigest,
    IssuerName,
    SerialNumber,
    SignedProperties,
    SignatureMethod,
    SignatureValue,
    Certificate,
    SignedPropertiesDigest,
    InvoiceDigest,
    Qr,
}

impl Slot {
    pub const ALL: [Slot; 11] = [
        Slot::SigningTime,
        Slot::CertificateDigest,
        Slot::IssuerName,
        Slot::SerialNumber,
        Slot::SignedProperties,
        Slot::SignatureMethod,
        Slot::SignatureValue,
        Slot::Certificate,
        Slot::SignedPropertiesDigest,
        Slot::InvoiceDigest,
        Slot::Qr,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Slot::SigningTime => constants::SIGNING_TIME,
            Slot::CertificateDigest => constants::CERTIFICATE_DIGEST,
            Slot::IssuerName => constants::ISSUER_NAME,
            Slot::SerialNumber => constants::SERIAL_NUMBER,
            Slot::SignedProperties => constants::SIGNED_PROPERTIES,
            Slot::SignatureMethod => constants::SIGNATURE_METHOD,
            Slot::SignatureValue => constants::SIGNATURE_VALUE,
            Slot::Certificate => constants::CERTIFICATE,
            Slot::SignedPropertiesDigest => constants::SIGNED_PROPERTIES_DIGEST,
            Slot::InvoiceDigest => constants::INVOICE_DIGEST,
            Slot::Qr => constants::QR_VALUE,
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Slot::SigningTime => "signing time",
            Slot::CertificateDigest => "certificate digest",
            Slot::IssuerName => "issuer name",
            Slot::SerialNumber => "serial number",
            Slot::SignedProperties => "signed properties",
            Slot::SignatureMethod => "signature method",
            Slot::SignatureValue => "signature value",
            Slot::Certificate => "certificate",
            Slot::SignedPropertiesDigest => "signed properties digest",
            Slot::InvoiceDigest => "invoice digest",
            Slot::Qr => "QR code",
        };
        f.write_str(name)
    }
}

/// Typed read/write access to the [`Slot`]s of one document.
pub struct SignatureSlots<'a> {
    ctx: xpath::Context,
    _doc: PhantomData<&'a Document>,
}

impl<'a> SignatureSlots<'a> {
    pub fn new(doc: &'a Document) -> Result<Self, SlotError> {
        Ok(Self {
            ctx: xml::context(doc)?,
            _doc: PhantomData,
        })
    }

    pub fn node(&self, slot: Slot) -> Result<Node, SlotError> {
        xml::first_node(&self.ctx, slot.path())?.ok_or(SlotError::Missing {
            slot,
            path: slot.path(),
        })
    }

    pub fn set(&self, slot: Slot, value: &str) -> Result<(), SlotError> {
        let mut node = self.node(slot)?;
        xml::set_text(&mut node, value)?;
        debug!(%slot, value, "slot written");
        Ok(())
    }

    pub fn set_attribute(&self, slot: Slot, name: &str, value: &str) -> Result<(), SlotError> {
        let mut node = self.node(slot)?;
        xml::set_attribute(&mut node, name, value)?;
        Ok(())
    }

    /// Trimmed text of the slot; `None` when the node is absent or empty.
    pub fn get(&self, slot: Slot) -> Result<Option<String>, SlotError> {
        Ok(xml::text_value(&self.ctx, slot.path())?)
    }

    pub fn require(&self, slot: Slot) -> Result<String, SlotError> {
        self.get(slot)?.ok_or(SlotError::Missing {
            slot,
            path: slot.path(),
        })
    }

    /// Reads an arbitrary path with the same namespace bindings.
    pub(crate) fn text(&self, path: &str) -> Result<Option<String>, SlotError> {
        Ok(xml::text_value(&self.ctx, path)?)
    }

    pub(crate) fn context(&self) -> &xpath::Context {
        &self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::canonical::InvoiceCanonicalizer;

    const INVOICE: &str = r#"<Invoice xmlns="urn:oasis:names:specification:ubl:schema:xsd:Invoice-2" xmlns:cac="urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2" xmlns:cbc="urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2"><cbc:ID>1</cbc:ID><cac:AccountingSupplierParty/></Invoice>"#;

    #[test]
    fn every_slot_resolves_after_preparation() {
        let (doc, _) = InvoiceCanonicalizer.prepare_and_digest(INVOICE).unwrap();
        let slots = SignatureSlots::new(&doc).unwrap();
        for slot in Slot::ALL {
            assert!(slots.node(slot).is_ok(), "{slot} should resolve");
        }
    }

    #[test]
    fn written_values_read_back() {
        let (doc, _) = InvoiceCanonicalizer.prepare_and_digest(INVOICE).unwrap();
        let slots = SignatureSlots::new(&doc).unwrap();
        slots.set(Slot::IssuerName, "CN=Test CA, O=A & B").unwrap();
        slots.set(Slot::InvoiceDigest, "abc=").unwrap();
        assert_eq!(
            slots.get(Slot::IssuerName).unwrap().as_deref(),
            Some("CN=Test CA, O=A & B")
        );
        assert_eq!(slots.require(Slot::InvoiceDigest).unwrap(), "abc=");
        assert_eq!(slots.get(Slot::SignedPropertiesDigest).unwrap(), None);
    }

    #[test]
    fn unprepared_document_reports_missing_slot() {
        let doc = xml::parse_document(INVOICE).unwrap();
        let slots = SignatureSlots::new(&doc).unwrap();
        assert!(matches!(
            slots.set(Slot::SignatureValue, "x"),
            Err(SlotError::Missing {
                slot: Slot::SignatureValue,
                ..
            })
        ));
    }
}
