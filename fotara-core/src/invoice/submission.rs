use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};

use crate::invoice::{
    sign::{SignedInvoice, SigningError},
    slots::{SignatureSlots, Slot},
    xml::{self, constants::INVOICE_UUID},
};

/// JSON body of every invoice submission to the CA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSubmission {
    pub invoice_hash: String,
    pub uuid: String,
    /// Base64 of the signed XML.
    pub invoice: String,
}

impl InvoiceSubmission {
    pub fn from_signed(signed: &SignedInvoice) -> Self {
        Self {
            invoice_hash: signed.invoice_hash().to_string(),
            uuid: signed.uuid().to_string(),
            invoice: Base64::encode_string(signed.signed_xml().as_bytes()),
        }
    }

    /// Reads hash and UUID back out of a document signed earlier.
    pub fn from_signed_xml(signed_xml: &str) -> Result<Self, SigningError> {
        let doc = xml::parse_document(signed_xml)?;
        let slots = SignatureSlots::new(&doc)?;
        let invoice_hash = slots.require(Slot::InvoiceDigest)?;
        let uuid = slots.text(INVOICE_UUID)?.ok_or(SigningError::MissingUuid)?;
        Ok(Self {
            invoice_hash,
            uuid,
            invoice: Base64::encode_string(signed_xml.as_bytes()),
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
