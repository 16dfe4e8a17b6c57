use base64ct::{Base64, Encoding};
use libxml::{tree::Document, xpath};
use thiserror::Error;
use tracing::warn;

use crate::invoice::{
    timestamp::{TimestampError, TimestampNormalizer},
    xml::{
        self, XmlError,
        constants::{ISSUE_DATE, ISSUE_TIME, PAYABLE_AMOUNT, SELLER_NAME, SELLER_VAT, TAX_AMOUNT},
    },
};

#[derive(Debug, Error)]
pub enum QrCodeError {
    #[error("seller legal name is missing")]
    MissingSellerName,
    #[error("seller VAT registration number is missing")]
    MissingSellerVat,
    #[error("invoice payable amount is missing")]
    MissingTotal,
    #[error("invoice VAT total is missing")]
    MissingVatTotal,
    #[error("invoice issue date is missing")]
    MissingIssueDate,
    #[error("QR payload is not valid base64")]
    Base64,
    #[error("TLV payload truncated at offset {offset}")]
    Truncated { offset: usize },
    #[error("TLV length at offset {offset} is not supported")]
    UnsupportedLength { offset: usize },
    #[error(transparent)]
    Timestamp(#[from] TimestampError),
    #[error(transparent)]
    Xml(#[from] XmlError),
}

pub type QrResult<T> = std::result::Result<T, QrCodeError>;

/// Textual invoice fields read from the document (tags 1 to 5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceQrData {
    pub seller_name: String,
    pub seller_vat: String,
    pub timestamp: String,
    pub total_with_vat: String,
    pub total_vat: String,
}

impl InvoiceQrData {
    pub(crate) fn from_document(doc: &Document) -> QrResult<Self> {
        let ctx = xml::context(doc)?;
        Self::from_context(&ctx)
    }

    pub(crate) fn from_context(ctx: &xpath::Context) -> QrResult<Self> {
        let seller_name =
            xml::text_value(ctx, SELLER_NAME)?.ok_or(QrCodeError::MissingSellerName)?;
        let seller_vat = xml::text_value(ctx, SELLER_VAT)?.ok_or(QrCodeError::MissingSellerVat)?;
        let total_with_vat =
            xml::text_value(ctx, PAYABLE_AMOUNT)?.ok_or(QrCodeError::MissingTotal)?;
        let total_vat = xml::text_value(ctx, TAX_AMOUNT)?.ok_or(QrCodeError::MissingVatTotal)?;
        let issue_date = xml::text_value(ctx, ISSUE_DATE)?.ok_or(QrCodeError::MissingIssueDate)?;
        let issue_time = xml::text_value(ctx, ISSUE_TIME)?;

        let timestamp = TimestampNormalizer.normalize(&issue_date, issue_time.as_deref())?;

        Ok(Self {
            seller_name,
            seller_vat,
            timestamp,
            total_with_vat,
            total_vat,
        })
    }
}

/// Everything that goes into the QR payload.
#[derive(Debug, Clone)]
pub struct QrPayload {
    pub data: InvoiceQrData,
    /// Base64 invoice hash, encoded as its text.
    pub invoice_hash: String,
    /// Base64 signature value as written in the document.
    pub signature: String,
    /// DER SubjectPublicKeyInfo of the signing certificate.
    pub public_key: Vec<u8>,
    /// Raw bytes of the certificate's own signature.
    pub certificate_signature: Vec<u8>,
}

/// Base64 TLV payload plus whether the signature field had to fall back to its text bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedQr {
    pub payload: String,
    pub signature_fallback: bool,
}

impl QrPayload {
    pub fn encode(&self) -> EncodedQr {
        let (signature, signature_fallback) = signature_bytes(&self.signature);

        let mut tlv = TlvBuilder::new();
        tlv.push_str(1, &self.data.seller_name);
        tlv.push_str(2, &self.data.seller_vat);
        tlv.push_str(3, &self.data.timestamp);
        tlv.push_str(4, &self.data.total_with_vat);
        tlv.push_str(5, &self.data.total_vat);
        tlv.push_str(6, &self.invoice_hash);
        tlv.push_bytes(7, &signature);
        tlv.push_bytes(8, &self.public_key);
        tlv.push_bytes(9, &self.certificate_signature);

        EncodedQr {
            payload: tlv.finish(),
            signature_fallback,
        }
    }
}

fn signature_bytes(signature: &str) -> (Vec<u8>, bool) {
    match Base64::decode_vec(signature.trim()) {
        Ok(bytes) => (bytes, false),
        Err(e) => {
            warn!(error = %e, "signature is not base64; encoding its text bytes in the QR");
            (signature.as_bytes().to_vec(), true)
        }
    }
}

/// Single-byte tags with BER-style definite lengths.
pub(crate) struct TlvBuilder {
    bytes: Vec<u8>,
}

impl TlvBuilder {
    pub(crate) fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    pub(crate) fn push_str(&mut self, tag: u8, value: &str) {
        self.push_bytes(tag, value.as_bytes())
    }

    pub(crate) fn push_bytes(&mut self, tag: u8, value: &[u8]) {
        self.bytes.push(tag);
        push_length(&mut self.bytes, value.len());
        self.bytes.extend_from_slice(value);
    }

    pub(crate) fn finish(self) -> String {
        Base64::encode_string(&self.bytes)
    }
}

fn push_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let be = len.to_be_bytes();
    let skip = be.iter().take_while(|b| **b == 0).count();
    let significant = &be[skip..];
    out.push(0x80 | significant.len() as u8);
    out.extend_from_slice(significant);
}

/// Splits a base64 TLV payload back into `(tag, value)` pairs in order.
pub fn decode_tlv(payload: &str) -> QrResult<Vec<(u8, Vec<u8>)>> {
    let bytes = Base64::decode_vec(payload.trim()).map_err(|_| QrCodeError::Base64)?;
    let mut entries = Vec::new();
    let mut idx = 0;
    while idx < bytes.len() {
        let tag = bytes[idx];
        let (len, header) = read_length(&bytes, idx + 1)?;
        let start = idx + 1 + header;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= bytes.len())
            .ok_or(QrCodeError::Truncated { offset: idx })?;
        entries.push((tag, bytes[start..end].to_vec()));
        idx = end;
    }
    Ok(entries)
}

fn read_length(bytes: &[u8], offset: usize) -> QrResult<(usize, usize)> {
    let first = *bytes.get(offset).ok_or(QrCodeError::Truncated { offset })?;
    if first < 0x80 {
        return Ok((first as usize, 1));
    }
    let count = (first & 0x7f) as usize;
    if count == 0 || count > std::mem::size_of::<usize>() {
        return Err(QrCodeError::UnsupportedLength { offset });
    }
    let digits = bytes
        .get(offset + 1..offset + 1 + count)
        .ok_or(QrCodeError::Truncated { offset })?;
    let len = digits.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
    Ok((len, 1 + count))
}
