//! Invoice signing pipeline: canonicalization, XAdES embedding, QR payload and submission
//! bodies.
pub mod canonical;
pub mod qr;
pub mod sign;
pub mod slots;
pub mod submission;
pub mod timestamp;
pub mod validation;
pub mod xml;

pub use canonical::{CanonicalizationError, InvoiceCanonicalizer};
pub use qr::{EncodedQr, InvoiceQrData, QrCodeError, QrPayload, decode_tlv};
pub use sign::{InvoiceSigner, SignedInvoice, SigningError, regenerate_qr};
pub use slots::{SignatureSlots, Slot, SlotError};
pub use submission::InvoiceSubmission;
pub use timestamp::{Clock, FixedClock, SystemClock, TimestampError, TimestampNormalizer};
pub use validation::{InvoiceValidator, ValidationReport};
pub use xml::XmlError;
