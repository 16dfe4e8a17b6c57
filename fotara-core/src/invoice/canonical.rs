//! Invoice canonicalization and hashing.
use base64ct::{Base64, Encoding};
use libxml::tree::{
    Document,
    c14n::{CanonicalizationMode, CanonicalizationOptions},
};
use sha2::{Digest, Sha256};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

use crate::invoice::xml::{
    self, XmlError,
    constants::{
        ACCOUNTING_SUPPLIER, ADDITIONAL_REFERENCES, CAC_SIGNATURE, CAC_SIGNATURE_TEMPLATE,
        EXCLUDE_QR_REFERENCE, EXCLUDE_SIGNATURE, EXCLUDE_UBL_EXTENSIONS, QR_REFERENCE,
        QR_REFERENCE_TEMPLATE, UBL_EXTENSIONS, UBL_EXTENSIONS_TEMPLATE,
    },
};

// libxml's canonicalizer shares global state between calls.
static C14N_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Error)]
pub enum CanonicalizationError {
    #[error("document has no root element")]
    MissingRoot,

    #[error("failed to duplicate document")]
    Duplicate,

    #[error(transparent)]
    Xml(#[from] XmlError),
}

/// Brings an invoice into its signable shape and computes its digest.
#[derive(Debug, Default, Clone, Copy)]
pub struct InvoiceCanonicalizer;

impl InvoiceCanonicalizer {
    /// Parses `xml`, applies [`prepare`](Self::prepare) and returns the document with its digest.
    pub fn prepare_and_digest(&self, xml: &str) -> Result<(Document, String), CanonicalizationError> {
        let mut doc = xml::parse_document(xml)?;
        self.prepare(&mut doc)?;
        let digest = self.digest(&doc)?;
        Ok((doc, digest))
    }

    /// Removes any previous signature, QR reference and extension blocks, then injects fresh
    /// placeholders.
    ///
    /// Resulting order under the root: `ext:UBLExtensions` first; the QR reference after the
    /// last `cac:AdditionalDocumentReference` (or before `cac:AccountingSupplierParty`); then
    /// `cac:Signature` right after the QR reference.
    pub fn prepare(&self, doc: &mut Document) -> Result<(), CanonicalizationError> {
        {
            let ctx = xml::context(doc)?;
            for path in [UBL_EXTENSIONS, CAC_SIGNATURE, QR_REFERENCE] {
                for mut node in xml::nodes(&ctx, path)? {
                    node.unlink();
                }
            }
        }

        let mut root = doc
            .get_root_element()
            .ok_or(CanonicalizationError::MissingRoot)?;

        let mut extensions = xml::import_fragment(doc, UBL_EXTENSIONS_TEMPLATE)?;
        match xml::first_element_child(&root) {
            Some(mut first) => xml::insert_before(&mut first, &mut extensions)?,
            None => xml::append_child(&mut root, &mut extensions)?,
        }

        let mut qr_reference = xml::import_fragment(doc, QR_REFERENCE_TEMPLATE)?;
        {
            let ctx = xml::context(doc)?;
            let last_reference = xml::nodes(&ctx, ADDITIONAL_REFERENCES)?.pop();
            if let Some(mut last) = last_reference {
                xml::insert_after(&mut last, &mut qr_reference)?;
            } else if let Some(mut supplier) = xml::first_node(&ctx, ACCOUNTING_SUPPLIER)? {
                xml::insert_before(&mut supplier, &mut qr_reference)?;
            } else {
                xml::append_child(&mut root, &mut qr_reference)?;
            }
        }

        let mut signature = xml::import_fragment(doc, CAC_SIGNATURE_TEMPLATE)?;
        xml::insert_after(&mut qr_reference, &mut signature)?;
        Ok(())
    }

    /// Base64 SHA-256 of the C14N 1.1 form of `doc` without its signature-related blocks.
    ///
    /// Works on a copy; `doc` is left untouched.
    pub fn digest(&self, doc: &Document) -> Result<String, CanonicalizationError> {
        let canonical = self.canonical_form(doc)?;
        let digest = Base64::encode_string(&Sha256::digest(canonical.as_bytes()));
        debug!(%digest, "invoice digest");
        Ok(digest)
    }

    pub fn canonical_form(&self, doc: &Document) -> Result<String, CanonicalizationError> {
        let copy = doc.dup().map_err(|_| CanonicalizationError::Duplicate)?;
        {
            let ctx = xml::context(&copy)?;
            for path in [EXCLUDE_UBL_EXTENSIONS, EXCLUDE_QR_REFERENCE, EXCLUDE_SIGNATURE] {
                for mut node in xml::nodes(&ctx, path)? {
                    node.unlink();
                }
            }
        }

        let options = CanonicalizationOptions {
            mode: CanonicalizationMode::Canonical1_1,
            inclusive_ns_prefixes: vec![],
            with_comments: false,
        };
        let _guard = C14N_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        copy.canonicalize(options, None).map_err(|e| {
            CanonicalizationError::Xml(XmlError::Canonicalize {
                message: format!("{e:?}"),
            })
        })
    }
}
