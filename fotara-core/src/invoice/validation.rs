use std::path::Path;

use base64ct::{Base64, Encoding};
use libxml::{
    error::StructuredError,
    schemas::{SchemaParserContext, SchemaValidationContext},
    tree::Document,
};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::{
    certificate::{SigningCertificate, hex_hash_to_base64},
    config::Config,
    invoice::{
        canonical::InvoiceCanonicalizer,
        slots::{SignatureSlots, Slot},
        xml::{
            self,
            constants::{INVOICE_NS, INVOICE_UUID, ISSUE_DATE, SELLER_NAME, SELLER_VAT},
        },
    },
};

/// Findings of a local check. Empty `errors` means the document passed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Whether the document carried an embedded signature.
    pub signed: bool,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }
}

/// Structural and signature checks on a single invoice. Business rules are not checked.
#[derive(Debug, Clone, Default)]
pub struct InvoiceValidator {
    xsd_path: Option<std::path::PathBuf>,
}

impl InvoiceValidator {
    pub fn new(config: &Config) -> Self {
        Self {
            xsd_path: config.xsd_path().map(Path::to_path_buf),
        }
    }

    pub fn validate_file(&self, path: &Path) -> ValidationReport {
        match std::fs::read_to_string(path) {
            Ok(xml) => self.validate_str(&xml),
            Err(e) => ValidationReport {
                errors: vec![format!("failed to read {}: {e}", path.display())],
                ..Default::default()
            },
        }
    }

    pub fn validate_str(&self, xml: &str) -> ValidationReport {
        let mut report = ValidationReport::default();
        let doc = match xml::parse_document(xml) {
            Ok(doc) => doc,
            Err(e) => {
                report.error(e.to_string());
                return report;
            }
        };

        check_structure(&doc, &mut report);
        check_signature(&doc, &mut report);
        if let Some(xsd) = &self.xsd_path {
            check_schema(&doc, xsd, &mut report);
        }
        debug!(
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "validation finished"
        );
        report
    }
}

fn check_structure(doc: &Document, report: &mut ValidationReport) {
    let Some(root) = doc.get_root_element() else {
        report.error("document has no root element");
        return;
    };
    let namespace = root.get_namespace().map(|ns| ns.get_href());
    if root.get_name() != "Invoice" || namespace.as_deref() != Some(INVOICE_NS) {
        report.error(format!(
            "root element is {{{}}}{}, expected a UBL Invoice",
            namespace.unwrap_or_default(),
            root.get_name()
        ));
        return;
    }

    let ctx = match xml::context(doc) {
        Ok(ctx) => ctx,
        Err(e) => {
            report.error(e.to_string());
            return;
        }
    };
    for (path, what) in [
        (INVOICE_UUID, "cbc:UUID"),
        (ISSUE_DATE, "cbc:IssueDate"),
        (SELLER_NAME, "seller registration name"),
        (SELLER_VAT, "seller VAT number"),
    ] {
        match xml::text_value(&ctx, path) {
            Ok(Some(_)) => {}
            Ok(None) => report.error(format!("missing {what}")),
            Err(e) => report.error(e.to_string()),
        }
    }
}

fn check_signature(doc: &Document, report: &mut ValidationReport) {
    let slots = match SignatureSlots::new(doc) {
        Ok(slots) => slots,
        Err(e) => {
            report.error(e.to_string());
            return;
        }
    };
    if slots.node(Slot::SignatureValue).is_err() {
        report
            .warnings
            .push("document is not signed; signature checks skipped".into());
        return;
    }
    report.signed = true;

    let mut values = Vec::new();
    for slot in [
        Slot::SignatureValue,
        Slot::Certificate,
        Slot::SignedPropertiesDigest,
        Slot::InvoiceDigest,
        Slot::CertificateDigest,
    ] {
        match slots.get(slot) {
            Ok(Some(value)) => values.push(value),
            Ok(None) => report.error(format!("{slot} is empty")),
            Err(e) => report.error(e.to_string()),
        }
    }
    let [signature, certificate, signed_properties_digest, invoice_digest, certificate_digest] =
        values.as_slice()
    else {
        return;
    };

    match InvoiceCanonicalizer.digest(doc) {
        Ok(digest) if digest == *invoice_digest => {}
        Ok(digest) => report.error(format!(
            "invoice digest mismatch: embedded {invoice_digest}, computed {digest}"
        )),
        Err(e) => report.error(e.to_string()),
    }

    match slots.node(Slot::SignedProperties) {
        Ok(node) => {
            let computed = hex_hash_to_base64(&Sha256::digest(
                xml::serialize_subtree(&node).as_bytes(),
            ));
            if computed != *signed_properties_digest {
                report.error("signed properties digest mismatch");
            }
        }
        Err(e) => report.error(e.to_string()),
    }

    let certificate = match SigningCertificate::parse(certificate) {
        Ok(certificate) => certificate,
        Err(e) => {
            report.error(format!("embedded certificate: {e}"));
            return;
        }
    };
    if certificate.digest() != *certificate_digest {
        report.error("certificate digest mismatch");
    }

    let verified = Base64::decode_vec(invoice_digest)
        .ok()
        .zip(Base64::decode_vec(signature).ok())
        .map(|(hash, signature)| {
            certificate
                .public_key()
                .map_err(|e| e.to_string())
                .and_then(|key| key.verify(&hash, &signature).map_err(|e| e.to_string()))
        });
    match verified {
        Some(Ok(())) => {}
        Some(Err(e)) => report.error(format!("signature verification failed: {e}")),
        None => report.error("signature or invoice digest is not valid base64"),
    }
}

fn check_schema(doc: &Document, xsd: &Path, report: &mut ValidationReport) {
    // libxml reports a missing schema file as an opaque parser error
    if !xsd.exists() {
        report.error(format!("XSD not found: {}", xsd.display()));
        return;
    }
    let Some(xsd_path) = xsd.to_str() else {
        report.error("invalid XSD path");
        return;
    };
    let mut parser_ctx = SchemaParserContext::from_file(xsd_path);
    let mut validation_ctx = match SchemaValidationContext::from_parser(&mut parser_ctx) {
        Ok(ctx) => ctx,
        Err(errors) => {
            report.errors.extend(format_schema_errors(errors));
            return;
        }
    };
    if let Err(errors) = validation_ctx.validate_document(doc) {
        warn!(count = errors.len(), "schema validation failed");
        report.errors.extend(format_schema_errors(errors));
    }
}

fn format_schema_errors(errors: Vec<StructuredError>) -> Vec<String> {
    errors
        .into_iter()
        .map(|se| {
            se.message
                .clone()
                .map(|m| m.trim().to_string())
                .unwrap_or_else(|| format!("{se:?}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_root_is_reported() {
        let report = InvoiceValidator::default().validate_str("<CreditNote/>");
        assert!(!report.is_valid());
        assert!(report.errors[0].contains("expected a UBL Invoice"));
    }

    #[test]
    fn malformed_document_is_reported() {
        let report = InvoiceValidator::default().validate_str("<Invoice>");
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn unsigned_invoice_lists_missing_identity_nodes() {
        let report = InvoiceValidator::default().validate_str(
            r#"<Invoice xmlns="urn:oasis:names:specification:ubl:schema:xsd:Invoice-2"/>"#,
        );
        assert!(!report.signed);
        assert_eq!(report.errors.len(), 4);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn missing_xsd_is_an_error() {
        let validator = InvoiceValidator {
            xsd_path: Some("/nonexistent/UBL-Invoice-2.1.xsd".into()),
        };
        let report = validator.validate_str(
            r#"<Invoice xmlns="urn:oasis:names:specification:ubl:schema:xsd:Invoice-2"/>"#,
        );
        assert!(report.errors.iter().any(|e| e.starts_with("XSD not found")));
    }
}
