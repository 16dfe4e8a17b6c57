pub(crate) const INVOICE_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2";
pub(crate) const CBC_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2";
pub(crate) const CAC_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2";
pub(crate) const EXT_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:CommonExtensionComponents-2";
pub(crate) const SIG_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:CommonSignatureComponents-2";
pub(crate) const SAC_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:SignatureAggregateComponents-2";
pub(crate) const SBC_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:SignatureBasicComponents-2";
pub(crate) const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
pub(crate) const XADES_NS: &str = "http://uri.etsi.org/01903/v1.3.2#";

/// Prefix/URI pairs registered on every XPath context.
pub(crate) const NAMESPACES: [(&str, &str); 9] = [
    ("ubl", INVOICE_NS),
    ("cbc", CBC_NS),
    ("cac", CAC_NS),
    ("ext", EXT_NS),
    ("sig", SIG_NS),
    ("sac", SAC_NS),
    ("sbc", SBC_NS),
    ("ds", DS_NS),
    ("xades", XADES_NS),
];

pub(crate) const UBL_EXTENSIONS_TEMPLATE: &str =
    include_str!("../../../assets/templates/ubl_extensions.xml");
pub(crate) const CAC_SIGNATURE_TEMPLATE: &str =
    include_str!("../../../assets/templates/cac_signature.xml");
pub(crate) const QR_REFERENCE_TEMPLATE: &str =
    include_str!("../../../assets/templates/qr_reference.xml");

pub(crate) const RSA_SHA256_URI: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
pub(crate) const ECDSA_SHA256_URI: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256";

// Regions removed from the invoice before hashing.
pub(crate) const EXCLUDE_UBL_EXTENSIONS: &str =
    "/*[local-name()='Invoice']//*[local-name()='UBLExtensions']";
pub(crate) const EXCLUDE_QR_REFERENCE: &str =
    "//*[local-name()='AdditionalDocumentReference'][cbc:ID[normalize-space(text())='QR']]";
pub(crate) const EXCLUDE_SIGNATURE: &str =
    "/*[local-name()='Invoice']//*[local-name()='Signature']";

pub(crate) const UBL_EXTENSIONS: &str = "/ubl:Invoice/ext:UBLExtensions";
pub(crate) const CAC_SIGNATURE: &str = "/ubl:Invoice/cac:Signature";
pub(crate) const ADDITIONAL_REFERENCES: &str = "/ubl:Invoice/cac:AdditionalDocumentReference";
pub(crate) const QR_REFERENCE: &str =
    "/ubl:Invoice/cac:AdditionalDocumentReference[cbc:ID[normalize-space(text())='QR']]";
pub(crate) const ACCOUNTING_SUPPLIER: &str = "/ubl:Invoice/cac:AccountingSupplierParty";

macro_rules! signature_path {
    ($($tail:tt)*) => {
        concat!(
            "/ubl:Invoice/ext:UBLExtensions/ext:UBLExtension/ext:ExtensionContent",
            "/sig:UBLDocumentSignatures/sac:SignatureInformation/ds:Signature",
            $($tail)*
        )
    };
}

macro_rules! signed_signature_properties_path {
    ($tail:literal) => {
        signature_path!(
            "/ds:Object/xades:QualifyingProperties/xades:SignedProperties",
            "/xades:SignedSignatureProperties",
            $tail
        )
    };
}

pub(crate) const SIGNED_PROPERTIES: &str =
    signature_path!("/ds:Object/xades:QualifyingProperties/xades:SignedProperties");
pub(crate) const SIGNING_TIME: &str = signed_signature_properties_path!("/xades:SigningTime");
pub(crate) const CERTIFICATE_DIGEST: &str = signed_signature_properties_path!(
    "/xades:SigningCertificate/xades:Cert/xades:CertDigest/ds:DigestValue"
);
pub(crate) const ISSUER_NAME: &str = signed_signature_properties_path!(
    "/xades:SigningCertificate/xades:Cert/xades:IssuerSerial/ds:X509IssuerName"
);
pub(crate) const SERIAL_NUMBER: &str = signed_signature_properties_path!(
    "/xades:SigningCertificate/xades:Cert/xades:IssuerSerial/ds:X509SerialNumber"
);
pub(crate) const SIGNATURE_VALUE: &str = signature_path!("/ds:SignatureValue");
pub(crate) const CERTIFICATE: &str = signature_path!("/ds:KeyInfo/ds:X509Data/ds:X509Certificate");
pub(crate) const SIGNATURE_METHOD: &str = signature_path!("/ds:SignedInfo/ds:SignatureMethod");
pub(crate) const SIGNED_PROPERTIES_DIGEST: &str = signature_path!(
    "/ds:SignedInfo/ds:Reference[@URI='#xadesSignedProperties']/ds:DigestValue"
);
pub(crate) const INVOICE_DIGEST: &str =
    signature_path!("/ds:SignedInfo/ds:Reference[@Id='invoiceSignedData']/ds:DigestValue");
pub(crate) const QR_VALUE: &str = "/ubl:Invoice/cac:AdditionalDocumentReference[cbc:ID[normalize-space(text())='QR']]/cac:Attachment/cbc:EmbeddedDocumentBinaryObject";

// Fields read for the QR payload and submissions.
pub(crate) const SELLER_NAME: &str = "/ubl:Invoice/cac:AccountingSupplierParty/cac:Party/cac:PartyLegalEntity/cbc:RegistrationName";
pub(crate) const SELLER_VAT: &str =
    "/ubl:Invoice/cac:AccountingSupplierParty/cac:Party/cac:PartyTaxScheme/cbc:CompanyID";
pub(crate) const PAYABLE_AMOUNT: &str = "/ubl:Invoice/cac:LegalMonetaryTotal/cbc:PayableAmount";
pub(crate) const TAX_AMOUNT: &str = "/ubl:Invoice/cac:TaxTotal/cbc:TaxAmount";
pub(crate) const ISSUE_DATE: &str = "/ubl:Invoice/cbc:IssueDate";
pub(crate) const ISSUE_TIME: &str = "/ubl:Invoice/cbc:IssueTime";
pub(crate) const INVOICE_UUID: &str = "/ubl:Invoice/cbc:UUID";
pub(crate) const INVOICE_TYPE_CODE: &str = "/ubl:Invoice/cbc:InvoiceTypeCode";
