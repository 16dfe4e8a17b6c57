//! CSR generation: key pair, PKCS#10 request and key export.
use crate::keys::{KeyAlgorithm, KeyError, KeyExport, PrivateKey};
use base64ct::{Base64, Encoding};
use bitflags::bitflags;
use const_oid::{AssociatedOid, ObjectIdentifier};
use der::{
    Any, Encode, EncodePem, Error as DerError, Length, Result as DerResult, Sequence, Writer,
    asn1::{OctetString, PrintableStringRef, SetOfVec, Utf8StringRef},
    pem::LineEnding,
};
use k256::ecdsa::DerSignature;
use rsa::{pkcs1v15, signature::Keypair};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::{debug, info};
use x509_cert::{
    attr::AttributeTypeAndValue,
    builder::{Builder, RequestBuilder},
    ext::{
        AsExtension, Extension,
        pkix::{SubjectAltName, SubjectKeyIdentifier, name::GeneralName},
    },
    name::{Name, RdnSequence, RelativeDistinguishedName},
    request::CertReq,
    spki::{DynSignatureAlgorithmIdentifier, EncodePublicKey, SignatureBitStringEncoding},
};
use zeroize::Zeroizing;

mod oid {
    use const_oid::ObjectIdentifier;

    pub const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
    pub const SURNAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.4");
    pub const SERIAL_NUMBER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.5");
    pub const COUNTRY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
    pub const ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
    pub const ORGANIZATION_UNIT: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");
    pub const TITLE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.12");
    pub const BUSINESS_CATEGORY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.15");
    pub const REGISTERED_ADDRESS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.26");
    pub const USER_ID: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("0.9.2342.19200300.100.1.1");
}

/// Errors that can occur while generating or validating CSRs.
#[derive(Debug, Error)]
pub enum CsrError {
    #[error("failed to read CSR config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse CSR config '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid CSR configuration: {}", messages.join("; "))]
    Validation { messages: Vec<String> },

    #[error("serial number '{value}' is not of the form TAX|SEQ|DEVICE")]
    InvalidSerialNumber { value: String },

    #[error("invalid certificate template OID '{value}'")]
    InvalidTemplateOid { value: String },

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("invalid value for subject attribute '{field}': {source}")]
    Attribute {
        field: &'static str,
        #[source]
        source: DerError,
    },

    #[error("failed to construct CSR request: {message}")]
    RequestBuild { message: String },

    #[error("failed adding CSR extension '{which}': {message}")]
    AddExtension {
        which: &'static str,
        message: String,
    },

    #[error("failed to build CSR: {message}")]
    CsrBuild { message: String },

    #[error("failed DER encoding for {context}: {source}")]
    DerEncode {
        context: &'static str,
        #[source]
        source: DerError,
    },
}

bitflags! {
    /// Invoice kinds a device is registered for, written as a `"11"` style flag string.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InvoiceTypes: u8 {
        /// Business to business (standard tax invoices).
        const B2B = 0b01;
        /// Business to consumer (simplified invoices).
        const B2C = 0b10;
    }
}

impl InvoiceTypes {
    /// Parses the positional flag string: char 0 is B2B, char 1 is B2C.
    pub fn from_flags(flags: &str) -> Option<Self> {
        let mut chars = flags.trim().chars();
        let (b2b, b2c) = (chars.next()?, chars.next()?);
        let mut out = InvoiceTypes::empty();
        for (c, flag) in [(b2b, InvoiceTypes::B2B), (b2c, InvoiceTypes::B2C)] {
            match c {
                '1' => out |= flag,
                '0' => {}
                _ => return None,
            }
        }
        Some(out)
    }
}

/// The `TAX|SEQ|DEVICE` composite carried in the subject serial number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialNumber {
    pub taxpayer: String,
    pub sequence: String,
    pub device: String,
}

impl FromStr for SerialNumber {
    type Err = CsrError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = value
            .split('|')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        match parts.as_slice() {
            [taxpayer, sequence, device] => Ok(SerialNumber {
                taxpayer: taxpayer.to_string(),
                sequence: sequence.to_string(),
                device: device.to_string(),
            }),
            _ => Err(CsrError::InvalidSerialNumber {
                value: value.to_string(),
            }),
        }
    }
}

/// Which subject layout and extensions the CA expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrProfile {
    /// Subject `CN, O, OU, SerialNumber, C`, Subject Key Identifier and an optional
    /// certificate-template (v2) extension.
    Standard,
    /// Subject `C, OU, O, CN`, identity attributes in a SubjectAltName directory name and a
    /// template-name extension.
    ElectronicSigning,
}

impl CsrProfile {
    pub fn for_algorithm(algorithm: KeyAlgorithm) -> Self {
        match algorithm {
            KeyAlgorithm::Rsa { .. } => CsrProfile::Standard,
            KeyAlgorithm::Secp256k1 => CsrProfile::ElectronicSigning,
        }
    }
}

/// Template identifier, major and minor version requested from the CA.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct CertificateTemplate {
    pub template_id: ObjectIdentifier,
    pub major_version: u32,
    pub minor_version: u32,
}

impl AssociatedOid for CertificateTemplate {
    const OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.21.7");
}

impl AsExtension for CertificateTemplate {
    fn critical(&self, _name: &Name, _exts: &[Extension]) -> bool {
        false
    }
}

/// Template name wrapped as a DisplayText UTF8String.
struct TemplateNameExtension(String);

impl AssociatedOid for TemplateNameExtension {
    const OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.20.2");
}

impl Encode for TemplateNameExtension {
    fn encoded_len(&self) -> DerResult<Length> {
        Utf8StringRef::new(&self.0)?.encoded_len()
    }
    fn encode(&self, encoder: &mut impl Writer) -> DerResult<()> {
        Utf8StringRef::new(&self.0)?.encode(encoder)
    }
}

impl AsExtension for TemplateNameExtension {
    fn critical(&self, _name: &Name, _exts: &[Extension]) -> bool {
        false
    }
}

/// User facing CSR config, keyed the way taxpayers fill it in.
#[derive(Debug, Clone, Deserialize)]
pub struct CsrConfigFile {
    #[serde(rename = "Common Name", default)]
    pub common_name: String,
    #[serde(rename = "organization", default)]
    pub organization: String,
    #[serde(rename = "organizationUnitName", default)]
    pub organization_unit: String,
    #[serde(rename = "SerialNumber", default)]
    pub serial_number: String,
    #[serde(rename = "Country (ISO2)", default)]
    pub country: String,
    #[serde(rename = "invoiceType", default)]
    pub invoice_type: String,
    #[serde(rename = "organizationIdentifier", default)]
    pub organization_identifier: String,
    #[serde(rename = "location", default)]
    pub location_address: String,
    #[serde(rename = "industry", default)]
    pub industry: String,
}

/// Platform side CSR settings (key size and template).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StandardCsrConfig {
    #[serde(rename = "keySize")]
    pub key_size: Option<usize>,
    #[serde(rename = "keyAlgorithm")]
    pub key_algorithm: Option<String>,
    #[serde(rename = "templateOid")]
    pub template_oid: Option<String>,
    pub major: Option<u32>,
    pub minor: Option<u32>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CsrError> {
    let raw = fs::read_to_string(path).map_err(|source| CsrError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CsrError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Everything needed to produce one key pair and its certificate request.
#[derive(Debug, Clone)]
pub struct KeyMaterialRequest {
    pub common_name: String,
    pub organization: String,
    pub organization_unit: String,
    pub serial_number: String,
    pub country: String,
    pub invoice_type: String,
    pub organization_identifier: String,
    pub location_address: String,
    pub industry: String,
    pub algorithm: KeyAlgorithm,
    pub profile: CsrProfile,
    pub template: Option<CertificateTemplate>,
    pub template_name: Option<String>,
}

impl KeyMaterialRequest {
    /// Assembles a request from the two JSON config files and validates it.
    pub fn from_config_files(
        user_config: &Path,
        standard_config: Option<&Path>,
        template_name: Option<&str>,
    ) -> Result<Self, CsrError> {
        let user: CsrConfigFile = read_json(user_config)?;
        let standard = match standard_config {
            Some(path) => read_json(path)?,
            None => StandardCsrConfig::default(),
        };
        Self::from_configs(user, standard, template_name)
    }

    pub fn from_configs(
        user: CsrConfigFile,
        standard: StandardCsrConfig,
        template_name: Option<&str>,
    ) -> Result<Self, CsrError> {
        let mut messages = Vec::new();

        let algorithm = match standard.key_algorithm.as_deref().map(str::to_ascii_lowercase) {
            None => KeyAlgorithm::Rsa {
                bits: standard.key_size.unwrap_or(crate::keys::DEFAULT_RSA_BITS),
            },
            Some(name) if name == "rsa" => KeyAlgorithm::Rsa {
                bits: standard.key_size.unwrap_or(crate::keys::DEFAULT_RSA_BITS),
            },
            Some(name) if name == "secp256k1" || name == "ec" => KeyAlgorithm::Secp256k1,
            Some(name) => {
                messages.push(format!("unsupported key algorithm '{name}'"));
                KeyAlgorithm::default()
            }
        };

        let template = match standard.template_oid.as_deref().map(str::trim) {
            Some(oid) if !oid.is_empty() => match ObjectIdentifier::new(oid) {
                Ok(template_id) => Some(CertificateTemplate {
                    template_id,
                    major_version: standard.major.unwrap_or(0),
                    minor_version: standard.minor.unwrap_or(0),
                }),
                Err(_) => {
                    messages.push(format!("templateOid '{oid}' is not a valid OID"));
                    None
                }
            },
            _ => None,
        };

        let request = KeyMaterialRequest {
            common_name: user.common_name.trim().to_string(),
            organization: user.organization.trim().to_string(),
            organization_unit: user.organization_unit.trim().to_string(),
            serial_number: user.serial_number.trim().to_string(),
            country: user.country.trim().to_uppercase(),
            invoice_type: user.invoice_type.trim().to_string(),
            organization_identifier: user.organization_identifier.trim().to_string(),
            location_address: user.location_address.trim().to_string(),
            industry: user.industry.trim().to_string(),
            algorithm,
            profile: CsrProfile::for_algorithm(algorithm),
            template,
            template_name: template_name.map(str::to_string),
        };

        messages.extend(request.validation_messages());
        if messages.is_empty() {
            Ok(request)
        } else {
            Err(CsrError::Validation { messages })
        }
    }

    /// Every problem with the request; empty when a subject can be formed.
    pub fn validation_messages(&self) -> Vec<String> {
        let mut messages = Vec::new();
        let mut required = vec![
            ("Common Name", &self.common_name),
            ("organization", &self.organization),
            ("organizationUnitName", &self.organization_unit),
            ("SerialNumber", &self.serial_number),
            ("Country (ISO2)", &self.country),
        ];
        if self.profile == CsrProfile::ElectronicSigning {
            required.extend([
                ("invoiceType", &self.invoice_type),
                ("organizationIdentifier", &self.organization_identifier),
                ("location", &self.location_address),
                ("industry", &self.industry),
            ]);
        }
        for (name, value) in required {
            if value.trim().is_empty() {
                messages.push(format!("{name} is required"));
            }
        }

        if !self.country.is_empty() && isocountry::CountryCode::for_alpha2(&self.country).is_err()
        {
            messages.push(format!(
                "Country (ISO2) '{}' is not an ISO 3166 alpha-2 code",
                self.country
            ));
        }
        if !self.serial_number.is_empty() && self.serial_parts().is_err() {
            messages.push(format!(
                "SerialNumber '{}' is not of the form TAX|SEQ|DEVICE",
                self.serial_number
            ));
        }
        if !self.invoice_type.is_empty() && InvoiceTypes::from_flags(&self.invoice_type).is_none()
        {
            messages.push(format!(
                "invoiceType '{}' must be two 0/1 flags",
                self.invoice_type
            ));
        }
        if let KeyAlgorithm::Rsa { bits } = self.algorithm {
            if bits < crate::keys::MIN_RSA_BITS {
                messages.push(format!("keySize must be at least 1024, got {bits}"));
            }
        }
        messages
    }

    /// Splits the serial number into taxpayer, sequence and device.
    pub fn serial_parts(&self) -> Result<SerialNumber, CsrError> {
        self.serial_number.parse()
    }

    pub fn invoice_types(&self) -> InvoiceTypes {
        InvoiceTypes::from_flags(&self.invoice_type).unwrap_or(InvoiceTypes::empty())
    }

    fn subject(&self) -> Result<Name, CsrError> {
        let rdns = match self.profile {
            CsrProfile::Standard => vec![
                rdn("CN", oid::COMMON_NAME, &self.common_name)?,
                rdn("O", oid::ORGANIZATION, &self.organization)?,
                rdn("OU", oid::ORGANIZATION_UNIT, &self.organization_unit)?,
                rdn("SerialNumber", oid::SERIAL_NUMBER, &self.serial_number)?,
                rdn("C", oid::COUNTRY, &self.country)?,
            ],
            CsrProfile::ElectronicSigning => vec![
                rdn("C", oid::COUNTRY, &self.country)?,
                rdn("OU", oid::ORGANIZATION_UNIT, &self.organization_unit)?,
                rdn("O", oid::ORGANIZATION, &self.organization)?,
                rdn("CN", oid::COMMON_NAME, &self.common_name)?,
            ],
        };
        Ok(RdnSequence(rdns))
    }

    fn san_extension(&self) -> Result<SubjectAltName, CsrError> {
        let name = RdnSequence(vec![
            rdn("SN", oid::SURNAME, &self.serial_number)?,
            rdn("UID", oid::USER_ID, &self.organization_identifier)?,
            rdn("title", oid::TITLE, &self.invoice_type)?,
            rdn("registeredAddress", oid::REGISTERED_ADDRESS, &self.location_address)?,
            rdn("businessCategory", oid::BUSINESS_CATEGORY, &self.industry)?,
        ]);
        Ok(SubjectAltName::from(vec![GeneralName::DirectoryName(name)]))
    }
}

/// One attribute per RDN. `C` and `SerialNumber` prefer PrintableString.
fn rdn(
    field: &'static str,
    oid: ObjectIdentifier,
    value: &str,
) -> Result<RelativeDistinguishedName, CsrError> {
    let attr_err = |source| CsrError::Attribute { field, source };
    let prefers_printable = oid == oid::COUNTRY || oid == oid::SERIAL_NUMBER;
    let value = match PrintableStringRef::new(value) {
        Ok(printable) if prefers_printable => Any::encode_from(&printable),
        _ => Any::encode_from(&Utf8StringRef::new(value).map_err(attr_err)?),
    }
    .map_err(attr_err)?;
    let set = SetOfVec::try_from(vec![AttributeTypeAndValue { oid, value }]).map_err(attr_err)?;
    Ok(RelativeDistinguishedName(set))
}

/// Output of one generation run. Private key text is wiped on drop.
pub struct KeyMaterialResult {
    pub csr_der: Vec<u8>,
    pub private_key_pem: Zeroizing<String>,
    pub public_key_pem: String,
}

impl std::fmt::Debug for KeyMaterialResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterialResult")
            .field("csr_der_len", &self.csr_der.len())
            .finish_non_exhaustive()
    }
}

impl KeyMaterialResult {
    /// Base64 of the DER request, the form the CA expects in `{"csr": ...}`.
    pub fn csr_base64(&self) -> String {
        Base64::encode_string(&self.csr_der)
    }

    pub fn csr_pem(&self) -> Result<String, CsrError> {
        let req = <CertReq as der::Decode>::from_der(&self.csr_der).map_err(|source| {
            CsrError::DerEncode {
                context: "certificate request",
                source,
            }
        })?;
        req.to_pem(LineEnding::LF)
            .map_err(|source| CsrError::DerEncode {
                context: "certificate request (PEM)",
                source,
            })
    }
}

/// Produces key pairs and signed PKCS#10 requests.
///
/// # Examples
/// ```rust,no_run
/// use fotara_core::csr::{KeyMaterialGenerator, KeyMaterialRequest};
/// use fotara_core::keys::KeyExport;
///
/// let request = KeyMaterialRequest::from_config_files("config.json".as_ref(), None, None)?;
/// let result = KeyMaterialGenerator::new(KeyExport::Plain).generate(&request)?;
/// println!("{}", result.csr_base64());
/// # Ok::<(), fotara_core::csr::CsrError>(())
/// ```
#[derive(Debug, Clone)]
pub struct KeyMaterialGenerator {
    export: KeyExport,
}

impl KeyMaterialGenerator {
    pub fn new(export: KeyExport) -> Self {
        Self { export }
    }

    /// Generates a fresh key pair and builds everything from it. Nothing is returned unless
    /// every step succeeded.
    pub fn generate(&self, request: &KeyMaterialRequest) -> Result<KeyMaterialResult, CsrError> {
        if let KeyExport::Encrypted { password } = &self.export {
            if password.trim().is_empty() {
                return Err(KeyError::BlankPassword.into());
            }
        }
        let messages = request.validation_messages();
        if !messages.is_empty() {
            return Err(CsrError::Validation { messages });
        }

        let key = PrivateKey::generate(request.algorithm)?;
        let result = self.generate_with_key(request, &key)?;
        info!(
            algorithm = key.algorithm_name(),
            common_name = %request.common_name,
            "generated key material"
        );
        Ok(result)
    }

    /// Same as [`generate`](Self::generate) but for an existing key.
    pub fn generate_with_key(
        &self,
        request: &KeyMaterialRequest,
        key: &PrivateKey,
    ) -> Result<KeyMaterialResult, CsrError> {
        let csr = self.build_request(request, key)?;
        let csr_der = csr.to_der().map_err(|source| CsrError::DerEncode {
            context: "certificate request",
            source,
        })?;
        let private_key_pem = key.export_pem(&self.export)?;
        let public_key_pem = key.public_key().to_pem()?;
        Ok(KeyMaterialResult {
            csr_der,
            private_key_pem,
            public_key_pem,
        })
    }

    pub fn build_request(
        &self,
        request: &KeyMaterialRequest,
        key: &PrivateKey,
    ) -> Result<CertReq, CsrError> {
        let subject = request.subject()?;
        match key {
            PrivateKey::Rsa(rsa_key) => {
                let signer = pkcs1v15::SigningKey::<Sha256>::new(rsa_key.clone());
                build_signed::<_, pkcs1v15::Signature>(request, subject, &signer)
            }
            PrivateKey::Secp256k1(ec_key) => {
                build_signed::<_, DerSignature>(request, subject, ec_key)
            }
        }
    }
}

fn build_signed<S, Sig>(
    request: &KeyMaterialRequest,
    subject: Name,
    signer: &S,
) -> Result<CertReq, CsrError>
where
    S: Keypair + DynSignatureAlgorithmIdentifier + rsa::signature::Signer<Sig>,
    S::VerifyingKey: EncodePublicKey,
    Sig: SignatureBitStringEncoding,
{
    let mut builder = RequestBuilder::new(subject, signer).map_err(|e| CsrError::RequestBuild {
        message: e.to_string(),
    })?;

    match request.profile {
        CsrProfile::Standard => {
            let spki = signer
                .verifying_key()
                .to_public_key_der()
                .map_err(KeyError::from)?;
            let digest = Sha1::digest(spki.as_bytes());
            debug!(ski = %Base64::encode_string(&digest), "subject key identifier");
            let ski = SubjectKeyIdentifier(OctetString::new(digest.to_vec()).map_err(
                |source| CsrError::DerEncode {
                    context: "subject key identifier",
                    source,
                },
            )?);
            add_extension(&mut builder, &ski, "SubjectKeyIdentifier")?;
            if let Some(template) = &request.template {
                add_extension(&mut builder, template, "CertificateTemplate")?;
            }
        }
        CsrProfile::ElectronicSigning => {
            if let Some(name) = request.template_name.as_deref().filter(|n| !n.is_empty()) {
                let ext = TemplateNameExtension(name.to_string());
                add_extension(&mut builder, &ext, "TemplateName")?;
            }
            let san = request.san_extension()?;
            add_extension(&mut builder, &san, "SubjectAltName")?;
        }
    }

    builder.build::<Sig>().map_err(|e| CsrError::CsrBuild {
        message: e.to_string(),
    })
}

fn add_extension<S, E>(
    builder: &mut RequestBuilder<'_, S>,
    extension: &E,
    which: &'static str,
) -> Result<(), CsrError>
where
    S: Keypair + DynSignatureAlgorithmIdentifier,
    S::VerifyingKey: EncodePublicKey,
    E: AsExtension,
{
    builder
        .add_extension(extension)
        .map_err(|e| CsrError::AddExtension {
            which,
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use der::Decode;

    fn user_config() -> CsrConfigFile {
        CsrConfigFile {
            common_name: "Acme Trading".into(),
            organization: "Acme".into(),
            organization_unit: "Amman Branch".into(),
            serial_number: "12345678|1|DEV-001".into(),
            country: "jo".into(),
            invoice_type: "11".into(),
            organization_identifier: "12345678".into(),
            location_address: "Amman".into(),
            industry: "Retail".into(),
        }
    }

    #[test]
    fn invoice_type_flags_are_positional() {
        assert_eq!(InvoiceTypes::from_flags("10"), Some(InvoiceTypes::B2B));
        assert_eq!(InvoiceTypes::from_flags("01"), Some(InvoiceTypes::B2C));
        assert_eq!(
            InvoiceTypes::from_flags("11"),
            Some(InvoiceTypes::B2B | InvoiceTypes::B2C)
        );
        assert_eq!(InvoiceTypes::from_flags("1"), None);
        assert_eq!(InvoiceTypes::from_flags("1x"), None);
    }

    #[test]
    fn serial_number_needs_three_fields() {
        let serial: SerialNumber = "111|2|DEV".parse().unwrap();
        assert_eq!(serial.taxpayer, "111");
        assert_eq!(serial.device, "DEV");
        assert!("111|DEV".parse::<SerialNumber>().is_err());
        assert!("111||DEV".parse::<SerialNumber>().is_err());
        assert!("1|2|3|4".parse::<SerialNumber>().is_err());
    }

    #[test]
    fn validation_collects_every_message() {
        let mut user = user_config();
        user.common_name = " ".into();
        user.country = "XX".into();
        let standard = StandardCsrConfig {
            key_size: Some(512),
            ..Default::default()
        };
        let err = KeyMaterialRequest::from_configs(user, standard, None).unwrap_err();
        let CsrError::Validation { messages } = err else {
            panic!("expected validation error");
        };
        assert_eq!(messages.len(), 3, "{messages:?}");
    }

    #[test]
    fn template_oid_is_parsed() {
        let standard = StandardCsrConfig {
            key_size: Some(1024),
            template_oid: Some("1.3.6.1.4.1.311.21.8.1.2".into()),
            major: Some(100),
            minor: Some(2),
            ..Default::default()
        };
        let request = KeyMaterialRequest::from_configs(user_config(), standard, None).unwrap();
        let template = request.template.unwrap();
        assert_eq!(template.major_version, 100);
        assert_eq!(template.minor_version, 2);

        let der = template.to_der().unwrap();
        let decoded = CertificateTemplate::from_der(&der).unwrap();
        assert_eq!(decoded.template_id.to_string(), "1.3.6.1.4.1.311.21.8.1.2");
    }

    #[test]
    fn standard_subject_order_is_fixed() {
        let standard = StandardCsrConfig {
            key_size: Some(1024),
            ..Default::default()
        };
        let request = KeyMaterialRequest::from_configs(user_config(), standard, None).unwrap();
        let subject = request.subject().unwrap();
        let oids: Vec<_> = subject
            .0
            .iter()
            .map(|rdn| rdn.0.iter().next().unwrap().oid)
            .collect();
        assert_eq!(
            oids,
            vec![
                oid::COMMON_NAME,
                oid::ORGANIZATION,
                oid::ORGANIZATION_UNIT,
                oid::SERIAL_NUMBER,
                oid::COUNTRY
            ]
        );
    }
}
