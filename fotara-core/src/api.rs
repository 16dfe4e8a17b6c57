//! Certificate authority HTTP client and response types.
use base64ct::{Base64, Encoding};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::marker::PhantomData;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::{
    certificate::{CertificateError, SigningCertificate},
    config::{Config, Endpoints},
    invoice::InvoiceSubmission,
};

/// Errors returned by the CA client.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid response (status {status}): {body}")]
    InvalidResponse { status: u16, body: String },
    #[error("unauthorized: {0:?}")]
    Unauthorized(UnauthorizedResponse),
    #[error("server error: {0:?}")]
    ServerError(ServerErrorResponse),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("client state error: {0}")]
    ClientState(String),
    #[error("invalid CSID certificate: {0}")]
    Certificate(#[from] CertificateError),
}

/// Marker trait for the scope of a certificate token, compliance or production.
pub trait TokenScope {}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
/// Compliance certificate scope.
pub struct Compliance;
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
/// Production certificate scope.
pub struct Production;
impl TokenScope for Compliance {}
impl TokenScope for Production {}

/// Response of both certificate requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateResponse {
    #[serde(rename = "requestID", default)]
    request_id: Option<u64>,
    #[serde(default)]
    disposition_message: Option<String>,
    #[serde(default)]
    binary_security_token: Option<String>,
    #[serde(default)]
    secret: Option<String>,
    #[serde(default)]
    errors: Vec<ValidationMessage>,
}

impl CertificateResponse {
    pub fn request_id(&self) -> Option<u64> {
        self.request_id
    }

    pub fn disposition_message(&self) -> Option<&str> {
        self.disposition_message.as_deref()
    }

    pub fn binary_security_token(&self) -> Option<&str> {
        self.binary_security_token.as_deref()
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    pub fn errors(&self) -> &[ValidationMessage] {
        &self.errors
    }

    /// Disposition equals `ISSUED`, ignoring case.
    pub fn is_issued(&self) -> bool {
        self.disposition_message
            .as_deref()
            .is_some_and(|d| d.trim().eq_ignore_ascii_case("ISSUED"))
    }

    /// The token decoded from base64: the certificate's own base64 text.
    pub fn certificate_text(&self) -> Result<String, ClientError> {
        let token = self.binary_security_token.as_deref().ok_or_else(|| {
            ClientError::ClientState("response carries no binarySecurityToken".into())
        })?;
        decode_token(token)
    }
}

/// Response of the compliance invoice check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceInvoiceResponse {
    #[serde(default)]
    validation_results: Option<ValidationResults>,
    #[serde(default)]
    error_messages: Vec<ValidationMessage>,
    #[serde(default)]
    warning_messages: Vec<ValidationMessage>,
    #[serde(default)]
    reporting_status: Option<String>,
    #[serde(default)]
    clearance_status: Option<String>,
}

impl ComplianceInvoiceResponse {
    pub fn validation_results(&self) -> Option<&ValidationResults> {
        self.validation_results.as_ref()
    }

    pub fn error_messages(&self) -> &[ValidationMessage] {
        &self.error_messages
    }

    pub fn warning_messages(&self) -> &[ValidationMessage] {
        &self.warning_messages
    }

    pub fn reporting_status(&self) -> Option<&str> {
        self.reporting_status.as_deref()
    }

    pub fn clearance_status(&self) -> Option<&str> {
        self.clearance_status.as_deref()
    }

    /// `REPORTED` or `CLEARED`, ignoring case.
    pub fn is_accepted(&self) -> bool {
        let matches = |value: Option<&str>, expected: &str| {
            value.is_some_and(|v| v.trim().eq_ignore_ascii_case(expected))
        };
        matches(self.reporting_status(), "REPORTED") || matches(self.clearance_status(), "CLEARED")
    }
}

/// Response of clearance and reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EInvoiceResponse {
    #[serde(default)]
    invoice_hash: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    cleared_invoice: Option<String>,
    #[serde(default)]
    warnings: Vec<ValidationMessage>,
    #[serde(default)]
    errors: Vec<ValidationMessage>,
}

impl EInvoiceResponse {
    pub fn invoice_hash(&self) -> Option<&str> {
        self.invoice_hash.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn cleared_invoice(&self) -> Option<&str> {
        self.cleared_invoice.as_deref()
    }

    pub fn warnings(&self) -> &[ValidationMessage] {
        &self.warnings
    }

    pub fn errors(&self) -> &[ValidationMessage] {
        &self.errors
    }
}

/// Validation results container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResults {
    #[serde(default)]
    info_messages: MessageList,
    #[serde(default)]
    warning_messages: Vec<ValidationMessage>,
    #[serde(default)]
    error_messages: Vec<ValidationMessage>,
    #[serde(default)]
    status: Option<String>,
}

impl ValidationResults {
    pub fn info_messages(&self) -> &MessageList {
        &self.info_messages
    }

    pub fn warning_messages(&self) -> &[ValidationMessage] {
        &self.warning_messages
    }

    pub fn error_messages(&self) -> &[ValidationMessage] {
        &self.error_messages
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}

/// Validation message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidationMessage {
    #[serde(rename = "type", default)]
    message_type: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl ValidationMessage {
    pub fn message_type(&self) -> Option<&str> {
        self.message_type.as_deref()
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
#[derive(Default)]
/// Message list returned by the API, either a single object or an array.
pub enum MessageList {
    One(ValidationMessage),
    Many(Vec<ValidationMessage>),
    #[default]
    Empty,
}

/// Unauthorized response body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnauthorizedResponse {
    timestamp: Option<i64>,
    status: Option<u16>,
    error: Option<String>,
    message: Option<String>,
}

impl UnauthorizedResponse {
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Server error response body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerErrorResponse {
    category: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

impl ServerErrorResponse {
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Token used for Basic auth (`token:token`) on every authenticated call.
///
/// # Examples
/// ```rust
/// use fotara_core::api::{CsidCredentials, Production};
///
/// let creds = CsidCredentials::<Production>::new(Some(42), "TUlJQi4uLg==");
/// assert_eq!(creds.certificate_text()?, "MIIB...");
///
/// assert!(CsidCredentials::<Production>::from_certificate_text("").is_err());
/// # Ok::<(), fotara_core::api::ClientError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CsidCredentials<T> {
    request_id: Option<u64>,
    binary_security_token: String,
    _marker: PhantomData<T>,
}

impl<T: TokenScope> CsidCredentials<T> {
    pub fn new(request_id: Option<u64>, binary_security_token: impl Into<String>) -> Self {
        Self {
            request_id,
            binary_security_token: binary_security_token.into(),
            _marker: PhantomData,
        }
    }

    pub fn from_response(response: &CertificateResponse) -> Result<Self, ClientError> {
        let token = response.binary_security_token().ok_or_else(|| {
            ClientError::ClientState("response carries no binarySecurityToken".into())
        })?;
        Ok(Self::new(response.request_id(), token))
    }

    /// Builds the token from a stored certificate: base64 of its unwrapped base64 DER.
    pub fn from_certificate_text(certificate: &str) -> Result<Self, ClientError> {
        let certificate = SigningCertificate::parse(certificate)?;
        Ok(Self::new(
            None,
            Base64::encode_string(certificate.base64_text().as_bytes()),
        ))
    }

    pub fn request_id(&self) -> Option<u64> {
        self.request_id
    }

    pub fn binary_security_token(&self) -> &str {
        &self.binary_security_token
    }

    pub fn certificate_text(&self) -> Result<String, ClientError> {
        decode_token(&self.binary_security_token)
    }
}

fn decode_token(token: &str) -> Result<String, ClientError> {
    let bytes = Base64::decode_vec(token.trim())
        .map_err(|_| ClientError::ClientState("binarySecurityToken is not base64".into()))?;
    String::from_utf8(bytes)
        .map_err(|_| ClientError::ClientState("binarySecurityToken is not UTF-8".into()))
}

/// Remote certificate authority operations used by the CLI and the onboarding workflow.
pub trait CaClient {
    fn request_compliance_certificate(
        &self,
        otp: &str,
        csr_base64: &str,
    ) -> Result<CertificateResponse, ClientError>;

    fn submit_compliance_invoice(
        &self,
        credentials: &CsidCredentials<Compliance>,
        invoice: &InvoiceSubmission,
    ) -> Result<ComplianceInvoiceResponse, ClientError>;

    fn request_production_certificate(
        &self,
        credentials: &CsidCredentials<Compliance>,
        request_id: u64,
    ) -> Result<CertificateResponse, ClientError>;

    fn submit_clearance_invoice(
        &self,
        credentials: &CsidCredentials<Production>,
        invoice: &InvoiceSubmission,
    ) -> Result<EInvoiceResponse, ClientError>;

    fn report_invoice(
        &self,
        credentials: &CsidCredentials<Production>,
        invoice: &InvoiceSubmission,
    ) -> Result<EInvoiceResponse, ClientError>;
}

/// Blocking HTTP implementation of [`CaClient`].
///
/// # Examples
/// ```rust,no_run
/// use fotara_core::api::FotaraClient;
/// use fotara_core::config::Config;
///
/// let client = FotaraClient::new(&Config::default())?;
/// # let _ = client;
/// # Ok::<(), fotara_core::api::ClientError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FotaraClient {
    http: Client,
    endpoints: Endpoints,
}

impl FotaraClient {
    /// # Errors
    /// Returns [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self {
            http,
            endpoints: config.endpoints().clone(),
        })
    }

    fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> RequestBuilder {
        self.http
            .post(url)
            .header("Accept-Language", "en")
            .header("Accept", "application/json")
            .header("Accept-Version", "V2")
            .header("Content-Type", "application/json")
            .json(body)
    }

    fn post_authenticated<T: TokenScope, B: Serialize + ?Sized>(
        &self,
        url: &str,
        credentials: &CsidCredentials<T>,
        body: &B,
    ) -> RequestBuilder {
        let token = credentials.binary_security_token();
        self.post(url, body).basic_auth(token, Some(token))
    }
}

/// Turns a response into `T`; 4xx bodies are decoded too when `decode_client_errors` is set.
fn decode<T: DeserializeOwned>(
    response: Response,
    decode_client_errors: bool,
) -> Result<T, ClientError> {
    let status = response.status();
    let body = response.text()?;
    info!(status = status.as_u16(), "CA responded");

    if status.is_success() || (decode_client_errors && status.is_client_error()) {
        return serde_json::from_str(&body).map_err(|_| ClientError::InvalidResponse {
            status: status.as_u16(),
            body,
        });
    }

    if status.as_u16() == 401 {
        let parsed = serde_json::from_str::<UnauthorizedResponse>(&body).unwrap_or_else(|_| {
            UnauthorizedResponse {
                timestamp: None,
                status: Some(401),
                error: Some("Unauthorized".into()),
                message: Some(body.clone()),
            }
        });
        return Err(ClientError::Unauthorized(parsed));
    }

    if status.is_server_error() {
        let parsed = serde_json::from_str::<ServerErrorResponse>(&body).unwrap_or_else(|_| {
            ServerErrorResponse {
                category: None,
                code: Some("ServerError".into()),
                message: Some(body.clone()),
            }
        });
        return Err(ClientError::ServerError(parsed));
    }

    warn!(status = status.as_u16(), %body, "unexpected CA response");
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}

impl CaClient for FotaraClient {
    #[instrument(skip_all)]
    fn request_compliance_certificate(
        &self,
        otp: &str,
        csr_base64: &str,
    ) -> Result<CertificateResponse, ClientError> {
        let body = serde_json::json!({ "csr": csr_base64 });
        let response = self
            .post(&self.endpoints.compliance_csr, &body)
            .header("OTP", otp)
            .send()?;
        let parsed: CertificateResponse = decode(response, false)?;
        info!(
            request_id = ?parsed.request_id(),
            disposition = parsed.disposition_message().unwrap_or_default(),
            "compliance certificate response"
        );
        Ok(parsed)
    }

    #[instrument(skip_all, fields(uuid = %invoice.uuid))]
    fn submit_compliance_invoice(
        &self,
        credentials: &CsidCredentials<Compliance>,
        invoice: &InvoiceSubmission,
    ) -> Result<ComplianceInvoiceResponse, ClientError> {
        let response = self
            .post_authenticated(&self.endpoints.compliance_invoice, credentials, invoice)
            .send()?;
        decode(response, true)
    }

    #[instrument(skip(self, credentials))]
    fn request_production_certificate(
        &self,
        credentials: &CsidCredentials<Compliance>,
        request_id: u64,
    ) -> Result<CertificateResponse, ClientError> {
        let body = serde_json::json!({ "compliance_request_id": request_id.to_string() });
        let response = self
            .post_authenticated(&self.endpoints.production_certificate, credentials, &body)
            .send()?;
        let parsed: CertificateResponse = decode(response, false)?;
        info!(
            disposition = parsed.disposition_message().unwrap_or_default(),
            "production certificate response"
        );
        Ok(parsed)
    }

    #[instrument(skip_all, fields(uuid = %invoice.uuid))]
    fn submit_clearance_invoice(
        &self,
        credentials: &CsidCredentials<Production>,
        invoice: &InvoiceSubmission,
    ) -> Result<EInvoiceResponse, ClientError> {
        let response = self
            .post_authenticated(&self.endpoints.production_invoice, credentials, invoice)
            .send()?;
        decode(response, false)
    }

    #[instrument(skip_all, fields(uuid = %invoice.uuid))]
    fn report_invoice(
        &self,
        credentials: &CsidCredentials<Production>,
        invoice: &InvoiceSubmission,
    ) -> Result<EInvoiceResponse, ClientError> {
        let response = self
            .post_authenticated(&self.endpoints.production_report, credentials, invoice)
            .send()?;
        decode(response, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn try_start_server() -> Option<MockServer> {
        std::panic::catch_unwind(MockServer::start).ok()
    }

    fn client_for(server: &MockServer) -> FotaraClient {
        let config = Config::default().with_endpoints(Endpoints::with_base(&server.base_url()));
        FotaraClient::new(&config).expect("client")
    }

    fn submission() -> InvoiceSubmission {
        InvoiceSubmission {
            invoice_hash: "aGFzaA==".into(),
            uuid: "3cf5ee18-ee25-44ea-a444-2c37ba7f28be".into(),
            invoice: "PEludm9pY2UvPg==".into(),
        }
    }

    fn basic(token: &str) -> String {
        format!(
            "Basic {}",
            Base64::encode_string(format!("{token}:{token}").as_bytes())
        )
    }

    #[test]
    fn deserialize_compliance_response_with_info_object() {
        let body = r#"{
          "validationResults": {
            "infoMessages": {"type": "INFO", "code": "XSD_VALID", "category": "XSD validation", "message": "Complied with UBL 2.1 standards", "status": "PASS"},
            "warningMessages": [],
            "errorMessages": [],
            "status": "PASS"
          },
          "reportingStatus": "REPORTED",
          "clearanceStatus": null
        }"#;
        let parsed: ComplianceInvoiceResponse = serde_json::from_str(body).expect("parse");
        assert!(parsed.is_accepted());
        let results = parsed.validation_results().expect("results");
        assert!(matches!(results.info_messages(), MessageList::One(_)));
        assert_eq!(results.status(), Some("PASS"));
    }

    #[test]
    fn acceptance_is_case_insensitive_and_covers_clearance() {
        let cleared: ComplianceInvoiceResponse =
            serde_json::from_str(r#"{"clearanceStatus": "cleared"}"#).unwrap();
        assert!(cleared.is_accepted());
        let rejected: ComplianceInvoiceResponse =
            serde_json::from_str(r#"{"reportingStatus": "NOT_REPORTED"}"#).unwrap();
        assert!(!rejected.is_accepted());
        assert!(!ComplianceInvoiceResponse::default().is_accepted());
    }

    #[test]
    fn certificate_response_decodes_token() {
        let parsed: CertificateResponse = serde_json::from_str(
            r#"{"requestID": 1234567890123, "dispositionMessage": "issued", "binarySecurityToken": "TUlJQi4uLg==", "secret": "s"}"#,
        )
        .unwrap();
        assert!(parsed.is_issued());
        assert_eq!(parsed.request_id(), Some(1234567890123));
        assert_eq!(parsed.certificate_text().unwrap(), "MIIB...");
    }

    fn self_signed_der() -> Vec<u8> {
        use der::Encode;
        use std::{str::FromStr, time::Duration};
        use x509_cert::{
            builder::{Builder, CertificateBuilder, Profile},
            name::Name,
            serial_number::SerialNumber,
            spki::{EncodePublicKey, SubjectPublicKeyInfoOwned},
            time::Validity,
        };

        let key = k256::ecdsa::SigningKey::from_slice(&[0x33; 32]).unwrap();
        let spki_der = key.verifying_key().to_public_key_der().unwrap();
        let builder = CertificateBuilder::new(
            Profile::Root,
            SerialNumber::from(77u32),
            Validity::from_now(Duration::from_secs(3600)).unwrap(),
            Name::from_str("CN=CSID,O=Fotara,C=JO").unwrap(),
            SubjectPublicKeyInfoOwned::try_from(spki_der.as_bytes()).unwrap(),
            &key,
        )
        .unwrap();
        let cert = builder.build::<k256::ecdsa::DerSignature>().unwrap();
        cert.to_der().unwrap()
    }

    #[test]
    fn credentials_from_pem_use_the_unwrapped_base64() {
        let der = self_signed_der();
        let body = Base64::encode_string(&der);
        let wrapped: Vec<&str> = body
            .as_bytes()
            .chunks(64)
            .map(|line| std::str::from_utf8(line).unwrap())
            .collect();
        let pem = format!(
            "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----\n",
            wrapped.join("\n")
        );

        let creds = CsidCredentials::<Production>::from_certificate_text(&pem).unwrap();
        assert_eq!(creds.certificate_text().unwrap(), body);
        assert_eq!(creds.request_id(), None);
    }

    #[test]
    fn credentials_need_a_certificate() {
        assert!(matches!(
            CsidCredentials::<Production>::from_certificate_text("  \n"),
            Err(ClientError::Certificate(CertificateError::Empty))
        ));

        let key_only = "-----BEGIN PUBLIC KEY-----\nQUJD\n-----END PUBLIC KEY-----\n";
        assert!(matches!(
            CsidCredentials::<Compliance>::from_certificate_text(key_only),
            Err(ClientError::Certificate(CertificateError::Undecodable { .. }))
        ));
    }

    #[test]
    fn compliance_csr_sends_otp_and_csr() {
        let Some(server) = try_start_server() else {
            return;
        };
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/compliance/csr")
                .header("OTP", "123456")
                .header("Accept-Version", "V2")
                .header("Accept-Language", "en")
                .json_body(serde_json::json!({ "csr": "Q1NS" }));
            then.status(200).json_body(serde_json::json!({
                "requestID": 42,
                "dispositionMessage": "ISSUED",
                "binarySecurityToken": "VE9L",
                "secret": "secret"
            }));
        });

        let response = client_for(&server)
            .request_compliance_certificate("123456", "Q1NS")
            .expect("response");
        mock.assert();
        assert_eq!(response.request_id(), Some(42));
        assert!(response.is_issued());
    }

    #[test]
    fn compliance_invoice_uses_basic_auth_and_decodes_rejections() {
        let Some(server) = try_start_server() else {
            return;
        };
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/compliance/invoice")
                .header("Authorization", basic("VE9L"))
                .json_body(serde_json::json!({
                    "invoiceHash": "aGFzaA==",
                    "uuid": "3cf5ee18-ee25-44ea-a444-2c37ba7f28be",
                    "invoice": "PEludm9pY2UvPg=="
                }));
            then.status(400).json_body(serde_json::json!({
                "validationResults": {"status": "ERROR", "errorMessages": [{"code": "BR-01", "message": "bad"}]},
                "reportingStatus": "NOT_REPORTED"
            }));
        });

        let creds = CsidCredentials::<Compliance>::new(Some(42), "VE9L");
        let response = client_for(&server)
            .submit_compliance_invoice(&creds, &submission())
            .expect("400 bodies are decoded");
        mock.assert();
        assert!(!response.is_accepted());
        assert_eq!(
            response.validation_results().unwrap().error_messages()[0].code(),
            Some("BR-01")
        );
    }

    #[test]
    fn production_certificate_sends_request_id_as_string() {
        let Some(server) = try_start_server() else {
            return;
        };
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/prod/certificate")
                .json_body(serde_json::json!({ "compliance_request_id": "42" }));
            then.status(200).json_body(serde_json::json!({
                "requestID": 43,
                "dispositionMessage": "ISSUED",
                "binarySecurityToken": "UFJPRA=="
            }));
        });

        let creds = CsidCredentials::<Compliance>::new(Some(42), "VE9L");
        let response = client_for(&server)
            .request_production_certificate(&creds, 42)
            .expect("response");
        mock.assert();
        assert_eq!(response.certificate_text().unwrap(), "PROD");
    }

    #[test]
    fn clearance_and_reporting_use_their_endpoints() {
        let Some(server) = try_start_server() else {
            return;
        };
        let clear = server.mock(|when, then| {
            when.method(POST).path("/v1/prod/invoice");
            then.status(200)
                .json_body(serde_json::json!({"status": "CLEARED", "clearedInvoice": "PA=="}));
        });
        let report = server.mock(|when, then| {
            when.method(POST).path("/v1/prod/report");
            then.status(202).json_body(serde_json::json!({"status": "REPORTED"}));
        });

        let client = client_for(&server);
        let creds = CsidCredentials::<Production>::new(None, "UFJPRA==");
        let cleared = client
            .submit_clearance_invoice(&creds, &submission())
            .expect("clearance");
        let reported = client.report_invoice(&creds, &submission()).expect("report");
        clear.assert();
        report.assert();
        assert_eq!(cleared.cleared_invoice(), Some("PA=="));
        assert_eq!(reported.status(), Some("REPORTED"));
    }

    #[test]
    fn error_statuses_are_mapped() {
        let Some(server) = try_start_server() else {
            return;
        };
        server.mock(|when, then| {
            when.method(POST).path("/v1/prod/invoice");
            then.status(401)
                .json_body(serde_json::json!({"status": 401, "error": "Unauthorized", "message": "nope"}));
        });
        server.mock(|when, then| {
            when.method(POST).path("/v1/prod/report");
            then.status(500).body("boom");
        });
        server.mock(|when, then| {
            when.method(POST).path("/v1/compliance/csr");
            then.status(400).body("bad otp");
        });

        let client = client_for(&server);
        let creds = CsidCredentials::<Production>::new(None, "UFJPRA==");
        assert!(matches!(
            client.submit_clearance_invoice(&creds, &submission()),
            Err(ClientError::Unauthorized(_))
        ));
        match client.report_invoice(&creds, &submission()) {
            Err(ClientError::ServerError(body)) => assert_eq!(body.message(), Some("boom")),
            other => panic!("expected server error, got {other:?}"),
        }
        match client.request_compliance_certificate("000000", "Q1NS") {
            Err(ClientError::Status { status, body }) => {
                assert_eq!(status, 400);
                assert_eq!(body, "bad otp");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn undecodable_success_body_is_invalid_response() {
        let Some(server) = try_start_server() else {
            return;
        };
        let mock = server.mock(|when, then| {
            when.method(POST).path("/v1/compliance/csr");
            then.status(200).body("not json");
        });
        match client_for(&server).request_compliance_certificate("123456", "Q1NS") {
            Err(ClientError::InvalidResponse { status, body }) => {
                assert_eq!(status, 200);
                assert_eq!(body, "not json");
            }
            other => panic!("expected invalid response, got {other:?}"),
        }
        mock.assert();
    }
}
