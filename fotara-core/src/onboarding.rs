//! Device onboarding: key generation, compliance certificate, test invoices and the
//! production certificate, run as one strictly sequential workflow.
use md5::{Digest, Md5};
use std::{collections::VecDeque, fmt, path::PathBuf, sync::Arc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::{
    api::{CaClient, CertificateResponse, ClientError, Compliance, CsidCredentials},
    certificate::{CertificateError, SigningCertificate},
    config::Config,
    csr::{CsrError, InvoiceTypes, KeyMaterialGenerator, KeyMaterialRequest, SerialNumber},
    invoice::{
        InvoiceSubmission,
        sign::{InvoiceSigner, SigningError},
        timestamp::{Clock, SystemClock, local_date},
        xml,
    },
    keys::{KeyError, KeyExport, PrivateKey},
    storage::{AtRestCipher, OutputLayout, StorageError, read_encrypted},
};

pub const TEST_QUEUE_CAPACITY: usize = 10;

/// Steps of the workflow, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OnboardingState {
    GenerateKeys,
    LoadKeyMaterial,
    RequestComplianceCertificate,
    BuildTestInvoiceQueue,
    ComplianceTestInvoices,
    RequestProductionCertificate,
    Persist,
    Completed,
}

impl fmt::Display for OnboardingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OnboardingState::GenerateKeys => "generate keys",
            OnboardingState::LoadKeyMaterial => "load key material",
            OnboardingState::RequestComplianceCertificate => "request compliance certificate",
            OnboardingState::BuildTestInvoiceQueue => "build test invoice queue",
            OnboardingState::ComplianceTestInvoices => "compliance test invoices",
            OnboardingState::RequestProductionCertificate => "request production certificate",
            OnboardingState::Persist => "persist",
            OnboardingState::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// A failed workflow, with the step it stopped in.
#[derive(Debug, Error)]
#[error("onboarding failed during '{state}': {failure}")]
pub struct OnboardingError {
    pub state: OnboardingState,
    #[source]
    pub failure: OnboardingFailure,
}

#[derive(Debug, Error)]
pub enum OnboardingFailure {
    #[error("OTP must not be blank")]
    BlankOtp,

    #[error(transparent)]
    Csr(#[from] CsrError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Certificate(#[from] CertificateError),

    #[error(
        "certificate not issued (disposition {disposition:?}): {}",
        response.as_deref().unwrap_or("<response not encodable>")
    )]
    NotIssued {
        disposition: Option<String>,
        /// The CA response as JSON.
        response: Option<String>,
    },

    #[error("failed to encode CA response: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("compliance certificate response carries no request id")]
    MissingRequestId,

    #[error("invoiceType enables neither B2B nor B2C invoices")]
    NoInvoiceTypes,

    #[error("test invoice queue is full ({capacity} entries)")]
    QueueFull { capacity: usize },

    #[error("{} of {total} test invoices were rejected", rejected.len())]
    RejectedInvoices {
        total: usize,
        rejected: Vec<RejectedInvoice>,
    },
}

/// Diagnostics for one test invoice that did not pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedInvoice {
    pub id: String,
    /// Raw CA response, or the local error when the invoice never reached the CA.
    pub detail: String,
}

/// Sample documents used for compliance checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    StandardInvoice,
    StandardCreditNote,
    SimplifiedInvoice,
    SimplifiedCreditNote,
}

impl SampleKind {
    fn template(self) -> &'static str {
        match self {
            SampleKind::StandardInvoice => include_str!("../assets/samples/b2b_invoice.xml"),
            SampleKind::StandardCreditNote => include_str!("../assets/samples/b2b_credit.xml"),
            SampleKind::SimplifiedInvoice => include_str!("../assets/samples/b2c_invoice.xml"),
            SampleKind::SimplifiedCreditNote => include_str!("../assets/samples/b2c_credit.xml"),
        }
    }

    fn for_types(types: InvoiceTypes) -> Vec<SampleKind> {
        let mut kinds = Vec::new();
        if types.contains(InvoiceTypes::B2B) {
            kinds.extend([SampleKind::StandardInvoice, SampleKind::StandardCreditNote]);
        }
        if types.contains(InvoiceTypes::B2C) {
            kinds.extend([SampleKind::SimplifiedInvoice, SampleKind::SimplifiedCreditNote]);
        }
        kinds
    }
}

/// Values substituted into the sample templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateValues {
    pub taxpayer: String,
    pub device: String,
    pub taxpayer_name: String,
    /// `yyyy-MM-dd`.
    pub issue_date: String,
}

impl TemplateValues {
    fn document_id(&self, index: i64) -> String {
        format!("{}_{}_{index}", self.taxpayer, self.device)
    }

    fn render(&self, template: &str, index: usize) -> String {
        let index = index as i64;
        let id = self.document_id(index);
        let org_id = self.document_id(index - 1);
        let text = |value: &str| xml::escape(value, false);
        template
            .replace("${ID}", &text(&id))
            .replace("${UUID}", &name_uuid(&id))
            .replace("${ISSUE_DATE}", &text(&self.issue_date))
            .replace("${ORG_ID}", &text(&org_id))
            .replace("${ORG_UUID}", &name_uuid(&org_id))
            .replace("${VAT_NUMBER}", &text(&self.taxpayer))
            .replace("${TAXPAYER_NAME}", &text(&self.taxpayer_name))
            .replace("${DEVICE_ID}", &text(&self.device))
    }
}

/// Version 3 UUID of the MD5 of `name`, with no namespace prefix.
pub fn name_uuid(name: &str) -> String {
    let digest: [u8; 16] = Md5::digest(name.as_bytes()).into();
    uuid::Builder::from_md5_bytes(digest)
        .into_uuid()
        .hyphenated()
        .to_string()
}

/// One rendered sample waiting to be signed and submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestInvoice {
    pub id: String,
    pub kind: SampleKind,
    pub xml: String,
}

/// FIFO of rendered test invoices, bounded at [`TEST_QUEUE_CAPACITY`].
#[derive(Debug, Default)]
pub struct TestInvoiceQueue {
    entries: VecDeque<TestInvoice>,
}

impl TestInvoiceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders the samples for `types`, numbering documents from zero.
    pub fn build(types: InvoiceTypes, values: &TemplateValues) -> Result<Self, OnboardingFailure> {
        let kinds = SampleKind::for_types(types);
        if kinds.is_empty() {
            return Err(OnboardingFailure::NoInvoiceTypes);
        }
        let mut queue = Self::new();
        for (index, kind) in kinds.into_iter().enumerate() {
            queue.push(TestInvoice {
                id: values.document_id(index as i64),
                kind,
                xml: values.render(kind.template(), index),
            })?;
        }
        Ok(queue)
    }

    pub fn push(&mut self, invoice: TestInvoice) -> Result<(), OnboardingFailure> {
        if self.entries.len() >= TEST_QUEUE_CAPACITY {
            return Err(OnboardingFailure::QueueFull {
                capacity: TEST_QUEUE_CAPACITY,
            });
        }
        self.entries.push_back(invoice);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<TestInvoice> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingReport {
    pub state: OnboardingState,
    pub key_files: Vec<PathBuf>,
    pub accepted: Vec<PathBuf>,
    pub production_certificate: PathBuf,
    pub production_response: PathBuf,
}

/// Runs onboarding against a CA. Nothing is retried; a failed run must be restarted from the
/// beginning.
///
/// # Examples
/// ```rust,no_run
/// use fotara_core::{
///     api::FotaraClient, config::Config, csr::KeyMaterialRequest,
///     onboarding::OnboardingWorkflow, storage::{AesCbcCipher, OutputLayout},
/// };
///
/// let config = Config::load(fotara_core::config::EnvironmentType::Simulation, None)?;
/// let client = FotaraClient::new(&config)?;
/// let cipher = AesCbcCipher::from_config(&config)?;
/// let request = KeyMaterialRequest::from_config_files(
///     "config.json".as_ref(),
///     None,
///     Some(config.certificate_template()),
/// )?;
/// let report = OnboardingWorkflow::new(&config, &client, &cipher)
///     .run(&request, "123456", &OutputLayout::new("out"))?;
/// println!("{}", report.production_certificate.display());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct OnboardingWorkflow<'a, C: CaClient, E: AtRestCipher> {
    config: &'a Config,
    client: &'a C,
    cipher: &'a E,
    clock: Arc<dyn Clock>,
}

struct Step {
    state: OnboardingState,
}

impl Step {
    fn enter(state: OnboardingState) -> Self {
        info!(%state, "onboarding step");
        Self { state }
    }

    fn fail(&self, failure: impl Into<OnboardingFailure>) -> OnboardingError {
        OnboardingError {
            state: self.state,
            failure: failure.into(),
        }
    }
}

impl<'a, C: CaClient, E: AtRestCipher> OnboardingWorkflow<'a, C, E> {
    pub fn new(config: &'a Config, client: &'a C, cipher: &'a E) -> Self {
        Self {
            config,
            client,
            cipher,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[instrument(skip_all, fields(env = self.config.env().as_str()))]
    pub fn run(
        &self,
        request: &KeyMaterialRequest,
        otp: &str,
        output: &OutputLayout,
    ) -> Result<OnboardingReport, OnboardingError> {
        let step = Step::enter(OnboardingState::GenerateKeys);
        if otp.trim().is_empty() {
            return Err(step.fail(OnboardingFailure::BlankOtp));
        }
        output.ensure_exists().map_err(|e| step.fail(e))?;
        let serial: SerialNumber = request.serial_parts().map_err(|e| step.fail(e))?;
        let material = KeyMaterialGenerator::new(KeyExport::Plain)
            .generate(request)
            .map_err(|e| step.fail(e))?;
        let files = output.key_material(&request.common_name, self.clock.now());
        for (path, contents) in [
            (&files.csr, material.csr_base64()),
            (&files.private_key, material.private_key_pem.to_string()),
            (&files.public_key, material.public_key_pem.clone()),
        ] {
            output
                .write_encrypted(self.cipher, path, &contents)
                .map_err(|e| step.fail(e))?;
        }
        drop(material);

        let step = Step::enter(OnboardingState::LoadKeyMaterial);
        let csr = read_encrypted(self.cipher, &files.csr).map_err(|e| step.fail(e))?;
        let key_pem = read_encrypted(self.cipher, &files.private_key).map_err(|e| step.fail(e))?;
        let key = PrivateKey::from_text(&key_pem, None).map_err(|e| step.fail(e))?;

        let step = Step::enter(OnboardingState::RequestComplianceCertificate);
        let compliance = self
            .client
            .request_compliance_certificate(otp, csr.trim())
            .map_err(|e| step.fail(e))?;
        require_issued(&compliance).map_err(|e| step.fail(e))?;
        let credentials =
            CsidCredentials::<Compliance>::from_response(&compliance).map_err(|e| step.fail(e))?;
        let certificate_text = compliance.certificate_text().map_err(|e| step.fail(e))?;
        let certificate = SigningCertificate::parse(&certificate_text).map_err(|e| step.fail(e))?;

        let step = Step::enter(OnboardingState::BuildTestInvoiceQueue);
        let values = TemplateValues {
            taxpayer: serial.taxpayer.clone(),
            device: serial.device.clone(),
            taxpayer_name: request.common_name.clone(),
            issue_date: local_date(self.clock.now()),
        };
        let mut queue =
            TestInvoiceQueue::build(request.invoice_types(), &values).map_err(|e| step.fail(e))?;
        info!(count = queue.len(), "test invoices queued");

        let step = Step::enter(OnboardingState::ComplianceTestInvoices);
        let signer = InvoiceSigner::new(key, certificate).with_clock(self.clock.clone());
        let accepted = self
            .submit_test_invoices(&signer, &credentials, &mut queue)
            .map_err(|e| step.fail(e))?;

        let step = Step::enter(OnboardingState::RequestProductionCertificate);
        let request_id = compliance
            .request_id()
            .ok_or_else(|| step.fail(OnboardingFailure::MissingRequestId))?;
        let production = self
            .client
            .request_production_certificate(&credentials, request_id)
            .map_err(|e| step.fail(e))?;
        require_issued(&production).map_err(|e| step.fail(e))?;
        let production_certificate = production.certificate_text().map_err(|e| step.fail(e))?;

        let step = Step::enter(OnboardingState::Persist);
        let mut written = Vec::with_capacity(accepted.len());
        for (index, xml) in accepted.iter().enumerate() {
            let path = output.test_invoice(&serial.taxpayer, &serial.device, index);
            output.write_plain(&path, xml).map_err(|e| step.fail(e))?;
            written.push(path);
        }
        let response_json = serde_json::to_string(&production).map_err(|e| step.fail(e))?;
        let response_path = output.production_response();
        output
            .write_encrypted(self.cipher, &response_path, &response_json)
            .map_err(|e| step.fail(e))?;
        let certificate_path = output.production_certificate();
        output
            .write_encrypted(self.cipher, &certificate_path, &production_certificate)
            .map_err(|e| step.fail(e))?;

        info!(accepted = written.len(), "onboarding completed");
        Ok(OnboardingReport {
            state: OnboardingState::Completed,
            key_files: vec![files.csr, files.private_key, files.public_key],
            accepted: written,
            production_certificate: certificate_path,
            production_response: response_path,
        })
    }

    /// Drains the whole queue; any rejection fails the step once every entry has been tried.
    fn submit_test_invoices(
        &self,
        signer: &InvoiceSigner,
        credentials: &CsidCredentials<Compliance>,
        queue: &mut TestInvoiceQueue,
    ) -> Result<Vec<String>, OnboardingFailure> {
        let total = queue.len();
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        while let Some(invoice) = queue.pop() {
            match self.submit_one(signer, credentials, &invoice) {
                Ok(signed_xml) => {
                    info!(id = %invoice.id, kind = ?invoice.kind, "test invoice accepted");
                    accepted.push(signed_xml);
                }
                Err(detail) => {
                    warn!(id = %invoice.id, kind = ?invoice.kind, %detail, "test invoice rejected");
                    rejected.push(RejectedInvoice {
                        id: invoice.id,
                        detail,
                    });
                }
            }
        }

        if rejected.is_empty() {
            Ok(accepted)
        } else {
            Err(OnboardingFailure::RejectedInvoices { total, rejected })
        }
    }

    fn submit_one(
        &self,
        signer: &InvoiceSigner,
        credentials: &CsidCredentials<Compliance>,
        invoice: &TestInvoice,
    ) -> Result<String, String> {
        let signed = signer
            .sign(&invoice.xml)
            .map_err(|e: SigningError| e.to_string())?;
        let response = self
            .client
            .submit_compliance_invoice(credentials, &InvoiceSubmission::from_signed(&signed))
            .map_err(|e| e.to_string())?;
        if response.is_accepted() {
            Ok(signed.signed_xml().to_string())
        } else {
            Err(serde_json::to_string(&response).unwrap_or_else(|_| format!("{response:?}")))
        }
    }
}

fn require_issued(response: &CertificateResponse) -> Result<(), OnboardingFailure> {
    if response.is_issued() {
        return Ok(());
    }
    Err(OnboardingFailure::NotIssued {
        disposition: response.disposition_message().map(str::to_string),
        response: serde_json::to_string(response).ok(),
    })
}
