use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context as _, Result, bail};
use clap::Args;
use fotara_core::{
    api::{CaClient, Compliance, CsidCredentials, FotaraClient, Production, TokenScope},
    certificate::SigningCertificate,
    config::Config,
    csr::{KeyMaterialGenerator, KeyMaterialRequest},
    invoice::{
        Clock, InvoiceSigner, InvoiceSubmission, InvoiceValidator, SignedInvoice, SystemClock,
        ValidationReport, regenerate_qr,
    },
    keys::{KeyExport, PrivateKey},
    onboarding::{OnboardingReport, OnboardingWorkflow},
    storage::{AesCbcCipher, AtRestCipher, KeyMaterialFiles, OutputLayout, read_encrypted},
};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Shared state for every command.
pub struct Context {
    pub config: Config,
}

/// Four-phase contract every subcommand follows; see `run` in `main.rs`.
pub trait Command {
    type Input;
    type Output;

    /// Subcommand name as registered with clap.
    fn name(&self) -> &'static str;

    /// A blank value here makes the runner print usage instead of running.
    fn first_positional(&self) -> &str;

    fn load_args(&self, ctx: &Context) -> Result<Self::Input>;

    fn validate(&self, _ctx: &Context, _input: &Self::Input) -> Result<()> {
        Ok(())
    }

    fn process(&self, ctx: &Context, input: Self::Input) -> Result<Self::Output>;

    fn output(&self, output: Self::Output) -> Result<ExitCode>;
}

fn read_text(path: &str) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {path}"))
}

/// Reads key or certificate material that may have been stored encrypted.
///
/// PEM text is used as is; anything else is decrypted with the configured storage key when one
/// is set, and used as is when decryption fails.
fn read_material(ctx: &Context, path: &str) -> Result<String> {
    let text = read_text(path)?;
    if text.contains("-----BEGIN") {
        return Ok(text);
    }
    let Ok(cipher) = AesCbcCipher::from_config(&ctx.config) else {
        return Ok(text);
    };
    match cipher.decrypt(&text) {
        Ok(plain) => Ok(plain.to_string()),
        Err(e) => {
            debug!(path, error = %e, "file is not encrypted; using it as is");
            Ok(text)
        }
    }
}

fn load_request(
    ctx: &Context,
    csr_config: &str,
    standard_config: Option<&str>,
) -> Result<KeyMaterialRequest> {
    KeyMaterialRequest::from_config_files(
        Path::new(csr_config),
        standard_config.map(Path::new),
        Some(ctx.config.certificate_template()),
    )
    .with_context(|| format!("invalid CSR configuration {csr_config}"))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Args)]
pub struct GenerateCsrKeys {
    /// Existing directory the encrypted files are written to
    pub output_dir: String,
    /// CSR subject configuration (JSON)
    pub csr_config: String,
    /// Key and template settings (JSON)
    #[arg(long)]
    pub standard_config: Option<String>,
    /// Export the private key as password-encrypted PKCS#8
    #[arg(long, env = "FOTARA_KEY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

pub struct KeyMaterialInput {
    request: KeyMaterialRequest,
    cipher: AesCbcCipher,
    layout: OutputLayout,
}

impl Command for GenerateCsrKeys {
    type Input = KeyMaterialInput;
    type Output = KeyMaterialFiles;

    fn name(&self) -> &'static str {
        "generate-csr-keys"
    }

    fn first_positional(&self) -> &str {
        &self.output_dir
    }

    fn load_args(&self, ctx: &Context) -> Result<Self::Input> {
        Ok(KeyMaterialInput {
            request: load_request(ctx, &self.csr_config, self.standard_config.as_deref())?,
            cipher: AesCbcCipher::from_config(&ctx.config)?,
            layout: OutputLayout::new(&self.output_dir),
        })
    }

    fn validate(&self, _ctx: &Context, input: &Self::Input) -> Result<()> {
        input.layout.ensure_exists()?;
        Ok(())
    }

    fn process(&self, _ctx: &Context, input: Self::Input) -> Result<Self::Output> {
        let export = match &self.password {
            Some(password) => KeyExport::encrypted(password.as_str()),
            None => KeyExport::Plain,
        };
        let material = KeyMaterialGenerator::new(export).generate(&input.request)?;
        let files = input
            .layout
            .key_material(&input.request.common_name, SystemClock.now());
        input
            .layout
            .write_encrypted(&input.cipher, &files.csr, &material.csr_base64())?;
        input
            .layout
            .write_encrypted(&input.cipher, &files.private_key, &material.private_key_pem)?;
        input
            .layout
            .write_encrypted(&input.cipher, &files.public_key, &material.public_key_pem)?;
        Ok(files)
    }

    fn output(&self, files: Self::Output) -> Result<ExitCode> {
        for path in [&files.csr, &files.private_key, &files.public_key] {
            println!("{}", path.display());
        }
        Ok(ExitCode::SUCCESS)
    }
}

#[derive(Args)]
pub struct Onboard {
    /// Existing directory for key material, certificates and test invoices
    pub output_dir: String,
    /// CSR subject configuration (JSON)
    pub csr_config: String,
    /// One-time password issued by the tax portal
    pub otp: String,
    /// Key and template settings (JSON)
    #[arg(long)]
    pub standard_config: Option<String>,
}

pub struct OnboardInput {
    request: KeyMaterialRequest,
    client: FotaraClient,
    cipher: AesCbcCipher,
    layout: OutputLayout,
}

impl Command for Onboard {
    type Input = OnboardInput;
    type Output = OnboardingReport;

    fn name(&self) -> &'static str {
        "onboard"
    }

    fn first_positional(&self) -> &str {
        &self.output_dir
    }

    fn load_args(&self, ctx: &Context) -> Result<Self::Input> {
        Ok(OnboardInput {
            request: load_request(ctx, &self.csr_config, self.standard_config.as_deref())?,
            client: FotaraClient::new(&ctx.config)?,
            cipher: AesCbcCipher::from_config(&ctx.config)?,
            layout: OutputLayout::new(&self.output_dir),
        })
    }

    fn validate(&self, _ctx: &Context, input: &Self::Input) -> Result<()> {
        if self.otp.trim().is_empty() {
            bail!("OTP must not be blank");
        }
        input.layout.ensure_exists()?;
        Ok(())
    }

    fn process(&self, ctx: &Context, input: Self::Input) -> Result<Self::Output> {
        let report = OnboardingWorkflow::new(&ctx.config, &input.client, &input.cipher).run(
            &input.request,
            self.otp.trim(),
            &input.layout,
        )?;
        Ok(report)
    }

    fn output(&self, report: Self::Output) -> Result<ExitCode> {
        println!("onboarding {}", report.state);
        for path in report.key_files.iter().chain(&report.accepted) {
            println!("{}", path.display());
        }
        println!("{}", report.production_certificate.display());
        println!("{}", report.production_response.display());
        Ok(ExitCode::SUCCESS)
    }
}

#[derive(Args)]
pub struct Validate {
    /// Invoice XML file
    pub xml: String,
}

impl Command for Validate {
    type Input = InvoiceValidator;
    type Output = ValidationReport;

    fn name(&self) -> &'static str {
        "validate"
    }

    fn first_positional(&self) -> &str {
        &self.xml
    }

    fn load_args(&self, ctx: &Context) -> Result<Self::Input> {
        Ok(InvoiceValidator::new(&ctx.config))
    }

    fn process(&self, _ctx: &Context, validator: Self::Input) -> Result<Self::Output> {
        Ok(validator.validate_file(Path::new(&self.xml)))
    }

    fn output(&self, report: Self::Output) -> Result<ExitCode> {
        for warning in &report.warnings {
            println!("warning: {warning}");
        }
        for error in &report.errors {
            println!("error: {error}");
        }
        if report.is_valid() {
            println!("{}: valid", self.xml);
            Ok(ExitCode::SUCCESS)
        } else {
            println!("{}: invalid ({} errors)", self.xml, report.errors.len());
            Ok(ExitCode::FAILURE)
        }
    }
}

#[derive(Args)]
pub struct InvoiceSign {
    /// Unsigned invoice XML file
    pub xml: String,
    /// Private key (PEM, optionally stored encrypted)
    pub private_key: String,
    /// Signing certificate (PEM or base64, optionally stored encrypted)
    pub certificate: String,
    /// Write the signed XML here instead of standard output
    #[arg(long)]
    pub output: Option<String>,
    /// Password of an encrypted PKCS#8 key
    #[arg(long, env = "FOTARA_KEY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

pub struct SignInput {
    xml: String,
    signer: InvoiceSigner,
}

impl Command for InvoiceSign {
    type Input = SignInput;
    type Output = SignedInvoice;

    fn name(&self) -> &'static str {
        "invoice-sign"
    }

    fn first_positional(&self) -> &str {
        &self.xml
    }

    fn load_args(&self, ctx: &Context) -> Result<Self::Input> {
        let key = PrivateKey::from_text(
            &read_material(ctx, &self.private_key)?,
            self.password.as_deref(),
        )
        .with_context(|| format!("failed to load private key {}", self.private_key))?;
        let certificate = SigningCertificate::parse(&read_material(ctx, &self.certificate)?)
            .with_context(|| format!("failed to load certificate {}", self.certificate))?;
        Ok(SignInput {
            xml: read_text(&self.xml)?,
            signer: InvoiceSigner::new(key, certificate),
        })
    }

    fn validate(&self, _ctx: &Context, input: &Self::Input) -> Result<()> {
        if input.xml.trim().is_empty() {
            bail!("{} is empty", self.xml);
        }
        Ok(())
    }

    fn process(&self, _ctx: &Context, input: Self::Input) -> Result<Self::Output> {
        let signed = input.signer.sign(&input.xml)?;
        if signed.signature_fallback() {
            warn!("QR signature field holds the signature text bytes");
        }
        Ok(signed)
    }

    fn output(&self, signed: Self::Output) -> Result<ExitCode> {
        match &self.output {
            Some(path) => {
                fs::write(path, signed.signed_xml())
                    .with_context(|| format!("failed to write {path}"))?;
                info!(path = %path, "signed invoice written");
                println!("uuid: {}", signed.uuid());
                println!("invoice hash: {}", signed.invoice_hash());
                println!("qr: {}", signed.qr_code());
            }
            None => println!("{}", signed.signed_xml()),
        }
        Ok(ExitCode::SUCCESS)
    }
}

#[derive(Args)]
pub struct GenerateQr {
    /// Signed invoice XML file
    pub signed_xml: String,
}

impl Command for GenerateQr {
    type Input = String;
    type Output = String;

    fn name(&self) -> &'static str {
        "generate-qr"
    }

    fn first_positional(&self) -> &str {
        &self.signed_xml
    }

    fn load_args(&self, _ctx: &Context) -> Result<Self::Input> {
        read_text(&self.signed_xml)
    }

    fn process(&self, _ctx: &Context, xml: Self::Input) -> Result<Self::Output> {
        let qr = regenerate_qr(&xml)?;
        if qr.signature_fallback {
            warn!("QR signature field holds the signature text bytes");
        }
        Ok(qr.payload)
    }

    fn output(&self, payload: Self::Output) -> Result<ExitCode> {
        println!("{payload}");
        Ok(ExitCode::SUCCESS)
    }
}

#[derive(Args)]
pub struct SubmitArgs {
    /// Signed invoice XML file
    pub signed_xml: String,
    /// Production certificate (PEM or base64, optionally stored encrypted)
    pub certificate: String,
}

#[derive(Clone, Copy)]
enum SubmitMode {
    Clearance,
    Report,
}

/// `submit-clearance` and `submit-report`.
pub struct Submit {
    args: SubmitArgs,
    mode: SubmitMode,
}

impl Submit {
    pub fn clearance(args: SubmitArgs) -> Self {
        Self {
            args,
            mode: SubmitMode::Clearance,
        }
    }

    pub fn report(args: SubmitArgs) -> Self {
        Self {
            args,
            mode: SubmitMode::Report,
        }
    }
}

pub struct SubmissionInput<T> {
    submission: InvoiceSubmission,
    credentials: CsidCredentials<T>,
    client: FotaraClient,
}

fn load_submission<T: TokenScope>(
    ctx: &Context,
    signed_xml: &str,
    certificate_path: &str,
) -> Result<SubmissionInput<T>> {
    let xml = read_text(signed_xml)?;
    let submission = InvoiceSubmission::from_signed_xml(&xml)
        .with_context(|| format!("{signed_xml} is not a signed invoice"))?;
    let certificate = read_material(ctx, certificate_path)?;
    let credentials = CsidCredentials::from_certificate_text(&certificate)
        .with_context(|| format!("{certificate_path} holds no usable certificate"))?;
    Ok(SubmissionInput {
        submission,
        credentials,
        client: FotaraClient::new(&ctx.config)?,
    })
}

impl Command for Submit {
    type Input = SubmissionInput<Production>;
    type Output = Value;

    fn name(&self) -> &'static str {
        match self.mode {
            SubmitMode::Clearance => "submit-clearance",
            SubmitMode::Report => "submit-report",
        }
    }

    fn first_positional(&self) -> &str {
        &self.args.signed_xml
    }

    fn load_args(&self, ctx: &Context) -> Result<Self::Input> {
        load_submission(ctx, &self.args.signed_xml, &self.args.certificate)
    }

    fn process(&self, _ctx: &Context, input: Self::Input) -> Result<Self::Output> {
        let response = match self.mode {
            SubmitMode::Clearance => input
                .client
                .submit_clearance_invoice(&input.credentials, &input.submission)?,
            SubmitMode::Report => input
                .client
                .report_invoice(&input.credentials, &input.submission)?,
        };
        info!(
            uuid = %input.submission.uuid,
            status = response.status().unwrap_or_default(),
            "invoice submitted"
        );
        Ok(serde_json::to_value(&response)?)
    }

    fn output(&self, response: Self::Output) -> Result<ExitCode> {
        print_json(&response)?;
        let has_errors = response
            .get("errors")
            .and_then(Value::as_array)
            .is_some_and(|errors| !errors.is_empty());
        Ok(if has_errors {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        })
    }
}

#[derive(Args)]
pub struct ComplianceInvoice {
    /// Signed invoice XML file
    pub signed_xml: String,
    /// Compliance certificate (PEM or base64, optionally stored encrypted)
    pub certificate: String,
}

impl Command for ComplianceInvoice {
    type Input = SubmissionInput<Compliance>;
    type Output = (bool, Value);

    fn name(&self) -> &'static str {
        "compliance-invoice"
    }

    fn first_positional(&self) -> &str {
        &self.signed_xml
    }

    fn load_args(&self, ctx: &Context) -> Result<Self::Input> {
        load_submission(ctx, &self.signed_xml, &self.certificate)
    }

    fn process(&self, _ctx: &Context, input: Self::Input) -> Result<Self::Output> {
        let response = input
            .client
            .submit_compliance_invoice(&input.credentials, &input.submission)?;
        Ok((response.is_accepted(), serde_json::to_value(&response)?))
    }

    fn output(&self, (accepted, response): Self::Output) -> Result<ExitCode> {
        print_json(&response)?;
        Ok(if accepted {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }
}

#[derive(Args)]
pub struct Decrypt {
    /// File written by generate-csr-keys or onboard
    pub file: String,
}

impl Command for Decrypt {
    type Input = AesCbcCipher;
    type Output = String;

    fn name(&self) -> &'static str {
        "decrypt"
    }

    fn first_positional(&self) -> &str {
        &self.file
    }

    fn load_args(&self, ctx: &Context) -> Result<Self::Input> {
        Ok(AesCbcCipher::from_config(&ctx.config)?)
    }

    fn process(&self, _ctx: &Context, cipher: Self::Input) -> Result<Self::Output> {
        let plain = read_encrypted(&cipher, Path::new(&self.file))
            .with_context(|| format!("failed to decrypt {}", self.file))?;
        Ok(plain.to_string())
    }

    fn output(&self, plain: Self::Output) -> Result<ExitCode> {
        print!("{plain}");
        Ok(ExitCode::SUCCESS)
    }
}
