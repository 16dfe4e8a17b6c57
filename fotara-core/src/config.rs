//! Configuration and environment selection.
use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use thiserror::Error;

/// Overrides the origin of every endpoint (e.g. a local mock CA).
pub const BASE_URL_ENV: &str = "FOTARA_API_BASE_URL";
/// Base64 encoded 32 byte key used for at-rest encryption of generated files.
pub const STORAGE_KEY_ENV: &str = "FOTARA_STORAGE_KEY";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const KEY_COMPLIANCE_CSR: &str = "fotara.api.url.compliance.csr";
const KEY_COMPLIANCE_INVOICE: &str = "fotara.api.url.compliance.invoice";
const KEY_PROD_CERTIFICATE: &str = "fotara.api.url.prod.certificate";
const KEY_PROD_INVOICE: &str = "fotara.api.url.prod.invoice";
const KEY_PROD_REPORT: &str = "fotara.api.url.prod.report.invoice";
const KEY_TEMPLATE: &str = "fotara.certificate.template";

/// Target environment of the tax authority.
///
/// - Development: a locally running CA on port 5212.
/// - Simulation: the staging platform used while onboarding.
/// - Production: the live platform.
///
/// # Examples
/// ```rust
/// use std::str::FromStr;
/// use fotara_core::config::EnvironmentType;
///
/// let env = EnvironmentType::from_str("sim")?;
/// assert_eq!(env, EnvironmentType::Simulation);
/// # Ok::<(), fotara_core::config::ConfigError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvironmentType {
    Development,
    Simulation,
    Production,
}

/// Errors raised while assembling a [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid environment type: {input}")]
    InvalidEnvironment { input: String },

    #[error("failed to open properties file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse properties from '{path}': {source}")]
    PropertiesRead {
        path: PathBuf,
        #[source]
        source: java_properties::PropertiesError,
    },

    #[error("storage key must be base64 of exactly 32 bytes")]
    InvalidStorageKey,

    #[error("no storage key configured; set {STORAGE_KEY_ENV}")]
    MissingStorageKey,
}

impl FromStr for EnvironmentType {
    type Err = ConfigError;
    fn from_str(env: &str) -> Result<EnvironmentType, ConfigError> {
        match env.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(EnvironmentType::Development),
            "simulation" | "sim" => Ok(EnvironmentType::Simulation),
            "production" | "prod" => Ok(EnvironmentType::Production),
            _ => Err(ConfigError::InvalidEnvironment {
                input: env.to_string(),
            }),
        }
    }
}

impl EnvironmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentType::Development => "development",
            EnvironmentType::Simulation => "simulation",
            EnvironmentType::Production => "production",
        }
    }

    /// Certificate template name requested in CSRs for this environment.
    pub fn default_template(&self) -> &'static str {
        match self {
            EnvironmentType::Development => "NQCSignature",
            EnvironmentType::Simulation => "SIM_TEMP",
            EnvironmentType::Production => "PROD_TEMP",
        }
    }

    pub fn default_endpoints(&self) -> Endpoints {
        match self {
            EnvironmentType::Development => Endpoints {
                compliance_csr: "http://localhost:5212/v1/compliance/csr".into(),
                compliance_invoice: "http://localhost:5212/v1/compliance/invoice".into(),
                production_certificate: "http://localhost:5212/v1/prod/certificate".into(),
                production_invoice: "http://qpt.invoiceq.com/service/core/invoices/clearance"
                    .into(),
                production_report: "http://qpt.invoiceq.com/service/core/invoices/reporting"
                    .into(),
            },
            EnvironmentType::Simulation => Endpoints::with_base("https://staging.fotara.com"),
            EnvironmentType::Production => Endpoints::with_base("https://prod.fotara.com"),
        }
    }
}

/// Full URLs of the CA operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub compliance_csr: String,
    pub compliance_invoice: String,
    pub production_certificate: String,
    /// Clearance of standard invoices.
    pub production_invoice: String,
    /// Reporting of simplified invoices.
    pub production_report: String,
}

impl Endpoints {
    /// Lays out the standard `/v1/...` paths under one origin.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            compliance_csr: format!("{base}/v1/compliance/csr"),
            compliance_invoice: format!("{base}/v1/compliance/invoice"),
            production_certificate: format!("{base}/v1/prod/certificate"),
            production_invoice: format!("{base}/v1/prod/invoice"),
            production_report: format!("{base}/v1/prod/report"),
        }
    }

    fn apply_properties(&mut self, props: &HashMap<String, String>) {
        let slots = [
            (KEY_COMPLIANCE_CSR, &mut self.compliance_csr),
            (KEY_COMPLIANCE_INVOICE, &mut self.compliance_invoice),
            (KEY_PROD_CERTIFICATE, &mut self.production_certificate),
            (KEY_PROD_INVOICE, &mut self.production_invoice),
            (KEY_PROD_REPORT, &mut self.production_report),
        ];
        for (key, slot) in slots {
            if let Some(value) = props.get(key).filter(|v| !v.trim().is_empty()) {
                *slot = value.trim().to_string();
            }
        }
    }
}

/// Settings shared by the CA client, the signing pipeline and the onboarding workflow.
///
/// Built once at startup and passed around by reference.
///
/// # Examples
/// ```rust
/// use fotara_core::config::{Config, EnvironmentType};
///
/// let config = Config::new(EnvironmentType::Simulation);
/// assert_eq!(config.certificate_template(), "SIM_TEMP");
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    env: EnvironmentType,
    endpoints: Endpoints,
    certificate_template: String,
    request_timeout: Duration,
    storage_key: Option<[u8; 32]>,
    xsd_path: Option<PathBuf>,
}

impl Config {
    pub fn new(env: EnvironmentType) -> Self {
        Self {
            env,
            endpoints: env.default_endpoints(),
            certificate_template: env.default_template().to_string(),
            request_timeout: DEFAULT_TIMEOUT,
            storage_key: None,
            xsd_path: None,
        }
    }

    /// Builds the environment defaults, then applies an optional properties file and the
    /// `FOTARA_*` environment variables, in that order.
    pub fn load(env: EnvironmentType, properties: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::new(env);
        if let Some(path) = properties {
            config.apply_properties_file(path)?;
        }
        if let Ok(base) = std::env::var(BASE_URL_ENV) {
            if !base.trim().is_empty() {
                config.endpoints = Endpoints::with_base(base.trim());
            }
        }
        if let Ok(key) = std::env::var(STORAGE_KEY_ENV) {
            config = config.with_storage_key_base64(&key)?;
        }
        Ok(config)
    }

    pub fn apply_properties_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let file = File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let props = java_properties::read(BufReader::new(file)).map_err(|source| {
            ConfigError::PropertiesRead {
                path: path.to_path_buf(),
                source,
            }
        })?;
        self.endpoints.apply_properties(&props);
        if let Some(template) = props.get(KEY_TEMPLATE).filter(|v| !v.trim().is_empty()) {
            self.certificate_template = template.trim().to_string();
        }
        Ok(())
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_storage_key(mut self, key: [u8; 32]) -> Self {
        self.storage_key = Some(key);
        self
    }

    pub fn with_storage_key_base64(self, encoded: &str) -> Result<Self, ConfigError> {
        let bytes =
            Base64::decode_vec(encoded.trim()).map_err(|_| ConfigError::InvalidStorageKey)?;
        let key: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ConfigError::InvalidStorageKey)?;
        Ok(self.with_storage_key(key))
    }

    pub fn with_xsd_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.xsd_path = Some(path.into());
        self
    }

    pub fn env(&self) -> EnvironmentType {
        self.env
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn certificate_template(&self) -> &str {
        &self.certificate_template
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn storage_key(&self) -> Result<&[u8; 32], ConfigError> {
        self.storage_key.as_ref().ok_or(ConfigError::MissingStorageKey)
    }

    pub fn xsd_path(&self) -> Option<&Path> {
        self.xsd_path.as_deref()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new(EnvironmentType::Development)
    }
}
