use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use fotara_core::config::{Config, EnvironmentType};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{Command, Context};

#[derive(Parser)]
#[command(name = "fotara")]
#[command(about = "E-invoice onboarding, signing and submission", version)]
struct Cli {
    /// Target environment
    #[arg(long, global = true, value_enum, default_value_t = Environment::Development)]
    env: Environment,

    /// Properties file overriding endpoints and the certificate template.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a CSR and key pair, written encrypted to the output directory
    GenerateCsrKeys(commands::GenerateCsrKeys),
    /// Run the full onboarding flow against the CA
    Onboard(commands::Onboard),
    /// Check an invoice document locally
    Validate(commands::Validate),
    /// Sign an invoice and embed its QR code
    InvoiceSign(commands::InvoiceSign),
    /// Rebuild the QR payload of a signed invoice
    GenerateQr(commands::GenerateQr),
    /// Submit a signed standard invoice for clearance
    SubmitClearance(commands::SubmitArgs),
    /// Report a signed simplified invoice
    SubmitReport(commands::SubmitArgs),
    /// Submit a signed invoice to the compliance check
    ComplianceInvoice(commands::ComplianceInvoice),
    /// Print the clear text of an encrypted file
    Decrypt(commands::Decrypt),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Environment {
    #[value(alias = "dev")]
    Development,
    #[value(alias = "sim")]
    Simulation,
    #[value(alias = "prod")]
    Production,
}

impl From<Environment> for EnvironmentType {
    fn from(env: Environment) -> Self {
        match env {
            Environment::Development => EnvironmentType::Development,
            Environment::Simulation => EnvironmentType::Simulation,
            Environment::Production => EnvironmentType::Production,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

/// Drives one command through its four phases.
fn run<C: Command>(command: &C, ctx: &Context) -> Result<ExitCode> {
    if command.first_positional().trim().is_empty() {
        let mut cli = Cli::command();
        let usage = cli
            .find_subcommand_mut(command.name())
            .map(|sub| sub.render_usage().to_string())
            .unwrap_or_default();
        eprintln!("{usage}");
        return Ok(ExitCode::from(2));
    }
    let input = command.load_args(ctx)?;
    command.validate(ctx, &input)?;
    let output = command.process(ctx, input)?;
    command.output(output)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let config = Config::load(cli.env.into(), cli.config.as_deref())
        .context("failed to load configuration")?;
    let ctx = Context { config };

    match cli.command {
        Commands::GenerateCsrKeys(cmd) => run(&cmd, &ctx),
        Commands::Onboard(cmd) => run(&cmd, &ctx),
        Commands::Validate(cmd) => run(&cmd, &ctx),
        Commands::InvoiceSign(cmd) => run(&cmd, &ctx),
        Commands::GenerateQr(cmd) => run(&cmd, &ctx),
        Commands::SubmitClearance(args) => run(&commands::Submit::clearance(args), &ctx),
        Commands::SubmitReport(args) => run(&commands::Submit::report(args), &ctx),
        Commands::ComplianceInvoice(cmd) => run(&cmd, &ctx),
        Commands::Decrypt(cmd) => run(&cmd, &ctx),
    }
}
