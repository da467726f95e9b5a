mod storage;
mod transport;

#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

use std::io::{self, BufRead, Read};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use digisaathi::api::types::{BillPaymentRequest, PaymentRequest, ProfileUpdate, RegisterRequest};
use digisaathi::config::ConfigError;
use digisaathi::session::{Reaction, SessionError, handle_failure};
use digisaathi::token::StorageError;
use digisaathi::{ApiClient, ApiConfig, FilePart, GateDecision, GatewayError, RequestGateway, RouteGuard};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

use crate::storage::{CliStore, token_store};
use crate::transport::ReqwestTransport;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{}", .0.user_message())]
    Gateway(#[from] GatewayError),
    #[error("{}", .0.user_message())]
    Session(#[from] SessionError),
    #[error("token storage: {0}")]
    Storage(#[from] StorageError),
    #[error("http client setup failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("cannot read {path}: {source}")]
    ReadFile { path: PathBuf, source: io::Error },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("{0}")]
    InvalidInput(String),
    #[error("session expired or missing; run `digisaathi login`")]
    SignedOut,
}

type Api = ApiClient<ReqwestTransport, CliStore>;

#[derive(Parser, Debug)]
#[command(name = "digisaathi", about = "DigiSaathi API command line")]
struct Cli {
    #[arg(long, env = "DIGISAATHI_API_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "DIGISAATHI_TOKEN_FILE", default_value = ".digisaathi-token")]
    token_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Exchange email and password for a stored token.
    Login {
        #[arg(long)]
        email: String,
        /// Read from stdin when omitted.
        #[arg(long, env = "DIGISAATHI_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "DIGISAATHI_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    Logout,
    /// Show whether a token is stored and which API is targeted.
    Status {
        /// Also report the navigation gate decision for this path.
        #[arg(long)]
        path: Option<String>,
    },
    /// Show the profile, or update it when a flag is given.
    Profile {
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    Documents(DocumentsCommand),
    /// Extract text from an image without storing it.
    Ocr { path: PathBuf },
    Kyc(KycCommand),
    /// Record an expense from a bill image.
    Expense { path: PathBuf },
    /// Classify a bill and extract its fields.
    Analyze { path: PathBuf },
    /// Check a message for fraud; `-` reads stdin.
    Fraud { text: String },
    Dashboard,
    Payments(PaymentsCommand),
    Chat { message: String },
}

#[derive(Args, Debug)]
struct DocumentsCommand {
    #[command(subcommand)]
    command: DocumentsSubcommand,
}

#[derive(Subcommand, Debug)]
enum DocumentsSubcommand {
    List,
    Get { id: i64 },
    Upload { path: PathBuf },
}

#[derive(Args, Debug)]
struct KycCommand {
    #[command(subcommand)]
    command: KycSubcommand,
}

#[derive(Subcommand, Debug)]
enum KycSubcommand {
    Status,
    Confirm { document_id: i64 },
}

#[derive(Args, Debug)]
struct PaymentsCommand {
    #[command(subcommand)]
    command: PaymentsSubcommand,
}

#[derive(Subcommand, Debug)]
enum PaymentsSubcommand {
    Search {
        query: String,
    },
    Recent,
    Send {
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        note: Option<String>,
    },
    Bill {
        #[arg(long)]
        biller: String,
        #[arg(long)]
        account: String,
        #[arg(long)]
        amount: f64,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = resolve_config(cli.base_url.as_deref())?;
    let api = ApiClient::new(RequestGateway::new(
        ReqwestTransport::new()?,
        token_store(&cli.token_file, config.marker.clone()),
        &config,
    ));

    match run(&api, cli.command).await {
        Err(CliError::Gateway(error)) => Err(react(api.gateway().credentials(), error)),
        other => other,
    }
}

/// Environment config, with `--base-url` taking precedence.
fn resolve_config(base_url: Option<&str>) -> Result<ApiConfig, CliError> {
    let config = ApiConfig::from_env()?;
    match base_url {
        Some(raw) => Ok(config.with_base_url(raw)?),
        None => Ok(config),
    }
}

/// Session side effects for a failed call; a rejected token is removed.
fn react(store: &CliStore, error: GatewayError) -> CliError {
    match handle_failure(store, &error) {
        Reaction::RedirectToLogin { .. } => CliError::SignedOut,
        Reaction::ShowMessage(_) => CliError::Gateway(error),
    }
}

async fn run(api: &Api, command: Command) -> Result<(), CliError> {
    let output = match command {
        Command::Login { email, password } => {
            let password = password_or_stdin(password)?;
            let token = digisaathi::session::sign_in(api, &email, &password).await?;
            json!({ "signed_in": true, "token_type": token.token_type })
        }
        Command::Register { name, email, password } => {
            let password = password_or_stdin(password)?;
            api.register(&RegisterRequest { full_name: name, email, password }).await?;
            json!({ "registered": true })
        }
        Command::Logout => {
            digisaathi::session::sign_out(api.gateway().credentials())?;
            json!({ "signed_in": false })
        }
        Command::Status { path } => {
            let signed_in = api.gateway().credentials().is_present();
            let mut status = json!({ "signed_in": signed_in, "base_url": api.gateway().base_url() });
            if let Some(path) = path {
                status["gate"] = Value::String(gate_label(&RouteGuard::default().decide(&path, signed_in)));
            }
            status
        }
        Command::Profile { full_name, email } => {
            let update = ProfileUpdate { full_name, email };
            if update.is_empty() {
                serde_json::to_value(api.profile().await?)?
            } else {
                serde_json::to_value(api.update_profile(&update).await?)?
            }
        }
        Command::Documents(documents) => match documents.command {
            DocumentsSubcommand::List => serde_json::to_value(api.documents().await?)?,
            DocumentsSubcommand::Get { id } => serde_json::to_value(api.document(id).await?)?,
            DocumentsSubcommand::Upload { path } => {
                serde_json::to_value(api.upload_document(read_file_part(&path)?).await?)?
            }
        },
        Command::Ocr { path } => serde_json::to_value(api.ocr_upload(read_file_part(&path)?).await?)?,
        Command::Kyc(kyc) => match kyc.command {
            KycSubcommand::Status => serde_json::to_value(api.kyc_status().await?)?,
            KycSubcommand::Confirm { document_id } => {
                api.kyc_confirm(document_id).await?;
                json!({ "confirmed": document_id })
            }
        },
        Command::Expense { path } => serde_json::to_value(api.process_bill(read_file_part(&path)?).await?)?,
        Command::Analyze { path } => serde_json::to_value(api.analyze_document(read_file_part(&path)?).await?)?,
        Command::Fraud { text } => {
            let text = text_or_stdin(&text)?;
            serde_json::to_value(api.analyze_fraud_text(&text).await?)?
        }
        Command::Dashboard => serde_json::to_value(api.dashboard_summary().await?)?,
        Command::Payments(payments) => run_payments(api, payments).await?,
        Command::Chat { message } => serde_json::to_value(api.chat(&message).await?)?,
    };
    print_json(&output)
}

async fn run_payments(api: &Api, payments: PaymentsCommand) -> Result<Value, CliError> {
    let value = match payments.command {
        PaymentsSubcommand::Search { query } => serde_json::to_value(api.search_payees(&query).await?)?,
        PaymentsSubcommand::Recent => serde_json::to_value(api.recent_payees().await?)?,
        PaymentsSubcommand::Send { to, amount, note } => {
            let payment = PaymentRequest { upi_id: to, amount: positive_amount(amount)?, note };
            serde_json::to_value(api.send_payment(&payment).await?)?
        }
        PaymentsSubcommand::Bill { biller, account, amount } => {
            let bill = BillPaymentRequest { biller, account_number: account, amount: positive_amount(amount)? };
            serde_json::to_value(api.pay_bill(&bill).await?)?
        }
    };
    Ok(value)
}

fn gate_label(decision: &GateDecision) -> String {
    match decision {
        GateDecision::Allowed => "allowed".to_owned(),
        GateDecision::RedirectedToLogin { login_path } => format!("redirect to {login_path}"),
    }
}

fn positive_amount(amount: f64) -> Result<f64, CliError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(amount)
    } else {
        Err(CliError::InvalidInput(format!("amount must be a positive number, got {amount}")))
    }
}

/// Multipart part for a local file, typed by extension.
fn read_file_part(path: &Path) -> Result<FilePart, CliError> {
    let bytes = std::fs::read(path).map_err(|source| CliError::ReadFile { path: path.to_owned(), source })?;
    let file_name = path.file_name().map_or_else(|| "upload".to_owned(), |name| name.to_string_lossy().into_owned());
    let part = FilePart::new(digisaathi::api::UPLOAD_FIELD, file_name, bytes);
    Ok(match mime_for(path) {
        Some(mime_type) => part.with_mime_type(mime_type),
        None => part,
    })
}

fn mime_for(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}

fn password_or_stdin(password: Option<String>) -> Result<String, CliError> {
    if let Some(password) = password {
        return Ok(password);
    }
    eprint!("Password: ");
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|source| CliError::ReadFile { path: PathBuf::from("<stdin>"), source })?;
    let password = line.trim_end_matches(['\r', '\n']).to_owned();
    if password.is_empty() {
        return Err(CliError::InvalidInput("password is required".to_owned()));
    }
    Ok(password)
}

fn text_or_stdin(text: &str) -> Result<String, CliError> {
    if text != "-" {
        return Ok(text.to_owned());
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .map_err(|source| CliError::ReadFile { path: PathBuf::from("<stdin>"), source })?;
    Ok(buffer)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
