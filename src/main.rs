//! Courier - HTTP request runner
//!
//! Sends one request through the engine, prints every redirect hop and
//! the final body, and optionally checks the final status.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

use courier::http::{MultipartField, PreparedRequest, RedirectChain, ResponseBody};
use courier::scripting::expect_response;
use courier::tls::{CertificateKind, ClientCertificateConfig};
use courier::{Config, CourierError, Engine, EngineEvent, EventEmitter, Secret, UserHint};

/// HTTP request runner with redirect tracing and mutual TLS
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(author, version, about = "HTTP request runner with redirect tracing and mutual TLS", long_about = None)]
struct Cli {
    /// Request URL
    #[arg(required_unless_present = "generate_config")]
    url: Option<String>,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Request header as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Raw request body, "@path" reads it from a file
    #[arg(short, long, conflicts_with_all = ["form", "multipart"])]
    data: Option<String>,

    /// URL-encoded field as key=value (repeatable)
    #[arg(long, conflicts_with = "multipart")]
    form: Vec<String>,

    /// Multipart field as key=value or key=@path (repeatable)
    #[arg(short = 'F', long)]
    multipart: Vec<String>,

    /// Maximum number of redirects to follow
    #[arg(long)]
    max_redirects: Option<usize>,

    /// Do not follow redirects
    #[arg(long)]
    no_follow: bool,

    /// Skip server certificate verification
    #[arg(short = 'k', long)]
    insecure: bool,

    /// Client certificate type (pfx or pem)
    #[arg(long, default_value = "pfx")]
    cert_type: String,

    /// Client certificate file (PFX store or PEM certificate)
    #[arg(long)]
    cert: Option<PathBuf>,

    /// PEM private key file
    #[arg(long)]
    key: Option<PathBuf>,

    /// Certificate store or key passphrase
    #[arg(long, env = "COURIER_CERT_PASSPHRASE", hide_env_values = true)]
    pass: Option<String>,

    /// Fail unless the final response has this status
    #[arg(long)]
    expect_status: Option<u16>,

    /// Print engine events to stderr as JSON lines
    #[arg(long)]
    events: bool,

    /// Print the redirect chain as JSON
    #[arg(long)]
    json: bool,

    /// Configuration file path
    #[arg(short, long, env = "COURIER_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "COURIER_LOG_LEVEL")]
    log_level: String,

    /// Log file path (enables file logging)
    #[arg(long, env = "COURIER_LOG_FILE")]
    log_file: Option<String>,

    /// Enable JSON structured logging
    #[arg(long, env = "COURIER_LOG_JSON")]
    log_json: bool,

    /// Print the default configuration and exit
    #[arg(long)]
    generate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Both rustls providers may be linked; pin ring for every config
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();

    if cli.generate_config {
        return generate_default_config();
    }

    init_logging(&cli)?;

    let url = cli.url.clone().context("missing URL")?;
    let config = load_config(&cli, &url)?;
    let request = build_request(&cli, &url, &config)?;

    let events = if cli.events {
        let (emitter, rx) = EventEmitter::channel(256);
        tokio::spawn(print_events(rx));
        emitter
    } else {
        EventEmitter::disabled()
    };

    let engine = Engine::new(config, events).map_err(user_error)?;
    tracing::info!(request_id = %request.id, "{} {}", request.method, request.url);

    let chain = engine
        .spawn(request)
        .await
        .context("request task failed")?
        .map_err(user_error)?;

    print_chain(&chain, cli.json)?;

    if let Some(status) = cli.expect_status {
        expect_response(chain.final_response())
            .to()
            .have()
            .status(status)
            .map_err(|e| anyhow::anyhow!(e.user_hint()))?;
    }

    Ok(())
}

/// Initialize the logging system. Console output goes to stderr.
fn init_logging(cli: &Cli) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if let Some(log_path) = &cli.log_file {
        let file_appender = if log_path.contains('/') || log_path.contains('\\') {
            let path = std::path::Path::new(log_path);
            let dir = path.parent().unwrap_or(std::path::Path::new("."));
            let filename = path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("courier.log");
            RollingFileAppender::new(Rotation::DAILY, dir, filename)
        } else {
            let log_dir = Config::data_dir()
                .map(|d| d.join("logs"))
                .unwrap_or_else(|_| PathBuf::from("."));
            std::fs::create_dir_all(&log_dir).ok();
            RollingFileAppender::new(Rotation::DAILY, log_dir, log_path)
        };

        if cli.log_json {
            let file_layer = fmt::layer()
                .json()
                .with_writer(file_appender)
                .with_ansi(false);
            subscriber.with(file_layer).init();
        } else {
            let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false);
            subscriber.with(file_layer).init();
        }
    } else if cli.log_json {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

/// Load configuration and apply CLI overrides
fn load_config(cli: &Cli, url: &str) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;

    if cli.insecure {
        config.tls.verify_certificates = false;
    }
    if let Some(max) = cli.max_redirects {
        config.http.max_redirects = max;
    }

    if let Some(cert) = &cli.cert {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .context("client certificates need a URL with a host")?;
        let kind = CertificateKind::from_str(&cli.cert_type)
            .map_err(|e| anyhow::anyhow!(e.user_hint()))?;
        let passphrase = cli.pass.as_deref().map(Secret::from);

        let certificate = match kind {
            CertificateKind::Pfx => ClientCertificateConfig::pfx(&host, cert, passphrase),
            CertificateKind::Pem => {
                let key = cli.key.as_ref().context("--key is required with --cert-type pem")?;
                ClientCertificateConfig::pem(&host, cert, key, passphrase)
            }
        };

        // Command line certificate wins over configured ones
        config.tls.client_certificates.insert(0, certificate);
    }

    config.validate().map_err(|e| anyhow::anyhow!(e.user_hint()))?;
    Ok(config)
}

fn build_request(cli: &Cli, url: &str, config: &Config) -> Result<PreparedRequest> {
    let mut builder = PreparedRequest::builder()
        .method(&cli.method)
        .url(url)
        .follow_redirects(config.http.follow_redirects && !cli.no_follow)
        .emit_events(cli.events);

    for header in &cli.headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("invalid header '{}', expected 'Name: value'", header))?;
        builder = builder.header(name.trim(), value.trim());
    }

    if let Some(data) = &cli.data {
        builder = match data.strip_prefix('@') {
            Some(path) => builder.bytes(
                std::fs::read(path).with_context(|| format!("failed to read body file {}", path))?,
            ),
            None => builder.body(data),
        };
    }

    for field in &cli.form {
        let (key, value) = split_field(field)?;
        builder = builder.form(key, value);
    }

    for field in &cli.multipart {
        let (key, value) = split_field(field)?;
        let part = match value.strip_prefix('@') {
            Some(path) => MultipartField::file(key, path),
            None => MultipartField::text(key, value),
        };
        builder = builder.part(part);
    }

    Ok(builder.build())
}

fn split_field(field: &str) -> Result<(&str, &str)> {
    field
        .split_once('=')
        .with_context(|| format!("invalid field '{}', expected key=value", field))
}

fn print_chain(chain: &RedirectChain, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(chain).context("Failed to serialize result")?;
        println!("{}", out);
        return Ok(());
    }

    for (i, hop) in chain.hops().iter().enumerate() {
        let response = &hop.response;
        eprintln!("[{}] {} {}", i, hop.method, hop.url);
        eprintln!(
            "    {} {} {} ({} ms)",
            response.http_version, response.status, response.status_text, response.duration_ms
        );
        if let Some(location) = &hop.location {
            eprintln!("    location: {}", location);
        }
    }

    match &chain.final_response().body {
        ResponseBody::Text { content } => println!("{}", content),
        ResponseBody::File { path, size } => {
            eprintln!("body saved to {} ({} bytes)", path.display(), size)
        }
    }

    Ok(())
}

async fn print_events(mut rx: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = rx.recv().await {
        if let Ok(line) = serde_json::to_string(&event) {
            eprintln!("{}", line);
        }
    }
}

fn user_error(err: CourierError) -> anyhow::Error {
    tracing::debug!(error = ?err, "Request failed");
    anyhow::anyhow!(err.user_message())
}

/// Print the default configuration file
fn generate_default_config() -> Result<()> {
    let config = Config::default();
    let toml = toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
    println!("{}", toml);
    Ok(())
}
