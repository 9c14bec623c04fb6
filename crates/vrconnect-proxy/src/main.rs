//! VRConnect proxy - shares one VRChat bot session with the VRConnect app.
//!
//! The proxy logs a bot account in to VRChat once and serves world search,
//! world lookup and friend lists to the app through that session.

use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vrconnect_core::{
    ApiClient, Config, CredentialStore, PlatformApi, ProxyGateway, SessionGuard, SessionResult,
};

// ============================================================================
// Constants
// ============================================================================

/// File name prefix for the rolling log in `VRCONNECT_LOG_DIR`.
const LOG_FILE_PREFIX: &str = "vrconnect-proxy.log";

/// Initialize the tracing subscriber for logging.
/// The returned guard flushes the file log and must live until exit.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match std::env::var("VRCONNECT_LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();
    let config = Config::load()?;

    // Check for CLI commands
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        None => serve(config).await,
        Some("--store-credentials") => store_credentials(&config),
        Some("--forget-credentials") => forget_credentials(&config),
        Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        Some(other) => Err(anyhow::anyhow!("Unknown argument {:?} (see --help)", other)),
    }
}

fn print_usage() {
    eprintln!("Usage: vrconnect-proxy [--store-credentials | --forget-credentials]");
    eprintln!();
    eprintln!("Without arguments the proxy serves /proxy/* on VRCONNECT_BIND (or PORT).");
    eprintln!("  --store-credentials   save the bot password in the OS keychain");
    eprintln!("  --forget-credentials  remove the saved bot password");
}

async fn serve(config: Config) -> Result<()> {
    let settings = config.guard_settings();
    let client = ApiClient::new(&config.api_url, &config.user_agent, settings.request_timeout)
        .context("Failed to build VRChat API client")?;
    let api: Arc<dyn PlatformApi> = Arc::new(client);

    let credentials = config.credentials(|key| std::env::var(key).ok());
    if !credentials.is_complete() {
        warn!("Bot credentials are incomplete; set VRCHAT_USERNAME and VRCHAT_PASSWORD or run --store-credentials");
    }

    let guard = SessionGuard::new(Arc::clone(&api), credentials, settings);
    let gateway = ProxyGateway::new(api, guard.clone(), config.gateway_options());

    // Log the bot in up front so the first request does not pay for it.
    tokio::spawn(async move {
        match guard.ensure_session().await {
            SessionResult::Ok => info!("Bot session ready"),
            SessionResult::RequiresTwoFactor => {
                warn!("Bot session needs two-factor verification, POST the code to /proxy/verify-2fa")
            }
            SessionResult::CoolingDown(remaining) => {
                warn!(retry_after_secs = remaining.as_secs(), "Bot is rate limited")
            }
            SessionResult::Failed(message) => error!(error = %message, "Bot login failed"),
        }
    });

    let addr: SocketAddr = config
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(addr = %addr, api = %config.api_url, "VRConnect proxy listening");
    axum::serve(listener, vrconnect_proxy::router(gateway))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("VRConnect proxy shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn prompt_username() -> Result<String> {
    print!("VRChat username: ");
    io::stdout().flush()?;

    let mut username = String::new();
    io::stdin().read_line(&mut username)?;
    Ok(username.trim().to_string())
}

fn bot_username(config: &Config) -> Result<String> {
    let username = match &config.username {
        Some(username) => username.clone(),
        None => prompt_username()?,
    };
    anyhow::ensure!(!username.is_empty(), "Username must not be empty");
    Ok(username)
}

fn store_credentials(config: &Config) -> Result<()> {
    let username = bot_username(config)?;
    let password = rpassword::prompt_password("Password: ")?;
    anyhow::ensure!(!password.is_empty(), "Password must not be empty");

    CredentialStore::store(&username, &password)?;
    println!("Stored password for {} in the OS keychain.", username);
    Ok(())
}

fn forget_credentials(config: &Config) -> Result<()> {
    let username = bot_username(config)?;
    CredentialStore::delete(&username)?;
    println!("Removed stored password for {}.", username);
    Ok(())
}
