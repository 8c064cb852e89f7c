use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use golos_core::agi::AgiChannel;
use golos_core::config::Config;
use golos_core::providers;
use golos_core::session::CallSession;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Answers one telephone call, spoken to by the telephony host over the AGI
/// control protocol on stdin/stdout.
#[derive(Parser)]
struct Cli {
    /// Validate configuration and provider selection, then exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    // stdout belongs to the control protocol, so log lines must never reach
    // it. Everything goes to stderr and, when the directory is writable, a
    // dated file the host's log rotation can pick up.
    init_logging(&config.log_dir);

    // --- 3. Build Providers ---
    let providers = providers::from_config(&config).context("Failed to construct providers")?;

    if args.check {
        tracing::info!("Configuration and provider selection are valid");
        return Ok(());
    }

    // --- 4. Handle the Call ---
    let mut channel = AgiChannel::from_stdio();
    let env = channel
        .read_environment()
        .await
        .context("Failed to read the AGI environment handshake")?;

    // The session answers the call itself; a setup failure here must leave
    // the channel untouched.
    let mut session = CallSession::new(
        channel,
        providers.agent,
        providers.transcriber,
        providers.synthesizer,
        config,
        &env,
    )
    .context("Failed to set up the call session")?;

    session
        .run()
        .await
        .context("Call aborted on a control channel failure")?;

    Ok(())
}

/// Installs the stderr subscriber and, best effort, a per-day log file under
/// `log_dir`. A read-only or missing directory downgrades to stderr only
/// rather than refusing the call.
fn init_logging(log_dir: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter).with(stderr_layer);

    match open_log_file(log_dir) {
        Ok(file) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_timer(ChronoLocal::rfc_3339())
                .with_ansi(false)
                .with_writer(Arc::new(file));
            registry.with(file_layer).init();
        }
        Err(e) => {
            registry.init();
            tracing::warn!("File logging disabled ({}): {e}", log_dir.display());
        }
    }
}

fn open_log_file(log_dir: &Path) -> std::io::Result<File> {
    std::fs::create_dir_all(log_dir)?;
    let name = format!("agi_{}.log", chrono::Local::now().format("%Y%m%d"));
    std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(log_dir.join(name))
}
