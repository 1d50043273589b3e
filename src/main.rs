//! emberkv server entry point.
//!
//! Parses the command line, sets up logging, and runs the accept loop
//! until Ctrl+C.

use emberkv::config::HELP;
use emberkv::{Config, ConfigAction, Server};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_args() {
        Ok(ConfigAction::Run(config)) => config,
        Ok(ConfigAction::Help) => {
            println!("{}", HELP);
            return Ok(());
        }
        Ok(ConfigAction::Version) => {
            println!("emberkv version {}", emberkv::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("{}", HELP);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    info!("emberkv v{}", emberkv::VERSION);

    let server = Server::bind(&config).await?;
    let stats = server.stats();
    info!(
        addr = %server.local_addr()?,
        scope = ?server.store_scope(),
        strict_lengths = config.strict_lengths,
        "Listening"
    );

    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, stopping server..."),
            Err(e) => {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await
            }
        }
    };

    tokio::select! {
        _ = server.run() => {}
        _ = shutdown => {}
    }

    let stats = stats.snapshot();
    info!(
        sessions = stats.sessions_started,
        commands = stats.commands_processed,
        protocol_errors = stats.protocol_errors,
        bytes_read = stats.bytes_read,
        bytes_written = stats.bytes_written,
        "Server shutdown complete"
    );
    Ok(())
}
