use anyhow::Result;
use clap::Parser;
use credential_agent::cache::token_store::TokenStore;
use credential_agent::refresh::manager::CredentialManager;
use credential_agent::server;
use credential_agent::utils::config_loader;
use credential_agent::utils::logging;
use credential_agent::utils::logging::LogLevel;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "credential-agent.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
    /// Print the access token and exit instead of keeping it refreshed
    #[arg(long)]
    once: bool,
    /// Remove the cached token file before starting
    #[arg(long)]
    purge: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load YAML config, init logging
    // -------------------------------

    let args = Args::parse();
    let service_config = config_loader::run(&args.config).await?;
    logging::run(&service_config, args.log_level).await?;

    let credentials = service_config.credentials.clone();
    if args.purge {
        let store = TokenStore::new(credentials.cache_dir(), &credentials.host);
        store.remove().await?;
        info!(path = %store.path().display(), "cached token removed");
    }

    // -------------------------------
    // 2. Load, validate or acquire the token
    // -------------------------------

    let manager = CredentialManager::new(credentials)?;
    let mut events = manager.subscribe();

    if args.once {
        let token = manager.token().await?;
        manager.stop_refresh();
        println!("{}", token.access_token);
        return Ok(());
    }

    // -------------------------------
    // 3. Metrics server
    // -------------------------------

    if service_config.settings.metrics.is_enabled {
        let settings = service_config.settings.clone();
        tokio::spawn(async move {
            if let Err(err) = server::server::start(&settings).await {
                error!("metrics server stopped: {:#}", err);
            }
        });
    }

    // -------------------------------
    // 4. Keep the token fresh until interrupted
    // -------------------------------

    match manager.token().await {
        Ok(token) => info!(outdated_at = %token.outdated_at, "token ready"),
        Err(err) => error!("{}", err),
    }

    info!("Service running...");
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Ok(token) => info!(outdated_at = %token.outdated_at, "token published"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "token events lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!("shutting down");
    manager.stop_refresh();
    Ok(())
}
