use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_share_server::{AppState, config::ServerConfig, server, services::power, utils::local_ip};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing. LOG_FORMAT=json switches to one JSON object per line.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "lan_share_server=debug,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let config = ServerConfig::from_env()?;
    let shares = config.validated_shares()?;

    tracing::info!("Starting LAN share server");
    for (i, share) in shares.iter().enumerate() {
        tracing::info!("Share {}: {}", i + 1, share.display());
    }
    tracing::info!("Control directory: {}", config.control_dir.display());
    tracing::info!(
        "Shutdown sentinel checked every {:?}",
        config.control_poll_interval
    );

    let state = AppState::new(&config, shares, power::system());
    let listener = server::bind(config.bind_addr, config.port).await?;

    tracing::info!("Listening on {}", listener.local_addr()?);
    tracing::info!("Open http://{}:{} on your phone", local_ip(), config.port);

    server::serve(listener, state, config.control_poll_interval).await?;
    Ok(())
}
