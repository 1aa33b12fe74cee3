//! SCADA gateway binary

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scada_gateway::{
    cache::CacheStore,
    capture::FileCapture,
    config::Args,
    correlator::Correlator,
    credentials::CredentialStore,
    server, Gateway, Session,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("scada_gateway={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let credentials = Arc::new(CredentialStore::load(&args.credentials_path)?);
    let snapshot = credentials.snapshot();

    info!("======================================");
    info!("  SCADA gateway");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Upstream: {}", snapshot.ws_url);
    info!("Login: {}", snapshot.login);
    info!("Node: {:?}, device: {:?}", snapshot.node_id, snapshot.did);
    info!("Data dir: {}", args.data_dir.display());
    info!("Credentials: {}", args.credentials_path.display());
    info!("Capture file: {}", args.capture_path.display());
    match args.cache_ttl() {
        Some(ttl) => info!("Cache TTL: {}s", ttl.as_secs()),
        None => info!("Cache TTL: none"),
    }
    info!("======================================");

    if snapshot.ws_url.is_empty() {
        warn!(
            "No ws_url configured, upstream requests will fail until the credentials file is fixed"
        );
    }

    let store = Arc::new(CacheStore::open(&args.data_dir, args.cache_ttl())?);
    let session = Arc::new(Session::new(
        credentials,
        store,
        Arc::new(Correlator::new()),
        Arc::new(FileCapture::new(&args.capture_path)),
        args.connect_timeout(),
    ));
    let gateway = Arc::new(Gateway::new(session, args.timeouts()));

    // Log in ahead of the first request
    let startup = Arc::clone(&gateway);
    tokio::spawn(async move {
        match startup.ensure_ready().await {
            Ok(()) => info!("Upstream session ready"),
            Err(e) => warn!("Initial connect failed: {}", e),
        }
    });

    server::run(gateway, args.listen).await?;
    Ok(())
}
