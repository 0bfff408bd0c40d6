use anyhow::{Context, Result};
use clap::Parser;
use mirror_session::signaling::Relay;
use mirror_session::{
    create_router, spawn_session, AnalysisClient, AppState, Config, MemoryRelay, NatsRelay,
    RtcPeerFactory, SyntheticCapture,
};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "mirror-session")]
#[command(about = "One-to-one live session with recording and analysis hand-off")]
struct Args {
    /// Config file, without extension
    #[arg(short, long, default_value = "config/mirror-session")]
    config: String,

    /// Override the HTTP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Use an in-process relay instead of NATS (single-process demos)
    #[arg(long)]
    local_relay: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    info!("Mirror Session v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let relay: Arc<dyn Relay> = if args.local_relay {
        info!("Using in-process signaling relay");
        Arc::new(MemoryRelay::new())
    } else {
        info!("Signaling relay: {}", cfg.relay.url);
        Arc::new(NatsRelay::new(cfg.relay.clone()))
    };

    let analysis = AnalysisClient::new(&cfg.analysis)?;
    info!("Analysis endpoint: {}", analysis.endpoint());

    let session = spawn_session(
        &cfg,
        relay,
        Arc::new(RtcPeerFactory::new(cfg.ice.clone())),
        Box::new(SyntheticCapture::new()),
        analysis,
    );

    let app = create_router(AppState::new(session));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server to {}", addr))?;

    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app)
        .await
        .context("HTTP server failed")?;

    Ok(())
}
