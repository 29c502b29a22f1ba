use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tab_recorder::app::{connect_bus, open_store, Runtime};
use tab_recorder::{create_router, AppState, Config, Notice, ObserverClient};
use tracing::info;

#[derive(Parser)]
#[command(name = "tab-recorder", version, about = "Browser tab recording orchestrator")]
struct Cli {
    /// Config file path, without extension
    #[arg(long, default_value = "config/tab-recorder")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller, capture worker and HTTP surface
    Serve,
    /// Ask a running controller to start recording a tab
    Start {
        #[arg(long)]
        tab: String,
    },
    /// Ask a running controller to stop recording a tab
    Stop {
        #[arg(long)]
        tab: String,
    },
    /// Print a tab's recording status
    Status {
        #[arg(long)]
        tab: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Tab Recorder v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cfg).await,
        Command::Start { tab } => {
            let observer = observer(&cfg).await?;
            report(observer.start(&tab).await)
        }
        Command::Stop { tab } => {
            let observer = observer(&cfg).await?;
            report(observer.stop(&tab).await)
        }
        Command::Status { tab } => {
            let observer = observer(&cfg).await?;
            report(observer.status(&tab).await)
        }
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let bus = connect_bus(&cfg.bus).await?;
    let store = open_store(&cfg.store).await?;
    let runtime = Runtime::start(&cfg, bus, store).await?;

    let state = AppState::new(Arc::clone(&runtime.observer), cfg.service.name.clone());
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    runtime.controller.shutdown();
    Ok(())
}

/// One-shot commands reach a controller in another process, so they need NATS
async fn observer(cfg: &Config) -> Result<ObserverClient> {
    if cfg.bus.backend != tab_recorder::config::BusBackend::Nats {
        anyhow::bail!("One-shot commands need bus.backend = \"nats\"");
    }
    let bus = connect_bus(&cfg.bus).await?;
    Ok(ObserverClient::connect(bus, cfg.bridge.handshake_timeout()).await?)
}

fn report<T: serde::Serialize>(result: Result<T, tab_recorder::RecorderError>) -> Result<()> {
    match result {
        Ok(reply) => {
            println!("{}", serde_json::to_string_pretty(&reply)?);
            Ok(())
        }
        Err(e) => {
            let notice = Notice::from(&e);
            eprintln!("{}", notice.message);
            Err(e.into())
        }
    }
}
