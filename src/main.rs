mod app;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use codegraph_viewer::ViewerConfig;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// TOML configuration file. Defaults to `codegraph-viewer.toml` when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Base URL of the graph backend REST API.
    #[arg(long)]
    backend_url: Option<String>,
    /// WebSocket URL for push updates. Derived from the backend URL when omitted.
    #[arg(long)]
    push_url: Option<String>,
}

fn init_tracing() {
    // CODEGRAPH_LOG_FORMAT=json switches to machine-parseable output.
    let log_format = std::env::var("CODEGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_owned());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "codegraph_viewer=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = ViewerConfig::load(args.config.as_deref())
        .context("failed to load configuration")?
        .with_overrides(args.backend_url, args.push_url);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("codegraph-io")
        .build()
        .context("failed to start the async runtime")?;

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default().with_inner_size([1440.0, 920.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Code graph",
        options,
        Box::new(move |cc| Ok(Box::new(app::ViewerApp::new(cc, config, runtime)?))),
    )
    .map_err(|err| anyhow::anyhow!("viewer exited with an error: {err}"))
}
