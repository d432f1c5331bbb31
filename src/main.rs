use std::sync::Arc;

use anyhow::Context;

use whatsapp_watcher::config::WatcherConfig;
use whatsapp_watcher::pipeline::MessagePipeline;
use whatsapp_watcher::session::{JsonLinesTransport, SessionController};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (stderr, so stdout stays quiet)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = WatcherConfig::from_env().context("Failed to load configuration")?;

    eprintln!("📱 WhatsApp Watcher v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Vault: {}", config.vault_path.display());
    let args: Vec<&str> = config
        .processor_args
        .iter()
        .map(|a| if a.contains('\n') { "<script>" } else { a.as_str() })
        .collect();
    eprintln!("   Processor: {} {}", config.processor_cmd, args.join(" "));
    match config.handoff_timeout {
        Some(timeout) => eprintln!("   Handoff timeout: {}s", timeout.as_secs()),
        None => eprintln!("   Handoff timeout: none"),
    }
    eprintln!("   Max in flight: {}\n", config.max_in_flight);

    let pipeline = Arc::new(MessagePipeline::from_config(&config));
    pipeline
        .vault()
        .ensure_dirs()
        .await
        .with_context(|| format!("Failed to prepare vault at {}", config.vault_path.display()))?;

    let transport = Arc::new(JsonLinesTransport::from_stdin());
    let mut controller = SessionController::new(transport, pipeline, config.max_in_flight);

    let summary = controller
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    eprintln!(
        "   Delivered: {}, fallback: {}, dropped: {}, lost: {}, ignored: {}",
        summary.delivered, summary.fallback, summary.dropped, summary.lost, summary.ignored
    );

    // A pending stdin read would otherwise hold the runtime open.
    std::process::exit(0);
}
