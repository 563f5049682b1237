use anyhow::Result;
use clap::{Parser, Subcommand};
use quill_core::api::MockBackend;
use quill_core::export::ExportFormat;
use quill_core::notify::NotificationCenter;
use quill_core::session::{ChatController, Surface};
use quill_core::store::CredentialStore;
use quill_core::telemetry;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Automation helpers for Quill")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a lightweight smoke test that exercises the Quill core logic.
    Smoke,
}

fn main() -> Result<()> {
    telemetry::init_tracing(EnvFilter::new("info"));
    let cli = Cli::parse();

    match cli.command {
        Commands::Smoke => smoke_test(),
    }
}

fn smoke_test() -> Result<()> {
    let runtime = Runtime::new()?;
    let temp_dir = TempDir::new()?;
    let backend = Arc::new(MockBackend::new());
    let notifier = NotificationCenter::new();
    let store = CredentialStore::new(temp_dir.path().join("credentials"));
    let controller = ChatController::new(Surface::Wikipedia, backend, notifier, store);

    runtime.block_on(controller.ensure_session())?;
    runtime.block_on(controller.send_message("ping from xtask"))?;
    runtime.block_on(controller.load_history())?;
    info!(
        "messages" = controller.messages().len(),
        "smoke test conversation replayed"
    );

    if let Some(path) =
        runtime.block_on(controller.export_transcript(ExportFormat::Text, temp_dir.path()))?
    {
        info!(path = %path.display(), "smoke test transcript written");
    }

    Ok(())
}
