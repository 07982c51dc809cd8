//! Terminal front end for both HealthSphere modes.

use anyhow::Result;
use clap::{Parser, Subcommand};
use healthsphere_service::{
    Presenter, ServiceConfig,
    bridge::{GeminiClient, RequestBridge},
    cli::{run_analyze, run_chat},
    presenter::APP_TITLE,
};
use session_flow::InMemorySessionStorage;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;

#[derive(Parser)]
#[command(name = "healthsphere-cli", version, about = APP_TITLE)]
struct Cli {
    #[command(subcommand)]
    mode: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a question about a medical report image (JPG, PNG)
    Analyze {
        /// Path to the report image
        #[arg(long)]
        image: Option<PathBuf>,
        /// Your query about the report
        #[arg(long, short, default_value = "")]
        query: String,
    },
    /// Chat freely; an empty line is ignored, `/quit` or EOF ends the session
    Chat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServiceConfig::load();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let model = Arc::new(GeminiClient::new(config.gemini_config()));
    let presenter = Presenter::new(
        RequestBridge::new(model),
        Arc::new(InMemorySessionStorage::new()),
    );

    println!("{}\n", APP_TITLE);
    let mut stdout = tokio::io::stdout();

    match cli.mode {
        Command::Analyze { image, query } => {
            if !run_analyze(&presenter, image.as_deref(), &query, &mut stdout).await? {
                std::process::exit(1);
            }
        }
        Command::Chat => {
            run_chat(&presenter, BufReader::new(tokio::io::stdin()), &mut stdout).await?
        }
    }

    Ok(())
}
