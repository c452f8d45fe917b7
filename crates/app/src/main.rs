mod cli;
mod repl;
mod terminal;
mod utils;

use anyhow::{Context, Result};
use chat_host::ChatSession;
use clap::Parser;
use providers::openai::HttpTransport;
use providers::EndpointTable;
use shared::storage::FileStore;
use std::sync::Arc;
use terminal::TerminalSink;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Logs go to stderr so the conversation on stdout stays readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let store_path = utils::store_path(cli.store.as_deref())?;
    let store = Arc::new(
        FileStore::open(&store_path)
            .with_context(|| format!("opening store {}", store_path.display()))?,
    );
    tracing::debug!(path = %store.path().display(), "using store");

    let endpoints = EndpointTable::from_env()?;
    let sink = Arc::new(TerminalSink::new());
    let mut session = ChatSession::new(
        store,
        Arc::new(HttpTransport::new()),
        sink.clone(),
        endpoints,
    )
    .with_system_prompt(cli.system_prompt.clone());

    if let Some(model) = cli.model.as_deref() {
        session.select_model(model)?;
    }
    sink.set_dark(session.preferences().dark_mode);

    repl::run(&mut session, &sink, &cli.transcript_dir).await
}
