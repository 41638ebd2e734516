use std::{
    fs::{self, OpenOptions},
    io::stdout,
    path::Path,
    sync::{Arc, Mutex},
};

use clap::Parser;
use color_eyre::{eyre::WrapErr, Result};
use crossterm::{
    event::{DisableBracketedPaste, EnableBracketedPaste},
    execute,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod backend;
mod config;
mod dispatch;
mod entities;
mod input;
mod router;
mod store;

use app::App;
use backend::{supabase::SupabaseClient, AuthProvider};
use config::{Cli, Config};
use dispatch::{Backend, Dispatcher};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let config = Config::load(&cli)?;
    init_tracing(&config.log_file)?;

    let client = Arc::new(SupabaseClient::new(&config)?);
    let session = client.get_session().await;
    info!(
        signed_in = session.is_some(),
        table = %config.table,
        "starting"
    );

    let backend = Backend::new(client.clone(), client.clone());
    let (dispatcher, replies) = Dispatcher::new(backend);
    let app = App::new(
        dispatcher,
        session,
        config.provider.clone(),
        client.sign_in_url(),
        config.dedupe_requests,
    );

    let terminal = ratatui::init();
    execute!(stdout(), EnableBracketedPaste)?;
    let app_result = app.run(terminal, replies).await;
    execute!(stdout(), DisableBracketedPaste)?;
    ratatui::restore();
    app_result
}

/// The terminal owns stdout, so logs go to a file.
fn init_tracing(log_file: &Path) -> Result<()> {
    if let Some(dir) = log_file.parent() {
        fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .wrap_err_with(|| format!("cannot open log file {}", log_file.display()))?;
    let filter = EnvFilter::try_from_env("LAZYTODO_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .init();
    Ok(())
}
