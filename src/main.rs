mod api;
mod app;
mod config;
mod debounce;
mod edit;
mod error;
mod item;
mod list;
mod models;
mod subitem;
#[cfg(test)]
mod testing;
mod ui;
mod validation;

use crate::api::ApiClient;
use crate::app::App;
use crate::config::Config;
use crate::ui::run_app;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use dotenv::dotenv;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::fs::{self, OpenOptions};
use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

// The terminal owns stdout, so logs go to a file.
fn init_logging(config: &Config) -> io::Result<()> {
    let path = config.log_path();
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("todolist_tui=info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::load()?;
    init_logging(&config)?;
    tracing::info!("Starting against {}", config.api_url());

    let api = ApiClient::new(config.api_url(), config.request_timeout())?.with_auth_failure_hook(
        Arc::new(|status| tracing::info!("Server rejected the session ({}); log in with 'l'", status)),
    );

    let mut app = App::new(api, &config);
    app.start().await;

    // Setup terminal UI
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    terminal.hide_cursor()?;

    let res = run_app(&mut terminal, app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!("Terminal loop failed: {:?}", err);
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}
