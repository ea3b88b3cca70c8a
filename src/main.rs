use anyhow::Result;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use kuasark_tui::config::{self, Config};
use kuasark_tui::{ui, Controller, RodioMedia, StationClient};

#[tokio::main]
async fn main() -> Result<()> {
    let data_dir = config::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("kuasark.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // the terminal belongs to the UI, so logs go to a file
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "debug,hyper=warn,reqwest=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    eprintln!("kuasark_tui log: {}", log_path.display());
    tracing::info!("kuasark_tui starting");

    let config = Config::load();

    let client = Client::builder()
        .user_agent(config.http.user_agent.as_str())
        .timeout(Duration::from_secs(config.http.timeout_secs))
        .build()?;
    let source = StationClient::new(client);

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let media = Arc::new(RodioMedia::new(event_tx, &config.player));
    let controller = Controller::new(Arc::clone(&media), config.player.initial_volume);

    let ui_result = ui::run_ui(controller, source, event_rx).await;
    media.stop();

    if let Err(e) = ui_result {
        tracing::error!("UI error: {:?}", e);
        eprintln!("UI error: {:?}", e);
        return Err(e);
    }

    println!("再生を終了しました。");
    Ok(())
}
