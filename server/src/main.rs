use clap::Parser;
use log::{info, warn};
use tron_server::config::ServerConfig;
use tron_server::game::Engine;
use tron_server::ledger::HighScoreLedger;
use tron_server::network::Server;

/// Parses configuration, restores the high-score ledger and serves until
/// Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::parse();
    config.validate()?;

    let ledger = match HighScoreLedger::load(&config.highscores) {
        Ok(ledger) => ledger,
        Err(e) => {
            warn!(
                "Could not read {}: {}, starting with no high scores",
                config.highscores.display(),
                e
            );
            HighScoreLedger::in_memory()
        }
    };

    let engine = Engine::new(&config, ledger);
    let server = Server::new(config, engine).await?;
    let engine = server.engine();

    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    let engine = engine.lock().await;
    if let Err(e) = engine.ledger().flush() {
        warn!("Failed to save high scores on shutdown: {}", e);
    }
    Ok(())
}
