pub mod app;
pub mod capture;
pub mod config;
pub mod deck;
pub mod enchantment;
pub mod error;
pub mod logging;
pub mod notification;
pub mod ocr;
pub mod scan;
pub mod schedule;
pub mod speech;
pub mod state;
pub mod storage;
pub use error::{AppError, AppResult};

/// Entrypoint used by the binary and other front-ends.
pub async fn run() -> AppResult<()> {
    logging::init();
    tracing::info!("starting Cardloft");

    let config = config::load_app_config();
    tracing::debug!(?config, "configuration loaded");

    app::terminal::run(config).await?;

    tracing::info!("shutdown complete");
    Ok(())
}
