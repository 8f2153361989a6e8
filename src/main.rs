//! `tg-media-dl` binary: configuration from the environment, then polling
//! until SIGINT/SIGTERM.

use std::process::ExitCode;
use std::sync::Arc;
use tg_media_dl::fetcher::{GalleryDl, GalleryExtractor, MissingGalleryDl, YtDlp};
use tg_media_dl::telegram::BotApi;
use tg_media_dl::{Config, Error, FetchError, MediaBot, Result, run_with_shutdown};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tg_media_dl=info".into()),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, code = e.error_code(), "bot failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env()?;

    tokio::fs::create_dir_all(&config.fetch.cache_dir).await?;

    let api = BotApi::new(&config.telegram)?;
    let video = YtDlp::from_config(&config.fetch)?;
    // Photo requests are optional: without gallery-dl they fail one by one
    let gallery: Arc<dyn GalleryExtractor> = match GalleryDl::from_config(&config.fetch) {
        Ok(gallery) => Arc::new(gallery),
        Err(Error::Fetch(FetchError::ToolNotFound { tool })) => {
            tracing::warn!(tool = %tool, "gallery-dl not found, photo requests will be refused");
            Arc::new(MissingGalleryDl)
        }
        Err(e) => return Err(e),
    };

    tracing::info!(
        cache_dir = ?config.fetch.cache_dir,
        yt_dlp = ?video.binary_path(),
        proxy = config.fetch.proxy_url.is_some(),
        max_upload_bytes = config.delivery.max_upload_bytes,
        "starting bot"
    );

    let bot = MediaBot::new(
        Arc::new(config),
        Arc::new(api),
        Arc::new(video),
        gallery,
    );
    let dispatched = run_with_shutdown(bot).await;
    tracing::info!(dispatched, "bot stopped");
    Ok(())
}
