use pourmeter::config::SamplingConfig;
use pourmeter::error::AppError;
use tracing::Level;

fn init_logging() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    init_logging();
    let config_path = std::env::args().nth(1);
    let config = SamplingConfig::load(config_path.as_deref())?;
    tracing::info!(
        "Loaded sampling config: {:.1} Hz, window {}, threshold {}, offset factor {}",
        config.fps,
        config.proxy_smooth_window,
        config.diff_threshold,
        config.offset_factor
    );
    Ok(())
}
