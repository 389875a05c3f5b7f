use std::path::Path;
use std::process::ExitCode;

use evergreen::capture::{DirectoryFrames, FrameSource, StillFrame};
use evergreen::config::{SceneConfig, ENV_CONFIG};
use evergreen::error::CaptureError;
use evergreen::Evergreen;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("evergreen=info")))
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match std::env::var(ENV_CONFIG) {
        Ok(path) => SceneConfig::load(path)?,
        Err(_) => SceneConfig::default(),
    };
    config.apply_env()?;
    config.validate()?;

    let mut app = attach_frames(Evergreen::new(config.clone()), config.ingest.frame_source.as_deref());

    if let Some(url) = &config.ingest.classifier_url {
        app = with_http_classifier(app, url, &config)?;
    }

    app.run()?;
    Ok(())
}

/// A missing camera is not fatal: the tree still runs on the keyboard.
fn attach_frames(app: Evergreen, path: Option<&str>) -> Evergreen {
    let Some(path) = path.map(Path::new) else {
        return app;
    };
    match open_frames(path) {
        Ok(mut source) => app.with_frame_source(move || source.current_frame()),
        Err(err) => {
            tracing::warn!("camera unavailable: {err}");
            app
        }
    }
}

fn open_frames(path: &Path) -> Result<Box<dyn FrameSource>, CaptureError> {
    if path.is_dir() {
        let frames = DirectoryFrames::open(path)?;
        tracing::info!("replaying {} frames from {}", frames.frame_count(), path.display());
        Ok(Box::new(frames))
    } else {
        Ok(Box::new(StillFrame::open(path)?))
    }
}

#[cfg(feature = "http-classifier")]
fn with_http_classifier(
    app: Evergreen,
    url: &str,
    config: &SceneConfig,
) -> Result<Evergreen, Box<dyn std::error::Error>> {
    use evergreen::classifier::HttpClassifier;
    use evergreen::config::ENV_CLASSIFIER_KEY;
    use std::sync::Arc;

    let mut classifier = HttpClassifier::new(url, config.ingest.params().timeout)?;
    if let Ok(key) = std::env::var(ENV_CLASSIFIER_KEY) {
        classifier = classifier.with_api_key(key);
    }
    tracing::info!("gesture classifier at {}", classifier.url());
    Ok(app.with_classifier(Arc::new(classifier)))
}

#[cfg(not(feature = "http-classifier"))]
fn with_http_classifier(
    app: Evergreen,
    _url: &str,
    _config: &SceneConfig,
) -> Result<Evergreen, Box<dyn std::error::Error>> {
    tracing::warn!("classifier URL set but HTTP support not compiled. Build with --features http-classifier");
    Ok(app)
}
