mod utils;

pub mod capture;
pub mod error;
pub mod jobs;
pub mod models;
pub mod polling;
pub mod services;
pub mod session;
pub mod settings;
pub mod surfaces;
pub mod upload;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};

pub use capture::{CameraBackend, CaptureController, SyntheticCamera};
pub use error::{CameraError, CaptureError, PipelineError, PipelineResult};
pub use services::{Collaborators, HttpBackend};
pub use session::{JobPhase, SessionController, SessionSnapshot};
pub use settings::{PipelineConfig, SettingsStore};
pub use utils::{format_duration, init_logging, parse_backend_datetime};

/// Wires a controller to the REST backend described by `config`.
pub fn connect(config: PipelineConfig, camera: Arc<dyn CameraBackend>) -> Result<SessionController> {
    let backend = HttpBackend::new(&config.api).context("failed to build HTTP backend")?;
    let services = Collaborators::from_http(Arc::new(backend));
    Ok(SessionController::new(services, camera, config))
}

/// Kiosk entry point: logging, settings from `settings_path` with environment
/// overrides, then a controller talking to the configured backend.
pub fn start_kiosk(settings_path: PathBuf, camera: Arc<dyn CameraBackend>) -> Result<SessionController> {
    init_logging();
    log::info!("Future Self kiosk starting up...");

    let settings = SettingsStore::new(settings_path)?;
    let config = settings.pipeline().with_env_overrides();
    log::info!(
        "backend {} (timeout {}s, poll every {}ms)",
        config.api.base_url,
        config.api.timeout_secs,
        config.poll_interval_ms
    );
    connect(config, camera)
}
