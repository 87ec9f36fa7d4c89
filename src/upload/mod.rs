//! Blob uploads plus the synthetic progress shown while they run.

use std::{future::Future, sync::Arc};

use tokio::{
    task::JoinHandle,
    time::{self, Duration, MissedTickBehavior},
};

use crate::{
    error::{PipelineError, PipelineResult},
    models::RecordedBlob,
    services::UploadService,
    settings::PipelineConfig,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Cadence of the fake progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressCadence {
    pub tick: Duration,
    pub step_percent: u8,
    pub cap_percent: u8,
}

impl ProgressCadence {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            tick: config.upload_tick(),
            step_percent: config.upload_step_percent,
            cap_percent: config.upload_cap_percent.min(99),
        }
    }
}

/// Thin wrapper over the upload service. It never retries on its own.
#[derive(Clone)]
pub struct UploadAdapter {
    service: Arc<dyn UploadService>,
    cadence: ProgressCadence,
}

impl UploadAdapter {
    pub fn new(service: Arc<dyn UploadService>, cadence: ProgressCadence) -> Self {
        Self { service, cadence }
    }

    pub fn cadence(&self) -> ProgressCadence {
        self.cadence
    }

    pub async fn upload_blob(&self, blob: &RecordedBlob) -> PipelineResult<String> {
        if blob.is_empty() {
            return Err(PipelineError::NoRecording);
        }
        let file_name = blob.file_name();
        self.upload_bytes(&file_name, &blob.mime_type, blob.bytes.clone())
            .await
    }

    /// Used for the still photo, which never becomes a [`RecordedBlob`].
    pub async fn upload_bytes(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> PipelineResult<String> {
        let size = bytes.len();
        log_debug!("uploading {file_name} ({size} bytes, {mime_type})");
        match self.service.upload(file_name, mime_type, bytes).await {
            Ok(reference) => {
                log_info!("uploaded {file_name} as {reference}");
                Ok(reference)
            }
            Err(err) => {
                log_warn!("upload of {file_name} failed: {err:#}");
                Err(PipelineError::upload(err))
            }
        }
    }

    /// Calls `on_tick(step, cap)` every tick until it returns `false` or the
    /// ticker is stopped. The first bump happens one tick after spawning.
    pub fn spawn_progress<F, Fut>(&self, mut on_tick: F) -> ProgressTicker
    where
        F: FnMut(u8, u8) -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send,
    {
        let cadence = self.cadence;
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(time::Instant::now() + cadence.tick, cadence.tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !on_tick(cadence.step_percent, cadence.cap_percent).await {
                    break;
                }
            }
        });
        ProgressTicker {
            handle: Some(handle),
        }
    }
}

/// Owns the progress task; stopping or dropping it aborts the task.
#[derive(Debug)]
pub struct ProgressTicker {
    handle: Option<JoinHandle<()>>,
}

impl ProgressTicker {
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.stop();
    }
}
