use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, Duration, MissedTickBehavior},
};
use uuid::Uuid;

use crate::{
    error::{CameraError, CaptureError},
    models::{CameraFacing, RecordedBlob},
    settings::CaptureOptions,
};

use super::camera::{CameraBackend, CameraStream, StreamConstraints};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RecorderPhase {
    Inactive,
    Recording,
    Paused,
    Stopped,
}

/// Returned when a recording starts.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordingHandle {
    pub recording_id: Uuid,
    pub facing: CameraFacing,
    pub started_at: DateTime<Utc>,
}

struct CaptureInner {
    stream: Option<Box<dyn CameraStream>>,
    facing: CameraFacing,
    phase: RecorderPhase,
    chunks: Vec<Vec<u8>>,
    finished: Option<RecordedBlob>,
    ticker: Option<JoinHandle<()>>,
}

impl CaptureInner {
    fn flush_chunk(&mut self) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        match stream.next_chunk() {
            Ok(chunk) if !chunk.is_empty() => self.chunks.push(chunk),
            Ok(_) => {}
            Err(err) => log_warn!("dropping unreadable chunk: {err}"),
        }
    }

    fn cancel_ticker(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }

    fn discard_media(&mut self) -> bool {
        self.cancel_ticker();
        let had_media = matches!(self.phase, RecorderPhase::Recording | RecorderPhase::Paused)
            || !self.chunks.is_empty()
            || self.finished.is_some();
        self.chunks.clear();
        self.finished = None;
        self.phase = RecorderPhase::Inactive;
        had_media
    }

    fn release_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
    }
}

/// Owns the camera stream and the chunked recorder.
///
/// Chunks are appended by a background ticker every `chunk_interval` while the
/// recorder is in [`RecorderPhase::Recording`]; pausing stops the appends but
/// keeps the sequence, so resume continues where it left off.
pub struct CaptureController {
    backend: Arc<dyn CameraBackend>,
    options: CaptureOptions,
    inner: Arc<Mutex<CaptureInner>>,
}

impl CaptureController {
    pub fn new(backend: Arc<dyn CameraBackend>, options: CaptureOptions) -> Self {
        let facing = options.facing;
        Self {
            backend,
            options,
            inner: Arc::new(Mutex::new(CaptureInner {
                stream: None,
                facing,
                phase: RecorderPhase::Inactive,
                chunks: Vec::new(),
                finished: None,
                ticker: None,
            })),
        }
    }

    /// Opens the camera facing `facing`. Any previous stream is released first
    /// and any recording on it is discarded; on failure no stream is held.
    pub async fn acquire(&self, facing: CameraFacing) -> Result<CameraFacing, CameraError> {
        let mut inner = self.inner.lock().await;
        if inner.discard_media() {
            log_warn!("camera re-acquired mid-recording; staged media discarded");
        }
        inner.release_stream();
        inner.facing = facing;

        let constraints = StreamConstraints::from_options(&self.options, facing);
        let stream = self.backend.open(&constraints).await?;
        log_info!("camera acquired ({:?})", stream.facing());
        inner.facing = stream.facing();
        inner.stream = Some(stream);
        Ok(inner.facing)
    }

    /// Flips between front and back camera. The first value tells whether a
    /// recording was force-stopped and discarded; it holds even when opening
    /// the other camera fails.
    pub async fn switch_camera(&self) -> (bool, Result<CameraFacing, CameraError>) {
        let (next, discarded) = {
            let mut inner = self.inner.lock().await;
            let discarded = inner.discard_media();
            (inner.facing.toggled(), discarded)
        };
        if discarded {
            log_info!("switching camera force-stopped the current recording");
        }
        (discarded, self.acquire(next).await)
    }

    /// Re-opens the current facing, e.g. after the user granted permission.
    pub async fn retry(&self) -> Result<CameraFacing, CameraError> {
        let facing = self.inner.lock().await.facing;
        self.acquire(facing).await
    }

    pub async fn start_recording(&self) -> Result<RecordingHandle, CaptureError> {
        let mut inner = self.inner.lock().await;
        if inner.stream.is_none() {
            return Err(CaptureError::NotAuthorized);
        }
        if matches!(inner.phase, RecorderPhase::Recording | RecorderPhase::Paused) {
            return Err(CaptureError::AlreadyRecording);
        }

        inner.cancel_ticker();
        inner.chunks.clear();
        inner.finished = None;
        inner.phase = RecorderPhase::Recording;
        inner.ticker = Some(self.spawn_chunk_ticker());

        let handle = RecordingHandle {
            recording_id: Uuid::new_v4(),
            facing: inner.facing,
            started_at: Utc::now(),
        };
        log_info!("recording {} started", handle.recording_id);
        Ok(handle)
    }

    /// Stops chunk emission. Already captured chunks are kept.
    pub async fn pause(&self) -> Result<(), CaptureError> {
        let mut inner = self.inner.lock().await;
        if inner.phase != RecorderPhase::Recording {
            return Err(CaptureError::NotRecording);
        }
        inner.flush_chunk();
        inner.phase = RecorderPhase::Paused;
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), CaptureError> {
        let mut inner = self.inner.lock().await;
        if inner.phase != RecorderPhase::Paused {
            return Err(CaptureError::NotRecording);
        }
        inner.phase = RecorderPhase::Recording;
        Ok(())
    }

    /// Assembles the recording into one blob. Calling it again returns the same
    /// blob until a new recording starts.
    pub async fn stop(&self) -> Result<RecordedBlob, CaptureError> {
        let mut inner = self.inner.lock().await;
        if let Some(blob) = &inner.finished {
            return Ok(blob.clone());
        }
        match inner.phase {
            RecorderPhase::Recording => inner.flush_chunk(),
            RecorderPhase::Paused => {}
            RecorderPhase::Inactive | RecorderPhase::Stopped => {
                return Err(CaptureError::NotRecording)
            }
        }
        inner.cancel_ticker();

        let chunks = std::mem::take(&mut inner.chunks);
        let blob = RecordedBlob {
            chunk_count: chunks.len(),
            bytes: chunks.concat(),
            mime_type: self.options.mime_type.clone(),
        };
        inner.phase = RecorderPhase::Stopped;
        inner.finished = Some(blob.clone());
        log_info!(
            "recording stopped: {} chunks, {} bytes",
            blob.chunk_count,
            blob.len()
        );
        Ok(blob)
    }

    /// Drops the recorder state without touching the stream.
    pub async fn discard_recording(&self) -> bool {
        self.inner.lock().await.discard_media()
    }

    /// Tears everything down; the controller can be re-acquired afterwards.
    pub async fn release(&self) {
        let mut inner = self.inner.lock().await;
        inner.discard_media();
        inner.release_stream();
        log_debug!("camera released");
    }

    pub async fn phase(&self) -> RecorderPhase {
        self.inner.lock().await.phase
    }

    pub async fn facing(&self) -> CameraFacing {
        self.inner.lock().await.facing
    }

    pub async fn has_stream(&self) -> bool {
        self.inner.lock().await.stream.is_some()
    }

    pub async fn chunk_count(&self) -> usize {
        self.inner.lock().await.chunks.len()
    }

    fn spawn_chunk_ticker(&self) -> JoinHandle<()> {
        let inner = self.inner.clone();
        let period: Duration = self.options.chunk_interval();

        tokio::spawn(async move {
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let mut guard = inner.lock().await;
                match guard.phase {
                    RecorderPhase::Recording => guard.flush_chunk(),
                    RecorderPhase::Paused => {}
                    RecorderPhase::Inactive | RecorderPhase::Stopped => break,
                }
            }
        })
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.try_lock() {
            inner.cancel_ticker();
            inner.release_stream();
        }
    }
}
