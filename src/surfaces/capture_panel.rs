use serde::Serialize;

use crate::{
    capture::RecorderPhase,
    error::{CameraError, CaptureError, PipelineError, PipelineResult},
    models::PendingSessionData,
    session::{JobPhase, SessionController, SessionSnapshot},
    utils::format_duration,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PanelStep {
    Ready,
    Recording,
    Selecting,
    Generating,
    Confirmed,
}

/// Live recording panel: records, asks for a profession, waits for the
/// generated image, then lets the user finish and upload.
pub struct CapturePanel {
    controller: SessionController,
    step: PanelStep,
    labels: Vec<String>,
    selected_label: Option<String>,
    camera_error: Option<String>,
    stop_error: Option<String>,
    is_stopping: bool,
}

impl CapturePanel {
    pub fn new(controller: SessionController) -> Self {
        Self {
            controller,
            step: PanelStep::Ready,
            labels: Vec::new(),
            selected_label: None,
            camera_error: None,
            stop_error: None,
            is_stopping: false,
        }
    }

    pub fn step(&self) -> PanelStep {
        self.step
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn selected_label(&self) -> Option<&str> {
        self.selected_label.as_deref()
    }

    pub fn camera_error(&self) -> Option<&str> {
        self.camera_error.as_deref()
    }

    pub fn stop_error(&self) -> Option<&str> {
        self.stop_error.as_deref()
    }

    /// Opens the configured camera and loads the profession list.
    pub async fn mount(&mut self) {
        self.labels = self.controller.labels().await;
        let facing = self.controller.config().capture.facing;
        let opened = self.controller.capture().acquire(facing).await;
        self.open_camera(opened);
    }

    pub async fn retry_camera(&mut self) {
        let opened = self.controller.capture().retry().await;
        self.open_camera(opened);
    }

    pub async fn unmount(&mut self) {
        self.controller.capture().release().await;
    }

    fn open_camera<T>(&mut self, result: Result<T, CameraError>) {
        match result {
            Ok(_) => self.camera_error = None,
            Err(err) => {
                log_warn!("camera unavailable: {err}");
                let err = PipelineError::from(CaptureError::from(err));
                self.camera_error = Some(err.user_message());
            }
        }
    }

    pub async fn switch_camera(&mut self) {
        let result = self.controller.switch_camera().await;
        let discarded = match result {
            Ok(discarded) => {
                self.camera_error = None;
                discarded
            }
            Err(err) => {
                log_warn!("camera switch failed: {err}");
                self.camera_error = Some(err.user_message());
                // The recorder is torn down even when the other camera failed.
                self.controller.capture().phase().await == RecorderPhase::Inactive
            }
        };
        if discarded && matches!(self.step, PanelStep::Recording | PanelStep::Selecting) {
            self.step = PanelStep::Ready;
        }
    }

    /// The record button: start, pause or resume depending on where we are.
    pub async fn record_control(&mut self) -> PipelineResult<()> {
        let snapshot = self.controller.snapshot().await;
        if self.step == PanelStep::Ready {
            self.controller.start_recording().await?;
            self.step = PanelStep::Recording;
        } else if snapshot.capture.is_recording {
            self.controller.pause_recording().await?;
        } else if self.controller.capture().phase().await == RecorderPhase::Paused {
            self.controller.start_recording().await?;
        }
        Ok(())
    }

    pub fn select_label(&mut self, label: &str) -> PipelineResult<()> {
        if !matches!(self.step, PanelStep::Recording | PanelStep::Selecting) {
            return Err(PipelineError::InvalidInput(
                "start recording before choosing a profession".into(),
            ));
        }
        if !self.labels.is_empty() && !self.labels.iter().any(|known| known == label) {
            return Err(PipelineError::InvalidInput(format!("unknown profession '{label}'")));
        }
        self.selected_label = Some(label.to_string());
        self.step = PanelStep::Selecting;
        Ok(())
    }

    /// Starts the session for the selected label. Any failure puts the panel
    /// back on the profession picker.
    pub async fn confirm_label(&mut self) -> PipelineResult<()> {
        let Some(label) = self.selected_label.clone() else {
            return Err(PipelineError::InvalidInput("choose a profession first".into()));
        };
        let Some(pending) = subject_of(self.controller.snapshot().await) else {
            return Err(PipelineError::InvalidInput("take the photo first".into()));
        };

        self.controller.set_label(&label).await;
        self.step = PanelStep::Generating;
        match self
            .controller
            .start_session(
                &pending.subject_name,
                &pending.subject_group,
                &label,
                &pending.still_image_ref,
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                log_debug!("back to profession selection: {err}");
                self.step = PanelStep::Selecting;
                Err(err)
            }
        }
    }

    /// Follows the job from the snapshot: an image moves the panel on, a
    /// failed or stuck job quietly returns to the picker.
    pub fn sync(&mut self, snapshot: &SessionSnapshot) {
        if self.step != PanelStep::Generating {
            return;
        }
        match snapshot.job_phase {
            JobPhase::Succeeded => self.step = PanelStep::Confirmed,
            JobPhase::Failed | JobPhase::TimedOut => self.step = PanelStep::Selecting,
            JobPhase::None | JobPhase::Running => {}
        }
    }

    /// Stops the recording and hands it to the upload pipeline.
    pub async fn stop_recording(&mut self) -> PipelineResult<()> {
        self.is_stopping = true;
        self.stop_error = None;

        let result = match self.controller.stop_recording().await {
            Ok(blob) => self.controller.stop_session_and_upload(blob).await,
            Err(err) => Err(err),
        };
        self.is_stopping = false;

        if let Err(err) = &result {
            self.stop_error = Some(err.user_message());
        }
        result
    }

    /// Re-sends a recording whose upload failed.
    pub async fn retry_upload(&mut self) -> PipelineResult<()> {
        self.is_stopping = true;
        self.stop_error = None;
        let result = self.controller.retry_upload().await;
        self.is_stopping = false;
        if let Err(err) = &result {
            self.stop_error = Some(err.user_message());
        }
        result
    }

    pub fn record_button_caption(&self, snapshot: &SessionSnapshot) -> &'static str {
        if self.step == PanelStep::Ready {
            "Start Recording"
        } else if snapshot.capture.is_recording {
            "Pause Recording"
        } else {
            "Recording Paused"
        }
    }

    pub fn stop_button_caption(&self) -> &'static str {
        if self.is_stopping {
            "Processing..."
        } else {
            "Stop Recording"
        }
    }

    /// Stopping is offered once something was recorded and it is paused.
    pub fn can_stop(&self, snapshot: &SessionSnapshot) -> bool {
        self.step == PanelStep::Confirmed
            && !self.is_stopping
            && !snapshot.capture.is_recording
            && snapshot.capture.recording_duration_seconds > 0
    }

    pub fn duration_label(&self, snapshot: &SessionSnapshot) -> String {
        format_duration(snapshot.capture.recording_duration_seconds)
    }
}

/// Who is being recorded. Pending data is consumed once a job is accepted, so
/// after a failed job the identity comes from the session itself.
fn subject_of(snapshot: SessionSnapshot) -> Option<PendingSessionData> {
    if let Some(pending) = snapshot.pending {
        return Some(pending);
    }
    let session = snapshot.session?;
    Some(PendingSessionData {
        still_image_ref: session.still_image_ref?,
        subject_name: session.subject_name,
        subject_group: session.subject_group,
    })
}
