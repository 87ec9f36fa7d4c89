use serde::Serialize;

use crate::{
    capture::RecordingClock,
    models::{
        Branding, CaptureState, PendingSessionData, RecordedBlob, Session, SessionStatus,
        UploadProgress,
    },
};

/// Where the image-generation job of the current session stands.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum JobPhase {
    #[default]
    None,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

/// A recording whose upload or composition request failed, kept for
/// [`super::SessionController::retry_upload`].
#[derive(Debug, Clone)]
pub(crate) struct RetainedRecording {
    pub blob: RecordedBlob,
    /// Set when the upload itself went through and only composition failed.
    pub uploaded_ref: Option<String>,
}

/// Everything the container owns. Only `SessionController` mutates it.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub session: Option<Session>,
    pub capture: CaptureState,
    pub clock: RecordingClock,
    pub upload: UploadProgress,
    pub pending: Option<PendingSessionData>,
    pub current_job_id: Option<String>,
    pub job_phase: JobPhase,
    pub retained: Option<RetainedRecording>,
    pub branding: Option<Branding>,
    pub history: Vec<Session>,
    pub latest: Option<Session>,
    pub history_error: Option<String>,
    pub is_loading_history: bool,
    pub last_error: Option<String>,
    /// Bumped by every reset; async completions compare it before writing.
    pub epoch: u64,
}

impl SessionState {
    /// Drops everything tied to the current session. History and branding
    /// survive, the epoch moves on.
    pub fn reset(&mut self) {
        self.session = None;
        self.capture = CaptureState::default();
        self.clock.reset();
        self.upload = UploadProgress::default();
        self.pending = None;
        self.current_job_id = None;
        self.job_phase = JobPhase::None;
        self.retained = None;
        self.last_error = None;
        self.epoch = self.epoch.wrapping_add(1);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: self.session.clone(),
            capture: self.capture,
            upload: self.upload,
            pending: self.pending.clone(),
            current_job_id: self.current_job_id.clone(),
            job_phase: self.job_phase,
            has_retained_recording: self.retained.is_some(),
            history: self.history.clone(),
            latest: self.latest.clone(),
            history_error: self.history_error.clone(),
            is_loading_history: self.is_loading_history,
            last_error: self.last_error.clone(),
        }
    }
}

/// Read-only view published to the presentation surfaces after every change.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session: Option<Session>,
    pub capture: CaptureState,
    pub upload: UploadProgress,
    pub pending: Option<PendingSessionData>,
    pub current_job_id: Option<String>,
    pub job_phase: JobPhase,
    pub has_retained_recording: bool,
    pub history: Vec<Session>,
    pub latest: Option<Session>,
    pub history_error: Option<String>,
    pub is_loading_history: bool,
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    pub fn status(&self) -> Option<SessionStatus> {
        self.session.as_ref().map(|session| session.status)
    }
}
