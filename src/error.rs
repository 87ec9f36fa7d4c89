//! Error taxonomy of the capture pipeline.
//!
//! Collaborators (HTTP backend, camera backends) report `anyhow::Error`; the
//! session controller converts them at its operation boundary so callers can
//! match on the failure kind and show [`PipelineError::user_message`].

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("no camera stream has been acquired")]
    NotAuthorized,
    #[error("a recording is already in progress")]
    AlreadyRecording,
    #[error("no recording in progress")]
    NotRecording,
    #[error("camera stream failed: {0}")]
    Stream(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("submission rejected: {0}")]
    Submission(String),
    #[error("image generation failed for job {0}")]
    JobFailed(String),
    #[error("final video request rejected: {0}")]
    Composition(String),
    #[error("tenant branding unavailable: {0}")]
    Branding(String),
    #[error("no active session")]
    NoSession,
    #[error("no recording available to upload")]
    NoRecording,
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub(crate) fn upload(err: anyhow::Error) -> Self {
        PipelineError::Upload(format!("{err:#}"))
    }

    pub(crate) fn submission(err: anyhow::Error) -> Self {
        PipelineError::Submission(format!("{err:#}"))
    }

    pub(crate) fn composition(err: anyhow::Error) -> Self {
        PipelineError::Composition(format!("{err:#}"))
    }

    /// Whether the user can retry without starting over.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PipelineError::JobFailed(_) | PipelineError::NoSession)
    }

    /// Sentence shown by the presentation surfaces.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Capture(CaptureError::Camera(CameraError::PermissionDenied))
            | PipelineError::Capture(CaptureError::NotAuthorized) => {
                "Unable to access camera. Please check permissions.".to_string()
            }
            PipelineError::Capture(CaptureError::Camera(CameraError::DeviceUnavailable(_))) => {
                "No camera is available. Connect a camera and retry.".to_string()
            }
            PipelineError::Capture(CaptureError::AlreadyRecording) => {
                "A recording is already running.".to_string()
            }
            PipelineError::Capture(CaptureError::NotRecording) => {
                "There is no recording to stop.".to_string()
            }
            PipelineError::Capture(CaptureError::Stream(_)) => {
                "The camera stopped responding. Please retry.".to_string()
            }
            PipelineError::Upload(_) => {
                "Uploading the video failed. Your recording is kept, please retry.".to_string()
            }
            PipelineError::Submission(_) => {
                "Could not start the session. Please try again.".to_string()
            }
            PipelineError::JobFailed(_) => {
                "Image generation failed. Please choose a profession again.".to_string()
            }
            PipelineError::Composition(_) => {
                "Could not start the final video. Your recording is kept, please retry."
                    .to_string()
            }
            PipelineError::Branding(_) => {
                "School profile is not loaded. Please sign in again.".to_string()
            }
            PipelineError::NoSession => "No session is active.".to_string(),
            PipelineError::NoRecording => "Record a video before uploading.".to_string(),
            PipelineError::InvalidInput(reason) => reason.clone(),
        }
    }
}
