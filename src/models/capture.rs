use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CameraFacing {
    Front,
    Back,
}

impl Default for CameraFacing {
    fn default() -> Self {
        CameraFacing::Front
    }
}

impl CameraFacing {
    pub fn toggled(self) -> Self {
        match self {
            CameraFacing::Front => CameraFacing::Back,
            CameraFacing::Back => CameraFacing::Front,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureState {
    pub is_recording: bool,
    pub has_photo: bool,
    pub recording_duration_seconds: u64,
}

/// UI-facing upload indicator. Percentages below 100 are synthetic.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub percentage: u8,
    pub is_uploading: bool,
}

impl UploadProgress {
    pub fn started() -> Self {
        Self {
            percentage: 0,
            is_uploading: true,
        }
    }

    pub fn completed() -> Self {
        Self {
            percentage: 100,
            is_uploading: false,
        }
    }

    /// Adds `step` without crossing `cap`. No-op once the upload settled.
    pub fn bump(&mut self, step: u8, cap: u8) {
        if !self.is_uploading || self.percentage >= cap {
            return;
        }
        self.percentage = self.percentage.saturating_add(step).min(cap);
    }
}

/// The assembled output of one recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBlob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub chunk_count: usize,
}

impl RecordedBlob {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File name handed to the upload service, derived from the mime type.
    pub fn file_name(&self) -> String {
        let extension = self
            .mime_type
            .split(';')
            .next()
            .and_then(|essence| essence.split('/').nth(1))
            .filter(|ext| !ext.is_empty())
            .unwrap_or("bin");
        format!("recording.{extension}")
    }
}
