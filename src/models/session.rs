use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Idle,
    Capturing,
    Uploading,
    Queued,
    Processing,
    /// Reported by the composition backend while a render is running.
    Active,
    Ready,
    Published,
    /// Client-side terminal status: the polling ceiling was reached.
    TimedOut,
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Idle
    }
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Capturing => "capturing",
            SessionStatus::Uploading => "uploading",
            SessionStatus::Queued => "queued",
            SessionStatus::Processing => "processing",
            SessionStatus::Active => "active",
            SessionStatus::Ready => "ready",
            SessionStatus::Published => "published",
            SessionStatus::TimedOut => "timedOut",
        }
    }

    /// Position along `idle -> capturing -> uploading -> queued -> processing
    /// -> ready -> published`. `active` shares the `processing` slot.
    pub fn rank(&self) -> u8 {
        match self {
            SessionStatus::Idle => 0,
            SessionStatus::Capturing => 1,
            SessionStatus::Uploading => 2,
            SessionStatus::Queued => 3,
            SessionStatus::Processing | SessionStatus::Active => 4,
            SessionStatus::Ready => 5,
            SessionStatus::Published => 6,
            SessionStatus::TimedOut => 7,
        }
    }

    /// Statuses that keep the session poller scheduling another tick.
    pub fn keeps_polling(&self) -> bool {
        matches!(
            self,
            SessionStatus::Queued | SessionStatus::Processing | SessionStatus::Active
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Ready | SessionStatus::Published | SessionStatus::TimedOut
        )
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "idle" => Ok(SessionStatus::Idle),
            "capturing" => Ok(SessionStatus::Capturing),
            "uploading" => Ok(SessionStatus::Uploading),
            "queued" => Ok(SessionStatus::Queued),
            "processing" => Ok(SessionStatus::Processing),
            "active" => Ok(SessionStatus::Active),
            "ready" => Ok(SessionStatus::Ready),
            "published" => Ok(SessionStatus::Published),
            "timedout" | "timed-out" | "timed_out" => Ok(SessionStatus::TimedOut),
            other => Err(anyhow::anyhow!("unknown session status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutputs {
    pub image_url: Option<String>,
    pub video_url: Option<String>,
}

/// Identity captured by the form before a session exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingSessionData {
    pub subject_name: String,
    pub subject_group: String,
    pub still_image_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub subject_name: String,
    pub subject_group: String,
    pub tenant_id: String,
    pub status: SessionStatus,
    pub label: Option<String>,
    pub still_image_ref: Option<String>,
    pub generated_image_ref: Option<String>,
    pub recording_ref: Option<String>,
    pub outputs: Option<SessionOutputs>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Moves the status forward. Returns `false`, leaving the record untouched,
    /// when `next` would move backwards or the session already ended.
    pub fn advance(&mut self, next: SessionStatus) -> bool {
        if self.status == SessionStatus::TimedOut || next.rank() < self.status.rank() {
            return false;
        }
        if next == SessionStatus::TimedOut && self.status.is_terminal() {
            return false;
        }
        self.status = next;
        true
    }

    /// Explicit recovery path: a failed job returns the session to `idle`, a
    /// failed upload restores the status it had before `uploading`.
    pub fn rollback_to(&mut self, previous: SessionStatus) {
        self.status = previous;
        if previous != SessionStatus::Ready {
            self.outputs = None;
        }
    }

    /// Outputs only attach to a `ready` session.
    pub fn attach_outputs(&mut self, outputs: SessionOutputs) -> bool {
        if self.status != SessionStatus::Ready {
            return false;
        }
        if let Some(image_url) = outputs.image_url.clone() {
            self.generated_image_ref = Some(image_url);
        }
        self.outputs = Some(outputs);
        true
    }

    /// Image sent to composition: the generated one when present, otherwise the
    /// original still photo.
    pub fn composition_image_ref(&self) -> Option<&str> {
        self.generated_image_ref
            .as_deref()
            .or(self.still_image_ref.as_deref())
    }
}
