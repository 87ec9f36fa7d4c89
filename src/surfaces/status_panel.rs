use serde::Serialize;

use crate::{
    models::SessionStatus,
    session::{SessionController, SessionSnapshot},
};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "phase")]
pub enum DisplayPhase {
    Waiting,
    Uploading {
        percentage: u8,
    },
    Queued,
    Processing,
    Complete {
        image_url: Option<String>,
        video_url: Option<String>,
    },
    TimedOut,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusDisplay {
    pub phase: DisplayPhase,
    pub title: &'static str,
    pub description: &'static str,
    /// "Name - Group", shown while the session is still in flight.
    pub subject: Option<String>,
}

/// Maps a snapshot to what the status panel shows. `None` when there is no
/// session to talk about.
pub fn describe(snapshot: &SessionSnapshot) -> Option<StatusDisplay> {
    let session = snapshot.session.as_ref()?;

    let (phase, title, description) = match session.status {
        SessionStatus::Idle | SessionStatus::Capturing => (
            DisplayPhase::Waiting,
            "Ready to Record",
            "Finish the recording to continue.",
        ),
        SessionStatus::Uploading => (
            DisplayPhase::Uploading {
                percentage: snapshot.upload.percentage,
            },
            "Uploading...",
            "Please wait...",
        ),
        SessionStatus::Queued => (
            DisplayPhase::Queued,
            "Queued for Processing",
            "Your session is in the queue...",
        ),
        SessionStatus::Processing | SessionStatus::Active => (
            DisplayPhase::Processing,
            "Processing Your Future",
            "AI is generating your future image and video...",
        ),
        SessionStatus::Ready | SessionStatus::Published => {
            let outputs = session.outputs.clone().unwrap_or_default();
            (
                DisplayPhase::Complete {
                    image_url: outputs.image_url,
                    video_url: outputs.video_url,
                },
                if session.status == SessionStatus::Ready {
                    "Session Complete!"
                } else {
                    "Session Complete"
                },
                "Thank you for using Future Frame",
            )
        }
        SessionStatus::TimedOut => (
            DisplayPhase::TimedOut,
            "Still Processing",
            "This is taking longer than expected. Check the gallery later.",
        ),
    };

    let in_flight = !matches!(
        phase,
        DisplayPhase::Complete { .. } | DisplayPhase::TimedOut
    );
    Some(StatusDisplay {
        phase,
        title,
        description,
        subject: in_flight
            .then(|| format!("{} - {}", session.subject_name, session.subject_group)),
    })
}

/// Read-only status view plus the "start new session" action.
pub struct StatusPanel {
    controller: SessionController,
}

impl StatusPanel {
    pub fn new(controller: SessionController) -> Self {
        Self { controller }
    }

    pub async fn current(&self) -> Option<StatusDisplay> {
        describe(&self.controller.snapshot().await)
    }

    pub async fn start_new_session(&self) {
        self.controller.reset_session().await;
    }
}
