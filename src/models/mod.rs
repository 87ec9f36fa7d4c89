mod branding;
mod capture;
mod job;
mod session;

pub use branding::Branding;
pub use capture::{CameraFacing, CaptureState, RecordedBlob, UploadProgress};
pub use job::{Job, JobSnapshot, JobStatus};
pub use session::{PendingSessionData, Session, SessionOutputs, SessionStatus};
