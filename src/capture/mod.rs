pub mod camera;
pub mod clock;
mod controller;

pub use camera::{CameraBackend, CameraStream, StreamConstraints, SyntheticCamera};
pub use clock::{ClockStatus, RecordingClock};
pub use controller::{CaptureController, RecorderPhase, RecordingHandle};
