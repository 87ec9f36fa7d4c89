//! Integration tests for recording duration and camera handling.

mod common;

use std::time::Duration;

use common::{controller, session_with_image, FakeBackend};
use futureself_lib::{
    capture::RecorderPhase,
    models::{CameraFacing, CaptureState, UploadProgress},
    CameraError, CaptureError, PipelineError,
};
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn duration_is_the_sum_of_recorded_windows() {
    let backend = FakeBackend::new();
    let (controller, _camera) = controller(&backend);
    controller.capture().acquire(CameraFacing::Front).await.unwrap();

    controller.start_recording().await.unwrap();
    sleep(Duration::from_secs(5)).await;
    controller.pause_recording().await.unwrap();
    assert_eq!(controller.snapshot().await.capture.recording_duration_seconds, 5);

    sleep(Duration::from_secs(3)).await;
    let paused = controller.snapshot().await.capture;
    assert!(!paused.is_recording);
    assert_eq!(paused.recording_duration_seconds, 5);

    // Starting again while paused resumes the same recording.
    controller.start_recording().await.unwrap();
    sleep(Duration::from_secs(2)).await;
    let blob = controller.stop_recording().await.unwrap();

    let capture = controller.snapshot().await.capture;
    assert_eq!(capture.recording_duration_seconds, 7);
    assert!(!capture.is_recording);
    assert!(!blob.is_empty());
    assert_eq!(blob.mime_type, "video/webm;codecs=vp8");
}

#[tokio::test(start_paused = true)]
async fn many_short_pauses_lose_no_time() {
    let backend = FakeBackend::new();
    let (controller, _camera) = controller(&backend);
    controller.capture().acquire(CameraFacing::Front).await.unwrap();

    controller.start_recording().await.unwrap();
    for _ in 0..5 {
        sleep(Duration::from_millis(600)).await;
        controller.pause_recording().await.unwrap();
        sleep(Duration::from_millis(400)).await;
        controller.start_recording().await.unwrap();
    }
    controller.stop_recording().await.unwrap();

    assert_eq!(controller.snapshot().await.capture.recording_duration_seconds, 3);
}

#[tokio::test(start_paused = true)]
async fn ticker_refreshes_duration_while_recording() {
    let backend = FakeBackend::new();
    let (controller, _camera) = controller(&backend);
    controller.capture().acquire(CameraFacing::Front).await.unwrap();

    controller.start_recording().await.unwrap();
    sleep(Duration::from_millis(3_500)).await;
    let capture = controller.snapshot().await.capture;
    assert!(capture.is_recording);
    assert_eq!(capture.recording_duration_seconds, 3);
}

#[tokio::test(start_paused = true)]
async fn recording_without_camera_is_not_authorized() {
    let backend = FakeBackend::new();
    let (controller, _camera) = controller(&backend);

    let err = controller.start_recording().await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Capture(CaptureError::NotAuthorized)
    ));
    assert!(err.user_message().contains("check permissions"));
    assert!(!controller.snapshot().await.capture.is_recording);
}

#[tokio::test(start_paused = true)]
async fn switching_camera_mid_recording_discards_it() {
    let backend = FakeBackend::new();
    let (controller, camera) = controller(&backend);
    controller.capture().acquire(CameraFacing::Front).await.unwrap();
    controller.start_recording().await.unwrap();
    sleep(Duration::from_secs(2)).await;

    assert!(controller.switch_camera().await.unwrap());

    let capture = controller.snapshot().await.capture;
    assert!(!capture.is_recording);
    assert_eq!(capture.recording_duration_seconds, 0);
    assert_eq!(controller.capture().facing().await, CameraFacing::Back);
    assert_eq!(controller.capture().phase().await, RecorderPhase::Inactive);
    assert_eq!(camera.open_handles(), 1);

    // A brand-new recording starts from zero on the other camera.
    controller.start_recording().await.unwrap();
    sleep(Duration::from_secs(1)).await;
    let blob = controller.stop_recording().await.unwrap();
    assert!(blob.bytes.chunks(8).all(|chunk| chunk[0] == b'B'));
}

#[tokio::test(start_paused = true)]
async fn failed_switch_mid_recording_still_stops_the_clock() {
    let backend = FakeBackend::new();
    let (controller, camera) = controller(&backend);
    controller.capture().acquire(CameraFacing::Front).await.unwrap();
    controller.start_recording().await.unwrap();
    sleep(Duration::from_secs(3)).await;

    camera.set_failure(Some(CameraError::DeviceUnavailable("gone".into())));
    let err = controller.switch_camera().await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Capture(CaptureError::Camera(CameraError::DeviceUnavailable(_)))
    ));

    sleep(Duration::from_secs(5)).await;
    let capture = controller.snapshot().await.capture;
    assert!(!capture.is_recording);
    assert_eq!(capture.recording_duration_seconds, 0);
    assert_eq!(controller.capture().phase().await, RecorderPhase::Inactive);
    assert!(!controller.capture().has_stream().await);

    // Once the camera is back a fresh recording starts from zero.
    camera.set_failure(None);
    controller.capture().retry().await.unwrap();
    controller.start_recording().await.unwrap();
    sleep(Duration::from_secs(2)).await;
    controller.stop_recording().await.unwrap();
    assert_eq!(controller.snapshot().await.capture.recording_duration_seconds, 2);
}

#[tokio::test(start_paused = true)]
async fn reset_returns_everything_to_blank() {
    let backend = FakeBackend::new();
    let (controller, _camera) = controller(&backend);
    session_with_image(&controller).await;
    controller.take_photo().await;
    controller.capture().acquire(CameraFacing::Front).await.unwrap();
    controller.start_recording().await.unwrap();
    sleep(Duration::from_secs(4)).await;

    controller.reset_session().await;

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.capture, CaptureState::default());
    assert_eq!(snapshot.upload, UploadProgress::default());
    assert!(snapshot.session.is_none());
    assert!(snapshot.pending.is_none());
    assert!(snapshot.current_job_id.is_none());
    assert!(!snapshot.has_retained_recording);

    // No ticker survives the reset.
    sleep(Duration::from_secs(5)).await;
    assert_eq!(controller.snapshot().await.capture, CaptureState::default());
    assert!(controller.capture().has_stream().await);
}
