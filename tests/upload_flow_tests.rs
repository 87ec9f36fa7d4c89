//! Integration tests for video upload, final composition and session polling.

mod common;

use std::time::Duration;

use common::{controller, controller_with, record, session_with_image, wait_for, FakeBackend};
use futureself_lib::{
    models::{SessionStatus, UploadProgress},
    PipelineConfig, PipelineError,
};
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn rejected_upload_restores_status_and_keeps_blob_for_retry() {
    let backend = FakeBackend::new();
    backend.script().upload_failures = 1;
    let (controller, _camera) = controller(&backend);
    session_with_image(&controller).await;
    let blob = record(&controller, 3).await;

    let err = controller.stop_session_and_upload(blob).await.unwrap_err();
    assert!(matches!(err, PipelineError::Upload(_)));

    let snapshot = controller.snapshot().await;
    assert_eq!(
        snapshot.upload,
        UploadProgress {
            percentage: 0,
            is_uploading: false
        }
    );
    assert_eq!(snapshot.status(), Some(SessionStatus::Capturing));
    assert!(snapshot.has_retained_recording);
    assert_eq!(backend.calls().compositions, 0);

    controller.retry_upload().await.unwrap();
    let snapshot = controller.snapshot().await;
    assert!(!snapshot.has_retained_recording);
    assert_eq!(backend.calls().uploads, 2);
    assert_eq!(
        snapshot.session.unwrap().recording_ref.as_deref(),
        Some("vid-2")
    );
}

#[tokio::test(start_paused = true)]
async fn rejected_composition_does_not_upload_twice() {
    let backend = FakeBackend::new();
    backend.script().composition_failures = 1;
    let (controller, _camera) = controller(&backend);
    session_with_image(&controller).await;
    let blob = record(&controller, 2).await;

    let err = controller.stop_session_and_upload(blob).await.unwrap_err();
    assert!(matches!(err, PipelineError::Composition(_)));
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.upload, UploadProgress::default());
    assert_eq!(snapshot.status(), Some(SessionStatus::Capturing));

    controller.retry_upload().await.unwrap();
    let calls = backend.calls();
    assert_eq!(calls.uploads, 1);
    assert_eq!(calls.compositions, 2);

    let request = calls.last_composition.unwrap();
    assert_eq!(request.recording_ref, "vid-1");
    assert_eq!(request.image_ref, "gen1");
    assert_eq!(request.tenant_id, "school-1");
    assert_eq!(request.watermark_logo_ref, "logo.png");
    assert_eq!(request.tagline, "Dream big");
}

#[tokio::test(start_paused = true)]
async fn progress_is_synthetic_until_upload_confirms() {
    let backend = FakeBackend::new();
    backend.script().upload_delay = Some(Duration::from_secs(3));
    backend.script().session_statuses = [SessionStatus::Queued].into();
    let (controller, _camera) = controller(&backend);
    session_with_image(&controller).await;
    let blob = record(&controller, 2).await;

    let uploading = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.stop_session_and_upload(blob).await })
    };

    sleep(Duration::from_millis(650)).await;
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.status(), Some(SessionStatus::Uploading));
    assert_eq!(
        snapshot.upload,
        UploadProgress {
            percentage: 30,
            is_uploading: true
        }
    );

    sleep(Duration::from_millis(1_900)).await;
    assert_eq!(controller.snapshot().await.upload.percentage, 90);

    uploading.await.unwrap().unwrap();
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.upload, UploadProgress::completed());
    assert_eq!(snapshot.status(), Some(SessionStatus::Queued));
}

#[tokio::test(start_paused = true)]
async fn ready_session_fetches_outputs_exactly_once() {
    let backend = FakeBackend::new();
    backend.script().session_statuses =
        [SessionStatus::Queued, SessionStatus::Processing, SessionStatus::Ready].into();
    let (controller, _camera) = controller(&backend);
    session_with_image(&controller).await;
    let blob = record(&controller, 2).await;

    controller.stop_session_and_upload(blob).await.unwrap();
    let snapshot = wait_for(&controller, |s| {
        s.session.as_ref().is_some_and(|session| session.outputs.is_some())
    })
    .await;

    let session = snapshot.session.unwrap();
    assert_eq!(session.status, SessionStatus::Ready);
    let outputs = session.outputs.unwrap();
    assert_eq!(outputs.video_url.as_deref(), Some("https://cdn/final.mp4"));
    assert_eq!(session.generated_image_ref.as_deref(), Some("https://cdn/gen1.png"));

    sleep(Duration::from_secs(60)).await;
    let calls = backend.calls();
    assert_eq!(calls.status_polls, 3);
    assert_eq!(calls.outputs_fetches, 1);
}

#[tokio::test(start_paused = true)]
async fn active_status_keeps_polling() {
    let backend = FakeBackend::new();
    backend.script().session_statuses = [
        SessionStatus::Active,
        SessionStatus::Active,
        SessionStatus::Published,
    ]
    .into();
    let (controller, _camera) = controller(&backend);
    session_with_image(&controller).await;
    let blob = record(&controller, 1).await;

    controller.stop_session_and_upload(blob).await.unwrap();
    wait_for(&controller, |s| s.status() == Some(SessionStatus::Published)).await;

    sleep(Duration::from_secs(30)).await;
    let calls = backend.calls();
    assert_eq!(calls.status_polls, 3);
    assert_eq!(calls.outputs_fetches, 0);
}

#[tokio::test(start_paused = true)]
async fn session_poll_ceiling_marks_session_timed_out() {
    let backend = FakeBackend::new();
    backend.script().session_statuses = [SessionStatus::Processing].into();
    let config = PipelineConfig {
        max_poll_attempts: Some(5),
        ..PipelineConfig::default()
    };
    let (controller, _camera) = controller_with(&backend, config);
    session_with_image(&controller).await;
    let blob = record(&controller, 1).await;

    controller.stop_session_and_upload(blob).await.unwrap();
    let snapshot = wait_for(&controller, |s| s.status() == Some(SessionStatus::TimedOut)).await;

    assert!(snapshot.last_error.is_some());
    assert_eq!(backend.calls().status_polls, 5);
    sleep(Duration::from_secs(60)).await;
    assert_eq!(backend.calls().status_polls, 5);
}

#[tokio::test(start_paused = true)]
async fn upload_needs_a_session() {
    let backend = FakeBackend::new();
    let (controller, _camera) = controller(&backend);
    let blob = record(&controller, 1).await;

    let err = controller.stop_session_and_upload(blob).await.unwrap_err();
    assert!(matches!(err, PipelineError::NoSession));
    assert_eq!(backend.calls().uploads, 0);
    assert!(matches!(
        controller.retry_upload().await,
        Err(PipelineError::NoRecording)
    ));
}
