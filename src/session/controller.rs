use std::sync::Arc;

use anyhow::anyhow;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{
    capture::{CameraBackend, CaptureController},
    error::{PipelineError, PipelineResult},
    jobs::{JobEngine, JobOutcome},
    models::{
        Branding, PendingSessionData, RecordedBlob, Session, SessionStatus, UploadProgress,
    },
    polling::{poll_until, PollHandle, PollOutcome, PollPolicy, PollStep},
    services::{Collaborators, CreateSessionRequest, FinalCompositionRequest},
    settings::PipelineConfig,
    upload::{ProgressCadence, ProgressTicker, UploadAdapter},
};

use super::state::{JobPhase, RetainedRecording, SessionSnapshot, SessionState};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Background work owned by the container. All of it dies on reset.
#[derive(Default)]
struct Tasks {
    duration: Option<JoinHandle<()>>,
    upload: Option<ProgressTicker>,
    job: Option<PollHandle>,
    session: Option<PollHandle>,
}

impl Tasks {
    fn cancel_duration(&mut self) {
        if let Some(handle) = self.duration.take() {
            handle.abort();
        }
    }

    fn stop_upload(&mut self) {
        if let Some(mut ticker) = self.upload.take() {
            ticker.stop();
        }
    }

    fn cancel_all(&mut self) {
        self.cancel_duration();
        self.stop_upload();
        if let Some(handle) = self.job.take() {
            handle.cancel();
        }
        if let Some(handle) = self.session.take() {
            handle.cancel();
        }
    }
}

/// The session lifecycle container.
///
/// Cheap to clone; every clone drives the same session. Surfaces call the
/// operations below and read [`SessionSnapshot`]s from [`Self::subscribe`].
#[derive(Clone)]
pub struct SessionController {
    state: Arc<Mutex<SessionState>>,
    tasks: Arc<Mutex<Tasks>>,
    events: Arc<watch::Sender<SessionSnapshot>>,
    services: Collaborators,
    capture: Arc<CaptureController>,
    uploads: UploadAdapter,
    jobs: JobEngine,
    config: Arc<PipelineConfig>,
}

impl SessionController {
    pub fn new(
        services: Collaborators,
        camera: Arc<dyn CameraBackend>,
        config: PipelineConfig,
    ) -> Self {
        let (events, _) = watch::channel(SessionSnapshot::default());
        let policy = PollPolicy::from_config(&config);

        Self {
            state: Arc::new(Mutex::new(SessionState::default())),
            tasks: Arc::new(Mutex::new(Tasks::default())),
            events: Arc::new(events),
            capture: Arc::new(CaptureController::new(camera, config.capture.clone())),
            uploads: UploadAdapter::new(
                services.uploads.clone(),
                ProgressCadence::from_config(&config),
            ),
            jobs: JobEngine::new(services.jobs.clone(), policy),
            services,
            config: Arc::new(config),
        }
    }

    pub fn capture(&self) -> &CaptureController {
        &self.capture
    }

    pub fn uploads(&self) -> &UploadAdapter {
        &self.uploads
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().await.snapshot()
    }

    fn publish(&self, state: &SessionState) {
        self.events.send_replace(state.snapshot());
    }

    /// Tenant profile, fetched once and cached until [`Self::refresh_branding`].
    pub async fn branding(&self) -> PipelineResult<Branding> {
        if let Some(branding) = self.state.lock().await.branding.clone() {
            return Ok(branding);
        }
        self.refresh_branding().await
    }

    pub async fn refresh_branding(&self) -> PipelineResult<Branding> {
        let branding = self
            .services
            .branding
            .branding()
            .await
            .map_err(|err| PipelineError::Branding(format!("{err:#}")))?;
        self.state.lock().await.branding = Some(branding.clone());
        Ok(branding)
    }

    /// Labels offered on the capture panel.
    pub async fn labels(&self) -> Vec<String> {
        let tenant_labels = match self.branding().await {
            Ok(branding) => branding.labels,
            Err(err) => {
                log_warn!("using built-in labels: {err}");
                Vec::new()
            }
        };
        self.config.capture.resolve_labels(&tenant_labels)
    }

    pub async fn set_pending_session_data(
        &self,
        subject_name: &str,
        subject_group: &str,
        still_image_ref: &str,
    ) -> PipelineResult<()> {
        let pending = PendingSessionData {
            subject_name: required(subject_name, "subject name")?,
            subject_group: required(subject_group, "subject group")?,
            still_image_ref: required(still_image_ref, "photo")?,
        };
        let mut state = self.state.lock().await;
        state.pending = Some(pending);
        self.publish(&state);
        Ok(())
    }

    pub async fn take_photo(&self) {
        let mut state = self.state.lock().await;
        state.capture.has_photo = true;
        self.publish(&state);
    }

    pub async fn set_label(&self, label: &str) {
        let mut state = self.state.lock().await;
        if let Some(session) = state.session.as_mut() {
            session.label = Some(label.to_string());
            self.publish(&state);
        }
    }

    pub async fn set_still_image(&self, image_ref: &str) {
        let mut state = self.state.lock().await;
        if let Some(session) = state.session.as_mut() {
            session.still_image_ref = Some(image_ref.to_string());
            self.publish(&state);
        }
    }

    /// Creates the session and submits its image-generation job.
    ///
    /// If an earlier call created the session but its job never produced an
    /// image, that session is reused and only the job is resubmitted.
    pub async fn start_session(
        &self,
        subject_name: &str,
        subject_group: &str,
        label: &str,
        still_image_ref: &str,
    ) -> PipelineResult<Session> {
        let label = required(label, "profession")?;
        let still_image_ref = required(still_image_ref, "photo")?;

        let (epoch, reusable) = {
            let state = self.state.lock().await;
            if state.job_phase == JobPhase::Running {
                return Err(PipelineError::InvalidInput(
                    "an image is already being generated".into(),
                ));
            }
            let reusable = state
                .session
                .clone()
                .filter(|session| session.generated_image_ref.is_none());
            (state.epoch, reusable)
        };

        let session = match reusable {
            Some(session) => {
                log_info!("reusing session {} for a new job", session.id);
                session
            }
            None => {
                let branding = self.branding().await?;
                let request = CreateSessionRequest {
                    subject_name: required(subject_name, "subject name")?,
                    subject_group: required(subject_group, "subject group")?,
                    tenant_id: branding.tenant_id,
                    label: Some(label.clone()),
                    still_image_ref: Some(still_image_ref.clone()),
                };
                match self.services.sessions.create(&request).await {
                    // Everything before `uploading` is driven locally.
                    Ok(mut session) => {
                        session.status = SessionStatus::Idle;
                        session
                    }
                    Err(err) => {
                        log_error!("session creation failed: {err:#}");
                        let err = PipelineError::submission(err);
                        self.record_error(epoch, &err).await;
                        return Err(err);
                    }
                }
            }
        };

        let session = {
            let mut state = self.state.lock().await;
            if state.epoch != epoch {
                log_warn!("session {} created after a reset; discarded", session.id);
                return Err(PipelineError::NoSession);
            }
            let mut session = session;
            session.label = Some(label.clone());
            if session.still_image_ref.is_none() {
                session.still_image_ref = Some(still_image_ref.clone());
            }
            state.session = Some(session.clone());
            state.last_error = None;
            self.publish(&state);
            session
        };

        let job = match self.jobs.submit(&session.id, &still_image_ref, &label).await {
            Ok(job) => job,
            Err(err) => {
                log_error!("job submission for session {} failed: {err}", session.id);
                self.record_error(epoch, &err).await;
                return Err(err);
            }
        };

        {
            let mut state = self.state.lock().await;
            if state.epoch != epoch {
                return Err(PipelineError::NoSession);
            }
            state.current_job_id = Some(job.id.clone());
            state.job_phase = JobPhase::Running;
            state.pending = None;
            self.publish(&state);
        }

        if !self.spawn_job_watcher(epoch, job.id).await {
            return Err(PipelineError::NoSession);
        }
        Ok(session)
    }

    /// Registers the watcher under the tasks lock, so a concurrent reset
    /// either cancels it or runs first and makes this a no-op.
    async fn spawn_job_watcher(&self, epoch: u64, job_id: String) -> bool {
        let mut tasks = self.tasks.lock().await;
        if self.state.lock().await.epoch != epoch {
            log_debug!("job {job_id} not watched: session was reset");
            return false;
        }

        let controller = self.clone();
        let handle = PollHandle::spawn(move |token| async move {
            let outcome = controller.jobs.watch(&job_id, token).await;
            controller.apply_job_outcome(epoch, &job_id, outcome).await;
        });
        if let Some(previous) = tasks.job.replace(handle) {
            previous.cancel();
        }
        true
    }

    async fn apply_job_outcome(&self, epoch: u64, job_id: &str, outcome: JobOutcome) {
        let mut state = self.state.lock().await;
        if state.epoch != epoch || state.current_job_id.as_deref() != Some(job_id) {
            log_debug!("stale outcome for job {job_id} dropped");
            return;
        }

        match outcome {
            JobOutcome::Succeeded { image_ref, .. } => {
                state.job_phase = JobPhase::Succeeded;
                if let Some(session) = state.session.as_mut() {
                    if image_ref.is_some() {
                        session.generated_image_ref = image_ref;
                    }
                    session.advance(SessionStatus::Capturing);
                }
                log_info!("job {job_id} produced the future image");
            }
            JobOutcome::Failed { job_id } => {
                state.job_phase = JobPhase::Failed;
                state.current_job_id = None;
                if let Some(session) = state.session.as_mut() {
                    session.rollback_to(SessionStatus::Idle);
                }
                state.last_error = Some(PipelineError::JobFailed(job_id).user_message());
            }
            JobOutcome::TimedOut { job_id, attempts } => {
                log_warn!("job {job_id} still running after {attempts} polls");
                state.job_phase = JobPhase::TimedOut;
                state.current_job_id = None;
                state.last_error =
                    Some("Image generation is taking too long. Please try again.".to_string());
            }
            JobOutcome::Cancelled => return,
        }
        self.publish(&state);
    }

    /// Starts a new recording, or resumes a paused one.
    pub async fn start_recording(&self) -> PipelineResult<()> {
        let paused = self.state.lock().await.clock.is_paused();
        if paused {
            self.capture.resume().await?;
            let mut state = self.state.lock().await;
            state.clock.resume(Instant::now());
            state.capture.is_recording = true;
            self.publish(&state);
        } else {
            let handle = self.capture.start_recording().await?;
            let mut state = self.state.lock().await;
            state.clock.begin(handle.started_at, Instant::now());
            state.capture.is_recording = true;
            state.capture.recording_duration_seconds = 0;
            self.publish(&state);
        }
        self.spawn_duration_ticker().await;
        Ok(())
    }

    pub async fn pause_recording(&self) -> PipelineResult<()> {
        self.capture.pause().await?;
        self.tasks.lock().await.cancel_duration();

        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.clock.pause(now);
        state.capture.is_recording = false;
        state.capture.recording_duration_seconds = state.clock.elapsed_secs(now);
        self.publish(&state);
        Ok(())
    }

    /// Finishes the recording and returns the assembled blob.
    pub async fn stop_recording(&self) -> PipelineResult<RecordedBlob> {
        let blob = self.capture.stop().await?;
        self.tasks.lock().await.cancel_duration();

        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.clock.stop(now);
        state.capture.is_recording = false;
        state.capture.recording_duration_seconds = state.clock.elapsed_secs(now);
        self.publish(&state);
        Ok(blob)
    }

    /// Flips the camera. A recording in progress is discarded and the
    /// displayed duration goes back to zero, whether or not the other camera
    /// opens.
    pub async fn switch_camera(&self) -> PipelineResult<bool> {
        let (discarded, opened) = self.capture.switch_camera().await;
        if discarded {
            self.tasks.lock().await.cancel_duration();
            let mut state = self.state.lock().await;
            state.clock.reset();
            state.capture.is_recording = false;
            state.capture.recording_duration_seconds = 0;
            self.publish(&state);
        }
        opened.map_err(|err| PipelineError::Capture(err.into()))?;
        Ok(discarded)
    }

    async fn spawn_duration_ticker(&self) {
        let mut tasks = self.tasks.lock().await;
        tasks.cancel_duration();

        let controller = self.clone();
        let period = self.config.duration_tick();
        tasks.duration = Some(tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let mut state = controller.state.lock().await;
                if !state.clock.is_running() {
                    break;
                }
                let elapsed = state.clock.elapsed_secs(Instant::now());
                if elapsed > state.capture.recording_duration_seconds {
                    state.capture.recording_duration_seconds = elapsed;
                    controller.publish(&state);
                }
            }
        }));
    }

    /// Uploads the recording, then asks the session service to compose the
    /// final video and starts polling the session.
    pub async fn stop_session_and_upload(&self, blob: RecordedBlob) -> PipelineResult<()> {
        self.upload_and_compose(Some(blob)).await
    }

    /// Replays the last failed [`Self::stop_session_and_upload`]. An upload
    /// that already went through is not repeated.
    pub async fn retry_upload(&self) -> PipelineResult<()> {
        self.upload_and_compose(None).await
    }

    /// `fresh` is a new recording; `None` uses the retained one. The retained
    /// recording is only taken once the session accepted the upload.
    async fn upload_and_compose(&self, fresh: Option<RecordedBlob>) -> PipelineResult<()> {
        let (epoch, previous, blob, uploaded_ref) = {
            let mut state = self.state.lock().await;
            if fresh.is_none() && state.retained.is_none() {
                return Err(PipelineError::NoRecording);
            }
            let epoch = state.epoch;
            let Some(previous) = state.session.as_ref().map(|session| session.status) else {
                return Err(PipelineError::NoSession);
            };
            if previous.rank() > SessionStatus::Uploading.rank() {
                return Err(PipelineError::InvalidInput(
                    "this session's video was already submitted".into(),
                ));
            }
            if previous == SessionStatus::Uploading {
                return Err(PipelineError::InvalidInput("an upload is already running".into()));
            }

            let retained = state.retained.take();
            let (blob, uploaded_ref) = match (fresh, retained) {
                (Some(blob), _) => (blob, None),
                (None, Some(retained)) => (retained.blob, retained.uploaded_ref),
                (None, None) => return Err(PipelineError::NoRecording),
            };
            if let Some(session) = state.session.as_mut() {
                session.advance(SessionStatus::Uploading);
            }
            state.upload = UploadProgress::started();
            state.last_error = None;
            self.publish(&state);
            (epoch, previous, blob, uploaded_ref)
        };
        self.spawn_upload_ticker(epoch).await;

        let recording_ref = match uploaded_ref.clone() {
            Some(reference) => reference,
            None => match self.uploads.upload_blob(&blob).await {
                Ok(reference) => reference,
                Err(err) => {
                    return self
                        .fail_upload(epoch, previous, blob, None, err)
                        .await
                }
            },
        };

        let request = {
            let mut state = self.state.lock().await;
            if state.epoch != epoch {
                return Err(PipelineError::NoSession);
            }
            let Some(session) = state.session.as_mut() else {
                return Err(PipelineError::NoSession);
            };
            session.recording_ref = Some(recording_ref.clone());
            let image_ref = session.composition_image_ref().map(str::to_string);
            let (session_id, tenant_id) = (session.id.clone(), session.tenant_id.clone());
            self.publish(&state);
            drop(state);

            let image_ref = match image_ref {
                Some(image_ref) => image_ref,
                None => {
                    let err =
                        PipelineError::composition(anyhow!("session has no image to compose"));
                    return self
                        .fail_upload(epoch, previous, blob, Some(recording_ref), err)
                        .await;
                }
            };
            let branding = match self.branding().await {
                Ok(branding) => branding,
                Err(err) => {
                    return self
                        .fail_upload(epoch, previous, blob, Some(recording_ref), err)
                        .await
                }
            };
            FinalCompositionRequest {
                session_id,
                tenant_id,
                recording_ref: recording_ref.clone(),
                image_ref,
                watermark_logo_ref: branding.watermark_logo_ref.unwrap_or_default(),
                tagline: branding.tagline,
            }
        };

        if let Err(err) = self.services.sessions.start_final_composition(&request).await {
            log_error!("final video request for {} failed: {err:#}", request.session_id);
            let err = PipelineError::composition(err);
            return self
                .fail_upload(epoch, previous, blob, Some(recording_ref), err)
                .await;
        }

        self.tasks.lock().await.stop_upload();
        {
            let mut state = self.state.lock().await;
            if state.epoch != epoch {
                return Err(PipelineError::NoSession);
            }
            state.upload = UploadProgress::completed();
            if let Some(session) = state.session.as_mut() {
                session.advance(SessionStatus::Queued);
            }
            self.publish(&state);
        }
        log_info!("session {} queued for composition", request.session_id);

        if !self.spawn_session_poller(epoch, &request.session_id).await {
            return Err(PipelineError::NoSession);
        }
        Ok(())
    }

    async fn fail_upload(
        &self,
        epoch: u64,
        previous: SessionStatus,
        blob: RecordedBlob,
        uploaded_ref: Option<String>,
        err: PipelineError,
    ) -> PipelineResult<()> {
        self.tasks.lock().await.stop_upload();

        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            return Err(err);
        }
        state.upload = UploadProgress::default();
        if let Some(session) = state.session.as_mut() {
            session.rollback_to(previous);
        }
        state.retained = Some(RetainedRecording { blob, uploaded_ref });
        state.last_error = Some(err.user_message());
        self.publish(&state);
        Err(err)
    }

    async fn spawn_upload_ticker(&self, epoch: u64) {
        let controller = self.clone();
        let ticker = self.uploads.spawn_progress(move |step, cap| {
            let controller = controller.clone();
            async move {
                let mut state = controller.state.lock().await;
                if state.epoch != epoch || !state.upload.is_uploading {
                    return false;
                }
                state.upload.bump(step, cap);
                controller.publish(&state);
                true
            }
        });

        let mut tasks = self.tasks.lock().await;
        tasks.stop_upload();
        tasks.upload = Some(ticker);
    }

    /// Polls the session until it leaves `queued`/`processing`/`active`.
    /// On `ready` the outputs are fetched exactly once. Any previous session
    /// poller is cancelled.
    pub async fn poll_session_status(&self, session_id: &str) {
        let epoch = self.state.lock().await.epoch;
        self.spawn_session_poller(epoch, session_id).await;
    }

    async fn spawn_session_poller(&self, epoch: u64, session_id: &str) -> bool {
        let mut tasks = self.tasks.lock().await;
        if self.state.lock().await.epoch != epoch {
            log_debug!("session {session_id} not polled: session was reset");
            return false;
        }

        let controller = self.clone();
        let session_id = session_id.to_string();
        let policy = self.jobs.policy();
        let handle = PollHandle::spawn(move |token| async move {
            controller
                .run_session_poller(epoch, session_id, policy, token)
                .await;
        });
        if let Some(previous) = tasks.session.replace(handle) {
            previous.cancel();
        }
        true
    }

    async fn run_session_poller(
        &self,
        epoch: u64,
        session_id: String,
        policy: PollPolicy,
        token: tokio_util::sync::CancellationToken,
    ) {
        let what = format!("session {session_id}");
        let outcome = poll_until(&what, policy, token, |_| {
            let session_id = session_id.as_str();
            async move {
                let status = self.services.sessions.status(session_id).await?;
                Ok::<_, anyhow::Error>(self.apply_session_status(epoch, session_id, status).await)
            }
        })
        .await;

        match outcome {
            PollOutcome::Completed(Some(SessionStatus::Ready)) => {
                self.fetch_outputs(epoch, &session_id).await;
            }
            PollOutcome::Completed(_) | PollOutcome::Cancelled => {}
            PollOutcome::TimedOut { attempts } => {
                let mut state = self.state.lock().await;
                if state.epoch != epoch {
                    return;
                }
                if let Some(session) = state.session.as_mut().filter(|s| s.id == session_id) {
                    session.advance(SessionStatus::TimedOut);
                }
                state.last_error = Some(format!(
                    "The video is still processing after {attempts} checks. Please check back later."
                ));
                self.publish(&state);
            }
        }
    }

    /// Applies one status answer. `Done(None)` means the answer was stale.
    async fn apply_session_status(
        &self,
        epoch: u64,
        session_id: &str,
        status: SessionStatus,
    ) -> PollStep<Option<SessionStatus>> {
        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            return PollStep::Done(None);
        }
        let Some(session) = state.session.as_mut().filter(|s| s.id == session_id) else {
            return PollStep::Done(None);
        };
        if session.advance(status) {
            log_debug!("session {session_id} is {}", status.as_str());
            self.publish(&state);
        } else if session.status != status {
            log_warn!(
                "session {session_id} reported {} while at {}",
                status.as_str(),
                session.status.as_str()
            );
        }

        if status.keeps_polling() {
            PollStep::Continue
        } else {
            PollStep::Done(Some(status))
        }
    }

    async fn fetch_outputs(&self, epoch: u64, session_id: &str) {
        let outputs = self.services.sessions.outputs(session_id).await;

        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            return;
        }
        match outputs {
            Ok(outputs) => {
                let attached = state
                    .session
                    .as_mut()
                    .filter(|s| s.id == session_id)
                    .is_some_and(|session| session.attach_outputs(outputs));
                if attached {
                    log_info!("session {session_id} outputs are ready");
                }
            }
            Err(err) => {
                log_error!("fetching outputs of session {session_id} failed: {err:#}");
                state.last_error =
                    Some("The video is ready but its links could not be loaded.".to_string());
            }
        }
        self.publish(&state);
    }

    /// Back to a blank slate. Every ticker and poller is cancelled before the
    /// state is cleared, and late answers are dropped by the epoch check.
    pub async fn reset_session(&self) {
        self.tasks.lock().await.cancel_all();
        if self.capture.discard_recording().await {
            log_debug!("reset discarded the recording in progress");
        }

        let mut state = self.state.lock().await;
        state.reset();
        self.publish(&state);
        log_info!("session reset (epoch {})", state.epoch);
    }

    /// Loads the tenant's past sessions into the snapshot.
    pub async fn load_history(&self, tenant_id: &str) -> PipelineResult<Vec<Session>> {
        {
            let mut state = self.state.lock().await;
            state.is_loading_history = true;
            state.history_error = None;
            self.publish(&state);
        }

        let result = self.services.sessions.list(tenant_id).await;

        let mut state = self.state.lock().await;
        state.is_loading_history = false;
        let outcome = match result {
            Ok(sessions) => {
                state.latest = sessions.iter().max_by_key(|s| s.created_at).cloned();
                state.history = sessions.clone();
                Ok(sessions)
            }
            Err(err) => {
                log_error!("loading sessions of {tenant_id} failed: {err:#}");
                state.history_error = Some(format!("Could not load sessions: {err}"));
                Err(PipelineError::Submission(format!("{err:#}")))
            }
        };
        self.publish(&state);
        outcome
    }

    async fn record_error(&self, epoch: u64, err: &PipelineError) {
        let mut state = self.state.lock().await;
        if state.epoch == epoch {
            state.last_error = Some(err.user_message());
            self.publish(&state);
        }
    }
}

fn required(value: &str, what: &str) -> PipelineResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::InvalidInput(format!("{what} is required")));
    }
    Ok(trimmed.to_string())
}
