//! Shared in-memory collaborators for the pipeline integration tests.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;

use futureself_lib::{
    models::{Branding, Job, JobSnapshot, JobStatus, Session, SessionOutputs, SessionStatus},
    services::{
        BrandingProvider, Collaborators, CompositionAck, CreateSessionRequest,
        FinalCompositionRequest, JobService, SessionService, UploadService,
    },
    PipelineConfig, SessionController, SessionSnapshot, SyntheticCamera,
};

/// What the fake backend answers. Status queues repeat their last entry.
pub struct Script {
    pub upload_failures: u32,
    pub upload_delay: Option<Duration>,
    pub create_session_fails: bool,
    pub create_delay: Option<Duration>,
    pub create_job_failures: u32,
    pub job_statuses: VecDeque<JobStatus>,
    pub job_image: Option<String>,
    pub session_statuses: VecDeque<SessionStatus>,
    pub status_delay: Option<Duration>,
    pub composition_failures: u32,
    pub outputs: SessionOutputs,
    pub history: Vec<Session>,
    pub history_fails: bool,
    pub labels: Vec<String>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            upload_failures: 0,
            upload_delay: None,
            create_session_fails: false,
            create_delay: None,
            create_job_failures: 0,
            job_statuses: VecDeque::from([JobStatus::Queued, JobStatus::Processing, JobStatus::Success]),
            job_image: Some("gen1".into()),
            session_statuses: VecDeque::from([SessionStatus::Processing, SessionStatus::Ready]),
            status_delay: None,
            composition_failures: 0,
            outputs: SessionOutputs {
                image_url: Some("https://cdn/gen1.png".into()),
                video_url: Some("https://cdn/final.mp4".into()),
            },
            history: Vec::new(),
            history_fails: false,
            labels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Calls {
    pub uploads: u32,
    pub sessions_created: u32,
    pub jobs_created: u32,
    pub job_polls: u32,
    pub status_polls: u32,
    pub outputs_fetches: u32,
    pub compositions: u32,
    pub last_composition: Option<FinalCompositionRequest>,
    pub last_job_label: Option<String>,
}

#[derive(Default)]
pub struct FakeBackend {
    script: Mutex<Script>,
    calls: Mutex<Calls>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn next<T: Copy>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().copied()
    }
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self) -> MutexGuard<'_, Script> {
        lock(&self.script)
    }

    pub fn calls(&self) -> Calls {
        lock(&self.calls).clone()
    }

    fn record(&self, update: impl FnOnce(&mut Calls)) {
        update(&mut lock(&self.calls));
    }
}

#[async_trait]
impl UploadService for FakeBackend {
    async fn upload(&self, file_name: &str, _mime_type: &str, bytes: Vec<u8>) -> Result<String> {
        let delay = self.script().upload_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(|calls| calls.uploads += 1);
        let attempt = self.calls().uploads;

        let mut script = self.script();
        if script.upload_failures > 0 {
            script.upload_failures -= 1;
            return Err(anyhow!("upload of {file_name} rejected"));
        }
        if bytes.is_empty() {
            return Err(anyhow!("empty body"));
        }
        let prefix = if file_name.ends_with(".jpg") { "photo" } else { "vid" };
        Ok(format!("{prefix}-{attempt}"))
    }
}

#[async_trait]
impl SessionService for FakeBackend {
    async fn create(&self, request: &CreateSessionRequest) -> Result<Session> {
        let delay = self.script().create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(|calls| calls.sessions_created += 1);
        if self.script().create_session_fails {
            return Err(anyhow!("create session: code 500: database unavailable"));
        }
        let id = format!("s{}", self.calls().sessions_created);
        Ok(Session {
            id,
            subject_name: request.subject_name.clone(),
            subject_group: request.subject_group.clone(),
            tenant_id: request.tenant_id.clone(),
            status: SessionStatus::Queued,
            label: request.label.clone(),
            still_image_ref: request.still_image_ref.clone(),
            generated_image_ref: None,
            recording_ref: None,
            outputs: None,
            created_at: Utc::now(),
        })
    }

    async fn status(&self, _session_id: &str) -> Result<SessionStatus> {
        let delay = self.script().status_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(|calls| calls.status_polls += 1);
        next(&mut self.script().session_statuses).ok_or_else(|| anyhow!("no status scripted"))
    }

    async fn outputs(&self, _session_id: &str) -> Result<SessionOutputs> {
        self.record(|calls| calls.outputs_fetches += 1);
        Ok(self.script().outputs.clone())
    }

    async fn start_final_composition(
        &self,
        request: &FinalCompositionRequest,
    ) -> Result<CompositionAck> {
        let request = request.clone();
        self.record(|calls| {
            calls.compositions += 1;
            calls.last_composition = Some(request);
        });
        let mut script = self.script();
        if script.composition_failures > 0 {
            script.composition_failures -= 1;
            return Err(anyhow!("start final video: code 4078: renderer busy"));
        }
        Ok(CompositionAck {
            status: "queued".into(),
            execution_id: Some("exec-1".into()),
        })
    }

    async fn list(&self, _tenant_id: &str) -> Result<Vec<Session>> {
        let script = self.script();
        if script.history_fails {
            return Err(anyhow!("list sessions: HTTP 503"));
        }
        Ok(script.history.clone())
    }
}

#[async_trait]
impl JobService for FakeBackend {
    async fn create(&self, session_id: &str, image_ref: &str, label: &str) -> Result<Job> {
        let label_owned = label.to_string();
        self.record(|calls| {
            calls.jobs_created += 1;
            calls.last_job_label = Some(label_owned);
        });
        let mut script = self.script();
        if script.create_job_failures > 0 {
            script.create_job_failures -= 1;
            return Err(anyhow!("create job: code 500: queue full"));
        }
        Ok(Job {
            id: format!("job-{}", self.calls().jobs_created),
            session_id: session_id.into(),
            image_ref: image_ref.into(),
            label: label.into(),
            status: JobStatus::Queued,
            outputs: serde_json::Value::Null,
            execution_id: None,
        })
    }

    async fn status(&self, job_id: &str) -> Result<JobSnapshot> {
        self.record(|calls| calls.job_polls += 1);
        let mut script = self.script();
        let status = next(&mut script.job_statuses).ok_or_else(|| anyhow!("no job status"))?;
        Ok(JobSnapshot {
            id: job_id.into(),
            status,
            image_ref: if status == JobStatus::Success {
                script.job_image.clone()
            } else {
                None
            },
            execution_id: None,
        })
    }
}

#[async_trait]
impl BrandingProvider for FakeBackend {
    async fn branding(&self) -> Result<Branding> {
        Ok(Branding {
            tenant_id: "school-1".into(),
            display_name: "Sunrise Elementary".into(),
            watermark_logo_ref: Some("logo.png".into()),
            tagline: "Dream big".into(),
            labels: self.script().labels.clone(),
        })
    }
}

pub fn collaborators(backend: &Arc<FakeBackend>) -> Collaborators {
    Collaborators {
        uploads: backend.clone(),
        sessions: backend.clone(),
        jobs: backend.clone(),
        branding: backend.clone(),
    }
}

pub fn controller_with(
    backend: &Arc<FakeBackend>,
    config: PipelineConfig,
) -> (SessionController, SyntheticCamera) {
    let camera = SyntheticCamera::new();
    let controller = SessionController::new(collaborators(backend), Arc::new(camera.clone()), config);
    (controller, camera)
}

pub fn controller(backend: &Arc<FakeBackend>) -> (SessionController, SyntheticCamera) {
    controller_with(backend, PipelineConfig::default())
}

/// Waits (in virtual time) until the published snapshot satisfies `done`.
pub async fn wait_for(
    controller: &SessionController,
    done: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut rx: watch::Receiver<SessionSnapshot> = controller.subscribe();
    let snapshot = tokio::time::timeout(Duration::from_secs(3_600), rx.wait_for(done))
        .await
        .expect("snapshot condition not reached in time")
        .expect("controller dropped");
    snapshot.clone()
}

/// Pending data plus a session whose job already produced "gen1".
pub async fn session_with_image(controller: &SessionController) -> Session {
    controller
        .set_pending_session_data("Ana", "Grade 5", "img1")
        .await
        .expect("pending data");
    controller
        .start_session("Ana", "Grade 5", "Doctor", "img1")
        .await
        .expect("session should start");
    let snapshot = wait_for(controller, |s| s.job_phase == futureself_lib::JobPhase::Succeeded).await;
    snapshot.session.expect("session present")
}

/// Records `seconds` of video on the front camera and returns the blob.
pub async fn record(
    controller: &SessionController,
    seconds: u64,
) -> futureself_lib::models::RecordedBlob {
    controller
        .capture()
        .acquire(futureself_lib::models::CameraFacing::Front)
        .await
        .expect("camera");
    controller.start_recording().await.expect("recording starts");
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    controller.stop_recording().await.expect("recording stops")
}
