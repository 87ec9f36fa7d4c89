//! Image-generation job submission and status polling.

use std::sync::Arc;

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{PipelineError, PipelineResult},
    models::{Job, JobSnapshot, JobStatus},
    polling::{poll_until, PollOutcome, PollPolicy, PollStep},
    services::JobService,
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// How a watched job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded {
        job_id: String,
        image_ref: Option<String>,
        execution_id: Option<String>,
    },
    Failed {
        job_id: String,
    },
    TimedOut {
        job_id: String,
        attempts: u32,
    },
    Cancelled,
}

#[derive(Clone)]
pub struct JobEngine {
    service: Arc<dyn JobService>,
    policy: PollPolicy,
}

impl JobEngine {
    pub fn new(service: Arc<dyn JobService>, policy: PollPolicy) -> Self {
        Self { service, policy }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Requests a generated image for `image_ref` in the style of `label`.
    pub async fn submit(
        &self,
        session_id: &str,
        image_ref: &str,
        label: &str,
    ) -> PipelineResult<Job> {
        if image_ref.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "a photo is required before choosing a profession".into(),
            ));
        }
        if label.trim().is_empty() {
            return Err(PipelineError::InvalidInput("choose a profession first".into()));
        }

        let job = self
            .service
            .create(session_id, image_ref, label)
            .await
            .map_err(PipelineError::submission)?;
        if job.id.is_empty() {
            return Err(PipelineError::submission(anyhow!(
                "job service accepted the request without a job id"
            )));
        }
        log_info!("job {} submitted for session {session_id} ({label})", job.id);
        Ok(job)
    }

    pub async fn poll_once(&self, job_id: &str) -> anyhow::Result<JobSnapshot> {
        self.service.status(job_id).await
    }

    /// Polls `job_id` until it succeeds, fails, runs out of attempts or
    /// `cancel` fires. A terminal status is never polled again.
    pub async fn watch(&self, job_id: &str, cancel: CancellationToken) -> JobOutcome {
        let what = format!("job {job_id}");
        let outcome = poll_until(&what, self.policy, cancel, |_| async move {
            let snapshot = self.poll_once(job_id).await?;
            Ok::<_, anyhow::Error>(if snapshot.status.is_terminal() {
                PollStep::Done(snapshot)
            } else {
                PollStep::Continue
            })
        })
        .await;

        match outcome {
            PollOutcome::Completed(snapshot) if snapshot.status == JobStatus::Success => {
                if snapshot.image_ref.is_none() {
                    log_warn!("job {job_id} succeeded without an image reference");
                }
                JobOutcome::Succeeded {
                    job_id: job_id.to_string(),
                    image_ref: snapshot.image_ref,
                    execution_id: snapshot.execution_id,
                }
            }
            PollOutcome::Completed(_) => {
                log_warn!("job {job_id} failed");
                JobOutcome::Failed {
                    job_id: job_id.to_string(),
                }
            }
            PollOutcome::TimedOut { attempts } => JobOutcome::TimedOut {
                job_id: job_id.to_string(),
                attempts,
            },
            PollOutcome::Cancelled => JobOutcome::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::Duration;

    struct ScriptedJobs {
        script: Mutex<Vec<JobStatus>>,
        polls: Mutex<u32>,
    }

    impl ScriptedJobs {
        fn new(script: &[JobStatus]) -> Self {
            let mut script = script.to_vec();
            script.reverse();
            Self {
                script: Mutex::new(script),
                polls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl JobService for ScriptedJobs {
        async fn create(&self, session_id: &str, image_ref: &str, label: &str) -> anyhow::Result<Job> {
            Ok(Job {
                id: "job-1".into(),
                session_id: session_id.into(),
                image_ref: image_ref.into(),
                label: label.into(),
                status: JobStatus::Queued,
                outputs: serde_json::Value::Null,
                execution_id: None,
            })
        }

        async fn status(&self, job_id: &str) -> anyhow::Result<JobSnapshot> {
            *self.polls.lock().unwrap() += 1;
            let mut script = self.script.lock().unwrap();
            let status = if script.len() > 1 {
                script.pop().unwrap()
            } else {
                script[0]
            };
            Ok(JobSnapshot {
                id: job_id.into(),
                status,
                image_ref: (status == JobStatus::Success).then(|| "gen1".to_string()),
                execution_id: None,
            })
        }
    }

    fn engine(jobs: Arc<ScriptedJobs>, max_attempts: Option<u32>) -> JobEngine {
        JobEngine::new(
            jobs,
            PollPolicy {
                interval: Duration::from_secs(3),
                max_attempts,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn success_is_polled_exactly_once() {
        let jobs = Arc::new(ScriptedJobs::new(&[
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Success,
        ]));
        let outcome = engine(jobs.clone(), None)
            .watch("job-1", CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            JobOutcome::Succeeded {
                job_id: "job-1".into(),
                image_ref: Some("gen1".into()),
                execution_id: None,
            }
        );
        assert_eq!(*jobs.polls.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_is_reported() {
        let jobs = Arc::new(ScriptedJobs::new(&[JobStatus::Queued, JobStatus::Failed]));
        let outcome = engine(jobs, None).watch("job-1", CancellationToken::new()).await;
        assert_eq!(
            outcome,
            JobOutcome::Failed {
                job_id: "job-1".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn never_ending_job_times_out() {
        let jobs = Arc::new(ScriptedJobs::new(&[JobStatus::Processing]));
        let outcome = engine(jobs.clone(), Some(5))
            .watch("job-1", CancellationToken::new())
            .await;
        assert_eq!(
            outcome,
            JobOutcome::TimedOut {
                job_id: "job-1".into(),
                attempts: 5
            }
        );
        assert_eq!(*jobs.polls.lock().unwrap(), 5);
    }

    #[tokio::test]
    async fn submit_requires_image_and_label() {
        let jobs = Arc::new(ScriptedJobs::new(&[JobStatus::Queued]));
        let engine = engine(jobs, None);
        assert!(matches!(
            engine.submit("s1", "", "Doctor").await,
            Err(PipelineError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.submit("s1", "img1", " ").await,
            Err(PipelineError::InvalidInput(_))
        ));
        assert_eq!(engine.submit("s1", "img1", "Doctor").await.unwrap().id, "job-1");
    }
}
