use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    Queued,
    Processing,
    Success,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "queued" | "pending" => Ok(JobStatus::Queued),
            "processing" | "running" => Ok(JobStatus::Processing),
            "success" | "succeeded" | "completed" => Ok(JobStatus::Success),
            "failed" | "error" => Ok(JobStatus::Failed),
            other => Err(anyhow::anyhow!("unknown job status '{other}'")),
        }
    }
}

/// An image-generation request tracked by the job engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub session_id: String,
    pub image_ref: String,
    pub label: String,
    pub status: JobStatus,
    #[serde(default)]
    pub outputs: serde_json::Value,
    pub execution_id: Option<String>,
}

/// One answer of the job status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: String,
    pub status: JobStatus,
    pub image_ref: Option<String>,
    pub execution_id: Option<String>,
}
