//! Collaborator seams of the pipeline.
//!
//! Every remote system the session controller talks to sits behind one of the
//! traits below so the controller can be driven by the HTTP backend in the
//! kiosk and by in-memory fakes in tests.

mod http;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Branding, Job, JobSnapshot, Session, SessionOutputs, SessionStatus};

pub use http::HttpBackend;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub subject_name: String,
    pub subject_group: String,
    pub tenant_id: String,
    pub label: Option<String>,
    pub still_image_ref: Option<String>,
}

/// Everything the composition backend needs to render the final video.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FinalCompositionRequest {
    pub session_id: String,
    pub tenant_id: String,
    pub recording_ref: String,
    pub image_ref: String,
    pub watermark_logo_ref: String,
    pub tagline: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompositionAck {
    pub status: String,
    pub execution_id: Option<String>,
}

#[async_trait]
pub trait UploadService: Send + Sync {
    /// Stores `bytes` and returns a durable reference to them.
    async fn upload(&self, file_name: &str, mime_type: &str, bytes: Vec<u8>) -> Result<String>;
}

#[async_trait]
pub trait SessionService: Send + Sync {
    async fn create(&self, request: &CreateSessionRequest) -> Result<Session>;
    async fn status(&self, session_id: &str) -> Result<SessionStatus>;
    async fn outputs(&self, session_id: &str) -> Result<SessionOutputs>;
    async fn start_final_composition(
        &self,
        request: &FinalCompositionRequest,
    ) -> Result<CompositionAck>;
    async fn list(&self, tenant_id: &str) -> Result<Vec<Session>>;
}

#[async_trait]
pub trait JobService: Send + Sync {
    async fn create(&self, session_id: &str, image_ref: &str, label: &str) -> Result<Job>;
    async fn status(&self, job_id: &str) -> Result<JobSnapshot>;
}

#[async_trait]
pub trait BrandingProvider: Send + Sync {
    async fn branding(&self) -> Result<Branding>;
}

/// Fixed tenant profile, for kiosks configured offline.
#[derive(Debug, Clone)]
pub struct StaticBranding(pub Branding);

#[async_trait]
impl BrandingProvider for StaticBranding {
    async fn branding(&self) -> Result<Branding> {
        Ok(self.0.clone())
    }
}

/// The set of collaborators injected into a session controller.
#[derive(Clone)]
pub struct Collaborators {
    pub uploads: Arc<dyn UploadService>,
    pub sessions: Arc<dyn SessionService>,
    pub jobs: Arc<dyn JobService>,
    pub branding: Arc<dyn BrandingProvider>,
}

impl Collaborators {
    /// Wires every seam to the same HTTP backend.
    pub fn from_http(backend: Arc<HttpBackend>) -> Self {
        Self {
            uploads: backend.clone(),
            sessions: backend.clone(),
            jobs: backend.clone(),
            branding: backend,
        }
    }
}
