//! REST implementation of the collaborator traits.
//!
//! The backend wraps every answer in `{ code, message, result }` and signals
//! success through endpoint-specific codes rather than HTTP status alone.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use reqwest::{multipart, Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    models::{Branding, Job, JobSnapshot, JobStatus, Session, SessionOutputs, SessionStatus},
    settings::ApiSettings,
    utils::parse_backend_datetime,
};

use super::{
    BrandingProvider, CompositionAck, CreateSessionRequest, FinalCompositionRequest, JobService,
    SessionService, UploadService,
};

const UPLOAD_OK: &[i64] = &[3003];
const SESSION_CREATE_OK: &[i64] = &[200, 3034];
const JOB_CREATE_OK: &[i64] = &[200, 3057];
const FINAL_VIDEO_OK: &[i64] = &[200, 3078];
const BRANDING_OK: &[i64] = &[200, 3025];
const READ_OK: &[i64] = &[200];

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRecord {
    id: String,
    student_name: String,
    student_class: String,
    school_id: String,
    status: String,
    profession: Option<String>,
    student_image_id: Option<String>,
    future_image_id: Option<String>,
    video_id: Option<String>,
    #[serde(default)]
    outputs: Option<Value>,
    final_video_url: Option<String>,
    #[serde(default)]
    created_at: Option<Value>,
}

impl SessionRecord {
    fn into_session(self) -> Result<Session> {
        let status: SessionStatus = self
            .status
            .parse()
            .with_context(|| format!("session {}", self.id))?;

        let created_at = match &self.created_at {
            Some(Value::String(raw)) => parse_backend_datetime(raw).unwrap_or_else(|err| {
                debug!("session {} createdAt unreadable ({err}), using now", self.id);
                Utc::now()
            }),
            Some(Value::Number(number)) => parse_backend_datetime(&number.to_string())
                .unwrap_or_else(|_| Utc::now()),
            _ => Utc::now(),
        };

        let outputs = if status == SessionStatus::Ready {
            let from_object = |key: &str| {
                self.outputs
                    .as_ref()
                    .and_then(|value| value.get(key))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };
            let image_url = from_object("futureImageUrl").or_else(|| self.future_image_id.clone());
            let video_url = from_object("finalVideoUrl").or_else(|| self.final_video_url.clone());
            (image_url.is_some() || video_url.is_some()).then_some(SessionOutputs {
                image_url,
                video_url,
            })
        } else {
            None
        };

        Ok(Session {
            id: self.id,
            subject_name: self.student_name,
            subject_group: self.student_class,
            tenant_id: self.school_id,
            status,
            label: self.profession,
            still_image_ref: self.student_image_id,
            generated_image_ref: self.future_image_id,
            recording_ref: self.video_id,
            outputs,
            created_at,
        })
    }
}

/// `GET /sessions` answers a list, a `{ latest }` wrapper or a bare record.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SessionListBody {
    Many(Vec<SessionRecord>),
    Latest { latest: SessionRecord },
    One(SessionRecord),
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutputsBody {
    future_image_url: Option<String>,
    final_video_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionBody<'a> {
    student_name: &'a str,
    student_class: &'a str,
    school_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    profession: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    student_image_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FinalVideoBody<'a> {
    session_id: &'a str,
    school_id: &'a str,
    inputs: FinalVideoInputs<'a>,
    branding: FinalVideoBranding<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FinalVideoInputs<'a> {
    teacher_video_url: &'a str,
    future_image_url: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FinalVideoBranding<'a> {
    logo_url: &'a str,
    tagline: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinalVideoAck {
    status: String,
    execution_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateJobBody<'a> {
    session_id: &'a str,
    image_url: &'a str,
    profession: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobRecord {
    id: String,
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    profession: String,
    status: String,
    #[serde(default)]
    outputs: Value,
    execution_id: Option<String>,
}

impl JobRecord {
    fn parsed_status(&self) -> Result<JobStatus> {
        self.status
            .parse()
            .with_context(|| format!("job {}", self.id))
    }

    /// The generated image is reported in `outputs` by newer workers and in
    /// `imageUrl` by older ones.
    fn produced_image(&self) -> Option<String> {
        ["imageUrl", "futureImageUrl"]
            .iter()
            .find_map(|key| self.outputs.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .or_else(|| self.image_url.clone())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrandingRecord {
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    branding: Option<BrandingAssets>,
    #[serde(default)]
    professions: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrandingAssets {
    logo_url: Option<String>,
    tagline: Option<String>,
}

/// Client for the kiosk REST API. Implements every collaborator trait.
pub struct HttpBackend {
    http: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpBackend {
    pub fn new(settings: &ApiSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.timeout())
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            auth_token: settings.auth_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        ok_codes: &[i64],
        what: &str,
    ) -> Result<T> {
        let response = self
            .authorized(request)
            .send()
            .await
            .with_context(|| format!("{what}: request failed"))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("{what}: failed to read response body"))?;

        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(err) if status.is_success() => {
                return Err(anyhow!("{what}: invalid response: {err}"));
            }
            Err(_) => bail!("{what}: HTTP {status}: {}", body.trim()),
        };

        let message = envelope.message.unwrap_or_default();
        if !status.is_success() {
            bail!("{what}: HTTP {status}: {message}");
        }
        if !ok_codes.contains(&envelope.code) {
            bail!("{what}: code {}: {message}", envelope.code);
        }
        envelope
            .result
            .ok_or_else(|| anyhow!("{what}: response carried no result"))
    }
}

#[async_trait]
impl UploadService for HttpBackend {
    async fn upload(&self, file_name: &str, mime_type: &str, bytes: Vec<u8>) -> Result<String> {
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .with_context(|| format!("invalid mime type '{mime_type}'"))?;
        let form = multipart::Form::new().part("file", part);

        self.call(
            self.http.post(self.url("/upload-file")).multipart(form),
            UPLOAD_OK,
            "upload file",
        )
        .await
    }
}

#[async_trait]
impl SessionService for HttpBackend {
    async fn create(&self, request: &CreateSessionRequest) -> Result<Session> {
        let body = CreateSessionBody {
            student_name: &request.subject_name,
            student_class: &request.subject_group,
            school_id: &request.tenant_id,
            profession: request.label.as_deref(),
            student_image_id: request.still_image_ref.as_deref(),
        };
        let record: SessionRecord = self
            .call(
                self.http.post(self.url("/sessions")).json(&body),
                SESSION_CREATE_OK,
                "create session",
            )
            .await?;
        record.into_session()
    }

    async fn status(&self, session_id: &str) -> Result<SessionStatus> {
        let body: StatusBody = self
            .call(
                self.http
                    .get(self.url(&format!("/sessions/{session_id}/status"))),
                READ_OK,
                "session status",
            )
            .await?;
        body.status.parse()
    }

    async fn outputs(&self, session_id: &str) -> Result<SessionOutputs> {
        let body: OutputsBody = self
            .call(
                self.http
                    .get(self.url(&format!("/sessions/{session_id}/outputs"))),
                READ_OK,
                "session outputs",
            )
            .await?;
        Ok(SessionOutputs {
            image_url: body.future_image_url,
            video_url: body.final_video_url,
        })
    }

    async fn start_final_composition(
        &self,
        request: &FinalCompositionRequest,
    ) -> Result<CompositionAck> {
        let body = FinalVideoBody {
            session_id: &request.session_id,
            school_id: &request.tenant_id,
            inputs: FinalVideoInputs {
                teacher_video_url: &request.recording_ref,
                future_image_url: &request.image_ref,
            },
            branding: FinalVideoBranding {
                logo_url: &request.watermark_logo_ref,
                tagline: &request.tagline,
            },
        };
        let ack: FinalVideoAck = self
            .call(
                self.http.post(self.url("/startFinalVideo")).json(&body),
                FINAL_VIDEO_OK,
                "start final video",
            )
            .await?;
        Ok(CompositionAck {
            status: ack.status,
            execution_id: ack.execution_id,
        })
    }

    async fn list(&self, tenant_id: &str) -> Result<Vec<Session>> {
        let body: SessionListBody = self
            .call(
                self.http
                    .get(self.url("/sessions"))
                    .query(&[("schoolId", tenant_id)]),
                READ_OK,
                "list sessions",
            )
            .await?;
        let records = match body {
            SessionListBody::Many(records) => records,
            SessionListBody::Latest { latest } => vec![latest],
            SessionListBody::One(record) => vec![record],
        };
        records.into_iter().map(SessionRecord::into_session).collect()
    }
}

#[async_trait]
impl JobService for HttpBackend {
    async fn create(&self, session_id: &str, image_ref: &str, label: &str) -> Result<Job> {
        let body = CreateJobBody {
            session_id,
            image_url: image_ref,
            profession: label,
        };
        let record: JobRecord = self
            .call(
                self.http.post(self.url("/jobs")).json(&body),
                JOB_CREATE_OK,
                "create job",
            )
            .await?;
        let status = record.parsed_status()?;
        Ok(Job {
            id: record.id,
            session_id: if record.session_id.is_empty() {
                session_id.to_string()
            } else {
                record.session_id
            },
            image_ref: record.image_url.unwrap_or_else(|| image_ref.to_string()),
            label: if record.profession.is_empty() {
                label.to_string()
            } else {
                record.profession
            },
            status,
            outputs: record.outputs,
            execution_id: record.execution_id,
        })
    }

    async fn status(&self, job_id: &str) -> Result<JobSnapshot> {
        let record: JobRecord = self
            .call(
                self.http.get(self.url(&format!("/jobs/{job_id}"))),
                READ_OK,
                "job status",
            )
            .await?;
        let status = record.parsed_status()?;
        let image_ref = record.produced_image();
        Ok(JobSnapshot {
            id: record.id,
            status,
            image_ref,
            execution_id: record.execution_id,
        })
    }
}

#[async_trait]
impl BrandingProvider for HttpBackend {
    async fn branding(&self) -> Result<Branding> {
        let record: BrandingRecord = self
            .call(
                self.http.get(self.url("/branding/settings")),
                BRANDING_OK,
                "branding settings",
            )
            .await?;
        let tenant_id = record
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow!("branding settings carry no school id"))?;
        let assets = record.branding.unwrap_or_default();

        Ok(Branding {
            tenant_id,
            display_name: record.name,
            watermark_logo_ref: assets.logo_url.filter(|url| !url.is_empty()),
            tagline: assets.tagline.unwrap_or_default(),
            labels: record.professions.unwrap_or_default(),
        })
    }
}
