use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::models::CameraFacing;

/// Professions offered when the tenant profile carries none.
pub const DEFAULT_LABELS: &[&str] = &[
    "Astronaut",
    "Doctor",
    "Pilot",
    "Scientist",
    "Engineer",
    "Teacher",
    "Artist",
    "Chef",
    "Veterinarian",
    "Firefighter",
    "Police Officer",
    "Nurse",
    "Architect",
    "Lawyer",
    "Musician",
    "Athlete",
    "Designer",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub auth_token: Option<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            timeout_secs: 10,
            auth_token: None,
        }
    }
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Options recognised by the capture surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureOptions {
    /// Camera opened when the capture panel mounts.
    pub facing: CameraFacing,
    /// How often the recorder flushes a chunk.
    pub chunk_interval_ms: u64,
    pub mime_type: String,
    pub ideal_width: u32,
    pub ideal_height: u32,
    /// Overrides the tenant label list when non-empty.
    pub labels: Vec<String>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            facing: CameraFacing::Front,
            chunk_interval_ms: 1_000,
            mime_type: "video/webm;codecs=vp8".into(),
            ideal_width: 1280,
            ideal_height: 720,
            labels: Vec::new(),
        }
    }
}

impl CaptureOptions {
    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_interval_ms.max(1))
    }

    /// Labels in display order: configured ones, else the tenant's, else the
    /// built-in list.
    pub fn resolve_labels(&self, tenant_labels: &[String]) -> Vec<String> {
        if !self.labels.is_empty() {
            return self.labels.clone();
        }
        if !tenant_labels.is_empty() {
            return tenant_labels.to_vec();
        }
        DEFAULT_LABELS.iter().map(|label| label.to_string()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub api: ApiSettings,
    /// Delay between two job or session status polls.
    pub poll_interval_ms: u64,
    /// Polling ceiling; `None` polls until a terminal status or a reset.
    pub max_poll_attempts: Option<u32>,
    pub upload_tick_ms: u64,
    pub upload_step_percent: u8,
    pub upload_cap_percent: u8,
    /// Refresh period of the displayed recording duration.
    pub duration_tick_ms: u64,
    pub capture: CaptureOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api: ApiSettings::default(),
            poll_interval_ms: 3_000,
            max_poll_attempts: Some(200),
            upload_tick_ms: 200,
            upload_step_percent: 10,
            upload_cap_percent: 90,
            duration_tick_ms: 1_000,
            capture: CaptureOptions::default(),
        }
    }
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn upload_tick(&self) -> Duration {
        Duration::from_millis(self.upload_tick_ms.max(1))
    }

    pub fn duration_tick(&self) -> Duration {
        Duration::from_millis(self.duration_tick_ms.max(1))
    }

    /// Applies `FUTURESELF_API_URL`, `FUTURESELF_API_TOKEN` and
    /// `FUTURESELF_API_TIMEOUT` when set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("FUTURESELF_API_URL") {
            if !url.trim().is_empty() {
                self.api.base_url = url.trim().to_string();
            }
        }
        if let Ok(token) = std::env::var("FUTURESELF_API_TOKEN") {
            self.api.auth_token = Some(token).filter(|t| !t.is_empty());
        }
        if let Some(timeout) = std::env::var("FUTURESELF_API_TIMEOUT")
            .ok()
            .and_then(|raw| raw.parse().ok())
        {
            self.api.timeout_secs = timeout;
        }
        self
    }
}

/// JSON-file backed [`PipelineConfig`] shared by the kiosk.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<PipelineConfig>,
}

impl SettingsStore {
    /// Loads `path`, falling back to defaults when the file is missing or
    /// cannot be parsed.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(parsed) => parsed,
                Err(err) => {
                    log::warn!(
                        "Ignoring unreadable settings at {}: {err}",
                        path.display()
                    );
                    PipelineConfig::default()
                }
            }
        } else {
            PipelineConfig::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn pipeline(&self) -> PipelineConfig {
        self.read().clone()
    }

    pub fn update_pipeline(&self, config: PipelineConfig) -> Result<()> {
        let mut guard = self.write();
        *guard = config;
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: PipelineConfig = serde_json::from_str(&contents)?;
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &PipelineConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, PipelineConfig> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, PipelineConfig> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
