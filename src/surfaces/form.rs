use serde::Serialize;

use crate::{
    error::{PipelineError, PipelineResult},
    session::SessionController,
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Groups offered by the form's picker.
pub const DEFAULT_GROUPS: &[&str] = &[
    "Kindergarten",
    "1st Grade",
    "2nd Grade",
    "3rd Grade",
    "4th Grade",
    "5th Grade",
    "6th Grade",
    "7th Grade",
    "8th Grade",
    "9th Grade",
    "10th Grade",
    "11th Grade",
    "12th Grade",
];

const PHOTO_FILE_NAME: &str = "subject-photo.jpg";
const PHOTO_MIME_TYPE: &str = "image/jpeg";

pub fn validate_subject_name(name: &str) -> Option<String> {
    let length = name.trim().chars().count();
    if length == 0 {
        Some("Student name is required".into())
    } else if length < 2 {
        Some("Student name must be at least 2 characters".into())
    } else if length > 50 {
        Some("Student name must be less than 50 characters".into())
    } else {
        None
    }
}

pub fn validate_subject_group(group: &str) -> Option<String> {
    group
        .trim()
        .is_empty()
        .then(|| "Class/Grade is required".to_string())
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FormErrors {
    pub subject_name: Option<String>,
    pub subject_group: Option<String>,
}

impl FormErrors {
    pub fn is_empty(&self) -> bool {
        self.subject_name.is_none() && self.subject_group.is_none()
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FormStep {
    Details,
    Photo,
    Confirm,
}

/// Collects who is being recorded and their still photo, then hands both to
/// the session controller as pending data.
pub struct SessionForm {
    controller: SessionController,
    subject_name: String,
    subject_group: String,
    step: FormStep,
    photo: Option<Vec<u8>>,
    is_uploading: bool,
    errors: FormErrors,
}

impl SessionForm {
    pub fn new(controller: SessionController) -> Self {
        Self {
            controller,
            subject_name: String::new(),
            subject_group: String::new(),
            step: FormStep::Details,
            photo: None,
            is_uploading: false,
            errors: FormErrors::default(),
        }
    }

    pub fn step(&self) -> FormStep {
        self.step
    }

    pub fn errors(&self) -> &FormErrors {
        &self.errors
    }

    pub fn is_uploading(&self) -> bool {
        self.is_uploading
    }

    pub fn set_subject_name(&mut self, name: &str) {
        self.subject_name = name.to_string();
    }

    pub fn set_subject_group(&mut self, group: &str) {
        self.subject_group = group.to_string();
    }

    /// Validates the details and moves on to the photo step.
    pub fn submit_details(&mut self) -> Result<(), FormErrors> {
        let errors = FormErrors {
            subject_name: validate_subject_name(&self.subject_name),
            subject_group: validate_subject_group(&self.subject_group),
        };
        if !errors.is_empty() {
            self.errors = errors.clone();
            return Err(errors);
        }
        self.errors = FormErrors::default();
        self.step = FormStep::Photo;
        Ok(())
    }

    pub fn capture_photo(&mut self, jpeg: Vec<u8>) -> PipelineResult<()> {
        if self.step != FormStep::Photo {
            return Err(PipelineError::InvalidInput("fill in the details first".into()));
        }
        if jpeg.is_empty() {
            return Err(PipelineError::InvalidInput("the photo is empty".into()));
        }
        self.photo = Some(jpeg);
        self.step = FormStep::Confirm;
        Ok(())
    }

    pub fn retake_photo(&mut self) {
        self.photo = None;
        self.step = FormStep::Photo;
    }

    pub fn back(&mut self) {
        self.photo = None;
        self.step = FormStep::Details;
    }

    /// Uploads the photo and stores the pending session data. Returns the
    /// photo reference.
    pub async fn confirm_photo(&mut self) -> PipelineResult<String> {
        let photo = match (&self.photo, self.step) {
            (Some(photo), FormStep::Confirm) => photo.clone(),
            _ => return Err(PipelineError::InvalidInput("take a photo first".into())),
        };

        self.is_uploading = true;
        let uploaded = self
            .controller
            .uploads()
            .upload_bytes(PHOTO_FILE_NAME, PHOTO_MIME_TYPE, photo)
            .await;
        self.is_uploading = false;

        let image_ref = uploaded.map_err(|err| {
            log_warn!("photo upload failed: {err}");
            err
        })?;
        self.controller
            .set_pending_session_data(&self.subject_name, &self.subject_group, &image_ref)
            .await?;
        self.controller.take_photo().await;
        log_info!("photo for {} stored as {image_ref}", self.subject_name.trim());
        Ok(image_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_rules() {
        assert_eq!(
            validate_subject_name("  ").as_deref(),
            Some("Student name is required")
        );
        assert!(validate_subject_name("A").is_some());
        assert!(validate_subject_name(&"x".repeat(51)).is_some());
        assert!(validate_subject_name("Ana").is_none());
    }

    #[test]
    fn group_is_required() {
        assert!(validate_subject_group("").is_some());
        assert!(validate_subject_group(DEFAULT_GROUPS[5]).is_none());
    }
}
