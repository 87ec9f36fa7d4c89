//! Presentation surfaces. They translate user actions into controller calls
//! and read snapshots; none of them schedules work of its own.

mod capture_panel;
mod form;
mod status_panel;

pub use capture_panel::{CapturePanel, PanelStep};
pub use form::{
    validate_subject_group, validate_subject_name, FormErrors, FormStep, SessionForm,
    DEFAULT_GROUPS,
};
pub use status_panel::{describe, DisplayPhase, StatusDisplay, StatusPanel};
