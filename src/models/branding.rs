use serde::{Deserialize, Serialize};

/// Tenant profile consumed when a session is created and when the final video
/// is composed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Branding {
    pub tenant_id: String,
    pub display_name: String,
    pub watermark_logo_ref: Option<String>,
    pub tagline: String,
    /// Labels offered by this tenant. Empty means "use the built-in list".
    #[serde(default)]
    pub labels: Vec<String>,
}
