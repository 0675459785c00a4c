//! Collaborator endpoints.

use url::Url;

/// Base URLs of the services Transmission calls out to.
#[derive(Debug, Clone)]
pub struct CollaboratorConfig {
    /// Profiles identity service. Required for wallet, storage credential and
    /// device checks.
    pub profiles_url: Option<Url>,
    /// Device certificate registry.
    pub device_registry_url: Option<Url>,
    /// Device shadow service.
    pub device_shadow_url: Option<Url>,
    /// GTX validation engine.
    pub gtx_url: Option<Url>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            profiles_url: None,
            device_registry_url: None,
            device_shadow_url: None,
            gtx_url: None,
            timeout_secs: 10,
        }
    }
}

/// `base` joined with `path`, tolerating a trailing slash on the base.
pub(crate) fn endpoint_url(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
