//! Cloud provider configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Which infrastructure provider backs instance provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProviderKind {
    /// DigitalOcean droplets.
    DigitalOcean,
    /// Linode instances.
    Linode,
}

impl fmt::Display for CloudProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DigitalOcean => write!(f, "digitalocean"),
            Self::Linode => write!(f, "linode"),
        }
    }
}

/// Cloud provider connection and instance defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Selected provider.
    pub provider: CloudProviderKind,
    /// Override for the provider API base URL.
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// API bearer token.
    pub api_token: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Region used when a request does not name one.
    pub default_region: String,
    /// Instance size/plan slug.
    pub default_size: String,
    /// Image slug.
    pub default_image: String,
}

impl CloudConfig {
    /// Reject configurations the adapters cannot work with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.api_token.trim().is_empty() {
            return Err(AppError::configuration("cloud.api_token must not be empty"));
        }
        if self.request_timeout_seconds == 0 {
            return Err(AppError::configuration(
                "cloud.request_timeout_seconds must be positive",
            ));
        }
        Ok(())
    }
}

fn default_request_timeout() -> u64 {
    30
}
