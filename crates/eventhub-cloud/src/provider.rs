//! Cloud provider capability and instance types.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use eventhub_core::config::CloudProviderKind;
use eventhub_core::result::AppResult;

/// Provider-neutral instance lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// Being created, booted or rebuilt.
    Provisioning,
    /// Up and reachable.
    Running,
    /// Powered off.
    Stopped,
    /// Destroyed or being destroyed.
    Deleted,
    /// A provider status with no mapping.
    Unknown,
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Provisioning => "provisioning",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Deleted => "deleted",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Request to create an instance. Unset fields fall back to the
/// configured defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceSpec {
    /// Hostname / label.
    pub name: String,
    /// Region slug.
    pub region: Option<String>,
    /// Size or plan slug.
    pub size: Option<String>,
    /// Image slug.
    pub image: Option<String>,
    /// Tags attached to the instance.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Root password, for providers that require one at creation.
    pub root_password: Option<String>,
}

/// A provisioned instance as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Provider-assigned identifier.
    pub id: String,
    /// Hostname / label.
    pub name: String,
    /// Normalized status.
    pub status: InstanceStatus,
    /// Public IPv4 address, once assigned.
    pub public_ipv4: Option<String>,
}

/// Infrastructure provider able to manage lab instances.
///
/// Selected once at startup; callers hold an `Arc<dyn CloudProvider>`.
#[async_trait]
pub trait CloudProvider: Send + Sync + fmt::Debug {
    /// Which provider this adapter talks to.
    fn kind(&self) -> CloudProviderKind;

    /// Create an instance.
    async fn create_instance(&self, spec: &InstanceSpec) -> AppResult<Instance>;

    /// Destroy an instance. Fails with `NotFound` if it does not exist.
    async fn delete_instance(&self, instance_id: &str) -> AppResult<()>;

    /// Current status. A missing instance reports `Deleted`.
    async fn get_status(&self, instance_id: &str) -> AppResult<InstanceStatus>;
}
