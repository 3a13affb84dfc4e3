//! Linode instance adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use eventhub_core::config::{CloudConfig, CloudProviderKind};
use eventhub_core::error::AppError;
use eventhub_core::result::AppResult;

use super::{endpoint, ensure_success, http_client, transport_error};
use crate::provider::{CloudProvider, Instance, InstanceSpec, InstanceStatus};

const DEFAULT_BASE_URL: &str = "https://api.linode.com";

#[derive(Debug, Serialize)]
struct CreateLinodeRequest<'a> {
    label: &'a str,
    region: &'a str,
    #[serde(rename = "type")]
    plan: &'a str,
    image: &'a str,
    root_pass: &'a str,
    tags: &'a [String],
}

#[derive(Debug, Deserialize)]
struct Linode {
    id: u64,
    label: String,
    status: String,
    #[serde(default)]
    ipv4: Vec<String>,
}

impl From<Linode> for Instance {
    fn from(l: Linode) -> Self {
        let public_ipv4 = l.ipv4.into_iter().find(|ip| !is_private_v4(ip));
        Self {
            id: l.id.to_string(),
            name: l.label,
            status: map_status(&l.status),
            public_ipv4,
        }
    }
}

fn is_private_v4(ip: &str) -> bool {
    ip.parse::<std::net::Ipv4Addr>()
        .map(|addr| addr.is_private())
        .unwrap_or(false)
}

/// Map a Linode status onto [`InstanceStatus`].
fn map_status(status: &str) -> InstanceStatus {
    match status {
        "provisioning" | "booting" | "rebooting" | "rebuilding" | "cloning" | "restoring"
        | "migrating" | "resizing" => InstanceStatus::Provisioning,
        "running" => InstanceStatus::Running,
        "offline" | "stopped" | "shutting_down" => InstanceStatus::Stopped,
        "deleting" => InstanceStatus::Deleted,
        _ => InstanceStatus::Unknown,
    }
}

/// Provisions lab instances as Linodes.
#[derive(Debug, Clone)]
pub struct LinodeProvider {
    client: Client,
    base_url: String,
    token: String,
    defaults: CloudConfig,
}

impl LinodeProvider {
    /// Create the adapter from configuration.
    pub fn new(config: &CloudConfig) -> AppResult<Self> {
        Ok(Self {
            client: http_client(config)?,
            base_url: config
                .api_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            token: config.api_token.clone(),
            defaults: config.clone(),
        })
    }

    fn create_request<'a>(&'a self, spec: &'a InstanceSpec) -> AppResult<CreateLinodeRequest<'a>> {
        // Linode refuses image deployments without a root password.
        let root_pass = spec.root_password.as_deref().ok_or_else(|| {
            AppError::validation("Linode instances require a root password")
        })?;

        Ok(CreateLinodeRequest {
            label: &spec.name,
            region: spec.region.as_deref().unwrap_or(&self.defaults.default_region),
            plan: spec.size.as_deref().unwrap_or(&self.defaults.default_size),
            image: spec.image.as_deref().unwrap_or(&self.defaults.default_image),
            root_pass,
            tags: &spec.tags,
        })
    }

    fn instance_url(&self, instance_id: &str) -> String {
        endpoint(&self.base_url, &format!("v4/linode/instances/{instance_id}"))
    }
}

#[async_trait]
impl CloudProvider for LinodeProvider {
    fn kind(&self) -> CloudProviderKind {
        CloudProviderKind::Linode
    }

    async fn create_instance(&self, spec: &InstanceSpec) -> AppResult<Instance> {
        let body = self.create_request(spec)?;
        let response = self
            .client
            .post(endpoint(&self.base_url, "v4/linode/instances"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("create linode", e))?;

        let linode: Linode = ensure_success("create linode", response)
            .await?
            .json()
            .await
            .map_err(|e| transport_error("decode linode", e))?;

        let instance = Instance::from(linode);
        info!(instance_id = %instance.id, name = %instance.name, "Linode created");
        Ok(instance)
    }

    async fn delete_instance(&self, instance_id: &str) -> AppResult<()> {
        let response = self
            .client
            .delete(self.instance_url(instance_id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| transport_error("delete linode", e))?;

        ensure_success("delete linode", response).await?;
        info!(instance_id = %instance_id, "Linode deleted");
        Ok(())
    }

    async fn get_status(&self, instance_id: &str) -> AppResult<InstanceStatus> {
        let response = self
            .client
            .get(self.instance_url(instance_id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| transport_error("get linode", e))?;

        let linode: Linode = match ensure_success("get linode", response).await {
            Ok(r) => r
                .json()
                .await
                .map_err(|e| transport_error("decode linode", e))?,
            Err(e) if e.is_not_found() => {
                debug!(instance_id = %instance_id, "Linode no longer exists");
                return Ok(InstanceStatus::Deleted);
            }
            Err(e) => return Err(e),
        };

        Ok(map_status(&linode.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use eventhub_core::error::ErrorKind;

    fn config() -> CloudConfig {
        CloudConfig {
            provider: CloudProviderKind::Linode,
            api_base_url: None,
            api_token: "linode-token".to_string(),
            request_timeout_seconds: 5,
            default_region: "eu-central".to_string(),
            default_size: "g6-standard-1".to_string(),
            default_image: "linode/debian12".to_string(),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_status("provisioning"), InstanceStatus::Provisioning);
        assert_eq!(map_status("booting"), InstanceStatus::Provisioning);
        assert_eq!(map_status("running"), InstanceStatus::Running);
        assert_eq!(map_status("offline"), InstanceStatus::Stopped);
        assert_eq!(map_status("deleting"), InstanceStatus::Deleted);
        assert_eq!(map_status("billing_suspension"), InstanceStatus::Unknown);
    }

    #[test]
    fn test_create_request_requires_root_password() {
        let provider = LinodeProvider::new(&config()).unwrap();
        let spec = InstanceSpec {
            name: "team-07-target".to_string(),
            ..Default::default()
        };
        let err = provider.create_request(&spec).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_create_request_body() {
        let provider = LinodeProvider::new(&config()).unwrap();
        let spec = InstanceSpec {
            name: "team-07-target".to_string(),
            region: Some("us-east".to_string()),
            root_password: Some("c0rrect-horse".to_string()),
            ..Default::default()
        };

        let body = serde_json::to_value(provider.create_request(&spec).unwrap()).unwrap();
        assert_eq!(body["label"], "team-07-target");
        assert_eq!(body["region"], "us-east");
        assert_eq!(body["type"], "g6-standard-1");
        assert_eq!(body["image"], "linode/debian12");
        assert_eq!(
            provider.instance_url("99"),
            "https://api.linode.com/v4/linode/instances/99"
        );
    }

    #[test]
    fn test_linode_response_picks_public_address() {
        let json = r#"{
            "id": 123,
            "label": "team-07-target",
            "status": "running",
            "ipv4": ["192.168.130.5", "198.51.100.20"]
        }"#;
        let linode: Linode = serde_json::from_str(json).unwrap();
        let instance = Instance::from(linode);

        assert_eq!(instance.id, "123");
        assert_eq!(instance.status, InstanceStatus::Running);
        assert_eq!(instance.public_ipv4.as_deref(), Some("198.51.100.20"));
    }
}
