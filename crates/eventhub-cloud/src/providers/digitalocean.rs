//! DigitalOcean droplet adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use eventhub_core::config::{CloudConfig, CloudProviderKind};
use eventhub_core::result::AppResult;

use super::{endpoint, ensure_success, http_client, transport_error};
use crate::provider::{CloudProvider, Instance, InstanceSpec, InstanceStatus};

const DEFAULT_BASE_URL: &str = "https://api.digitalocean.com";

#[derive(Debug, Serialize)]
struct CreateDropletRequest<'a> {
    name: &'a str,
    region: &'a str,
    size: &'a str,
    image: &'a str,
    tags: &'a [String],
}

#[derive(Debug, Deserialize)]
struct DropletEnvelope {
    droplet: Droplet,
}

#[derive(Debug, Deserialize)]
struct Droplet {
    id: u64,
    name: String,
    status: String,
    #[serde(default)]
    networks: Networks,
}

#[derive(Debug, Default, Deserialize)]
struct Networks {
    #[serde(default)]
    v4: Vec<NetworkV4>,
}

#[derive(Debug, Deserialize)]
struct NetworkV4 {
    ip_address: String,
    #[serde(rename = "type")]
    kind: String,
}

impl From<Droplet> for Instance {
    fn from(d: Droplet) -> Self {
        let public_ipv4 = d
            .networks
            .v4
            .into_iter()
            .find(|n| n.kind == "public")
            .map(|n| n.ip_address);
        Self {
            id: d.id.to_string(),
            name: d.name,
            status: map_status(&d.status),
            public_ipv4,
        }
    }
}

/// Map a droplet status onto [`InstanceStatus`].
fn map_status(status: &str) -> InstanceStatus {
    match status {
        "new" => InstanceStatus::Provisioning,
        "active" => InstanceStatus::Running,
        "off" => InstanceStatus::Stopped,
        "archive" => InstanceStatus::Deleted,
        _ => InstanceStatus::Unknown,
    }
}

/// Provisions lab instances as DigitalOcean droplets.
#[derive(Debug, Clone)]
pub struct DigitalOceanProvider {
    client: Client,
    base_url: String,
    token: String,
    defaults: CloudConfig,
}

impl DigitalOceanProvider {
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

    fn create_request<'a>(&'a self, spec: &'a InstanceSpec) -> CreateDropletRequest<'a> {
        CreateDropletRequest {
            name: &spec.name,
            region: spec.region.as_deref().unwrap_or(&self.defaults.default_region),
            size: spec.size.as_deref().unwrap_or(&self.defaults.default_size),
            image: spec.image.as_deref().unwrap_or(&self.defaults.default_image),
            tags: &spec.tags,
        }
    }

    fn droplet_url(&self, instance_id: &str) -> String {
        endpoint(&self.base_url, &format!("v2/droplets/{instance_id}"))
    }
}

#[async_trait]
impl CloudProvider for DigitalOceanProvider {
    fn kind(&self) -> CloudProviderKind {
        CloudProviderKind::DigitalOcean
    }

    async fn create_instance(&self, spec: &InstanceSpec) -> AppResult<Instance> {
        let response = self
            .client
            .post(endpoint(&self.base_url, "v2/droplets"))
            .bearer_auth(&self.token)
            .json(&self.create_request(spec))
            .send()
            .await
            .map_err(|e| transport_error("create droplet", e))?;

        let envelope: DropletEnvelope = ensure_success("create droplet", response)
            .await?
            .json()
            .await
            .map_err(|e| transport_error("decode droplet", e))?;

        let instance = Instance::from(envelope.droplet);
        info!(instance_id = %instance.id, name = %instance.name, "Droplet created");
        Ok(instance)
    }

    async fn delete_instance(&self, instance_id: &str) -> AppResult<()> {
        let response = self
            .client
            .delete(self.droplet_url(instance_id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| transport_error("delete droplet", e))?;

        ensure_success("delete droplet", response).await?;
        info!(instance_id = %instance_id, "Droplet deleted");
        Ok(())
    }

    async fn get_status(&self, instance_id: &str) -> AppResult<InstanceStatus> {
        let response = self
            .client
            .get(self.droplet_url(instance_id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| transport_error("get droplet", e))?;

        let envelope: DropletEnvelope = match ensure_success("get droplet", response).await {
            Ok(r) => r
                .json()
                .await
                .map_err(|e| transport_error("decode droplet", e))?,
            Err(e) if e.is_not_found() => {
                debug!(instance_id = %instance_id, "Droplet no longer exists");
                return Ok(InstanceStatus::Deleted);
            }
            Err(e) => return Err(e),
        };

        Ok(map_status(&envelope.droplet.status))
    }
}
