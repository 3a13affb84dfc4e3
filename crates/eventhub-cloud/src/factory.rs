//! Configuration-time provider selection.

use std::sync::Arc;

use tracing::info;

use eventhub_core::config::{CloudConfig, CloudProviderKind};
use eventhub_core::result::AppResult;

use crate::provider::CloudProvider;
use crate::providers::{DigitalOceanProvider, LinodeProvider};

/// Build the adapter named by `config.provider`.
pub fn build_provider(config: &CloudConfig) -> AppResult<Arc<dyn CloudProvider>> {
    config.validate()?;

    let provider: Arc<dyn CloudProvider> = match config.provider {
        CloudProviderKind::DigitalOcean => Arc::new(DigitalOceanProvider::new(config)?),
        CloudProviderKind::Linode => Arc::new(LinodeProvider::new(config)?),
    };

    info!(provider = %config.provider, "Cloud provider configured");
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: CloudProviderKind) -> CloudConfig {
        CloudConfig {
            provider,
            api_base_url: None,
            api_token: "token".to_string(),
            request_timeout_seconds: 5,
            default_region: "fra1".to_string(),
            default_size: "s-1vcpu-1gb".to_string(),
            default_image: "ubuntu-22-04-x64".to_string(),
        }
    }

    #[test]
    fn test_selects_configured_provider() {
        let provider = build_provider(&config(CloudProviderKind::DigitalOcean)).unwrap();
        assert_eq!(provider.kind(), CloudProviderKind::DigitalOcean);

        let provider = build_provider(&config(CloudProviderKind::Linode)).unwrap();
        assert_eq!(provider.kind(), CloudProviderKind::Linode);
    }

    #[test]
    fn test_rejects_empty_token() {
        let mut cfg = config(CloudProviderKind::Linode);
        cfg.api_token = String::new();
        assert!(build_provider(&cfg).is_err());
    }
}
