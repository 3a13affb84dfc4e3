//! Concrete provider adapters over the providers' REST APIs.

pub mod digitalocean;
pub mod linode;

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};

use eventhub_core::config::CloudConfig;
use eventhub_core::error::{AppError, ErrorKind};
use eventhub_core::result::AppResult;

pub use digitalocean::DigitalOceanProvider;
pub use linode::LinodeProvider;

/// Build an HTTP client with the configured timeout.
fn http_client(config: &CloudConfig) -> AppResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_seconds))
        .user_agent(concat!("eventhub/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            AppError::with_source(ErrorKind::Configuration, "Failed to build HTTP client", e)
        })
}

/// Map a transport failure.
fn transport_error(action: &str, e: reqwest::Error) -> AppError {
    AppError::with_source(
        ErrorKind::ExternalService,
        format!("Cloud API request failed ({action}): {e}"),
        e,
    )
}

/// Turn a non-success response into an error carrying the response body.
async fn ensure_success(action: &str, response: Response) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("Cloud API {action} returned {status}: {body}");
    Err(match status {
        StatusCode::NOT_FOUND => AppError::not_found(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::configuration(message),
        StatusCode::UNPROCESSABLE_ENTITY | StatusCode::BAD_REQUEST => {
            AppError::validation(message)
        }
        _ => AppError::external_service(message),
    })
}

/// Join a base URL and a path without doubling the slash.
fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
