//! HTTP client for the rendezvous registry.

use crate::error::{ClientError, ClientResult};
use decentri_types::DeviceId;
use decentri_types::registry::{Ack, DeviceRecord, HeartbeatRequest, RegistryStats, TransferRequest};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Talks to a `decentri-registry` server.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct Health {
    status: String,
}

fn registry_error(e: reqwest::Error) -> ClientError {
    ClientError::Registry(e.to_string())
}

impl RegistryClient {
    /// Creates a client for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::InvalidArgument(format!(
                "registry url must be http(s): {base_url:?}"
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(registry_error)?;
        Ok(Self { http, base_url })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Whether the registry answers its health check.
    pub async fn health(&self) -> ClientResult<bool> {
        let resp = self
            .http
            .get(self.url("/api/health"))
            .send()
            .await
            .map_err(registry_error)?;
        if !resp.status().is_success() {
            return Ok(false);
        }
        let health: Health = resp.json().await.map_err(registry_error)?;
        Ok(health.status == "healthy")
    }

    /// Registers (or refreshes) this device as the holder of its license code.
    pub async fn register(&self, record: &DeviceRecord) -> ClientResult<()> {
        let resp = self
            .http
            .post(self.url("/api/devices/register"))
            .json(record)
            .send()
            .await
            .map_err(registry_error)?;
        let ack = ack_or_error(resp).await?;
        debug!(device_id = %record.device_id, license_code = %record.license_code, "registered with registry");
        expect_success(ack)
    }

    /// Refreshes the device's last-seen time. Returns false if unknown.
    pub async fn heartbeat(&self, device_id: &DeviceId) -> ClientResult<bool> {
        let resp = self
            .http
            .post(self.url("/api/devices/heartbeat"))
            .json(&HeartbeatRequest {
                device_id: device_id.clone(),
            })
            .send()
            .await
            .map_err(registry_error)?;
        Ok(ack_or_error(resp).await?.success)
    }

    /// The device currently registered for `license_code`, if any.
    pub async fn holder(&self, license_code: &str) -> ClientResult<Option<DeviceRecord>> {
        let resp = self
            .http
            .get(self.url(&format!("/api/licenses/{license_code}/holder")))
            .send()
            .await
            .map_err(registry_error)?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(resp.json().await.map_err(registry_error)?)),
            status => Err(ClientError::Registry(format!("holder lookup failed: {status}"))),
        }
    }

    /// Asks the registry to move the license to another device.
    pub async fn transfer(&self, request: &TransferRequest) -> ClientResult<()> {
        let resp = self
            .http
            .post(self.url("/api/tokens/transfer"))
            .json(request)
            .send()
            .await
            .map_err(registry_error)?;
        expect_success(ack_or_error(resp).await?)
    }

    pub async fn stats(&self) -> ClientResult<RegistryStats> {
        let resp = self
            .http
            .get(self.url("/api/stats"))
            .send()
            .await
            .map_err(registry_error)?;
        if !resp.status().is_success() {
            return Err(ClientError::Registry(format!("stats failed: {}", resp.status())));
        }
        resp.json().await.map_err(registry_error)
    }
}

async fn ack_or_error(resp: reqwest::Response) -> ClientResult<Ack> {
    let status = resp.status();
    if status.is_success() {
        return resp.json().await.map_err(registry_error);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::Registry(format!("{status}: {}", body.trim())))
}

fn expect_success(ack: Ack) -> ClientResult<()> {
    if ack.success {
        Ok(())
    } else {
        Err(ClientError::Registry(ack.message))
    }
}
