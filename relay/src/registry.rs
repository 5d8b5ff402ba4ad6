//! In-memory device registry.

use crate::error::{RegistryError, RegistryResult};
use chrono::{DateTime, Duration, Utc};
use decentri_types::registry::{DeviceRecord, RegistryStats, TransferRequest};
use decentri_types::DeviceId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::info;

/// Devices unseen for longer than this are dropped by cleanup.
pub const INACTIVE_AFTER: Duration = Duration::minutes(5);

/// A transfer target must have been seen within this window.
pub const TRANSFER_RECENCY: Duration = Duration::minutes(10);

#[derive(Debug, Default)]
struct Tables {
    devices: HashMap<DeviceId, DeviceRecord>,
    /// license code -> holder device
    holders: HashMap<String, DeviceId>,
}

#[derive(Debug, Default)]
struct Counters {
    registrations: AtomicU64,
    heartbeats: AtomicU64,
    queries: AtomicU64,
}

/// Which device last claimed each license code, and where it is reachable.
#[derive(Debug, Default)]
pub struct Registry {
    tables: RwLock<Tables>,
    counters: Counters,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or refreshes a device and makes it the holder of its
    /// license code.
    pub async fn register(&self, mut record: DeviceRecord, now: DateTime<Utc>) {
        record.last_seen = Some(now);
        let mut tables = self.tables.write().await;
        tables
            .holders
            .insert(record.license_code.clone(), record.device_id.clone());
        info!(device_id = %record.device_id, license_code = %record.license_code, "device registered");
        tables.devices.insert(record.device_id.clone(), record);
        self.counters.registrations.fetch_add(1, Ordering::Relaxed);
    }

    /// Refreshes a device's last-seen time. Returns false if unknown.
    pub async fn heartbeat(&self, device_id: &DeviceId, now: DateTime<Utc>) -> bool {
        let mut tables = self.tables.write().await;
        let Some(device) = tables.devices.get_mut(device_id) else {
            return false;
        };
        device.last_seen = Some(now);
        self.counters.heartbeats.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// The device holding `license_code`.
    pub async fn holder(&self, license_code: &str) -> Option<DeviceRecord> {
        let tables = self.tables.read().await;
        let device_id = tables.holders.get(license_code)?;
        let device = tables.devices.get(device_id).cloned();
        if device.is_some() {
            self.counters.queries.fetch_add(1, Ordering::Relaxed);
        }
        device
    }

    pub async fn device(&self, device_id: &DeviceId) -> Option<DeviceRecord> {
        self.tables.read().await.devices.get(device_id).cloned()
    }

    /// Moves a license to another device after validating the request.
    ///
    /// The sender must be the current holder and the target must have been
    /// seen recently. Plain token data must name the same license code;
    /// encrypted data is passed through unchecked.
    pub async fn transfer(&self, request: &TransferRequest, now: DateTime<Utc>) -> RegistryResult<()> {
        let mut tables = self.tables.write().await;

        let holder = tables
            .holders
            .get(&request.license_code)
            .ok_or_else(|| RegistryError::LicenseNotFound(request.license_code.clone()))?;
        if holder != &request.from_device {
            return Err(RegistryError::NotHolder {
                device: request.from_device.clone(),
                holder: holder.clone(),
            });
        }

        let target = tables
            .devices
            .get(&request.to_device)
            .ok_or_else(|| RegistryError::UnknownDevice(request.to_device.clone()))?;
        let recent = target
            .last_seen
            .is_some_and(|seen| now - seen <= TRANSFER_RECENCY);
        if !recent {
            return Err(RegistryError::InactiveDevice(request.to_device.clone()));
        }

        if let Some(data) = &request.token_data {
            check_token_license(data, &request.license_code)?;
        }

        tables
            .holders
            .insert(request.license_code.clone(), request.to_device.clone());
        info!(
            license_code = %request.license_code,
            from = %request.from_device,
            to = %request.to_device,
            "license transferred"
        );
        Ok(())
    }

    /// Drops devices unseen for longer than `max_age`, together with the
    /// licenses they hold. Returns how many devices were removed.
    pub async fn cleanup_inactive(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let mut tables = self.tables.write().await;
        let stale: Vec<DeviceId> = tables
            .devices
            .values()
            .filter(|d| d.last_seen.is_none_or(|seen| now - seen > max_age))
            .map(|d| d.device_id.clone())
            .collect();

        for device_id in &stale {
            tables.devices.remove(device_id);
        }
        tables.holders.retain(|_, holder| !stale.contains(holder));
        stale.len()
    }

    pub async fn stats(&self) -> RegistryStats {
        let tables = self.tables.read().await;
        RegistryStats {
            total_devices: tables.devices.len() as u64,
            total_licenses: tables.holders.len() as u64,
            registrations: self.counters.registrations.load(Ordering::Relaxed),
            heartbeats: self.counters.heartbeats.load(Ordering::Relaxed),
            queries: self.counters.queries.load(Ordering::Relaxed),
        }
    }
}

fn check_token_license(data: &str, license_code: &str) -> RegistryResult<()> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(data) else {
        return Ok(());
    };
    match value.get("license_code").and_then(serde_json::Value::as_str) {
        Some(code) if code == license_code => Ok(()),
        Some(code) => Err(RegistryError::TokenMismatch(format!(
            "token is for license {code}, not {license_code}"
        ))),
        None => Err(RegistryError::TokenMismatch(
            "token data carries no license code".to_string(),
        )),
    }
}
