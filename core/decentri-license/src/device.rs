//! Device identity for election and binding.
//!
//! The device id is a stable fingerprint of hardware identifiers. The device
//! key is an Ed25519 key that signs ledger entries; it is persisted next to
//! the id so a restarted process can keep appending to a ledger it holds.

use crate::error::{LicenseError, LicenseResult};
use decentri_crypto::{b64_decode, b64_encode, sha256_hex, DeviceKeyPair};
use decentri_types::DeviceId;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A stable fingerprint that identifies this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    id: String,
    generated_at: chrono::DateTime<chrono::Utc>,
}

impl DeviceFingerprint {
    /// Generates a fingerprint for the current device.
    ///
    /// Combines hardware identifiers into an id that survives reboots but
    /// changes if the machine changes significantly.
    #[must_use]
    pub fn generate() -> Self {
        let combined = collect_hardware_ids().join("|");
        let mut id = sha256_hex(combined.as_bytes());
        id.truncate(32);

        Self {
            id,
            generated_at: chrono::Utc::now(),
        }
    }

    /// Returns the fingerprint as a 32-character hex id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Converts the fingerprint into a device id.
    pub fn device_id(&self) -> LicenseResult<DeviceId> {
        DeviceId::parse(&self.id).map_err(|e| LicenseError::InvalidArgument(e.to_string()))
    }
}

/// Hash of the user and host a token was activated in.
///
/// A mismatch is reported as a status flag, never as a verification failure.
#[must_use]
pub fn environment_hash() -> String {
    let user = env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_default();
    sha256_hex(format!("{user}|{}", get_hostname()).as_bytes())
}

/// The identity this process binds tokens to.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    device_id: DeviceId,
    key: DeviceKeyPair,
}

#[derive(Serialize, Deserialize)]
struct StoredIdentity {
    device_id: DeviceId,
    seed: String,
}

impl DeviceIdentity {
    /// Creates an identity from explicit parts.
    #[must_use]
    pub fn new(device_id: DeviceId, key: DeviceKeyPair) -> Self {
        Self { device_id, key }
    }

    /// Creates an identity for this machine with a fresh, unpersisted key.
    pub fn ephemeral() -> LicenseResult<Self> {
        Ok(Self::new(
            DeviceFingerprint::generate().device_id()?,
            DeviceKeyPair::generate(),
        ))
    }

    /// Replaces the device id while keeping the key.
    #[must_use]
    pub fn with_device_id(mut self, device_id: DeviceId) -> Self {
        self.device_id = device_id;
        self
    }

    /// Default location of the persisted identity.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join("decentrilicense").join("device.json"))
    }

    /// Loads the identity stored at `path`, or creates and stores a new one.
    pub fn load_or_create(path: &Path) -> LicenseResult<Self> {
        if path.exists() {
            let content =
                fs::read_to_string(path).map_err(|e| LicenseError::Storage(e.to_string()))?;
            let stored: StoredIdentity = serde_json::from_str(&content)
                .map_err(|e| LicenseError::Storage(format!("corrupt device identity: {e}")))?;
            let seed = b64_decode(&stored.seed)?;
            let key = DeviceKeyPair::from_seed_slice(&seed)?;
            debug!(device_id = %stored.device_id, "loaded device identity");
            return Ok(Self::new(stored.device_id, key));
        }

        let identity = Self::ephemeral()?;
        identity.store(path)?;
        info!(device_id = %identity.device_id, path = %path.display(), "created device identity");
        Ok(identity)
    }

    /// Writes the identity to `path`, creating parent directories.
    pub fn store(&self, path: &Path) -> LicenseResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| LicenseError::Storage(e.to_string()))?;
        }
        let stored = StoredIdentity {
            device_id: self.device_id.clone(),
            seed: b64_encode(self.key.seed().as_slice()),
        };
        fs::write(path, serde_json::to_vec_pretty(&stored)?)
            .map_err(|e| LicenseError::Storage(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))
                .map_err(|e| LicenseError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    #[must_use]
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Base64 raw Ed25519 public key published in activation entries.
    #[must_use]
    pub fn public_key_b64(&self) -> String {
        self.key.public_key_b64()
    }

    /// Signs a canonical statement with the device key.
    #[must_use]
    pub fn sign_b64(&self, message: &[u8]) -> String {
        self.key.sign_b64(message)
    }
}

/// Collects hardware identifiers for fingerprinting.
fn collect_hardware_ids() -> Vec<String> {
    let mut ids = vec![
        env::consts::OS.to_string(),
        env::consts::ARCH.to_string(),
        get_hostname(),
    ];

    if let Some(machine_id) = get_machine_id() {
        ids.push(machine_id);
    }

    if let Ok(user) = env::var("USER").or_else(|_| env::var("USERNAME")) {
        ids.push(user);
    }

    ids
}

fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Gets the machine ID (platform-specific unique identifier).
fn get_machine_id() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        fs::read_to_string("/etc/machine-id")
            .or_else(|_| fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("IOPlatformUUID"))
                    .and_then(|l| l.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}
