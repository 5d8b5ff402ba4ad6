//! Token model and JSON representation.
//!
//! A token is immutable: activation and usage produce new token values with
//! an extended ledger, and the original is left untouched.

use crate::error::{LicenseError, LicenseResult};
use decentri_crypto::KeyAlgorithm;
use decentri_types::{DeviceId, TokenId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One hash-linked entry of the usage ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageChainEntry {
    /// Position in the ledger, starting at 0.
    pub seq: u64,
    /// Unix seconds when the entry was appended.
    pub time: i64,
    /// Action name (`activate` for bindings).
    pub action: String,
    /// Free-form action parameters.
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Hash of the previous entry, or the genesis hash.
    pub hash_prev: String,
    /// Base64 device signature over the entry statement.
    pub signature: String,
}

/// A license token with its trust chain and embedded ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    token_id: TokenId,
    app_id: String,
    license_code: String,
    alg: KeyAlgorithm,
    issue_time: i64,
    expire_time: i64,
    license_public_key: String,
    root_signature: String,
    signature: String,
    environment_hash: Option<String>,
    holder_device_id: Option<DeviceId>,
    usage_chain: Vec<UsageChainEntry>,
    state_index: u64,
    ledger_head: String,
    state_signature: String,
}

/// Wire shape used for parsing. Required fields are optional here so a
/// missing one can be reported by name.
#[derive(Deserialize)]
struct RawToken {
    token_id: Option<String>,
    app_id: Option<String>,
    license_code: Option<String>,
    alg: Option<String>,
    issue_time: Option<i64>,
    expire_time: Option<i64>,
    license_public_key: Option<String>,
    root_signature: Option<String>,
    signature: Option<String>,
    #[serde(default)]
    environment_hash: String,
    #[serde(default)]
    holder_device_id: String,
    #[serde(default)]
    usage_chain: Vec<UsageChainEntry>,
    #[serde(default)]
    state_index: u64,
    #[serde(default)]
    ledger_head: String,
    #[serde(default)]
    state_signature: String,
}

#[derive(Serialize)]
struct TokenJson<'a> {
    token_id: &'a TokenId,
    app_id: &'a str,
    license_code: &'a str,
    alg: KeyAlgorithm,
    issue_time: i64,
    expire_time: i64,
    license_public_key: &'a str,
    root_signature: &'a str,
    signature: &'a str,
    environment_hash: &'a str,
    holder_device_id: &'a str,
    usage_chain: &'a [UsageChainEntry],
    state_index: u64,
    ledger_head: &'a str,
    state_signature: &'a str,
}

fn required<T>(value: Option<T>, field: &str) -> LicenseResult<T> {
    value.ok_or_else(|| LicenseError::MalformedToken(format!("missing field `{field}`")))
}

fn required_str(value: Option<String>, field: &str) -> LicenseResult<String> {
    let value = required(value, field)?;
    if value.trim().is_empty() {
        return Err(LicenseError::MalformedToken(format!("empty field `{field}`")));
    }
    Ok(value)
}

impl Token {
    /// Parses a token from its JSON form.
    pub fn from_json(json: &str) -> LicenseResult<Self> {
        let raw: RawToken = serde_json::from_str(json)
            .map_err(|e| LicenseError::MalformedToken(e.to_string()))?;

        let alg_name = required_str(raw.alg, "alg")?;
        let alg: KeyAlgorithm = alg_name
            .parse()
            .map_err(|_| LicenseError::UnsupportedAlgorithm(alg_name.clone()))?;
        if !alg.is_available() {
            return Err(LicenseError::UnsupportedAlgorithm(format!(
                "{alg} is not enabled in this build"
            )));
        }

        let token_id = TokenId::parse(&required_str(raw.token_id, "token_id")?)
            .map_err(|e| LicenseError::MalformedToken(e.to_string()))?;
        let holder_device_id = if raw.holder_device_id.is_empty() {
            None
        } else {
            Some(
                DeviceId::parse(&raw.holder_device_id)
                    .map_err(|e| LicenseError::MalformedToken(e.to_string()))?,
            )
        };
        let expire_time = required(raw.expire_time, "expire_time")?;
        if expire_time < 0 {
            return Err(LicenseError::MalformedToken(
                "negative `expire_time`".to_string(),
            ));
        }

        Ok(Self {
            token_id,
            app_id: required_str(raw.app_id, "app_id")?,
            license_code: required_str(raw.license_code, "license_code")?,
            alg,
            issue_time: required(raw.issue_time, "issue_time")?,
            expire_time,
            license_public_key: required_str(raw.license_public_key, "license_public_key")?,
            root_signature: required_str(raw.root_signature, "root_signature")?,
            signature: required_str(raw.signature, "signature")?,
            environment_hash: Some(raw.environment_hash).filter(|h| !h.is_empty()),
            holder_device_id,
            usage_chain: raw.usage_chain,
            state_index: raw.state_index,
            ledger_head: raw.ledger_head,
            state_signature: raw.state_signature,
        })
    }

    /// Serializes the token to compact JSON.
    pub fn to_json(&self) -> LicenseResult<String> {
        Ok(serde_json::to_string(&self.as_json())?)
    }

    /// Serializes the token to indented JSON.
    pub fn to_json_pretty(&self) -> LicenseResult<String> {
        Ok(serde_json::to_string_pretty(&self.as_json())?)
    }

    fn as_json(&self) -> TokenJson<'_> {
        TokenJson {
            token_id: &self.token_id,
            app_id: &self.app_id,
            license_code: &self.license_code,
            alg: self.alg,
            issue_time: self.issue_time,
            expire_time: self.expire_time,
            license_public_key: &self.license_public_key,
            root_signature: &self.root_signature,
            signature: &self.signature,
            environment_hash: self.environment_hash.as_deref().unwrap_or(""),
            holder_device_id: self.holder_device_id.as_ref().map_or("", DeviceId::as_str),
            usage_chain: &self.usage_chain,
            state_index: self.state_index,
            ledger_head: &self.ledger_head,
            state_signature: &self.state_signature,
        }
    }

    /// Creates a freshly issued, unbound token. Signing happens in the issuer.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn unsigned(
        token_id: TokenId,
        app_id: String,
        license_code: String,
        alg: KeyAlgorithm,
        issue_time: i64,
        expire_time: i64,
        license_public_key: String,
        root_signature: String,
        environment_hash: Option<String>,
    ) -> Self {
        Self {
            token_id,
            app_id,
            license_code,
            alg,
            issue_time,
            expire_time,
            license_public_key,
            root_signature,
            signature: String::new(),
            environment_hash,
            holder_device_id: None,
            usage_chain: Vec::new(),
            state_index: 0,
            ledger_head: String::new(),
            state_signature: String::new(),
        }
    }

    pub(crate) fn with_signature(mut self, signature: String) -> Self {
        self.signature = signature;
        self
    }

    /// Returns a copy carrying an extended ledger.
    pub(crate) fn with_ledger(
        &self,
        entry: UsageChainEntry,
        holder: DeviceId,
        ledger_head: String,
        state_signature: String,
    ) -> Self {
        let mut next = self.clone();
        next.state_index = entry.seq;
        next.usage_chain.push(entry);
        next.holder_device_id = Some(holder);
        next.ledger_head = ledger_head;
        next.state_signature = state_signature;
        next
    }

    #[must_use]
    pub fn token_id(&self) -> &TokenId {
        &self.token_id
    }

    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    #[must_use]
    pub fn license_code(&self) -> &str {
        &self.license_code
    }

    #[must_use]
    pub fn alg(&self) -> KeyAlgorithm {
        self.alg
    }

    #[must_use]
    pub fn issue_time(&self) -> i64 {
        self.issue_time
    }

    /// Unix seconds after which the token is expired, or 0 for never.
    #[must_use]
    pub fn expire_time(&self) -> i64 {
        self.expire_time
    }

    #[must_use]
    pub fn license_public_key(&self) -> &str {
        &self.license_public_key
    }

    #[must_use]
    pub fn root_signature(&self) -> &str {
        &self.root_signature
    }

    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    #[must_use]
    pub fn environment_hash(&self) -> Option<&str> {
        self.environment_hash.as_deref()
    }

    /// The device currently holding the binding, if activated.
    #[must_use]
    pub fn holder_device_id(&self) -> Option<&DeviceId> {
        self.holder_device_id.as_ref()
    }

    #[must_use]
    pub fn usage_chain(&self) -> &[UsageChainEntry] {
        &self.usage_chain
    }

    /// Seq of the last ledger entry (0 when the ledger is empty).
    #[must_use]
    pub fn state_index(&self) -> u64 {
        self.state_index
    }

    #[must_use]
    pub fn ledger_head(&self) -> &str {
        &self.ledger_head
    }

    #[must_use]
    pub fn state_signature(&self) -> &str {
        &self.state_signature
    }

    /// Returns true if any device holds the binding.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.holder_device_id.is_some()
    }

    /// Returns true if the token has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expire_time != 0 && now > self.expire_time
    }

    /// Seq of the last ledger entry, if any.
    #[must_use]
    pub fn last_seq(&self) -> Option<u64> {
        self.usage_chain.last().map(|e| e.seq)
    }
}
