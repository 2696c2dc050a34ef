//! Agent API key validation
//!
//! Keys look like `gw_<64 hex chars>`. Only the SHA-256 hash of the full key
//! is stored, alongside the first 16 characters as a displayable prefix; the
//! raw key is returned exactly once at generation time and never logged.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ferry_core::{sha256_hex, GatewayError, GatewayResult, TenantId};
use rand::RngCore;
use tracing::warn;
use uuid::Uuid;

pub const API_KEY_PREFIX_LEN: usize = 16;

/// Stored credential for one agent.
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub tenant_id: TenantId,
    /// First [`API_KEY_PREFIX_LEN`] chars of the raw key, safe to display.
    pub key_prefix: String,
    /// SHA-256 hex of the full raw key.
    pub key_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Generate a fresh key for a tenant. The second element is the raw key; it
/// must be handed to the operator and cannot be recovered later.
pub fn generate_api_key(tenant_id: TenantId, expires_at: Option<DateTime<Utc>>) -> (ApiKeyRecord, String) {
    let mut material = [0u8; 32];
    rand::rng().fill_bytes(&mut material);
    let raw = format!("gw_{}", hex::encode(material));

    let record = ApiKeyRecord {
        id: Uuid::new_v4(),
        tenant_id,
        key_prefix: raw[..API_KEY_PREFIX_LEN].to_string(),
        key_hash: sha256_hex(raw.as_bytes()),
        created_at: Utc::now(),
        expires_at,
        revoked: false,
        last_used_at: None,
    };
    (record, raw)
}

/// Credential storage seam.
pub trait ApiKeyStore: Send + Sync {
    fn find_by_hash(&self, key_hash: &str) -> Option<ApiKeyRecord>;
    fn touch(&self, id: Uuid);
    fn revoke(&self, id: Uuid);
}

/// Hash-keyed in-memory store.
#[derive(Default)]
pub struct InMemoryApiKeyStore {
    by_hash: DashMap<String, ApiKeyRecord>,
}

impl InMemoryApiKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: ApiKeyRecord) {
        self.by_hash.insert(record.key_hash.clone(), record);
    }
}

impl ApiKeyStore for InMemoryApiKeyStore {
    fn find_by_hash(&self, key_hash: &str) -> Option<ApiKeyRecord> {
        self.by_hash.get(key_hash).map(|r| r.clone())
    }

    fn touch(&self, id: Uuid) {
        for mut entry in self.by_hash.iter_mut() {
            if entry.id == id {
                entry.last_used_at = Some(Utc::now());
                break;
            }
        }
    }

    fn revoke(&self, id: Uuid) {
        for mut entry in self.by_hash.iter_mut() {
            if entry.id == id {
                entry.revoked = true;
                break;
            }
        }
    }
}

pub struct ApiKeyValidator {
    store: std::sync::Arc<dyn ApiKeyStore>,
}

impl ApiKeyValidator {
    pub fn new(store: std::sync::Arc<dyn ApiKeyStore>) -> Self {
        Self { store }
    }

    /// Resolve a raw key to its tenant. Rejects unknown, revoked, and
    /// expired keys with the same coarse error; the distinction is logged
    /// (by prefix only), not surfaced to the caller.
    pub fn validate(&self, raw_key: &str) -> GatewayResult<TenantId> {
        let hash = sha256_hex(raw_key.as_bytes());
        let prefix: String = raw_key.chars().take(API_KEY_PREFIX_LEN).collect();

        let Some(record) = self.store.find_by_hash(&hash) else {
            warn!(key_prefix = %prefix, "unknown agent api key");
            return Err(GatewayError::Authentication {
                reason: "invalid api key".into(),
            });
        };
        if record.revoked {
            warn!(key_prefix = %record.key_prefix, "revoked agent api key");
            return Err(GatewayError::Authentication {
                reason: "invalid api key".into(),
            });
        }
        if let Some(expires_at) = record.expires_at {
            if expires_at <= Utc::now() {
                warn!(key_prefix = %record.key_prefix, "expired agent api key");
                return Err(GatewayError::Authentication {
                    reason: "invalid api key".into(),
                });
            }
        }

        self.store.touch(record.id);
        Ok(record.tenant_id)
    }
}
