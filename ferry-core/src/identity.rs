//! Identity types for Ferry entities

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Tenant identifier. One tenant is one isolated customer account.
pub type TenantId = Uuid;

/// External data source identifier.
pub type DataSourceId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Opaque correlator token carried on every tunneled call/response pair.
/// Generated server-side from a random UUID; agents treat it as a string.
pub type RequestId = String;

/// Transport-level connection identifier assigned by the hub on accept.
pub type ConnectionId = String;

/// Generate a new request id (32 lowercase hex chars, no hyphens).
pub fn new_request_id() -> RequestId {
    Uuid::new_v4().simple().to_string()
}

/// Compute the lowercase hex SHA-256 digest of the input.
///
/// Used for the one-way agent API key lookup and for query cache keys.
pub fn sha256_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_hex_and_unique() {
        let a = new_request_id();
        let b = new_request_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
