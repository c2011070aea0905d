use serde::Serialize;

use crate::local::{VectorMetadata, VectorSearchHit};
use crate::types::GovernanceError;

const PREFIX: &str = "tenant-";
const SUFFIX: &str = "-store";

/// Name of a tenant's slice of the shared vector index and blob store.
///
/// Only [`resolve`] constructs one, so a `Partition` is always
/// `tenant-<sanitized id>-store` with a non-empty sanitized id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Partition(String);

impl Partition {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Partition {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Keep only `[A-Za-z0-9_-]`.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Derive the partition of a tenant id.
///
/// Pure and deterministic. Fails with `InvalidTenant` for empty or
/// whitespace-only ids, and for ids with no legal character at all.
pub fn resolve(tenant_id: &str) -> Result<Partition, GovernanceError> {
    if tenant_id.trim().is_empty() {
        return Err(GovernanceError::InvalidTenant(
            "tenant id is empty".to_string(),
        ));
    }

    let sanitized = sanitize(tenant_id);
    if sanitized.is_empty() {
        return Err(GovernanceError::InvalidTenant(
            "tenant id has no usable characters".to_string(),
        ));
    }

    Ok(Partition(format!("{PREFIX}{sanitized}{SUFFIX}")))
}

/// A record that carries the id of the tenant it belongs to.
pub trait TenantOwned {
    fn owner(&self) -> &str;
}

impl TenantOwned for VectorMetadata {
    fn owner(&self) -> &str {
        &self.tenant_id
    }
}

impl TenantOwned for VectorSearchHit {
    fn owner(&self) -> &str {
        &self.metadata.tenant_id
    }
}

/// Drop every record not owned by exactly `tenant_id`.
///
/// Applied to everything read back from shared storage, whatever partition
/// it was read from.
pub fn filter_owned<T: TenantOwned>(records: Vec<T>, tenant_id: &str) -> Vec<T> {
    let before = records.len();
    let owned: Vec<T> = records
        .into_iter()
        .filter(|r| r.owner() == tenant_id)
        .collect();

    if owned.len() != before {
        tracing::warn!(
            tenant = tenant_id,
            dropped = before - owned.len(),
            "Dropped records owned by another tenant"
        );
    }

    owned
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn meta(tenant_id: &str, key: &str) -> VectorMetadata {
        VectorMetadata {
            key: key.to_string(),
            tenant_id: tenant_id.to_string(),
            document_id: "doc".to_string(),
            source_type: "document".to_string(),
            title: "title".to_string(),
            text: "text".to_string(),
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_resolve_wraps_sanitized_id() {
        let partition = resolve("user123").unwrap();
        assert_eq!(partition.as_str(), "tenant-user123-store");
        assert_eq!(
            resolve("Acme_Corp-01").unwrap().to_string(),
            "tenant-Acme_Corp-01-store"
        );
    }

    #[test]
    fn test_resolve_rejects_blank_ids() {
        assert!(matches!(resolve(""), Err(GovernanceError::InvalidTenant(_))));
        assert!(matches!(
            resolve("   "),
            Err(GovernanceError::InvalidTenant(_))
        ));
        assert!(matches!(
            resolve("\t\n"),
            Err(GovernanceError::InvalidTenant(_))
        ));
    }

    #[test]
    fn test_resolve_rejects_ids_without_legal_characters() {
        assert!(matches!(
            resolve("「」、。"),
            Err(GovernanceError::InvalidTenant(_))
        ));
        assert!(matches!(
            resolve("@#$%"),
            Err(GovernanceError::InvalidTenant(_))
        ));
    }

    #[test]
    fn test_sanitization_is_lossy_but_deterministic() {
        let stripped = resolve("user@#$123").unwrap();
        let plain = resolve("user123").unwrap();

        assert!(stripped.as_str().contains("user123"));
        assert!(plain.as_str().contains("user123"));
        assert_eq!(stripped, plain);
        assert_eq!(resolve("user@#$123").unwrap(), stripped);
    }

    #[test]
    fn test_no_collisions_for_random_ids() {
        let partitions: HashSet<Partition> = (0..1000)
            .map(|_| resolve(&uuid::Uuid::new_v4().to_string()).unwrap())
            .collect();
        assert_eq!(partitions.len(), 1000);
    }

    #[test]
    fn test_filter_owned_drops_foreign_records() {
        let records = vec![
            meta("alice", "a1"),
            meta("bob", "b1"),
            meta("alice", "a2"),
            meta("alice@", "x1"),
        ];

        let owned = filter_owned(records, "alice");
        let keys: Vec<_> = owned.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec!["a1", "a2"]);
    }

    #[test]
    fn test_filter_owned_on_hits() {
        let hits = vec![
            VectorSearchHit {
                metadata: meta("bob", "b1"),
                distance: 0.1,
            },
            VectorSearchHit {
                metadata: meta("alice", "a1"),
                distance: 0.2,
            },
        ];

        let owned = filter_owned(hits, "alice");
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].metadata.key, "a1");
    }
}
