//! Permission Resolver (C4).
//!
//! Turns a set of observed ACL entries (email + role, or an open/"anyone"
//! marker) into `permissions` edges, resolving each principal against
//! `users`, then `groups`, then falling back to a deterministically keyed
//! `people` row.

mod error;

pub use error::PermissionError;

use sha2::{Digest, Sha256};

use crate::model::{Key, Person, PermissionEdge, Role};
use crate::store::{GraphStore, Transaction};

/// One observed ACL entry on a record, prior to principal resolution.
#[derive(Debug, Clone)]
pub struct ObservedGrant {
    pub email: String,
    pub role: String,
    /// `true` for a provider's "anyone with the link" / domain-public grant.
    pub is_anyone: bool,
}

impl ObservedGrant {
    pub fn reader(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            role: "reader".to_string(),
            is_anyone: false,
        }
    }

    pub fn anyone() -> Self {
        Self {
            email: String::new(),
            role: "reader".to_string(),
            is_anyone: false,
        }
        .with_anyone()
    }

    fn with_anyone(mut self) -> Self {
        self.is_anyone = true;
        self
    }
}

/// Deterministic `people` vertex key for a fallback principal: SHA-256 of
/// the lower-cased email, truncated into a UUID. Two sightings of the same
/// address — in the same batch or a different one entirely — always land
/// on the same vertex, so there's never a race to reconcile two inserts.
pub fn people_key(email: &str) -> Key {
    let mut hasher = Sha256::new();
    hasher.update(email.to_ascii_lowercase().as_bytes());
    let digest = hasher.finalize();
    uuid::Uuid::from_slice(&digest[..16]).expect("sha256 digest has at least 16 bytes")
}

/// Resolve principals for every grant on `record_key` and stage the
/// resulting `permissions` edges (and any newly seen `people` rows) into
/// `txn`. Scoped to a single thread/file-batch's worth of grants; the
/// caller commits each batch's transaction rather than accumulating
/// unresolved grants across a whole user sweep.
pub async fn resolve_and_stage(
    store: &dyn GraphStore,
    txn: &mut Transaction,
    record_key: Key,
    grants: &[ObservedGrant],
) -> Result<(), PermissionError> {
    let mut new_people = Vec::new();
    let mut edges = Vec::with_capacity(grants.len());

    for grant in grants {
        let role = Role::from_str_lossy(&grant.role);

        let principal_key = if grant.is_anyone {
            store.anyone_key().await?
        } else {
            match store.entity_id_by_email(&grant.email).await? {
                Some((_, key)) => key,
                None => {
                    let key = people_key(&grant.email);
                    new_people.push(Person {
                        key,
                        email: grant.email.clone(),
                    });
                    key
                }
            }
        };

        edges.push(PermissionEdge {
            principal: principal_key,
            record: record_key,
            role,
        });
    }

    if !new_people.is_empty() {
        store.upsert_people(new_people, txn).await?;
    }
    store.create_permissions(edges, txn).await?;
    Ok(())
}
