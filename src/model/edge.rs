//! Edge collections of the graph data model.

use serde::{Deserialize, Serialize};

use super::Key;

/// `recordRelations` relation discriminator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    ParentChild,
    Sibling,
    Attachment,
}

/// `recordRelations` — an edge between two `records` vertices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordRelation {
    pub from: Key,
    pub to: Key,
    pub relation_type: RelationType,
}

/// Access roles a `permissions` edge can carry. Lower-cased on the wire
/// `Reader` is the default for mail-derived permissions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reader,
    Writer,
    Owner,
    Commenter,
}

impl Role {
    pub fn from_str_lossy(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "writer" => Role::Writer,
            "owner" => Role::Owner,
            "commenter" => Role::Commenter,
            _ => Role::Reader,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Reader => "reader",
            Role::Writer => "writer",
            Role::Owner => "owner",
            Role::Commenter => "commenter",
        };
        write!(f, "{s}")
    }
}

/// `permissions` — principal (user/group/people/anyone) -> record,
/// `relationType = HAS_ACCESS`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionEdge {
    pub principal: Key,
    pub record: Key,
    pub role: Role,
}

/// Discriminates the two `belongsTo` edge kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    Group,
    Organization,
}

/// `belongsTo` — user -> group (with role) or user -> organization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BelongsToEdge {
    pub user: Key,
    pub target: Key,
    pub entity_type: EdgeKind,
    pub role: Option<String>,
}

/// `userDriveRelation` — user -> drive, carrying the provider access level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserDriveEdge {
    pub user: Key,
    pub drive: Key,
    pub access_level: String,
}
