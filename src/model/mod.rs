//! The normalized graph data model: vertex and edge payloads
//! shared by the transformer, the store adapter, and the event emitter.

pub mod edge;
pub mod envelope;
pub mod vertex;

pub use edge::{BelongsToEdge, EdgeKind, PermissionEdge, RecordRelation, RelationType, Role, UserDriveEdge};
pub use envelope::{EventEnvelope, EventType};
pub use vertex::{
    Attachment, Channel, Drive, FileEntity, Group, IndexingStatus, Mail, Organization, Person,
    Record, RecordType, ServiceType, SyncStateRow, SyncStatus, User,
};

/// Opaque internally generated identifier for any vertex.
///
/// Provider identifiers are never used as keys directly; they
/// are stored as `externalId` and reconciled through the store adapter.
pub type Key = uuid::Uuid;

/// Name of the well-known `anyone` principal vertex.
pub const ANYONE_KEY: &str = "anyone";
