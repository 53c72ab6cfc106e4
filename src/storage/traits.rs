//! Abstract storage trait for the canonical graph.
//!
//! The trait defines the contract that graph backends implement. By
//! using a trait we enable:
//! - An in-memory backend for tests and embedded use
//! - A SQLite backend for durable single-process deployments
//!
//! Upserts take drafts and report whether they created or reused a
//! row; all reads and writes are tenant-scoped through the draft or an
//! explicit tenant argument.

use thiserror::Error;

use crate::error::ValidationError;
use crate::model::{
    EdgeDraft, EventDraft, EventId, EventKind, EventRow, OrgId, OrganisationDraft,
    OrganisationRow, PersonDraft, PersonId, PersonRow,
};
use crate::resolve::LookupIndex;
use crate::tenant::TenantCode;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Person not found.
    #[error("Person not found: {0}")]
    PersonNotFound(PersonId),

    /// Organisation not found.
    #[error("Organisation not found: {0}")]
    OrganisationNotFound(OrgId),

    /// Event not found.
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// A name-keyed upsert hit several rows and refused to pick one.
    #[error("Ambiguous natural key: {0}")]
    AmbiguousNaturalKey(String),

    /// A draft failed validation at the storage boundary.
    #[error("Invalid draft: {0}")]
    InvalidDraft(#[from] ValidationError),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Connection failed.
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

impl StorageError {
    /// Returns true if the whole batch should abort rather than
    /// continue with the next record.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ConnectionError(_))
    }
}

/// Outcome of an entity upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted<Id> {
    /// A new row was inserted.
    Created(Id),
    /// An existing row was updated in place.
    Updated(Id),
}

impl<Id: Copy> Upserted<Id> {
    /// The affected row id.
    #[must_use]
    pub const fn id(&self) -> Id {
        match self {
            Self::Created(id) | Self::Updated(id) => *id,
        }
    }

    /// Returns true if a new row was inserted.
    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Outcome of an event upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventUpsert {
    /// A new event row was inserted.
    Created(EventId),
    /// The natural key already existed; mutable fields were updated.
    Existing(EventId),
}

impl EventUpsert {
    /// The affected row id.
    #[must_use]
    pub const fn id(&self) -> EventId {
        match self {
            Self::Created(id) | Self::Existing(id) => *id,
        }
    }
}

/// Outcome of an edge upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeUpsert {
    /// A new edge row was inserted.
    Created,
    /// The natural key already existed; nothing was written.
    Duplicate,
}

/// Row counts for one tenant, used by reports and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    /// `Person` rows.
    pub persons: usize,
    /// `Organisation` rows.
    pub organisations: usize,
    /// `Event` rows.
    pub events: usize,
    /// `Edge` rows.
    pub edges: usize,
}

/// Storage contract for the canonical graph.
///
/// # Upsert semantics
///
/// Entity upserts look up by valid tax-id first, then by normalized
/// name, and fill missing fields without overwriting stored values.
/// Event upserts key on `(tenant, externalId, kind)` and update
/// mutable fields on re-sighting. Edge upserts are insert-or-ignore on
/// the full endpoint natural key.
pub trait GraphStore: Send + Sync {
    /// Upserts a person by natural key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AmbiguousNaturalKey`] when the draft has
    /// no tax-id and its name matches several stored rows.
    fn upsert_person(&self, draft: &PersonDraft) -> Result<Upserted<PersonId>, StorageError>;

    /// Upserts an organisation by natural key.
    ///
    /// # Errors
    ///
    /// Same contract as [`GraphStore::upsert_person`].
    fn upsert_organisation(
        &self,
        draft: &OrganisationDraft,
    ) -> Result<Upserted<OrgId>, StorageError>;

    /// Upserts an event by `(tenant, externalId, kind)`.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the backend fails.
    fn upsert_event(&self, draft: &EventDraft) -> Result<EventUpsert, StorageError>;

    /// Inserts an edge unless its natural key already exists.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidDraft`] when the endpoint XOR
    /// rule is violated.
    fn upsert_edge(&self, draft: &EdgeDraft) -> Result<EdgeUpsert, StorageError>;

    /// Builds the tax-id and name lookup index over a tenant's
    /// `Person` rows.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the backend fails.
    fn person_index(&self, tenant: &TenantCode) -> Result<LookupIndex<PersonId>, StorageError>;

    /// Builds the lookup index over a tenant's `Organisation` rows.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the backend fails.
    fn organisation_index(&self, tenant: &TenantCode)
        -> Result<LookupIndex<OrgId>, StorageError>;

    /// Finds an event by natural key.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the backend fails.
    fn find_event(
        &self,
        tenant: &TenantCode,
        external_id: &str,
        kind: &EventKind,
    ) -> Result<Option<EventId>, StorageError>;

    /// Fetches a person row.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the backend fails.
    fn get_person(&self, id: PersonId) -> Result<Option<PersonRow>, StorageError>;

    /// Fetches an organisation row.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the backend fails.
    fn get_organisation(&self, id: OrgId) -> Result<Option<OrganisationRow>, StorageError>;

    /// Fetches an event row.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the backend fails.
    fn get_event(&self, id: EventId) -> Result<Option<EventRow>, StorageError>;

    /// Lists the edges attached to an event.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the backend fails.
    fn edges_for_event(
        &self,
        id: EventId,
    ) -> Result<Vec<crate::model::EdgeRow>, StorageError>;

    /// Row counts for one tenant.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the backend fails.
    fn counts(&self, tenant: &TenantCode) -> Result<StoreCounts, StorageError>;

    /// Runs `f` inside a transaction: all writes commit together or
    /// roll back together.
    ///
    /// Backends without real transactions may emulate this with a
    /// snapshot-and-restore; the visible contract is the same for
    /// single-threaded batch use.
    ///
    /// # Errors
    ///
    /// Propagates the closure's error after rolling back.
    fn in_transaction(
        &self,
        f: &mut dyn FnMut(&dyn GraphStore) -> Result<(), StorageError>,
    ) -> Result<(), StorageError>;
}
