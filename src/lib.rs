//! # Lobbygraph - Identity Resolution & Canonical Graph Persistence
//!
//! Lobbygraph is the core of a lobbying-transparency ingestion system.
//! Upstream collaborators fetch and parse source data (registries,
//! SPARQL endpoints, CSV dumps) and hand this crate flat normalized
//! records; the crate resolves the people and organisations those
//! records mention against a canonical graph and persists events and
//! typed edges idempotently.
//!
//! ## Core Concepts
//!
//! - **Identity normalization**: names and tax-ids reduced to canonical
//!   matching forms; matching is exact, never fuzzy
//! - **Resolution**: valid tax-id first, unique normalized name second,
//!   everything else is a deliberate non-match
//! - **EntityBundle**: the staged graph contribution of one record
//! - **Upsert**: natural-key writes that fill missing fields and never
//!   overwrite, so re-running a batch changes nothing
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lobbygraph::{
//!     run_batch, CommitPolicy, GraphMapper, InMemoryGraphStore,
//!     NormalizedRecord, RecordKind, Reference, Role, TenantCode,
//! };
//!
//! let tenant = TenantCode::new("CL")?;
//! let store = InMemoryGraphStore::new();
//! let mapper = GraphMapper::new(tenant.clone());
//!
//! let record = NormalizedRecord::new(RecordKind::Meeting, "AU-1001")
//!     .with_reference(Reference::new(Role::Official, "JUAN PÉREZ").with_tax_id("12.345.678-5"))
//!     .with_reference(Reference::new(Role::Institution, "Ministerio de Hacienda"));
//!
//! let report = run_batch(&store, &mapper, &tenant, &[record], CommitPolicy::PerBundle);
//! assert_eq!(report.persist.events_created, 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod bundle;
pub mod error;
pub mod identity;
pub mod mapper;
pub mod model;
pub mod record;
pub mod report;
pub mod resolve;
pub mod storage;
pub mod sync;
pub mod tenant;
pub mod upsert;

// Re-export primary types at crate root for convenience
pub use batch::{MergeCounts, MergeEngine, MergeOutcome, MergedReference};
pub use bundle::{
    Endpoint, EntityBundle, EventRef, EventStub, OrgHandle, OrgStub, PersonHandle, PersonStub,
};
pub use error::{GraphError, GraphResult, ValidationError};
pub use identity::{
    normalize_name, CheckDigitValidator, IdentityNormalizer, Modulo11, NormalizedTaxId, TaxId,
};
pub use mapper::{GraphMapper, MapResult, OrgType, RecordMapper, SkipReason, UnmatchedReference};
pub use model::{
    EdgeDraft, EdgeId, EdgeLabel, EdgeRow, EventDraft, EventId, EventKind, EventRow, OrgId,
    OrganisationDraft, OrganisationRow, PersonDraft, PersonId, PersonRow,
};
pub use record::{
    stable_checksum, DonorClass, NormalizedRecord, RecordKind, Reference, Role, TargetClass,
};
pub use report::{BatchReport, SyncStatus};
pub use resolve::{LookupIndex, Match, MatchMethod, ResolvedEntity, Resolver};
pub use storage::{
    EdgeUpsert, EventUpsert, GraphStore, InMemoryGraphStore, StorageError, StoreCounts, Upserted,
};
pub use sync::{run_batch, CommitPolicy};
pub use tenant::TenantCode;
pub use upsert::{persist_bundle, persist_bundle_atomic, BundleStats, FlushOutcome};

#[cfg(feature = "sqlite")]
pub use storage::SqliteGraphStore;
