//! Entity bundles: the staging output of record mapping.
//!
//! A bundle holds everything one record contributes to the graph:
//! person and organisation stubs not yet in the store, one event
//! reference, and the edges tying them together. Stubs are addressed
//! by typed arena handles; the upsert engine remaps handles to row ids
//! at flush time.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::identity::TaxId;
use crate::model::{EdgeLabel, EventKind, OrgId, PersonId};
use crate::tenant::TenantCode;

/// Handle of a person stub inside one bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PersonHandle(u32);

impl PersonHandle {
    /// Position of the stub in the bundle's person list.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle of an organisation stub inside one bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrgHandle(u32);

impl OrgHandle {
    /// Position of the stub in the bundle's organisation list.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A person the record mentions, to be upserted at flush time.
#[derive(Debug, Clone)]
pub struct PersonStub {
    /// Valid canonical tax-id, if the record carried one.
    pub tax_id: Option<TaxId>,
    /// Canonical matching form of the name.
    pub normalized_name: String,
    /// Given names as reported.
    pub given_names: Option<String>,
    /// Family names as reported.
    pub family_names: Option<String>,
    /// Display name.
    pub full_name: String,
    /// Job title or position.
    pub title: Option<String>,
    /// Source system tag.
    pub source: Option<String>,
}

/// An organisation the record mentions, to be upserted at flush time.
#[derive(Debug, Clone)]
pub struct OrgStub {
    /// Valid canonical tax-id, if the record carried one.
    pub tax_id: Option<TaxId>,
    /// Canonical matching form of the name.
    pub normalized_name: String,
    /// Display name.
    pub name: String,
    /// Free-text classification.
    pub org_type: Option<String>,
    /// Source system tag.
    pub source: Option<String>,
}

/// A new event carried by the bundle.
#[derive(Debug, Clone)]
pub struct EventStub {
    /// Source-assigned stable identifier.
    pub external_id: String,
    /// Kind tag.
    pub kind: EventKind,
    /// When the event took place, if known.
    pub date: Option<DateTime<Utc>>,
    /// Source-specific JSON payload.
    pub metadata: Value,
}

/// The event a bundle's edges attach to.
#[derive(Debug, Clone)]
pub enum EventRef {
    /// The bundle creates (or re-sights) this event.
    New(EventStub),
    /// The edges attach to an event some earlier sync created. If no
    /// such event exists at flush time, the whole bundle is skipped.
    Existing {
        /// Source-assigned stable identifier.
        external_id: String,
        /// Kind tag of the expected event.
        kind: EventKind,
    },
}

/// One endpoint of an edge stub.
///
/// Local variants point at stubs in the same bundle; the others point
/// at rows the resolver already matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// A person stub in this bundle.
    LocalPerson(PersonHandle),
    /// An organisation stub in this bundle.
    LocalOrg(OrgHandle),
    /// An already-canonical person.
    Person(PersonId),
    /// An already-canonical organisation.
    Org(OrgId),
}

/// An edge to be written at flush time.
///
/// `from` is optional: `None` means the edge originates at the event
/// itself. `to` is always present, so the XOR rule on endpoint columns
/// holds by construction.
#[derive(Debug, Clone)]
pub struct EdgeStub {
    /// Origin endpoint, or `None` for event-origin edges.
    pub from: Option<Endpoint>,
    /// Target endpoint.
    pub to: Endpoint,
    /// Typed label.
    pub label: EdgeLabel,
    /// Source-specific JSON payload.
    pub metadata: Value,
}

/// Everything one record contributes to the canonical graph.
#[derive(Debug, Clone)]
pub struct EntityBundle {
    tenant: TenantCode,
    event: EventRef,
    persons: Vec<PersonStub>,
    orgs: Vec<OrgStub>,
    edges: Vec<EdgeStub>,
}

impl EntityBundle {
    /// Creates an empty bundle around an event reference.
    #[must_use]
    pub fn new(tenant: TenantCode, event: EventRef) -> Self {
        Self {
            tenant,
            event,
            persons: Vec::new(),
            orgs: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Adds a person stub and returns its handle.
    pub fn add_person(&mut self, stub: PersonStub) -> PersonHandle {
        let handle = PersonHandle(u32::try_from(self.persons.len()).unwrap_or(u32::MAX));
        self.persons.push(stub);
        handle
    }

    /// Adds an organisation stub and returns its handle.
    pub fn add_org(&mut self, stub: OrgStub) -> OrgHandle {
        let handle = OrgHandle(u32::try_from(self.orgs.len()).unwrap_or(u32::MAX));
        self.orgs.push(stub);
        handle
    }

    /// Adds an edge between endpoints.
    pub fn add_edge(
        &mut self,
        from: Option<Endpoint>,
        to: Endpoint,
        label: EdgeLabel,
        metadata: Value,
    ) {
        self.edges.push(EdgeStub {
            from,
            to,
            label,
            metadata,
        });
    }

    /// Tenant the bundle writes into.
    #[must_use]
    pub fn tenant(&self) -> &TenantCode {
        &self.tenant
    }

    /// The event reference.
    #[must_use]
    pub fn event(&self) -> &EventRef {
        &self.event
    }

    /// Person stubs, in handle order.
    #[must_use]
    pub fn persons(&self) -> &[PersonStub] {
        &self.persons
    }

    /// Organisation stubs, in handle order.
    #[must_use]
    pub fn orgs(&self) -> &[OrgStub] {
        &self.orgs
    }

    /// Edge stubs.
    #[must_use]
    pub fn edges(&self) -> &[EdgeStub] {
        &self.edges
    }
}
