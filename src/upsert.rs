//! Bundle flush: staged bundles to canonical rows.
//!
//! Flush order is fixed: persons, then organisations, then the event,
//! then edges. That order guarantees every row id an edge needs exists
//! before the edge is written, and that no event is written for a
//! bundle that turns out unusable.

use serde::Serialize;

use crate::bundle::{Endpoint, EntityBundle, EventRef, EventStub, OrgStub, PersonStub};
use crate::error::ValidationError;
use crate::model::{
    EdgeDraft, EventDraft, EventId, OrgId, OrganisationDraft, PersonDraft, PersonId,
};
use crate::storage::{EdgeUpsert, EventUpsert, GraphStore, StorageError};
use crate::tenant::TenantCode;

/// Write counters for one or more flushed bundles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BundleStats {
    /// New `Person` rows.
    pub persons_created: usize,
    /// `Person` rows updated in place.
    pub persons_updated: usize,
    /// New `Organisation` rows.
    pub orgs_created: usize,
    /// `Organisation` rows updated in place.
    pub orgs_updated: usize,
    /// New `Event` rows.
    pub events_created: usize,
    /// Events that already existed.
    pub events_existing: usize,
    /// New `Edge` rows.
    pub edges_created: usize,
    /// Edges suppressed as duplicates.
    pub edges_skipped_duplicate: usize,
}

impl BundleStats {
    /// Folds another set of counters into this one.
    pub fn merge(&mut self, other: &Self) {
        self.persons_created += other.persons_created;
        self.persons_updated += other.persons_updated;
        self.orgs_created += other.orgs_created;
        self.orgs_updated += other.orgs_updated;
        self.events_created += other.events_created;
        self.events_existing += other.events_existing;
        self.edges_created += other.edges_created;
        self.edges_skipped_duplicate += other.edges_skipped_duplicate;
    }
}

/// Outcome of flushing one bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The bundle was written; counters describe what changed.
    Persisted(BundleStats),
    /// The bundle attached to an event that does not exist; nothing
    /// was written for the event or its edges.
    MissingEvent {
        /// External id the bundle expected to find.
        external_id: String,
    },
    /// An entity upsert hit an ambiguous natural key; the event and
    /// edges were not written.
    AmbiguousIdentity {
        /// The ambiguous normalized name.
        key: String,
    },
}

fn person_draft(tenant: &TenantCode, stub: &PersonStub) -> PersonDraft {
    PersonDraft {
        tenant_code: tenant.clone(),
        tax_id: stub.tax_id.clone(),
        normalized_name: stub.normalized_name.clone(),
        given_names: stub.given_names.clone(),
        family_names: stub.family_names.clone(),
        full_name: stub.full_name.clone(),
        title: stub.title.clone(),
        source: stub.source.clone(),
    }
}

fn org_draft(tenant: &TenantCode, stub: &OrgStub) -> OrganisationDraft {
    OrganisationDraft {
        tenant_code: tenant.clone(),
        tax_id: stub.tax_id.clone(),
        normalized_name: stub.normalized_name.clone(),
        name: stub.name.clone(),
        org_type: stub.org_type.clone(),
        source: stub.source.clone(),
    }
}

fn event_draft(tenant: &TenantCode, stub: &EventStub) -> EventDraft {
    EventDraft {
        tenant_code: tenant.clone(),
        external_id: stub.external_id.clone(),
        kind: stub.kind.clone(),
        date: stub.date,
        metadata: stub.metadata.clone(),
    }
}

struct EndpointIds {
    person: Option<PersonId>,
    org: Option<OrgId>,
}

fn remap(
    endpoint: &Endpoint,
    persons: &[PersonId],
    orgs: &[OrgId],
) -> Result<EndpointIds, StorageError> {
    match endpoint {
        Endpoint::LocalPerson(handle) => persons
            .get(handle.index())
            .map(|&id| EndpointIds {
                person: Some(id),
                org: None,
            })
            .ok_or_else(|| {
                ValidationError::UnknownHandle {
                    handle: format!("person #{}", handle.index()),
                }
                .into()
            }),
        Endpoint::LocalOrg(handle) => orgs
            .get(handle.index())
            .map(|&id| EndpointIds {
                person: None,
                org: Some(id),
            })
            .ok_or_else(|| {
                ValidationError::UnknownHandle {
                    handle: format!("org #{}", handle.index()),
                }
                .into()
            }),
        Endpoint::Person(id) => Ok(EndpointIds {
            person: Some(*id),
            org: None,
        }),
        Endpoint::Org(id) => Ok(EndpointIds {
            person: None,
            org: Some(*id),
        }),
    }
}

/// Flushes one bundle into a store.
///
/// Ambiguous identities and missing target events are deliberate
/// non-write outcomes, not errors; anything else the store reports is
/// propagated.
///
/// # Errors
///
/// Returns a [`StorageError`] when a store operation fails.
pub fn persist_bundle(
    store: &dyn GraphStore,
    bundle: &EntityBundle,
) -> Result<FlushOutcome, StorageError> {
    let tenant = bundle.tenant();
    let mut stats = BundleStats::default();

    let mut person_ids: Vec<PersonId> = Vec::with_capacity(bundle.persons().len());
    for stub in bundle.persons() {
        match store.upsert_person(&person_draft(tenant, stub)) {
            Ok(outcome) => {
                if outcome.is_created() {
                    stats.persons_created += 1;
                } else {
                    stats.persons_updated += 1;
                }
                person_ids.push(outcome.id());
            }
            Err(StorageError::AmbiguousNaturalKey(key)) => {
                return Ok(FlushOutcome::AmbiguousIdentity { key });
            }
            Err(err) => return Err(err),
        }
    }

    let mut org_ids: Vec<OrgId> = Vec::with_capacity(bundle.orgs().len());
    for stub in bundle.orgs() {
        match store.upsert_organisation(&org_draft(tenant, stub)) {
            Ok(outcome) => {
                if outcome.is_created() {
                    stats.orgs_created += 1;
                } else {
                    stats.orgs_updated += 1;
                }
                org_ids.push(outcome.id());
            }
            Err(StorageError::AmbiguousNaturalKey(key)) => {
                return Ok(FlushOutcome::AmbiguousIdentity { key });
            }
            Err(err) => return Err(err),
        }
    }

    let event_id: EventId = match bundle.event() {
        EventRef::New(stub) => match store.upsert_event(&event_draft(tenant, stub))? {
            EventUpsert::Created(id) => {
                stats.events_created += 1;
                id
            }
            EventUpsert::Existing(id) => {
                stats.events_existing += 1;
                id
            }
        },
        EventRef::Existing { external_id, kind } => {
            match store.find_event(tenant, external_id, kind)? {
                Some(id) => id,
                None => {
                    return Ok(FlushOutcome::MissingEvent {
                        external_id: external_id.clone(),
                    })
                }
            }
        }
    };

    for edge in bundle.edges() {
        let from = edge
            .from
            .as_ref()
            .map(|endpoint| remap(endpoint, &person_ids, &org_ids))
            .transpose()?;
        let to = remap(&edge.to, &person_ids, &org_ids)?;

        let draft = EdgeDraft {
            tenant_code: tenant.clone(),
            event_id,
            from_person_id: from.as_ref().and_then(|f| f.person),
            from_org_id: from.as_ref().and_then(|f| f.org),
            to_person_id: to.person,
            to_org_id: to.org,
            label: edge.label.clone(),
            metadata: edge.metadata.clone(),
        };

        match store.upsert_edge(&draft)? {
            EdgeUpsert::Created => stats.edges_created += 1,
            EdgeUpsert::Duplicate => stats.edges_skipped_duplicate += 1,
        }
    }

    Ok(FlushOutcome::Persisted(stats))
}

/// Flushes one bundle inside a store transaction.
///
/// Used by the per-bundle commit policy: either the record's whole
/// graph contribution lands, or none of it does.
///
/// # Errors
///
/// Returns a [`StorageError`] when a store operation fails; the
/// transaction is rolled back first.
pub fn persist_bundle_atomic(
    store: &dyn GraphStore,
    bundle: &EntityBundle,
) -> Result<FlushOutcome, StorageError> {
    let mut outcome: Option<FlushOutcome> = None;
    store.in_transaction(&mut |tx| {
        outcome = Some(persist_bundle(tx, bundle)?);
        Ok(())
    })?;
    outcome.ok_or_else(|| {
        StorageError::BackendError("transaction closure did not run".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{EventStub, PersonStub};
    use crate::model::{EdgeLabel, EventKind};
    use crate::storage::InMemoryGraphStore;

    fn tenant() -> TenantCode {
        TenantCode::new("CL").unwrap()
    }

    fn person_stub(name: &str) -> PersonStub {
        PersonStub {
            tax_id: None,
            normalized_name: name.to_lowercase(),
            given_names: None,
            family_names: None,
            full_name: name.to_string(),
            title: None,
            source: None,
        }
    }

    fn org_stub(name: &str) -> OrgStub {
        OrgStub {
            tax_id: None,
            normalized_name: name.to_lowercase(),
            name: name.to_string(),
            org_type: None,
            source: None,
        }
    }

    fn meeting_bundle(external_id: &str) -> EntityBundle {
        let mut bundle = EntityBundle::new(
            tenant(),
            EventRef::New(EventStub {
                external_id: external_id.to_string(),
                kind: EventKind::Meeting,
                date: None,
                metadata: serde_json::json!({}),
            }),
        );
        let person = bundle.add_person(person_stub("Juan Perez"));
        let org = bundle.add_org(org_stub("Ministerio de Hacienda"));
        bundle.add_edge(
            Some(Endpoint::LocalPerson(person)),
            Endpoint::LocalOrg(org),
            EdgeLabel::Meets,
            serde_json::json!({}),
        );
        bundle
    }

    #[test]
    fn test_flush_writes_in_order_and_counts() {
        let store = InMemoryGraphStore::new();
        let outcome = persist_bundle(&store, &meeting_bundle("AU-1")).unwrap();

        let FlushOutcome::Persisted(stats) = outcome else {
            panic!("expected persisted outcome");
        };
        assert_eq!(stats.persons_created, 1);
        assert_eq!(stats.orgs_created, 1);
        assert_eq!(stats.events_created, 1);
        assert_eq!(stats.edges_created, 1);

        let counts = store.counts(&tenant()).unwrap();
        assert_eq!(counts.persons, 1);
        assert_eq!(counts.organisations, 1);
        assert_eq!(counts.events, 1);
        assert_eq!(counts.edges, 1);
    }

    #[test]
    fn test_flush_is_idempotent() {
        let store = InMemoryGraphStore::new();
        persist_bundle(&store, &meeting_bundle("AU-1")).unwrap();
        let outcome = persist_bundle(&store, &meeting_bundle("AU-1")).unwrap();

        let FlushOutcome::Persisted(stats) = outcome else {
            panic!("expected persisted outcome");
        };
        assert_eq!(stats.persons_created, 0);
        assert_eq!(stats.persons_updated, 1);
        assert_eq!(stats.events_existing, 1);
        assert_eq!(stats.edges_skipped_duplicate, 1);
        assert_eq!(stats.edges_created, 0);

        let counts = store.counts(&tenant()).unwrap();
        assert_eq!(counts.persons, 1);
        assert_eq!(counts.edges, 1);
    }

    #[test]
    fn test_flush_missing_event_skips_bundle() {
        let store = InMemoryGraphStore::new();
        let mut bundle = EntityBundle::new(
            tenant(),
            EventRef::Existing {
                external_id: "AU-404".to_string(),
                kind: EventKind::Meeting,
            },
        );
        let person = bundle.add_person(person_stub("Juan Perez"));
        let _ = person;

        let outcome = persist_bundle(&store, &bundle).unwrap();
        assert_eq!(
            outcome,
            FlushOutcome::MissingEvent {
                external_id: "AU-404".to_string()
            }
        );
        assert_eq!(store.counts(&tenant()).unwrap().edges, 0);
    }

    #[test]
    fn test_flush_existing_event_attaches_edges() {
        let store = InMemoryGraphStore::new();
        // First sync creates the event.
        persist_bundle(&store, &meeting_bundle("AU-1")).unwrap();
        let index = store.person_index(&tenant()).unwrap();
        let person = index.resolve(None, "juan perez").id().unwrap();

        let mut bundle = EntityBundle::new(
            tenant(),
            EventRef::Existing {
                external_id: "AU-1".to_string(),
                kind: EventKind::Meeting,
            },
        );
        bundle.add_edge(
            None,
            Endpoint::Person(person),
            EdgeLabel::Role("OFFICIAL".to_string()),
            serde_json::json!({}),
        );

        let outcome = persist_bundle(&store, &bundle).unwrap();
        let FlushOutcome::Persisted(stats) = outcome else {
            panic!("expected persisted outcome");
        };
        assert_eq!(stats.edges_created, 1);
        assert_eq!(stats.events_created, 0);
        assert_eq!(store.counts(&tenant()).unwrap().edges, 2);
    }

    #[test]
    fn test_flush_ambiguous_identity_writes_no_event() {
        let store = InMemoryGraphStore::new();
        // Two people with the same name and different tax-ids.
        let normalizer = crate::identity::IdentityNormalizer::default();
        for raw in ["11111111-1", "12345678-5"] {
            let mut stub = person_stub("Juan Perez");
            stub.tax_id = normalizer.valid_tax_id(raw);
            let mut bundle = EntityBundle::new(
                tenant(),
                EventRef::New(EventStub {
                    external_id: format!("SEED-{raw}"),
                    kind: EventKind::Meeting,
                    date: None,
                    metadata: serde_json::json!({}),
                }),
            );
            bundle.add_person(stub);
            persist_bundle(&store, &bundle).unwrap();
        }

        let events_before = store.counts(&tenant()).unwrap().events;
        let outcome = persist_bundle(&store, &meeting_bundle("AU-9")).unwrap();
        assert!(matches!(outcome, FlushOutcome::AmbiguousIdentity { .. }));
        assert_eq!(store.counts(&tenant()).unwrap().events, events_before);
    }

    #[test]
    fn test_atomic_flush_matches_plain_flush() {
        let store = InMemoryGraphStore::new();
        let outcome = persist_bundle_atomic(&store, &meeting_bundle("AU-1")).unwrap();
        assert!(matches!(outcome, FlushOutcome::Persisted(_)));
        assert_eq!(store.counts(&tenant()).unwrap().events, 1);
    }
}
