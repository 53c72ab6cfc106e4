//! In-memory storage backend.
//!
//! Thread-safe reference implementation of [`GraphStore`], intended
//! for embedded use and tests. Secondary indexes mirror the unique
//! constraints of the deployed schema: tax-id unique per tenant, the
//! name index deliberately non-unique, events unique per
//! `(tenant, externalId, kind)`, edges unique per endpoint key.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use crate::error::ValidationError;
use crate::identity::TaxId;
use crate::model::{
    EdgeDraft, EdgeId, EdgeKey, EdgeRow, EventDraft, EventId, EventKind, EventRow, OrgId,
    OrganisationDraft, OrganisationRow, PersonDraft, PersonId, PersonRow,
};
use crate::resolve::LookupIndex;
use crate::storage::traits::{
    EdgeUpsert, EventUpsert, GraphStore, StorageError, StoreCounts, Upserted,
};
use crate::tenant::TenantCode;

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

fn fill_missing(slot: &mut Option<String>, incoming: Option<&str>) {
    if slot.is_none() {
        if let Some(value) = incoming.filter(|v| !v.trim().is_empty()) {
            *slot = Some(value.to_string());
        }
    }
}

type TenantKey = (String, String);
type EventNaturalKey = (String, String, String);

#[derive(Debug, Default, Clone)]
struct GraphState {
    persons: HashMap<PersonId, PersonRow>,
    persons_by_tax: HashMap<TenantKey, PersonId>,
    persons_by_name: HashMap<TenantKey, Vec<PersonId>>,
    orgs: HashMap<OrgId, OrganisationRow>,
    orgs_by_tax: HashMap<TenantKey, OrgId>,
    orgs_by_name: HashMap<TenantKey, Vec<OrgId>>,
    events: HashMap<EventId, EventRow>,
    events_by_key: HashMap<EventNaturalKey, EventId>,
    edges: HashMap<EdgeId, EdgeRow>,
    edges_by_key: HashMap<EdgeKey, EdgeId>,
}

fn tenant_key(tenant: &TenantCode, value: &str) -> TenantKey {
    (tenant.as_str().to_string(), value.to_string())
}

/// In-memory [`GraphStore`] implementation.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    state: RwLock<GraphState>,
}

impl InMemoryGraphStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl GraphStore for InMemoryGraphStore {
    fn upsert_person(&self, draft: &PersonDraft) -> Result<Upserted<PersonId>, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("upsert_person"))?;
        let now = Utc::now();

        // 1. Valid tax-id wins.
        if let Some(tax) = &draft.tax_id {
            let key = tenant_key(&draft.tenant_code, tax.as_str());
            if let Some(&id) = state.persons_by_tax.get(&key) {
                if let Some(row) = state.persons.get_mut(&id) {
                    fill_missing(&mut row.given_names, draft.given_names.as_deref());
                    fill_missing(&mut row.family_names, draft.family_names.as_deref());
                    fill_missing(&mut row.title, draft.title.as_deref());
                    fill_missing(&mut row.source, draft.source.as_deref());
                    if row.full_name.is_empty() && !draft.full_name.is_empty() {
                        row.full_name = draft.full_name.clone();
                    }
                    row.updated_at = now;
                }
                return Ok(Upserted::Updated(id));
            }
        }

        // 2. Normalized name.
        if !draft.normalized_name.is_empty() {
            let key = tenant_key(&draft.tenant_code, &draft.normalized_name);
            if let Some(candidates) = state.persons_by_name.get(&key).cloned() {
                if let Some(tax) = &draft.tax_id {
                    // Attach the tax-id to the row that lacks one, but
                    // only when that choice is unambiguous. Rows with a
                    // different tax-id are distinct people; a fresh row
                    // is inserted below.
                    let tax_less: Vec<PersonId> = candidates
                        .iter()
                        .copied()
                        .filter(|id| {
                            state
                                .persons
                                .get(id)
                                .is_some_and(|row| row.tax_id.is_none())
                        })
                        .collect();
                    match tax_less.as_slice() {
                        [] => {}
                        [id] => {
                            let id = *id;
                            if let Some(row) = state.persons.get_mut(&id) {
                                row.tax_id = Some(tax.as_str().to_string());
                                fill_missing(&mut row.given_names, draft.given_names.as_deref());
                                fill_missing(&mut row.family_names, draft.family_names.as_deref());
                                fill_missing(&mut row.title, draft.title.as_deref());
                                fill_missing(&mut row.source, draft.source.as_deref());
                                row.updated_at = now;
                            }
                            let tax_key = tenant_key(&draft.tenant_code, tax.as_str());
                            state.persons_by_tax.insert(tax_key, id);
                            return Ok(Upserted::Updated(id));
                        }
                        _ => {
                            return Err(StorageError::AmbiguousNaturalKey(
                                draft.normalized_name.clone(),
                            ))
                        }
                    }
                } else {
                    match candidates.as_slice() {
                        [] => {}
                        [id] => {
                            let id = *id;
                            if let Some(row) = state.persons.get_mut(&id) {
                                fill_missing(&mut row.given_names, draft.given_names.as_deref());
                                fill_missing(&mut row.family_names, draft.family_names.as_deref());
                                fill_missing(&mut row.title, draft.title.as_deref());
                                fill_missing(&mut row.source, draft.source.as_deref());
                                row.updated_at = now;
                            }
                            return Ok(Upserted::Updated(id));
                        }
                        _ => {
                            return Err(StorageError::AmbiguousNaturalKey(
                                draft.normalized_name.clone(),
                            ))
                        }
                    }
                }
            }
        }

        // 3. Insert a new row.
        let id = PersonId::new();
        let row = PersonRow {
            id,
            tenant_code: draft.tenant_code.clone(),
            tax_id: draft.tax_id.as_ref().map(|t| t.as_str().to_string()),
            normalized_name: draft.normalized_name.clone(),
            given_names: draft.given_names.clone(),
            family_names: draft.family_names.clone(),
            full_name: draft.full_name.clone(),
            title: draft.title.clone(),
            source: draft.source.clone(),
            created_at: now,
            updated_at: now,
        };
        if let Some(tax) = &draft.tax_id {
            state
                .persons_by_tax
                .insert(tenant_key(&draft.tenant_code, tax.as_str()), id);
        }
        if !draft.normalized_name.is_empty() {
            state
                .persons_by_name
                .entry(tenant_key(&draft.tenant_code, &draft.normalized_name))
                .or_default()
                .push(id);
        }
        state.persons.insert(id, row);
        Ok(Upserted::Created(id))
    }

    fn upsert_organisation(
        &self,
        draft: &OrganisationDraft,
    ) -> Result<Upserted<OrgId>, StorageError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("upsert_organisation"))?;
        let now = Utc::now();

        if let Some(tax) = &draft.tax_id {
            let key = tenant_key(&draft.tenant_code, tax.as_str());
            if let Some(&id) = state.orgs_by_tax.get(&key) {
                if let Some(row) = state.orgs.get_mut(&id) {
                    fill_missing(&mut row.org_type, draft.org_type.as_deref());
                    fill_missing(&mut row.source, draft.source.as_deref());
                    if row.name.is_empty() && !draft.name.is_empty() {
                        row.name = draft.name.clone();
                    }
                    row.updated_at = now;
                }
                return Ok(Upserted::Updated(id));
            }
        }

        if !draft.normalized_name.is_empty() {
            let key = tenant_key(&draft.tenant_code, &draft.normalized_name);
            if let Some(candidates) = state.orgs_by_name.get(&key).cloned() {
                if let Some(tax) = &draft.tax_id {
                    let tax_less: Vec<OrgId> = candidates
                        .iter()
                        .copied()
                        .filter(|id| {
                            state.orgs.get(id).is_some_and(|row| row.tax_id.is_none())
                        })
                        .collect();
                    match tax_less.as_slice() {
                        [] => {}
                        [id] => {
                            let id = *id;
                            if let Some(row) = state.orgs.get_mut(&id) {
                                row.tax_id = Some(tax.as_str().to_string());
                                fill_missing(&mut row.org_type, draft.org_type.as_deref());
                                fill_missing(&mut row.source, draft.source.as_deref());
                                row.updated_at = now;
                            }
                            let tax_key = tenant_key(&draft.tenant_code, tax.as_str());
                            state.orgs_by_tax.insert(tax_key, id);
                            return Ok(Upserted::Updated(id));
                        }
                        _ => {
                            return Err(StorageError::AmbiguousNaturalKey(
                                draft.normalized_name.clone(),
                            ))
                        }
                    }
                } else {
                    match candidates.as_slice() {
                        [] => {}
                        [id] => {
                            let id = *id;
                            if let Some(row) = state.orgs.get_mut(&id) {
                                fill_missing(&mut row.org_type, draft.org_type.as_deref());
                                fill_missing(&mut row.source, draft.source.as_deref());
                                row.updated_at = now;
                            }
                            return Ok(Upserted::Updated(id));
                        }
                        _ => {
                            return Err(StorageError::AmbiguousNaturalKey(
                                draft.normalized_name.clone(),
                            ))
                        }
                    }
                }
            }
        }

        let id = OrgId::new();
        let row = OrganisationRow {
            id,
            tenant_code: draft.tenant_code.clone(),
            tax_id: draft.tax_id.as_ref().map(|t| t.as_str().to_string()),
            normalized_name: draft.normalized_name.clone(),
            name: draft.name.clone(),
            org_type: draft.org_type.clone(),
            source: draft.source.clone(),
            created_at: now,
            updated_at: now,
        };
        if let Some(tax) = &draft.tax_id {
            state
                .orgs_by_tax
                .insert(tenant_key(&draft.tenant_code, tax.as_str()), id);
        }
        if !draft.normalized_name.is_empty() {
            state
                .orgs_by_name
                .entry(tenant_key(&draft.tenant_code, &draft.normalized_name))
                .or_default()
                .push(id);
        }
        state.orgs.insert(id, row);
        Ok(Upserted::Created(id))
    }

    fn upsert_event(&self, draft: &EventDraft) -> Result<EventUpsert, StorageError> {
        let external_id = draft.external_id.trim();
        if external_id.is_empty() {
            return Err(ValidationError::EmptyExternalId.into());
        }

        let mut state = self.state.write().map_err(|_| lock_err("upsert_event"))?;
        let now = Utc::now();
        let key = (
            draft.tenant_code.as_str().to_string(),
            external_id.to_string(),
            draft.kind.as_str().to_string(),
        );

        if let Some(&id) = state.events_by_key.get(&key) {
            if let Some(row) = state.events.get_mut(&id) {
                // Mutable fields only; identity fields never change.
                if draft.date.is_some() {
                    row.date = draft.date;
                }
                if !draft.metadata.is_null() {
                    row.metadata = draft.metadata.clone();
                }
                row.updated_at = now;
            }
            return Ok(EventUpsert::Existing(id));
        }

        let id = EventId::new();
        let row = EventRow {
            id,
            tenant_code: draft.tenant_code.clone(),
            external_id: external_id.to_string(),
            kind: draft.kind.clone(),
            date: draft.date,
            metadata: draft.metadata.clone(),
            created_at: now,
            updated_at: now,
        };
        state.events_by_key.insert(key, id);
        state.events.insert(id, row);
        Ok(EventUpsert::Created(id))
    }

    fn upsert_edge(&self, draft: &EdgeDraft) -> Result<EdgeUpsert, StorageError> {
        draft.validate()?;

        let mut state = self.state.write().map_err(|_| lock_err("upsert_edge"))?;
        let key = draft.natural_key();
        if state.edges_by_key.contains_key(&key) {
            return Ok(EdgeUpsert::Duplicate);
        }

        let now = Utc::now();
        let id = EdgeId::new();
        let row = EdgeRow {
            id,
            tenant_code: draft.tenant_code.clone(),
            event_id: draft.event_id,
            from_person_id: draft.from_person_id,
            from_org_id: draft.from_org_id,
            to_person_id: draft.to_person_id,
            to_org_id: draft.to_org_id,
            label: draft.label.clone(),
            metadata: draft.metadata.clone(),
            created_at: now,
            updated_at: now,
        };
        state.edges_by_key.insert(key, id);
        state.edges.insert(id, row);
        Ok(EdgeUpsert::Created)
    }

    fn person_index(&self, tenant: &TenantCode) -> Result<LookupIndex<PersonId>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("person_index"))?;
        let mut index = LookupIndex::new();
        for row in state.persons.values() {
            if row.tenant_code != *tenant {
                continue;
            }
            let tax = row.tax_id.as_deref().map(TaxId::from_canonical);
            index.insert(tax.as_ref(), &row.normalized_name, row.id);
        }
        Ok(index)
    }

    fn organisation_index(
        &self,
        tenant: &TenantCode,
    ) -> Result<LookupIndex<OrgId>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("organisation_index"))?;
        let mut index = LookupIndex::new();
        for row in state.orgs.values() {
            if row.tenant_code != *tenant {
                continue;
            }
            let tax = row.tax_id.as_deref().map(TaxId::from_canonical);
            index.insert(tax.as_ref(), &row.normalized_name, row.id);
        }
        Ok(index)
    }

    fn find_event(
        &self,
        tenant: &TenantCode,
        external_id: &str,
        kind: &EventKind,
    ) -> Result<Option<EventId>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("find_event"))?;
        let key = (
            tenant.as_str().to_string(),
            external_id.trim().to_string(),
            kind.as_str().to_string(),
        );
        Ok(state.events_by_key.get(&key).copied())
    }

    fn get_person(&self, id: PersonId) -> Result<Option<PersonRow>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("get_person"))?;
        Ok(state.persons.get(&id).cloned())
    }

    fn get_organisation(&self, id: OrgId) -> Result<Option<OrganisationRow>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("get_organisation"))?;
        Ok(state.orgs.get(&id).cloned())
    }

    fn get_event(&self, id: EventId) -> Result<Option<EventRow>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("get_event"))?;
        Ok(state.events.get(&id).cloned())
    }

    fn edges_for_event(&self, id: EventId) -> Result<Vec<EdgeRow>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("edges_for_event"))?;
        let mut rows: Vec<EdgeRow> = state
            .edges
            .values()
            .filter(|row| row.event_id == id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    fn counts(&self, tenant: &TenantCode) -> Result<StoreCounts, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("counts"))?;
        Ok(StoreCounts {
            persons: state
                .persons
                .values()
                .filter(|r| r.tenant_code == *tenant)
                .count(),
            organisations: state
                .orgs
                .values()
                .filter(|r| r.tenant_code == *tenant)
                .count(),
            events: state
                .events
                .values()
                .filter(|r| r.tenant_code == *tenant)
                .count(),
            edges: state
                .edges
                .values()
                .filter(|r| r.tenant_code == *tenant)
                .count(),
        })
    }

    fn in_transaction(
        &self,
        f: &mut dyn FnMut(&dyn GraphStore) -> Result<(), StorageError>,
    ) -> Result<(), StorageError> {
        // Snapshot-and-restore. Correct for single-threaded batch use;
        // concurrent writers during the closure are not isolated.
        let snapshot = self
            .state
            .read()
            .map_err(|_| lock_err("transaction snapshot"))?
            .clone();
        match f(self) {
            Ok(()) => Ok(()),
            Err(err) => {
                *self
                    .state
                    .write()
                    .map_err(|_| lock_err("transaction restore"))? = snapshot;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityNormalizer;
    use crate::model::EdgeLabel;

    fn tenant() -> TenantCode {
        TenantCode::new("CL").unwrap()
    }

    fn tax(raw: &str) -> TaxId {
        IdentityNormalizer::default().valid_tax_id(raw).unwrap()
    }

    fn person_draft(name: &str, tax_id: Option<TaxId>) -> PersonDraft {
        PersonDraft {
            tenant_code: tenant(),
            tax_id,
            normalized_name: name.to_lowercase(),
            given_names: None,
            family_names: None,
            full_name: name.to_string(),
            title: None,
            source: Some("lobby".to_string()),
        }
    }

    fn org_draft(name: &str, tax_id: Option<TaxId>) -> OrganisationDraft {
        OrganisationDraft {
            tenant_code: tenant(),
            tax_id,
            normalized_name: name.to_lowercase(),
            name: name.to_string(),
            org_type: None,
            source: None,
        }
    }

    fn event_draft(external_id: &str) -> EventDraft {
        EventDraft {
            tenant_code: tenant(),
            external_id: external_id.to_string(),
            kind: EventKind::Meeting,
            date: None,
            metadata: serde_json::json!({"source": "lobby"}),
        }
    }

    #[test]
    fn test_person_upsert_by_tax_id_is_idempotent() {
        let store = InMemoryGraphStore::new();
        let first = store
            .upsert_person(&person_draft("juan perez", Some(tax("12345678-5"))))
            .unwrap();
        assert!(first.is_created());

        let second = store
            .upsert_person(&person_draft("juan perez", Some(tax("12345678-5"))))
            .unwrap();
        assert!(!second.is_created());
        assert_eq!(first.id(), second.id());
        assert_eq!(store.counts(&tenant()).unwrap().persons, 1);
    }

    #[test]
    fn test_person_tax_id_match_ignores_name_change() {
        let store = InMemoryGraphStore::new();
        let first = store
            .upsert_person(&person_draft("juan perez", Some(tax("12345678-5"))))
            .unwrap();

        // Same tax-id, different spelling: same row, name untouched.
        let second = store
            .upsert_person(&person_draft("juan p perez", Some(tax("12345678-5"))))
            .unwrap();
        assert_eq!(first.id(), second.id());
        let row = store.get_person(first.id()).unwrap().unwrap();
        assert_eq!(row.normalized_name, "juan perez");
    }

    #[test]
    fn test_person_fill_missing_never_overwrites() {
        let store = InMemoryGraphStore::new();
        let mut draft = person_draft("juan perez", None);
        draft.title = Some("Ministro".to_string());
        let first = store.upsert_person(&draft).unwrap();

        let mut again = person_draft("juan perez", None);
        again.title = Some("Senador".to_string());
        again.given_names = Some("Juan".to_string());
        store.upsert_person(&again).unwrap();

        let row = store.get_person(first.id()).unwrap().unwrap();
        // Existing title kept, missing given names filled.
        assert_eq!(row.title.as_deref(), Some("Ministro"));
        assert_eq!(row.given_names.as_deref(), Some("Juan"));
    }

    #[test]
    fn test_person_attaches_tax_id_to_tax_less_row() {
        let store = InMemoryGraphStore::new();
        let first = store.upsert_person(&person_draft("juan perez", None)).unwrap();

        let second = store
            .upsert_person(&person_draft("juan perez", Some(tax("12345678-5"))))
            .unwrap();
        assert_eq!(first.id(), second.id());
        let row = store.get_person(first.id()).unwrap().unwrap();
        assert_eq!(row.tax_id.as_deref(), Some("12345678-5"));

        // Subsequent tax-id lookups now hit the same row.
        let third = store
            .upsert_person(&person_draft("otro nombre", Some(tax("12345678-5"))))
            .unwrap();
        assert_eq!(third.id(), first.id());
    }

    #[test]
    fn test_person_same_name_different_tax_ids_stay_distinct() {
        let store = InMemoryGraphStore::new();
        let a = store
            .upsert_person(&person_draft("juan perez", Some(tax("11111111-1"))))
            .unwrap();
        let b = store
            .upsert_person(&person_draft("juan perez", Some(tax("12345678-5"))))
            .unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(store.counts(&tenant()).unwrap().persons, 2);

        // A tax-less sighting of the shared name is ambiguous.
        let ambiguous = store.upsert_person(&person_draft("juan perez", None));
        assert!(matches!(
            ambiguous,
            Err(StorageError::AmbiguousNaturalKey(_))
        ));
    }

    #[test]
    fn test_org_upsert_by_name() {
        let store = InMemoryGraphStore::new();
        let first = store
            .upsert_organisation(&org_draft("ministerio de hacienda", None))
            .unwrap();
        let second = store
            .upsert_organisation(&org_draft("ministerio de hacienda", None))
            .unwrap();
        assert!(first.is_created());
        assert_eq!(first.id(), second.id());
    }

    #[test]
    fn test_event_upsert_updates_mutable_fields() {
        let store = InMemoryGraphStore::new();
        let first = store.upsert_event(&event_draft("AU-1")).unwrap();
        assert!(matches!(first, EventUpsert::Created(_)));

        let mut again = event_draft("AU-1");
        again.date = Some(Utc::now());
        let second = store.upsert_event(&again).unwrap();
        assert!(matches!(second, EventUpsert::Existing(_)));
        assert_eq!(first.id(), second.id());

        let row = store.get_event(first.id()).unwrap().unwrap();
        assert!(row.date.is_some());
    }

    #[test]
    fn test_event_kind_is_part_of_natural_key() {
        let store = InMemoryGraphStore::new();
        let meeting = store.upsert_event(&event_draft("X-1")).unwrap();
        let mut travel = event_draft("X-1");
        travel.kind = EventKind::Travel;
        let second = store.upsert_event(&travel).unwrap();
        assert!(matches!(second, EventUpsert::Created(_)));
        assert_ne!(meeting.id(), second.id());
    }

    #[test]
    fn test_event_rejects_empty_external_id() {
        let store = InMemoryGraphStore::new();
        let mut draft = event_draft("  ");
        draft.external_id = "  ".to_string();
        assert!(store.upsert_event(&draft).is_err());
    }

    #[test]
    fn test_edge_duplicate_suppression() {
        let store = InMemoryGraphStore::new();
        let event = store.upsert_event(&event_draft("AU-1")).unwrap().id();
        let person = store
            .upsert_person(&person_draft("juan perez", None))
            .unwrap()
            .id();

        let draft = EdgeDraft {
            tenant_code: tenant(),
            event_id: event,
            from_person_id: None,
            from_org_id: None,
            to_person_id: Some(person),
            to_org_id: None,
            label: EdgeLabel::Recipient,
            metadata: serde_json::json!({}),
        };

        assert_eq!(store.upsert_edge(&draft).unwrap(), EdgeUpsert::Created);
        assert_eq!(store.upsert_edge(&draft).unwrap(), EdgeUpsert::Duplicate);
        assert_eq!(store.edges_for_event(event).unwrap().len(), 1);
    }

    #[test]
    fn test_edge_rejects_xor_violation() {
        let store = InMemoryGraphStore::new();
        let event = store.upsert_event(&event_draft("AU-1")).unwrap().id();
        let draft = EdgeDraft {
            tenant_code: tenant(),
            event_id: event,
            from_person_id: None,
            from_org_id: None,
            to_person_id: None,
            to_org_id: None,
            label: EdgeLabel::Meets,
            metadata: serde_json::json!({}),
        };
        assert!(matches!(
            store.upsert_edge(&draft),
            Err(StorageError::InvalidDraft(_))
        ));
    }

    #[test]
    fn test_indexes_are_tenant_scoped() {
        let store = InMemoryGraphStore::new();
        store
            .upsert_person(&person_draft("juan perez", Some(tax("12345678-5"))))
            .unwrap();

        let mut other = person_draft("maria soto", None);
        other.tenant_code = TenantCode::new("AR").unwrap();
        store.upsert_person(&other).unwrap();

        let index = store.person_index(&tenant()).unwrap();
        assert_eq!(index.name_entries(), 1);
        assert_eq!(index.tax_id_entries(), 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let store = InMemoryGraphStore::new();
        let result = store.in_transaction(&mut |s| {
            s.upsert_person(&person_draft("juan perez", None))?;
            Err(StorageError::BackendError("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(store.counts(&tenant()).unwrap().persons, 0);
    }

    #[test]
    fn test_transaction_commits_on_success() {
        let store = InMemoryGraphStore::new();
        store
            .in_transaction(&mut |s| {
                s.upsert_person(&person_draft("juan perez", None))?;
                Ok(())
            })
            .unwrap();
        assert_eq!(store.counts(&tenant()).unwrap().persons, 1);
    }
}
