use lobbygraph::{
    run_batch, CommitPolicy, DonorClass, EventKind, GraphMapper, GraphStore, InMemoryGraphStore,
    NormalizedRecord, RecordKind, Reference, Role, SyncStatus, TenantCode,
};

fn tenant() -> TenantCode {
    TenantCode::new("CL").unwrap()
}

fn meeting(external_id: &str) -> NormalizedRecord {
    NormalizedRecord::new(RecordKind::Meeting, external_id)
        .with_metadata("source", serde_json::Value::String("lobby".to_string()))
        .with_reference(Reference::new(Role::Official, "JUAN PÉREZ").with_tax_id("12.345.678-5"))
        .with_reference(Reference::new(Role::Institution, "Ministerio de Hacienda"))
}

fn run(
    store: &InMemoryGraphStore,
    records: &[NormalizedRecord],
) -> lobbygraph::BatchReport {
    let mapper = GraphMapper::new(tenant());
    run_batch(store, &mapper, &tenant(), records, CommitPolicy::PerBundle)
}

#[test]
fn meeting_batch_creates_canonical_graph() {
    let store = InMemoryGraphStore::new();
    let report = run(&store, &[meeting("AU-1001")]);

    assert_eq!(report.status, SyncStatus::Ok);
    assert_eq!(report.persisted, 1);
    assert_eq!(report.persist.persons_created, 1);
    assert_eq!(report.persist.orgs_created, 1);
    assert_eq!(report.persist.events_created, 1);
    assert_eq!(report.persist.edges_created, 1);

    // Accents folded, tax-id canonicalized.
    let index = store.person_index(&tenant()).unwrap();
    let person = index.resolve(None, "juan perez").id().unwrap();
    let row = store.get_person(person).unwrap().unwrap();
    assert_eq!(row.tax_id.as_deref(), Some("12345678-5"));
    assert_eq!(row.full_name, "JUAN PÉREZ");

    let org_index = store.organisation_index(&tenant()).unwrap();
    let org = org_index.resolve(None, "ministerio de hacienda").id().unwrap();
    let org_row = store.get_organisation(org).unwrap().unwrap();
    assert_eq!(org_row.org_type.as_deref(), Some("ministry"));

    let event = store
        .find_event(&tenant(), "AU-1001", &EventKind::Meeting)
        .unwrap()
        .unwrap();
    let edges = store.edges_for_event(event).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].from_person_id, Some(person));
    assert_eq!(edges[0].to_org_id, Some(org));
}

#[test]
fn rerunning_a_batch_changes_nothing() {
    let store = InMemoryGraphStore::new();
    run(&store, &[meeting("AU-1001")]);

    let report = run(&store, &[meeting("AU-1001")]);
    assert_eq!(report.status, SyncStatus::Ok);
    assert_eq!(report.persist.persons_created, 0);
    assert_eq!(report.persist.orgs_created, 0);
    assert_eq!(report.persist.events_created, 0);
    assert_eq!(report.persist.edges_created, 0);
    assert_eq!(report.persist.events_existing, 1);
    assert_eq!(report.persist.edges_skipped_duplicate, 1);

    let counts = store.counts(&tenant()).unwrap();
    assert_eq!(counts.persons, 1);
    assert_eq!(counts.organisations, 1);
    assert_eq!(counts.events, 1);
    assert_eq!(counts.edges, 1);
}

#[test]
fn name_variants_fold_into_one_person() {
    let store = InMemoryGraphStore::new();
    // Same person sighted with and without accents, tax-id only once.
    let records = vec![
        meeting("AU-1"),
        NormalizedRecord::new(RecordKind::Meeting, "AU-2")
            .with_reference(Reference::new(Role::Official, "Juan Perez"))
            .with_reference(Reference::new(Role::Institution, "Ministerio de Hacienda")),
    ];

    let report = run(&store, &records);
    assert_eq!(report.status, SyncStatus::Ok);
    assert_eq!(store.counts(&tenant()).unwrap().persons, 1);
    assert_eq!(store.counts(&tenant()).unwrap().events, 2);
}

#[test]
fn cross_ref_donation_is_gated_on_a_known_candidate() {
    let store = InMemoryGraphStore::new();
    // The candidate exists only after the first sync.
    run(&store, &[meeting("AU-1")]);

    let cross_ref = NormalizedRecord::new(RecordKind::DonationCrossRef, "servel:9f2a")
        .with_metadata("source", serde_json::Value::String("servel".to_string()))
        .with_reference(Reference::new(Role::Candidate, "Juan Pérez").with_tax_id("12.345.678-5"))
        .with_reference(
            Reference::new(Role::Donor, "Empresa Fantasma").with_classifier(DonorClass::LegalEntity),
        );

    // Before the candidate exists nothing would be written; with the
    // candidate resolved the event and its mandatory edge land.
    let report = run(&store, std::slice::from_ref(&cross_ref));
    assert_eq!(report.status, SyncStatus::Ok);
    assert_eq!(report.persisted, 1);
    assert_eq!(report.persist.events_created, 1);
    assert_eq!(report.persist.edges_created, 1);
    assert_eq!(
        report.unmatched_organisations,
        vec!["empresa fantasma".to_string()]
    );

    let event = store
        .find_event(&tenant(), "servel:9f2a", &EventKind::Donation)
        .unwrap()
        .unwrap();
    let row = store.get_event(event).unwrap().unwrap();
    assert_eq!(
        row.metadata.get("candidate_matched_by").and_then(|v| v.as_str()),
        Some("TAX_ID")
    );
    assert_eq!(
        row.metadata.get("donor_matched_by").and_then(|v| v.as_str()),
        Some("NONE")
    );

    let edges = store.edges_for_event(event).unwrap();
    assert_eq!(edges.len(), 1);
    assert!(edges[0].from_person_id.is_none());
    assert!(edges[0].from_org_id.is_none());
}

#[test]
fn cross_ref_without_candidate_writes_nothing() {
    let store = InMemoryGraphStore::new();
    let cross_ref = NormalizedRecord::new(RecordKind::DonationCrossRef, "servel:9f2a")
        .with_reference(Reference::new(Role::Candidate, "Nadie Conocido"));

    let report = run(&store, &[cross_ref]);
    assert_eq!(report.status, SyncStatus::Ok);
    assert_eq!(report.skipped_no_candidate, 1);
    assert_eq!(store.counts(&tenant()).unwrap().events, 0);
}

#[test]
fn participation_attaches_to_events_an_earlier_sync_created() {
    let store = InMemoryGraphStore::new();
    run(&store, &[meeting("AU-1001")]);

    let records = vec![
        NormalizedRecord::new(RecordKind::Participation(EventKind::Meeting), "AU-1001")
            .with_reference(Reference::new(Role::Official, "Juan Pérez"))
            .with_reference(Reference::new(Role::Lobbyist, "Nadie Conocido")),
        // No such event: the record is skipped, not an error.
        NormalizedRecord::new(RecordKind::Participation(EventKind::Meeting), "AU-9999")
            .with_reference(Reference::new(Role::Official, "Juan Pérez")),
    ];

    let report = run(&store, &records);
    assert_eq!(report.status, SyncStatus::Ok);
    assert_eq!(report.persisted, 1);
    assert_eq!(report.skipped_missing_event, 1);
    assert_eq!(report.unmatched_persons, vec!["nadie conocido".to_string()]);

    let event = store
        .find_event(&tenant(), "AU-1001", &EventKind::Meeting)
        .unwrap()
        .unwrap();
    let edges = store.edges_for_event(event).unwrap();
    assert_eq!(edges.len(), 2);
    assert!(edges.iter().any(|e| e.label.as_str() == "OFFICIAL"));
}

#[test]
fn ambiguous_identity_is_a_counted_skip() {
    let store = InMemoryGraphStore::new();
    // Two distinct people sharing a name.
    let seeds = vec![
        NormalizedRecord::new(RecordKind::Meeting, "SEED-1")
            .with_reference(Reference::new(Role::Official, "Juan Pérez").with_tax_id("11111111-1"))
            .with_reference(Reference::new(Role::Institution, "Ministerio de Salud")),
        NormalizedRecord::new(RecordKind::Meeting, "SEED-2")
            .with_reference(Reference::new(Role::Official, "Juan Pérez").with_tax_id("12345678-5"))
            .with_reference(Reference::new(Role::Institution, "Ministerio de Salud")),
    ];
    run(&store, &seeds);
    assert_eq!(store.counts(&tenant()).unwrap().persons, 2);

    // A bare name cannot pick between them; nothing new is written.
    let bare = NormalizedRecord::new(RecordKind::Meeting, "AU-77")
        .with_reference(Reference::new(Role::Official, "Juan Pérez"))
        .with_reference(Reference::new(Role::Institution, "Ministerio de Salud"));
    let report = run(&store, &[bare]);
    assert_eq!(report.status, SyncStatus::Ok);
    assert_eq!(report.skipped_ambiguous, 1);
    assert_eq!(store.counts(&tenant()).unwrap().persons, 2);
    assert!(store
        .find_event(&tenant(), "AU-77", &EventKind::Meeting)
        .unwrap()
        .is_none());
}

#[test]
fn tenants_do_not_see_each_other() {
    let store = InMemoryGraphStore::new();
    run(&store, &[meeting("AU-1")]);

    let other = TenantCode::new("AR").unwrap();
    let mapper = GraphMapper::new(other.clone());
    let report = run_batch(
        &store,
        &mapper,
        &other,
        &[meeting("AU-1")],
        CommitPolicy::PerBundle,
    );

    // Same record under another tenant creates its own rows.
    assert_eq!(report.persist.persons_created, 1);
    assert_eq!(report.persist.events_created, 1);
    assert_eq!(store.counts(&tenant()).unwrap().persons, 1);
    assert_eq!(store.counts(&other).unwrap().persons, 1);
}
