//! Batch driver.
//!
//! One call runs a whole batch: build the lookup indexes, merge the
//! batch's references, map every record, flush every bundle, and
//! return a [`BatchReport`]. Record-level failures are captured in the
//! report; only a store-level failure (or a dead connection) aborts
//! the batch.

use chrono::Utc;

use crate::batch::{MergeCounts, MergeEngine};
use crate::mapper::{RecordMapper, SkipReason};
use crate::record::TargetClass;
use crate::report::{BatchReport, SyncStatus};
use crate::resolve::Resolver;
use crate::storage::GraphStore;
use crate::tenant::TenantCode;
use crate::upsert::{persist_bundle, persist_bundle_atomic, BundleStats, FlushOutcome};

/// How bundle writes are grouped into transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPolicy {
    /// Each record's bundle is flushed inside its own transaction: the
    /// record's whole graph contribution lands or none of it does.
    PerBundle,
    /// Bundles are flushed without per-record transactions; a failure
    /// mid-bundle leaves earlier entity upserts in place (they are
    /// idempotent) and is recorded as a record-level error.
    BestEffort,
}

/// Runs one batch of records against a store.
///
/// The indexes are built once up front, so records inside one batch do
/// not resolve against rows created by earlier records of the same
/// batch; idempotency comes from the store's natural-key upserts. The
/// merge pass uses the mapper's own normalizer, so both stages build
/// identical matching keys.
pub fn run_batch<M: RecordMapper>(
    store: &dyn GraphStore,
    mapper: &M,
    tenant: &TenantCode,
    records: &[M::Record],
    policy: CommitPolicy,
) -> BatchReport {
    let started_at = Utc::now();
    let mut report = BatchReport {
        tenant_code: tenant.clone(),
        status: SyncStatus::Skipped,
        records: records.len(),
        persisted: 0,
        merge: MergeCounts::default(),
        persist: BundleStats::default(),
        skipped_no_candidate: 0,
        skipped_invalid: 0,
        skipped_missing_event: 0,
        skipped_ambiguous: 0,
        unmatched_persons: Vec::new(),
        unmatched_organisations: Vec::new(),
        errors: Vec::new(),
        started_at,
        finished_at: started_at,
    };

    if records.is_empty() {
        report.finished_at = Utc::now();
        return report;
    }

    let (person_index, org_index) = match (store.person_index(tenant), store.organisation_index(tenant)) {
        (Ok(p), Ok(o)) => (p, o),
        (Err(err), _) | (_, Err(err)) => {
            report.errors.push(format!("index build failed: {err}"));
            report.status = SyncStatus::Error;
            report.finished_at = Utc::now();
            return report;
        }
    };
    let resolver = Resolver {
        persons: &person_index,
        organisations: &org_index,
    };

    // Observability pass: dedup and pre-resolve the batch's references.
    let merge_outcome = MergeEngine::new(mapper.normalizer(), resolver).merge(mapper, records);
    report.merge = merge_outcome.counts;

    for (position, record) in records.iter().enumerate() {
        let mapped = mapper.map_to_bundle(record, &resolver);

        for unmatched in &mapped.unmatched {
            match unmatched.target {
                TargetClass::Person => {
                    report.unmatched_persons.push(unmatched.normalized_name.clone());
                }
                TargetClass::Organisation => {
                    report
                        .unmatched_organisations
                        .push(unmatched.normalized_name.clone());
                }
            }
        }

        match mapped.skipped {
            Some(SkipReason::NoRecipientMatch) => {
                report.skipped_no_candidate += 1;
                continue;
            }
            Some(SkipReason::MissingExternalId) => {
                report.skipped_invalid += 1;
                continue;
            }
            None => {}
        }

        let Some(bundle) = mapped.bundle else {
            continue;
        };

        let flushed = match policy {
            CommitPolicy::PerBundle => persist_bundle_atomic(store, &bundle),
            CommitPolicy::BestEffort => persist_bundle(store, &bundle),
        };

        match flushed {
            Ok(FlushOutcome::Persisted(stats)) => {
                report.persist.merge(&stats);
                report.persisted += 1;
            }
            Ok(FlushOutcome::MissingEvent { .. }) => {
                report.skipped_missing_event += 1;
            }
            Ok(FlushOutcome::AmbiguousIdentity { .. }) => {
                report.skipped_ambiguous += 1;
            }
            Err(err) => {
                report.errors.push(format!("record #{position}: {err}"));
                if err.is_fatal() {
                    break;
                }
            }
        }
    }

    report.status = SyncStatus::derive(report.records, report.persisted, report.errors.len());
    report.finished_at = Utc::now();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::GraphMapper;
    use crate::record::{NormalizedRecord, RecordKind, Reference, Role};
    use crate::storage::InMemoryGraphStore;

    fn tenant() -> TenantCode {
        TenantCode::new("CL").unwrap()
    }

    fn meeting(external_id: &str, official: &str, institution: &str) -> NormalizedRecord {
        NormalizedRecord::new(RecordKind::Meeting, external_id)
            .with_metadata("source", serde_json::Value::String("lobby".to_string()))
            .with_reference(Reference::new(Role::Official, official))
            .with_reference(Reference::new(Role::Institution, institution))
    }

    #[test]
    fn test_empty_batch_is_skipped() {
        let store = InMemoryGraphStore::new();
        let mapper = GraphMapper::new(tenant());
        let report = run_batch::<GraphMapper>(&store, &mapper, &tenant(), &[], CommitPolicy::PerBundle);
        assert_eq!(report.status, SyncStatus::Skipped);
        assert_eq!(report.records, 0);
    }

    #[test]
    fn test_batch_persists_and_reports_ok() {
        let store = InMemoryGraphStore::new();
        let mapper = GraphMapper::new(tenant());
        let records = vec![
            meeting("AU-1", "Juan Pérez", "Ministerio de Hacienda"),
            meeting("AU-2", "María Soto", "Ministerio de Salud"),
        ];

        let report = run_batch(&store, &mapper, &tenant(), &records, CommitPolicy::PerBundle);
        assert_eq!(report.status, SyncStatus::Ok);
        assert_eq!(report.persisted, 2);
        assert_eq!(report.persist.events_created, 2);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_batch_counts_cross_ref_skips() {
        let store = InMemoryGraphStore::new();
        let mapper = GraphMapper::new(tenant());
        let records = vec![NormalizedRecord::new(
            RecordKind::DonationCrossRef,
            "servel:x",
        )
        .with_reference(Reference::new(Role::Candidate, "Nadie Conocido"))];

        let report = run_batch(&store, &mapper, &tenant(), &records, CommitPolicy::BestEffort);
        // No recipient match: skipped, not an error, status Ok.
        assert_eq!(report.status, SyncStatus::Ok);
        assert_eq!(report.skipped_no_candidate, 1);
        assert_eq!(report.unmatched_persons, vec!["nadie conocido".to_string()]);
        assert_eq!(store.counts(&tenant()).unwrap().events, 0);
    }

    #[test]
    fn test_batch_merge_counts_are_reported() {
        let store = InMemoryGraphStore::new();
        let mapper = GraphMapper::new(tenant());
        let records = vec![
            meeting("AU-1", "Juan Pérez", "Ministerio de Hacienda"),
            meeting("AU-2", "JUAN PEREZ", "Ministerio de Hacienda"),
        ];

        let report = run_batch(&store, &mapper, &tenant(), &records, CommitPolicy::PerBundle);
        // Two sightings of the person and of the institution fold into
        // one reference each.
        assert_eq!(report.merge.duplicates, 2);
        assert_eq!(report.merge.new, 2);
        assert_eq!(store.counts(&tenant()).unwrap().persons, 1);
        assert_eq!(store.counts(&tenant()).unwrap().organisations, 1);
    }

    #[test]
    fn test_batch_skips_invalid_records() {
        let store = InMemoryGraphStore::new();
        let mapper = GraphMapper::new(tenant());
        let records = vec![meeting("", "Juan Pérez", "Hacienda")];

        let report = run_batch(&store, &mapper, &tenant(), &records, CommitPolicy::PerBundle);
        assert_eq!(report.skipped_invalid, 1);
        assert_eq!(report.persisted, 0);
        assert_eq!(report.status, SyncStatus::Ok);
    }

    #[test]
    fn test_batch_merges_with_the_mappers_normalizer() {
        use crate::identity::{CheckDigitValidator, IdentityNormalizer};

        struct AlwaysZero;
        impl CheckDigitValidator for AlwaysZero {
            fn expected_check(&self, _body: &str) -> Option<char> {
                Some('0')
            }
        }

        let store = InMemoryGraphStore::new();
        let mapper = GraphMapper::with_normalizer(
            tenant(),
            IdentityNormalizer::new(Box::new(AlwaysZero)),
        );
        // The tax-id is valid only under the mapper's custom scheme.
        let records = vec![NormalizedRecord::new(RecordKind::Meeting, "AU-1")
            .with_reference(Reference::new(Role::Official, "Juan Pérez").with_tax_id("12345678-0"))
            .with_reference(Reference::new(Role::Institution, "Hacienda"))];

        let first = run_batch(&store, &mapper, &tenant(), &records, CommitPolicy::PerBundle);
        assert_eq!(first.persist.persons_created, 1);
        assert_eq!(store.person_index(&tenant()).unwrap().tax_id_entries(), 1);

        // The merge pass must key on the same scheme, so a rerun
        // resolves both references instead of creating a second person.
        let rerun = run_batch(&store, &mapper, &tenant(), &records, CommitPolicy::PerBundle);
        assert_eq!(rerun.merge.existing, 2);
        assert_eq!(rerun.persist.persons_created, 0);
    }
}
