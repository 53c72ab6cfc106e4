//! In-batch reference merging.
//!
//! Before anything is persisted, the references of a whole batch are
//! deduplicated by normalized name within each entity class, and
//! duplicate sightings enrich the first one field by field (a later
//! sighting fills a missing title or tax-id, never overwrites). The
//! outcome tags each distinct reference as already-canonical or new,
//! which feeds the batch report; it does not drive control flow.

use std::collections::HashMap;

use serde::Serialize;

use crate::identity::{IdentityNormalizer, NormalizedTaxId};
use crate::mapper::RecordMapper;
use crate::record::{Role, TargetClass};
use crate::resolve::{Match, ResolvedEntity, Resolver};

/// Counts from one merge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeCounts {
    /// Distinct references that resolved to canonical rows.
    pub existing: usize,
    /// Distinct references with no canonical counterpart yet.
    pub new: usize,
    /// Repeat sightings folded into an earlier reference.
    pub duplicates: usize,
}

/// One distinct reference after merging.
#[derive(Debug, Clone)]
pub struct MergedReference {
    /// Role of the first sighting.
    pub role: Role,
    /// Table the reference resolves against.
    pub target: TargetClass,
    /// Canonical matching form of the name.
    pub normalized_name: String,
    /// Display name of the first sighting.
    pub raw_name: String,
    /// Given names, from the first sighting that carried them.
    pub given_names: Option<String>,
    /// Family names, from the first sighting that carried them.
    pub family_names: Option<String>,
    /// Title, from the first sighting that carried one.
    pub title: Option<String>,
    /// Canonicalized tax-id, from the first sighting with a valid one.
    pub tax_id: Option<NormalizedTaxId>,
    /// How the reference resolved against the canonical graph.
    pub resolution: Match<ResolvedEntity>,
    /// Number of sightings folded into this reference.
    pub sightings: usize,
}

/// Result of merging a batch's references.
#[derive(Debug)]
pub struct MergeOutcome {
    /// Distinct references in first-sighting order.
    pub references: Vec<MergedReference>,
    /// Summary counts.
    pub counts: MergeCounts,
}

/// Merges and pre-resolves the references of a batch.
pub struct MergeEngine<'a> {
    normalizer: &'a IdentityNormalizer,
    resolver: Resolver<'a>,
}

impl<'a> MergeEngine<'a> {
    /// Creates a merge engine over the batch's resolver.
    #[must_use]
    pub fn new(normalizer: &'a IdentityNormalizer, resolver: Resolver<'a>) -> Self {
        Self {
            normalizer,
            resolver,
        }
    }

    /// Runs the merge pass over all records of a batch.
    ///
    /// References whose names normalize to the empty string and carry
    /// no valid tax-id are dropped; there is nothing to match or
    /// persist for them.
    pub fn merge<M: RecordMapper>(&self, mapper: &M, records: &[M::Record]) -> MergeOutcome {
        let mut references: Vec<MergedReference> = Vec::new();
        let mut seen: HashMap<(TargetClass, String), usize> = HashMap::new();
        let mut counts = MergeCounts::default();

        for record in records {
            for reference in mapper.extract_references(record) {
                let normalized_name = self.normalizer.normalize_name(&reference.raw_name);
                let tax_id = reference
                    .raw_tax_id
                    .as_deref()
                    .and_then(|raw| self.normalizer.normalize_tax_id(raw));

                if normalized_name.is_empty() && tax_id.as_ref().and_then(|t| t.valid_id()).is_none()
                {
                    continue;
                }

                let target = reference.target_class();
                let key = (target, normalized_name.clone());

                if let Some(&index) = seen.get(&key) {
                    counts.duplicates += 1;
                    let merged = &mut references[index];
                    merged.sightings += 1;
                    fill_missing(&mut merged.given_names, reference.given_names);
                    fill_missing(&mut merged.family_names, reference.family_names);
                    fill_missing(&mut merged.title, reference.title);
                    if merged.tax_id.as_ref().and_then(|t| t.valid_id()).is_none() {
                        if let Some(tax) = tax_id.filter(|t| t.valid) {
                            merged.tax_id = Some(tax);
                        }
                    }
                    continue;
                }

                let resolution =
                    self.resolver
                        .resolve(target, tax_id.as_ref(), &normalized_name);
                if resolution.is_none() {
                    counts.new += 1;
                } else {
                    counts.existing += 1;
                }

                seen.insert(key, references.len());
                references.push(MergedReference {
                    role: reference.role,
                    target,
                    normalized_name,
                    raw_name: reference.raw_name.trim().to_string(),
                    given_names: reference.given_names,
                    family_names: reference.family_names,
                    title: reference.title,
                    tax_id,
                    resolution,
                    sightings: 1,
                });
            }
        }

        MergeOutcome { references, counts }
    }
}

fn fill_missing(slot: &mut Option<String>, incoming: Option<String>) {
    if slot.is_none() {
        if let Some(value) = incoming.filter(|v| !v.trim().is_empty()) {
            *slot = Some(value);
        }
    }
}
