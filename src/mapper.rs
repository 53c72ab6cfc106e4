//! Record-to-bundle mapping.
//!
//! One mapper turns a [`NormalizedRecord`] into an [`EntityBundle`]
//! according to fixed structural rules per record kind. Mapping is
//! pure: it never touches the store, only the per-batch resolver.
//!
//! Rules in brief:
//!
//! - meeting: official Person, institution Organisation, `MEETS` edge
//! - travel: official Person, funder Organisation, `TRAVELS_TO` edge
//! - donation: recipient Person, donor Organisation, `CONTRIBUTES` edge
//! - donation cross-ref: event gated on a resolved recipient, with
//!   event-origin `RECIPIENT` and optional `DONOR` edges
//! - participation: role-labeled event-origin edges onto an event an
//!   earlier sync created; unresolved mentions are reported, never
//!   created

use serde_json::Value;

use crate::bundle::{Endpoint, EntityBundle, EventRef, EventStub, OrgStub, PersonStub};
use crate::identity::IdentityNormalizer;
use crate::model::{EdgeLabel, EventKind};
use crate::record::{NormalizedRecord, RecordKind, Reference, Role, TargetClass};
use crate::resolve::{Match, ResolvedEntity, Resolver};
use crate::tenant::TenantCode;

/// Inferred organisation classification.
///
/// Keyword-based, over the normalized name. Purely descriptive; it
/// never participates in matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrgType {
    /// Government ministry.
    Ministry,
    /// Chamber, senate, congress.
    Legislative,
    /// Court or tribunal.
    Judicial,
    /// Political party.
    Party,
    /// Private company.
    Company,
    /// Foundation or NGO.
    Ngo,
    /// Anything else.
    Other,
}

impl OrgType {
    /// Infers a classification from a normalized organisation name.
    #[must_use]
    pub fn infer(normalized_name: &str) -> Self {
        let tokens: Vec<&str> = normalized_name.split(' ').collect();
        let has = |word: &str| tokens.contains(&word);

        if has("ministerio") {
            Self::Ministry
        } else if has("camara") || has("senado") || has("congreso") {
            Self::Legislative
        } else if has("tribunal") || has("corte") || has("justicia") {
            Self::Judicial
        } else if has("partido") {
            Self::Party
        } else if has("empresa") || has("ltda") || tokens.windows(2).any(|w| w == ["s", "a"]) {
            Self::Company
        } else if has("fundacion") || has("ong") {
            Self::Ngo
        } else {
            Self::Other
        }
    }

    /// Returns the free-text value stored in the `type` column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ministry => "ministry",
            Self::Legislative => "legislative",
            Self::Judicial => "judicial",
            Self::Party => "party",
            Self::Company => "company",
            Self::Ngo => "ngo",
            Self::Other => "other",
        }
    }
}

/// A reference that resolved to nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmatchedReference {
    /// Role the mention played.
    pub role: Role,
    /// Table it was resolved against.
    pub target: TargetClass,
    /// Normalized name that found no unique row.
    pub normalized_name: String,
}

/// Why a record produced no bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Cross-reference donation whose recipient did not resolve.
    /// Hard rule: no event without a resolved recipient.
    NoRecipientMatch,
    /// Record without a usable external id.
    MissingExternalId,
}

/// Outcome of mapping one record.
#[derive(Debug)]
pub struct MapResult {
    /// The staged bundle, absent when the record was skipped or had
    /// nothing to contribute.
    pub bundle: Option<EntityBundle>,
    /// Set when the record was skipped outright.
    pub skipped: Option<SkipReason>,
    /// References that resolved to nothing.
    pub unmatched: Vec<UnmatchedReference>,
}

impl MapResult {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            bundle: None,
            skipped: Some(reason),
            unmatched: Vec::new(),
        }
    }
}

/// Capability interface between record sources and the graph core.
///
/// A source plugs in by producing records of its own shape and an
/// implementation of this trait; the batch driver and the merge engine
/// are generic over it.
pub trait RecordMapper {
    /// The record shape this mapper consumes.
    type Record;

    /// The identity normalizer this mapper resolves with. The batch
    /// driver hands the same normalizer to the merge engine, so merge
    /// counting and bundle mapping share one set of matching keys.
    fn normalizer(&self) -> &IdentityNormalizer;

    /// Extracts the entity mentions from a record, for pre-persistence
    /// merging and observability.
    fn extract_references(&self, record: &Self::Record) -> Vec<Reference>;

    /// Maps a record to its graph contribution.
    fn map_to_bundle(&self, record: &Self::Record, resolver: &Resolver<'_>) -> MapResult;
}

/// The built-in mapper for [`NormalizedRecord`] values.
#[derive(Debug)]
pub struct GraphMapper {
    tenant: TenantCode,
    normalizer: IdentityNormalizer,
}

impl GraphMapper {
    /// Creates a mapper for a tenant with the default check-digit
    /// scheme.
    #[must_use]
    pub fn new(tenant: TenantCode) -> Self {
        Self::with_normalizer(tenant, IdentityNormalizer::default())
    }

    /// Creates a mapper with a custom identity normalizer.
    #[must_use]
    pub fn with_normalizer(tenant: TenantCode, normalizer: IdentityNormalizer) -> Self {
        Self { tenant, normalizer }
    }

    /// The tenant this mapper stages bundles for.
    #[must_use]
    pub fn tenant(&self) -> &TenantCode {
        &self.tenant
    }

    fn person_stub(&self, reference: &Reference, source: Option<&str>) -> Option<PersonStub> {
        let normalized_name = self.normalizer.normalize_name(&reference.raw_name);
        if normalized_name.is_empty() {
            return None;
        }
        let tax_id = reference
            .raw_tax_id
            .as_deref()
            .and_then(|raw| self.normalizer.valid_tax_id(raw));
        Some(PersonStub {
            tax_id,
            normalized_name,
            given_names: reference.given_names.clone(),
            family_names: reference.family_names.clone(),
            full_name: reference.raw_name.trim().to_string(),
            title: reference.title.clone(),
            source: source.map(str::to_string),
        })
    }

    fn org_stub(&self, reference: &Reference, source: Option<&str>) -> Option<OrgStub> {
        let normalized_name = self.normalizer.normalize_name(&reference.raw_name);
        if normalized_name.is_empty() {
            return None;
        }
        let tax_id = reference
            .raw_tax_id
            .as_deref()
            .and_then(|raw| self.normalizer.valid_tax_id(raw));
        let org_type = OrgType::infer(&normalized_name);
        Some(OrgStub {
            tax_id,
            name: reference.raw_name.trim().to_string(),
            normalized_name,
            org_type: Some(org_type.as_str().to_string()),
            source: source.map(str::to_string),
        })
    }

    fn event_stub(&self, record: &NormalizedRecord, kind: EventKind) -> EventStub {
        EventStub {
            external_id: record.external_id.clone(),
            kind,
            date: record.date,
            metadata: Value::Object(record.metadata.clone()),
        }
    }

    fn edge_metadata(record: &NormalizedRecord) -> Value {
        match record.source() {
            Some(source) => serde_json::json!({ "source": source }),
            None => serde_json::json!({}),
        }
    }

    /// Metadata for a registry edge: source tag, event date, the
    /// official's title, and the kind-specific fields named in
    /// `carried` copied out of the record's metadata bag.
    fn registry_edge_metadata(
        record: &NormalizedRecord,
        official: Option<&Reference>,
        carried: &[&str],
    ) -> Value {
        let mut map = serde_json::Map::new();
        if let Some(source) = record.source() {
            map.insert("source".to_string(), Value::String(source.to_string()));
        }
        if let Some(date) = record.date {
            map.insert("date".to_string(), Value::String(date.to_rfc3339()));
        }
        if let Some(title) = official.and_then(|r| r.title.as_deref()) {
            map.insert("title".to_string(), Value::String(title.to_string()));
        }
        for key in carried {
            if let Some(value) = record.metadata.get(*key) {
                map.insert((*key).to_string(), value.clone());
            }
        }
        Value::Object(map)
    }

    /// meeting / travel / donation: one official-side person, one
    /// organisation, one typed edge between them. The event is always
    /// staged; the edge only when both endpoints are usable.
    fn map_registry_record(
        &self,
        record: &NormalizedRecord,
        kind: EventKind,
        person_role: &[Role],
        org_role: &[Role],
        label: EdgeLabel,
        person_to_org: bool,
        carried: &[&str],
    ) -> MapResult {
        let event = EventRef::New(self.event_stub(record, kind));
        let mut bundle = EntityBundle::new(self.tenant.clone(), event);
        let source = record.source();

        let person_ref = person_role
            .iter()
            .find_map(|role| record.reference_with_role(*role));
        let person = person_ref
            .and_then(|r| self.person_stub(r, source))
            .map(|stub| bundle.add_person(stub));

        let org = org_role
            .iter()
            .find_map(|role| record.reference_with_role(*role))
            .and_then(|r| self.org_stub(r, source))
            .map(|stub| bundle.add_org(stub));

        if let (Some(person), Some(org)) = (person, org) {
            let (from, to) = if person_to_org {
                (Endpoint::LocalPerson(person), Endpoint::LocalOrg(org))
            } else {
                (Endpoint::LocalOrg(org), Endpoint::LocalPerson(person))
            };
            let metadata = Self::registry_edge_metadata(record, person_ref, carried);
            bundle.add_edge(Some(from), to, label, metadata);
        }

        MapResult {
            bundle: Some(bundle),
            skipped: None,
            unmatched: Vec::new(),
        }
    }

    /// Cross-reference donation: the event is created only when the
    /// candidate resolves. The candidate edge is mandatory, the donor
    /// edge optional.
    fn map_donation_cross_ref(
        &self,
        record: &NormalizedRecord,
        resolver: &Resolver<'_>,
    ) -> MapResult {
        let mut unmatched = Vec::new();

        let candidate = record.reference_with_role(Role::Candidate);
        let candidate_match = candidate.map_or(Match::None, |reference| {
            let name = self.normalizer.normalize_name(&reference.raw_name);
            let tax = reference
                .raw_tax_id
                .as_deref()
                .and_then(|raw| self.normalizer.normalize_tax_id(raw));
            resolver.resolve_person(tax.as_ref(), &name)
        });

        let Some(candidate_id) = candidate_match.id() else {
            if let Some(reference) = candidate {
                unmatched.push(UnmatchedReference {
                    role: Role::Candidate,
                    target: TargetClass::Person,
                    normalized_name: self.normalizer.normalize_name(&reference.raw_name),
                });
            }
            return MapResult {
                bundle: None,
                skipped: Some(SkipReason::NoRecipientMatch),
                unmatched,
            };
        };

        let donor = record.reference_with_role(Role::Donor);
        let donor_match = donor.map_or(Match::None, |reference| {
            let name = self.normalizer.normalize_name(&reference.raw_name);
            let tax = reference
                .raw_tax_id
                .as_deref()
                .and_then(|raw| self.normalizer.normalize_tax_id(raw));
            resolver.resolve(reference.target_class(), tax.as_ref(), &name)
        });

        // Audit trail: how each side matched.
        let mut metadata = record.metadata.clone();
        metadata.insert(
            "candidate_matched_by".to_string(),
            Value::String(candidate_match.method().as_str().to_string()),
        );
        metadata.insert(
            "donor_matched_by".to_string(),
            Value::String(donor_match.method().as_str().to_string()),
        );

        let event = EventRef::New(EventStub {
            external_id: record.external_id.clone(),
            kind: EventKind::Donation,
            date: record.date,
            metadata: Value::Object(metadata),
        });
        let mut bundle = EntityBundle::new(self.tenant.clone(), event);

        bundle.add_edge(
            None,
            Endpoint::Person(candidate_id),
            EdgeLabel::Recipient,
            Self::edge_metadata(record),
        );

        match donor_match.id() {
            Some(ResolvedEntity::Person(id)) => bundle.add_edge(
                None,
                Endpoint::Person(id),
                EdgeLabel::Donor,
                Self::edge_metadata(record),
            ),
            Some(ResolvedEntity::Organisation(id)) => bundle.add_edge(
                None,
                Endpoint::Org(id),
                EdgeLabel::Donor,
                Self::edge_metadata(record),
            ),
            None => {
                if let Some(reference) = donor {
                    unmatched.push(UnmatchedReference {
                        role: Role::Donor,
                        target: reference.target_class(),
                        normalized_name: self.normalizer.normalize_name(&reference.raw_name),
                    });
                }
            }
        }

        MapResult {
            bundle: Some(bundle),
            skipped: None,
            unmatched,
        }
    }

    /// Participation: role-labeled edges onto an already-existing
    /// event. Resolves every reference; unresolved ones are reported
    /// and dropped, never created.
    fn map_participation(
        &self,
        record: &NormalizedRecord,
        kind: &EventKind,
        resolver: &Resolver<'_>,
    ) -> MapResult {
        let mut unmatched = Vec::new();
        let event = EventRef::Existing {
            external_id: record.external_id.clone(),
            kind: kind.clone(),
        };
        let mut bundle = EntityBundle::new(self.tenant.clone(), event);

        for reference in &record.references {
            let name = self.normalizer.normalize_name(&reference.raw_name);
            if name.is_empty() {
                continue;
            }
            let tax = reference
                .raw_tax_id
                .as_deref()
                .and_then(|raw| self.normalizer.normalize_tax_id(raw));
            let class = reference.target_class();

            match resolver.resolve(class, tax.as_ref(), &name).id() {
                Some(ResolvedEntity::Person(id)) => bundle.add_edge(
                    None,
                    Endpoint::Person(id),
                    EdgeLabel::Role(reference.role.as_label().to_string()),
                    Self::edge_metadata(record),
                ),
                Some(ResolvedEntity::Organisation(id)) => bundle.add_edge(
                    None,
                    Endpoint::Org(id),
                    EdgeLabel::Role(reference.role.as_label().to_string()),
                    Self::edge_metadata(record),
                ),
                None => unmatched.push(UnmatchedReference {
                    role: reference.role,
                    target: class,
                    normalized_name: name,
                }),
            }
        }

        let bundle = if bundle.edges().is_empty() {
            None
        } else {
            Some(bundle)
        };

        MapResult {
            bundle,
            skipped: None,
            unmatched,
        }
    }
}

impl RecordMapper for GraphMapper {
    type Record = NormalizedRecord;

    fn normalizer(&self) -> &IdentityNormalizer {
        &self.normalizer
    }

    fn extract_references(&self, record: &Self::Record) -> Vec<Reference> {
        record.references.clone()
    }

    fn map_to_bundle(&self, record: &Self::Record, resolver: &Resolver<'_>) -> MapResult {
        if record.external_id.trim().is_empty() {
            return MapResult::skipped(SkipReason::MissingExternalId);
        }

        match &record.kind {
            RecordKind::Meeting => self.map_registry_record(
                record,
                EventKind::Meeting,
                &[Role::Official],
                &[Role::Institution],
                EdgeLabel::Meets,
                true,
                &[],
            ),
            RecordKind::Travel => self.map_registry_record(
                record,
                EventKind::Travel,
                &[Role::Official],
                &[Role::Funder, Role::Institution],
                EdgeLabel::TravelsTo,
                true,
                &["destination"],
            ),
            RecordKind::Donation => self.map_registry_record(
                record,
                EventKind::Donation,
                &[Role::Official, Role::Candidate],
                &[Role::Institution, Role::Donor],
                EdgeLabel::Contributes,
                false,
                &["amount"],
            ),
            RecordKind::DonationCrossRef => self.map_donation_cross_ref(record, resolver),
            RecordKind::Participation(kind) => self.map_participation(record, kind, resolver),
        }
    }
}
