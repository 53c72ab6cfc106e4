//! Normalized input records.
//!
//! Upstream collaborators (scrapers, SPARQL clients, file parsers) do
//! their own fetching and parsing, then hand the core flat
//! [`NormalizedRecord`] values: a kind, a stable external id, a date,
//! a metadata bag, and the entity references the record mentions. The
//! core never sees raw source payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::EventKind;

/// What kind of record this is, which picks the mapping rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    /// Registered meeting between a public official and lobbyists.
    Meeting,
    /// Funded trip taken by a public official.
    Travel,
    /// Donation reported by the lobbying registry itself.
    Donation,
    /// Donation from an external campaign-financing registry,
    /// cross-referenced against already-canonical people.
    DonationCrossRef,
    /// Participation facts for an event that already exists in the
    /// graph under the given kind.
    Participation(EventKind),
}

/// Role a reference plays in its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// The public official (meeting subject, traveler, recipient).
    Official,
    /// A lobbyist attending a meeting.
    Lobbyist,
    /// An organisation represented by lobbyists.
    Representative,
    /// An organisation funding a trip.
    Funder,
    /// The donor in a donation record.
    Donor,
    /// The candidate receiving a cross-referenced donation.
    Candidate,
    /// The institution hosting or involved in the record.
    Institution,
}

impl Role {
    /// Returns the uppercase label used for participation edges.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Official => "OFFICIAL",
            Self::Lobbyist => "LOBBYIST",
            Self::Representative => "REPRESENTATIVE",
            Self::Funder => "FUNDER",
            Self::Donor => "DONOR",
            Self::Candidate => "CANDIDATE",
            Self::Institution => "INSTITUTION",
        }
    }
}

/// Whether a donor is a natural person or a legal entity.
///
/// Decides which canonical table a donor reference resolves against.
/// Sources that do not classify donors default to
/// [`DonorClass::NaturalPerson`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DonorClass {
    /// An individual; resolves against `Person`.
    NaturalPerson,
    /// A company or other legal entity; resolves against `Organisation`.
    LegalEntity,
}

/// Which canonical table a reference resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetClass {
    /// Resolves against `Person`.
    Person,
    /// Resolves against `Organisation`.
    Organisation,
}

/// A mention of a person or organisation inside a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    /// Role the mention plays in the record.
    pub role: Role,
    /// Name as spelled by the source.
    pub raw_name: String,
    /// Given names, when the source splits them out.
    #[serde(default)]
    pub given_names: Option<String>,
    /// Family names, when the source splits them out.
    #[serde(default)]
    pub family_names: Option<String>,
    /// Tax identifier as spelled by the source, unvalidated.
    #[serde(default)]
    pub raw_tax_id: Option<String>,
    /// Job title or position, when reported.
    #[serde(default)]
    pub title: Option<String>,
    /// Donor classification, when the source provides one.
    #[serde(default)]
    pub classifier: Option<DonorClass>,
}

impl Reference {
    /// Creates a reference with just a role and a raw name.
    #[must_use]
    pub fn new(role: Role, raw_name: impl Into<String>) -> Self {
        Self {
            role,
            raw_name: raw_name.into(),
            given_names: None,
            family_names: None,
            raw_tax_id: None,
            title: None,
            classifier: None,
        }
    }

    /// Attaches a raw tax identifier.
    #[must_use]
    pub fn with_tax_id(mut self, raw_tax_id: impl Into<String>) -> Self {
        self.raw_tax_id = Some(raw_tax_id.into());
        self
    }

    /// Attaches split given/family names.
    #[must_use]
    pub fn with_names(mut self, given: impl Into<String>, family: impl Into<String>) -> Self {
        self.given_names = Some(given.into());
        self.family_names = Some(family.into());
        self
    }

    /// Attaches a job title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Attaches a donor classification.
    #[must_use]
    pub const fn with_classifier(mut self, classifier: DonorClass) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Which canonical table this reference resolves against.
    ///
    /// Person-shaped roles go to `Person`, organisation-shaped roles to
    /// `Organisation`. Donors route by their classifier, defaulting to
    /// natural person when the source did not classify.
    #[must_use]
    pub fn target_class(&self) -> TargetClass {
        match self.role {
            Role::Official | Role::Lobbyist | Role::Candidate => TargetClass::Person,
            Role::Representative | Role::Funder | Role::Institution => TargetClass::Organisation,
            Role::Donor => match self.classifier.unwrap_or(DonorClass::NaturalPerson) {
                DonorClass::NaturalPerson => TargetClass::Person,
                DonorClass::LegalEntity => TargetClass::Organisation,
            },
        }
    }
}

/// A flat, source-independent input record.
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    /// Kind, which picks the mapping rules.
    pub kind: RecordKind,
    /// Source-assigned stable identifier of the underlying event.
    pub external_id: String,
    /// When the event took place, if known.
    pub date: Option<DateTime<Utc>>,
    /// Source-specific fields carried into the event's metadata.
    pub metadata: Map<String, Value>,
    /// Entity mentions inside the record.
    pub references: Vec<Reference>,
}

impl NormalizedRecord {
    /// Creates an empty record of the given kind.
    #[must_use]
    pub fn new(kind: RecordKind, external_id: impl Into<String>) -> Self {
        Self {
            kind,
            external_id: external_id.into(),
            date: None,
            metadata: Map::new(),
            references: Vec::new(),
        }
    }

    /// Sets the event date.
    #[must_use]
    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Adds a metadata field.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Adds an entity reference.
    #[must_use]
    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.references.push(reference);
        self
    }

    /// Returns the first reference with the given role, if any.
    #[must_use]
    pub fn reference_with_role(&self, role: Role) -> Option<&Reference> {
        self.references.iter().find(|r| r.role == role)
    }

    /// Returns the `source` metadata field, if present.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(Value::as_str)
    }
}

/// Computes a stable hex checksum over ordered string parts.
///
/// Used to derive deterministic external ids for cross-reference
/// records whose source assigns none: the sync composes an id such as
/// `"servel:"` plus this checksum over donor, candidate, amount, and
/// date, so re-running the sync reuses the same event row.
#[must_use]
pub fn stable_checksum(parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        // Separator prevents ("ab","c") from colliding with ("a","bc").
        hasher.update(&[0x1f]);
    }
    hasher.finalize().to_hex().to_string()
}
