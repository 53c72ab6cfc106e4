//! Canonical graph data model.
//!
//! Four tables: `Person`, `Organisation`, `Event`, `Edge`. Row structs
//! serialize with the exact column names of the deployed schema
//! (camelCase), because downstream consumers read these tables
//! directly. Draft structs are what callers hand to a
//! [`crate::storage::GraphStore`] upsert; the store assigns ids and
//! timestamps.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::identity::TaxId;
use crate::tenant::TenantCode;

macro_rules! graph_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random id.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an id from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

graph_id! {
    /// Stable identifier of a canonical `Person` row.
    PersonId
}

graph_id! {
    /// Stable identifier of a canonical `Organisation` row.
    OrgId
}

graph_id! {
    /// Stable identifier of an `Event` row.
    EventId
}

graph_id! {
    /// Stable identifier of an `Edge` row.
    EdgeId
}

/// Kind tag of an event.
///
/// Part of the event natural key `(tenantCode, externalId, kind)`.
/// Unknown tags from upstream sources are carried through as
/// [`EventKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EventKind {
    /// A registered meeting between officials and lobbyists.
    Meeting,
    /// A funded trip taken by a public official.
    Travel,
    /// A donation or contribution received by an official.
    Donation,
    /// A source-specific kind with no built-in semantics.
    Other(String),
}

impl EventKind {
    /// Returns the wire string stored in the `kind` column.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Meeting => "meeting",
            Self::Travel => "travel",
            Self::Donation => "donation",
            Self::Other(kind) => kind,
        }
    }
}

impl TryFrom<String> for EventKind {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ValidationError::EmptyEventKind);
        }
        Ok(match value.to_lowercase().as_str() {
            "meeting" => Self::Meeting,
            "travel" => Self::Travel,
            "donation" => Self::Donation,
            _ => Self::Other(value.to_string()),
        })
    }
}

impl From<EventKind> for String {
    fn from(value: EventKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Label of a typed edge.
///
/// Built-in labels carry the structural rules of the mapper; role
/// labels from participation extraction pass through as
/// [`EdgeLabel::Role`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EdgeLabel {
    /// Person met Organisation (meeting records).
    Meets,
    /// Person traveled, funded by Organisation (travel records).
    TravelsTo,
    /// Organisation contributed to Person (donation records).
    Contributes,
    /// Event received from this donor (cross-reference donations).
    Donor,
    /// Event benefited this recipient (cross-reference donations).
    Recipient,
    /// Free-form participation role, stored uppercase.
    Role(String),
}

impl EdgeLabel {
    /// Returns the wire string stored in the `label` column.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Meets => "MEETS",
            Self::TravelsTo => "TRAVELS_TO",
            Self::Contributes => "CONTRIBUTES",
            Self::Donor => "DONOR",
            Self::Recipient => "RECIPIENT",
            Self::Role(role) => role,
        }
    }
}

impl TryFrom<String> for EdgeLabel {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ValidationError::EmptyEdgeLabel);
        }
        Ok(match value {
            "MEETS" => Self::Meets,
            "TRAVELS_TO" => Self::TravelsTo,
            "CONTRIBUTES" => Self::Contributes,
            "DONOR" => Self::Donor,
            "RECIPIENT" => Self::Recipient,
            other => Self::Role(other.to_uppercase()),
        })
    }
}

impl From<EdgeLabel> for String {
    fn from(value: EdgeLabel) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A canonical `Person` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonRow {
    /// Stable row id.
    pub id: PersonId,
    /// Tenant the row belongs to.
    pub tenant_code: TenantCode,
    /// Canonical tax-id, present only when a valid one was sighted.
    pub tax_id: Option<String>,
    /// Canonical matching form of the name.
    pub normalized_name: String,
    /// Given names as reported by the source.
    pub given_names: Option<String>,
    /// Family names as reported by the source.
    pub family_names: Option<String>,
    /// Display name.
    pub full_name: String,
    /// Job title or position, when a source reported one.
    pub title: Option<String>,
    /// Source system that first sighted this row.
    pub source: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A canonical `Organisation` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganisationRow {
    /// Stable row id.
    pub id: OrgId,
    /// Tenant the row belongs to.
    pub tenant_code: TenantCode,
    /// Canonical tax-id, present only when a valid one was sighted.
    pub tax_id: Option<String>,
    /// Canonical matching form of the name.
    pub normalized_name: String,
    /// Display name.
    pub name: String,
    /// Free-text classification ("ministry", "company", ...).
    #[serde(rename = "type")]
    pub org_type: Option<String>,
    /// Source system that first sighted this row.
    pub source: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// An `Event` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRow {
    /// Stable row id.
    pub id: EventId,
    /// Tenant the row belongs to.
    pub tenant_code: TenantCode,
    /// Source-assigned stable identifier, unique per (tenant, kind).
    pub external_id: String,
    /// Kind tag, part of the natural key.
    pub kind: EventKind,
    /// When the event took place, if known.
    pub date: Option<DateTime<Utc>>,
    /// Source-specific JSON payload.
    pub metadata: serde_json::Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// An `Edge` row.
///
/// Endpoint columns obey the XOR rule: exactly one of the `to` columns
/// is set, and at most one of the `from` columns. A NULL `from` pair
/// means the edge originates at the event itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRow {
    /// Stable row id.
    pub id: EdgeId,
    /// Tenant the row belongs to.
    pub tenant_code: TenantCode,
    /// Event this edge belongs to.
    pub event_id: EventId,
    /// Origin person, if the edge starts at a person.
    pub from_person_id: Option<PersonId>,
    /// Origin organisation, if the edge starts at an organisation.
    pub from_org_id: Option<OrgId>,
    /// Target person, if the edge points at a person.
    pub to_person_id: Option<PersonId>,
    /// Target organisation, if the edge points at an organisation.
    pub to_org_id: Option<OrgId>,
    /// Typed label.
    pub label: EdgeLabel,
    /// Source-specific JSON payload.
    pub metadata: serde_json::Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Input for a `Person` upsert.
#[derive(Debug, Clone)]
pub struct PersonDraft {
    /// Tenant to upsert into.
    pub tenant_code: TenantCode,
    /// Only valid canonical tax-ids are attached; invalid ones are
    /// dropped at normalization.
    pub tax_id: Option<TaxId>,
    /// Canonical matching form of the name.
    pub normalized_name: String,
    /// Given names as reported by the source.
    pub given_names: Option<String>,
    /// Family names as reported by the source.
    pub family_names: Option<String>,
    /// Display name.
    pub full_name: String,
    /// Job title or position.
    pub title: Option<String>,
    /// Source system tag.
    pub source: Option<String>,
}

/// Input for an `Organisation` upsert.
#[derive(Debug, Clone)]
pub struct OrganisationDraft {
    /// Tenant to upsert into.
    pub tenant_code: TenantCode,
    /// Only valid canonical tax-ids are attached.
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

/// Input for an `Event` upsert.
#[derive(Debug, Clone)]
pub struct EventDraft {
    /// Tenant to upsert into.
    pub tenant_code: TenantCode,
    /// Source-assigned stable identifier.
    pub external_id: String,
    /// Kind tag, part of the natural key.
    pub kind: EventKind,
    /// When the event took place, if known.
    pub date: Option<DateTime<Utc>>,
    /// Source-specific JSON payload.
    pub metadata: serde_json::Value,
}

/// Input for an `Edge` upsert.
#[derive(Debug, Clone)]
pub struct EdgeDraft {
    /// Tenant to upsert into.
    pub tenant_code: TenantCode,
    /// Event this edge belongs to.
    pub event_id: EventId,
    /// Origin person.
    pub from_person_id: Option<PersonId>,
    /// Origin organisation.
    pub from_org_id: Option<OrgId>,
    /// Target person.
    pub to_person_id: Option<PersonId>,
    /// Target organisation.
    pub to_org_id: Option<OrgId>,
    /// Typed label.
    pub label: EdgeLabel,
    /// Source-specific JSON payload.
    pub metadata: serde_json::Value,
}

impl EdgeDraft {
    /// Checks the endpoint XOR rule.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EdgeEndpointConflict`] if both `from`
    /// columns are set, or if the `to` columns are not exactly one.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let from_set =
            usize::from(self.from_person_id.is_some()) + usize::from(self.from_org_id.is_some());
        let to_set =
            usize::from(self.to_person_id.is_some()) + usize::from(self.to_org_id.is_some());
        if from_set > 1 || to_set != 1 {
            return Err(ValidationError::EdgeEndpointConflict { from_set, to_set });
        }
        Ok(())
    }

    /// Natural key used for duplicate suppression:
    /// `(eventId, fromPersonId, fromOrgId, toPersonId, toOrgId, label)`.
    #[must_use]
    pub fn natural_key(&self) -> EdgeKey {
        EdgeKey {
            event_id: self.event_id,
            from_person_id: self.from_person_id,
            from_org_id: self.from_org_id,
            to_person_id: self.to_person_id,
            to_org_id: self.to_org_id,
            label: self.label.clone(),
        }
    }
}

/// Natural key of an edge row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    /// Event this edge belongs to.
    pub event_id: EventId,
    /// Origin person.
    pub from_person_id: Option<PersonId>,
    /// Origin organisation.
    pub from_org_id: Option<OrgId>,
    /// Target person.
    pub to_person_id: Option<PersonId>,
    /// Target organisation.
    pub to_org_id: Option<OrgId>,
    /// Typed label.
    pub label: EdgeLabel,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantCode {
        TenantCode::new("CL").unwrap()
    }

    #[test]
    fn test_person_id_roundtrip() {
        let uuid = Uuid::new_v4();
        let id = PersonId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), &uuid);
        assert_eq!(Uuid::from(id), uuid);
        assert_ne!(PersonId::new(), PersonId::new());
    }

    #[test]
    fn test_event_kind_wire_strings() {
        assert_eq!(EventKind::Meeting.as_str(), "meeting");
        assert_eq!(EventKind::Travel.as_str(), "travel");
        assert_eq!(EventKind::Donation.as_str(), "donation");

        let parsed = EventKind::try_from("Meeting".to_string()).unwrap();
        assert_eq!(parsed, EventKind::Meeting);

        let other = EventKind::try_from("hearing".to_string()).unwrap();
        assert_eq!(other, EventKind::Other("hearing".to_string()));

        assert!(EventKind::try_from("  ".to_string()).is_err());
    }

    #[test]
    fn test_edge_label_wire_strings() {
        assert_eq!(EdgeLabel::Meets.as_str(), "MEETS");
        assert_eq!(EdgeLabel::TravelsTo.as_str(), "TRAVELS_TO");
        assert_eq!(EdgeLabel::Contributes.as_str(), "CONTRIBUTES");

        let parsed = EdgeLabel::try_from("RECIPIENT".to_string()).unwrap();
        assert_eq!(parsed, EdgeLabel::Recipient);

        let role = EdgeLabel::try_from("official".to_string()).unwrap();
        assert_eq!(role, EdgeLabel::Role("OFFICIAL".to_string()));

        assert!(EdgeLabel::try_from(String::new()).is_err());
    }

    #[test]
    fn test_row_serializes_camel_case_columns() {
        let row = PersonRow {
            id: PersonId::new(),
            tenant_code: tenant(),
            tax_id: Some("12345678-5".to_string()),
            normalized_name: "juan perez".to_string(),
            given_names: Some("Juan".to_string()),
            family_names: Some("Perez".to_string()),
            full_name: "Juan Perez".to_string(),
            title: None,
            source: Some("lobby".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert!(json.get("tenantCode").is_some());
        assert!(json.get("taxId").is_some());
        assert!(json.get("normalizedName").is_some());
        assert!(json.get("fullName").is_some());
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_organisation_type_column_name() {
        let row = OrganisationRow {
            id: OrgId::new(),
            tenant_code: tenant(),
            tax_id: None,
            normalized_name: "ministerio de hacienda".to_string(),
            name: "Ministerio de Hacienda".to_string(),
            org_type: Some("ministry".to_string()),
            source: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json.get("type").unwrap(), "ministry");
    }

    #[test]
    fn test_edge_row_column_names() {
        let row = EdgeRow {
            id: EdgeId::new(),
            tenant_code: tenant(),
            event_id: EventId::new(),
            from_person_id: Some(PersonId::new()),
            from_org_id: None,
            to_person_id: None,
            to_org_id: Some(OrgId::new()),
            label: EdgeLabel::Meets,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert!(json.get("fromPersonId").is_some());
        assert!(json.get("toOrgId").is_some());
        assert_eq!(json.get("label").unwrap(), "MEETS");
    }

    fn edge_draft(
        from_person: Option<PersonId>,
        from_org: Option<OrgId>,
        to_person: Option<PersonId>,
        to_org: Option<OrgId>,
    ) -> EdgeDraft {
        EdgeDraft {
            tenant_code: tenant(),
            event_id: EventId::new(),
            from_person_id: from_person,
            from_org_id: from_org,
            to_person_id: to_person,
            to_org_id: to_org,
            label: EdgeLabel::Meets,
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn test_edge_validate_accepts_event_origin() {
        let draft = edge_draft(None, None, Some(PersonId::new()), None);
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn test_edge_validate_accepts_entity_to_entity() {
        let draft = edge_draft(Some(PersonId::new()), None, None, Some(OrgId::new()));
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn test_edge_validate_rejects_double_from() {
        let draft = edge_draft(
            Some(PersonId::new()),
            Some(OrgId::new()),
            Some(PersonId::new()),
            None,
        );
        assert!(draft.validate().is_err());
    }

    #[test]
    fn test_edge_validate_rejects_missing_or_double_to() {
        let none = edge_draft(Some(PersonId::new()), None, None, None);
        assert!(none.validate().is_err());

        let both = edge_draft(None, None, Some(PersonId::new()), Some(OrgId::new()));
        assert!(both.validate().is_err());
    }

    #[test]
    fn test_edge_natural_key_equality() {
        let event = EventId::new();
        let person = PersonId::new();
        let mut a = edge_draft(None, None, Some(person), None);
        a.event_id = event;
        let mut b = edge_draft(None, None, Some(person), None);
        b.event_id = event;
        assert_eq!(a.natural_key(), b.natural_key());

        b.label = EdgeLabel::Recipient;
        assert_ne!(a.natural_key(), b.natural_key());
    }
}
