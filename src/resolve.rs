//! Deterministic identity resolution.
//!
//! Resolution is exact-match only, with a fixed priority: a valid
//! tax-id wins, a unique normalized name comes second, everything else
//! is a non-match. A name shared by several rows is ambiguous and
//! deliberately resolves to nothing; the resolver never guesses.

use std::collections::HashMap;

use serde::Serialize;

use crate::identity::{NormalizedTaxId, TaxId};
use crate::model::{OrgId, PersonId};
use crate::record::TargetClass;

/// How a reference matched, recorded in event metadata for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchMethod {
    /// Matched on a valid canonical tax-id.
    TaxId,
    /// Matched on a unique normalized name.
    Name,
    /// No match, or an ambiguous name.
    None,
}

impl MatchMethod {
    /// Returns the audit string stored in metadata.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TaxId => "TAX_ID",
            Self::Name => "NAME",
            Self::None => "NONE",
        }
    }
}

/// Outcome of resolving one reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match<Id> {
    /// Matched on a valid tax-id.
    TaxId(Id),
    /// Matched on a unique normalized name.
    Name(Id),
    /// No match. Ambiguous names land here too.
    None,
}

impl<Id: Copy> Match<Id> {
    /// Returns the matched id, if any.
    #[must_use]
    pub fn id(&self) -> Option<Id> {
        match self {
            Self::TaxId(id) | Self::Name(id) => Some(*id),
            Self::None => None,
        }
    }

    /// Returns the method tag for audit metadata.
    #[must_use]
    pub const fn method(&self) -> MatchMethod {
        match self {
            Self::TaxId(_) => MatchMethod::TaxId,
            Self::Name(_) => MatchMethod::Name,
            Self::None => MatchMethod::None,
        }
    }

    /// Returns true if nothing matched.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// In-memory lookup index over one canonical table, for one tenant.
///
/// Built once per batch from a [`crate::storage::GraphStore`] and then
/// queried for every reference; resolution never goes back to the
/// store. `by_tax_id` holds only valid canonical tax-ids. `by_name` is
/// a multi-map so that distinct rows sharing a name stay visible as a
/// collision instead of shadowing each other.
#[derive(Debug, Clone)]
pub struct LookupIndex<Id> {
    by_tax_id: HashMap<String, Id>,
    by_name: HashMap<String, Vec<Id>>,
}

impl<Id: Copy> LookupIndex<Id> {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_tax_id: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Adds one row to the index.
    ///
    /// `tax_id` must be the row's canonical valid tax-id, if it has
    /// one. Rows with an empty normalized name are indexed by tax-id
    /// only.
    pub fn insert(&mut self, tax_id: Option<&TaxId>, normalized_name: &str, id: Id) {
        if let Some(tax) = tax_id {
            self.by_tax_id.insert(tax.as_str().to_string(), id);
        }
        if !normalized_name.is_empty() {
            self.by_name
                .entry(normalized_name.to_string())
                .or_default()
                .push(id);
        }
    }

    /// Resolves a reference against the index.
    ///
    /// Tax-id first; a tax-id hit wins even when the name would have
    /// matched a different row. Name lookup matches only when exactly
    /// one row carries the name.
    #[must_use]
    pub fn resolve(&self, tax_id: Option<&TaxId>, normalized_name: &str) -> Match<Id> {
        if let Some(tax) = tax_id {
            if let Some(id) = self.by_tax_id.get(tax.as_str()) {
                return Match::TaxId(*id);
            }
        }
        if normalized_name.is_empty() {
            return Match::None;
        }
        match self.by_name.get(normalized_name) {
            Some(ids) if ids.len() == 1 => Match::Name(ids[0]),
            _ => Match::None,
        }
    }

    /// Number of rows indexed by name (collisions counted once per row).
    #[must_use]
    pub fn name_entries(&self) -> usize {
        self.by_name.values().map(Vec::len).sum()
    }

    /// Number of rows indexed by tax-id.
    #[must_use]
    pub fn tax_id_entries(&self) -> usize {
        self.by_tax_id.len()
    }
}

impl<Id: Copy> Default for LookupIndex<Id> {
    fn default() -> Self {
        Self::new()
    }
}

/// An id from either canonical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedEntity {
    /// A canonical person.
    Person(PersonId),
    /// A canonical organisation.
    Organisation(OrgId),
}

/// Resolves references against both canonical tables.
///
/// Borrows the per-batch indexes; one resolver serves a whole batch.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    /// Index over the tenant's `Person` rows.
    pub persons: &'a LookupIndex<PersonId>,
    /// Index over the tenant's `Organisation` rows.
    pub organisations: &'a LookupIndex<OrgId>,
}

impl Resolver<'_> {
    /// Resolves against the `Person` table. Invalid tax-ids are
    /// ignored as match keys.
    #[must_use]
    pub fn resolve_person(
        &self,
        tax_id: Option<&NormalizedTaxId>,
        normalized_name: &str,
    ) -> Match<PersonId> {
        let key = tax_id.and_then(NormalizedTaxId::valid_id);
        self.persons.resolve(key, normalized_name)
    }

    /// Resolves against the `Organisation` table.
    #[must_use]
    pub fn resolve_organisation(
        &self,
        tax_id: Option<&NormalizedTaxId>,
        normalized_name: &str,
    ) -> Match<OrgId> {
        let key = tax_id.and_then(NormalizedTaxId::valid_id);
        self.organisations.resolve(key, normalized_name)
    }

    /// Resolves against the table the target class selects.
    #[must_use]
    pub fn resolve(
        &self,
        class: TargetClass,
        tax_id: Option<&NormalizedTaxId>,
        normalized_name: &str,
    ) -> Match<ResolvedEntity> {
        match class {
            TargetClass::Person => match self.resolve_person(tax_id, normalized_name) {
                Match::TaxId(id) => Match::TaxId(ResolvedEntity::Person(id)),
                Match::Name(id) => Match::Name(ResolvedEntity::Person(id)),
                Match::None => Match::None,
            },
            TargetClass::Organisation => match self.resolve_organisation(tax_id, normalized_name) {
                Match::TaxId(id) => Match::TaxId(ResolvedEntity::Organisation(id)),
                Match::Name(id) => Match::Name(ResolvedEntity::Organisation(id)),
                Match::None => Match::None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityNormalizer;

    fn tax(raw: &str) -> TaxId {
        IdentityNormalizer::default()
            .valid_tax_id(raw)
            .expect("valid test tax-id")
    }

    fn norm(raw: &str) -> NormalizedTaxId {
        IdentityNormalizer::default()
            .normalize_tax_id(raw)
            .expect("well-formed test tax-id")
    }

    #[test]
    fn test_tax_id_match_wins() {
        let mut index = LookupIndex::new();
        let a = PersonId::new();
        let b = PersonId::new();
        index.insert(Some(&tax("12345678-5")), "juan perez", a);
        index.insert(None, "juan soto", b);

        // Tax-id points at a even though the name points at b.
        let m = index.resolve(Some(&tax("12345678-5")), "juan soto");
        assert_eq!(m, Match::TaxId(a));
        assert_eq!(m.method(), MatchMethod::TaxId);
    }

    #[test]
    fn test_unique_name_match() {
        let mut index = LookupIndex::new();
        let id = PersonId::new();
        index.insert(None, "juan perez", id);

        assert_eq!(index.resolve(None, "juan perez"), Match::Name(id));
        assert_eq!(index.resolve(None, "maria soto"), Match::None);
    }

    #[test]
    fn test_ambiguous_name_is_non_match() {
        let mut index = LookupIndex::new();
        index.insert(Some(&tax("11111111-1")), "juan perez", PersonId::new());
        index.insert(Some(&tax("12345678-5")), "juan perez", PersonId::new());

        let m = index.resolve(None, "juan perez");
        assert!(m.is_none());
        assert_eq!(m.method(), MatchMethod::None);
    }

    #[test]
    fn test_empty_name_never_matches() {
        let mut index: LookupIndex<PersonId> = LookupIndex::new();
        index.insert(None, "", PersonId::new());
        assert_eq!(index.name_entries(), 0);
        assert!(index.resolve(None, "").is_none());
    }

    #[test]
    fn test_resolver_ignores_invalid_tax_id() {
        let mut persons = LookupIndex::new();
        let id = PersonId::new();
        // Row indexed under the valid id for this body.
        persons.insert(Some(&tax("12345678-5")), "juan perez", id);
        let organisations = LookupIndex::new();
        let resolver = Resolver {
            persons: &persons,
            organisations: &organisations,
        };

        // Wrong check digit: the tax-id is not a key, but the unique
        // name still matches.
        let invalid = norm("12345678-0");
        assert!(!invalid.valid);
        assert_eq!(
            resolver.resolve_person(Some(&invalid), "juan perez"),
            Match::Name(id)
        );
    }

    #[test]
    fn test_resolver_routes_by_target_class() {
        let mut persons = LookupIndex::new();
        let person = PersonId::new();
        persons.insert(None, "juan perez", person);

        let mut organisations = LookupIndex::new();
        let org = OrgId::new();
        organisations.insert(None, "empresa abc", org);

        let resolver = Resolver {
            persons: &persons,
            organisations: &organisations,
        };

        assert_eq!(
            resolver.resolve(TargetClass::Person, None, "juan perez").id(),
            Some(ResolvedEntity::Person(person))
        );
        assert_eq!(
            resolver
                .resolve(TargetClass::Organisation, None, "empresa abc")
                .id(),
            Some(ResolvedEntity::Organisation(org))
        );
        // Class routing: a person name does not match in the org table.
        assert!(resolver
            .resolve(TargetClass::Organisation, None, "juan perez")
            .is_none());
    }
}
