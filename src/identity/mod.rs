//! Identity normalization.
//!
//! Raw source data spells the same person or organisation many ways:
//! accented and unaccented names, tax-ids with or without separators,
//! inconsistent casing. This module reduces both kinds of identifier to
//! a canonical form so that the resolver can match on exact equality.

pub mod name;
pub mod tax_id;

pub use name::normalize_name;
pub use tax_id::{
    CheckDigitValidator, IdentityNormalizer, Modulo11, NormalizedTaxId, TaxId,
};
