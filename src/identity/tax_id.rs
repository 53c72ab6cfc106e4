//! Tax-id canonicalization and check-digit validation.
//!
//! The canonical form is `BODY-DV`: the numeric body without separators,
//! a single dash, and an uppercase check character. Check-digit schemes
//! vary by jurisdiction, so the scheme is a strategy injected into the
//! [`IdentityNormalizer`] at construction; the default is the módulo-11
//! scheme used by Chilean RUTs.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A canonicalized tax identifier in `BODY-DV` form.
///
/// Construction goes through [`IdentityNormalizer::normalize_tax_id`],
/// which guarantees the shape; validity of the check digit is reported
/// separately through [`NormalizedTaxId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxId(String);

impl TaxId {
    pub(crate) fn from_parts(body: &str, check: char) -> Self {
        Self(format!("{body}-{check}"))
    }

    /// Wraps a string already in canonical form. Used when rebuilding
    /// indexes from stored rows, which only ever hold canonical ids.
    pub(crate) fn from_canonical(canonical: impl Into<String>) -> Self {
        Self(canonical.into())
    }

    /// Returns the canonical `BODY-DV` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of tax-id normalization.
///
/// A well-formed identifier always canonicalizes, even when its check
/// digit is wrong; `valid` records whether the check digit verified.
/// Invalid ids are kept for display but never used as match keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTaxId {
    /// Canonical `BODY-DV` form.
    pub canonical: TaxId,
    /// True if the check digit verified against the body.
    pub valid: bool,
}

impl NormalizedTaxId {
    /// Returns the canonical tax-id if and only if the check digit
    /// verified.
    #[must_use]
    pub fn valid_id(&self) -> Option<&TaxId> {
        self.valid.then_some(&self.canonical)
    }
}

/// Check-digit scheme for a jurisdiction's tax identifiers.
///
/// Implementations are injected into [`IdentityNormalizer`]; the core
/// never consults process-global state to pick a scheme.
pub trait CheckDigitValidator: Send + Sync {
    /// Computes the expected check character for a numeric body, or
    /// `None` if the body is not computable under this scheme.
    fn expected_check(&self, body: &str) -> Option<char>;

    /// Returns true if `check` is the correct check character for
    /// `body`.
    fn validate(&self, body: &str, check: char) -> bool {
        self.expected_check(body) == Some(check)
    }
}

/// Módulo-11 check-digit scheme (Chilean RUT).
///
/// Digits are weighted 2, 3, 4, 5, 6, 7 cycling from the rightmost
/// digit of the body. The check is `11 - (sum mod 11)`, with 11 mapped
/// to `'0'` and 10 mapped to `'K'`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Modulo11;

impl CheckDigitValidator for Modulo11 {
    fn expected_check(&self, body: &str) -> Option<char> {
        if body.is_empty() {
            return None;
        }

        let mut sum: u32 = 0;
        let mut weight: u32 = 2;
        for ch in body.chars().rev() {
            let digit = ch.to_digit(10)?;
            sum += digit * weight;
            weight = if weight == 7 { 2 } else { weight + 1 };
        }

        Some(match 11 - (sum % 11) {
            11 => '0',
            10 => 'K',
            n => char::from_digit(n, 10)?,
        })
    }
}

/// Normalizes raw identifiers into canonical matching keys.
///
/// Holds the jurisdiction's check-digit scheme and the accepted tax-id
/// shape. One normalizer is built per batch and shared by the mapper
/// and the merge engine.
///
/// # Examples
///
/// ```
/// use lobbygraph::IdentityNormalizer;
///
/// let normalizer = IdentityNormalizer::default();
/// let norm = normalizer.normalize_tax_id("12.345.678-5").unwrap();
/// assert_eq!(norm.canonical.as_str(), "12345678-5");
/// assert!(norm.valid);
/// ```
pub struct IdentityNormalizer {
    validator: Box<dyn CheckDigitValidator>,
    shape: Regex,
}

impl IdentityNormalizer {
    /// Creates a normalizer with the given check-digit scheme.
    #[must_use]
    pub fn new(validator: Box<dyn CheckDigitValidator>) -> Self {
        // 1-8 digit body, optional dash, digit or K check character.
        // The shape is fixed; only the check-digit scheme varies.
        let shape = Regex::new(r"^(\d{1,8})-?([0-9K])$").expect("tax-id shape regex is a literal");
        Self { validator, shape }
    }

    /// Canonicalizes a raw tax identifier.
    ///
    /// Dots, spaces, and the optional dash are stripped and the check
    /// character uppercased before the shape check. Returns `None` for
    /// inputs that are not well-formed at all; well-formed inputs with
    /// a wrong check digit come back with `valid == false`.
    #[must_use]
    pub fn normalize_tax_id(&self, raw: &str) -> Option<NormalizedTaxId> {
        let cleaned: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, '.' | ' '))
            .collect::<String>()
            .to_uppercase();

        let captures = self.shape.captures(&cleaned)?;
        let body = captures.get(1)?.as_str();
        let check = captures.get(2)?.as_str().chars().next()?;

        Some(NormalizedTaxId {
            canonical: TaxId::from_parts(body, check),
            valid: self.validator.validate(body, check),
        })
    }

    /// Canonicalizes a raw tax identifier, returning it only when the
    /// check digit verified. Convenience for match-key construction.
    #[must_use]
    pub fn valid_tax_id(&self, raw: &str) -> Option<TaxId> {
        let norm = self.normalize_tax_id(raw)?;
        norm.valid.then_some(norm.canonical)
    }

    /// Normalizes a raw display name. See [`crate::normalize_name`].
    #[must_use]
    pub fn normalize_name(&self, raw: &str) -> String {
        super::name::normalize_name(raw)
    }
}

impl Default for IdentityNormalizer {
    fn default() -> Self {
        Self::new(Box::new(Modulo11))
    }
}

impl fmt::Debug for IdentityNormalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityNormalizer").finish_non_exhaustive()
    }
}
