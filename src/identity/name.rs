//! Name normalization for exact matching.
//!
//! All matching on names in the resolver is exact equality over this
//! normalized form. There is no fuzzy matching anywhere in the core.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalizes a raw display name into its canonical matching form.
///
/// The steps, in order:
///
/// 1. lowercase
/// 2. NFD decomposition, dropping combining marks (strips accents)
/// 3. punctuation and symbols become spaces
/// 4. whitespace runs collapse to a single space, edges trimmed
///
/// An input with no letters or digits normalizes to the empty string,
/// which callers treat as "no usable name".
///
/// # Examples
///
/// ```
/// use lobbygraph::normalize_name;
///
/// assert_eq!(normalize_name("  JUAN  PÉREZ "), "juan perez");
/// assert_eq!(normalize_name("Ministerio de Hacienda"), "ministerio de hacienda");
/// assert_eq!(normalize_name("O'Higgins, S.A."), "o higgins s a");
/// ```
#[must_use]
pub fn normalize_name(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let mut cleaned = String::with_capacity(lowered.len());

    for ch in lowered.nfd() {
        if is_combining_mark(ch) {
            continue;
        }
        if ch.is_alphanumeric() || ch == '_' {
            cleaned.push(ch);
        } else {
            cleaned.push(' ');
        }
    }

    // Collapse runs and trim in one pass.
    let mut out = String::with_capacity(cleaned.len());
    for word in cleaned.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}
