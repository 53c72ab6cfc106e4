//! Tenant scoping.
//!
//! Every row in the canonical graph carries a tenant code, and every
//! lookup, index build, and upsert is scoped to exactly one tenant.
//! Rows from different tenants never match each other.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Jurisdiction/tenant code that partitions the canonical graph.
///
/// Codes are short uppercase identifiers such as `"CL"`. The code is
/// part of every natural key, so the same tax-id or normalized name in
/// two tenants refers to two unrelated rows.
///
/// # Examples
///
/// ```
/// use lobbygraph::TenantCode;
///
/// let tenant = TenantCode::new("CL").unwrap();
/// assert_eq!(tenant.as_str(), "CL");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantCode(String);

impl TenantCode {
    /// Creates a tenant code from a raw string.
    ///
    /// The input is trimmed and uppercased.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyTenantCode`] if the trimmed input
    /// is empty.
    pub fn new(code: impl Into<String>) -> Result<Self, ValidationError> {
        let code = code.into();
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyTenantCode);
        }
        Ok(Self(trimmed.to_uppercase()))
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for TenantCode {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
