//! Input validation for lifecycle requests.
//!
//! Bulk requests are validated as a whole before any certificate is touched:
//! an empty list, a malformed id or a missing reason aborts the call.

use crate::error::ValidationError;
use crate::types::CertificateId;

/// Limits applied to caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkLimits {
    pub max_items: usize,
    pub max_reason_len: usize,
}

impl Default for BulkLimits {
    fn default() -> Self {
        Self {
            max_items: 100,
            max_reason_len: 500,
        }
    }
}

/// Validate a reason string and return it trimmed.
pub fn validate_reason(reason: &str, max_len: usize) -> Result<&str, ValidationError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingReason);
    }
    if trimmed.chars().count() > max_len {
        return Err(ValidationError::ReasonTooLong { max: max_len });
    }
    Ok(trimmed)
}

/// Parse a single certificate id supplied by a caller.
pub fn parse_certificate_id(raw: &str) -> Result<CertificateId, ValidationError> {
    raw.trim()
        .parse()
        .map_err(|_| ValidationError::MalformedCertificateId(raw.to_string()))
}

/// Validate a bulk request, returning the parsed ids in input order and the
/// trimmed reason.
pub fn validate_bulk_request<'a>(
    ids: &[String],
    reason: &'a str,
    limits: BulkLimits,
) -> Result<(Vec<CertificateId>, &'a str), ValidationError> {
    if ids.is_empty() {
        return Err(ValidationError::EmptyIdList);
    }
    if ids.len() > limits.max_items {
        return Err(ValidationError::TooManyIds {
            max: limits.max_items,
            got: ids.len(),
        });
    }

    let parsed = ids
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            raw.trim()
                .parse::<CertificateId>()
                .map_err(|_| ValidationError::MalformedId {
                    index,
                    value: raw.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let reason = validate_reason(reason, limits.max_reason_len)?;
    Ok((parsed, reason))
}
