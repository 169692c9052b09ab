//! Request and response shapes exchanged with callers.
//!
//! Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

use cert_registry_core::{
    CertificateId, CoreError, EventId, NewCertificate, Owner, OwnerColumns, OwnerType,
};

/// Flat issue request: a discriminator plus the legacy-style reference
/// columns. Exactly the column matching `owner_type` must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    pub event_id: EventId,
    pub owner_type: OwnerType,
    #[serde(flatten)]
    pub references: OwnerColumns,
}

impl IssueRequest {
    pub fn into_new_certificate(self) -> Result<NewCertificate, CoreError> {
        Ok(NewCertificate {
            event_id: self.event_id,
            owner: Owner::from_columns(self.owner_type, &self.references)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeRequest {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReissueRequest {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReissueRequest {
    pub certificate_ids: Vec<String>,
    pub reason: String,
}

/// Outcome for one id of a bulk reissue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItemResult {
    pub certificate_id: CertificateId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_version: Option<u32>,
}

impl BulkItemResult {
    pub fn succeeded(certificate_id: CertificateId, new_version: u32) -> Self {
        Self {
            certificate_id,
            success: true,
            error: None,
            new_version: Some(new_version),
        }
    }

    pub fn failed(certificate_id: CertificateId, error: impl Into<String>) -> Self {
        Self {
            certificate_id,
            success: false,
            error: Some(error.into()),
            new_version: None,
        }
    }
}

/// Bulk reissue report. Results are in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReissueReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<BulkItemResult>,
}

impl BulkReissueReport {
    pub fn from_results(results: Vec<BulkItemResult>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            results,
        }
    }
}
