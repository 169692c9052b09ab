//! Service configuration.

use serde::Deserialize;

use cert_registry_core::BulkLimits;

/// Configuration for the [`CertificateService`](crate::CertificateService).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Maximum number of ids accepted by a single bulk reissue.
    pub max_bulk_items: usize,
    /// Maximum reason length, in characters.
    pub max_reason_len: usize,
    /// Reject actors the directory cannot resolve.
    pub require_known_actor: bool,
}

impl ServiceConfig {
    pub fn limits(&self) -> BulkLimits {
        BulkLimits {
            max_items: self.max_bulk_items,
            max_reason_len: self.max_reason_len,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let limits = BulkLimits::default();
        Self {
            max_bulk_items: limits.max_items,
            max_reason_len: limits.max_reason_len,
            require_known_actor: true,
        }
    }
}
