//! Registry record model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An expiring key/value record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RegistryRecord {
    /// Record key (e.g. `workers:<id>`)
    pub key: String,

    /// JSON text
    pub value: String,

    /// Expiry as unix milliseconds
    pub expires_at: i64,
}
