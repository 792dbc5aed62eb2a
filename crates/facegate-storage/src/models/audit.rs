use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One confirmed unlock in the audit trail.
///
/// Only unlocks that actually moved the lock are recorded; manual opens and
/// confirmations arriving while the door was already open are not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditEntry {
    pub id: i64,

    /// Identity whose confirmation opened the lock.
    pub name: String,

    /// When the lock opened.
    pub opened_at: DateTime<Utc>,
}
