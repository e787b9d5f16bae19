use crate::{
    db::traits::SplitLedgerError,
    db_types::{AuditEntry, NewAuditEntry, OrderId},
};

/// A sink for audit records. Audit records are written after the financial transaction has committed, so a failure
/// here never rolls anything back.
#[allow(async_fn_in_trait)]
pub trait AuditLog {
    async fn record_audit(&self, entry: NewAuditEntry) -> Result<(), SplitLedgerError>;

    /// Fetches the audit trail for the order, oldest first.
    async fn fetch_audit_log(&self, order_id: &OrderId) -> Result<Vec<AuditEntry>, SplitLedgerError>;
}
