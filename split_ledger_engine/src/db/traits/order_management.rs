use crate::{
    db::traits::{InsertOrderResult, SplitLedgerError},
    db_types::{NewOrder, Order, OrderId, OrderUpdate},
};

/// Orders belong to the order subsystem. The split engine only reads them, but the write methods here let the order
/// subsystem (and test harnesses) keep the backend's copy current.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, SplitLedgerError>;

    /// Stores a new order. This call is idempotent: if the order already exists, it is returned unchanged.
    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrderResult, SplitLedgerError>;

    /// Updates the status fields of an order and returns the updated record.
    async fn update_order(&self, order_id: &OrderId, update: OrderUpdate) -> Result<Order, SplitLedgerError>;
}
