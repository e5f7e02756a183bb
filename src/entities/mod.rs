pub mod balances;
pub mod businesses;
pub mod customers;
pub mod idempotency_keys;
pub mod purchases;
pub mod staff;
pub mod undo_cursors;
pub mod usages;

pub use balances as balance_entity;
pub use businesses as business_entity;
pub use customers as customer_entity;
pub use idempotency_keys as idempotency_key_entity;
pub use purchases as purchase_entity;
pub use staff as staff_entity;
pub use undo_cursors as undo_cursor_entity;
pub use usages as usage_entity;
