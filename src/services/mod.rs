pub mod activity_service;
pub mod balance_service;
pub mod idempotency_service;
pub mod ledger_service;
pub mod undo_service;

pub use activity_service::*;
pub use balance_service::*;
pub use idempotency_service::IdempotencyService;
pub use ledger_service::*;
pub use undo_service::*;
