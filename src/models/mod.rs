pub mod activity;
pub mod balance;
pub mod common;
pub mod ledger;

pub use activity::*;
pub use balance::*;
pub use common::*;
pub use ledger::*;
