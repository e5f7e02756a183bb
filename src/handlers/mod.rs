pub mod activity;
pub mod balance;
pub mod ledger;

pub use activity::activity_config;
pub use balance::balance_config;
pub use ledger::ledger_config;

use crate::models::ApiResponse;
use actix_web::{HttpResponse, web};

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::success("ok"))
}

pub fn health_config(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health));
}
