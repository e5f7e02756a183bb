use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            )
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::ledger::record_earn,
        handlers::ledger::record_spend,
        handlers::ledger::undo_last_action,
        handlers::balance::get_balance,
        handlers::balance::audit_balance,
        handlers::activity::get_activity,
    ),
    components(
        schemas(
            EntryKind,
            EntryRef,
            EarnItem,
            RecordEarnRequest,
            RecordEarnResponse,
            SpendContext,
            RecordSpendRequest,
            RecordSpendResponse,
            ReversalResponse,
            LoyaltyTier,
            BalanceResponse,
            BalanceAudit,
            ActivityQuery,
            ActivityItem,
            ActivityDay,
            ActivityFeed,
            ApiError,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "ledger", description = "Earn, spend and undo API"),
        (name = "balance", description = "Customer balance API"),
        (name = "activity", description = "Business activity feed API"),
    ),
    info(
        title = "Loyalty Ledger API",
        version = "1.0.0",
        description = "Loyalty ledger REST API documentation",
    ),
    servers(
        (url = "/api/v1", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}
