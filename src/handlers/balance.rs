use crate::middlewares::current_staff;
use crate::models::*;
use crate::services::BalanceService;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

#[utoipa::path(
    get,
    path = "/customers/{customer_id}/balance",
    tag = "balance",
    params(
        ("customer_id" = i64, Path, description = "顾客ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取余额成功", body = BalanceResponse),
        (status = 401, description = "未授权"),
        (status = 403, description = "员工无权限"),
        (status = 404, description = "顾客不存在")
    )
)]
pub async fn get_balance(
    balance_service: web::Data<BalanceService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let staff = match current_staff(&req) {
        Ok(s) => s,
        Err(e) => return Ok(e.error_response()),
    };

    match balance_service
        .get_balance(path.into_inner(), staff.business_id, staff.staff_id)
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/customers/{customer_id}/balance/audit",
    tag = "balance",
    params(
        ("customer_id" = i64, Path, description = "顾客ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "余额审计结果", body = BalanceAudit),
        (status = 401, description = "未授权"),
        (status = 403, description = "员工无权限"),
        (status = 404, description = "顾客不存在")
    )
)]
pub async fn audit_balance(
    balance_service: web::Data<BalanceService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let staff = match current_staff(&req) {
        Ok(s) => s,
        Err(e) => return Ok(e.error_response()),
    };

    match balance_service
        .audit_balance(path.into_inner(), staff.business_id, staff.staff_id)
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn balance_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/customers/{customer_id}")
            .route("/balance", web::get().to(get_balance))
            .route("/balance/audit", web::get().to(audit_balance)),
    );
}
