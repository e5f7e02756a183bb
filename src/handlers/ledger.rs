use crate::middlewares::current_staff;
use crate::models::*;
use crate::services::{LedgerService, UndoService};
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

fn idempotency_key(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
}

#[utoipa::path(
    post,
    path = "/ledger/earn",
    tag = "ledger",
    request_body = RecordEarnRequest,
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "客户端幂等键")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "记录赚取成功", body = RecordEarnResponse),
        (status = 400, description = "请求参数错误"),
        (status = 401, description = "未授权"),
        (status = 403, description = "员工无权限")
    )
)]
pub async fn record_earn(
    ledger: web::Data<LedgerService>,
    req: HttpRequest,
    request: web::Json<RecordEarnRequest>,
) -> Result<HttpResponse> {
    let staff = match current_staff(&req) {
        Ok(s) => s,
        Err(e) => return Ok(e.error_response()),
    };
    let key = idempotency_key(&req);

    match ledger
        .record_earn(
            request.customer_id,
            staff.business_id,
            &request.items,
            Some(staff.staff_id),
            key.as_deref(),
        )
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
    post,
    path = "/ledger/spend",
    tag = "ledger",
    request_body = RecordSpendRequest,
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "客户端幂等键")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "记录消费成功", body = RecordSpendResponse),
        (status = 400, description = "请求参数错误"),
        (status = 401, description = "未授权"),
        (status = 409, description = "积分余额不足")
    )
)]
pub async fn record_spend(
    ledger: web::Data<LedgerService>,
    req: HttpRequest,
    request: web::Json<RecordSpendRequest>,
) -> Result<HttpResponse> {
    let staff = match current_staff(&req) {
        Ok(s) => s,
        Err(e) => return Ok(e.error_response()),
    };
    let key = idempotency_key(&req);

    match ledger
        .record_spend(
            request.customer_id,
            staff.business_id,
            request.points,
            request.context.as_ref(),
            Some(staff.staff_id),
            key.as_deref(),
        )
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
    post,
    path = "/ledger/undo",
    tag = "ledger",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "撤销成功", body = ReversalResponse),
        (status = 401, description = "未授权"),
        (status = 403, description = "员工无权限"),
        (status = 404, description = "没有可撤销的操作"),
        (status = 409, description = "积分已被使用，无法撤销")
    )
)]
pub async fn undo_last_action(
    undo_service: web::Data<UndoService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let staff = match current_staff(&req) {
        Ok(s) => s,
        Err(e) => return Ok(e.error_response()),
    };

    match undo_service.undo_last_action(staff.staff_id).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn ledger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/ledger")
            .route("/earn", web::post().to(record_earn))
            .route("/spend", web::post().to(record_spend))
            .route("/undo", web::post().to(undo_last_action)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{activity_config, balance_config};
    use crate::middlewares::AuthMiddleware;
    use crate::services::{ActivityService, BalanceService};
    use crate::test_support::{Fixture, fixture};
    use crate::utils::JwtService;
    use actix_web::{App, http::StatusCode, test};
    use serde_json::Value;

    macro_rules! test_app {
        ($fx:expr, $jwt:expr) => {
            test::init_service(
                App::new()
                    .wrap(AuthMiddleware::new($jwt.clone()))
                    .app_data(web::Data::new($fx.ledger.clone()))
                    .app_data(web::Data::new(UndoService::new($fx.ledger.clone())))
                    .app_data(web::Data::new(BalanceService::new($fx.db.clone())))
                    .app_data(web::Data::new(ActivityService::new($fx.ledger.clone())))
                    .service(
                        web::scope("/api/v1")
                            .configure(ledger_config)
                            .configure(balance_config)
                            .configure(activity_config),
                    ),
            )
            .await
        };
    }

    fn bearer(jwt: &JwtService, fx: &Fixture) -> (&'static str, String) {
        let token = jwt
            .generate_access_token(fx.staff.id, fx.business.id)
            .unwrap();
        ("Authorization", format!("Bearer {token}"))
    }

    #[actix_web::test]
    async fn test_earn_spend_undo_over_http() {
        let fx = fixture().await;
        let jwt = JwtService::new("secret", 3600);
        let app = test_app!(fx, jwt);

        let req = test::TestRequest::post()
            .uri("/api/v1/ledger/earn")
            .insert_header(bearer(&jwt, &fx))
            .set_json(json!({
                "customer_id": fx.customer.id,
                "items": [{"product_id": 3, "quantity": 1, "gross_amount": 1000, "points_earned": 100}]
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["new_balance"], 100);

        fx.clock.advance(chrono::Duration::seconds(3));
        let req = test::TestRequest::post()
            .uri("/api/v1/ledger/spend")
            .insert_header(bearer(&jwt, &fx))
            .set_json(json!({"customer_id": fx.customer.id, "points": 40}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["new_balance"], 60);

        let req = test::TestRequest::post()
            .uri("/api/v1/ledger/undo")
            .insert_header(bearer(&jwt, &fx))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["kind"], "spend");
        assert_eq!(body["data"]["new_balance"], 100);

        let req = test::TestRequest::post()
            .uri("/api/v1/ledger/undo")
            .insert_header(bearer(&jwt, &fx))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "NOTHING_TO_UNDO");

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/customers/{}/balance", fx.customer.id))
            .insert_header(bearer(&jwt, &fx))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["total_points"], 100);
        assert_eq!(body["data"]["tier"], "bronze");
    }

    #[actix_web::test]
    async fn test_insufficient_balance_is_conflict() {
        let fx = fixture().await;
        let jwt = JwtService::new("secret", 3600);
        let app = test_app!(fx, jwt);

        let req = test::TestRequest::post()
            .uri("/api/v1/ledger/spend")
            .insert_header(bearer(&jwt, &fx))
            .set_json(json!({"customer_id": fx.customer.id, "points": 5}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "INSUFFICIENT_BALANCE");
    }

    #[actix_web::test]
    async fn test_idempotency_header_replays() {
        let fx = fixture().await;
        let jwt = JwtService::new("secret", 3600);
        let app = test_app!(fx, jwt);
        let payload = json!({
            "customer_id": fx.customer.id,
            "items": [{"product_id": null, "quantity": 2, "gross_amount": 500, "points_earned": 50}]
        });

        let mut bodies = Vec::new();
        for _ in 0..2 {
            let req = test::TestRequest::post()
                .uri("/api/v1/ledger/earn")
                .insert_header(bearer(&jwt, &fx))
                .insert_header((IDEMPOTENCY_KEY_HEADER, "terminal-1-sale-77"))
                .set_json(payload.clone())
                .to_request();
            let body: Value = test::call_and_read_body_json(&app, req).await;
            bodies.push(body);
        }
        assert_eq!(bodies[0], bodies[1]);
        assert_eq!(bodies[1]["data"]["new_balance"], 50);
    }

    #[actix_web::test]
    async fn test_inactive_staff_token_is_forbidden() {
        let fx = fixture().await;
        let jwt = JwtService::new("secret", 3600);
        let app = test_app!(fx, jwt);
        let token = jwt
            .generate_access_token(fx.inactive_staff.id, fx.business.id)
            .unwrap();

        let req = test::TestRequest::post()
            .uri("/api/v1/ledger/undo")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        for path in ["balance", "balance/audit"] {
            let req = test::TestRequest::get()
                .uri(&format!("/api/v1/customers/{}/{path}", fx.customer.id))
                .insert_header(("Authorization", format!("Bearer {token}")))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        }
    }
}
