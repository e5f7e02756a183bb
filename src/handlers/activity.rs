use crate::middlewares::current_staff;
use crate::models::*;
use crate::services::ActivityService;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

#[utoipa::path(
    get,
    path = "/activity",
    tag = "activity",
    params(
        ("days" = Option<u32>, Query, description = "回看天数，默认 7，最大 90")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取商家流水动态成功", body = ActivityFeed),
        (status = 401, description = "未授权"),
        (status = 403, description = "员工无权限")
    )
)]
pub async fn get_activity(
    activity_service: web::Data<ActivityService>,
    req: HttpRequest,
    query: web::Query<ActivityQuery>,
) -> Result<HttpResponse> {
    let staff = match current_staff(&req) {
        Ok(s) => s,
        Err(e) => return Ok(e.error_response()),
    };

    match activity_service
        .activity_feed(staff.business_id, Some(staff.staff_id), query.get_days())
        .await
    {
        Ok(feed) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": feed
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn activity_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/activity").route("", web::get().to(get_activity)));
}
