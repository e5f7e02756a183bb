use actix_cors::Cors;

/// 终端与后台面板跨域配置
pub fn create_cors() -> Cors {
    Cors::default()
        .allowed_origin_fn(|_, _req_head| true)
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        // 允许 Idempotency-Key 等自定义 Header
        .allow_any_header()
        .max_age(3600)
}
