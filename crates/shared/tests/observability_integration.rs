//! 可观测性模块集成测试
//!
//! 测试 metrics 与 middleware 模块的核心功能。

mod metrics_tests {
    use greenloop_shared::observability::metrics::{
        record_exchange_created, record_exchange_transition, record_http_request,
        record_recompute, record_redemption,
    };

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/api/v1/items", 200, 0.05);
        record_http_request("POST", "/api/v1/exchanges", 201, 0.12);
        record_http_request("PUT", "/api/v1/items/{id}", 200, 0.08);
        record_http_request("DELETE", "/api/v1/items/{id}", 204, 0.03);
        record_http_request("GET", "unmatched", 404, 0.01);
        record_http_request("POST", "/api/v1/rewards/redeem", 500, 0.25);
    }

    #[test]
    fn test_record_domain_metrics() {
        record_exchange_created();
        record_exchange_transition("accept", "ok");
        record_exchange_transition("complete", "rejected");
        record_redemption("user", "success");
        record_redemption("company", "out_of_stock");
        record_recompute("user");
    }
}

mod middleware_tests {
    use axum::{
        Extension, Router,
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
    };
    use greenloop_shared::observability::middleware::{
        REQUEST_ID_HEADER, RequestId, http_tracing, request_id,
    };
    use tower::ServiceExt;

    async fn echo_request_id(Extension(id): Extension<RequestId>) -> String {
        id.as_str().to_string()
    }

    fn app() -> Router {
        Router::new()
            .route("/items/{id}", get(echo_request_id))
            .layer(middleware::from_fn(http_tracing))
            .layer(middleware::from_fn(request_id))
    }

    #[tokio::test]
    async fn test_request_id_visible_to_handler() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/items/42")
                    .header(REQUEST_ID_HEADER, "trace-me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"trace-me");
    }

    #[tokio::test]
    async fn test_unmatched_route_still_gets_request_id() {
        let response = app()
            .oneshot(Request::builder().uri("/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }
}
