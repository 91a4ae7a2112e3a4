// API module - HTTP endpoints

pub mod certificates;
pub mod fowls;
pub mod health;
pub mod middleware;
pub mod transfers;
pub mod users;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use middleware::state::AppState;

/// Builds the full application router
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .merge(users::router())
        .merge(fowls::router())
        .merge(transfers::router())
        .merge(certificates::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use secrecy::Secret;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::config::Config;
    use crate::db::Repositories;
    use crate::services::storage::MemoryObjectStore;

    fn test_app() -> Router {
        let config = Config {
            database_url: "postgres://unused".to_string(),
            database_max_connections: 1,
            base_url: "https://fowlmart.example".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            certificate_signing_key: Secret::new("test-key".to_string()),
            storage_root: "./unused".to_string(),
        };
        let state = AppState::new(
            Repositories::in_memory(),
            config,
            Arc::new(MemoryObjectStore::default()),
        );
        app(state)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        user: Option<Uuid>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            request = request.header("x-user-id", user.to_string());
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn create_user(app: &Router, name: &str) -> Uuid {
        let body = json!({ "display_name": name });
        let (status, body) = send(app, "POST", "/users", None, Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = test_app();
        let (status, body) = send(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_requires_caller_identity() {
        let app = test_app();
        let (status, _) = send(&app, "GET", "/transfers", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_transfer_flow_over_http() {
        let app = test_app();
        let seller = create_user(&app, "seller1").await;
        let buyer = create_user(&app, "buyer1").await;

        let (status, fowl) = send(
            &app,
            "POST",
            "/fowls",
            Some(seller),
            Some(json!({ "name": "Red", "breed": "Rhode Island Red", "gender": "MALE" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let fowl_id = fowl["id"].as_str().unwrap().to_string();

        let (status, transfer) = send(
            &app,
            "POST",
            "/transfers",
            Some(seller),
            Some(json!({
                "fowl_id": fowl_id,
                "to_user_id": buyer,
                "transfer_type": "SALE",
                "transfer_price": 5000,
                "verification_method": "DUAL_CONFIRMATION",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(transfer["status"], "PENDING");
        let transfer_id = transfer["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            "POST",
            &format!("/transfers/{}/confirm", transfer_id),
            Some(Uuid::new_v4()),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, state) = send(
            &app,
            "POST",
            &format!("/transfers/{}/confirm", transfer_id),
            Some(buyer),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state["transfer"]["status"], "BUYER_CONFIRMED");
        assert_eq!(state["role"], "buyer");

        let (status, _) = send(
            &app,
            "POST",
            &format!("/transfers/{}/confirm", transfer_id),
            Some(buyer),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, state) = send(
            &app,
            "POST",
            &format!("/transfers/{}/confirm", transfer_id),
            Some(seller),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state["is_complete"], true);
        let number = state["certificate"]["certificate_number"]
            .as_str()
            .unwrap()
            .to_string();
        let certificate_id = state["certificate"]["id"].as_str().unwrap().to_string();

        let verify_uri = format!("/certificates/verify/{}", number);
        let (status, result) = send(&app, "GET", &verify_uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["result"], "valid");

        let (status, _) = send(
            &app,
            "POST",
            &format!("/transfers/{}/cancel", transfer_id),
            Some(seller),
            Some(json!({ "reason": "too late" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, fowl) = send(&app, "GET", &format!("/fowls/{}", fowl_id), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fowl["owner_id"], buyer.to_string());

        let history_uri = format!("/fowls/{}/transfers", fowl_id);
        let (status, history) = send(&app, "GET", &history_uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len(), 1);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/certificates/{}/view", certificate_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(html.to_vec()).unwrap();
        assert!(html.contains(&number));
        assert!(html.contains("data:image/png;base64,"));

        let (status, revoked) = send(
            &app,
            "POST",
            &format!("/certificates/{}/revoke", certificate_id),
            Some(buyer),
            Some(json!({ "reason": "registered in error" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(revoked["revoked_reason"], "registered in error");

        let (_, result) = send(&app, "GET", &verify_uri, None, None).await;
        assert_eq!(result["result"], "revoked");
    }

    #[tokio::test]
    async fn test_cancel_requires_reason() {
        let app = test_app();
        let seller = create_user(&app, "seller1").await;
        let buyer = create_user(&app, "buyer1").await;
        let (_, fowl) = send(
            &app,
            "POST",
            "/fowls",
            Some(seller),
            Some(json!({ "name": "Blue", "breed": "Andalusian" })),
        )
        .await;

        let (_, transfer) = send(
            &app,
            "POST",
            "/transfers",
            Some(seller),
            Some(json!({
                "fowl_id": fowl["id"],
                "to_user_id": buyer,
                "transfer_type": "GIFT",
                "verification_method": "DUAL_CONFIRMATION",
            })),
        )
        .await;
        let uri = format!("/transfers/{}/cancel", transfer["id"].as_str().unwrap());

        let blank = json!({ "reason": "" });
        let (status, body) = send(&app, "POST", &uri, Some(buyer), Some(blank)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "A cancellation reason is required");

        let reason = json!({ "reason": "changed mind" });
        let (status, state) = send(&app, "POST", &uri, Some(buyer), Some(reason)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state["transfer"]["status"], "CANCELLED");
        assert_eq!(state["transfer"]["cancel_reason"], "changed mind");
    }

    #[tokio::test]
    async fn test_delete_own_account() {
        let app = test_app();
        let user = create_user(&app, "leaving").await;

        let (status, summary) = send(&app, "DELETE", "/users/me", Some(user), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["user_id"], user.to_string());

        let (status, _) = send(&app, "GET", &format!("/users/{}", user), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
