use crate::adapters::TokioTimeProvider;
use crate::assets;
use crate::auth::{AuthError, AuthState};
use crate::config;
use crate::ports::PushSender;
use crate::push as push_service;
use crate::realtime::OrderFeed;
use crate::state;
use crate::storage::{StoreError, SubscriptionStore};
use crate::watcher::{OrderWatcher, WatcherRegistry};

use axum::Json;
use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

mod notifications;
mod orders;
mod subscriptions;

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) details: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MessageResponse {
    pub(crate) message: &'static str,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid auth configuration: {0}")]
    Auth(#[from] AuthError),
    #[error("failed to open subscription store: {0}")]
    Store(#[from] StoreError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

pub fn app(config: config::AppConfig) -> Result<Router, StartupError> {
    let sender = push_service::sender_from_config(&config);
    let state = build_state(config, sender)?;
    Ok(router(state))
}

pub(crate) fn build_state<S: PushSender>(
    config: config::AppConfig,
    sender: Option<S>,
) -> Result<state::AppState<S>, StartupError> {
    let auth = AuthState::from_config(&config)?;
    if auth.is_none() {
        tracing::warn!("no JWT secret configured; authenticated endpoints will fail");
    }
    let subscriptions = match config.subscriptions_file.as_deref() {
        Some(path) => SubscriptionStore::open(path)?,
        None => SubscriptionStore::in_memory(),
    };
    let orders = OrderFeed::default();
    let watcher = OrderWatcher::new(
        orders.clone(),
        subscriptions.clone(),
        sender.clone(),
        TokioTimeProvider,
        config.origin.clone(),
    );

    Ok(state::AppState {
        config,
        auth,
        subscriptions,
        sender,
        orders,
        watcher,
        watchers: WatcherRegistry::default(),
    })
}

pub(crate) fn router<S: PushSender>(state: state::AppState<S>) -> Router {
    let save_subscription = post(subscriptions::save_subscription::<S>).fallback(method_not_allowed);
    let send_notification = post(notifications::send_notification::<S>).fallback(method_not_allowed);

    Router::new()
        .route("/api/push/public-key", get(notifications::public_key::<S>))
        .route("/api/push/subscriptions", save_subscription.clone())
        .route(
            "/.netlify/functions/save-subscription",
            save_subscription,
        )
        .route(
            "/api/push/subscriptions/me",
            get(subscriptions::my_subscription::<S>),
        )
        .route("/api/push/send", send_notification.clone())
        .route(
            "/.netlify/functions/send-push-notification",
            send_notification,
        )
        .route(
            "/api/realtime/orders",
            post(orders::ingest_order_change::<S>),
        )
        .route(
            "/api/vendor/notifications",
            get(orders::vendor_notifications::<S>).delete(orders::stop_vendor_notifications::<S>),
        )
        .route(
            "/api/vendor/notifications/viewed",
            post(orders::mark_orders_viewed::<S>),
        )
        .route("/sw.js", get(assets::service_worker))
        .route("/health", get(health))
        .with_state(state)
}

pub(crate) async fn health() -> &'static str {
    "ok"
}

async fn method_not_allowed() -> ApiError {
    api_error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

pub(crate) fn api_error(status: StatusCode, error: &'static str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error,
            details: None,
        }),
    )
}

/// Parses a JSON request body; an empty body reads as `{}`.
pub(crate) fn parse_json_body<T: DeserializeOwned + Default>(
    body: &[u8],
) -> Result<T, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
}

/// Resolves the caller's user id from the bearer token.
pub(crate) fn authenticated_user<S>(
    state: &state::AppState<S>,
    headers: &HeaderMap,
) -> Result<String, ApiError> {
    let auth = state.auth.as_ref().ok_or_else(|| {
        tracing::error!("bearer token received but no JWT secret is configured");
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Authentication is not configured",
        )
    })?;
    auth.user_from_headers(headers).map_err(|err| {
        tracing::debug!(error = %err, "rejected bearer token");
        api_error(StatusCode::UNAUTHORIZED, "Unauthorized")
    })
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use crate::auth::testing::token_for;
    use crate::push::testing::TestSender;
    use crate::types::push::StoredSubscription;
    use axum::body::Body;
    use axum::body::to_bytes;
    use axum::http::Request;
    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
    use serde_json::Value as JsonValue;
    use serde_json::from_slice as json_from_slice;
    use serde_json::json;
    use tower::ServiceExt;

    const SECRET: &str = "test-project-jwt-secret";
    const DESCRIPTOR: &str = r#"{"endpoint":"https://fcm.googleapis.com/fcm/send/abc123","expirationTime":null,"keys":{"p256dh":"BNcRdreALRFXTkOOUHK1EtK2wtaz5Ry4YfYCA_0QTpQtUbVlUls0VJXg7A8u-Ts1XbjhazAkj7I99e8QcYP7DkM","auth":"tBHItJI5svbpez7KI4CCXg"}}"#;

    fn auth_config() -> config::AppConfig {
        config::AppConfig {
            auth: Some(config::AuthConfig {
                jwt_secret: SECRET.to_string(),
                issuer: None,
            }),
            ..Default::default()
        }
    }

    fn test_app(config: config::AppConfig, sender: Option<TestSender>) -> Router {
        router(build_state(config, sender).expect("state"))
    }

    fn bearer(user: &str) -> String {
        format!("Bearer {}", token_for(SECRET, user))
    }

    async fn json_body(response: axum::response::Response) -> JsonValue {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        json_from_slice(&body).expect("parse json")
    }

    fn post_json(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    fn post_json_as(uri: &str, user: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, bearer(user))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn app__should_return_ok_on_health_endpoint() {
        // Given
        let app = app(config::AppConfig::default()).expect("app");

        // When
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        assert_eq!(body.as_ref(), b"ok");
    }

    #[tokio::test]
    async fn service_worker__should_be_served_without_caching() {
        // When
        let response = test_app(config::AppConfig::default(), None)
            .oneshot(Request::builder().uri("/sw.js").body(Body::empty()).unwrap())
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("cache-control").expect("cache header"),
            "no-cache"
        );
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = std::str::from_utf8(&body).expect("utf8");
        assert!(body.contains("addEventListener('push'"));
        assert!(body.contains("requireInteraction: true"));
    }

    #[tokio::test]
    async fn save_subscription__should_reject_non_post_methods() {
        for method in ["GET", "PUT", "DELETE", "PATCH"] {
            // When
            let response = test_app(auth_config(), None)
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri("/api/push/subscriptions")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .expect("request failed");

            // Then
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{method}");
            let payload = json_body(response).await;
            assert_eq!(payload["error"], "Method not allowed");
        }
    }

    #[tokio::test]
    async fn save_subscription__should_require_subscription_field() {
        for body in ["", "{}", r#"{"subscription":null}"#, "not json"] {
            // When
            let response = test_app(auth_config(), None)
                .oneshot(post_json_as(
                    "/api/push/subscriptions",
                    "vendor-1",
                    body.to_string(),
                ))
                .await
                .expect("request failed");

            // Then
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
            let payload = json_body(response).await;
            assert_eq!(payload["error"], "Missing subscription data");
        }
    }

    #[tokio::test]
    async fn save_subscription__should_reject_missing_or_invalid_token() {
        // Given
        let body = format!(r#"{{"subscription":{DESCRIPTOR}}}"#);
        let forged = Request::builder()
            .method("POST")
            .uri("/api/push/subscriptions")
            .header(
                AUTHORIZATION,
                format!("Bearer {}", token_for("another-secret", "vendor-1")),
            )
            .body(Body::from(body.clone()))
            .unwrap();

        // When
        let anonymous = test_app(auth_config(), None)
            .oneshot(post_json("/api/push/subscriptions", body))
            .await
            .expect("request failed");
        let forged = test_app(auth_config(), None)
            .oneshot(forged)
            .await
            .expect("request failed");

        // Then
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(forged).await["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn save_subscription__should_reject_incomplete_descriptor() {
        // When
        let response = test_app(auth_config(), None)
            .oneshot(post_json_as(
                "/api/push/subscriptions",
                "vendor-1",
                r#"{"subscription":{"endpoint":"https://push.example/1"}}"#.to_string(),
            ))
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Invalid subscription data");
    }

    #[tokio::test]
    async fn save_subscription__should_upsert_and_read_back_identical_descriptor() {
        // Given
        let app = test_app(auth_config(), None);
        let replaced = r#"{"endpoint":"https://push.example/old","keys":{"p256dh":"old","auth":"old"}}"#;

        // When
        let first = app
            .clone()
            .oneshot(post_json_as(
                "/api/push/subscriptions",
                "vendor-1",
                format!(r#"{{"subscription":{replaced}}}"#),
            ))
            .await
            .expect("request failed");
        let second = app
            .clone()
            .oneshot(post_json_as(
                "/.netlify/functions/save-subscription",
                "vendor-1",
                format!(r#"{{"subscription":{DESCRIPTOR}}}"#),
            ))
            .await
            .expect("request failed");
        let lookup = app
            .oneshot(
                Request::builder()
                    .uri("/api/push/subscriptions/me")
                    .header(AUTHORIZATION, bearer("vendor-1"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request failed");

        // Then
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(
            json_body(second).await["message"],
            "Subscription saved successfully"
        );
        assert_eq!(lookup.status(), StatusCode::OK);
        let body = to_bytes(lookup.into_body(), usize::MAX)
            .await
            .expect("read body");
        let stored: StoredSubscription = json_from_slice(&body).expect("stored record");
        assert_eq!(stored.user_id, "vendor-1");
        assert_eq!(stored.subscription.get(), DESCRIPTOR);
    }

    #[tokio::test]
    async fn save_subscription__should_persist_to_subscriptions_file() {
        // Given
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("umkm-push-app-store-{nanos}"));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("subscriptions.json");
        let config = config::AppConfig {
            subscriptions_file: Some(path.clone()),
            ..auth_config()
        };

        // When
        let response = test_app(config, None)
            .oneshot(post_json_as(
                "/api/push/subscriptions",
                "vendor-1",
                format!(r#"{{"subscription":{DESCRIPTOR}}}"#),
            ))
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::OK);
        let reopened = SubscriptionStore::open(&path).expect("reopen store");
        let stored = reopened.get("vendor-1").expect("get").expect("record");
        assert_eq!(stored.subscription.get(), DESCRIPTOR);

        std::fs::remove_dir_all(&dir).expect("cleanup");
    }

    #[tokio::test]
    async fn my_subscription__should_return_not_found_before_registration() {
        let response = test_app(auth_config(), None)
            .oneshot(
                Request::builder()
                    .uri("/api/push/subscriptions/me")
                    .header(AUTHORIZATION, bearer("customer-9"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request failed");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn save_subscription__should_hide_storage_failure_details() {
        // Given
        let unwritable = std::env::temp_dir()
            .join("umkm-push-missing-dir")
            .join("subscriptions.json");
        let config = config::AppConfig {
            subscriptions_file: Some(unwritable),
            ..auth_config()
        };

        // When
        let response = test_app(config, None)
            .oneshot(post_json_as(
                "/api/push/subscriptions",
                "vendor-1",
                format!(r#"{{"subscription":{DESCRIPTOR}}}"#),
            ))
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let payload = json_body(response).await;
        assert_eq!(payload["error"], "Failed to save subscription");
        assert!(payload.get("details").is_none());
    }

    #[tokio::test]
    async fn send_notification__should_require_both_fields() {
        let sender = TestSender::default();
        for body in [
            "{}".to_string(),
            format!(r#"{{"subscription":{DESCRIPTOR}}}"#),
            r#"{"notification":{"title":"T"}}"#.to_string(),
        ] {
            // When
            let response = test_app(config::AppConfig::default(), Some(sender.clone()))
                .oneshot(post_json("/api/push/send", body.clone()))
                .await
                .expect("request failed");

            // Then
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
            assert_eq!(
                json_body(response).await["error"],
                "Missing subscription or notification data"
            );
        }
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn send_notification__should_fail_without_vapid_keys() {
        for notification in [json!({"title": "T", "body": "B"}), json!({"title": 42})] {
            // Given
            let body = json!({
                "subscription": serde_json::from_str::<JsonValue>(DESCRIPTOR).expect("descriptor"),
                "notification": notification,
            });

            // When
            let response = app(config::AppConfig::default())
                .expect("app")
                .oneshot(post_json("/api/push/send", body.to_string()))
                .await
                .expect("request failed");

            // Then
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(json_body(response).await["error"], "VAPID keys not configured");
        }
    }

    #[tokio::test]
    async fn send_notification__should_deliver_normalized_payload() {
        // Given
        let sender = TestSender::default();
        let body = format!(
            r#"{{"subscription":{DESCRIPTOR},"notification":{{"title":"T","body":"B","data":{{"url":"/vendor/orders"}}}}}}"#
        );

        // When
        let response = test_app(config::AppConfig::default(), Some(sender.clone()))
            .oneshot(post_json("/.netlify/functions/send-push-notification", body))
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await["message"],
            "Push notification sent successfully"
        );
        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "https://fcm.googleapis.com/fcm/send/abc123");
        let payload: JsonValue = serde_json::from_str(&sent[0].1).expect("payload");
        assert_eq!(payload["title"], "T");
        assert_eq!(payload["requireInteraction"], true);
        assert_eq!(payload["tag"], push_service::DEFAULT_TAG);
        assert_eq!(payload["data"]["url"], "/vendor/orders");
    }

    #[tokio::test]
    async fn send_notification__should_accept_null_optional_fields() {
        // Given
        let sender = TestSender::default();
        let body = format!(
            r#"{{"subscription":{DESCRIPTOR},"notification":{{"title":"T","body":"B","data":null,"actions":null,"icon":""}}}}"#
        );

        // When
        let response = test_app(config::AppConfig::default(), Some(sender.clone()))
            .oneshot(post_json("/api/push/send", body))
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::OK);
        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        let payload: JsonValue = serde_json::from_str(&sent[0].1).expect("payload");
        assert_eq!(payload["data"], json!({}));
        assert_eq!(payload["icon"], push_service::DEFAULT_ICON);
    }

    #[tokio::test]
    async fn send_notification__should_reject_non_object_notification() {
        // Given
        let body = format!(r#"{{"subscription":{DESCRIPTOR},"notification":"hello"}}"#);

        // When
        let response = test_app(config::AppConfig::default(), Some(TestSender::default()))
            .oneshot(post_json("/api/push/send", body))
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Invalid notification data");
    }

    #[tokio::test]
    async fn send_notification__should_expose_delivery_error_details() {
        // Given
        let sender = TestSender::failing("push service responded 410 Gone");
        let body = format!(r#"{{"subscription":{DESCRIPTOR},"notification":{{"title":"T"}}}}"#);

        // When
        let response = test_app(config::AppConfig::default(), Some(sender))
            .oneshot(post_json("/api/push/send", body))
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let payload = json_body(response).await;
        assert_eq!(payload["error"], "Failed to send push notification");
        assert_eq!(payload["details"], "push service responded 410 Gone");
    }

    #[tokio::test]
    async fn send_notification__should_reject_non_post_methods() {
        let response = test_app(config::AppConfig::default(), Some(TestSender::default()))
            .oneshot(
                Request::builder()
                    .uri("/api/push/send")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request failed");

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn public_key__should_report_unconfigured_and_configured_keys() {
        // Given
        let configured = config::AppConfig {
            vapid_public_key: Some("BPpublic".to_string()),
            vapid_private_key: Some("private".to_string()),
            ..Default::default()
        };
        let request = || {
            Request::builder()
                .uri("/api/push/public-key")
                .body(Body::empty())
                .unwrap()
        };

        // When
        let missing = test_app(config::AppConfig::default(), None)
            .oneshot(request())
            .await
            .expect("request failed");
        let ready = test_app(configured, None)
            .oneshot(request())
            .await
            .expect("request failed");

        // Then
        assert_eq!(missing.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ready.status(), StatusCode::OK);
        assert_eq!(json_body(ready).await["publicKey"], "BPpublic");
    }

    #[tokio::test]
    async fn order_watcher__should_notify_vendor_and_reset_on_orders_view() {
        // Given
        let sender = TestSender::default();
        let app = test_app(auth_config(), Some(sender.clone()));
        let vendor = "vendor-1";
        let vendor_descriptor =
            r#"{"endpoint":"https://push.example/vendor-1","keys":{"p256dh":"p256","auth":"auth"}}"#;
        let saved = app
            .clone()
            .oneshot(post_json_as(
                "/api/push/subscriptions",
                vendor,
                format!(r#"{{"subscription":{vendor_descriptor}}}"#),
            ))
            .await
            .expect("request failed");
        assert_eq!(saved.status(), StatusCode::OK);
        let notifications = || {
            Request::builder()
                .uri("/api/vendor/notifications")
                .header(AUTHORIZATION, bearer(vendor))
                .body(Body::empty())
                .unwrap()
        };
        let started = app.clone().oneshot(notifications()).await.expect("request");
        assert_eq!(json_body(started).await["unread"], 0);

        // When
        let ingested = app
            .clone()
            .oneshot(post_json(
                "/api/realtime/orders",
                json!({
                    "type": "INSERT",
                    "table": "orders",
                    "record": {
                        "id": "order-1",
                        "customer_id": "customer-7",
                        "vendor_id": vendor,
                        "total_amount": 35000,
                        "status": "pending"
                    },
                    "old_record": null
                })
                .to_string(),
            ))
            .await
            .expect("request failed");
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        let after_order = app.clone().oneshot(notifications()).await.expect("request");

        // Then
        assert_eq!(ingested.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(ingested).await["delivered"], 1);
        let payload = json_body(after_order).await;
        assert_eq!(payload["unread"], 1);
        assert_eq!(payload["toasts"][0]["link"], "/vendor/orders");
        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "https://push.example/vendor-1");

        // When
        let viewed = app
            .clone()
            .oneshot(post_json_as(
                "/api/vendor/notifications/viewed",
                vendor,
                String::new(),
            ))
            .await
            .expect("request failed");

        // Then
        assert_eq!(json_body(viewed).await["unread"], 0);

        // When
        let stopped = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/vendor/notifications")
                    .header(AUTHORIZATION, bearer(vendor))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request failed");

        // Then
        assert_eq!(stopped.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn vendor_notifications__should_release_watchers_once_polling_stops() {
        // Given
        let state = build_state::<TestSender>(auth_config(), None).expect("state");
        let watchers = state.watchers.clone();
        let orders = state.orders.clone();
        let app = router(state);
        for index in 0..20 {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri("/api/vendor/notifications")
                        .header(AUTHORIZATION, bearer(&format!("user-{index}")))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .expect("request failed");
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(watchers.len(), 20);
        assert_eq!(orders.channel_count(), 20);

        // When
        let later = time::OffsetDateTime::now_utc() + time::Duration::minutes(10);
        let evicted = watchers.evict_stale(later, crate::watcher::POLL_TIMEOUT);

        // Then
        assert_eq!(evicted.len(), 20);
        assert!(watchers.is_empty());
        assert_eq!(orders.channel_count(), 0);
    }

    #[tokio::test]
    async fn ingest_order_change__should_check_webhook_secret() {
        // Given
        let config = config::AppConfig {
            webhook_secret: Some("hook-secret".to_string()),
            ..Default::default()
        };
        let body = json!({
            "type": "INSERT",
            "table": "orders",
            "record": {
                "id": "order-1",
                "customer_id": "customer-7",
                "vendor_id": "vendor-1",
                "status": "pending"
            }
        })
        .to_string();
        let signed = Request::builder()
            .method("POST")
            .uri("/api/realtime/orders")
            .header("x-webhook-secret", "hook-secret")
            .body(Body::from(body.clone()))
            .unwrap();

        // When
        let unsigned = test_app(config.clone(), None)
            .oneshot(post_json("/api/realtime/orders", body))
            .await
            .expect("request failed");
        let signed = test_app(config, None)
            .oneshot(signed)
            .await
            .expect("request failed");

        // Then
        assert_eq!(unsigned.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(signed.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(signed).await["delivered"], 0);
    }

    #[tokio::test]
    async fn ingest_order_change__should_reject_malformed_and_skip_other_tables() {
        // When
        let malformed = test_app(config::AppConfig::default(), None)
            .oneshot(post_json("/api/realtime/orders", "{}".to_string()))
            .await
            .expect("request failed");
        let other_table = test_app(config::AppConfig::default(), None)
            .oneshot(post_json(
                "/api/realtime/orders",
                json!({ "type": "INSERT", "table": "products", "record": null }).to_string(),
            ))
            .await
            .expect("request failed");

        // Then
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
        assert_eq!(other_table.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(other_table).await["delivered"], 0);
    }
}
