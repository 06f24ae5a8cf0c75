use std::net::SocketAddr;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth, observations, state::AppState, telemetry};

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(auth::router())
        .merge(observations::router())
        .merge(telemetry::router())
        .route("/health", get(health))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        extract::FromRef,
        http::{header, Method, Request, StatusCode},
    };
    use time::{Duration, OffsetDateTime};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::{
        auth::{
            claims::{Claims, Role, Tier},
            jwt::JwtKeys,
        },
        observations::repo_types::{Observation, ObservationFields},
    };

    struct TestApp {
        state: AppState,
        router: Router,
    }

    impl TestApp {
        fn new() -> Self {
            let state = AppState::fake();
            let router = build_app(state.clone());
            Self { state, router }
        }

        fn token(&self, role: Role, tier: Tier, buoy_id: Option<&str>) -> String {
            let now = OffsetDateTime::now_utc();
            let keys = JwtKeys::from_ref(&self.state);
            keys.encode(&Claims {
                sub: Uuid::new_v4(),
                role,
                tier,
                buoy_id: buoy_id.map(Into::into),
                iat: now.unix_timestamp() as usize,
                exp: (now + Duration::minutes(5)).unix_timestamp() as usize,
                iss: keys.issuer.clone(),
                aud: keys.audience.clone(),
            })
            .unwrap()
        }

        fn admin(&self) -> String {
            self.token(Role::Admin, Tier::Raw, None)
        }

        async fn call(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut req = Request::builder().method(method).uri(uri);
            if let Some(t) = token {
                req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
            }
            let req = match body {
                Some(b) => req
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(b.to_string())),
                None => req.body(Body::empty()),
            }
            .unwrap();

            let res = self.router.clone().oneshot(req).await.unwrap();
            let status = res.status();
            let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }

        async fn seed(&self, lat: f64, lon: f64, raw_payload: Option<Value>) -> Observation {
            let now = OffsetDateTime::now_utc();
            let mut fields = ObservationFields::at(now, lat, lon);
            fields.buoy_id = Some("BW-1".into());
            self.state
                .observations
                .insert(&Observation::new(fields, raw_payload, now))
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let app = TestApp::new();
        let (status, body) = app.call(Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn guards_reject_missing_token_role_and_tier() {
        let app = TestApp::new();
        let (status, body) = app.call(Method::GET, "/observations", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["kind"], "unauthorized");

        let (status, _) = app
            .call(Method::GET, "/observations", Some("not-a-jwt"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let researcher = app.token(Role::Researcher, Tier::Processed, None);
        let (status, body) = app
            .call(
                Method::POST,
                "/observations",
                Some(&researcher),
                Some(json!({"observed_at": "2025-08-26T09:10:00Z", "latitude": 0.0, "longitude": 0.0})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Forbidden: insufficient role");

        let (status, body) = app.call(Method::GET, "/telemetry", Some(&researcher), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Forbidden: insufficient data tier");
    }

    #[tokio::test]
    async fn bbox_returns_only_records_inside() {
        let app = TestApp::new();
        let inside = app.seed(-1.0, 36.6, None).await;
        app.seed(5.0, 36.6, None).await;
        app.seed(-1.0, 40.0, None).await;

        let token = app.token(Role::Researcher, Tier::Processed, None);
        let (status, body) = app
            .call(Method::GET, "/observations?bbox=-2,36.5,0,37", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["page"], 1);
        assert_eq!(body["page_size"], 50);
        assert_eq!(body["items"][0]["id"], inside.id.to_string());

        let (status, body) = app
            .call(Method::GET, "/observations?bbox=1,2,3", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["field"], "bbox");
    }

    #[tokio::test]
    async fn overshooting_page_snaps_back() {
        let app = TestApp::new();
        for i in 0..3 {
            app.seed(f64::from(i), 0.0, None).await;
        }
        let token = app.token(Role::Researcher, Tier::Processed, None);
        let (_, body) = app
            .call(Method::GET, "/observations?page=9&page_size=2", Some(&token), None)
            .await;
        assert_eq!(body["page"], 2);
        assert_eq!(body["total"], 3);
        assert_eq!(body["items"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bulk_create_partial_failure_is_207() {
        let app = TestApp::new();
        let (status, body) = app
            .call(
                Method::POST,
                "/observations/bulk",
                Some(&app.admin()),
                Some(json!({"items": [
                    {"buoy_id": "BW-1", "observed_at": "2025-08-26T09:10:00Z", "latitude": -1.0, "longitude": 36.6},
                    {"observed_at": "2025-08-26T09:10:00Z", "latitude": -1.0, "longitude": 36.6}
                ]})),
            )
            .await;
        assert_eq!(status, StatusCode::MULTI_STATUS);
        assert_eq!(body["created"].as_array().unwrap().len(), 1);
        assert_eq!(body["errors"].as_array().unwrap().len(), 1);
        assert_eq!(body["errors"][0]["index"], 1);
        assert_eq!(body["errors"][0]["error"], "Missing required field 'buoy_id'");

        let (status, _) = app
            .call(
                Method::POST,
                "/observations/bulk",
                Some(&app.admin()),
                Some(json!({"items": [{"buoy_id": "BW-1", "latitude": 0.0, "longitude": 0.0}]})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn device_buoy_binding_wins() {
        let app = TestApp::new();
        let device = app.token(Role::Device, Tier::Processed, Some("BW-DEV-0001"));
        let (status, body) = app
            .call(
                Method::POST,
                "/observations",
                Some(&device),
                Some(json!({
                    "buoy_id": "SPOOFED",
                    "observed_at": "2025-08-26T09:10:00Z",
                    "latitude": -1.0,
                    "longitude": 36.6
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["buoy_id"], "BW-DEV-0001");

        let id: Uuid = body["id"].as_str().unwrap().parse().unwrap();
        let stored = app.state.observations.get(id).await.unwrap().unwrap();
        assert_eq!(stored.fields.buoy_id.as_deref(), Some("BW-DEV-0001"));
    }

    #[tokio::test]
    async fn telemetry_rejects_malformed_start() {
        let app = TestApp::new();
        let token = app.token(Role::Researcher, Tier::Raw, None);
        let (status, body) = app
            .call(Method::GET, "/telemetry?start=not-a-date", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "invalid_parameter");
        assert_eq!(body["field"], "start");
    }

    #[tokio::test]
    async fn telemetry_blank_observed_at_is_invalid() {
        let app = TestApp::new();
        let (status, body) = app
            .call(
                Method::POST,
                "/telemetry",
                Some(&app.admin()),
                Some(json!({"observed_at": "", "latitude": 0.0, "longitude": 0.0})),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["field"], "observed_at");
    }

    #[tokio::test]
    async fn telemetry_ingest_then_read_raw() {
        let app = TestApp::new();
        let device = app.token(Role::Device, Tier::Processed, Some("BW-DEV-0001"));
        let (status, body) = app
            .call(
                Method::POST,
                "/telemetry",
                Some(&device),
                Some(json!({
                    "latitude": -1.0,
                    "longitude": 36.6,
                    "observed_at": "2025-08-26T12:10:00+03:00",
                    "sensors": {"turbidity": 1.2, "calibrated_at": "2025-08-01 06:00:00"}
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Ingested");
        let id = body["id"].as_str().unwrap().to_string();

        let raw = app.token(Role::Researcher, Tier::Raw, None);
        let (status, body) = app
            .call(Method::GET, &format!("/telemetry/{id}"), Some(&raw), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["buoy_id"], "BW-DEV-0001");
        assert_eq!(body["observed_at"], "2025-08-26T09:10:00Z");
        assert_eq!(body["raw_payload"]["sensors"]["turbidity"], 1.2);
        assert_eq!(body["raw_payload"]["observed_at"], "2025-08-26T12:10:00+03:00");
        assert_eq!(body["raw_payload"]["sensors"]["calibrated_at"], "2025-08-01 06:00:00");

        let (_, body) = app.call(Method::GET, "/telemetry?buoy_id=BW-DEV-0001", Some(&raw), None).await;
        assert_eq!(body["total"], 1);
        assert!(body["items"][0].get("air_temp_c").is_none());
    }

    #[tokio::test]
    async fn processed_tier_never_sees_raw_payload() {
        let app = TestApp::new();
        let obs = app
            .seed(0.0, 0.0, Some(json!({"sensors": {"turbidity": 1.2}})))
            .await;
        let uri = format!("/observations/{}", obs.id);

        let processed = app.token(Role::Researcher, Tier::Processed, None);
        let (_, body) = app.call(Method::GET, &uri, Some(&processed), None).await;
        assert!(body.get("raw_payload").is_none());
        assert_eq!(body["id"], obs.id.to_string());
        let (_, body) = app.call(Method::GET, "/observations", Some(&processed), None).await;
        assert!(body["items"][0].get("raw_payload").is_none());

        let raw = app.token(Role::Researcher, Tier::Raw, None);
        let (_, body) = app.call(Method::GET, &uri, Some(&raw), None).await;
        assert_eq!(body["raw_payload"]["sensors"]["turbidity"], 1.2);

        let admin_processed = app.token(Role::Admin, Tier::Processed, None);
        let (_, body) = app.call(Method::GET, &uri, Some(&admin_processed), None).await;
        assert!(body.get("raw_payload").is_some());
    }

    #[tokio::test]
    async fn admin_edits_and_deletes() {
        let app = TestApp::new();
        let obs = app.seed(0.0, 0.0, None).await;
        let uri = format!("/observations/{}", obs.id);
        let admin = app.admin();

        let (status, body) = app
            .call(Method::PATCH, &uri, Some(&admin), Some(json!({"air_temp_c": 24.5})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["air_temp_c"], 24.5);

        let (status, body) = app
            .call(Method::PATCH, &uri, Some(&admin), Some(json!({"latitude": null})))
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["field"], "latitude");

        let (status, body) = app.call(Method::DELETE, &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);

        let (status, body) = app.call(Method::GET, &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
    }

    #[tokio::test]
    async fn frozen_record_conflicts() {
        let app = TestApp::new();
        let old = OffsetDateTime::now_utc() - Duration::days(400);
        let obs = app
            .state
            .observations
            .insert(&Observation::new(ObservationFields::at(old, 0.0, 0.0), None, old))
            .await
            .unwrap();
        let (status, body) = app
            .call(
                Method::DELETE,
                &format!("/observations/{}", obs.id),
                Some(&app.admin()),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "conflict");
    }

    #[tokio::test]
    async fn register_login_me() {
        let app = TestApp::new();
        let (status, body) = app
            .call(
                Method::POST,
                "/auth/register",
                Some(&app.admin()),
                Some(json!({
                    "email": "buoy@bluewave.io",
                    "password": "Device123!",
                    "role": "device",
                    "tier": "processed",
                    "buoy_id": "BW-DEV-0001"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body.get("password_hash").is_none());

        let (status, body) = app
            .call(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({"email": "buoy@bluewave.io", "password": "Device123!"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "Bearer");
        let token = body["access_token"].as_str().unwrap().to_string();

        let (status, body) = app.call(Method::GET, "/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "buoy@bluewave.io");
        assert_eq!(body["buoy_id"], "BW-DEV-0001");

        let researcher = app.token(Role::Researcher, Tier::Raw, None);
        let (status, _) = app
            .call(
                Method::POST,
                "/auth/register",
                Some(&researcher),
                Some(json!({"email": "x@bluewave.io", "password": "Passw0rd!", "role": "researcher", "tier": "raw"})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
