mod cron;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use newsbrief_sched::{SchedulerService, SchedulerState};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::middleware::{request_id, require_bearer_auth, AuthState};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<SchedulerService>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "conflict" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthData {
    status: &'static str,
    scheduler: SchedulerState,
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState) -> Router<AppState> {
    Router::new()
        .route("/cron/status", get(cron::status))
        .route("/cron/start", post(cron::start))
        .route("/cron/stop", post(cron::stop))
        .route("/cron/jobs/{job_id}/trigger", post(cron::trigger))
        .route("/cron/jobs/{job_id}/pause", post(cron::pause))
        .route("/cron/jobs/{job_id}/resume", post(cron::resume))
        .layer(axum::middleware::from_fn_with_state(
            auth,
            require_bearer_auth,
        ))
}

pub fn build_app(state: AppState, auth: AuthState) -> Router {
    let public_routes = Router::new().route("/healthz", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthData {
        status: "ok",
        scheduler: state.scheduler.state(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use newsbrief_sched::{job_handler, JobRegistry};
    use tower::ServiceExt;

    fn test_registry() -> JobRegistry {
        JobRegistry::new(
            job_handler(|| async { Ok(()) }),
            job_handler(|| async { Ok(()) }),
        )
    }

    fn dev_auth() -> AuthState {
        AuthState::from_env(true).expect("dev auth")
    }

    fn test_app() -> (Router, Arc<SchedulerService>) {
        let scheduler = Arc::new(SchedulerService::new(test_registry()));
        let app = build_app(
            AppState {
                scheduler: Arc::clone(&scheduler),
            },
            dev_auth(),
        );
        (app, scheduler)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json parse")
    }

    #[tokio::test]
    async fn healthz_is_public_and_reports_scheduler_state() {
        let (app, _scheduler) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"].as_str(), Some("ok"));
        assert_eq!(json["scheduler"].as_str(), Some("not_started"));
    }

    #[tokio::test]
    async fn status_before_start_is_empty_but_valid() {
        let (app, _scheduler) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/cron/status")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["state"].as_str(), Some("not_started"));
        assert_eq!(json["jobs"].as_array().map(Vec::len), Some(0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_registers_both_jobs() {
        let (app, scheduler) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/cron/start")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["state"].as_str(), Some("running"));
        let jobs = json["jobs"].as_array().expect("jobs array");
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0]["id"].as_str(), Some("github_trends"));
        assert_eq!(jobs[1]["id"].as_str(), Some("feeds_parser"));
        assert_eq!(jobs[0]["paused"].as_bool(), Some(false));
        assert!(jobs[0]["next_run_time"].is_string());

        scheduler.shutdown(false).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_discards_the_scheduler() {
        let (app, scheduler) = test_app();
        scheduler.ensure_started(false).await.expect("start");

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/cron/stop")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["state"].as_str(), Some("not_started"));
    }

    #[tokio::test]
    async fn unknown_job_id_is_404() {
        let (app, _scheduler) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/cron/jobs/not_a_real_job/trigger")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = json_body(response).await;
        assert_eq!(json["error"]["code"].as_str(), Some("not_found"));
    }

    #[tokio::test]
    async fn pause_without_scheduler_is_409() {
        let (app, _scheduler) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/cron/jobs/github_trends/pause")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = json_body(response).await;
        assert_eq!(json["error"]["code"].as_str(), Some("conflict"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pause_and_resume_round_trip() {
        let (app, scheduler) = test_app();
        scheduler.ensure_started(false).await.expect("start");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/cron/jobs/github_trends/pause")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["job"].as_str(), Some("github_trends"));
        assert_eq!(json["status"].as_str(), Some("paused"));

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/cron/jobs/github_trends/resume")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"].as_str(), Some("running"));

        scheduler.shutdown(false).await;
    }

    #[tokio::test]
    async fn trigger_works_without_a_running_scheduler() {
        let (app, _scheduler) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/cron/jobs/feeds_parser/trigger")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["job"].as_str(), Some("feeds_parser"));
        assert_eq!(json["status"].as_str(), Some("triggered"));
    }

    #[tokio::test]
    async fn protected_routes_reject_missing_token_when_auth_enabled() {
        let scheduler = Arc::new(SchedulerService::new(test_registry()));
        let auth = AuthState::from_raw("secret-token", false).expect("auth");
        let app = build_app(AppState { scheduler }, auth);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/cron/status")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/cron/status")
                    .header("authorization", "Bearer secret-token")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
