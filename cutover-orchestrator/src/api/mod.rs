//! API Module
//!
//! HTTP operator API for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod deployment;
pub mod error;
pub mod health;
pub mod run;
pub mod service;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::{DeploymentController, PipelineController};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<PipelineController>,
    pub deployments: Arc<DeploymentController>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Run endpoints
        .route("/api/run", post(run::trigger_run))
        .route("/api/run/list", get(run::list_runs))
        .route("/api/run/{id}", get(run::get_run))
        // Deployment endpoints
        .route("/api/deployment/list", get(deployment::list_deployments))
        .route("/api/deployment/{id}", get(deployment::get_deployment))
        .route(
            "/api/deployment/{id}/cancel",
            post(deployment::cancel_deployment),
        )
        .route(
            "/api/deployment/{id}/resolve",
            post(deployment::resolve_deployment),
        )
        // Service endpoints
        .route("/api/service/{name}", get(service::get_service_status))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{
        InMemoryArtifactStore, InMemoryProvisioner, InMemoryTrafficRouter, ScriptedHealthSource,
        StaticBuildExecutor, StaticSource,
    };
    use crate::repository::{InMemoryDeploymentRepository, InMemoryRunRepository};
    use crate::service::{DeployRequest, DeploySettings, ServiceCatalog};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use cutover_core::domain::retry::RetryPolicy;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    const SERVICES: &str = r#"[{
        "name": "web",
        "repository": "https://example.com/web.git",
        "build": { "image": "amazonlinux:2" },
        "task": { "image": "IMAGE1_NAME" },
        "incumbent_pool": { "id": "web-blue-0", "endpoint": null }
    }]"#;

    async fn state() -> AppState {
        let catalog = Arc::new(ServiceCatalog::from_json(SERVICES).unwrap());
        let deployments = Arc::new(DeploymentController::new(
            Arc::new(InMemoryProvisioner::new()),
            Arc::new(InMemoryTrafficRouter::new()),
            Arc::new(ScriptedHealthSource::passing()),
            Arc::new(InMemoryDeploymentRepository::new()),
            DeploySettings {
                observation_window: Duration::from_secs(1),
                ..DeploySettings::default()
            },
        ));
        for service in catalog.iter() {
            deployments.register_service(service).await.unwrap();
        }
        let pipeline = Arc::new(PipelineController::new(
            catalog,
            Arc::new(StaticSource::new().with_revision("main", "abc123")),
            Arc::new(StaticBuildExecutor::image("registry/web:abc123")),
            Arc::new(InMemoryArtifactStore::new()),
            deployments.clone(),
            Arc::new(InMemoryRunRepository::new()),
            RetryPolicy::default(),
        ));
        AppState {
            pipeline,
            deployments,
        }
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .expect("request");

        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(state().await);
        let (status, _) = send(app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_trigger_run_is_accepted() {
        let state = state().await;
        let app = create_router(state.clone());

        let (status, body) = send(
            app.clone(),
            "POST",
            "/api/run",
            Some(serde_json::json!({ "service": "web" })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "Pending");
        assert_eq!(body["branch"], "main");

        let id = body["id"].as_str().unwrap().to_string();
        let (status, body) = send(app.clone(), "GET", &format!("/api/run/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id.as_str());

        let (status, body) = send(app, "GET", "/api/run/list", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let app = create_router(state().await);

        let (status, body) = send(
            app.clone(),
            "POST",
            "/api/run",
            Some(serde_json::json!({ "service": "missing" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unknown service 'missing'");

        let missing = uuid::Uuid::new_v4();
        let (status, _) = send(app.clone(), "GET", &format!("/api/run/{}", missing), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            app.clone(),
            "GET",
            &format!("/api/deployment/{}", missing),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(app, "GET", "/api/service/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_service_status() {
        let app = create_router(state().await);
        let (status, body) = send(app, "GET", "/api/service/web", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["incumbent_color"], "Blue");
        assert_eq!(body["weights"]["blue"], 100);
        assert_eq!(body["in_flight_deployment"], Value::Null);
    }

    #[tokio::test]
    async fn test_cancel_and_resolve() {
        let state = state().await;
        let app = create_router(state.clone());

        let catalog = ServiceCatalog::from_json(SERVICES).unwrap();
        let service = catalog.get("web").unwrap();
        let req = DeployRequest::for_service(service, service.task.with_image("registry/web:1"));
        let deployment = state.deployments.begin(&req).await.unwrap();

        // A held service shows its lease
        let (_, body) = send(app.clone(), "GET", "/api/service/web", None).await;
        assert_eq!(body["in_flight_deployment"], deployment.id.to_string());

        // Resolve needs a note, and only applies to stuck deployments
        let uri = format!("/api/deployment/{}/resolve", deployment.id);
        let (status, _) = send(
            app.clone(),
            "POST",
            &uri,
            Some(serde_json::json!({ "note": " " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, body) = send(
            app.clone(),
            "POST",
            &uri,
            Some(serde_json::json!({ "note": "fixed" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("Provisioning"));

        let (status, body) = send(
            app.clone(),
            "POST",
            &format!("/api/deployment/{}/cancel", deployment.id),
            Some(serde_json::json!({ "reason": "wrong image" })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["state"], "Provisioning");

        let (status, body) = send(app, "GET", "/api/deployment/list", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["image"], "registry/web:1");
    }
}
