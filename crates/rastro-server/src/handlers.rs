//! HTTP handlers: track queries, driver directory, health, metrics.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rastro_core::{DriverId, HubError, Location};
use rastro_hub::{DriverProfile, NewDriver};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::health::{self, HealthResponse};
use crate::server::AppState;

/// Hub error rendered as `{"error": "..."}` with a matching status.
#[derive(Debug)]
pub struct ApiError(HubError);

impl From<HubError> for ApiError {
    fn from(e: HubError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(HubError::Malformed(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            HubError::NotFound(_) => StatusCode::NOT_FOUND,
            HubError::Malformed(_) => StatusCode::BAD_REQUEST,
            HubError::Conflict(_) => StatusCode::CONFLICT,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// One row of `GET /tracks`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackEntry {
    pub driver_id: DriverId,
    #[serde(flatten)]
    pub location: Location,
}

/// Body of `PUT /drivers/{id}/location`.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct LocationUpdate {
    pub latitude: f64,
    pub longitude: f64,
}

/// GET /drivers/{id}/track
pub async fn get_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Location>, ApiError> {
    let id = DriverId::from_raw(id);
    let location = state.engine.store().get(&id)?;
    debug!(driver_id = %id, "track served");
    Ok(Json(location))
}

/// GET /tracks
pub async fn list_tracks(State(state): State<AppState>) -> Json<Vec<TrackEntry>> {
    let tracks = state
        .engine
        .store()
        .snapshot()
        .into_iter()
        .map(|(driver_id, location)| TrackEntry { driver_id, location })
        .collect();
    Json(tracks)
}

/// GET /drivers
pub async fn list_drivers(State(state): State<AppState>) -> Json<Vec<DriverProfile>> {
    Json(state.directory.list())
}

/// GET /drivers/{id}
pub async fn get_driver(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DriverProfile>, ApiError> {
    Ok(Json(state.directory.get(&DriverId::from_raw(id))?))
}

/// POST /drivers
pub async fn create_driver(
    State(state): State<AppState>,
    payload: Result<Json<NewDriver>, JsonRejection>,
) -> Result<(StatusCode, Json<DriverProfile>), ApiError> {
    let Json(new) = payload?;
    let profile = state.directory.create(new)?;
    debug!(driver_id = %profile.id, "driver created");
    Ok((StatusCode::CREATED, Json(profile)))
}

/// PUT /drivers/{id}/location
pub async fn update_driver_location(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<LocationUpdate>, JsonRejection>,
) -> Result<Json<DriverProfile>, ApiError> {
    let Json(update) = payload?;
    let profile = state.directory.update_location(
        &DriverId::from_raw(id),
        update.latitude,
        update.longitude,
    )?;
    Ok(Json(profile))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.engine.registry().len(),
        state.engine.store().len(),
    ))
}

/// GET /metrics
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::ServerConfig;
    use crate::server::RastroServer;

    fn server() -> RastroServer {
        RastroServer::new(ServerConfig::default())
    }

    async fn call(server: &RastroServer, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if body.is_some() {
            req = req.header(header::CONTENT_TYPE, "application/json");
        }
        let req = req
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_owned())))
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn track_of_unknown_driver_is_404() {
        let server = server();
        let (status, body) = call(&server, Method::GET, "/drivers/d1/track", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not found: d1");
    }

    #[tokio::test]
    async fn track_returns_last_published_location() {
        let server = server();
        server.engine().publish("d1".into(), Location::new(1.0, 2.0, 100));

        let (status, body) = call(&server, Method::GET, "/drivers/d1/track", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"latitude": 1.0, "longitude": 2.0, "timestamp": 100}));
    }

    #[tokio::test]
    async fn tracks_lists_every_driver() {
        let server = server();
        server.engine().publish("b".into(), Location::new(2.0, 2.0, 2));
        server.engine().publish("a".into(), Location::new(1.0, 1.0, 1));

        let (status, body) = call(&server, Method::GET, "/tracks", None).await;
        assert_eq!(status, StatusCode::OK);
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["driver_id"], "a");
        assert_eq!(rows[0]["timestamp"], 1);
    }

    #[tokio::test]
    async fn create_then_get_driver() {
        let server = server();
        let (status, created) = call(
            &server,
            Method::POST,
            "/drivers",
            Some(r#"{"id":"d1","name":"Ana","vehicle":"truck","license":"XYZ9A87"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["name"], "Ana");

        let (status, fetched) = call(&server, Method::GET, "/drivers/d1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched, created);

        let (status, all) = call(&server, Method::GET, "/drivers", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(all.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_driver_is_409() {
        let server = server();
        let body = r#"{"id":"d1","name":"Ana"}"#;
        let _ = call(&server, Method::POST, "/drivers", Some(body)).await;
        let (status, _) = call(&server, Method::POST, "/drivers", Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn malformed_driver_body_is_400() {
        let server = server();
        let (status, body) = call(&server, Method::POST, "/drivers", Some(r#"{"name":1}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("malformed message"));
    }

    #[tokio::test]
    async fn update_driver_location() {
        let server = server();
        let _ = call(&server, Method::POST, "/drivers", Some(r#"{"id":"d1","name":"Ana"}"#)).await;

        let (status, body) = call(
            &server,
            Method::PUT,
            "/drivers/d1/location",
            Some(r#"{"latitude":-23.55,"longitude":-46.63}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["latitude"], -23.55);
        assert_eq!(body["longitude"], -46.63);
    }

    #[tokio::test]
    async fn update_unknown_driver_is_404() {
        let server = server();
        let (status, _) = call(
            &server,
            Method::PUT,
            "/drivers/ghost/location",
            Some(r#"{"latitude":0.0,"longitude":0.0}"#),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let server = server();
        server.engine().publish("d1".into(), Location::new(0.5, 0.5, 1));
        let (status, body) = call(&server, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["tracked_drivers"], 1);
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_404() {
        let server = server();
        let (status, _) = call(&server, Method::GET, "/metrics", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
