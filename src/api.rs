//! HTTP surface: the public alert listing with its caching contract, a
//! localized detail view, and the editor write path.
//!
//! The listing returns every stored alert, visible or not; deciding what
//! to show is the polling client's job.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use uuid::Uuid;

use crate::alerts::{WireAlert, resolve_timezone};
use crate::config::{Config, ConfigurationError};
use crate::store::{AlertInput, Store, StoreError};

/// Shared state handed to every handler.
pub struct Context {
    pub store: Store,
    pub config: Config,
}

/// How long a listing response may be reused before revalidation.
const LIST_MAX_AGE_SECS: u32 = 60;

pub fn routes(ctx: Arc<Context>) -> Router {
    let list_path = ctx.config.endpoint_path.clone();
    let item_path = format!("{list_path}/{{id}}");
    Router::new()
        .route(&list_path, get(list_alerts).post(create_alert))
        .route(
            &item_path,
            get(get_alert).put(update_alert).delete(delete_alert),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(CatchPanicLayer::new())
                .layer(CompressionLayer::new()),
        )
        .with_state(ctx)
}

/// GET handler for the listing.
///
/// The `ETag` is derived from the store generation, which changes whenever
/// any alert is created, updated or deleted.
async fn list_alerts(State(ctx): State<Arc<Context>>, headers: HeaderMap) -> Response {
    let (generation, alerts) = ctx.store.list_with_generation();
    let etag = format!("\"alerts-{generation}\"");
    let cache_control = format!("public, max-age={LIST_MAX_AGE_SECS}");

    if let Some(candidate) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        if candidate == etag {
            return (
                StatusCode::NOT_MODIFIED,
                [(header::CACHE_CONTROL, cache_control), (header::ETAG, etag)],
            )
                .into_response();
        }
    }

    let payload: Vec<WireAlert> = alerts.iter().map(|a| a.to_wire()).collect();
    (
        [(header::CACHE_CONTROL, cache_control), (header::ETAG, etag)],
        Json(payload),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct DetailParams {
    timezone: Option<String>,
}

/// One alert with its window rendered in the caller's timezone: the
/// requested zone when given, otherwise the configured site default.
#[derive(Debug, Serialize)]
struct LocalizedAlert {
    id: String,
    title: String,
    message: String,
    timezone: String,
    interval: LocalizedWindow,
}

#[derive(Debug, Serialize)]
struct LocalizedWindow {
    from: String,
    to: String,
}

async fn get_alert(
    State(ctx): State<Arc<Context>>,
    Path(id): Path<Uuid>,
    Query(params): Query<DetailParams>,
) -> Result<Json<LocalizedAlert>, ApiError> {
    let alert = ctx.store.get(id).ok_or(ApiError::NotFound(id))?;
    let tz = resolve_timezone(
        params.timezone.as_deref(),
        ctx.config.default_timezone.as_deref(),
    )?;
    let (from, to) = alert.window.localized(tz);
    Ok(Json(LocalizedAlert {
        id: alert.id.to_string(),
        title: alert.title,
        message: alert.message,
        timezone: tz.name().to_string(),
        interval: LocalizedWindow {
            from: from.to_rfc3339(),
            to: to.to_rfc3339(),
        },
    }))
}

#[derive(Debug, Deserialize)]
struct AlertPayload {
    title: String,
    #[serde(default)]
    message: String,
    interval: WindowPayload,
}

#[derive(Debug, Deserialize)]
struct WindowPayload {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl AlertPayload {
    fn into_input(self) -> AlertInput {
        AlertInput {
            title: self.title,
            message: self.message,
            from: self.interval.from,
            to: self.interval.to,
        }
    }
}

async fn create_alert(
    State(ctx): State<Arc<Context>>,
    Json(payload): Json<AlertPayload>,
) -> Result<(StatusCode, Json<WireAlert>), ApiError> {
    let alert = ctx.store.create(payload.into_input())?;
    Ok((StatusCode::CREATED, Json(alert.to_wire())))
}

async fn update_alert(
    State(ctx): State<Arc<Context>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AlertPayload>,
) -> Result<Json<WireAlert>, ApiError> {
    let alert = ctx.store.update(id, payload.into_input())?;
    Ok(Json(alert.to_wire()))
}

async fn delete_alert(
    State(ctx): State<Arc<Context>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    ctx.store.delete(id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Error surface of the handlers above.
pub enum ApiError {
    NotFound(Uuid),
    Invalid(crate::alerts::ValidationError),
    Internal(anyhow::Error),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> ApiError {
        match err {
            StoreError::NotFound(id) => ApiError::NotFound(id),
            StoreError::Invalid(err) => ApiError::Invalid(err),
        }
    }
}

impl From<ConfigurationError> for ApiError {
    fn from(err: ConfigurationError) -> ApiError {
        ApiError::Internal(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(id) => {
                (StatusCode::NOT_FOUND, format!("no alert with id {id}")).into_response()
            }
            ApiError::Invalid(err) => (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
            ApiError::Internal(err) => {
                tracing::error!("{err:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Something went wrong: {err}"),
                )
                    .into_response()
            }
        }
    }
}
