use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;
use validator::Validate;

use crate::application::{AccountService, CreateAccountRequest, UpdateAccountRequest};
use crate::domain::AccountError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Business outcomes become 4xx with their message; infrastructure faults are
/// logged and hidden behind a generic 500.
pub fn error_response(err: AccountError) -> ApiError {
    let (status, kind) = match &err {
        AccountError::InvalidFormat(_) => (StatusCode::BAD_REQUEST, "invalid_format"),
        AccountError::InvalidCpf(_) => (StatusCode::BAD_REQUEST, "invalid_cpf"),
        AccountError::DuplicateCpf(_) => (StatusCode::BAD_REQUEST, "duplicate_cpf"),
        AccountError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
        AccountError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        AccountError::InternalFailure(detail) => {
            error!(%detail, "request failed with internal error");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(
                    "internal_error",
                    "An unexpected error occurred",
                )),
            );
        }
    };
    (status, Json(ErrorResponse::new(kind, err.to_string())))
}

fn validation_error(errors: validator::ValidationErrors) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new("invalid_argument", errors.to_string())),
    )
}

fn body_error(rejection: JsonRejection) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new("invalid_request", rejection.body_text())),
    )
}

fn not_found(id: Uuid) -> ApiError {
    error_response(AccountError::NotFound(id))
}

pub async fn list_accounts(
    State(service): State<Arc<AccountService>>,
) -> Result<impl IntoResponse, ApiError> {
    let accounts = service.list_accounts().await.map_err(error_response)?;
    Ok(Json(accounts))
}

pub async fn get_account(
    State(service): State<Arc<AccountService>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    match service.get_account(id).await {
        Ok(Some(account)) => Ok(Json(account)),
        Ok(None) => Err(not_found(id)),
        Err(e) => Err(error_response(e)),
    }
}

pub async fn create_account(
    State(service): State<Arc<AccountService>>,
    payload: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload.map_err(body_error)?;
    payload.validate().map_err(validation_error)?;

    let account = service
        .create_account(&payload.holder_name, payload.cpf.as_deref())
        .await
        .map_err(error_response)?;

    let location = format!("/api/accounts/{}", account.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(account),
    ))
}

pub async fn update_account(
    State(service): State<Arc<AccountService>>,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateAccountRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload.map_err(body_error)?;
    payload.validate().map_err(validation_error)?;

    service
        .update_account(id, &payload.holder_name)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn activate_account(
    State(service): State<Arc<AccountService>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    service
        .activate_account(id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn deactivate_account(
    State(service): State<Arc<AccountService>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    service
        .deactivate_account(id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn remove_account(
    State(service): State<Arc<AccountService>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    match service.remove_account(id).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(not_found(id)),
        Err(e) => Err(error_response(e)),
    }
}

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now(),
    }))
}

pub async fn metrics(State(service): State<Arc<AccountService>>) -> impl IntoResponse {
    let cache = service.cache();
    let cache_metrics = cache.metrics();
    let service_metrics = service.metrics();
    Json(serde_json::json!({
        "cache": {
            "entries": cache.len(),
            "hits": cache_metrics.hits.load(Ordering::Relaxed),
            "misses": cache_metrics.misses.load(Ordering::Relaxed),
            "sets": cache_metrics.sets.load(Ordering::Relaxed),
            "evictions": cache_metrics.evictions.load(Ordering::Relaxed),
            "errors": cache_metrics.errors.load(Ordering::Relaxed),
            "hit_rate": cache_metrics.hit_rate(),
        },
        "service": {
            "operations_processed": service_metrics.operations_processed.load(Ordering::Relaxed),
            "operations_failed": service_metrics.operations_failed.load(Ordering::Relaxed),
            "store_reads": service_metrics.store_reads.load(Ordering::Relaxed),
        },
    }))
}
