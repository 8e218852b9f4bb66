use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, put},
    Json, Router,
};
use chrono::Local;
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    ClasseId, LatenessId, LatenessUpdate, NewLateness, PrintRequest, RequestContext, UserRef,
};
use super::export::PartOfDay;
use super::query::{LatenessQuery, DEFAULT_TOP_LIMIT};
use super::repository::RepositoryError;
use super::service::{LatenessService, LatenessServiceError};
use super::settings::SettingsUpdate;
use super::triggers::{TriggerDraft, TriggerId, TriggerRegistryError};

const USER_HEADER: &str = "x-user";
const USER_NAME_HEADER: &str = "x-user-name";

/// Router exposing lateness recording, listing, settings, triggers and export.
pub fn lateness_router(service: Arc<LatenessService>) -> Router {
    Router::new()
        .route(
            "/api/v1/lateness",
            get(list_handler).post(record_handler),
        )
        .route("/api/v1/lateness/top", get(top_handler))
        .route(
            "/api/v1/lateness/settings",
            get(settings_handler).put(update_settings_handler),
        )
        .route(
            "/api/v1/lateness/triggers",
            get(triggers_handler).post(register_trigger_handler),
        )
        .route(
            "/api/v1/lateness/triggers/:trigger_id",
            delete(remove_trigger_handler),
        )
        .route(
            "/api/v1/lateness/export/:part_of_day",
            get(export_handler),
        )
        .route(
            "/api/v1/lateness/:lateness_id",
            put(update_handler).get(get_handler).delete(delete_handler),
        )
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PrintParams {
    #[serde(default)]
    print: bool,
    #[serde(default)]
    printer: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TopParams {
    #[serde(default)]
    limit: Option<usize>,
    /// Comma-separated class ids.
    #[serde(default)]
    classes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ExportParams {
    #[serde(default)]
    publish: bool,
}

/// Resolves the acting user from the forwarding proxy headers.
pub(crate) fn requester(headers: &HeaderMap) -> UserRef {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    match header_value(USER_HEADER) {
        Some(username) => UserRef {
            full_name: header_value(USER_NAME_HEADER).unwrap_or_else(|| username.clone()),
            username,
        },
        None => UserRef::system(),
    }
}

fn context(headers: &HeaderMap) -> RequestContext {
    RequestContext::new(requester(headers), Local::now().naive_local())
}

pub(crate) fn error_response(error: LatenessServiceError) -> Response {
    let status = match &error {
        LatenessServiceError::UnknownStudent(_)
        | LatenessServiceError::NotFound(_)
        | LatenessServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        LatenessServiceError::Trigger(TriggerRegistryError::Invalid(_)) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        LatenessServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        LatenessServiceError::Export(super::export::ExportError::NotConfigured) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = json!({ "error": error.to_string() });
    (status, Json(payload)).into_response()
}

pub(crate) async fn record_handler(
    State(service): State<Arc<LatenessService>>,
    Query(params): Query<PrintParams>,
    headers: HeaderMap,
    Json(new): Json<NewLateness>,
) -> Response {
    let mut ctx = context(&headers);
    if params.print {
        ctx = ctx.with_print(PrintRequest {
            printer: params.printer,
        });
    }

    match service.record(new, &ctx) {
        Ok(recorded) => (StatusCode::CREATED, Json(recorded)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_handler(
    State(service): State<Arc<LatenessService>>,
    Query(query): Query<LatenessQuery>,
) -> Response {
    match service.list(&query) {
        Ok(events) => (StatusCode::OK, Json(events)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn get_handler(
    State(service): State<Arc<LatenessService>>,
    Path(lateness_id): Path<u64>,
) -> Response {
    match service.get(LatenessId(lateness_id)) {
        Ok(event) => (StatusCode::OK, Json(event)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_handler(
    State(service): State<Arc<LatenessService>>,
    Path(lateness_id): Path<u64>,
    headers: HeaderMap,
    Json(update): Json<LatenessUpdate>,
) -> Response {
    let ctx = context(&headers);
    match service.update(LatenessId(lateness_id), update, &ctx) {
        Ok(event) => (StatusCode::OK, Json(event)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn delete_handler(
    State(service): State<Arc<LatenessService>>,
    Path(lateness_id): Path<u64>,
) -> Response {
    match service.delete(LatenessId(lateness_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn top_handler(
    State(service): State<Arc<LatenessService>>,
    Query(params): Query<TopParams>,
) -> Response {
    let classes: Option<BTreeSet<ClasseId>> = match params.classes.as_deref() {
        Some(raw) => match parse_classes(raw) {
            Some(classes) => Some(classes),
            None => {
                let payload = json!({ "error": format!("invalid class list '{raw}'") });
                return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
            }
        },
        None => None,
    };

    let limit = params.limit.unwrap_or(DEFAULT_TOP_LIMIT);
    match service.top(limit, classes.as_ref()) {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(error) => error_response(error),
    }
}

fn parse_classes(raw: &str) -> Option<BTreeSet<ClasseId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<u32>().ok().map(ClasseId))
        .collect()
}

pub(crate) async fn settings_handler(State(service): State<Arc<LatenessService>>) -> Response {
    match service.settings() {
        Ok(settings) => (StatusCode::OK, Json(settings)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_settings_handler(
    State(service): State<Arc<LatenessService>>,
    Json(update): Json<SettingsUpdate>,
) -> Response {
    match service.update_settings(update) {
        Ok(settings) => (StatusCode::OK, Json(settings)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn triggers_handler(State(service): State<Arc<LatenessService>>) -> Response {
    match service.triggers() {
        Ok(triggers) => (StatusCode::OK, Json(triggers)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn register_trigger_handler(
    State(service): State<Arc<LatenessService>>,
    Json(draft): Json<TriggerDraft>,
) -> Response {
    match service.register_trigger(draft) {
        Ok(trigger) => (StatusCode::CREATED, Json(trigger)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn remove_trigger_handler(
    State(service): State<Arc<LatenessService>>,
    Path(trigger_id): Path<u32>,
) -> Response {
    match service.remove_trigger(TriggerId(trigger_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn export_handler(
    State(service): State<Arc<LatenessService>>,
    Path(part_of_day): Path<String>,
    Query(params): Query<ExportParams>,
) -> Response {
    let part: PartOfDay = match part_of_day.parse() {
        Ok(part) => part,
        Err(never) => match never {},
    };
    let now = Local::now().naive_local();

    let batch = if params.publish {
        service.export(part, now)
    } else {
        service.preview_export(part, now)
    };
    let batch = match batch {
        Ok(batch) => batch,
        Err(error) => return error_response(error),
    };

    let mut body = Vec::new();
    if let Err(error) = batch.write_csv(&mut body) {
        return error_response(super::export::ExportError::from(error).into());
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", batch.file_name),
            ),
        ],
        body,
    )
        .into_response()
}
