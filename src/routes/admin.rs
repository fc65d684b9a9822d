use crate::dto::admin_dto::{LoginPayload, LoginResponse, SyncStatusResponse};
use crate::dto::candidate_dto::{CandidateFeedResponse, UpdateStatusPayload};
use crate::error::{Error, Result};
use crate::middleware::auth::Claims;
use crate::models::audit_log::AuditLogEntry;
use crate::models::candidate::{Candidate, CandidateStatus};
use crate::routes::client_info;
use crate::services::feed_service::FeedState;
use crate::services::notification_service::{Notification, NotificationLevel, NotificationSink};
use crate::utils::validation::validate;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use uuid::Uuid;

/// Pushes the outcome of an admin action into the notification center.
fn report<T>(state: &AppState, result: Result<T>, success: impl FnOnce(&T) -> String) -> Result<T> {
    match &result {
        Ok(value) => state
            .notifications
            .notify(NotificationLevel::Success, &success(value)),
        Err(e) => {
            let level = if e.is_retryable() {
                NotificationLevel::Warning
            } else {
                NotificationLevel::Error
            };
            state.notifications.notify(level, &e.user_message());
        }
    }
    result
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<LoginResponse>> {
    validate(&payload)?;
    let response = state
        .session_service
        .login(&payload.password, &client_info(&headers))
        .await?;
    Ok(Json(response))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    state
        .session_service
        .logout(claims.sid, &client_info(&headers))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_candidates(State(state): State<AppState>) -> Json<CandidateFeedResponse> {
    Json(state.feed.snapshot().into())
}

fn feed_event(snapshot: FeedState) -> Event {
    let body = CandidateFeedResponse::from(snapshot);
    Event::default()
        .event("candidates")
        .json_data(&body)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

/// Sends the current list on connect, then again after every change.
pub async fn stream_candidates(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let rx = state.feed.watch();
    let events = stream::unfold((rx, true), |(mut rx, first)| async move {
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let snapshot = rx.borrow_and_update().clone();
        Some((Ok(feed_event(snapshot)), (rx, false)))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

pub async fn get_candidate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Candidate>> {
    Ok(Json(state.candidate_service.get(id).await?))
}

pub async fn candidate_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<AuditLogEntry>>> {
    Ok(Json(state.candidate_service.history(id).await?))
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<UpdateStatusPayload>,
) -> Result<Json<Candidate>> {
    validate(&payload)?;
    let status: CandidateStatus = payload.status.parse().map_err(Error::BadRequest)?;
    let result = state
        .candidate_service
        .update_status(id, status, payload.expected_version, &client_info(&headers))
        .await;
    let candidate = report(&state, result, |c| {
        format!("{} moved to {}", c.name(), c.status())
    })?;
    Ok(Json(candidate))
}

pub async fn delete_candidate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let result = state
        .candidate_service
        .delete(id, &client_info(&headers))
        .await;
    report(&state, result, |_| "Candidate deleted".to_string())?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_notifications(State(state): State<AppState>) -> Json<Vec<Notification>> {
    Json(state.notifications.active())
}

async fn sync_response(state: &AppState) -> SyncStatusResponse {
    let last_heartbeat = match state.sync_monitor.last_heartbeat().await {
        Ok(heartbeat) => heartbeat,
        Err(e) => {
            tracing::warn!(error = %e, "could not read sync heartbeat");
            None
        }
    };
    SyncStatusResponse {
        sync: state.sync_monitor.snapshot(),
        last_heartbeat,
    }
}

pub async fn sync_status(State(state): State<AppState>) -> Json<SyncStatusResponse> {
    Json(sync_response(&state).await)
}

pub async fn force_sync(State(state): State<AppState>) -> Json<SyncStatusResponse> {
    state.sync_monitor.force_sync().await;
    Json(sync_response(&state).await)
}
