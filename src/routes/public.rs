use crate::dto::candidate_dto::{
    CandidateForm, NamedFile, SubmitCandidateResponse, ValidateFieldRequest, ValidateFieldResponse,
};
use crate::error::{Error, Result};
use crate::models::candidate::DocumentKey;
use crate::routes::client_info;
use crate::services::notification_service::{NotificationLevel, NotificationSink};
use crate::utils::validation::{validate_field as check_field, FormField};
use crate::AppState;
use axum::{
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode},
    Json,
};

async fn read_form(mut multipart: Multipart) -> Result<CandidateForm> {
    let mut form = CandidateForm::default();
    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "name" => form.name = field.text().await?,
            "age" => form.age = field.text().await?,
            "phone" => form.phone = field.text().await?,
            "nationalId" => form.national_id = field.text().await?,
            other => {
                let Ok(key) = other.parse::<DocumentKey>() else {
                    tracing::debug!(field = other, "ignoring unknown form field");
                    continue;
                };
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await?;
                form.documents.retain(|d| d.key != key);
                form.documents.push(NamedFile {
                    key,
                    file_name,
                    content_type,
                    bytes,
                });
            }
        }
    }
    Ok(form)
}

pub async fn submit_candidate(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitCandidateResponse>)> {
    let client = client_info(&headers);
    let result = match read_form(multipart).await {
        Ok(form) => state.candidate_service.create(form, &client).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(candidate) => {
            state.notifications.notify(
                NotificationLevel::Success,
                &format!("Candidate {} submitted", candidate.name()),
            );
            Ok((
                StatusCode::CREATED,
                Json(SubmitCandidateResponse {
                    id: candidate.id,
                    status: candidate.status(),
                }),
            ))
        }
        Err(e) => {
            state
                .notifications
                .notify(NotificationLevel::Error, &e.user_message());
            Err(e)
        }
    }
}

/// Single-field check used while the candidate is typing.
pub async fn validate_field(
    Json(payload): Json<ValidateFieldRequest>,
) -> Result<Json<ValidateFieldResponse>> {
    let field: FormField = payload.field.parse().map_err(Error::BadRequest)?;
    Ok(Json(ValidateFieldResponse {
        field: payload.field,
        error: check_field(field, &payload.value),
    }))
}
