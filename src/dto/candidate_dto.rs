use crate::models::candidate::{Candidate, CandidateStatus, DocumentKey};
use crate::services::feed_service::FeedState;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// One uploaded document held in memory until it is validated and stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedFile {
    pub key: DocumentKey,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Raw submission as typed by the candidate; nothing here is validated yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateForm {
    pub name: String,
    pub age: String,
    pub phone: String,
    pub national_id: String,
    pub documents: Vec<NamedFile>,
}

impl CandidateForm {
    pub fn document(&self, key: DocumentKey) -> Option<&NamedFile> {
        self.documents.iter().find(|d| d.key == key)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitCandidateResponse {
    pub id: Uuid,
    pub status: CandidateStatus,
}

#[derive(Debug, Deserialize)]
pub struct ValidateFieldRequest {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateFieldResponse {
    pub field: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusPayload {
    #[validate(length(min = 1, max = 32))]
    pub status: String,
    #[validate(range(min = 1))]
    pub expected_version: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateFeedResponse {
    pub candidates: Vec<Candidate>,
    pub loading: bool,
    pub error: Option<String>,
}

impl From<FeedState> for CandidateFeedResponse {
    fn from(state: FeedState) -> Self {
        Self {
            candidates: state.candidates,
            loading: state.loading,
            error: state.error,
        }
    }
}
