use crate::models::candidate::CandidateStatus;
use crate::store::{StoreError, StoredDocument};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    StatusUpdate,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogBody {
    pub action: AuditAction,
    pub candidate_id: Uuid,
    pub candidate_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_status: Option<CandidateStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_status: Option<CandidateStatus>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: String,
    #[serde(flatten)]
    pub body: AuditLogBody,
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn from_document(doc: StoredDocument) -> Result<Self, StoreError> {
        let body: AuditLogBody = serde_json::from_value(JsonValue::Object(doc.data))?;
        Ok(Self {
            id: doc.id,
            body,
            timestamp: doc.created_at,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthAction {
    LoginSuccess,
    LoginFailure,
    Logout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthLogBody {
    pub action: AuthAction,
    pub session_id: Option<Uuid>,
    pub user_agent: Option<String>,
}

/// Who triggered a mutation, as far as the request tells us.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn new(user_agent: Option<String>) -> Self {
        Self { user_agent }
    }
}
