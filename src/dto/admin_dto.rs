use crate::models::admin::SyncHeartbeat;
use crate::services::sync_service::SyncSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginPayload {
    #[validate(length(min = 1, max = 256))]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusResponse {
    #[serde(flatten)]
    pub sync: SyncSnapshot,
    pub last_heartbeat: Option<SyncHeartbeat>,
}
